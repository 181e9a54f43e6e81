//! Runtime configuration.
//!
//! Loaded once at startup and handed to the [`Pipeline`](crate::pipeline::Pipeline).
//! Every field has a default so a partial `config.json` is still valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Game-version-type id used when none is configured.
pub const DEFAULT_GAME_VERSION: i64 = 517;
pub const DEFAULT_CATALOG_URL: &str = "https://www.curseforge.com/api/v1/mods/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	game_version: i64,
	page_size: u32,
	target_dir: PathBuf,
	download_dir: PathBuf,
	data_dir: PathBuf,
	catalog_url: String,
	headers: BTreeMap<String, String>,
	https_only: bool,
	request_timeout_secs: u64,
	max_concurrent: usize,
	poll_interval_secs: u64,
	keep_downloads: bool,
	sort_ascending: bool,
}

impl Default for Config {
	fn default() -> Self {
		let data_dir = {
			#[cfg(target_os = "windows")]
			let path = std::env::var_os("APPDATA").map(PathBuf::from);

			#[cfg(not(target_os = "windows"))]
			let path = std::env::var_os("XDG_DATA_HOME")
				.map(PathBuf::from)
				.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")));

			path.unwrap_or_else(std::env::temp_dir).join("addon-sync")
		};

		let download_dir = {
			#[cfg(target_os = "windows")]
			let path = std::env::var_os("LOCALAPPDATA").map(PathBuf::from);

			#[cfg(not(target_os = "windows"))]
			let path = std::env::var_os("XDG_CACHE_HOME")
				.map(PathBuf::from)
				.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")));

			path.unwrap_or_else(std::env::temp_dir).join("addon-sync").join("downloads")
		};

		Self {
			game_version: DEFAULT_GAME_VERSION,
			page_size: 3,
			target_dir: data_dir.join("AddOns"),
			download_dir,
			data_dir,
			catalog_url: DEFAULT_CATALOG_URL.to_string(),
			headers: BTreeMap::new(),
			https_only: true,
			request_timeout_secs: 30,
			max_concurrent: 4,
			poll_interval_secs: 60 * 60,
			keep_downloads: false,
			sort_ascending: true,
		}
	}
}

impl Config {
	/// Reads a config from a JSON file, missing fields take their defaults.
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when the file can't be read.
	/// - [`SerdeJSON`](crate::Error::SerdeJSON) when the file isn't a valid config.
	pub fn load_from_disk(path: impl AsRef<Path>) -> crate::Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&raw)?)
	}

	pub fn save_to_disk(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, serde_json::to_string_pretty(self)?)?;
		Ok(())
	}

	/// Loads the config at `path`, writing the default config there first if the file doesn't exist.
	pub fn load_or_create(path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		if path.exists() {
			return Self::load_from_disk(path);
		}
		log::info!("No config at {}, writing defaults.", path.display());
		let config = Self::default();
		config.save_to_disk(path)?;
		Ok(config)
	}

	/// Path of the SQLite ledger inside [`data_dir`](Config::data_dir).
	pub fn ledger_path(&self) -> PathBuf {
		self.data_dir.join("ledger.sqlite")
	}

	pub fn game_version(&self) -> i64 {
		self.game_version
	}
	pub fn set_game_version(&mut self, game_version: i64) {
		self.game_version = game_version;
	}

	/// Builds requested per poll, never zero.
	pub fn page_size(&self) -> u32 {
		self.page_size.max(1)
	}
	pub fn set_page_size(&mut self, page_size: u32) {
		self.page_size = page_size.max(1);
	}

	pub fn target_dir(&self) -> &Path {
		&self.target_dir
	}
	pub fn set_target_dir(&mut self, target_dir: PathBuf) {
		self.target_dir = target_dir;
	}

	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}
	pub fn set_download_dir(&mut self, download_dir: PathBuf) {
		self.download_dir = download_dir;
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}
	pub fn set_data_dir(&mut self, data_dir: PathBuf) {
		self.data_dir = data_dir;
	}

	pub fn catalog_url(&self) -> &str {
		&self.catalog_url
	}
	pub fn set_catalog_url(&mut self, catalog_url: impl Into<String>) {
		self.catalog_url = catalog_url.into();
	}

	/// Extra headers sent with every catalog request.
	pub fn headers(&self) -> &BTreeMap<String, String> {
		&self.headers
	}
	pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.headers.insert(name.into(), value.into());
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_secs)
	}
	pub fn set_request_timeout_secs(&mut self, secs: u64) {
		self.request_timeout_secs = secs;
	}

	/// Upper bound on polls or installs running at once, never zero.
	pub fn max_concurrent(&self) -> usize {
		self.max_concurrent.max(1)
	}
	pub fn set_max_concurrent(&mut self, max_concurrent: usize) {
		self.max_concurrent = max_concurrent;
	}

	pub fn poll_interval(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.poll_interval_secs)
	}
	pub fn set_poll_interval_secs(&mut self, secs: u64) {
		self.poll_interval_secs = secs;
	}

	/// Keep staged archives after a successful install.
	pub fn keep_downloads(&self) -> bool {
		self.keep_downloads
	}
	pub fn set_keep_downloads(&mut self, keep_downloads: bool) {
		self.keep_downloads = keep_downloads;
	}

	pub fn sort_ascending(&self) -> bool {
		self.sort_ascending
	}
	pub fn set_sort_ascending(&mut self, sort_ascending: bool) {
		self.sort_ascending = sort_ascending;
	}
}
