//! Various helper functions for testing
//!
//! Provides an in-memory catalog, archive builders and a scratch environment
//! with its own config and directories.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Mutex;

use addon_sync::catalog::{CatalogClient, CatalogError, CatalogQuery};
use addon_sync::ledger::{ProjectId, VersionId};

/// Game-version-type id used by [`TestEnv`] configs.
pub const GAME_VERSION: i64 = 517;

/// A catalog that serves whatever it was given.
#[derive(Default)]
pub struct MockCatalog {
	pages: Mutex<HashMap<ProjectId, Vec<serde_json::Value>>>,
	artifacts: Mutex<HashMap<(ProjectId, VersionId), Vec<u8>>>,
	unavailable: Mutex<HashSet<ProjectId>>,
	fetches: Mutex<Vec<(ProjectId, VersionId)>>,
	queries: Mutex<Vec<CatalogQuery>>,
}

impl MockCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the page returned for a project.
	pub fn set_page(&self, project_id: ProjectId, rows: Vec<serde_json::Value>) {
		self.pages.lock().unwrap().insert(project_id, rows);
	}

	pub fn set_artifact(&self, project_id: ProjectId, version_id: VersionId, data: Vec<u8>) {
		self.artifacts.lock().unwrap().insert((project_id, version_id), data);
	}

	/// Makes polls for the project answer with a 503.
	pub fn set_unavailable(&self, project_id: ProjectId, unavailable: bool) {
		let mut set = self.unavailable.lock().unwrap();
		if unavailable {
			set.insert(project_id);
		} else {
			set.remove(&project_id);
		}
	}

	/// Every artifact fetched so far, in order.
	pub fn fetches(&self) -> Vec<(ProjectId, VersionId)> {
		self.fetches.lock().unwrap().clone()
	}

	pub fn queries(&self) -> Vec<CatalogQuery> {
		self.queries.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl CatalogClient for MockCatalog {
	async fn list_builds(&self, query: &CatalogQuery) -> Result<Vec<serde_json::Value>, CatalogError> {
		self.queries.lock().unwrap().push(query.clone());
		if self.unavailable.lock().unwrap().contains(&query.project_id) {
			return Err(CatalogError::Status(503));
		}
		Ok(self.pages.lock().unwrap().get(&query.project_id).cloned().unwrap_or_default())
	}

	async fn fetch_artifact(&self, project_id: ProjectId, version_id: VersionId) -> Result<Vec<u8>, CatalogError> {
		self.fetches.lock().unwrap().push((project_id, version_id));
		self.artifacts
			.lock()
			.unwrap()
			.get(&(project_id, version_id))
			.cloned()
			.ok_or(CatalogError::Status(404))
	}
}

/// A catalog descriptor row that targets [`GAME_VERSION`].
pub fn build(id: VersionId, downloadable: bool) -> serde_json::Value {
	build_for(id, downloadable, &[(GAME_VERSION, "11.0.2")])
}

/// A catalog descriptor row with explicit `(type id, version string)` pairs.
pub fn build_for(id: VersionId, downloadable: bool, game_versions: &[(i64, &str)]) -> serde_json::Value {
	serde_json::json!({
		"id": id,
		"fileName": format!("Addon-{}.zip", id),
		"dateCreated": "2024-05-01T12:00:00Z",
		"isAvailableForDownload": downloadable,
		"gameVersions": game_versions.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
		"gameVersionTypeIds": game_versions.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
	})
}

/// Builds a zip archive in memory.
pub fn zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
	let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
	for (name, data) in files {
		zip.start_file(*name, zip::write::FileOptions::default()).expect("failed to start zip entry");
		zip.write_all(data).expect("failed to write zip entry");
	}
	zip.finish().expect("failed to finish zip").into_inner()
}

/// A config rooted in a temporary directory.
pub struct TestEnv {
	pub dir: tempfile::TempDir,
	pub config: addon_sync::Config,
}

impl TestEnv {
	pub fn new() -> Self {
		let dir = tempfile::tempdir().expect("failed to create temp dir");
		let mut config = addon_sync::Config::default();
		config.set_game_version(GAME_VERSION);
		config.set_data_dir(dir.path().join("data"));
		config.set_download_dir(dir.path().join("downloads"));
		config.set_target_dir(dir.path().join("AddOns"));
		Self { dir, config }
	}

	pub fn target_dir(&self) -> std::path::PathBuf {
		self.config.target_dir().to_path_buf()
	}

	pub fn download_dir(&self) -> std::path::PathBuf {
		self.config.download_dir().to_path_buf()
	}
}

impl Default for TestEnv {
	fn default() -> Self {
		Self::new()
	}
}
