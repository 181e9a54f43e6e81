//! # Ledger
//!
//! Durable record of the addons the user wants and every build observed for them.
//!
//! Backed by a single SQLite connection held behind a mutex, so writes from
//! concurrent polls and installs are serialized. Every operation touching more
//! than one row runs inside a transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

mod sql;

mod wanted;
pub use wanted::WantedAddon;

mod version;
pub use version::VersionRecord;

/// Stable catalog id of an addon.
pub type ProjectId = i64;
/// Catalog assigned build id. Unique across the catalog, higher is newer.
pub type VersionId = i64;

pub struct Ledger {
	connection: Mutex<Connection>,
}

impl Ledger {
	/// Opens or creates the ledger at `path`, creating the schema if needed.
	pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		log::debug!("Opening ledger at {}", path.display());
		Self::from_connection(Connection::open(path)?)
	}

	pub fn open_in_memory() -> crate::Result<Self> {
		Self::from_connection(Connection::open_in_memory()?)
	}

	fn from_connection(connection: Connection) -> crate::Result<Self> {
		connection.pragma_update(None, "foreign_keys", "ON")?;
		connection.execute_batch(sql::SCHEMA)?;
		Ok(Self { connection: Mutex::new(connection) })
	}

	fn lock(&self) -> crate::Result<MutexGuard<'_, Connection>> {
		self.connection.lock().map_err(|_| crate::Error::LedgerUnavailable)
	}

	/* Wanted Addons */

	/// Adds a project to the watch list.
	///
	/// # Errors
	/// - [`AlreadyExists`](crate::Error::AlreadyExists) when the project is already wanted.
	pub fn add_wanted(&self, project_id: ProjectId, name: &str) -> crate::Result<()> {
		log::trace!("Adding wanted addon {} ({})", project_id, name);
		let connection = self.lock()?;
		let inserted = connection.execute(
			"INSERT OR IGNORE INTO wanted_addons (project_id, name) VALUES (?1, ?2)",
			params![project_id, name],
		)?;
		if inserted == 0 {
			return Err(crate::Error::AlreadyExists(project_id));
		}
		Ok(())
	}

	/// All wanted addons ordered by project id.
	pub fn list_wanted(&self) -> crate::Result<Vec<WantedAddon>> {
		let connection = self.lock()?;
		let mut statement = connection.prepare(&format!("SELECT {} FROM wanted_addons ORDER BY project_id", sql::WANTED_COLUMNS))?;
		let rows = statement.query_map([], sql::wanted_from_row)?;
		Ok(rows.collect::<Result<Vec<_>, _>>()?)
	}

	/// # Errors
	/// - [`NotFound`](crate::Error::NotFound) when the project isn't wanted.
	pub fn get_wanted(&self, project_id: ProjectId) -> crate::Result<WantedAddon> {
		let connection = self.lock()?;
		connection
			.query_row(
				&format!("SELECT {} FROM wanted_addons WHERE project_id = ?1", sql::WANTED_COLUMNS),
				params![project_id],
				sql::wanted_from_row,
			)
			.optional()?
			.ok_or(crate::Error::NotFound(project_id))
	}

	/// Records when the project was last polled.
	pub fn touch_checked(&self, project_id: ProjectId, at: DateTime<Utc>) -> crate::Result<()> {
		let connection = self.lock()?;
		let updated = connection.execute(
			"UPDATE wanted_addons SET last_checked = ?1 WHERE project_id = ?2",
			params![at, project_id],
		)?;
		if updated == 0 {
			return Err(crate::Error::NotFound(project_id));
		}
		Ok(())
	}

	/// Points the addon at `version_id` and refreshes its timestamp.
	///
	/// Marking the currently installed version again only refreshes the timestamp,
	/// which makes retrying a failed commit safe.
	///
	/// # Errors
	/// - [`NotFound`](crate::Error::NotFound) when the project isn't wanted.
	/// - [`UnknownVersion`](crate::Error::UnknownVersion) when the version isn't recorded for this project.
	/// - [`Regression`](crate::Error::Regression) when the addon already has a newer version installed.
	pub fn mark_installed(&self, project_id: ProjectId, version_id: VersionId, at: DateTime<Utc>) -> crate::Result<()> {
		log::trace!("Marking project {} installed at version {}", project_id, version_id);
		let mut connection = self.lock()?;
		let tx = connection.transaction()?;

		let installed: Option<VersionId> = tx
			.query_row(
				"SELECT installed_version_id FROM wanted_addons WHERE project_id = ?1",
				params![project_id],
				|row| row.get(0),
			)
			.optional()?
			.ok_or(crate::Error::NotFound(project_id))?;

		let known = tx
			.query_row(
				"SELECT 1 FROM addon_versions WHERE version_id = ?1 AND project_id = ?2",
				params![version_id, project_id],
				|_| Ok(()),
			)
			.optional()?;
		if known.is_none() {
			return Err(crate::Error::UnknownVersion { project_id, version_id });
		}

		if let Some(installed) = installed {
			if installed > version_id {
				return Err(crate::Error::Regression { project_id, installed, requested: version_id });
			}
		}

		tx.execute(
			"UPDATE wanted_addons SET installed_version_id = ?1, last_checked = ?2 WHERE project_id = ?3",
			params![version_id, at, project_id],
		)?;
		tx.commit()?;
		Ok(())
	}

	/* Versions */

	/// Inserts every record not already known, returning how many were new.
	///
	/// Already known version ids are skipped so repeated polls can be written
	/// without checking first. Nothing is written if any record belongs to a
	/// project that isn't wanted.
	///
	/// # Errors
	/// - [`NotFound`](crate::Error::NotFound) when a record's project isn't wanted.
	pub fn upsert_versions(&self, records: &[VersionRecord]) -> crate::Result<usize> {
		if records.is_empty() {
			return Ok(0);
		}
		let mut connection = self.lock()?;
		let tx = connection.transaction()?;
		let mut inserted = 0;
		{
			let mut wanted = tx.prepare_cached("SELECT 1 FROM wanted_addons WHERE project_id = ?1")?;
			let mut insert = tx.prepare_cached(
				"INSERT OR IGNORE INTO addon_versions (version_id, project_id, file_name, created_at, matched_game_version)
				VALUES (?1, ?2, ?3, ?4, ?5)",
			)?;
			for record in records {
				if !wanted.exists(params![record.project_id])? {
					return Err(crate::Error::NotFound(record.project_id));
				}
				inserted += insert.execute(params![
					record.version_id,
					record.project_id,
					record.file_name,
					record.created_at,
					record.matched_game_version,
				])?;
			}
		}
		tx.commit()?;
		log::debug!("Recorded {} new version(s) out of {}", inserted, records.len());
		Ok(inserted)
	}

	/// Every recorded version of a project, oldest first.
	pub fn versions_for_project(&self, project_id: ProjectId) -> crate::Result<Vec<VersionRecord>> {
		let connection = self.lock()?;
		let mut statement = connection.prepare(&format!(
			"SELECT {} FROM addon_versions WHERE project_id = ?1 ORDER BY version_id",
			sql::VERSION_COLUMNS
		))?;
		let rows = statement.query_map(params![project_id], sql::version_from_row)?;
		Ok(rows.collect::<Result<Vec<_>, _>>()?)
	}

	/// The highest version recorded for each project that has any.
	pub fn latest_version_per_project(&self) -> crate::Result<HashMap<ProjectId, VersionRecord>> {
		let connection = self.lock()?;
		let mut statement = connection.prepare(sql::LATEST_PER_PROJECT)?;
		let rows = statement.query_map([], sql::version_from_row)?;
		let mut latest = HashMap::new();
		for record in rows {
			let record = record?;
			latest.insert(record.project_id, record);
		}
		Ok(latest)
	}
}
