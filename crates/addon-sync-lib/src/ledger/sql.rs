//! Schema and row mapping for the ledger tables.

use rusqlite::Row;

use super::{VersionRecord, WantedAddon};

pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS wanted_addons (
	project_id           INTEGER PRIMARY KEY NOT NULL,
	name                 TEXT    NOT NULL,
	desired_version      INTEGER DEFAULT NULL,
	last_checked         TEXT    DEFAULT NULL,
	installed_version_id INTEGER DEFAULT NULL
		REFERENCES addon_versions (version_id)
);

CREATE TABLE IF NOT EXISTS addon_versions (
	version_id           INTEGER PRIMARY KEY NOT NULL,
	project_id           INTEGER NOT NULL
		REFERENCES wanted_addons (project_id),
	file_name            TEXT    NOT NULL,
	created_at           TEXT    NOT NULL,
	matched_game_version TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS addon_versions_project_id ON addon_versions (project_id);
"#;

pub(super) const WANTED_COLUMNS: &str = "project_id, name, desired_version, last_checked, installed_version_id";
pub(super) const VERSION_COLUMNS: &str = "version_id, project_id, file_name, created_at, matched_game_version";

pub(super) const LATEST_PER_PROJECT: &str = r#"
SELECT av.version_id, av.project_id, av.file_name, av.created_at, av.matched_game_version
FROM addon_versions av
INNER JOIN (
	SELECT project_id, MAX(version_id) AS max_version_id
	FROM addon_versions
	GROUP BY project_id
) latest
ON av.project_id = latest.project_id AND av.version_id = latest.max_version_id
"#;

pub(super) fn wanted_from_row(row: &Row<'_>) -> rusqlite::Result<WantedAddon> {
	Ok(WantedAddon {
		project_id: row.get(0)?,
		name: row.get(1)?,
		desired_version: row.get(2)?,
		last_checked: row.get(3)?,
		installed_version_id: row.get(4)?,
	})
}

pub(super) fn version_from_row(row: &Row<'_>) -> rusqlite::Result<VersionRecord> {
	Ok(VersionRecord {
		version_id: row.get(0)?,
		project_id: row.get(1)?,
		file_name: row.get(2)?,
		created_at: row.get(3)?,
		matched_game_version: row.get(4)?,
	})
}
