use chrono::{DateTime, Utc};

use super::{ProjectId, VersionId};

/// A build of an addon observed in the catalog. Never changed once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
	pub version_id: VersionId,
	pub project_id: ProjectId,
	pub file_name: String,
	pub created_at: DateTime<Utc>,
	/// The game version string the configured filter resolved to.
	pub matched_game_version: String,
}

impl std::fmt::Display for VersionRecord {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{} [{}]", self.project_id, self.version_id, self.file_name)
	}
}
