use chrono::{DateTime, Utc};

use super::{ProjectId, VersionId};

/// An addon on the user's watch list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WantedAddon {
	pub project_id: ProjectId,
	/// Display label.
	pub name: String,
	/// Version the user asked to stay on. Advisory only, reconciliation ignores it.
	pub desired_version: Option<VersionId>,
	pub last_checked: Option<DateTime<Utc>>,
	/// `None` when nothing has been installed yet.
	pub installed_version_id: Option<VersionId>,
}

impl std::fmt::Display for WantedAddon {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({})", self.name, self.project_id)
	}
}
