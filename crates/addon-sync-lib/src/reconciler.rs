//! Decides which observed build each wanted addon should move to.

use std::collections::{BTreeMap, HashMap};

use crate::ledger::{ProjectId, VersionRecord, WantedAddon};

/// An addon paired with the build it should be upgraded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
	pub addon: WantedAddon,
	pub version: VersionRecord,
}

impl InstallTarget {
	pub fn project_id(&self) -> ProjectId {
		self.addon.project_id
	}
}

impl std::fmt::Display for InstallTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.addon.installed_version_id {
			Some(installed) => write!(f, "{}: {} -> {}", self.addon, installed, self.version.version_id),
			None => write!(f, "{}: new install {}", self.addon, self.version.version_id),
		}
	}
}

/// Computes at most one install target per project, ordered by project id.
///
/// The latest observed build is selected when nothing is installed yet, or when
/// it is strictly newer than the installed build. Addons are never downgraded.
pub fn compute_install_targets(wanted: &[WantedAddon], latest_per_project: &HashMap<ProjectId, VersionRecord>) -> Vec<InstallTarget> {
	let mut targets = BTreeMap::<ProjectId, InstallTarget>::new();

	for addon in wanted {
		let Some(latest) = latest_per_project.get(&addon.project_id) else {
			log::trace!("No builds observed for {}", addon);
			continue;
		};

		if latest.project_id != addon.project_id {
			log::warn!("Latest build {} is filed under the wrong project for {}, ignoring.", latest, addon);
			continue;
		}

		let newer = match addon.installed_version_id {
			None => true,
			Some(installed) => latest.version_id > installed,
		};

		if !newer {
			log::trace!("{} is up to date", addon);
			continue;
		}

		targets.entry(addon.project_id).or_insert_with(|| InstallTarget {
			addon: addon.clone(),
			version: latest.clone(),
		});
	}

	targets.into_values().collect()
}
