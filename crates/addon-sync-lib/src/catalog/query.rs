//! Builds catalog requests and turns the returned rows into [`VersionRecord`]s.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{CatalogClient, CatalogError};
use crate::ledger::{ProjectId, VersionId, VersionRecord};

pub const SORT_FIELD: &str = "dateCreated";

/// Parameters for a single page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
	pub project_id: ProjectId,
	pub page_index: u32,
	pub page_size: u32,
	pub sort_field: &'static str,
	pub sort_ascending: bool,
	pub exclude_prerelease: bool,
}

impl CatalogQuery {
	/// First page of a project's builds, sorted by creation time, pre-releases excluded.
	pub fn for_project(project_id: ProjectId, config: &crate::Config) -> Self {
		Self {
			project_id,
			page_index: 0,
			page_size: config.page_size(),
			sort_field: SORT_FIELD,
			sort_ascending: config.sort_ascending(),
			exclude_prerelease: true,
		}
	}

	pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
		vec![
			("pageIndex", self.page_index.to_string()),
			("pageSize", self.page_size.to_string()),
			("sort", self.sort_field.to_string()),
			("sortAscending", self.sort_ascending.to_string()),
			("removeAlphas", self.exclude_prerelease.to_string()),
		]
	}
}

/// A build as the catalog describes it.
///
/// `game_versions` and `game_version_type_ids` are parallel lists.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDescriptor {
	pub id: VersionId,
	pub file_name: String,
	pub date_created: DateTime<Utc>,
	pub is_available_for_download: bool,
	pub game_versions: Vec<String>,
	pub game_version_type_ids: Vec<i64>,
}

impl BuildDescriptor {
	/// The game version string paired with `filter`, `None` when the build doesn't target it.
	///
	/// # Errors
	/// Returns the offending index when the parallel lists disagree in length.
	fn matched_game_version(&self, filter: i64) -> Result<Option<&str>, usize> {
		let Some(index) = self.game_version_type_ids.iter().position(|id| *id == filter) else {
			return Ok(None);
		};
		self.game_versions.get(index).map(|s| Some(s.as_str())).ok_or(index)
	}
}

/// Result of polling one project. A failed poll carries no records.
#[derive(Debug)]
pub struct PollOutcome {
	pub project_id: ProjectId,
	pub records: Vec<VersionRecord>,
	pub failure: Option<CatalogError>,
}

/// Converts a page of raw rows into records for `project_id`.
///
/// Rows are dropped when they are malformed, not downloadable, not newer than
/// `known_version_id`, or don't list `game_version_filter`.
pub fn normalize_rows(project_id: ProjectId, known_version_id: Option<VersionId>, game_version_filter: i64, rows: Vec<serde_json::Value>) -> Vec<VersionRecord> {
	let mut records = Vec::new();

	for (i, row) in rows.into_iter().enumerate() {
		let descriptor: BuildDescriptor = match serde_json::from_value(row) {
			Ok(d) => d,
			Err(e) => {
				log::warn!("Skipping row {} for project {}, malformed descriptor: {}", i, project_id, e);
				continue;
			},
		};

		if !descriptor.is_available_for_download {
			log::debug!("Build {} of project {} is not downloadable, skipping.", descriptor.id, project_id);
			continue;
		}

		if let Some(known) = known_version_id {
			if descriptor.id <= known {
				log::debug!("Build {} of project {} is already known, skipping.", descriptor.id, project_id);
				continue;
			}
		}

		let matched_game_version = match descriptor.matched_game_version(game_version_filter) {
			Ok(Some(v)) => v.to_string(),
			Ok(None) => {
				log::debug!("Build {} of project {} does not target game version {}, skipping.", descriptor.id, project_id, game_version_filter);
				continue;
			},
			Err(index) => {
				log::warn!("Skipping build {} of project {}, no game version at index {}.", descriptor.id, project_id, index);
				continue;
			},
		};

		records.push(VersionRecord {
			version_id: descriptor.id,
			project_id,
			file_name: descriptor.file_name,
			created_at: descriptor.date_created,
			matched_game_version,
		});
	}

	records
}

/// Requests one page for the query's project and normalizes it.
///
/// Failures are returned in the outcome rather than raised so one project's
/// catalog trouble never stops the others.
pub async fn poll_project<C>(client: &C, query: &CatalogQuery, known_version_id: Option<VersionId>, game_version_filter: i64, cancel: &CancellationToken) -> PollOutcome
where C: CatalogClient + ?Sized
{
	let project_id = query.project_id;
	log::info!("Polling project {} for builds newer than {:?}", project_id, known_version_id);

	let rows = tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(CatalogError::Cancelled),
		rows = client.list_builds(query) => rows,
	};

	match rows {
		Ok(rows) => PollOutcome {
			project_id,
			records: normalize_rows(project_id, known_version_id, game_version_filter, rows),
			failure: None,
		},
		Err(e) => {
			log::warn!("Failed to poll project {}: {}", project_id, e);
			PollOutcome { project_id, records: Vec::new(), failure: Some(e) }
		},
	}
}
