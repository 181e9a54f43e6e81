//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

use crate::ledger::{ProjectId, VersionId};

#[derive(Debug, Error)]
pub enum Error {
	#[error("sqlite error: {0}")]
	Sqlite(#[from] rusqlite::Error),
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("invalid request header: {0}")]
	InvalidHeader(String),
	/// The project is not on the watch list.
	#[error("project {0} is not a wanted addon")]
	NotFound(ProjectId),
	/// The version has not been recorded for the project.
	#[error("version {version_id} is not recorded for project {project_id}")]
	UnknownVersion { project_id: ProjectId, version_id: VersionId },
	/// Marking the version installed would move the addon to an older build.
	#[error("project {project_id} is at version {installed}, refusing to go back to {requested}")]
	Regression { project_id: ProjectId, installed: VersionId, requested: VersionId },
	#[error("project {0} is already a wanted addon")]
	AlreadyExists(ProjectId),
	/// The ledger lock was poisoned by a panicking writer.
	#[error("ledger unavailable")]
	LedgerUnavailable,
}
