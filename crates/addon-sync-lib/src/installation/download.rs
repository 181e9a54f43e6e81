//! Downloads a build's archive into the staging directory.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogClient, CatalogError};
use crate::ledger::VersionRecord;

/// Errors that can occur during the download process.
#[derive(Debug, Error)]
pub enum DownloadError {
	#[error("catalog error: {0}")]
	Catalog(#[from] CatalogError),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

/// Where a build's archive is staged: `<download_dir>/<project_id>/<file_name>`.
///
/// Only the final component of the catalog supplied file name is used.
pub fn get_staging_path(config: &crate::Config, version: &VersionRecord) -> PathBuf {
	let file_name = Path::new(&version.file_name)
		.file_name()
		.map(|n| n.to_os_string())
		.unwrap_or_else(|| format!("{}-{}.zip", version.project_id, version.version_id).into());
	config.download_dir().join(version.project_id.to_string()).join(file_name)
}

/// Fetches the archive for `version` and writes it to its staging path.
///
/// The file is written under a temporary name and renamed into place, so a
/// staged archive is never a partial download.
pub async fn download_version<C>(config: &crate::Config, client: &C, version: &VersionRecord, cancel: &CancellationToken) -> Result<PathBuf, DownloadError>
where C: CatalogClient + ?Sized
{
	let download_path = get_staging_path(config, version);

	let content = tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(CatalogError::Cancelled),
		content = client.fetch_artifact(version.project_id, version.version_id) => content,
	};
	let content = content?;

	log::info!("Writing build {} to disk: {}", version, download_path.display());
	if let Some(parent) = download_path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	let partial = download_path.with_extension("part");
	tokio::fs::write(&partial, &content).await?;
	tokio::fs::rename(&partial, &download_path).await?;

	Ok(download_path)
}
