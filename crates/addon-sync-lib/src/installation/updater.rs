//! Applies [`InstallTarget`]s: fetch, extract, then commit to the ledger.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::content::{self, ContentError, Extractor};
use super::download::{self, DownloadError};
use super::KeyedLocks;
use crate::catalog::{CatalogClient, CatalogError};
use crate::ledger::{Ledger, ProjectId};
use crate::reconciler::InstallTarget;

/// Why applying a target failed. Each variant says how far the install got.
#[derive(Debug, Error)]
pub enum UpdateError {
	/// The ledger couldn't be read before starting. Nothing was changed.
	#[error("ledger read failed: {0}")]
	Ledger(#[source] crate::Error),
	/// The archive couldn't be fetched or staged. Nothing was changed.
	#[error("fetch failed: {0}")]
	FetchFailed(#[source] DownloadError),
	/// The archive couldn't be extracted. The ledger is unchanged and the staged archive is kept.
	#[error("extract failed: {0}")]
	ExtractFailed(#[source] ContentError),
	/// Files are on disk but the ledger still points at the old build.
	/// Recover with [`Updater::retry_commit`].
	#[error("files installed but ledger commit failed: {0}")]
	CommitFailed(#[source] crate::Error),
	#[error("update cancelled")]
	Cancelled,
}

/// The result of applying one target.
#[derive(Debug)]
pub struct UpdateOutcome {
	pub target: InstallTarget,
	pub result: Result<(), UpdateError>,
}

pub struct Updater {
	config: Arc<crate::Config>,
	ledger: Arc<Ledger>,
	catalog: Arc<dyn CatalogClient>,
	extractor: Arc<dyn Extractor>,
	projects: KeyedLocks<ProjectId>,
	paths: KeyedLocks<PathBuf>,
}

impl Updater {
	pub fn new(config: Arc<crate::Config>, ledger: Arc<Ledger>, catalog: Arc<dyn CatalogClient>, extractor: Arc<dyn Extractor>) -> Self {
		Self {
			config,
			ledger,
			catalog,
			extractor,
			projects: Default::default(),
			paths: Default::default(),
		}
	}

	/// Installs the target's build and records it in the ledger.
	///
	/// The ledger is advanced only after extraction succeeds. Targets for the
	/// same project are applied one at a time, and a target whose build (or a
	/// newer one) is already installed is skipped, so a build is applied at
	/// most once. Cancellation is honoured during the fetch and checked again
	/// before extraction starts.
	pub async fn apply_target(&self, target: &InstallTarget, cancel: &CancellationToken) -> Result<(), UpdateError> {
		let project_id = target.project_id();
		let version = &target.version;
		let _project = self.projects.lock(&project_id).await;

		let current = self.ledger.get_wanted(project_id).map_err(UpdateError::Ledger)?;
		if let Some(installed) = current.installed_version_id {
			if installed >= version.version_id {
				log::info!("{} already at version {}, skipping {}.", current, installed, version.version_id);
				return Ok(());
			}
		}

		if cancel.is_cancelled() {
			return Err(UpdateError::Cancelled);
		}

		let staged = match download::download_version(&self.config, self.catalog.as_ref(), version, cancel).await {
			Ok(path) => path,
			Err(DownloadError::Catalog(CatalogError::Cancelled)) => return Err(UpdateError::Cancelled),
			Err(e) => {
				log::error!("Failed to fetch build {}: {}", version, e);
				return Err(UpdateError::FetchFailed(e));
			},
		};

		if cancel.is_cancelled() {
			log::info!("Cancelled before extracting {}, staged archive kept at {}", version, staged.display());
			return Err(UpdateError::Cancelled);
		}

		if let Err(e) = content::extract_archive(self.extractor.clone(), staged.clone(), self.config.target_dir().to_path_buf(), &self.paths).await {
			log::error!("Failed to extract {}, staged archive kept at {}: {}", version, staged.display(), e);
			return Err(UpdateError::ExtractFailed(e));
		}

		self.commit(target)?;

		if !self.config.keep_downloads() {
			if let Err(e) = tokio::fs::remove_file(&staged).await {
				log::warn!("Couldn't remove staged archive {}: {}", staged.display(), e);
			}
		}

		log::info!("Installed {}", target);
		Ok(())
	}

	/// Repeats only the ledger step of an install whose files are already on disk.
	pub async fn retry_commit(&self, target: &InstallTarget) -> Result<(), UpdateError> {
		let _project = self.projects.lock(&target.project_id()).await;
		self.commit(target)
	}

	fn commit(&self, target: &InstallTarget) -> Result<(), UpdateError> {
		self.ledger
			.mark_installed(target.project_id(), target.version.version_id, Utc::now())
			.map_err(|e| {
				log::error!("Installed {} but couldn't record it: {}", target, e);
				UpdateError::CommitFailed(e)
			})
	}
}
