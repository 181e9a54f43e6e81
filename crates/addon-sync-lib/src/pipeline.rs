//! Ties the ledger, catalog, reconciler and updater together.
//!
//! Front-ends drive everything through a [`Pipeline`]: [`poll`](Pipeline::poll)
//! records new builds, [`reconcile`](Pipeline::reconcile) picks install targets and
//! [`apply`](Pipeline::apply) installs them. A failure is always scoped to the
//! project it concerns.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::{poll_project, CatalogClient, CatalogError, CatalogQuery, HttpCatalog, PollOutcome};
use crate::installation::content::{Extractor, ZipExtractor};
use crate::installation::updater::UpdateOutcome;
use crate::installation::Updater;
use crate::ledger::{Ledger, ProjectId};
use crate::reconciler::{compute_install_targets, InstallTarget};

/// Why a project's poll produced nothing.
#[derive(Debug, Error)]
pub enum PollFailure {
	#[error("catalog unavailable: {0}")]
	Catalog(#[from] CatalogError),
	#[error("couldn't record builds: {0}")]
	Ledger(#[from] crate::Error),
}

#[derive(Debug, Default)]
pub struct PollSummary {
	/// Newly recorded builds per successfully polled project.
	pub imported: BTreeMap<ProjectId, usize>,
	pub failures: Vec<(ProjectId, PollFailure)>,
}

impl PollSummary {
	pub fn total_imported(&self) -> usize {
		self.imported.values().sum()
	}
}

pub struct Pipeline {
	config: Arc<crate::Config>,
	ledger: Arc<Ledger>,
	catalog: Arc<dyn CatalogClient>,
	updater: Updater,
}

impl Pipeline {
	pub fn new(config: crate::Config, ledger: Ledger, catalog: Arc<dyn CatalogClient>, extractor: Arc<dyn Extractor>) -> Self {
		let config = Arc::new(config);
		let ledger = Arc::new(ledger);
		let updater = Updater::new(config.clone(), ledger.clone(), catalog.clone(), extractor);
		Self { config, ledger, catalog, updater }
	}

	/// Builds a pipeline using the ledger in the config's data directory, the HTTP catalog and zip extraction.
	pub fn open(config: crate::Config) -> crate::Result<Self> {
		let ledger = Ledger::open(config.ledger_path())?;
		let catalog = Arc::new(HttpCatalog::new(&config)?);
		Ok(Self::new(config, ledger, catalog, Arc::new(ZipExtractor)))
	}

	pub fn config(&self) -> &crate::Config {
		&self.config
	}

	pub fn ledger(&self) -> &Ledger {
		&self.ledger
	}

	pub fn updater(&self) -> &Updater {
		&self.updater
	}

	/// Polls every wanted addon and records the new builds.
	///
	/// Projects are polled concurrently. Each one only asks for builds newer than
	/// the highest build already installed or recorded for it.
	///
	/// # Errors
	/// Only when the watch list itself can't be read. Per-project failures are in the summary.
	pub async fn poll(&self, cancel: &CancellationToken) -> crate::Result<PollSummary> {
		let wanted = self.ledger.list_wanted()?;
		log::trace!("Polling catalog for {} wanted addon(s)", wanted.len());
		let latest = self.ledger.latest_version_per_project()?;
		let filter = self.config.game_version();

		let outcomes: Vec<PollOutcome> = futures::stream::iter(wanted.iter())
			.map(|addon| {
				let observed = latest.get(&addon.project_id).map(|v| v.version_id);
				let known = addon.installed_version_id.max(observed);
				let query = CatalogQuery::for_project(addon.project_id, &self.config);
				async move { poll_project(self.catalog.as_ref(), &query, known, filter, cancel).await }
			})
			.buffer_unordered(self.config.max_concurrent())
			.collect()
			.await;

		let mut summary = PollSummary::default();
		for outcome in outcomes {
			let project_id = outcome.project_id;
			if let Some(e) = outcome.failure {
				summary.failures.push((project_id, e.into()));
				continue;
			}

			let recorded = self.ledger
				.upsert_versions(&outcome.records)
				.and_then(|n| self.ledger.touch_checked(project_id, Utc::now()).map(|_| n));
			match recorded {
				Ok(n) => {
					if n > 0 {
						log::info!("Recorded {} new build(s) for project {}", n, project_id);
					}
					summary.imported.insert(project_id, n);
				},
				Err(e) => {
					log::error!("Couldn't record builds for project {}: {}", project_id, e);
					summary.failures.push((project_id, e.into()));
				},
			}
		}

		Ok(summary)
	}

	/// The install targets for the ledger's current state.
	pub fn reconcile(&self) -> crate::Result<Vec<InstallTarget>> {
		let wanted = self.ledger.list_wanted()?;
		let latest = self.ledger.latest_version_per_project()?;
		Ok(compute_install_targets(&wanted, &latest))
	}

	/// Polls then reconciles.
	pub async fn check_for_updates(&self, cancel: &CancellationToken) -> crate::Result<(PollSummary, Vec<InstallTarget>)> {
		let summary = self.poll(cancel).await?;
		let targets = self.reconcile()?;
		if !targets.is_empty() {
			log::info!("Found new versions for {} addon(s).", targets.len());
		}
		Ok((summary, targets))
	}

	/// Applies targets concurrently, returning one outcome per target ordered by project id.
	pub async fn apply(&self, targets: Vec<InstallTarget>, cancel: &CancellationToken) -> Vec<UpdateOutcome> {
		let mut outcomes: Vec<UpdateOutcome> = futures::stream::iter(targets)
			.map(|target| async move {
				let result = self.updater.apply_target(&target, cancel).await;
				UpdateOutcome { target, result }
			})
			.buffer_unordered(self.config.max_concurrent())
			.collect()
			.await;
		outcomes.sort_by_key(|o| o.target.project_id());
		outcomes
	}

	/// Reconciles then applies every target.
	pub async fn update_all(&self, cancel: &CancellationToken) -> crate::Result<Vec<UpdateOutcome>> {
		let targets = self.reconcile()?;
		Ok(self.apply(targets, cancel).await)
	}
}
