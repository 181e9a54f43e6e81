use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use addon_sync::installation::content::{ContentError, Extractor, ZipExtractor};
use addon_sync::{Ledger, Pipeline};
use addon_sync_test_utils::*;
use tokio_util::sync::CancellationToken;

fn pipeline(env: &TestEnv, catalog: &Arc<MockCatalog>) -> Pipeline {
	let _ = env_logger::builder().is_test(true).try_init();
	Pipeline::new(env.config.clone(), Ledger::open_in_memory().unwrap(), catalog.clone(), Arc::new(ZipExtractor))
}

#[tokio::test]
async fn first_install_of_new_addon() {
	let env = TestEnv::new();
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(42, "Reverse Engineering").unwrap();
	catalog.set_page(42, vec![build(100, true), build(101, false)]);
	catalog.set_artifact(42, 100, zip_archive(&[("ReverseEngineering/ReverseEngineering.toc", b"## Title: RE")]));

	let (summary, targets) = pipeline.check_for_updates(&cancel).await.unwrap();
	assert!(summary.failures.is_empty());
	assert_eq!(summary.imported.get(&42), Some(&1));
	assert_eq!(targets.len(), 1);
	assert_eq!(targets[0].project_id(), 42);
	assert_eq!(targets[0].version.version_id, 100);
	assert_eq!(targets[0].version.matched_game_version, "11.0.2");

	let outcomes = pipeline.apply(targets, &cancel).await;
	assert_eq!(outcomes.len(), 1);
	assert!(outcomes[0].result.is_ok());

	let addon = pipeline.ledger().get_wanted(42).unwrap();
	assert_eq!(addon.installed_version_id, Some(100));
	assert!(addon.last_checked.is_some());
	assert!(env.target_dir().join("ReverseEngineering/ReverseEngineering.toc").exists());
	assert!(!env.download_dir().join("42").join("Addon-100.zip").exists());

	assert!(pipeline.reconcile().unwrap().is_empty());
}

#[tokio::test]
async fn upgrade_only_picks_the_newer_build() {
	let env = TestEnv::new();
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(7, "Details").unwrap();
	catalog.set_page(7, vec![build(50, true)]);
	pipeline.poll(&cancel).await.unwrap();
	pipeline.ledger().mark_installed(7, 50, chrono::Utc::now()).unwrap();

	catalog.set_page(7, vec![build(50, true), build(55, true)]);
	let (summary, targets) = pipeline.check_for_updates(&cancel).await.unwrap();
	assert_eq!(summary.imported.get(&7), Some(&1));
	assert_eq!(targets.len(), 1);
	assert_eq!(targets[0].version.version_id, 55);
	assert_eq!(targets[0].addon.installed_version_id, Some(50));
}

#[tokio::test]
async fn overlapping_polls_store_the_union() {
	let env = TestEnv::new();
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(1, "Overlap").unwrap();
	catalog.set_page(1, vec![build(100, true), build(101, true)]);
	pipeline.poll(&cancel).await.unwrap();
	catalog.set_page(1, vec![build(100, true), build(101, true), build(102, true)]);
	pipeline.poll(&cancel).await.unwrap();

	let ids: Vec<_> = pipeline.ledger().versions_for_project(1).unwrap().iter().map(|v| v.version_id).collect();
	assert_eq!(ids, vec![100, 101, 102]);
}

#[tokio::test]
async fn builds_for_other_game_versions_are_ignored() {
	let env = TestEnv::new();
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(3, "Classic Only").unwrap();
	catalog.set_page(3, vec![build_for(300, true, &[(67408, "1.15.2"), (73246, "4.4.0")])]);

	let (summary, targets) = pipeline.check_for_updates(&cancel).await.unwrap();
	assert!(summary.failures.is_empty());
	assert_eq!(summary.total_imported(), 0);
	assert!(targets.is_empty());
	assert!(pipeline.ledger().versions_for_project(3).unwrap().is_empty());
}

#[tokio::test]
async fn poll_asks_with_configured_page_and_known_version() {
	let mut env = TestEnv::new();
	env.config.set_page_size(20);
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(5, "Paged").unwrap();
	catalog.set_page(5, vec![build(10, true), build(11, true)]);
	pipeline.poll(&cancel).await.unwrap();

	/* A later page reporting an older build must not bring it back. */
	catalog.set_page(5, vec![build(9, true), build(11, true)]);
	let summary = pipeline.poll(&cancel).await.unwrap();
	assert_eq!(summary.imported.get(&5), Some(&0));

	let queries = catalog.queries();
	assert_eq!(queries.len(), 2);
	assert!(queries.iter().all(|q| q.page_size == 20 && q.page_index == 0 && q.exclude_prerelease));
	let ids: Vec<_> = pipeline.ledger().versions_for_project(5).unwrap().iter().map(|v| v.version_id).collect();
	assert_eq!(ids, vec![10, 11]);
}

#[tokio::test]
async fn installed_version_never_decreases() {
	let env = TestEnv::new();
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(8, "Monotonic").unwrap();
	for id in [10, 20, 30, 40] {
		catalog.set_artifact(8, id, zip_archive(&[("Monotonic/Monotonic.toc", format!("{}", id).as_bytes())]));
	}

	let pages = vec![vec![20], vec![10, 20], vec![30], vec![10], vec![40, 30]];
	let mut previous = None;
	for page in pages {
		catalog.set_page(8, page.into_iter().map(|id| build(id, true)).collect());
		pipeline.poll(&cancel).await.unwrap();
		for outcome in pipeline.update_all(&cancel).await.unwrap() {
			assert!(outcome.result.is_ok(), "{:?}", outcome.result);
		}
		let installed = pipeline.ledger().get_wanted(8).unwrap().installed_version_id;
		assert!(installed >= previous, "{:?} went below {:?}", installed, previous);
		previous = installed;
	}

	assert_eq!(previous, Some(40));
	assert_eq!(std::fs::read_to_string(env.target_dir().join("Monotonic/Monotonic.toc")).unwrap(), "40");
}

#[tokio::test]
async fn applying_the_same_target_twice_installs_once() {
	let env = TestEnv::new();
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(42, "Once").unwrap();
	catalog.set_page(42, vec![build(100, true)]);
	catalog.set_artifact(42, 100, zip_archive(&[("Once/Once.toc", b"once")]));

	let (_, targets) = pipeline.check_for_updates(&cancel).await.unwrap();
	let twice = vec![targets[0].clone(), targets[0].clone()];
	let outcomes = pipeline.apply(twice, &cancel).await;

	assert!(outcomes.iter().all(|o| o.result.is_ok()));
	assert_eq!(catalog.fetches(), vec![(42, 100)]);
	assert_eq!(pipeline.ledger().get_wanted(42).unwrap().installed_version_id, Some(100));
}

#[tokio::test]
async fn installs_for_several_addons_run_together() {
	let mut env = TestEnv::new();
	env.config.set_max_concurrent(3);
	let catalog = Arc::new(MockCatalog::new());
	let pipeline = pipeline(&env, &catalog);
	let cancel = CancellationToken::new();

	for project in 1..=5 {
		pipeline.ledger().add_wanted(project, &format!("Addon {}", project)).unwrap();
		let version = project * 100;
		catalog.set_page(project, vec![build(version, true)]);
		let folder = format!("Addon{}/Addon{}.toc", project, project);
		catalog.set_artifact(project, version, zip_archive(&[(folder.as_str(), b"toc")]));
	}

	let (_, targets) = pipeline.check_for_updates(&cancel).await.unwrap();
	let outcomes = pipeline.update_all(&cancel).await.unwrap();
	assert_eq!(targets.len(), 5);
	let ids: Vec<_> = outcomes.iter().map(|o| o.target.project_id()).collect();
	assert_eq!(ids, vec![1, 2, 3, 4, 5]);

	for project in 1..=5 {
		assert!(env.target_dir().join(format!("Addon{}/Addon{}.toc", project, project)).exists());
		assert_eq!(pipeline.ledger().get_wanted(project).unwrap().installed_version_id, Some(project * 100));
	}
}

/// Zip extraction that records how many extractions were running at once.
#[derive(Default)]
struct OverlapExtractor {
	running: AtomicUsize,
	most_running: AtomicUsize,
	calls: AtomicUsize,
}

impl Extractor for OverlapExtractor {
	fn install_roots(&self, archive: &Path) -> Result<BTreeSet<PathBuf>, ContentError> {
		ZipExtractor.install_roots(archive)
	}

	fn extract(&self, archive: &Path, destination: &Path) -> Result<(), ContentError> {
		let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
		self.most_running.fetch_max(now, Ordering::SeqCst);
		self.calls.fetch_add(1, Ordering::SeqCst);
		std::thread::sleep(Duration::from_millis(100));
		let result = ZipExtractor.extract(archive, destination);
		self.running.fetch_sub(1, Ordering::SeqCst);
		result
	}
}

#[tokio::test]
async fn installs_sharing_a_folder_extract_one_at_a_time() {
	let _ = env_logger::builder().is_test(true).try_init();
	let env = TestEnv::new();
	let catalog = Arc::new(MockCatalog::new());
	let extractor = Arc::new(OverlapExtractor::default());
	let pipeline = Pipeline::new(env.config.clone(), Ledger::open_in_memory().unwrap(), catalog.clone(), extractor.clone());
	let cancel = CancellationToken::new();

	pipeline.ledger().add_wanted(1, "First").unwrap();
	pipeline.ledger().add_wanted(2, "Second").unwrap();
	catalog.set_page(1, vec![build(10, true)]);
	catalog.set_page(2, vec![build(20, true)]);
	catalog.set_artifact(1, 10, zip_archive(&[("First/First.toc", b"1"), ("SharedLib/lib.lua", b"first")]));
	catalog.set_artifact(2, 20, zip_archive(&[("Second/Second.toc", b"2"), ("./SharedLib/lib.lua", b"second")]));

	let (_, targets) = pipeline.check_for_updates(&cancel).await.unwrap();
	assert_eq!(targets.len(), 2);
	let outcomes = pipeline.apply(targets, &cancel).await;
	assert!(outcomes.iter().all(|o| o.result.is_ok()));

	assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
	assert_eq!(extractor.most_running.load(Ordering::SeqCst), 1);
	assert!(env.target_dir().join("First/First.toc").exists());
	assert!(env.target_dir().join("Second/Second.toc").exists());
	assert!(env.target_dir().join("SharedLib/lib.lua").exists());
}
