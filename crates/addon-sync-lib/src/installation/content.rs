//! Build archive extraction.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::KeyedLocks;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
	/// An entry would be written outside the destination directory.
	#[error("archive entry escapes the destination: {0}")]
	UnsafePath(String),
	/// The extraction task panicked or was aborted.
	#[error("extraction task failed: {0}")]
	Interrupted(String),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
}

/// Unpacks a staged archive into a directory.
pub trait Extractor: Send + Sync {
	/// The top level paths, relative to the destination, the archive will write to.
	fn install_roots(&self, archive: &Path) -> Result<BTreeSet<PathBuf>, ContentError>;
	fn extract(&self, archive: &Path, destination: &Path) -> Result<(), ContentError>;
}

/// Extracts zip archives. Entries that would land outside the destination are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
	fn install_roots(&self, archive: &Path) -> Result<BTreeSet<PathBuf>, ContentError> {
		let mut zip = zip::ZipArchive::new(std::fs::File::open(archive)?)?;
		let mut roots = BTreeSet::new();
		for i in 0..zip.len() {
			let entry = zip.by_index(i)?;
			let path = entry.enclosed_name().ok_or_else(|| ContentError::UnsafePath(entry.name().to_string()))?;
			if let Some(root) = normalized_root(path) {
				roots.insert(root);
			}
		}
		Ok(roots)
	}

	fn extract(&self, archive: &Path, destination: &Path) -> Result<(), ContentError> {
		let mut zip = zip::ZipArchive::new(std::fs::File::open(archive)?)?;
		std::fs::create_dir_all(destination)?;
		zip.extract(destination)?;
		Ok(())
	}
}

/// First directory an entry lands in once `.` and `..` are resolved.
fn normalized_root(path: &Path) -> Option<PathBuf> {
	let mut parts = Vec::new();
	for component in path.components() {
		match component {
			Component::Normal(part) => parts.push(part),
			Component::ParentDir => { parts.pop(); },
			_ => {},
		}
	}
	parts.first().map(PathBuf::from)
}

/// Extracts `archive` into `destination` on the blocking pool.
///
/// Holds a lock on every top level path the archive writes for the duration,
/// so archives sharing a path never extract at the same time.
pub async fn extract_archive(extractor: Arc<dyn Extractor>, archive: PathBuf, destination: PathBuf, locks: &KeyedLocks<PathBuf>) -> Result<(), ContentError> {
	let roots = {
		let extractor = extractor.clone();
		let archive = archive.clone();
		tokio::task::spawn_blocking(move || extractor.install_roots(&archive))
			.await
			.map_err(|e| ContentError::Interrupted(e.to_string()))??
	};

	let keys = roots.iter().map(|r| destination.join(r)).collect::<BTreeSet<_>>();
	let _guards = locks.lock_all(&keys).await;

	log::info!("Extracting {} into {}", archive.display(), destination.display());
	tokio::task::spawn_blocking(move || extractor.extract(&archive, &destination))
		.await
		.map_err(|e| ContentError::Interrupted(e.to_string()))?
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
		let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
		for (name, data) in files {
			zip.start_file(*name, zip::write::FileOptions::default()).unwrap();
			zip.write_all(data).unwrap();
		}
		zip.finish().unwrap();
	}

	#[test]
	fn roots_are_top_level_entries() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("a.zip");
		write_zip(&archive, &[
			("AddonA/AddonA.toc", b"toc"),
			("AddonA/core.lua", b"lua"),
			("AddonA_Options/options.lua", b"lua"),
		]);
		let roots = ZipExtractor.install_roots(&archive).unwrap();
		assert_eq!(roots, [PathBuf::from("AddonA"), PathBuf::from("AddonA_Options")].into_iter().collect());
	}

	#[test]
	fn roots_follow_dot_components() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("a.zip");
		write_zip(&archive, &[
			("./AddonA/a.lua", b"a"),
			("AddonB/../Shared/s.lua", b"s"),
		]);
		let roots = ZipExtractor.install_roots(&archive).unwrap();
		assert_eq!(roots, [PathBuf::from("AddonA"), PathBuf::from("Shared")].into_iter().collect());

		let target = dir.path().join("AddOns");
		ZipExtractor.extract(&archive, &target).unwrap();
		assert!(target.join("Shared/s.lua").exists());
		assert!(target.join("AddonA/a.lua").exists());
	}

	#[test]
	fn extracts_into_destination() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("a.zip");
		write_zip(&archive, &[("AddonA/AddonA.toc", b"## Title: A")]);
		let target = dir.path().join("AddOns");
		ZipExtractor.extract(&archive, &target).unwrap();
		assert_eq!(std::fs::read(target.join("AddonA/AddonA.toc")).unwrap(), b"## Title: A");
	}

	#[test]
	fn corrupt_archive_fails() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("bad.zip");
		std::fs::write(&archive, b"definitely not a zip").unwrap();
		assert!(matches!(ZipExtractor.extract(&archive, dir.path()), Err(ContentError::Zip(_))));
	}

	#[test]
	fn traversal_entries_are_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("evil.zip");
		write_zip(&archive, &[("../escape.txt", b"x")]);
		assert!(matches!(ZipExtractor.install_roots(&archive), Err(ContentError::UnsafePath(_))));
	}

	#[tokio::test]
	async fn extract_archive_runs_off_the_runtime() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("a.zip");
		write_zip(&archive, &[("AddonA/a.lua", b"a")]);
		let target = dir.path().join("AddOns");
		let locks = KeyedLocks::default();
		extract_archive(Arc::new(ZipExtractor), archive, target.clone(), &locks).await.unwrap();
		assert!(target.join("AddonA/a.lua").exists());
	}
}
