//! Async locks keyed by value, used to serialize work on the same project or path.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

pub struct KeyedLocks<K> {
	locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
	fn default() -> Self {
		Self { locks: Mutex::new(HashMap::new()) }
	}
}

impl<K: Eq + Hash + Ord + Clone> KeyedLocks<K> {
	fn entry(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
		/* The map is only touched here and the critical section can't panic. */
		let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		/* Holders and waiters keep a clone, so a count of one means the key is idle. */
		locks.retain(|_, lock| Arc::strong_count(lock) > 1);
		locks.entry(key.clone()).or_default().clone()
	}

	#[cfg(test)]
	fn tracked(&self) -> usize {
		self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
	}

	pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
		self.entry(key).lock_owned().await
	}

	/// Locks every key in ascending order so overlapping sets can't deadlock.
	pub async fn lock_all(&self, keys: &BTreeSet<K>) -> Vec<OwnedMutexGuard<()>> {
		let mut guards = Vec::with_capacity(keys.len());
		for key in keys {
			guards.push(self.lock(key).await);
		}
		guards
	}
}
