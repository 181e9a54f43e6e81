//! Getting a build from the catalog into the target directory.
//!
//! An install runs fetch, extract and commit in that order. The ledger only
//! changes in the last step so an interrupted install is always safe to retry.

pub mod download;
pub mod content;
pub mod updater;

mod locks;
pub use locks::KeyedLocks;

pub use updater::{Updater, UpdateError};
