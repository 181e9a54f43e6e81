//! Keeps a watch list of game addons up to date from a remote catalog.
//!
//! The [`Ledger`] records what is wanted and every build seen, the [`catalog`]
//! finds new builds, the [`reconciler`] picks which to install and the
//! [`installation`] module installs them.

pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod ledger;
pub use ledger::Ledger;

pub mod catalog;
pub mod reconciler;
pub mod installation;

pub mod pipeline;
pub use pipeline::Pipeline;
