//! Mirror a forge-hosted wiki, with its full edit history, into a local git repository.
//!
//! The pipeline runs in two halves. [`slurp::Slurper`] lists the wiki's pages, fetches each
//! page's history listing and every revision's rendered text through a write-once on-disk
//! cache, and stores the extracted records and text. [`replay::replay_pages`] then turns the
//! stored histories into one commit per revision, oldest first, attributed to the original
//! author and date.

pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod forge;
pub mod history;
pub mod replay;
pub mod runtime;
pub mod slurp;
pub mod store;
pub mod vcs;

pub use error::SlurpError;
