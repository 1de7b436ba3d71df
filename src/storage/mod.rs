//! Storage Module
//!
//! SQLite-backed persistent tier: file setup and recovery, the single-writer
//! actor, and the tier API used by the fetch pipeline and the pruner.

mod db;
mod persistent;
mod writer;

pub use db::{remove_store_files, SCHEMA_VERSION};
pub use persistent::{BatchOutcome, PersistentOptions, PersistentTier};
