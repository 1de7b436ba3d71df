//! Background Tasks Module
//!
//! Periodic work that runs alongside the fetch pipeline.
//!
//! # Tasks
//! - Pruning: Removes persisted entries older than their retention horizon

mod prune;

pub use prune::{prune_once, spawn_prune_task, PruneReport, PruneSettings};
