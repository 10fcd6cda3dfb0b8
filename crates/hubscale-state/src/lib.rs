//! hubscale-state — durable checkpoint store for the scaling orchestrator.
//!
//! Backed by [redb](https://docs.rs/redb). One record per orchestration
//! instance, keyed by its fixed instance id. The record has a fixed shape
//! (status, execution counter, phase, next wake time), so its size does not
//! grow with the number of cycles executed.
//!
//! # Singleton guarantee
//!
//! redb serializes write transactions, and [`StateStore::start_new`] does
//! its existence check and insert inside one write transaction. Two racing
//! launchers therefore create at most one running instance. Phase changes
//! go through [`StateStore::transition`], a compare-and-set on the
//! execution counter, so a stale driver cannot overwrite a newer execution.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{StartOutcome, StateStore};
pub use types::*;
