//! redb table definitions for the hubscale state store.
//!
//! Tables use `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Orchestration checkpoints keyed by `{instance_id}`.
pub const CHECKPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("checkpoints");
