//! redb table definitions for the Brain state store.
//!
//! Entry rows use `&str` keys of the form `{namespace}/{key}` and `&[u8]`
//! values (JSON-serialized [`StateEntry`](crate::types::StateEntry)).

use redb::{MultimapTableDefinition, TableDefinition};

/// State entries keyed by `{namespace}/{key}`.
pub const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("state_entries");

/// Listing index keyed by `(updated_at, {namespace}/{key})`.
pub const BY_UPDATED: TableDefinition<(u64, &str), ()> = TableDefinition::new("state_by_updated");

/// Per-namespace listing index keyed by `(namespace, updated_at, key)`.
pub const BY_NAMESPACE_UPDATED: TableDefinition<(&str, u64, &str), ()> =
    TableDefinition::new("state_by_namespace_updated");

/// Bare key -> every namespace holding that key.
pub const KEY_NAMESPACES: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("state_key_namespaces");

/// Store bookkeeping (clock watermark).
pub const META: TableDefinition<&str, u64> = TableDefinition::new("state_meta");

/// Flat legacy memory records keyed by their original key.
pub const LEGACY_MEMORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("legacy_memories");

/// `META` key holding the last timestamp handed out by the store.
pub const CLOCK_KEY: &str = "clock";
