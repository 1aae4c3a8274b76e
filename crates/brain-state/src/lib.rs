//! brain-state: versioned, namespaced state store for Brain.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage of key/value entries grouped into namespaces (categories). Every
//! entry carries a per-entry version counter, creation/update timestamps and
//! a metadata map.
//!
//! # Architecture
//!
//! Entries are JSON-serialized into redb's `&[u8]` value columns under the
//! composite key `{namespace}/{key}`, which makes a namespace a contiguous
//! key range. Two secondary indexes are kept in lockstep inside the same
//! write transaction as the primary row:
//!
//! - `(updated_at, {namespace}/{key})` for newest-first listing
//! - `key -> namespace` (multimap) for lookups across all namespaces
//!
//! redb admits one write transaction at a time, so the read-increment-write
//! of an entry's version can never interleave with another writer.
//!
//! The flat legacy memories table and the adapter that migrates it into
//! namespaced entries live in [`legacy`] and [`migrate`].
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads and async tasks.

pub mod error;
pub mod legacy;
pub mod migrate;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{ErrorKind, StateError, StateResult};
pub use migrate::{ItemOutcome, MigrateOptions, MigrationItem, MigrationReport, derive_namespace};
pub use store::StateStore;
pub use types::*;
