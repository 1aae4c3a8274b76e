//! StateStore: redb-backed versioned state persistence for Brain.
//!
//! Provides point reads/writes, newest-first listing, deletion, bulk
//! clearing of volatile categories and atomic multi-operation batches over
//! namespaced entries. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use brain_core::StorageConfig;
use redb::{
    Database, MultimapTable, ReadableDatabase, ReadableMultimapTable, ReadableTable, Table,
    WriteTransaction,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}
pub(crate) use map_err;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    pub(crate) db: Arc<Database>,
    writer: Arc<str>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        Self::with_config(&StorageConfig {
            path: Some(path.to_path_buf()),
            ..Default::default()
        })
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        Self::with_config(&StorageConfig::in_memory())
    }

    /// Open the store described by `config`.
    pub fn with_config(config: &StorageConfig) -> StateResult<Self> {
        let db = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
                }
                Database::create(path).map_err(map_err!(Open))?
            }
            None => {
                let backend = redb::backends::InMemoryBackend::new();
                Database::builder()
                    .create_with_backend(backend)
                    .map_err(map_err!(Open))?
            }
        };
        let store = Self {
            db: Arc::new(db),
            writer: Arc::from(config.writer.as_str()),
        };
        store.ensure_tables()?;
        debug!(path = ?config.path, writer = %config.writer, "state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        WriteTables::open(&txn)?;
        txn.open_table(LEGACY_MEMORIES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Name recorded as `updated_by` on every write.
    pub fn writer(&self) -> &str {
        &self.writer
    }

    // ── Point operations ───────────────────────────────────────────

    /// Insert or update an entry.
    ///
    /// A new entry starts at version 1; an existing one keeps its
    /// `created_at` and moves to `version + 1`. Every call bumps the version,
    /// even when the value is unchanged.
    pub fn set(&self, namespace: &str, key: &str, value: &str) -> StateResult<WriteReceipt> {
        validate_namespace(namespace)?;
        validate_key(key)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let entry = {
            let mut tables = WriteTables::open(&txn)?;
            tables.upsert(namespace, key, value, &self.writer)?
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%namespace, %key, version = entry.version, "state entry written");
        Ok(WriteReceipt::from(&entry))
    }

    /// Fetch an entry.
    ///
    /// With [`Scope::All`] every namespace holding `key` is considered and the
    /// most recently updated match wins. Equal `updated_at` values resolve to
    /// the lexicographically smallest namespace.
    pub fn get(&self, scope: &Scope, key: &str) -> StateResult<StateEntry> {
        validate_key(key)?;

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let entries = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        let found = match scope {
            Scope::Namespace(ns) => read_entry(&entries, &entry_key(ns, key))?,
            Scope::All => {
                let index = txn
                    .open_multimap_table(KEY_NAMESPACES)
                    .map_err(map_err!(Table))?;
                let mut best: Option<StateEntry> = None;
                // Namespaces come back in ascending order.
                for ns in index.get(key).map_err(map_err!(Read))? {
                    let ns = ns.map_err(map_err!(Read))?;
                    let Some(entry) = read_entry(&entries, &entry_key(ns.value(), key))? else {
                        continue;
                    };
                    if best.as_ref().is_none_or(|b| entry.updated_at > b.updated_at) {
                        best = Some(entry);
                    }
                }
                best
            }
        };

        found.ok_or_else(|| match scope {
            Scope::All => StateError::NotFound(format!("state entry '{key}'")),
            Scope::Namespace(ns) => StateError::NotFound(format!("state entry '{ns}/{key}'")),
        })
    }

    /// List entries newest first, at most `limit` of them.
    ///
    /// A namespace scope walks only that namespace's slice of the time index.
    pub fn list(&self, scope: &Scope, limit: usize) -> StateResult<Vec<StateEntry>> {
        let mut results = Vec::new();
        if limit == 0 {
            return Ok(results);
        }

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let entries = txn.open_table(ENTRIES).map_err(map_err!(Table))?;

        match scope {
            Scope::All => {
                let by_updated = txn.open_table(BY_UPDATED).map_err(map_err!(Table))?;
                for item in by_updated.iter().map_err(map_err!(Read))?.rev() {
                    let (index_key, _) = item.map_err(map_err!(Read))?;
                    let (_, table_key) = index_key.value();
                    if let Some(entry) = read_entry(&entries, table_key)? {
                        results.push(entry);
                        if results.len() >= limit {
                            break;
                        }
                    }
                }
            }
            Scope::Namespace(ns) => {
                let by_namespace = txn
                    .open_table(BY_NAMESPACE_UPDATED)
                    .map_err(map_err!(Table))?;
                let range = (ns.as_str(), 0u64, "")..(ns.as_str(), u64::MAX, "");
                for item in by_namespace.range(range).map_err(map_err!(Read))?.rev() {
                    let (index_key, _) = item.map_err(map_err!(Read))?;
                    let (_, _, key) = index_key.value();
                    if let Some(entry) = read_entry(&entries, &entry_key(ns, key))? {
                        results.push(entry);
                        if results.len() >= limit {
                            break;
                        }
                    }
                }
            }
        }
        Ok(results)
    }

    /// Whether any live entry is stored under `namespace`.
    pub fn has_namespace(&self, namespace: &str) -> StateResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let by_namespace = txn
            .open_table(BY_NAMESPACE_UPDATED)
            .map_err(map_err!(Table))?;
        let mut range = by_namespace
            .range((namespace, 0u64, "")..(namespace, u64::MAX, ""))
            .map_err(map_err!(Read))?;
        Ok(range.next().transpose().map_err(map_err!(Read))?.is_some())
    }

    /// Delete an entry. Returns true if it existed.
    pub fn delete(&self, namespace: &str, key: &str) -> StateResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed = {
            let mut tables = WriteTables::open(&txn)?;
            tables.remove(namespace, key)?
        };
        txn.commit().map_err(map_err!(Transaction))?;
        let existed = removed.is_some();
        debug!(%namespace, %key, existed, "state entry deleted");
        Ok(existed)
    }

    // ── Bulk operations ────────────────────────────────────────────

    /// Delete every entry of a volatile category. Returns number deleted.
    ///
    /// Refuses to run without `confirmed`, and refuses any category other
    /// than `cache` and `session`.
    pub fn clear_category(&self, category: &str, confirmed: bool) -> StateResult<u64> {
        if !confirmed {
            return Err(StateError::PreconditionFailed(
                "set confirm to true to clear state entries".to_string(),
            ));
        }
        let category = category
            .parse::<Category>()
            .ok()
            .filter(Category::is_volatile)
            .ok_or_else(|| {
                StateError::InvalidArgument(format!(
                    "only cache and session categories can be cleared, got '{category}'"
                ))
            })?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = {
            let mut tables = WriteTables::open(&txn)?;
            let victims = tables.scan_namespace(category.as_str())?;
            for entry in &victims {
                tables.remove(&entry.namespace, &entry.key)?;
            }
            victims.len() as u64
        };
        txn.commit().map_err(map_err!(Transaction))?;
        info!(%category, deleted = count, "state category cleared");
        Ok(count)
    }

    /// Apply `ops` in order inside one write transaction.
    ///
    /// Later operations observe earlier ones. If any operation fails the
    /// whole batch is rolled back and `TransactionFailed` is returned.
    pub fn transaction(&self, ops: &[StateOp]) -> StateResult<Vec<OpOutcome>> {
        if ops.is_empty() {
            return Err(StateError::InvalidArgument(
                "no operations provided".to_string(),
            ));
        }

        let txn = self
            .db
            .begin_write()
            .map_err(|e| StateError::TransactionFailed(format!("begin: {e}")))?;
        match self.apply_ops(&txn, ops) {
            Ok(outcomes) => {
                txn.commit()
                    .map_err(|e| StateError::TransactionFailed(format!("commit: {e}")))?;
                debug!(ops = ops.len(), "state transaction committed");
                Ok(outcomes)
            }
            Err(e) => {
                warn!(error = %e, "state transaction rolled back");
                txn.abort()
                    .map_err(|e| StateError::TransactionFailed(format!("abort: {e}")))?;
                Err(e)
            }
        }
    }

    fn apply_ops(&self, txn: &WriteTransaction, ops: &[StateOp]) -> StateResult<Vec<OpOutcome>> {
        let mut tables =
            WriteTables::open(txn).map_err(|e| StateError::TransactionFailed(e.to_string()))?;
        let mut outcomes = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            let outcome = tables.apply(op, &self.writer).map_err(|e| {
                StateError::TransactionFailed(format!(
                    "operation {index} ({} {}/{}): {e}",
                    op.action(),
                    op.namespace(),
                    op.key()
                ))
            })?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Entry counts per namespace plus legacy record counts per type.
    pub fn stats(&self) -> StateResult<StoreStats> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let entries = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        let legacy = txn.open_table(LEGACY_MEMORIES).map_err(map_err!(Table))?;

        let mut stats = StoreStats::default();
        for item in entries.iter().map_err(map_err!(Read))? {
            let (key, _) = item.map_err(map_err!(Read))?;
            if let Some((namespace, _)) = key.value().split_once('/') {
                *stats.namespaces.entry(namespace.to_string()).or_default() += 1;
                stats.total_entries += 1;
            }
        }
        for item in legacy.iter().map_err(map_err!(Read))? {
            let (_, value) = item.map_err(map_err!(Read))?;
            let memory = crate::legacy::decode(value.value())?;
            let memory_type = memory
                .memory_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| GENERAL_NAMESPACE.to_string());
            *stats.legacy_types.entry(memory_type).or_default() += 1;
            stats.legacy_memories += 1;
        }
        Ok(stats)
    }
}

/// Read and decode one entry by composite key.
fn read_entry(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    table_key: &str,
) -> StateResult<Option<StateEntry>> {
    match table.get(table_key).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn decode(bytes: &[u8]) -> StateResult<StateEntry> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

pub(crate) fn epoch_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Write the bookkeeping fields every entry carries in its metadata.
fn stamp_metadata(entry: &mut StateEntry, writer: &str) {
    entry
        .metadata
        .insert("category".to_string(), json!(entry.namespace));
    entry
        .metadata
        .insert("original_key".to_string(), json!(entry.key));
    entry
        .metadata
        .insert("updated_by".to_string(), json!(writer));
    entry
        .metadata
        .insert("version".to_string(), json!(entry.version));
}

// ── Write path ─────────────────────────────────────────────────────

/// All state tables opened inside one write transaction.
///
/// Every mutation goes through here so the primary row and its indexes
/// change together.
pub(crate) struct WriteTables<'txn> {
    entries: Table<'txn, &'static str, &'static [u8]>,
    by_updated: Table<'txn, (u64, &'static str), ()>,
    by_namespace: Table<'txn, (&'static str, u64, &'static str), ()>,
    key_namespaces: MultimapTable<'txn, &'static str, &'static str>,
    meta: Table<'txn, &'static str, u64>,
}

impl<'txn> WriteTables<'txn> {
    pub(crate) fn open(txn: &'txn WriteTransaction) -> StateResult<Self> {
        Ok(Self {
            entries: txn.open_table(ENTRIES).map_err(map_err!(Table))?,
            by_updated: txn.open_table(BY_UPDATED).map_err(map_err!(Table))?,
            by_namespace: txn
                .open_table(BY_NAMESPACE_UPDATED)
                .map_err(map_err!(Table))?,
            key_namespaces: txn
                .open_multimap_table(KEY_NAMESPACES)
                .map_err(map_err!(Table))?,
            meta: txn.open_table(META).map_err(map_err!(Table))?,
        })
    }

    /// Next store timestamp: wall clock, but strictly after the last one issued.
    pub(crate) fn tick(&mut self) -> StateResult<u64> {
        let last = self
            .meta
            .get(CLOCK_KEY)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let now = epoch_micros().max(last + 1);
        self.meta.insert(CLOCK_KEY, now).map_err(map_err!(Write))?;
        Ok(now)
    }

    pub(crate) fn load(&self, namespace: &str, key: &str) -> StateResult<Option<StateEntry>> {
        read_entry(&self.entries, &entry_key(namespace, key))
    }

    /// Write `entry`, replacing `previous` (its current row, if any) in the indexes.
    pub(crate) fn put(&mut self, entry: &StateEntry, previous: Option<&StateEntry>) -> StateResult<()> {
        let table_key = entry.table_key();
        if let Some(prev) = previous {
            self.by_updated
                .remove((prev.updated_at, table_key.as_str()))
                .map_err(map_err!(Write))?;
            self.by_namespace
                .remove((prev.namespace.as_str(), prev.updated_at, prev.key.as_str()))
                .map_err(map_err!(Write))?;
        }
        let bytes = serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
        self.entries
            .insert(table_key.as_str(), bytes.as_slice())
            .map_err(map_err!(Write))?;
        self.by_updated
            .insert((entry.updated_at, table_key.as_str()), ())
            .map_err(map_err!(Write))?;
        self.by_namespace
            .insert(
                (entry.namespace.as_str(), entry.updated_at, entry.key.as_str()),
                (),
            )
            .map_err(map_err!(Write))?;
        self.key_namespaces
            .insert(entry.key.as_str(), entry.namespace.as_str())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    /// Versioned insert-or-update.
    pub(crate) fn upsert(
        &mut self,
        namespace: &str,
        key: &str,
        value: &str,
        writer: &str,
    ) -> StateResult<StateEntry> {
        let now = self.tick()?;
        let previous = self.load(namespace, key)?;
        let mut entry = match &previous {
            Some(prev) => StateEntry {
                value: value.to_string(),
                version: prev.version + 1,
                updated_at: now,
                ..prev.clone()
            },
            None => StateEntry {
                namespace: namespace.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
                metadata: Metadata::new(),
            },
        };
        stamp_metadata(&mut entry, writer);
        self.put(&entry, previous.as_ref())?;
        Ok(entry)
    }

    /// Replace whatever is stored at the entry's identity with a fresh
    /// version-1 lineage.
    pub(crate) fn replace_fresh(
        &mut self,
        namespace: &str,
        key: &str,
        value: &str,
        metadata: Metadata,
        writer: &str,
    ) -> StateResult<StateEntry> {
        let now = self.tick()?;
        let previous = self.load(namespace, key)?;
        let mut entry = StateEntry {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            metadata,
        };
        stamp_metadata(&mut entry, writer);
        self.put(&entry, previous.as_ref())?;
        Ok(entry)
    }

    pub(crate) fn remove(&mut self, namespace: &str, key: &str) -> StateResult<Option<StateEntry>> {
        let table_key = entry_key(namespace, key);
        let removed = match self
            .entries
            .remove(table_key.as_str())
            .map_err(map_err!(Write))?
        {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        if let Some(entry) = &removed {
            self.by_updated
                .remove((entry.updated_at, table_key.as_str()))
                .map_err(map_err!(Write))?;
            self.by_namespace
                .remove((namespace, entry.updated_at, key))
                .map_err(map_err!(Write))?;
            self.key_namespaces
                .remove(key, namespace)
                .map_err(map_err!(Write))?;
        }
        Ok(removed)
    }

    /// Every entry in `namespace`, in key order.
    pub(crate) fn scan_namespace(&self, namespace: &str) -> StateResult<Vec<StateEntry>> {
        let prefix = format!("{namespace}/");
        let mut found = Vec::new();
        for item in self
            .entries
            .range(prefix.as_str()..)
            .map_err(map_err!(Read))?
        {
            let (key, value) = item.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            found.push(decode(value.value())?);
        }
        Ok(found)
    }

    fn apply(&mut self, op: &StateOp, writer: &str) -> StateResult<OpOutcome> {
        validate_namespace(op.namespace())?;
        validate_key(op.key())?;
        match op {
            StateOp::Set {
                namespace,
                key,
                value,
            } => {
                let entry = self.upsert(namespace, key, value, writer)?;
                Ok(OpOutcome {
                    action: OpAction::Set,
                    namespace: namespace.clone(),
                    key: key.clone(),
                    success: true,
                    version: Some(entry.version),
                })
            }
            StateOp::Delete { namespace, key } => {
                let removed = self.remove(namespace, key)?;
                Ok(OpOutcome {
                    action: OpAction::Delete,
                    namespace: namespace.clone(),
                    key: key.clone(),
                    success: removed.is_some(),
                    version: None,
                })
            }
        }
    }
}
