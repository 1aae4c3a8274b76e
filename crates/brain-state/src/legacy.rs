//! Flat legacy memory records.
//!
//! Before namespaced state existed, memories were stored as a single flat
//! table keyed by their raw key, with an optional free-form `type`. The
//! table lives in the same database as the state entries and is the source
//! set for [`StateStore::migrate`](crate::StateStore::migrate).

use redb::{ReadableDatabase, ReadableTable, Table};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, epoch_micros, map_err};
use crate::tables::LEGACY_MEMORIES;
use crate::types::{LegacyMemory, validate_key};

/// Type given to memories stored without one.
pub const DEFAULT_MEMORY_TYPE: &str = "general";

impl StateStore {
    /// Insert or replace a legacy memory, keeping its original `created_at`.
    pub fn remember(&self, key: &str, value: &str, memory_type: &str) -> StateResult<LegacyMemory> {
        validate_key(key)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let memory = {
            let mut table = txn.open_table(LEGACY_MEMORIES).map_err(map_err!(Table))?;
            let now = epoch_micros();
            let created_at = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?.created_at,
                None => now,
            };
            let memory = LegacyMemory {
                key: key.to_string(),
                value: value.to_string(),
                memory_type: Some(memory_type.to_string()),
                metadata: None,
                created_at,
                updated_at: now,
            };
            write_memory(&mut table, &memory)?;
            memory
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, memory_type, "legacy memory stored");
        Ok(memory)
    }

    /// Bulk-load legacy records in one write transaction.
    ///
    /// Existing records with the same key are replaced. Records without
    /// timestamps are stamped with the import time.
    pub fn import_legacy(&self, records: &[LegacyMemory]) -> StateResult<usize> {
        for record in records {
            validate_key(&record.key)?;
        }
        let now = epoch_micros();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LEGACY_MEMORIES).map_err(map_err!(Table))?;
            for record in records {
                let mut record = record.clone();
                if record.created_at == 0 {
                    record.created_at = now;
                }
                if record.updated_at == 0 {
                    record.updated_at = record.created_at;
                }
                write_memory(&mut table, &record)?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(count = records.len(), "legacy memories imported");
        Ok(records.len())
    }

    /// Legacy records in key order, optionally restricted to keys containing
    /// `filter` (case-sensitive).
    pub fn legacy_memories(&self, filter: Option<&str>) -> StateResult<Vec<LegacyMemory>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LEGACY_MEMORIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if filter.is_some_and(|f| !key.value().contains(f)) {
                continue;
            }
            results.push(decode(value.value())?);
        }
        Ok(results)
    }
}

fn write_memory(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    memory: &LegacyMemory,
) -> StateResult<()> {
    let bytes = serde_json::to_vec(memory).map_err(map_err!(Serialize))?;
    table
        .insert(memory.key.as_str(), bytes.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

pub(crate) fn decode(bytes: &[u8]) -> StateResult<LegacyMemory> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}
