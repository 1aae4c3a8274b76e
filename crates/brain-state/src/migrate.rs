//! Migration of flat legacy memories into namespaced state entries.
//!
//! Each legacy record lands in a namespace derived from its `type` and key
//! (see [`derive_namespace`]). Applying a migration is best-effort: every
//! record gets its own write transaction, a failing record is noted in the
//! report and the rest carry on. Migrated entries start a fresh lineage at
//! version 1, replacing whatever already sat at the same identity.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, WriteTables, map_err};
use crate::types::*;

/// Key prefixes that override a legacy record's type.
const PREFIX_NAMESPACES: [Category; 3] = [Category::Project, Category::Config, Category::Session];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrateOptions {
    /// Report what would happen without writing anything.
    pub dry_run: bool,
    /// Only consider legacy keys containing this substring (case-sensitive).
    pub filter: Option<String>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        MigrateOptions {
            dry_run: true,
            filter: None,
        }
    }
}

/// What happened to one legacy record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    WouldMigrate,
    Migrated,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationItem {
    pub namespace: String,
    pub key: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationReport {
    pub dry_run: bool,
    /// Legacy records matching the filter.
    pub considered: usize,
    /// Records migrated (or, in a dry run, that would be).
    pub migrated: usize,
    pub items: Vec<MigrationItem>,
}

impl MigrationReport {
    pub fn failures(&self) -> impl Iterator<Item = &MigrationItem> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Failed { .. }))
    }
}

/// Namespace a legacy record migrates into.
///
/// Defaults to the record's type, or `general` when it has none. A key whose
/// first `_`-delimited segment is exactly `project`, `config` or `session`
/// goes to that namespace instead.
pub fn derive_namespace(key: &str, memory_type: Option<&str>) -> String {
    if let Some((head, _)) = key.split_once('_') {
        if let Some(category) = PREFIX_NAMESPACES.iter().find(|c| c.as_str() == head) {
            return category.as_str().to_string();
        }
    }
    match memory_type {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => GENERAL_NAMESPACE.to_string(),
    }
}

/// Legacy metadata is JSON object text; anything else cannot be carried over.
fn parse_legacy_metadata(raw: Option<&str>) -> StateResult<Metadata> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Metadata::new()),
        Some(text) => serde_json::from_str::<Metadata>(text).map_err(|e| {
            StateError::InvalidArgument(format!("legacy metadata is not a JSON object: {e}"))
        }),
    }
}

/// Everything needed to write one legacy record, computed before any write.
fn prepare(memory: &LegacyMemory, namespace: &str) -> StateResult<Metadata> {
    validate_namespace(namespace)?;
    validate_key(&memory.key)?;
    let mut metadata = parse_legacy_metadata(memory.metadata.as_deref())?;
    metadata.insert("migrated".to_string(), json!(true));
    if let Some(memory_type) = &memory.memory_type {
        metadata.insert("legacy_type".to_string(), json!(memory_type));
    }
    Ok(metadata)
}

impl StateStore {
    /// Import legacy memories into the namespaced store.
    pub fn migrate(&self, options: &MigrateOptions) -> StateResult<MigrationReport> {
        let memories = self.legacy_memories(options.filter.as_deref())?;
        let mut report = MigrationReport {
            dry_run: options.dry_run,
            considered: memories.len(),
            migrated: 0,
            items: Vec::with_capacity(memories.len()),
        };

        for memory in &memories {
            let namespace = derive_namespace(&memory.key, memory.memory_type.as_deref());
            let result = prepare(memory, &namespace).and_then(|metadata| {
                if options.dry_run {
                    Ok(ItemOutcome::WouldMigrate)
                } else {
                    self.migrate_one(memory, &namespace, metadata)
                        .map(|()| ItemOutcome::Migrated)
                }
            });
            let outcome = match result {
                Ok(outcome) => {
                    report.migrated += 1;
                    outcome
                }
                Err(e) => {
                    warn!(key = %memory.key, %namespace, error = %e, "legacy memory not migrated");
                    ItemOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            report.items.push(MigrationItem {
                namespace,
                key: memory.key.clone(),
                outcome,
            });
        }

        info!(
            dry_run = options.dry_run,
            considered = report.considered,
            migrated = report.migrated,
            "legacy migration finished"
        );
        Ok(report)
    }

    fn migrate_one(&self, memory: &LegacyMemory, namespace: &str, metadata: Metadata) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut tables = WriteTables::open(&txn)?;
            tables.replace_fresh(namespace, &memory.key, &memory.value, metadata, self.writer())?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key = %memory.key, %namespace, "legacy memory migrated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn legacy(key: &str, memory_type: Option<&str>, metadata: Option<&str>) -> LegacyMemory {
        LegacyMemory {
            key: key.to_string(),
            value: format!("value of {key}"),
            memory_type: memory_type.map(str::to_string),
            metadata: metadata.map(str::to_string),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn seeded_store() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        store
            .import_legacy(&[
                legacy("project_alpha_status", None, None),
                legacy("notes", Some("pattern"), None),
                legacy("config_theme", Some("general"), Some(r#"{"source":"ui"}"#)),
                legacy("session_token", None, None),
                legacy("projectx_plan", None, None),
                legacy("user_preferences", Some("general"), None),
            ])
            .unwrap();
        store
    }

    // ── Namespace derivation ───────────────────────────────────────

    #[test]
    fn derive_namespace_rules() {
        assert_eq!(derive_namespace("project_alpha_status", None), "project");
        assert_eq!(derive_namespace("notes", Some("pattern")), "pattern");
        assert_eq!(derive_namespace("notes", None), "general");
        assert_eq!(derive_namespace("notes", Some("")), "general");
        assert_eq!(derive_namespace("config_x", Some("pattern")), "config");
        assert_eq!(derive_namespace("session_1", None), "session");
        // Only exact first segments override.
        assert_eq!(derive_namespace("projectx_plan", None), "general");
        assert_eq!(derive_namespace("Project_alpha", None), "general");
        // Only project/config/session are recognized as prefixes.
        assert_eq!(derive_namespace("cache_item", Some("pattern")), "pattern");
        // A bare word without an underscore is not a prefix.
        assert_eq!(derive_namespace("project", Some("pattern")), "pattern");
    }

    // ── Dry run ────────────────────────────────────────────────────

    #[test]
    fn dry_run_never_mutates() {
        let store = seeded_store();
        store.set("system", "existing", "v").unwrap();
        let before = store.list(&Scope::All, 1000).unwrap();

        let report = store.migrate(&MigrateOptions::default()).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.considered, 6);
        assert_eq!(report.migrated, 6);
        assert!(report
            .items
            .iter()
            .all(|i| i.outcome == ItemOutcome::WouldMigrate));
        assert_eq!(store.list(&Scope::All, 1000).unwrap(), before);
    }

    #[test]
    fn dry_run_lists_derived_pairs() {
        let store = seeded_store();
        let report = store
            .migrate(&MigrateOptions {
                dry_run: true,
                filter: Some("alpha".to_string()),
            })
            .unwrap();

        assert_eq!(report.considered, 1);
        assert_eq!(report.items[0].namespace, "project");
        assert_eq!(report.items[0].key, "project_alpha_status");
    }

    // ── Apply ──────────────────────────────────────────────────────

    #[test]
    fn apply_migrates_into_derived_namespaces() {
        let store = seeded_store();
        let report = store
            .migrate(&MigrateOptions {
                dry_run: false,
                filter: None,
            })
            .unwrap();

        assert_eq!(report.migrated, 6);
        assert_eq!(report.failures().count(), 0);

        let entry = store
            .get(&Scope::namespace("project"), "project_alpha_status")
            .unwrap();
        assert_eq!(entry.value, "value of project_alpha_status");
        assert_eq!(entry.version, 1);

        let notes = store.get(&Scope::namespace("pattern"), "notes").unwrap();
        assert_eq!(notes.metadata["legacy_type"], "pattern");
        assert_eq!(notes.metadata["migrated"], true);

        let theme = store.get(&Scope::namespace("config"), "config_theme").unwrap();
        assert_eq!(theme.metadata["source"], "ui");
        assert_eq!(theme.metadata["original_key"], "config_theme");

        assert!(store.get(&Scope::namespace("general"), "projectx_plan").is_ok());
        assert!(store.get(&Scope::namespace("session"), "session_token").is_ok());
    }

    #[test]
    fn apply_resets_existing_lineage() {
        let store = seeded_store();
        store.set("pattern", "notes", "a").unwrap();
        store.set("pattern", "notes", "b").unwrap();
        store.set("pattern", "notes", "c").unwrap();

        store
            .migrate(&MigrateOptions {
                dry_run: false,
                filter: Some("notes".to_string()),
            })
            .unwrap();

        let entry = store.get(&Scope::namespace("pattern"), "notes").unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(entry.value, "value of notes");
        // Exactly one row for the identity, in both indexes.
        assert_eq!(store.list(&Scope::namespace("pattern"), 100).unwrap().len(), 1);

        // A later set continues the fresh lineage.
        assert_eq!(store.set("pattern", "notes", "d").unwrap().version, 2);
    }

    #[test]
    fn apply_is_repeatable() {
        let store = seeded_store();
        let options = MigrateOptions {
            dry_run: false,
            filter: None,
        };
        store.migrate(&options).unwrap();
        let report = store.migrate(&options).unwrap();

        assert_eq!(report.migrated, 6);
        assert_eq!(store.list(&Scope::All, 1000).unwrap().len(), 6);
    }

    #[test]
    fn per_item_failures_do_not_abort() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .import_legacy(&[
                legacy("a_ok", None, None),
                legacy("b_bad_meta", None, Some("[1, 2]")),
                legacy("c_bad_type", Some("has space"), None),
                legacy("d_ok", Some("pattern"), None),
            ])
            .unwrap();

        let report = store
            .migrate(&MigrateOptions {
                dry_run: false,
                filter: None,
            })
            .unwrap();

        assert_eq!(report.considered, 4);
        assert_eq!(report.migrated, 2);
        let failed: Vec<_> = report.failures().map(|i| i.key.as_str()).collect();
        assert_eq!(failed, vec!["b_bad_meta", "c_bad_type"]);
        assert!(store.get(&Scope::namespace("general"), "a_ok").is_ok());
        assert!(store.get(&Scope::namespace("pattern"), "d_ok").is_ok());

        let err = store.get(&Scope::All, "b_bad_meta").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn selector_types_are_not_migrated() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .import_legacy(&[
                legacy("everything", Some("all"), None),
                legacy("whatever", Some("any"), None),
            ])
            .unwrap();

        let report = store
            .migrate(&MigrateOptions {
                dry_run: false,
                filter: None,
            })
            .unwrap();

        assert_eq!(report.migrated, 0);
        assert_eq!(report.failures().count(), 2);
        assert!(store.list(&Scope::All, 10).unwrap().is_empty());
    }

    #[test]
    fn dry_run_previews_failures() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .import_legacy(&[legacy("x", None, Some("not json"))])
            .unwrap();

        let report = store.migrate(&MigrateOptions::default()).unwrap();
        assert_eq!(report.migrated, 0);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn report_serializes_outcome_inline() {
        let item = MigrationItem {
            namespace: "general".to_string(),
            key: "k".to_string(),
            outcome: ItemOutcome::Failed {
                reason: "boom".to_string(),
            },
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"], "boom");
        assert_eq!(value["namespace"], "general");
    }
}
