//! The command surface offered to callers of the state store.
//!
//! Every way in (REST routes, the command envelope, the CLI) builds a
//! [`Command`] and hands it to [`execute`]. Arguments use the wire names of
//! the command table (`dryRun`, `deletedCount`, ...); store types keep their
//! own field names.

use brain_core::StateConfig;
use brain_state::legacy::DEFAULT_MEMORY_TYPE;
use brain_state::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_write_category() -> String {
    Category::System.as_str().to_string()
}

fn default_read_category() -> String {
    "any".to_string()
}

fn default_list_category() -> String {
    "all".to_string()
}

fn default_clear_category() -> String {
    Category::Cache.as_str().to_string()
}

fn default_memory_type() -> String {
    DEFAULT_MEMORY_TYPE.to_string()
}

fn default_true() -> bool {
    true
}

/// A single call against the store, tagged by its command name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", content = "args")]
pub enum Command {
    #[serde(rename = "state.set")]
    Set(SetArgs),
    #[serde(rename = "state.get")]
    Get(GetArgs),
    #[serde(rename = "state.list")]
    List(ListArgs),
    #[serde(rename = "state.delete")]
    Delete(DeleteArgs),
    #[serde(rename = "state.clear")]
    Clear(ClearArgs),
    #[serde(rename = "state.transaction")]
    Transaction(TransactionArgs),
    #[serde(rename = "state.migrate")]
    Migrate(MigrateArgs),
    #[serde(rename = "state.stats")]
    Stats,
    #[serde(rename = "memory.remember")]
    Remember(RememberArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set(_) => "state.set",
            Command::Get(_) => "state.get",
            Command::List(_) => "state.list",
            Command::Delete(_) => "state.delete",
            Command::Clear(_) => "state.clear",
            Command::Transaction(_) => "state.transaction",
            Command::Migrate(_) => "state.migrate",
            Command::Stats => "state.stats",
            Command::Remember(_) => "memory.remember",
        }
    }
}

// ── Arguments ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetArgs {
    pub key: String,
    /// Strings are stored verbatim; any other JSON value is stored as its JSON text.
    pub value: Value,
    #[serde(default = "default_write_category")]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetArgs {
    pub key: String,
    #[serde(default = "default_read_category")]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListArgs {
    #[serde(default = "default_list_category")]
    pub category: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Default for ListArgs {
    fn default() -> Self {
        ListArgs {
            category: default_list_category(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteArgs {
    pub key: String,
    #[serde(default = "default_write_category")]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearArgs {
    #[serde(default = "default_clear_category")]
    pub category: String,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionArgs {
    pub operations: Vec<OperationArgs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationArgs {
    pub action: OpAction,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default = "default_write_category")]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateArgs {
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for MigrateArgs {
    fn default() -> Self {
        MigrateArgs {
            dry_run: true,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberArgs {
    pub key: String,
    pub value: Value,
    #[serde(rename = "type", default = "default_memory_type")]
    pub memory_type: String,
}

// ── Outputs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetOutput {
    pub key: String,
    pub category: String,
    pub version: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteOutput {
    pub key: String,
    pub category: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClearOutput {
    pub category: String,
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionOutput {
    pub operations: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<OpOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrateOutput {
    pub dry_run: bool,
    pub considered_count: usize,
    pub migrated_count: usize,
    pub per_item_notes: Vec<MigrationItem>,
}

/// Result of a successfully executed [`Command`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CommandOutput {
    Set(SetOutput),
    Entry(StateEntry),
    Entries(Vec<StateEntry>),
    Deleted(DeleteOutput),
    Cleared(ClearOutput),
    Transaction(TransactionOutput),
    Migration(MigrateOutput),
    Stats(StoreStats),
    Remembered(LegacyMemory),
}

// ── Dispatch ───────────────────────────────────────────────────────

/// Stored form of a caller-supplied value.
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_ops(operations: &[OperationArgs]) -> StateResult<Vec<StateOp>> {
    operations
        .iter()
        .enumerate()
        .map(|(index, op)| match op.action {
            OpAction::Set => {
                let value = op.value.as_ref().ok_or_else(|| {
                    StateError::InvalidArgument(format!(
                        "operation {index}: set '{}' requires a value",
                        op.key
                    ))
                })?;
                Ok(StateOp::set(&op.category, &op.key, encode_value(value)))
            }
            OpAction::Delete => Ok(StateOp::delete(&op.category, &op.key)),
        })
        .collect()
}

/// Commands may write to the fixed categories, `general`, or a namespace
/// that already holds entries (a migrated legacy type, for instance).
fn check_write_namespace(store: &StateStore, namespace: &str) -> StateResult<()> {
    validate_namespace(namespace)?;
    if namespace.parse::<Category>().is_ok()
        || namespace == GENERAL_NAMESPACE
        || store.has_namespace(namespace)?
    {
        return Ok(());
    }
    Err(StateError::InvalidArgument(format!(
        "unknown category '{namespace}'"
    )))
}

/// Run `command` against `store`. Blocks on storage I/O.
pub fn execute(store: &StateStore, limits: &StateConfig, command: Command) -> StateResult<CommandOutput> {
    match command {
        Command::Set(args) => {
            check_write_namespace(store, &args.category)?;
            let receipt = store.set(&args.category, &args.key, &encode_value(&args.value))?;
            Ok(CommandOutput::Set(SetOutput {
                key: receipt.key,
                category: receipt.namespace,
                version: receipt.version,
                created_at: receipt.created_at,
                updated_at: receipt.updated_at,
            }))
        }
        Command::Get(args) => {
            let scope = Scope::parse(&args.category)?;
            Ok(CommandOutput::Entry(store.get(&scope, &args.key)?))
        }
        Command::List(args) => {
            let scope = Scope::parse(&args.category)?;
            let limit = limits.clamp_limit(args.limit);
            Ok(CommandOutput::Entries(store.list(&scope, limit)?))
        }
        Command::Delete(args) => {
            check_write_namespace(store, &args.category)?;
            let deleted = store.delete(&args.category, &args.key)?;
            Ok(CommandOutput::Deleted(DeleteOutput {
                key: args.key,
                category: args.category,
                deleted,
            }))
        }
        Command::Clear(args) => {
            let deleted_count = store.clear_category(&args.category, args.confirm)?;
            Ok(CommandOutput::Cleared(ClearOutput {
                category: args.category,
                deleted_count,
            }))
        }
        Command::Transaction(args) => {
            for op in &args.operations {
                check_write_namespace(store, &op.category)?;
            }
            let ops = to_ops(&args.operations)?;
            let results = store.transaction(&ops)?;
            let succeeded = results.iter().filter(|r| r.success).count();
            Ok(CommandOutput::Transaction(TransactionOutput {
                operations: results.len(),
                succeeded,
                failed: results.len() - succeeded,
                results,
            }))
        }
        Command::Migrate(args) => {
            let report = store.migrate(&MigrateOptions {
                dry_run: args.dry_run,
                filter: args.filter,
            })?;
            Ok(CommandOutput::Migration(MigrateOutput {
                dry_run: report.dry_run,
                considered_count: report.considered,
                migrated_count: report.migrated,
                per_item_notes: report.items,
            }))
        }
        Command::Stats => Ok(CommandOutput::Stats(store.stats()?)),
        Command::Remember(args) => {
            let memory = store.remember(&args.key, &encode_value(&args.value), &args.memory_type)?;
            Ok(CommandOutput::Remembered(memory))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(store: &StateStore, command: Value) -> StateResult<CommandOutput> {
        let command: Command = serde_json::from_value(command).unwrap();
        execute(store, &StateConfig::default(), command)
    }

    #[test]
    fn set_defaults_to_system_and_encodes_json() {
        let store = StateStore::open_in_memory().unwrap();
        let out = run(
            &store,
            json!({"command": "state.set", "args": {"key": "prefs", "value": {"theme": "dark"}}}),
        )
        .unwrap();

        let CommandOutput::Set(set) = out else { panic!("unexpected output") };
        assert_eq!(set.category, "system");
        assert_eq!(set.version, 1);

        let entry = store.get(&Scope::namespace("system"), "prefs").unwrap();
        assert_eq!(entry.value, r#"{"theme":"dark"}"#);
    }

    #[test]
    fn writes_reject_unknown_categories() {
        let store = StateStore::open_in_memory().unwrap();
        for category in ["sytem", "all", "any"] {
            let err = run(
                &store,
                json!({"command": "state.set", "args": {"key": "k", "value": "v", "category": category}}),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }

        let err = run(
            &store,
            json!({"command": "state.delete", "args": {"key": "k", "category": "sytem"}}),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = run(
            &store,
            json!({"command": "state.transaction", "args": {"operations": [
                {"action": "set", "key": "a", "value": 1},
                {"action": "set", "key": "b", "value": 2, "category": "sytem"}
            ]}}),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(store.list(&Scope::All, 10).unwrap().is_empty());
    }

    #[test]
    fn writes_accept_general_and_migrated_namespaces() {
        let store = StateStore::open_in_memory().unwrap();
        run(
            &store,
            json!({"command": "state.set", "args": {"key": "k", "value": "v", "category": "general"}}),
        )
        .unwrap();

        run(
            &store,
            json!({"command": "memory.remember", "args": {"key": "notes", "value": "n", "type": "pattern"}}),
        )
        .unwrap();
        run(&store, json!({"command": "state.migrate", "args": {"dryRun": false}})).unwrap();

        let out = run(
            &store,
            json!({"command": "state.set", "args": {"key": "notes", "value": "n2", "category": "pattern"}}),
        )
        .unwrap();
        let CommandOutput::Set(set) = out else { panic!("unexpected output") };
        assert_eq!(set.category, "pattern");
        assert_eq!(set.version, 2);
    }

    #[test]
    fn string_values_are_stored_verbatim() {
        assert_eq!(encode_value(&json!("plain")), "plain");
        assert_eq!(encode_value(&json!(42)), "42");
        assert_eq!(encode_value(&json!([1, "a"])), r#"[1,"a"]"#);
    }

    #[test]
    fn get_defaults_to_any() {
        let store = StateStore::open_in_memory().unwrap();
        store.set("project", "alpha", "v").unwrap();

        let out = run(&store, json!({"command": "state.get", "args": {"key": "alpha"}})).unwrap();
        let CommandOutput::Entry(entry) = out else { panic!("unexpected output") };
        assert_eq!(entry.namespace, "project");
    }

    #[test]
    fn list_clamps_limit() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.set("cache", &format!("k{i}"), "v").unwrap();
        }
        let limits = StateConfig {
            default_list_limit: 2,
            max_list_limit: 3,
        };

        let out = execute(&store, &limits, Command::List(ListArgs::default())).unwrap();
        let CommandOutput::Entries(entries) = out else { panic!("unexpected output") };
        assert_eq!(entries.len(), 2);

        let args = ListArgs {
            category: "cache".to_string(),
            limit: Some(100),
        };
        let out = execute(&store, &limits, Command::List(args)).unwrap();
        let CommandOutput::Entries(entries) = out else { panic!("unexpected output") };
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn delete_reports_missing_as_false() {
        let store = StateStore::open_in_memory().unwrap();
        let out = run(&store, json!({"command": "state.delete", "args": {"key": "ghost"}})).unwrap();
        let value = serde_json::to_value(out).unwrap();
        assert_eq!(value, json!({"key": "ghost", "category": "system", "deleted": false}));
    }

    #[test]
    fn clear_without_confirm_is_precondition_failed() {
        let store = StateStore::open_in_memory().unwrap();
        store.set("cache", "k", "v").unwrap();
        let err = run(&store, json!({"command": "state.clear", "args": {}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let out = run(
            &store,
            json!({"command": "state.clear", "args": {"category": "cache", "confirm": true}}),
        )
        .unwrap();
        let value = serde_json::to_value(out).unwrap();
        assert_eq!(value["deletedCount"], 1);
    }

    #[test]
    fn transaction_reports_per_op_success() {
        let store = StateStore::open_in_memory().unwrap();
        let out = run(
            &store,
            json!({"command": "state.transaction", "args": {"operations": [
                {"action": "set", "key": "a", "value": 1},
                {"action": "set", "key": "b", "value": "two", "category": "project"},
                {"action": "delete", "key": "nope"}
            ]}}),
        )
        .unwrap();

        let CommandOutput::Transaction(txn) = out else { panic!("unexpected output") };
        assert_eq!(txn.operations, 3);
        assert_eq!(txn.succeeded, 2);
        assert_eq!(txn.failed, 1);
        assert_eq!(store.get(&Scope::namespace("system"), "a").unwrap().value, "1");
    }

    #[test]
    fn transaction_set_without_value_is_rejected_before_writing() {
        let store = StateStore::open_in_memory().unwrap();
        let err = run(
            &store,
            json!({"command": "state.transaction", "args": {"operations": [
                {"action": "set", "key": "a", "value": 1},
                {"action": "set", "key": "b"}
            ]}}),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(store.get(&Scope::All, "a").is_err());
    }

    #[test]
    fn migrate_defaults_to_dry_run() {
        let store = StateStore::open_in_memory().unwrap();
        run(
            &store,
            json!({"command": "memory.remember", "args": {"key": "project_alpha_status", "value": "green"}}),
        )
        .unwrap();

        let out = run(&store, json!({"command": "state.migrate", "args": {}})).unwrap();
        let value = serde_json::to_value(out).unwrap();
        assert_eq!(value["dryRun"], true);
        assert_eq!(value["consideredCount"], 1);
        assert_eq!(value["migratedCount"], 1);
        assert_eq!(value["perItemNotes"][0]["namespace"], "project");
        assert!(store.list(&Scope::All, 10).unwrap().is_empty());
    }

    #[test]
    fn stats_takes_no_arguments() {
        let store = StateStore::open_in_memory().unwrap();
        let out = run(&store, json!({"command": "state.stats"})).unwrap();
        assert!(matches!(out, CommandOutput::Stats(_)));
    }

    #[test]
    fn unknown_command_does_not_parse() {
        let parsed = serde_json::from_value::<Command>(json!({"command": "state.nuke", "args": {}}));
        assert!(parsed.is_err());
    }
}
