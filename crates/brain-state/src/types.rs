//! Domain types for the Brain state store.
//!
//! These types represent persisted state entries, the outcome of writes and
//! batched operations, and the flat legacy records that predate namespacing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{StateError, StateResult};

/// Auxiliary per-entry bookkeeping.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Namespace that receives legacy records without a usable type.
pub const GENERAL_NAMESPACE: &str = "general";

/// Longest namespace accepted by the store, in bytes.
pub const MAX_NAMESPACE_LEN: usize = 64;

/// Read selectors meaning "every namespace"; never valid as a namespace.
pub const RESERVED_SELECTORS: [&str; 2] = ["any", "all"];

// ── Categories ────────────────────────────────────────────────────

/// The well-known namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    System,
    Project,
    Config,
    Cache,
    Session,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::System,
        Category::Project,
        Category::Config,
        Category::Cache,
        Category::Session,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Project => "project",
            Category::Config => "config",
            Category::Cache => "cache",
            Category::Session => "session",
        }
    }

    /// Volatile categories are the only ones that may be bulk-cleared.
    pub fn is_volatile(&self) -> bool {
        matches!(self, Category::Cache | Category::Session)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StateError::InvalidArgument(format!("unknown category '{s}'")))
    }
}

// ── Scope ─────────────────────────────────────────────────────────

/// Which namespaces a read considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every namespace (`"any"` for lookups, `"all"` for listings).
    All,
    Namespace(String),
}

impl Scope {
    /// Parse a caller-supplied selector. `"any"` and `"all"` select every namespace.
    pub fn parse(selector: &str) -> StateResult<Self> {
        match selector {
            s if RESERVED_SELECTORS.contains(&s) => Ok(Scope::All),
            ns => {
                validate_namespace(ns)?;
                Ok(Scope::Namespace(ns.to_string()))
            }
        }
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Scope::Namespace(namespace.into())
    }
}

impl From<Category> for Scope {
    fn from(category: Category) -> Self {
        Scope::Namespace(category.as_str().to_string())
    }
}

// ── Entries ───────────────────────────────────────────────────────

/// A single versioned entry, identified by `(namespace, key)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateEntry {
    pub namespace: String,
    pub key: String,
    /// Opaque payload. Callers own its encoding.
    pub value: String,
    /// 1 on creation, +1 on every write.
    pub version: u64,
    /// Unix timestamp (microseconds) of the first insertion.
    pub created_at: u64,
    /// Unix timestamp (microseconds) of the latest write.
    pub updated_at: u64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StateEntry {
    /// Build the composite key for the entries table.
    pub fn table_key(&self) -> String {
        entry_key(&self.namespace, &self.key)
    }
}

/// Composite key `{namespace}/{key}`.
pub fn entry_key(namespace: &str, key: &str) -> String {
    format!("{namespace}/{key}")
}

/// What a successful `set` reports back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriteReceipt {
    pub namespace: String,
    pub key: String,
    pub version: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<&StateEntry> for WriteReceipt {
    fn from(entry: &StateEntry) -> Self {
        WriteReceipt {
            namespace: entry.namespace.clone(),
            key: entry.key.clone(),
            version: entry.version,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

// ── Transactions ──────────────────────────────────────────────────

/// One step of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StateOp {
    Set {
        namespace: String,
        key: String,
        value: String,
    },
    Delete {
        namespace: String,
        key: String,
    },
}

impl StateOp {
    pub fn set(namespace: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        StateOp::Set {
            namespace: namespace.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        StateOp::Delete {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    pub fn action(&self) -> OpAction {
        match self {
            StateOp::Set { .. } => OpAction::Set,
            StateOp::Delete { .. } => OpAction::Delete,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            StateOp::Set { namespace, .. } | StateOp::Delete { namespace, .. } => namespace,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            StateOp::Set { key, .. } | StateOp::Delete { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpAction {
    Set,
    Delete,
}

impl fmt::Display for OpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpAction::Set => f.write_str("set"),
            OpAction::Delete => f.write_str("delete"),
        }
    }
}

/// Per-operation result of a committed batch.
///
/// `success` is false only for a delete whose key did not exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpOutcome {
    pub action: OpAction,
    pub namespace: String,
    pub key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

// ── Legacy records ────────────────────────────────────────────────

/// A flat, un-namespaced memory record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyMemory {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<String>,
    /// Raw JSON text, as the legacy table stored it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

// ── Stats ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    pub total_entries: u64,
    /// Entry count per namespace, in namespace order.
    pub namespaces: BTreeMap<String, u64>,
    pub legacy_memories: u64,
    /// Legacy record count per type; untyped records count as `general`.
    pub legacy_types: BTreeMap<String, u64>,
}

// ── Validation ────────────────────────────────────────────────────

pub fn validate_key(key: &str) -> StateResult<()> {
    if key.is_empty() {
        return Err(StateError::InvalidArgument("key must not be empty".to_string()));
    }
    Ok(())
}

pub fn validate_namespace(namespace: &str) -> StateResult<()> {
    if namespace.is_empty() {
        return Err(StateError::InvalidArgument(
            "namespace must not be empty".to_string(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(StateError::InvalidArgument(format!(
            "namespace longer than {MAX_NAMESPACE_LEN} bytes"
        )));
    }
    if RESERVED_SELECTORS.contains(&namespace) {
        return Err(StateError::InvalidArgument(format!(
            "'{namespace}' is a reserved selector, not a namespace"
        )));
    }
    if namespace.contains('/') || namespace.chars().any(char::is_whitespace) {
        return Err(StateError::InvalidArgument(format!(
            "namespace '{namespace}' contains '/' or whitespace"
        )));
    }
    Ok(())
}
