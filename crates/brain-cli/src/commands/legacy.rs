use std::path::Path;

use anyhow::Context;
use brain_core::BrainConfig;
use brain_state::LegacyMemory;
use tracing::info;

use super::open_store;

/// Load a JSON array of legacy records into the legacy table.
pub fn import(config: &BrainConfig, file: &Path) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let records: Vec<LegacyMemory> =
        serde_json::from_str(&content).context("parsing legacy records")?;

    let store = open_store(config)?;
    let count = store.import_legacy(&records)?;
    info!(count, file = %file.display(), "legacy import complete");
    println!("{}", serde_json::json!({ "imported": count }));
    Ok(())
}

pub fn list(config: &BrainConfig, filter: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let memories = store.legacy_memories(filter)?;
    println!("{}", serde_json::to_string_pretty(&memories)?);
    Ok(())
}
