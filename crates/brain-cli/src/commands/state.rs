use std::io::Read;

use anyhow::Context;
use brain_api::commands::TransactionArgs;
use brain_api::{Command, execute};
use brain_core::BrainConfig;
use tracing::debug;

use super::open_store;

/// Run one store command and print its JSON result.
pub fn run(config: &BrainConfig, command: Command) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let name = command.name();
    debug!(command = name, "running command");
    match execute(&store, &config.state, command) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            let kind = serde_json::to_value(e.kind())?;
            let kind = kind.as_str().unwrap_or("error");
            anyhow::bail!("{name} failed ({kind}): {e}")
        }
    }
}

/// Parse a transaction batch from a file, or stdin for "-".
pub fn read_transaction(source: &str) -> anyhow::Result<TransactionArgs> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))?
    };
    serde_json::from_str(&content).context("parsing transaction operations")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_transaction_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.json");
        std::fs::write(
            &path,
            r#"{"operations": [{"action": "set", "key": "a", "value": 1}, {"action": "delete", "key": "a"}]}"#,
        )
        .unwrap();

        let args = read_transaction(path.to_str().unwrap()).unwrap();
        assert_eq!(args.operations.len(), 2);
        assert_eq!(args.operations[0].category, "system");
    }

    #[test]
    fn run_against_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BrainConfig::default();
        config.storage.path = Some(dir.path().join("state.redb"));

        let set: Command = serde_json::from_value(serde_json::json!({
            "command": "state.set", "args": {"key": "k", "value": "v"}
        }))
        .unwrap();
        run(&config, set).unwrap();

        let get: Command = serde_json::from_value(serde_json::json!({
            "command": "state.get", "args": {"key": "k", "category": "system"}
        }))
        .unwrap();
        run(&config, get).unwrap();

        let missing: Command = serde_json::from_value(serde_json::json!({
            "command": "state.get", "args": {"key": "nope"}
        }))
        .unwrap();
        let err = run(&config, missing).unwrap_err();
        assert!(err.to_string().contains("not_found"));
    }
}
