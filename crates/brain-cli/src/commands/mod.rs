pub mod legacy;
pub mod serve;
pub mod state;

use brain_core::BrainConfig;
use brain_state::StateStore;

/// Open the store described by the loaded configuration.
pub fn open_store(config: &BrainConfig) -> anyhow::Result<StateStore> {
    Ok(StateStore::with_config(&config.storage)?)
}
