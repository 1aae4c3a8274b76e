pub mod config;

pub use config::{BrainConfig, ServerConfig, StateConfig, StorageConfig};
