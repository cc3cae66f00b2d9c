//! Configuration file management.

mod manager;

pub use manager::{
    ConfigFile, ConfigManager, EncycloConfig, ProviderOverride, ResolveOptions, ResolvedConfig,
    WikiOverride, resolve_config,
};
