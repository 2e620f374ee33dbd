//! Shared types, error model, and configuration for storypub.
//!
//! This crate is the foundation depended on by all other storypub crates.
//! It provides:
//! - [`StoryPubError`], the unified error type
//! - Domain types ([`StoryFields`], [`RemoteRecord`], [`StoryPayload`], [`PublishResult`])
//! - Configuration ([`AppConfig`], [`HostSettings`], [`resolve_config`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnvSnapshot, HostSecrets, HostSettings, ResolvedConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_config,
};
pub use error::{Result, StoryPubError};
pub use types::{
    MAX_SHORT_DESCRIPTION_CHARS, PayloadExtras, PublishResult, RemoteRecord, StoryFields,
    StoryPayload, truncate_chars,
};
