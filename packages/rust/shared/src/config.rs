//! Application configuration for storypub.
//!
//! User config lives at `~/.storypub/storypub.toml`. Settings and secrets
//! supplied by the host (CLI flags, plugin runtime) override environment
//! variables; [`resolve_config`] merges both once, before any I/O.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoryPubError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "storypub.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".storypub";

/// Environment variable names consulted when the host leaves a value unset.
pub const ENV_INSTANCE: &str = "SN_INSTANCE";
pub const ENV_USERNAME: &str = "SN_USERNAME";
pub const ENV_PASSWORD: &str = "SN_PASSWORD";
pub const ENV_SEND_AS_HTML: &str = "SN_SEND_AS_HTML";
pub const ENV_UPDATE_IF_EXISTS: &str = "SN_UPDATE_IF_EXISTS";

// ---------------------------------------------------------------------------
// Config structs (matching storypub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// ServiceNow connection settings.
    #[serde(default)]
    pub servicenow: HostSettings,
}

/// Non-secret settings supplied by the host. `None` falls back to the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSettings {
    /// Instance URL, e.g. `https://acme.service-now.com` (UI paths are fine).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Render description and acceptance criteria to HTML (default on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_as_html: Option<bool>,

    /// Update a matching story in place instead of skipping it (default on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_if_exists: Option<bool>,
}

/// Credentials supplied by the host. Never written to the config file.
#[derive(Clone, Default)]
pub struct HostSecrets {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for HostSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSecrets")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Environment snapshot
// ---------------------------------------------------------------------------

/// An immutable copy of the environment variables storypub reads.
///
/// Values are trimmed; empty values are treated as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the relevant variables from the current process environment.
    pub fn from_process() -> Self {
        Self::from_pairs(
            [
                ENV_INSTANCE,
                ENV_USERNAME,
                ENV_PASSWORD,
                ENV_SEND_AS_HTML,
                ENV_UPDATE_IF_EXISTS,
            ]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok().map(|val| (key.to_string(), val))),
        )
    }

    /// Build a snapshot from explicit key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
    {
        let vars = pairs
            .into_iter()
            .filter_map(|(k, v)| {
                let v = v.as_ref().trim();
                (!v.is_empty()).then(|| (k.into(), v.to_string()))
            })
            .collect();
        Self { vars }
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key).map(|raw| parse_bool(key, raw)).transpose()
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoryPubError::config(format!(
            "{key} must be a boolean (true/false), got {raw:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Fully merged configuration for one publish run.
#[derive(Clone)]
pub struct ResolvedConfig {
    /// Raw instance value; normalized by the record store client.
    pub instance: String,
    pub username: String,
    pub password: String,
    pub send_as_html: bool,
    pub update_if_exists: bool,
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("instance", &self.instance)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("send_as_html", &self.send_as_html)
            .field("update_if_exists", &self.update_if_exists)
            .finish()
    }
}

/// Merge host settings and secrets over the environment snapshot.
///
/// Fails with [`StoryPubError::MissingInstanceUrl`] when no instance is set
/// anywhere and [`StoryPubError::MissingInput`] when a credential is missing.
pub fn resolve_config(
    settings: &HostSettings,
    secrets: &HostSecrets,
    env: &EnvSnapshot,
) -> Result<ResolvedConfig> {
    let instance = pick(settings.instance.as_deref(), env.get(ENV_INSTANCE))
        .ok_or(StoryPubError::MissingInstanceUrl)?;
    let username = pick(secrets.username.as_deref(), env.get(ENV_USERNAME))
        .ok_or_else(|| StoryPubError::missing_input(format!("username (set {ENV_USERNAME})")))?;
    let password = pick_verbatim(secrets.password.as_deref(), env.get(ENV_PASSWORD))
        .ok_or_else(|| StoryPubError::missing_input(format!("password (set {ENV_PASSWORD})")))?;

    let send_as_html = match settings.send_as_html {
        Some(v) => v,
        None => env.get_bool(ENV_SEND_AS_HTML)?.unwrap_or(true),
    };
    let update_if_exists = match settings.update_if_exists {
        Some(v) => v,
        None => env.get_bool(ENV_UPDATE_IF_EXISTS)?.unwrap_or(true),
    };

    Ok(ResolvedConfig {
        instance,
        username,
        password,
        send_as_html,
        update_if_exists,
    })
}

/// First non-blank of host value, then environment value.
fn pick(host: Option<&str>, env: Option<&str>) -> Option<String> {
    host.map(str::trim)
        .filter(|v| !v.is_empty())
        .or(env)
        .map(String::from)
}

/// Like [`pick`], but a non-empty host value is used untrimmed.
fn pick_verbatim(host: Option<&str>, env: Option<&str>) -> Option<String> {
    host.filter(|v| !v.is_empty()).or(env).map(String::from)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.storypub/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StoryPubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.storypub/storypub.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StoryPubError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| StoryPubError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StoryPubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig {
        servicenow: HostSettings {
            instance: None,
            send_as_html: Some(true),
            update_if_exists: Some(true),
        },
    };
    let content =
        toml::to_string_pretty(&config).map_err(|e| StoryPubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StoryPubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
