//! Application configuration for repodoc.
//!
//! User config lives at `~/.repodoc/repodoc.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RepoDocError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "repodoc.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".repodoc";

// ---------------------------------------------------------------------------
// Config structs (matching repodoc.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Snapshot root and materialization strategy.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Source-control host API settings.
    #[serde(default)]
    pub host: HostConfig,

    /// Freshness state location.
    #[serde(default)]
    pub freshness: FreshnessConfig,

    /// Optional object storage backend.
    #[serde(default)]
    pub object_storage: ObjectStorageConfig,
}

/// How snapshots are populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaterializeStrategy {
    /// Clone from the host and check out the commit.
    #[default]
    Clone,
    /// Copy from a local fixture directory.
    Fixture,
}

/// `[snapshot]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Directory under which snapshots are materialized.
    #[serde(default = "default_snapshot_root")]
    pub root: String,

    /// Materialization strategy.
    #[serde(default)]
    pub strategy: MaterializeStrategy,

    /// Fixture directory for the `fixture` strategy.
    #[serde(default)]
    pub fixture_root: Option<String>,

    /// Base URL repositories are cloned from.
    #[serde(default = "default_clone_base_url")]
    pub clone_base_url: String,

    /// Git executable used by the `clone` strategy.
    #[serde(default = "default_git_bin")]
    pub git_bin: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root: default_snapshot_root(),
            strategy: MaterializeStrategy::default(),
            fixture_root: None,
            clone_base_url: default_clone_base_url(),
            git_bin: default_git_bin(),
        }
    }
}

fn default_snapshot_root() -> String {
    "var/snapshots".into()
}
fn default_clone_base_url() -> String {
    "https://github.com".into()
}
fn default_git_bin() -> String {
    "git".into()
}

/// `[host]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// REST API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// `per_page` sent with the single compare request.
    #[serde(default = "default_compare_per_page")]
    pub compare_per_page: u32,

    /// File count at which a compare response is considered truncated.
    #[serde(default = "default_compare_file_cap")]
    pub compare_file_cap: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_env: default_token_env(),
            compare_per_page: default_compare_per_page(),
            compare_file_cap: default_compare_file_cap(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_compare_per_page() -> u32 {
    100
}
fn default_compare_file_cap() -> usize {
    300
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[freshness]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Local path of the freshness state document.
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Object key of the remote mirror, if mirroring is enabled.
    #[serde(default)]
    pub remote_key: Option<String>,

    /// Treat the remote mirror as the only source of truth.
    #[serde(default)]
    pub remote_exclusive: bool,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            remote_key: None,
            remote_exclusive: false,
        }
    }
}

fn default_state_path() -> String {
    "var/freshness-state.json".into()
}

/// Object storage backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStorageKind {
    /// No object storage; archives and remote state are disabled.
    #[default]
    None,
    /// A local directory standing in for a bucket.
    Local,
    /// An HTTP endpoint accepting `HEAD`/`GET`/`PUT` per key.
    Http,
}

/// `[object_storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    #[serde(default)]
    pub kind: ObjectStorageKind,

    /// Root directory for the `local` backend.
    #[serde(default)]
    pub local_root: Option<String>,

    /// Base URL for the `http` backend.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Name of the env var holding the storage bearer token.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Key prefix for snapshot archives.
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            kind: ObjectStorageKind::default(),
            local_root: None,
            base_url: None,
            token_env: None,
            snapshot_prefix: default_snapshot_prefix(),
        }
    }
}

fn default_snapshot_prefix() -> String {
    "snapshots/".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.repodoc/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RepoDocError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.repodoc/repodoc.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| RepoDocError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RepoDocError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RepoDocError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RepoDocError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RepoDocError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a token from the named env var. Unset or empty means "no token".
pub fn read_token(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val.trim().to_string()),
        _ => None,
    }
}
