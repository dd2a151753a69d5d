//! Process-boundary wiring: build the host client, object store and state
//! mirror from configuration, then inject them downward.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use repodoc_freshness::RemoteStateMirror;
use repodoc_host::{GitHubHost, GitHubHostOptions, ScriptedHost, SourceHost};
use repodoc_shared::{AppConfig, FreshnessConfig, HostConfig, RepoDocError, Result, read_token};
use repodoc_storage::{ObjectStore, open_object_store};

/// External collaborators shared by every command.
#[derive(Clone)]
pub struct Services {
    pub host: Arc<dyn SourceHost>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
}

impl Services {
    /// Build services from config. A host fixture replaces the real host.
    pub fn from_config(config: &AppConfig, host_fixture: Option<&Path>) -> Result<Self> {
        let host: Arc<dyn SourceHost> = match host_fixture {
            Some(path) => Arc::new(ScriptedHost::from_json_file(path)?),
            None => Arc::new(github_host(&config.host)?),
        };
        let object_store = open_object_store(&config.object_storage)?;

        debug!(
            host = host.name(),
            object_store = object_store.as_ref().map(|s| s.name()).unwrap_or("none"),
            "services ready"
        );

        Ok(Self { host, object_store })
    }

    /// Remote state mirror, when `freshness.remote_key` is set.
    pub fn state_mirror(&self, config: &FreshnessConfig) -> Result<Option<RemoteStateMirror>> {
        state_mirror(config, self.object_store.clone())
    }
}

/// GitHub client for the configured API base and token.
pub fn github_host(config: &HostConfig) -> Result<GitHubHost> {
    let api_base_url = Url::parse(&config.api_base_url).map_err(|e| {
        RepoDocError::config(format!(
            "invalid host.api_base_url '{}': {e}",
            config.api_base_url
        ))
    })?;

    GitHubHost::new(GitHubHostOptions {
        api_base_url,
        token: read_token(&config.token_env),
        timeout_secs: config.timeout_secs,
    })
}

/// Pair the configured remote key with the object store.
pub fn state_mirror(
    config: &FreshnessConfig,
    store: Option<Arc<dyn ObjectStore>>,
) -> Result<Option<RemoteStateMirror>> {
    let Some(key) = config.remote_key.as_deref() else {
        return Ok(None);
    };
    let store = store.ok_or_else(|| {
        RepoDocError::config("freshness.remote_key requires object_storage to be configured")
    })?;

    Ok(Some(RemoteStateMirror {
        store,
        key: key.to_string(),
        exclusive: config.remote_exclusive,
    }))
}
