//! `pacer.toml`: server settings, orchestrator timing, and vendor credentials.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use pacer_channels::{ChannelCredential, StaticCredentialStore};
use pacer_core::Channel;
use pacer_orchestrator::OrchestratorConfig;
use serde::Deserialize;

/// Environment variable that overrides `server.api_key`.
pub(crate) const API_KEY_ENV: &str = "PACER_API_KEY";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PacerConfig {
    pub(crate) server: ServerConfig,
    pub(crate) orchestrator: OrchestratorConfig,
    pub(crate) credentials: Vec<CredentialEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    /// When set, every route except `/health` requires this key.
    pub(crate) api_key: Option<String>,
    /// Events buffered per subscriber before a slow one starts losing them.
    pub(crate) event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            api_key: None,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CredentialEntry {
    pub(crate) team_id: String,
    pub(crate) channel: Channel,
    pub(crate) auth_token: String,
    #[serde(default)]
    pub(crate) settings: BTreeMap<String, String>,
}

impl PacerConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub(crate) fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `PACER_API_KEY`, if set and non-empty.
    pub(crate) fn apply_env(&mut self) {
        if let Some(key) = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()) {
            self.server.api_key = Some(key);
        }
    }

    /// Every problem with the file, empty when it is usable.
    pub(crate) fn validate(&self) -> Vec<String> {
        let mut problems = self.orchestrator.validate();
        if self.server.event_buffer == 0 {
            problems.push("server.event_buffer must be greater than 0".to_string());
        }
        if self.server.api_key.as_deref() == Some("") {
            problems.push("server.api_key is empty; omit it to disable auth".to_string());
        }

        let mut seen = HashSet::new();
        for (i, entry) in self.credentials.iter().enumerate() {
            if entry.team_id.is_empty() {
                problems.push(format!("credentials[{}]: team_id is empty", i));
            }
            if entry.auth_token.is_empty() {
                problems.push(format!(
                    "credentials[{}] ({}/{}): auth_token is empty",
                    i, entry.team_id, entry.channel
                ));
            }
            if !seen.insert((entry.team_id.as_str(), entry.channel)) {
                problems.push(format!(
                    "credentials[{}]: duplicate entry for team '{}' on {}",
                    i, entry.team_id, entry.channel
                ));
            }
        }
        problems
    }

    pub(crate) fn credential_store(&self) -> StaticCredentialStore {
        let mut store = StaticCredentialStore::new();
        for entry in &self.credentials {
            let credential = ChannelCredential {
                auth_token: entry.auth_token.clone(),
                settings: entry.settings.clone(),
            };
            store.insert(&entry.team_id, entry.channel, credential);
        }
        store
    }
}
