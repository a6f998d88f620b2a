use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use pacer_core::Channel;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Per (owning team, channel) access to a vendor account.
///
/// Opaque to the orchestrator beyond the token and a settings bag
/// (`account_id`, `base_url`, ...). Never persisted by this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCredential {
    pub auth_token: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

// Token stays out of logs.
impl fmt::Debug for ChannelCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCredential")
            .field("auth_token", &"<redacted>")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChannelCredential {
    pub fn new(auth_token: impl Into<String>) -> Self {
        ChannelCredential {
            auth_token: auth_token.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<String>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(|s| s.as_str())
    }

    /// A setting the adapter cannot work without.
    pub fn require(&self, key: &str) -> Result<&str, AdapterError> {
        self.setting(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AdapterError::not_configured(format!("missing setting '{}'", key)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential for team '{team_id}' on channel {channel}")]
    NotFound { team_id: String, channel: Channel },
    #[error("credential store error: {0}")]
    Backend(String),
}

impl From<CredentialError> for AdapterError {
    fn from(e: CredentialError) -> Self {
        AdapterError::not_configured(e.to_string())
    }
}

/// Lookup of vendor credentials, owned by an external collaborator.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(
        &self,
        owning_team_id: &str,
        channel: Channel,
    ) -> Result<ChannelCredential, CredentialError>;
}

/// Credentials loaded once at startup (config file, fixtures).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    entries: HashMap<(String, Channel), ChannelCredential>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the credential previously stored under the same key, if any.
    pub fn insert(
        &mut self,
        owning_team_id: &str,
        channel: Channel,
        credential: ChannelCredential,
    ) -> Option<ChannelCredential> {
        self.entries
            .insert((owning_team_id.to_string(), channel), credential)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn lookup(
        &self,
        owning_team_id: &str,
        channel: Channel,
    ) -> Result<ChannelCredential, CredentialError> {
        self.entries
            .get(&(owning_team_id.to_string(), channel))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                team_id: owning_team_id.to_string(),
                channel,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_is_keyed_by_team_and_channel() {
        let mut store = StaticCredentialStore::new();
        store.insert(
            "team-a",
            Channel::Meta,
            ChannelCredential::new("tok").with_setting("account_id", "123"),
        );

        let cred = store.lookup("team-a", Channel::Meta).await.unwrap();
        assert_eq!(cred.setting("account_id"), Some("123"));

        let missing = store.lookup("team-a", Channel::GoogleAds).await;
        assert!(matches!(missing, Err(CredentialError::NotFound { .. })));
        let missing = store.lookup("team-b", Channel::Meta).await;
        assert!(matches!(missing, Err(CredentialError::NotFound { .. })));
    }

    #[test]
    fn require_rejects_missing_and_empty_settings() {
        let cred = ChannelCredential::new("tok").with_setting("account_id", "");
        assert!(matches!(
            cred.require("account_id"),
            Err(AdapterError::NotConfigured { .. })
        ));
        assert!(cred.require("base_url").is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let cred = ChannelCredential::new("super-secret");
        let shown = format!("{cred:?}");
        assert!(!shown.contains("super-secret"));
    }
}
