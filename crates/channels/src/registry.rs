use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pacer_core::Channel;

use crate::adapter::ChannelAdapter;
use crate::credential::{ChannelCredential, CredentialStore};
use crate::error::AdapterError;
use crate::google_ads::GoogleAdsAdapter;
use crate::meta::MetaAdapter;

/// Builds an adapter for one channel from a resolved credential.
pub type AdapterFactory =
    Arc<dyn Fn(&ChannelCredential) -> Result<Arc<dyn ChannelAdapter>, AdapterError> + Send + Sync>;

enum Registration {
    Factory(AdapterFactory),
    /// Shared instance that needs no credential (scripted vendors).
    Instance(Arc<dyn ChannelAdapter>),
}

/// Resolves `(owning team, channel)` to a configured [`ChannelAdapter`].
///
/// Adding a channel means registering one more factory; the orchestrator
/// never branches on the channel itself.
pub struct AdapterRegistry {
    credentials: Arc<dyn CredentialStore>,
    registrations: HashMap<Channel, Registration>,
}

impl AdapterRegistry {
    /// A registry with no channels registered.
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        AdapterRegistry {
            credentials,
            registrations: HashMap::new(),
        }
    }

    /// A registry with the reference vendors, each call bounded by `timeout`.
    pub fn with_vendors(credentials: Arc<dyn CredentialStore>, timeout: Duration) -> Self {
        let mut registry = Self::new(credentials);
        registry.register(Channel::Meta, move |cred| {
            Ok(Arc::new(MetaAdapter::from_credential(cred, timeout)?) as Arc<dyn ChannelAdapter>)
        });
        registry.register(Channel::GoogleAds, move |cred| {
            Ok(Arc::new(GoogleAdsAdapter::from_credential(cred, timeout)?) as Arc<dyn ChannelAdapter>)
        });
        registry
    }

    /// Register (or replace) the factory for a channel.
    pub fn register<F>(&mut self, channel: Channel, factory: F)
    where
        F: Fn(&ChannelCredential) -> Result<Arc<dyn ChannelAdapter>, AdapterError>
            + Send
            + Sync
            + 'static,
    {
        self.registrations
            .insert(channel, Registration::Factory(Arc::new(factory)));
    }

    /// Register one shared adapter instance for a channel. Resolving it
    /// skips the credential lookup.
    pub fn register_instance(&mut self, channel: Channel, adapter: Arc<dyn ChannelAdapter>) {
        self.registrations
            .insert(channel, Registration::Instance(adapter));
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.registrations.keys().copied().collect();
        channels.sort();
        channels
    }

    pub async fn resolve(
        &self,
        owning_team_id: &str,
        channel: Channel,
    ) -> Result<Arc<dyn ChannelAdapter>, AdapterError> {
        let registration = self.registrations.get(&channel).ok_or_else(|| {
            AdapterError::not_configured(format!("no adapter registered for channel {}", channel))
        })?;
        match registration {
            Registration::Instance(adapter) => Ok(Arc::clone(adapter)),
            Registration::Factory(factory) => {
                let credential = self.credentials.lookup(owning_team_id, channel).await?;
                (**factory)(&credential)
            }
        }
    }
}
