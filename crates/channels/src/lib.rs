//! Anti-corruption layer over the ad platforms.
//!
//! Each platform gets one [`ChannelAdapter`] implementation that translates
//! canonical requests into the vendor's wire format and folds the vendor's
//! status vocabulary into [`pacer_core::CanonicalState`]. Adapters only do
//! network I/O; persisting anything they return is the orchestrator's job.
//!
//! [`AdapterRegistry`] resolves `(owning team, channel)` to a configured
//! adapter through a [`CredentialStore`].

mod adapter;
mod credential;
mod error;
pub mod google_ads;
pub mod http;
pub mod meta;
mod numeric;
mod registry;
pub mod scripted;

pub use adapter::{ChannelAdapter, LaunchPayload, RawStatus, VendorAck};
pub use credential::{ChannelCredential, CredentialError, CredentialStore, StaticCredentialStore};
pub use error::AdapterError;
pub use registry::{AdapterFactory, AdapterRegistry};
pub use scripted::ScriptedAdapter;
