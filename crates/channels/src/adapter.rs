use async_trait::async_trait;
use pacer_core::{Channel, ExternalIds, NormalizedStatus};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Vendor-native status payload, kept verbatim for normalization and forensics.
pub type RawStatus = serde_json::Value;

/// What the orchestrator hands a vendor at launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchPayload {
    pub title: String,
    /// Targeting spec in the vendor's own shape. `Null` means no ad set.
    #[serde(default)]
    pub audience: serde_json::Value,
    #[serde(default)]
    pub creatives: Vec<serde_json::Value>,
}

/// Acknowledgement of a pause or resume.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorAck {
    /// The state the vendor says the campaign is now in, when it says.
    pub platform_state: Option<String>,
    pub raw: serde_json::Value,
}

/// One ad platform.
///
/// Implementations translate canonical requests to the vendor's wire format
/// and own the mapping from the vendor's status vocabulary onto
/// [`pacer_core::CanonicalState`]. Vendor states without a mapping pass
/// through as `Unmapped`.
///
/// Mutating calls are not idempotent on the vendor side; callers must make
/// sure each is invoked once per intended transition.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    /// Create the campaign (and ad set / ad when the payload carries them).
    async fn launch(&self, payload: &LaunchPayload) -> Result<ExternalIds, AdapterError>;

    async fn pause(&self, ids: &ExternalIds) -> Result<VendorAck, AdapterError>;

    async fn resume(&self, ids: &ExternalIds) -> Result<VendorAck, AdapterError>;

    async fn get_status(&self, ids: &ExternalIds) -> Result<RawStatus, AdapterError>;

    /// Fold a raw status into the canonical shape. Pure; no I/O.
    fn normalize(&self, raw: RawStatus) -> Result<NormalizedStatus, AdapterError>;
}
