//! Persistence seam for the campaign orchestrator.
//!
//! [`CampaignStorage`] is the only way the orchestrator touches durable
//! state. Every read-modify-write happens inside a snapshot that holds an
//! exclusive per-campaign lock, and commits all of its writes (record
//! update plus audit entries) or none of them.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{InMemoryStorage, MemorySnapshot};
pub use record::{CampaignRecord, InFlightClaim};
pub use traits::CampaignStorage;
