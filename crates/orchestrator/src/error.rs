use pacer_channels::AdapterError;
use pacer_core::{CampaignOperation, CampaignState};
use pacer_storage::StorageError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrchestratorError {
    /// The requested operation has no edge from the current state, or
    /// another mutation of the campaign is still in flight.
    #[error(
        "cannot {operation} campaign '{campaign_id}' in state {state}{}",
        in_flight_hint(.in_flight)
    )]
    InvalidTransition {
        campaign_id: String,
        state: CampaignState,
        operation: CampaignOperation,
        in_flight: Option<CampaignOperation>,
    },

    /// Status refresh requested outside `Launched`/`Paused`.
    #[error("campaign '{campaign_id}' is {state} and is not reconciled")]
    NotReconcilable {
        campaign_id: String,
        state: CampaignState,
    },

    #[error("campaign '{campaign_id}' not found")]
    CampaignNotFound { campaign_id: String },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Persisted data violates an invariant (e.g. launched without external ids).
    #[error("campaign '{campaign_id}' is inconsistent: {message}")]
    Inconsistent { campaign_id: String, message: String },

    #[error("storage error: {0}")]
    Storage(StorageError),
}

fn in_flight_hint(in_flight: &Option<CampaignOperation>) -> String {
    match in_flight {
        Some(op) => format!(" ({} in flight)", op),
        None => String::new(),
    }
}

impl From<StorageError> for OrchestratorError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::CampaignNotFound { campaign_id } => {
                OrchestratorError::CampaignNotFound { campaign_id }
            }
            other => OrchestratorError::Storage(other),
        }
    }
}

impl OrchestratorError {
    pub(crate) fn invalid(
        campaign_id: &str,
        state: CampaignState,
        operation: CampaignOperation,
    ) -> Self {
        OrchestratorError::InvalidTransition {
            campaign_id: campaign_id.to_string(),
            state,
            operation,
            in_flight: None,
        }
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, OrchestratorError::InvalidTransition { .. })
    }

    /// Adapter errors that the reconciliation cadence will retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            OrchestratorError::Adapter(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
