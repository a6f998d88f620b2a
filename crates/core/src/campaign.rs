//! Campaign lifecycle: channels, states, operations, and the transition table.
//!
//! ```text
//!   Scheduled ──launch──▶ Launched ──pause──▶ Paused
//!       │                  │  ▲                 │
//!       │ fail (launch)    │  └─────resume──────┘
//!       ▼                  ├──complete──▶ Completed
//!     Failed ◀────fail─────┘
//!
//!   any state ──archive──▶ Archived
//! ```
//!
//! Every edge not drawn above is illegal and fails closed with a
//! [`TransitionError`] naming the current state and the requested operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Channel
// ──────────────────────────────────────────────

/// A supported third-party advertising platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Meta,
    GoogleAds,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Meta, Channel::GoogleAds];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Meta => "meta",
            Channel::GoogleAds => "google_ads",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(Channel::Meta),
            "google_ads" => Ok(Channel::GoogleAds),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

// ──────────────────────────────────────────────
// CampaignState
// ──────────────────────────────────────────────

/// Lifecycle state of a managed campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Scheduled,
    Launched,
    Paused,
    Completed,
    Failed,
    Archived,
}

impl CampaignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignState::Scheduled => "scheduled",
            CampaignState::Launched => "launched",
            CampaignState::Paused => "paused",
            CampaignState::Completed => "completed",
            CampaignState::Failed => "failed",
            CampaignState::Archived => "archived",
        }
    }

    /// No reconciliation tick is ever scheduled from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignState::Completed | CampaignState::Failed | CampaignState::Archived
        )
    }

    /// States in which vendor status is polled and guardrails are evaluated.
    pub fn is_reconcilable(&self) -> bool {
        matches!(self, CampaignState::Launched | CampaignState::Paused)
    }

    /// Apply `operation` to this state, returning the successor state.
    pub fn apply(self, operation: CampaignOperation) -> Result<CampaignState, TransitionError> {
        use CampaignOperation as Op;
        use CampaignState as S;

        let next = match (self, operation) {
            (_, Op::Archive) => S::Archived,
            (S::Scheduled, Op::Launch) => S::Launched,
            (S::Scheduled, Op::Fail) => S::Failed,
            (S::Launched, Op::Pause) => S::Paused,
            (S::Launched, Op::Complete) => S::Completed,
            (S::Launched, Op::Fail) => S::Failed,
            (S::Paused, Op::Resume) => S::Launched,
            (state, operation) => return Err(TransitionError { state, operation }),
        };
        Ok(next)
    }

    /// Whether `operation` is legal from this state.
    pub fn allows(self, operation: CampaignOperation) -> bool {
        self.apply(operation).is_ok()
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// CampaignOperation
// ──────────────────────────────────────────────

/// An operation that moves a campaign along a lifecycle edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignOperation {
    Launch,
    Pause,
    Resume,
    Complete,
    Fail,
    Archive,
}

impl CampaignOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignOperation::Launch => "launch",
            CampaignOperation::Pause => "pause",
            CampaignOperation::Resume => "resume",
            CampaignOperation::Complete => "complete",
            CampaignOperation::Fail => "fail",
            CampaignOperation::Archive => "archive",
        }
    }
}

impl fmt::Display for CampaignOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation was requested from a state with no matching edge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {operation} a campaign in state {state}")]
pub struct TransitionError {
    pub state: CampaignState,
    pub operation: CampaignOperation,
}

// ──────────────────────────────────────────────
// ExternalIds
// ──────────────────────────────────────────────

/// Vendor-assigned identifiers, set once at launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub account_id: String,
    pub campaign_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
}

impl ExternalIds {
    pub fn new(account_id: impl Into<String>, campaign_id: impl Into<String>) -> Self {
        ExternalIds {
            account_id: account_id.into(),
            campaign_id: campaign_id.into(),
            ad_set_id: None,
            ad_id: None,
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [CampaignState; 6] = [
        CampaignState::Scheduled,
        CampaignState::Launched,
        CampaignState::Paused,
        CampaignState::Completed,
        CampaignState::Failed,
        CampaignState::Archived,
    ];

    const ALL_OPS: [CampaignOperation; 6] = [
        CampaignOperation::Launch,
        CampaignOperation::Pause,
        CampaignOperation::Resume,
        CampaignOperation::Complete,
        CampaignOperation::Fail,
        CampaignOperation::Archive,
    ];

    #[test]
    fn legal_edges() {
        use CampaignOperation as Op;
        use CampaignState as S;
        assert_eq!(S::Scheduled.apply(Op::Launch), Ok(S::Launched));
        assert_eq!(S::Launched.apply(Op::Pause), Ok(S::Paused));
        assert_eq!(S::Paused.apply(Op::Resume), Ok(S::Launched));
        assert_eq!(S::Launched.apply(Op::Complete), Ok(S::Completed));
        assert_eq!(S::Launched.apply(Op::Fail), Ok(S::Failed));
        assert_eq!(S::Scheduled.apply(Op::Fail), Ok(S::Failed));
    }

    #[test]
    fn archive_is_legal_from_every_state() {
        for state in ALL_STATES {
            assert_eq!(
                state.apply(CampaignOperation::Archive),
                Ok(CampaignState::Archived)
            );
        }
    }

    #[test]
    fn edge_count_matches_table() {
        let legal = ALL_STATES
            .iter()
            .flat_map(|s| ALL_OPS.iter().map(move |op| (*s, *op)))
            .filter(|(s, op)| s.allows(*op))
            .count();
        // six lifecycle edges plus archive from all six states
        assert_eq!(legal, 12);
    }

    #[test]
    fn illegal_transition_names_state_and_operation() {
        let err = CampaignState::Paused
            .apply(CampaignOperation::Pause)
            .unwrap_err();
        assert_eq!(err.state, CampaignState::Paused);
        assert_eq!(err.operation, CampaignOperation::Pause);
        assert_eq!(err.to_string(), "cannot pause a campaign in state paused");
    }

    #[test]
    fn terminal_states_never_resume_or_launch() {
        for state in [
            CampaignState::Completed,
            CampaignState::Failed,
            CampaignState::Archived,
        ] {
            assert!(state.is_terminal());
            assert!(!state.is_reconcilable());
            assert!(!state.allows(CampaignOperation::Launch));
            assert!(!state.allows(CampaignOperation::Resume));
            assert!(!state.allows(CampaignOperation::Pause));
        }
    }

    #[test]
    fn channel_round_trips_through_str() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>(), Ok(channel));
        }
        assert!("tiktok".parse::<Channel>().is_err());
    }

    #[test]
    fn external_ids_omit_absent_optionals() {
        let ids = ExternalIds::new("a1", "c1");
        let json = serde_json::to_value(&ids).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"account_id": "a1", "campaign_id": "c1"})
        );
    }
}
