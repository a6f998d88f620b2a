//! State-change events fanned out to external subscribers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::campaign::{CampaignOperation, CampaignState};
use crate::guardrail::{Comparator, GuardrailAction, MetricKey};
use crate::status::MetricSnapshot;

/// An event about one campaign, routed per campaign and per owning team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignEvent {
    pub campaign_id: String,
    pub owning_team_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub emitted_at: OffsetDateTime,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl CampaignEvent {
    pub fn new(campaign_id: &str, owning_team_id: &str, payload: EventPayload) -> Self {
        CampaignEvent {
            campaign_id: campaign_id.to_string(),
            owning_team_id: owning_team_id.to_string(),
            emitted_at: OffsetDateTime::now_utc(),
            payload,
        }
    }

    /// Wire name of the payload kind (`"status_changed"`, ...).
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::StatusChanged { .. } => "status_changed",
            EventPayload::MetricsUpdated { .. } => "metrics_updated",
            EventPayload::AlertTriggered { .. } => "alert_triggered",
            EventPayload::ExecutionError { .. } => "execution_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StatusChanged {
        status: CampaignState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform_status: Option<String>,
    },
    MetricsUpdated {
        platform_status: String,
        metrics: MetricSnapshot,
    },
    AlertTriggered {
        rule_id: String,
        metric: MetricKey,
        value: Decimal,
        comparator: Comparator,
        threshold: Decimal,
        action: GuardrailAction,
    },
    ExecutionError {
        operation: CampaignOperation,
        error: String,
        recoverable: bool,
    },
}
