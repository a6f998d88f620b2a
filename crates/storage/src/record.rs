use pacer_core::{CampaignOperation, CampaignState, Channel, ExternalIds, MetricSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The persisted state of one managed campaign.
///
/// Created in `Scheduled` by an external collaborator; mutated only by the
/// orchestrator and the reconciliation scheduler; never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: String,
    pub title: String,
    pub channel: Channel,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    pub state: CampaignState,
    /// Last vendor-reported state label. Display only; never drives transitions.
    #[serde(default)]
    pub platform_state: Option<String>,
    /// Present iff the campaign has been launched on the vendor side.
    #[serde(default)]
    pub external_ids: Option<ExternalIds>,
    #[serde(default)]
    pub roi_threshold: Option<Decimal>,
    #[serde(default)]
    pub paused_reason: Option<String>,
    pub owning_team_id: String,
    pub created_by: String,
    /// Targeting spec handed to the vendor at launch.
    #[serde(default)]
    pub audience: serde_json::Value,
    #[serde(default)]
    pub creatives: Vec<serde_json::Value>,
    #[serde(default)]
    pub last_metrics: Option<MetricSnapshot>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub status_updated_at: Option<OffsetDateTime>,
    /// Mutating vendor operation currently in progress, if any.
    #[serde(default)]
    pub in_flight: Option<InFlightClaim>,
    /// OCC version, incremented by every committed update.
    #[serde(default)]
    pub version: i64,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub updated_at: OffsetDateTime,
}

impl CampaignRecord {
    /// A fresh record in `Scheduled` state, as an external collaborator would create it.
    pub fn scheduled(
        id: &str,
        title: &str,
        channel: Channel,
        owning_team_id: &str,
        created_by: &str,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        CampaignRecord {
            id: id.to_string(),
            title: title.to_string(),
            channel,
            scheduled_at: now,
            end_at: None,
            state: CampaignState::Scheduled,
            platform_state: None,
            external_ids: None,
            roi_threshold: None,
            paused_reason: None,
            owning_team_id: owning_team_id.to_string(),
            created_by: created_by.to_string(),
            audience: serde_json::Value::Null,
            creatives: Vec::new(),
            last_metrics: None,
            status_updated_at: None,
            in_flight: None,
            version: 0,
            updated_at: now,
        }
    }

    /// The claim still blocking other mutations, ignoring claims older than `ttl`.
    pub fn live_claim(&self, now: OffsetDateTime, ttl: time::Duration) -> Option<&InFlightClaim> {
        self.in_flight
            .as_ref()
            .filter(|claim| now - claim.claimed_at <= ttl)
    }
}

/// Marker written under the lock before a vendor call and cleared when the
/// call's outcome is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightClaim {
    pub operation: CampaignOperation,
    /// Record version at claim time; the commit step checks it is unchanged.
    pub token: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub claimed_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_json_fills_defaults() {
        let record: CampaignRecord = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "title": "Spring sale",
            "channel": "google_ads",
            "scheduled_at": "2026-03-01T09:00:00Z",
            "state": "scheduled",
            "owning_team_id": "team-a",
            "created_by": "alice",
            "roi_threshold": "1.2"
        }))
        .unwrap();

        assert_eq!(record.channel, Channel::GoogleAds);
        assert!(record.external_ids.is_none());
        assert!(record.in_flight.is_none());
        assert_eq!(record.version, 0);
        assert_eq!(record.roi_threshold.unwrap().to_string(), "1.2");
    }

    #[test]
    fn stale_claim_is_not_live() {
        let mut record = CampaignRecord::scheduled("c1", "t", Channel::Meta, "team", "alice");
        let now = OffsetDateTime::now_utc();
        record.in_flight = Some(InFlightClaim {
            operation: CampaignOperation::Launch,
            token: 0,
            claimed_at: now - time::Duration::minutes(10),
        });

        assert!(record.live_claim(now, time::Duration::minutes(15)).is_some());
        assert!(record.live_claim(now, time::Duration::minutes(5)).is_none());
    }
}
