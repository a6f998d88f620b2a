//! Meta (Graph API style) adapter.
//!
//! Settings: `account_id` (required), `base_url` (defaults to the public
//! Graph endpoint), `objective` (defaults to `OUTCOME_TRAFFIC`).
//!
//! Launch creates the campaign paused, then an ad set when the payload
//! carries an audience, then an ad for the first creative once an ad set
//! exists, and only then activates the campaign. If any step after the
//! campaign fails, the campaign is deleted before the error is returned.

use std::time::Duration;

use async_trait::async_trait;
use pacer_core::{CanonicalState, Channel, ExternalIds, MetricSnapshot, NormalizedStatus};
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::adapter::{ChannelAdapter, LaunchPayload, RawStatus, VendorAck};
use crate::credential::ChannelCredential;
use crate::error::AdapterError;
use crate::http::VendorHttpClient;
use crate::numeric::decimal_field;

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

const STATUS_FIELDS: &str = "effective_status,insights{spend,ctr,cpc,purchase_roas}";

/// Map Meta's `effective_status` vocabulary onto canonical states.
pub fn map_state(effective_status: &str) -> CanonicalState {
    match effective_status {
        "ACTIVE" | "IN_PROCESS" => CanonicalState::Running,
        "PAUSED" | "CAMPAIGN_PAUSED" | "ADSET_PAUSED" => CanonicalState::Paused,
        "COMPLETED" | "ENDED" => CanonicalState::Completed,
        "DISAPPROVED" | "DELETED" | "WITH_ISSUES" => CanonicalState::Failed,
        other => CanonicalState::Unmapped(other.to_string()),
    }
}

pub struct MetaAdapter {
    client: VendorHttpClient,
    account_id: String,
    objective: String,
}

impl MetaAdapter {
    pub fn from_credential(
        credential: &ChannelCredential,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let account_id = credential.require("account_id")?.to_string();
        let base_url = credential.setting("base_url").unwrap_or(DEFAULT_BASE_URL);
        let objective = credential
            .setting("objective")
            .unwrap_or("OUTCOME_TRAFFIC")
            .to_string();
        Ok(MetaAdapter {
            client: VendorHttpClient::new(base_url, timeout).with_bearer(&credential.auth_token),
            account_id,
            objective,
        })
    }

    async fn create(&self, edge: &str, body: Value) -> Result<String, AdapterError> {
        let path = format!("act_{}/{}", self.account_id, edge);
        let response = self.client.post_json(&path, &body).await?;
        created_id(&response)
    }

    async fn set_status(&self, ids: &ExternalIds, status: &str) -> Result<VendorAck, AdapterError> {
        let raw = self
            .client
            .post_json(&ids.campaign_id, &json!({ "status": status }))
            .await?;
        if raw.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(AdapterError::invalid(format!(
                "status update to {} not acknowledged",
                status
            )));
        }
        Ok(VendorAck {
            platform_state: Some(status.to_string()),
            raw,
        })
    }

    /// Ad set (when there is an audience) and ad (for the first creative).
    async fn create_children(
        &self,
        payload: &LaunchPayload,
        ids: &mut ExternalIds,
    ) -> Result<(), AdapterError> {
        if payload.audience.is_null() {
            return Ok(());
        }
        let ad_set_id = self
            .create(
                "adsets",
                json!({
                    "name": format!("{} ad set", payload.title),
                    "campaign_id": ids.campaign_id,
                    "targeting": payload.audience,
                    "billing_event": "IMPRESSIONS",
                    "status": "ACTIVE",
                }),
            )
            .await?;
        ids.ad_set_id = Some(ad_set_id.clone());

        if let Some(creative) = payload.creatives.first() {
            let ad_id = self
                .create(
                    "ads",
                    json!({
                        "name": format!("{} ad", payload.title),
                        "adset_id": ad_set_id,
                        "creative": creative,
                        "status": "ACTIVE",
                    }),
                )
                .await?;
            ids.ad_id = Some(ad_id);
        }
        Ok(())
    }

    /// Delete a campaign whose launch did not complete. It was created
    /// paused, so a failed delete leaves nothing serving.
    async fn discard(&self, ids: &ExternalIds, cause: &AdapterError) {
        tracing::warn!(
            vendor_campaign_id = %ids.campaign_id,
            error = %cause,
            "meta launch incomplete; deleting created campaign"
        );
        if let Err(e) = self.set_status(ids, "DELETED").await {
            tracing::error!(
                vendor_campaign_id = %ids.campaign_id,
                error = %e,
                "could not delete incomplete meta campaign; it remains paused"
            );
        }
    }
}

fn created_id(response: &Value) -> Result<String, AdapterError> {
    response
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AdapterError::invalid("create response has no 'id'"))
}

#[async_trait]
impl ChannelAdapter for MetaAdapter {
    fn channel(&self) -> Channel {
        Channel::Meta
    }

    async fn launch(&self, payload: &LaunchPayload) -> Result<ExternalIds, AdapterError> {
        let campaign_id = self
            .create(
                "campaigns",
                json!({
                    "name": payload.title,
                    "objective": self.objective,
                    "status": "PAUSED",
                    "special_ad_categories": [],
                }),
            )
            .await?;
        let mut ids = ExternalIds::new(self.account_id.clone(), campaign_id);

        let completed = match self.create_children(payload, &mut ids).await {
            Ok(()) => self.set_status(&ids, "ACTIVE").await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = completed {
            self.discard(&ids, &e).await;
            return Err(e);
        }
        Ok(ids)
    }

    async fn pause(&self, ids: &ExternalIds) -> Result<VendorAck, AdapterError> {
        self.set_status(ids, "PAUSED").await
    }

    async fn resume(&self, ids: &ExternalIds) -> Result<VendorAck, AdapterError> {
        self.set_status(ids, "ACTIVE").await
    }

    async fn get_status(&self, ids: &ExternalIds) -> Result<RawStatus, AdapterError> {
        self.client
            .get(&ids.campaign_id, &[("fields", STATUS_FIELDS)])
            .await
    }

    fn normalize(&self, raw: RawStatus) -> Result<NormalizedStatus, AdapterError> {
        normalize(raw)
    }
}

/// `{"effective_status": "ACTIVE", "insights": {"data": [{"spend": "12.5", ...}]}}`
pub fn normalize(raw: RawStatus) -> Result<NormalizedStatus, AdapterError> {
    let platform_state = raw
        .get("effective_status")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::invalid("status has no 'effective_status'"))?
        .to_string();

    // Insights are absent until the campaign has delivered.
    let insights = raw.pointer("/insights/data/0").cloned().unwrap_or(Value::Null);
    let metrics = MetricSnapshot {
        spend: decimal_field(&insights, "spend").unwrap_or_default(),
        roi: insights
            .get("purchase_roas")
            .and_then(|r| r.get(0))
            .and_then(|r| decimal_field(r, "value")),
        ctr: decimal_field(&insights, "ctr"),
        cpc: decimal_field(&insights, "cpc"),
    };

    Ok(NormalizedStatus {
        state: map_state(&platform_state),
        platform_state,
        metrics,
        native: raw,
        observed_at: OffsetDateTime::now_utc(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::DEFAULT_TIMEOUT;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn adapter(base_url: &str) -> MetaAdapter {
        let cred = ChannelCredential::new("meta-token")
            .with_setting("account_id", "42")
            .with_setting("base_url", base_url);
        MetaAdapter::from_credential(&cred, DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn vocabulary_maps_to_canonical_states() {
        assert_eq!(map_state("ACTIVE"), CanonicalState::Running);
        assert_eq!(map_state("IN_PROCESS"), CanonicalState::Running);
        assert_eq!(map_state("ADSET_PAUSED"), CanonicalState::Paused);
        assert_eq!(map_state("ENDED"), CanonicalState::Completed);
        assert_eq!(map_state("DISAPPROVED"), CanonicalState::Failed);
        assert_eq!(
            map_state("PENDING_REVIEW"),
            CanonicalState::Unmapped("PENDING_REVIEW".into())
        );
    }

    #[test]
    fn missing_account_id_is_not_configured() {
        let cred = ChannelCredential::new("tok");
        let result = MetaAdapter::from_credential(&cred, DEFAULT_TIMEOUT);
        assert!(matches!(result, Err(AdapterError::NotConfigured { .. })));
    }

    #[test]
    fn normalize_reads_insights() {
        let status = normalize(json!({
            "id": "900",
            "effective_status": "ACTIVE",
            "insights": {"data": [{
                "spend": "12.50",
                "ctr": "1.8",
                "cpc": "0.42",
                "purchase_roas": [{"action_type": "omni_purchase", "value": "0.5"}]
            }]}
        }))
        .unwrap();

        assert_eq!(status.state, CanonicalState::Running);
        assert_eq!(status.platform_state, "ACTIVE");
        assert_eq!(status.metrics.spend, dec("12.50"));
        assert_eq!(status.metrics.roi, Some(dec("0.5")));
        assert_eq!(status.metrics.ctr, Some(dec("1.8")));
        assert_eq!(status.native["id"], "900");
    }

    #[test]
    fn normalize_without_insights_has_no_ratios() {
        let status = normalize(json!({"effective_status": "PAUSED"})).unwrap();
        assert_eq!(status.state, CanonicalState::Paused);
        assert_eq!(status.metrics.spend, Decimal::ZERO);
        assert_eq!(status.metrics.roi, None);
    }

    #[test]
    fn normalize_rejects_missing_status() {
        let err = normalize(json!({"id": "900"})).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn launch_creates_campaign_ad_set_and_ad() {
        let mut server = mockito::Server::new_async().await;
        let campaign = server
            .mock("POST", "/act_42/campaigns")
            .match_header("authorization", "Bearer meta-token")
            .match_body(mockito::Matcher::PartialJson(
                json!({"name": "Spring sale", "status": "PAUSED"}),
            ))
            .with_body(r#"{"id": "900"}"#)
            .expect(1)
            .create_async()
            .await;
        let ad_set = server
            .mock("POST", "/act_42/adsets")
            .match_body(mockito::Matcher::PartialJson(json!({"campaign_id": "900"})))
            .with_body(r#"{"id": "901"}"#)
            .create_async()
            .await;
        let ad = server
            .mock("POST", "/act_42/ads")
            .match_body(mockito::Matcher::PartialJson(json!({"adset_id": "901"})))
            .with_body(r#"{"id": "902"}"#)
            .create_async()
            .await;
        let activate = server
            .mock("POST", "/900")
            .match_body(mockito::Matcher::Json(json!({"status": "ACTIVE"})))
            .with_body(r#"{"success": true}"#)
            .expect(1)
            .create_async()
            .await;

        let ids = adapter(&server.url())
            .launch(&LaunchPayload {
                title: "Spring sale".into(),
                audience: json!({"geo_locations": {"countries": ["US"]}}),
                creatives: vec![json!({"creative_id": "555"})],
            })
            .await
            .unwrap();

        assert_eq!(ids.account_id, "42");
        assert_eq!(ids.campaign_id, "900");
        assert_eq!(ids.ad_set_id.as_deref(), Some("901"));
        assert_eq!(ids.ad_id.as_deref(), Some("902"));
        campaign.assert_async().await;
        ad_set.assert_async().await;
        ad.assert_async().await;
        activate.assert_async().await;
    }

    #[tokio::test]
    async fn failed_ad_set_deletes_the_paused_campaign() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/act_42/campaigns")
            .match_body(mockito::Matcher::PartialJson(json!({"status": "PAUSED"})))
            .with_body(r#"{"id": "900"}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/act_42/adsets")
            .with_status(500)
            .with_body(r#"{"error": {"message": "internal"}}"#)
            .create_async()
            .await;
        let activate = server
            .mock("POST", "/900")
            .match_body(mockito::Matcher::Json(json!({"status": "ACTIVE"})))
            .expect(0)
            .create_async()
            .await;
        let delete = server
            .mock("POST", "/900")
            .match_body(mockito::Matcher::Json(json!({"status": "DELETED"})))
            .with_body(r#"{"success": true}"#)
            .expect(1)
            .create_async()
            .await;

        let err = adapter(&server.url())
            .launch(&LaunchPayload {
                title: "Spring sale".into(),
                audience: json!({"geo_locations": {"countries": ["US"]}}),
                creatives: vec![],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::Transient { .. }));
        activate.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn launch_without_audience_creates_campaign_only() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/act_42/campaigns")
            .with_body(r#"{"id": "900"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/900")
            .match_body(mockito::Matcher::Json(json!({"status": "ACTIVE"})))
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;
        let ad_set = server
            .mock("POST", "/act_42/adsets")
            .expect(0)
            .create_async()
            .await;

        let ids = adapter(&server.url())
            .launch(&LaunchPayload {
                title: "Bare".into(),
                audience: Value::Null,
                creatives: vec![],
            })
            .await
            .unwrap();

        assert_eq!(ids, ExternalIds::new("42", "900"));
        ad_set.assert_async().await;
    }

    #[tokio::test]
    async fn pause_posts_status_and_expired_token_is_auth() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/900")
            .match_body(mockito::Matcher::Json(json!({"status": "PAUSED"})))
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/901")
            .with_status(401)
            .with_body(r#"{"error": {"message": "Session has expired", "code": 190}}"#)
            .create_async()
            .await;

        let adapter = adapter(&server.url());
        let ack = adapter.pause(&ExternalIds::new("42", "900")).await.unwrap();
        assert_eq!(ack.platform_state.as_deref(), Some("PAUSED"));

        let err = adapter
            .pause(&ExternalIds::new("42", "901"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AdapterError::Auth {
                message: "Session has expired".into()
            }
        );
    }

    #[tokio::test]
    async fn get_status_requests_fields_and_round_trips() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/900")
            .match_query(mockito::Matcher::UrlEncoded(
                "fields".into(),
                STATUS_FIELDS.into(),
            ))
            .with_body(r#"{"id": "900", "effective_status": "CAMPAIGN_PAUSED"}"#)
            .create_async()
            .await;

        let adapter = adapter(&server.url());
        let raw = adapter
            .get_status(&ExternalIds::new("42", "900"))
            .await
            .unwrap();
        let status = adapter.normalize(raw).unwrap();
        assert_eq!(status.state, CanonicalState::Paused);
    }
}
