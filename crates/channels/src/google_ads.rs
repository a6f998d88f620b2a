//! Google Ads (REST mutate + GAQL search) adapter.
//!
//! Settings: `customer_id` and `developer_token` (required), `base_url`,
//! `login_customer_id`, `daily_budget_micros` (defaults to 1 unit),
//! `channel_type` (defaults to `SEARCH`).
//!
//! Launch creates a budget, the campaign paused, and an ad group when the
//! payload carries an audience, then enables the campaign. If any step
//! after the campaign fails, the campaign is removed before the error is
//! returned.
//!
//! Google returns resource names (`customers/1/campaigns/2`); the trailing
//! segment is the id stored in [`ExternalIds`]. Money is reported in micros.

use std::time::Duration;

use async_trait::async_trait;
use pacer_core::{CanonicalState, Channel, ExternalIds, MetricSnapshot, NormalizedStatus};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::adapter::{ChannelAdapter, LaunchPayload, RawStatus, VendorAck};
use crate::credential::ChannelCredential;
use crate::error::AdapterError;
use crate::http::VendorHttpClient;
use crate::numeric::{decimal_field, from_micros};

pub const DEFAULT_BASE_URL: &str = "https://googleads.googleapis.com/v17";

const DEFAULT_DAILY_BUDGET_MICROS: &str = "1000000";

/// Map campaign `status` plus `servingStatus` onto canonical states.
///
/// An `ENABLED` campaign whose serving status is `ENDED` has run past its
/// end date and counts as completed.
pub fn map_state(status: &str, serving_status: Option<&str>) -> CanonicalState {
    match (status, serving_status) {
        ("ENABLED", Some("ENDED")) => CanonicalState::Completed,
        ("ENABLED", _) => CanonicalState::Running,
        ("PAUSED", _) => CanonicalState::Paused,
        ("REMOVED", _) => CanonicalState::Failed,
        (other, _) => CanonicalState::Unmapped(other.to_string()),
    }
}

pub struct GoogleAdsAdapter {
    client: VendorHttpClient,
    customer_id: String,
    daily_budget_micros: String,
    channel_type: String,
}

impl GoogleAdsAdapter {
    pub fn from_credential(
        credential: &ChannelCredential,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let customer_id = credential.require("customer_id")?.replace('-', "");
        let developer_token = credential.require("developer_token")?;
        let base_url = credential.setting("base_url").unwrap_or(DEFAULT_BASE_URL);

        let mut client = VendorHttpClient::new(base_url, timeout)
            .with_bearer(&credential.auth_token)
            .with_header("developer-token", developer_token);
        if let Some(login) = credential.setting("login_customer_id") {
            client = client.with_header("login-customer-id", &login.replace('-', ""));
        }

        Ok(GoogleAdsAdapter {
            client,
            customer_id,
            daily_budget_micros: credential
                .setting("daily_budget_micros")
                .unwrap_or(DEFAULT_DAILY_BUDGET_MICROS)
                .to_string(),
            channel_type: credential
                .setting("channel_type")
                .unwrap_or("SEARCH")
                .to_string(),
        })
    }

    /// Run one mutate operation and return the resource name it produced.
    async fn mutate(&self, resource: &str, operation: Value) -> Result<String, AdapterError> {
        let path = format!("customers/{}/{}:mutate", self.customer_id, resource);
        let response = self
            .client
            .post_json(&path, &json!({ "operations": [operation] }))
            .await?;
        response
            .pointer("/results/0/resourceName")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::invalid(format!("{} mutate returned no resourceName", resource)))
    }

    fn campaign_resource(&self, ids: &ExternalIds) -> String {
        format!("customers/{}/campaigns/{}", self.customer_id, ids.campaign_id)
    }

    async fn set_status(&self, ids: &ExternalIds, status: &str) -> Result<VendorAck, AdapterError> {
        let path = format!("customers/{}/campaigns:mutate", self.customer_id);
        let raw = self
            .client
            .post_json(
                &path,
                &json!({
                    "operations": [{
                        "update": {
                            "resourceName": self.campaign_resource(ids),
                            "status": status,
                        },
                        "updateMask": "status",
                    }]
                }),
            )
            .await?;
        Ok(VendorAck {
            platform_state: Some(status.to_string()),
            raw,
        })
    }

    async fn create_ad_group(
        &self,
        payload: &LaunchPayload,
        campaign: &str,
    ) -> Result<Option<String>, AdapterError> {
        if payload.audience.is_null() {
            return Ok(None);
        }
        let ad_group = self
            .mutate(
                "adGroups",
                json!({
                    "create": {
                        "name": format!("{} ad group", payload.title),
                        "campaign": campaign,
                        "status": "ENABLED",
                    }
                }),
            )
            .await?;
        Ok(Some(ad_group))
    }

    /// Remove a campaign whose launch did not complete. It was created
    /// paused, so a failed remove leaves nothing serving.
    async fn discard(&self, campaign: &str, cause: &AdapterError) {
        tracing::warn!(
            campaign_resource = campaign,
            error = %cause,
            "google ads launch incomplete; removing created campaign"
        );
        if let Err(e) = self.mutate("campaigns", json!({ "remove": campaign })).await {
            tracing::error!(
                campaign_resource = campaign,
                error = %e,
                "could not remove incomplete google ads campaign; it remains paused"
            );
        }
    }
}

fn trailing_id(resource_name: &str) -> String {
    resource_name
        .rsplit('/')
        .next()
        .unwrap_or(resource_name)
        .to_string()
}

#[async_trait]
impl ChannelAdapter for GoogleAdsAdapter {
    fn channel(&self) -> Channel {
        Channel::GoogleAds
    }

    async fn launch(&self, payload: &LaunchPayload) -> Result<ExternalIds, AdapterError> {
        let budget = self
            .mutate(
                "campaignBudgets",
                json!({
                    "create": {
                        "name": format!("{} budget", payload.title),
                        "amountMicros": self.daily_budget_micros,
                        "deliveryMethod": "STANDARD",
                    }
                }),
            )
            .await?;

        let campaign = self
            .mutate(
                "campaigns",
                json!({
                    "create": {
                        "name": payload.title,
                        "status": "PAUSED",
                        "advertisingChannelType": self.channel_type,
                        "campaignBudget": budget,
                        "manualCpc": {},
                    }
                }),
            )
            .await?;
        let mut ids = ExternalIds::new(self.customer_id.clone(), trailing_id(&campaign));

        let completed = match self.create_ad_group(payload, &campaign).await {
            Ok(ad_group) => {
                ids.ad_set_id = ad_group.as_deref().map(trailing_id);
                self.set_status(&ids, "ENABLED").await.map(|_| ())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = completed {
            self.discard(&campaign, &e).await;
            return Err(e);
        }
        Ok(ids)
    }

    async fn pause(&self, ids: &ExternalIds) -> Result<VendorAck, AdapterError> {
        self.set_status(ids, "PAUSED").await
    }

    async fn resume(&self, ids: &ExternalIds) -> Result<VendorAck, AdapterError> {
        self.set_status(ids, "ENABLED").await
    }

    async fn get_status(&self, ids: &ExternalIds) -> Result<RawStatus, AdapterError> {
        let path = format!("customers/{}/googleAds:search", self.customer_id);
        let query = format!(
            "SELECT campaign.status, campaign.serving_status, metrics.cost_micros, \
             metrics.ctr, metrics.average_cpc, metrics.conversions_value \
             FROM campaign WHERE campaign.id = {}",
            ids.campaign_id
        );
        self.client.post_json(&path, &json!({ "query": query })).await
    }

    fn normalize(&self, raw: RawStatus) -> Result<NormalizedStatus, AdapterError> {
        normalize(raw)
    }
}

/// `{"results": [{"campaign": {"status": ..., "servingStatus": ...}, "metrics": {...}}]}`
pub fn normalize(raw: RawStatus) -> Result<NormalizedStatus, AdapterError> {
    let row = raw
        .pointer("/results/0")
        .ok_or_else(|| AdapterError::invalid("search returned no campaign row"))?;
    let status = row
        .pointer("/campaign/status")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::invalid("campaign row has no status"))?;
    let serving = row.pointer("/campaign/servingStatus").and_then(Value::as_str);

    let metrics_obj = row.get("metrics").cloned().unwrap_or(Value::Null);
    let spend = decimal_field(&metrics_obj, "costMicros")
        .map(from_micros)
        .unwrap_or_default();
    let conversions_value = decimal_field(&metrics_obj, "conversionsValue");
    let roi = match conversions_value {
        Some(value) if spend > Decimal::ZERO => Some((value / spend).round_dp(4)),
        _ => None,
    };

    let metrics = MetricSnapshot {
        spend,
        roi,
        ctr: decimal_field(&metrics_obj, "ctr"),
        cpc: decimal_field(&metrics_obj, "averageCpc").map(from_micros),
    };

    Ok(NormalizedStatus {
        state: map_state(status, serving),
        platform_state: status.to_string(),
        metrics,
        native: raw.clone(),
        observed_at: OffsetDateTime::now_utc(),
    })
}
