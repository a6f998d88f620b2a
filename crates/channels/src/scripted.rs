//! In-process adapter with scripted responses.
//!
//! Used by tests and by `pacer serve --dry-run`. Counts every vendor call
//! per operation so callers can assert that a mutation hit the vendor
//! exactly once.
//!
//! Raw status shape: `{"state": "running", "spend": "0", "roi": "1.2", ...}`
//! where `state` is a canonical label or anything else (passed through).

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use pacer_core::{
    CampaignOperation, CanonicalState, Channel, ExternalIds, MetricSnapshot, NormalizedStatus,
};
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::adapter::{ChannelAdapter, LaunchPayload, RawStatus, VendorAck};
use crate::error::AdapterError;
use crate::numeric::decimal_field;

struct Script {
    external_ids: ExternalIds,
    failures: HashMap<CampaignOperation, VecDeque<AdapterError>>,
    status_failures: VecDeque<AdapterError>,
    statuses: VecDeque<Value>,
    fallback_status: Value,
    calls: HashMap<CampaignOperation, usize>,
    status_calls: usize,
}

pub struct ScriptedAdapter {
    channel: Channel,
    latency: Duration,
    script: Mutex<Script>,
}

impl ScriptedAdapter {
    /// Launch answers `{account_id: "a1", campaign_id: "c1"}`; status
    /// answers `running` with zero spend until something else is pushed.
    pub fn new(channel: Channel) -> Self {
        ScriptedAdapter {
            channel,
            latency: Duration::ZERO,
            script: Mutex::new(Script {
                external_ids: ExternalIds::new("a1", "c1"),
                failures: HashMap::new(),
                status_failures: VecDeque::new(),
                statuses: VecDeque::new(),
                fallback_status: json!({"state": "running", "spend": "0"}),
                calls: HashMap::new(),
                status_calls: 0,
            }),
        }
    }

    pub fn with_external_ids(self, ids: ExternalIds) -> Self {
        self.script().external_ids = ids;
        self
    }

    /// Delay every call, to widen race windows in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next call of `operation` (launch, pause or resume).
    pub fn fail_next(&self, operation: CampaignOperation, error: AdapterError) {
        self.script()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fail the next `get_status` call.
    pub fn fail_next_status(&self, error: AdapterError) {
        self.script().status_failures.push_back(error);
    }

    /// Queue a raw status. The last queued status keeps answering once the
    /// queue drains to it.
    pub fn push_status(&self, raw: Value) {
        self.script().statuses.push_back(raw);
    }

    /// Replace every queued status with this one.
    pub fn set_status(&self, raw: Value) {
        let mut script = self.script();
        script.statuses.clear();
        script.statuses.push_back(raw);
    }

    /// Number of vendor calls made for `operation`.
    pub fn calls(&self, operation: CampaignOperation) -> usize {
        self.script().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn status_calls(&self) -> usize {
        self.script().status_calls
    }

    // Recover data even if the mutex was poisoned by a panicking test thread
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn mutate(&self, operation: CampaignOperation) -> Result<(), AdapterError> {
        let failure = {
            let mut script = self.script();
            *script.calls.entry(operation).or_insert(0) += 1;
            script
                .failures
                .get_mut(&operation)
                .and_then(|queue| queue.pop_front())
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn launch(&self, _payload: &LaunchPayload) -> Result<ExternalIds, AdapterError> {
        self.mutate(CampaignOperation::Launch).await?;
        Ok(self.script().external_ids.clone())
    }

    async fn pause(&self, _ids: &ExternalIds) -> Result<VendorAck, AdapterError> {
        self.mutate(CampaignOperation::Pause).await?;
        Ok(VendorAck {
            platform_state: Some("paused".to_string()),
            raw: json!({"ok": true}),
        })
    }

    async fn resume(&self, _ids: &ExternalIds) -> Result<VendorAck, AdapterError> {
        self.mutate(CampaignOperation::Resume).await?;
        Ok(VendorAck {
            platform_state: Some("running".to_string()),
            raw: json!({"ok": true}),
        })
    }

    async fn get_status(&self, _ids: &ExternalIds) -> Result<RawStatus, AdapterError> {
        let next = {
            let mut script = self.script();
            script.status_calls += 1;
            match script.status_failures.pop_front() {
                Some(e) => Err(e),
                None if script.statuses.len() > 1 => Ok(script.statuses.pop_front()),
                None => Ok(script.statuses.front().cloned()),
            }
            .map(|queued| queued.unwrap_or_else(|| script.fallback_status.clone()))
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        next
    }

    fn normalize(&self, raw: RawStatus) -> Result<NormalizedStatus, AdapterError> {
        let label = raw
            .get("state")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::invalid("scripted status has no 'state'"))?
            .to_string();
        let metrics = MetricSnapshot {
            spend: decimal_field(&raw, "spend").unwrap_or_default(),
            roi: decimal_field(&raw, "roi"),
            ctr: decimal_field(&raw, "ctr"),
            cpc: decimal_field(&raw, "cpc"),
        };
        Ok(NormalizedStatus {
            state: CanonicalState::from(label.clone()),
            platform_state: label,
            metrics,
            native: raw,
            observed_at: OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_calls_and_replays_failures_once() {
        let adapter = ScriptedAdapter::new(Channel::Meta);
        adapter.fail_next(
            CampaignOperation::Pause,
            AdapterError::Transient {
                message: "blip".into(),
            },
        );
        let ids = ExternalIds::new("a1", "c1");

        assert!(adapter.pause(&ids).await.is_err());
        assert!(adapter.pause(&ids).await.is_ok());
        assert_eq!(adapter.calls(CampaignOperation::Pause), 2);
        assert_eq!(adapter.calls(CampaignOperation::Resume), 0);
    }

    #[tokio::test]
    async fn status_queue_drains_to_last_entry() {
        let adapter = ScriptedAdapter::new(Channel::GoogleAds);
        adapter.push_status(json!({"state": "running", "spend": "5", "roi": "2.0"}));
        adapter.push_status(json!({"state": "completed", "spend": "9"}));
        let ids = ExternalIds::new("a1", "c1");

        let first = adapter.normalize(adapter.get_status(&ids).await.unwrap()).unwrap();
        assert_eq!(first.state, CanonicalState::Running);
        assert!(first.metrics.roi.is_some());

        for _ in 0..2 {
            let next = adapter.normalize(adapter.get_status(&ids).await.unwrap()).unwrap();
            assert_eq!(next.state, CanonicalState::Completed);
        }
        assert_eq!(adapter.status_calls(), 3);
    }

    #[tokio::test]
    async fn launch_normalize_round_trip_is_canonical() {
        let adapter = ScriptedAdapter::new(Channel::Meta);
        let payload = LaunchPayload {
            title: "t".into(),
            audience: Value::Null,
            creatives: vec![],
        };
        let ids = adapter.launch(&payload).await.unwrap();
        assert_eq!(ids, ExternalIds::new("a1", "c1"));

        let status = adapter
            .normalize(adapter.get_status(&ids).await.unwrap())
            .unwrap();
        assert!(matches!(
            status.state,
            CanonicalState::Running
                | CanonicalState::Paused
                | CanonicalState::Completed
                | CanonicalState::Failed
        ));
    }

    #[test]
    fn unknown_label_passes_through() {
        let adapter = ScriptedAdapter::new(Channel::Meta);
        let status = adapter.normalize(json!({"state": "LEARNING"})).unwrap();
        assert_eq!(status.state, CanonicalState::Unmapped("LEARNING".into()));
    }
}
