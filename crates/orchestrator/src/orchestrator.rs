//! Lifecycle operations over campaign records.
//!
//! Every mutation that needs a vendor call runs in three steps so that the
//! per-campaign lock is never held across network I/O:
//!
//! 1. **claim**: under the lock, check the precondition and write an
//!    in-flight marker. A second caller now sees the campaign as busy.
//! 2. **vendor call**: no lock held.
//! 3. **settle**: under the lock, verify the marker is still ours, apply
//!    the outcome, clear the marker, append the audit entry, commit.
//!
//! If the marker vanished in between (the campaign was archived), the
//! vendor result is discarded and the caller gets `InvalidTransition`.

use std::sync::Arc;

use pacer_channels::{AdapterError, AdapterRegistry, ChannelAdapter, LaunchPayload};
use pacer_core::{
    AuditEventKind, AuditLogEntry, CampaignEvent, CampaignOperation, CampaignState, CanonicalState, Channel,
    EventPayload, ExternalIds, GuardrailRule, MetricSnapshot, NormalizedStatus,
};
use pacer_storage::{CampaignRecord, CampaignStorage, InFlightClaim};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::notifier::EventNotifier;
use crate::scheduler::TickScheduler;

/// Actor recorded for mutations the system makes on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Actor recorded for guardrail auto-pauses.
pub const GUARDRAIL_ACTOR: &str = "guardrail";

/// Read model returned by [`Orchestrator::get_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignStatusView {
    pub campaign_id: String,
    pub title: String,
    pub channel: Channel,
    pub owning_team_id: String,
    pub state: CampaignState,
    pub platform_state: Option<String>,
    pub metrics: Option<MetricSnapshot>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ids: Option<ExternalIds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<CampaignOperation>,
}

impl From<&CampaignRecord> for CampaignStatusView {
    fn from(record: &CampaignRecord) -> Self {
        CampaignStatusView {
            campaign_id: record.id.clone(),
            title: record.title.clone(),
            channel: record.channel,
            owning_team_id: record.owning_team_id.clone(),
            state: record.state,
            platform_state: record.platform_state.clone(),
            metrics: record.last_metrics.clone(),
            last_updated: record.status_updated_at,
            paused_reason: record.paused_reason.clone(),
            external_ids: record.external_ids.clone(),
            in_flight: record.in_flight.as_ref().map(|c| c.operation),
        }
    }
}

/// Outcome of [`Orchestrator::refresh_status`].
#[derive(Debug, Clone)]
pub struct Refreshed {
    /// The record as committed after the refresh.
    pub record: CampaignRecord,
    pub status: NormalizedStatus,
}

/// A claimed campaign between step 1 and step 3.
struct Claim {
    record: CampaignRecord,
    token: i64,
}

/// Executes launch, pause, resume, refresh, finalize and archive against
/// one storage backend.
pub struct Orchestrator<S: CampaignStorage> {
    storage: Arc<S>,
    registry: Arc<AdapterRegistry>,
    notifier: Arc<dyn EventNotifier>,
    ticks: Arc<dyn TickScheduler>,
    config: OrchestratorConfig,
}

impl<S: CampaignStorage> Orchestrator<S> {
    pub fn new(
        storage: Arc<S>,
        registry: Arc<AdapterRegistry>,
        notifier: Arc<dyn EventNotifier>,
        ticks: Arc<dyn TickScheduler>,
        config: OrchestratorConfig,
    ) -> Self {
        Orchestrator {
            storage,
            registry,
            notifier,
            ticks,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn ticks(&self) -> &Arc<dyn TickScheduler> {
        &self.ticks
    }

    // ── Inbound operations ───────────────────────────────────────────────────

    /// Launch a `Scheduled` campaign on its vendor.
    ///
    /// Fatal adapter errors move the campaign to `Failed`; recoverable ones
    /// leave it `Scheduled` so the caller can retry. Either way the error
    /// is audited and returned.
    pub async fn launch(
        &self,
        campaign_id: &str,
        actor: &str,
    ) -> Result<CampaignRecord, OrchestratorError> {
        let claim = self.claim(campaign_id, CampaignOperation::Launch).await?;

        let launched = match self.adapter_for(&claim.record).await {
            Ok(adapter) => {
                let payload = LaunchPayload {
                    title: claim.record.title.clone(),
                    audience: claim.record.audience.clone(),
                    creatives: claim.record.creatives.clone(),
                };
                adapter.launch(&payload).await
            }
            Err(e) => Err(e),
        };

        let ids = match launched {
            Ok(ids) => ids,
            Err(e) => return Err(self.launch_failed(campaign_id, claim, actor, e).await),
        };

        let record = self
            .settle(campaign_id, claim.token, CampaignOperation::Launch, |record| {
                record.state = CampaignState::Launched;
                record.external_ids = Some(ids.clone());
                record.paused_reason = None;
                vec![AuditLogEntry::success(
                    campaign_id,
                    AuditEventKind::Launch,
                    format!("launched on {}", record.channel),
                )
                .with_actor(actor)
                .with_details(json!({ "external_ids": ids }))]
            })
            .await?;

        tracing::info!(
            campaign_id,
            vendor_campaign_id = %ids.campaign_id,
            actor,
            "campaign launched"
        );
        self.emit_status(&record);
        self.ticks
            .schedule(campaign_id, self.config.initial_tick_delay());
        Ok(record)
    }

    /// Pause a `Launched` campaign. Adapter errors leave the state as it was.
    pub async fn pause(
        &self,
        campaign_id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<CampaignRecord, OrchestratorError> {
        let claim = self.claim(campaign_id, CampaignOperation::Pause).await?;
        let reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("paused by {}", actor));

        let ack = match self.vendor_ids(&claim.record) {
            Ok(ids) => match self.adapter_for(&claim.record).await {
                Ok(adapter) => adapter.pause(&ids).await.map_err(OrchestratorError::from),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };
        let ack = match ack {
            Ok(ack) => ack,
            Err(e) => {
                return Err(self
                    .mutation_failed(campaign_id, claim, actor, CampaignOperation::Pause, e)
                    .await)
            }
        };

        let record = self
            .settle(campaign_id, claim.token, CampaignOperation::Pause, |record| {
                record.state = CampaignState::Paused;
                record.paused_reason = Some(reason.clone());
                if ack.platform_state.is_some() {
                    record.platform_state = ack.platform_state.clone();
                }
                vec![
                    AuditLogEntry::success(campaign_id, AuditEventKind::Pause, reason.clone())
                        .with_actor(actor)
                        .with_details(json!({ "reason": reason }))
                        .with_raw_payload(ack.raw.clone()),
                ]
            })
            .await?;

        tracing::info!(campaign_id, actor, reason = %reason, "campaign paused");
        self.emit_status(&record);
        Ok(record)
    }

    /// Resume a `Paused` campaign and make sure its reconciliation loop runs.
    pub async fn resume(
        &self,
        campaign_id: &str,
        actor: &str,
    ) -> Result<CampaignRecord, OrchestratorError> {
        let claim = self.claim(campaign_id, CampaignOperation::Resume).await?;

        let ack = match self.vendor_ids(&claim.record) {
            Ok(ids) => match self.adapter_for(&claim.record).await {
                Ok(adapter) => adapter.resume(&ids).await.map_err(OrchestratorError::from),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };
        let ack = match ack {
            Ok(ack) => ack,
            Err(e) => {
                return Err(self
                    .mutation_failed(campaign_id, claim, actor, CampaignOperation::Resume, e)
                    .await)
            }
        };

        let record = self
            .settle(campaign_id, claim.token, CampaignOperation::Resume, |record| {
                record.state = CampaignState::Launched;
                record.paused_reason = None;
                if ack.platform_state.is_some() {
                    record.platform_state = ack.platform_state.clone();
                }
                vec![
                    AuditLogEntry::success(campaign_id, AuditEventKind::Resume, "resumed")
                        .with_actor(actor)
                        .with_raw_payload(ack.raw.clone()),
                ]
            })
            .await?;

        tracing::info!(campaign_id, actor, "campaign resumed");
        self.emit_status(&record);
        self.ticks
            .schedule(campaign_id, self.config.initial_tick_delay());
        Ok(record)
    }

    /// Archive a campaign from any state. No vendor call is made; any
    /// in-flight claim is dropped so its vendor result will be discarded.
    pub async fn archive(
        &self,
        campaign_id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<CampaignRecord, OrchestratorError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let mut record = match self.storage.get_campaign_for_update(&mut snap, campaign_id).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        };

        if record.state == CampaignState::Archived {
            self.storage.abort_snapshot(snap).await?;
            tracing::debug!(campaign_id, "archive of archived campaign is a no-op");
            return Ok(record);
        }

        let from = record.state;
        let version = record.version;
        let dropped_claim = record.in_flight.take().map(|c| c.operation);
        record.state = CampaignState::Archived;

        let message = match reason {
            Some(r) => format!("archived from {}: {}", from, r),
            None => format!("archived from {}", from),
        };
        let entry = AuditLogEntry::success(campaign_id, AuditEventKind::Archive, message)
            .with_actor(actor)
            .with_details(json!({
                "from": from,
                "reason": reason,
                "dropped_in_flight": dropped_claim,
            }));

        let record = self
            .commit_update(snap, record, version, vec![entry])
            .await?;

        tracing::info!(campaign_id, actor, from = %from, "campaign archived");
        self.emit_status(&record);
        Ok(record)
    }

    // ── Reconciliation support ───────────────────────────────────────────────

    /// Fetch and normalize vendor status, store it on the record, and audit
    /// the ingest. Only legal while the campaign is `Launched` or `Paused`.
    ///
    /// A vendor failure is audited as a `MetricIngest` error and returned;
    /// the record itself is left untouched.
    pub async fn refresh_status(&self, campaign_id: &str) -> Result<Refreshed, OrchestratorError> {
        let record = self.storage.get_campaign(campaign_id).await?;
        if !record.state.is_reconcilable() {
            return Err(OrchestratorError::NotReconcilable {
                campaign_id: campaign_id.to_string(),
                state: record.state,
            });
        }
        let ids = self.vendor_ids(&record)?;

        let fetched = match self.adapter_for(&record).await {
            Ok(adapter) => match adapter.get_status(&ids).await {
                Ok(raw) => adapter.normalize(raw),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        let status = match fetched {
            Ok(status) => status,
            Err(e) => {
                let entry = AuditLogEntry::error(
                    campaign_id,
                    AuditEventKind::MetricIngest,
                    format!("status refresh failed: {}", e),
                )
                .with_details(json!({ "error_kind": e.kind(), "recoverable": e.is_recoverable() }));
                if let Err(audit_err) = self.append_audit(entry).await {
                    tracing::error!(campaign_id, error = %audit_err, "failed to audit refresh error");
                }
                return Err(e.into());
            }
        };

        let mut snap = self.storage.begin_snapshot().await?;
        let mut current = match self.storage.get_campaign_for_update(&mut snap, campaign_id).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        };
        // The campaign may have been archived while the vendor call ran.
        if !current.state.is_reconcilable() {
            self.storage.abort_snapshot(snap).await?;
            tracing::debug!(campaign_id, state = %current.state, "discarding status for unreconciled campaign");
            return Err(OrchestratorError::NotReconcilable {
                campaign_id: campaign_id.to_string(),
                state: current.state,
            });
        }

        let label_changed = current.platform_state.as_deref() != Some(status.platform_state.as_str());
        let version = current.version;
        current.platform_state = Some(status.platform_state.clone());
        current.last_metrics = Some(status.metrics.clone());
        current.status_updated_at = Some(status.observed_at);

        let entry = AuditLogEntry::success(
            campaign_id,
            AuditEventKind::MetricIngest,
            format!("vendor reports {} ({})", status.platform_state, status.state),
        )
        .with_details(json!({
            "state": status.state,
            "platform_state": status.platform_state,
            "metrics": status.metrics,
        }))
        .with_raw_payload(status.native.clone());

        let record = self
            .commit_update(snap, current, version, vec![entry])
            .await?;

        if label_changed {
            self.emit_status(&record);
        }
        self.emit(
            &record,
            EventPayload::MetricsUpdated {
                platform_status: status.platform_state.clone(),
                metrics: status.metrics.clone(),
            },
        );
        Ok(Refreshed { record, status })
    }

    /// Move a `Launched` campaign to `Completed` or `Failed` because its
    /// vendor reports a terminal status.
    pub async fn finalize(
        &self,
        campaign_id: &str,
        status: &NormalizedStatus,
    ) -> Result<CampaignRecord, OrchestratorError> {
        let (operation, kind) = match status.state {
            CanonicalState::Completed => (CampaignOperation::Complete, AuditEventKind::Complete),
            CanonicalState::Failed => (CampaignOperation::Fail, AuditEventKind::Fail),
            ref other => {
                return Err(OrchestratorError::Inconsistent {
                    campaign_id: campaign_id.to_string(),
                    message: format!("vendor status {} is not terminal", other),
                })
            }
        };

        let mut snap = self.storage.begin_snapshot().await?;
        let mut record = match self.storage.get_campaign_for_update(&mut snap, campaign_id).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        };

        let now = OffsetDateTime::now_utc();
        let busy = record
            .live_claim(now, self.config.claim_ttl())
            .map(|c| c.operation);
        let next = match (busy, record.state.apply(operation)) {
            (None, Ok(next)) => next,
            (in_flight, _) => {
                self.storage.abort_snapshot(snap).await?;
                return Err(OrchestratorError::InvalidTransition {
                    campaign_id: campaign_id.to_string(),
                    state: record.state,
                    operation,
                    in_flight,
                });
            }
        };

        let version = record.version;
        record.state = next;
        record.in_flight = None;
        record.platform_state = Some(status.platform_state.clone());

        let entry = AuditLogEntry::success(
            campaign_id,
            kind,
            format!("vendor reports terminal status {}", status.platform_state),
        )
        .with_actor(SYSTEM_ACTOR)
        .with_details(json!({ "state": status.state, "platform_state": status.platform_state }))
        .with_raw_payload(status.native.clone());

        let record = self
            .commit_update(snap, record, version, vec![entry])
            .await?;

        tracing::info!(campaign_id, state = %record.state, "campaign reached terminal state");
        self.emit_status(&record);
        Ok(record)
    }

    /// Audit and announce a guardrail that fired.
    pub async fn record_alert(
        &self,
        record: &CampaignRecord,
        rule: &GuardrailRule,
        value: Decimal,
    ) -> Result<(), OrchestratorError> {
        let entry = AuditLogEntry::success(
            &record.id,
            AuditEventKind::AlertTrigger,
            format!("guardrail {} fired: {} (observed {})", rule.id, rule.condition(), value),
        )
        .with_details(json!({
            "rule_id": rule.id,
            "metric": rule.metric_key,
            "value": value,
            "comparator": rule.comparator,
            "threshold": rule.threshold,
            "action": rule.action,
        }));
        self.append_audit(entry).await?;

        self.emit(
            record,
            EventPayload::AlertTriggered {
                rule_id: rule.id.clone(),
                metric: rule.metric_key,
                value,
                comparator: rule.comparator,
                threshold: rule.threshold,
                action: rule.action,
            },
        );
        Ok(())
    }

    /// Schedule a tick for every campaign that should be reconciled.
    /// Called once at startup. Returns how many were scheduled.
    pub async fn recover(&self) -> Result<usize, OrchestratorError> {
        let mut count = 0;
        for state in [CampaignState::Launched, CampaignState::Paused] {
            for record in self.storage.list_campaigns(None, Some(state)).await? {
                self.ticks
                    .schedule(&record.id, self.config.initial_tick_delay());
                count += 1;
            }
        }
        tracing::info!(count, "reconciliation recovered");
        Ok(count)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn get_status(&self, campaign_id: &str) -> Result<CampaignStatusView, OrchestratorError> {
        let record = self.storage.get_campaign(campaign_id).await?;
        Ok(CampaignStatusView::from(&record))
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<CampaignRecord, OrchestratorError> {
        Ok(self.storage.get_campaign(campaign_id).await?)
    }

    /// Audit entries of one campaign, oldest first.
    pub async fn audit_log(&self, campaign_id: &str) -> Result<Vec<AuditLogEntry>, OrchestratorError> {
        // Distinguish "no such campaign" from "no entries yet".
        self.storage.get_campaign(campaign_id).await?;
        Ok(self.storage.list_audit_entries(campaign_id).await?)
    }

    pub async fn list_campaigns(
        &self,
        owning_team_id: Option<&str>,
    ) -> Result<Vec<CampaignStatusView>, OrchestratorError> {
        let mut records = self.storage.list_campaigns(owning_team_id, None).await?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records.iter().map(CampaignStatusView::from).collect())
    }

    // ── Claim protocol ───────────────────────────────────────────────────────

    /// Step 1: check the precondition and mark the campaign busy.
    async fn claim(
        &self,
        campaign_id: &str,
        operation: CampaignOperation,
    ) -> Result<Claim, OrchestratorError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let mut record = match self.storage.get_campaign_for_update(&mut snap, campaign_id).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        };

        let now = OffsetDateTime::now_utc();
        if let Some(busy) = record.live_claim(now, self.config.claim_ttl()) {
            let in_flight = Some(busy.operation);
            self.storage.abort_snapshot(snap).await?;
            return Err(OrchestratorError::InvalidTransition {
                campaign_id: campaign_id.to_string(),
                state: record.state,
                operation,
                in_flight,
            });
        }
        if let Err(e) = record.state.apply(operation) {
            self.storage.abort_snapshot(snap).await?;
            return Err(OrchestratorError::invalid(campaign_id, e.state, e.operation));
        }
        if let Some(stale) = &record.in_flight {
            tracing::warn!(
                campaign_id,
                abandoned = %stale.operation,
                claimed_at = %stale.claimed_at,
                "overtaking abandoned in-flight claim"
            );
        }

        let token = record.version;
        record.in_flight = Some(InFlightClaim {
            operation,
            token,
            claimed_at: now,
        });
        let record = self.commit_update(snap, record, token, Vec::new()).await?;
        Ok(Claim { record, token })
    }

    /// Step 3: apply a vendor outcome if our claim is still in place.
    ///
    /// `apply` mutates the record and returns the audit entries to commit
    /// with it. The claim is cleared either way.
    async fn settle<F>(
        &self,
        campaign_id: &str,
        token: i64,
        operation: CampaignOperation,
        apply: F,
    ) -> Result<CampaignRecord, OrchestratorError>
    where
        F: FnOnce(&mut CampaignRecord) -> Vec<AuditLogEntry> + Send,
    {
        let mut snap = self.storage.begin_snapshot().await?;
        let mut record = match self.storage.get_campaign_for_update(&mut snap, campaign_id).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        };

        let ours = record
            .in_flight
            .as_ref()
            .is_some_and(|c| c.token == token && c.operation == operation);
        if !ours {
            self.storage.abort_snapshot(snap).await?;
            tracing::warn!(
                campaign_id,
                operation = %operation,
                state = %record.state,
                "in-flight claim lost; discarding vendor result"
            );
            return Err(OrchestratorError::invalid(campaign_id, record.state, operation));
        }

        let version = record.version;
        record.in_flight = None;
        let entries = apply(&mut record);
        self.commit_update(snap, record, version, entries).await
    }

    /// Fatal launch errors fail the campaign; recoverable ones only release
    /// the claim. Returns the error to hand back to the caller.
    async fn launch_failed(
        &self,
        campaign_id: &str,
        claim: Claim,
        actor: &str,
        error: AdapterError,
    ) -> OrchestratorError {
        let recoverable = error.is_recoverable();
        let entry = AuditLogEntry::error(
            campaign_id,
            AuditEventKind::Launch,
            format!("launch failed: {}", error),
        )
        .with_actor(actor)
        .with_details(json!({ "error_kind": error.kind(), "recoverable": recoverable }));

        let settled = self
            .settle(campaign_id, claim.token, CampaignOperation::Launch, |record| {
                let mut entries = vec![entry];
                if !recoverable {
                    record.state = CampaignState::Failed;
                    entries.push(
                        AuditLogEntry::success(
                            campaign_id,
                            AuditEventKind::Fail,
                            "launch failed irrecoverably",
                        )
                        .with_actor(SYSTEM_ACTOR),
                    );
                }
                entries
            })
            .await;

        tracing::warn!(campaign_id, error = %error, recoverable, "launch failed");
        self.emit(
            &claim.record,
            EventPayload::ExecutionError {
                operation: CampaignOperation::Launch,
                error: error.to_string(),
                recoverable,
            },
        );
        match settled {
            Ok(record) if record.state == CampaignState::Failed => self.emit_status(&record),
            Ok(_) => {}
            Err(e) => tracing::warn!(campaign_id, error = %e, "could not record launch failure"),
        }
        OrchestratorError::Adapter(error)
    }

    /// Release the claim after a failed pause or resume, auditing the error.
    async fn mutation_failed(
        &self,
        campaign_id: &str,
        claim: Claim,
        actor: &str,
        operation: CampaignOperation,
        error: OrchestratorError,
    ) -> OrchestratorError {
        let kind = match operation {
            CampaignOperation::Resume => AuditEventKind::Resume,
            _ => AuditEventKind::Pause,
        };
        let (error_kind, recoverable) = match &error {
            OrchestratorError::Adapter(e) => (e.kind(), e.is_recoverable()),
            _ => ("internal", false),
        };
        let entry = AuditLogEntry::error(campaign_id, kind, format!("{} failed: {}", operation, error))
            .with_actor(actor)
            .with_details(json!({ "error_kind": error_kind, "recoverable": recoverable }));

        if let Err(e) = self
            .settle(campaign_id, claim.token, operation, |_| vec![entry])
            .await
        {
            tracing::warn!(campaign_id, error = %e, "could not release claim after failure");
        }

        tracing::warn!(campaign_id, operation = %operation, error = %error, "vendor mutation failed");
        self.emit(
            &claim.record,
            EventPayload::ExecutionError {
                operation,
                error: error.to_string(),
                recoverable,
            },
        );
        error
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    async fn adapter_for(
        &self,
        record: &CampaignRecord,
    ) -> Result<Arc<dyn ChannelAdapter>, AdapterError> {
        self.registry
            .resolve(&record.owning_team_id, record.channel)
            .await
    }

    fn vendor_ids(&self, record: &CampaignRecord) -> Result<ExternalIds, OrchestratorError> {
        record
            .external_ids
            .clone()
            .ok_or_else(|| OrchestratorError::Inconsistent {
                campaign_id: record.id.clone(),
                message: format!("{} campaign has no external ids", record.state),
            })
    }

    /// Stage `record` plus `entries` in `snap` and commit.
    async fn commit_update(
        &self,
        mut snap: S::Snapshot,
        mut record: CampaignRecord,
        expected_version: i64,
        entries: Vec<AuditLogEntry>,
    ) -> Result<CampaignRecord, OrchestratorError> {
        let staged = self
            .storage
            .update_campaign(&mut snap, record.clone(), expected_version)
            .await;
        let new_version = match staged {
            Ok(v) => v,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        };
        for entry in entries {
            if let Err(e) = self.storage.append_audit_entry(&mut snap, entry).await {
                let _ = self.storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
        }
        self.storage.commit_snapshot(snap).await?;
        record.version = new_version;
        Ok(record)
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<(), OrchestratorError> {
        let mut snap = self.storage.begin_snapshot().await?;
        if let Err(e) = self.storage.append_audit_entry(&mut snap, entry).await {
            let _ = self.storage.abort_snapshot(snap).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snap).await?;
        Ok(())
    }

    fn emit_status(&self, record: &CampaignRecord) {
        self.emit(
            record,
            EventPayload::StatusChanged {
                status: record.state,
                platform_status: record.platform_state.clone(),
            },
        );
    }

    fn emit(&self, record: &CampaignRecord, payload: EventPayload) {
        self.notifier
            .notify(CampaignEvent::new(&record.id, &record.owning_team_id, payload));
    }
}
