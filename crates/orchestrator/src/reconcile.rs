//! The periodic reconciliation loop.
//!
//! A tick refreshes one campaign's vendor status, evaluates its guardrails,
//! finalizes it if the vendor reports a terminal state, and schedules the
//! next tick. Ticks for a campaign stop once it is no longer `Launched` or
//! `Paused`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pacer_core::CampaignState;
use pacer_storage::CampaignStorage;

use crate::alerts::AlertRuleEvaluator;
use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;
use crate::scheduler::BackoffPolicy;

/// What a tick did, and whether another one was scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The campaign is not reconcilable (or gone); no tick scheduled.
    Skipped { state: Option<CampaignState> },
    /// Next tick scheduled after `delay`.
    Rescheduled { delay: Duration },
    /// The campaign reached a terminal state; no tick scheduled.
    Finished { state: CampaignState },
    /// Vendor reports a terminal state for a paused campaign. Polling stops
    /// and the record is left for an operator.
    Stalled,
}

pub struct ReconciliationScheduler<S: CampaignStorage> {
    orchestrator: Arc<Orchestrator<S>>,
    evaluator: AlertRuleEvaluator,
    backoff: BackoffPolicy,
    failures: Mutex<HashMap<String, u32>>,
}

impl<S: CampaignStorage> ReconciliationScheduler<S> {
    pub fn new(orchestrator: Arc<Orchestrator<S>>) -> Self {
        let config = orchestrator.config();
        let backoff = BackoffPolicy::new(config.tick_interval(), config.max_backoff());
        ReconciliationScheduler {
            orchestrator,
            evaluator: AlertRuleEvaluator::new(),
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Consecutive failed ticks for a campaign.
    pub fn failures(&self, campaign_id: &str) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(campaign_id)
            .copied()
            .unwrap_or(0)
    }

    /// Run one reconciliation tick for `campaign_id`.
    pub async fn tick(&self, campaign_id: &str) -> TickOutcome {
        let refreshed = match self.orchestrator.refresh_status(campaign_id).await {
            Ok(r) => r,
            Err(OrchestratorError::NotReconcilable { state, .. }) => {
                tracing::debug!(campaign_id, state = %state, "campaign no longer reconciled");
                self.reset_failures(campaign_id);
                return TickOutcome::Skipped { state: Some(state) };
            }
            Err(OrchestratorError::CampaignNotFound { .. }) => {
                tracing::warn!(campaign_id, "tick for unknown campaign dropped");
                self.reset_failures(campaign_id);
                return TickOutcome::Skipped { state: None };
            }
            Err(e) => return self.backoff_after(campaign_id, &e),
        };
        self.reset_failures(campaign_id);

        let record = refreshed.record;
        let status = refreshed.status;

        if let Err(e) = self.evaluator.evaluate(&self.orchestrator, &record, &status).await {
            tracing::warn!(campaign_id, error = %e, "guardrail evaluation failed");
        }

        if status.state.is_terminal() {
            return self.finish(campaign_id, &status).await;
        }
        self.reschedule(campaign_id, self.backoff.interval)
    }

    async fn finish(&self, campaign_id: &str, status: &pacer_core::NormalizedStatus) -> TickOutcome {
        match self.orchestrator.finalize(campaign_id, status).await {
            Ok(record) => TickOutcome::Finished {
                state: record.state,
            },
            Err(OrchestratorError::InvalidTransition {
                state, in_flight, ..
            }) => match (state, in_flight) {
                // A mutation is mid-flight; look again next interval.
                (_, Some(op)) => {
                    tracing::debug!(campaign_id, in_flight = %op, "finalize deferred");
                    self.reschedule(campaign_id, self.backoff.interval)
                }
                (CampaignState::Paused, None) => {
                    tracing::warn!(
                        campaign_id,
                        platform_state = %status.platform_state,
                        "vendor reports terminal status for paused campaign; polling stopped"
                    );
                    TickOutcome::Stalled
                }
                (state, None) => TickOutcome::Skipped { state: Some(state) },
            },
            Err(e) => self.backoff_after(campaign_id, &e),
        }
    }

    fn backoff_after(&self, campaign_id: &str, error: &OrchestratorError) -> TickOutcome {
        let failures = {
            let mut map = self.failures.lock().unwrap_or_else(|e| e.into_inner());
            let count = map.entry(campaign_id.to_string()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        let mut delay = self.backoff.delay(failures);
        if let OrchestratorError::Adapter(adapter) = error {
            if let Some(retry_after) = adapter.retry_after() {
                delay = delay.max(retry_after);
            }
        }

        if error.is_recoverable() {
            tracing::warn!(campaign_id, failures, error = %error, ?delay, "tick failed; backing off");
        } else {
            tracing::error!(campaign_id, failures, error = %error, ?delay, "tick failed; backing off");
        }
        self.reschedule(campaign_id, delay)
    }

    fn reschedule(&self, campaign_id: &str, delay: Duration) -> TickOutcome {
        self.orchestrator.ticks().schedule(campaign_id, delay);
        TickOutcome::Rescheduled { delay }
    }

    fn reset_failures(&self, campaign_id: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(campaign_id);
    }
}
