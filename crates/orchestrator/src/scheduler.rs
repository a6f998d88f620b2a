//! Work-scheduling seam for reconciliation ticks.
//!
//! The orchestrator and the reconciliation loop only ever say "run a tick
//! for this campaign after this delay" through [`TickScheduler`]. In
//! production that is a [`TickQueue`] drained by a [`TickDriver`] task; in
//! tests it is a [`RecordingScheduler`] and ticks are driven by hand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pacer_storage::CampaignStorage;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::reconcile::ReconciliationScheduler;

pub trait TickScheduler: Send + Sync {
    /// Request a reconciliation tick for `campaign_id` after `delay`.
    fn schedule(&self, campaign_id: &str, delay: Duration);
}

// ──────────────────────────────────────────────
// RecordingScheduler
// ──────────────────────────────────────────────

/// Records schedule requests without running anything.
#[derive(Default)]
pub struct RecordingScheduler {
    requests: Mutex<Vec<(String, Duration)>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<(String, Duration)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Requests for one campaign, in order.
    pub fn delays_for(&self, campaign_id: &str) -> Vec<Duration> {
        self.requests()
            .into_iter()
            .filter(|(id, _)| id == campaign_id)
            .map(|(_, delay)| delay)
            .collect()
    }

    pub fn clear(&self) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl TickScheduler for RecordingScheduler {
    fn schedule(&self, campaign_id: &str, delay: Duration) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((campaign_id.to_string(), delay));
    }
}

// ──────────────────────────────────────────────
// BackoffPolicy
// ──────────────────────────────────────────────

/// Delay before the tick following a failed one.
///
/// `interval * 2^(failures - 1)`, capped at `max`, plus up to 10% jitter
/// (still capped). The first failure retries at the plain interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub interval: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(interval: Duration, max: Duration) -> Self {
        BackoffPolicy {
            interval,
            max: max.max(interval),
        }
    }

    /// Deterministic part of the delay for `failures` consecutive failures.
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.interval
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.base_delay(failures);
        let jitter_cap = (base.as_millis() / 10) as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        (base + Duration::from_millis(jitter)).min(self.max)
    }
}

// ──────────────────────────────────────────────
// TickQueue / TickDriver
// ──────────────────────────────────────────────

struct TickRequest {
    campaign_id: String,
    delay: Duration,
}

/// Sending half: cheap to clone, handed to the orchestrator.
#[derive(Clone)]
pub struct TickQueue {
    tx: mpsc::UnboundedSender<TickRequest>,
}

/// Receiving half: runs ticks as their delays elapse.
///
/// At most one tick per campaign is pending at a time. A request due no
/// sooner than the pending tick is dropped; an earlier one replaces it.
pub struct TickDriver {
    rx: mpsc::UnboundedReceiver<TickRequest>,
    pending: Arc<Mutex<HashMap<String, Instant>>>,
}

impl TickQueue {
    pub fn channel() -> (TickQueue, TickDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TickQueue { tx },
            TickDriver {
                rx,
                pending: Arc::new(Mutex::new(HashMap::new())),
            },
        )
    }
}

impl TickScheduler for TickQueue {
    fn schedule(&self, campaign_id: &str, delay: Duration) {
        let request = TickRequest {
            campaign_id: campaign_id.to_string(),
            delay,
        };
        if self.tx.send(request).is_err() {
            tracing::warn!(campaign_id, "tick driver stopped; tick not scheduled");
        }
    }
}

impl TickDriver {
    /// Drain requests until every [`TickQueue`] handle is dropped.
    pub async fn run<S: CampaignStorage>(mut self, reconciler: Arc<ReconciliationScheduler<S>>) {
        while let Some(request) = self.rx.recv().await {
            let deadline = Instant::now() + request.delay;
            let accepted = {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                match pending.get(&request.campaign_id).copied() {
                    Some(due) if due <= deadline => false,
                    _ => {
                        pending.insert(request.campaign_id.clone(), deadline);
                        true
                    }
                }
            };
            if !accepted {
                tracing::debug!(
                    campaign_id = %request.campaign_id,
                    "earlier tick already pending; request coalesced"
                );
                continue;
            }

            let pending = Arc::clone(&self.pending);
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let current = {
                    let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                    if pending.get(&request.campaign_id) == Some(&deadline) {
                        pending.remove(&request.campaign_id);
                        true
                    } else {
                        false
                    }
                };
                // Replaced by an earlier request, which has run or will run.
                if !current {
                    return;
                }
                reconciler.tick(&request.campaign_id).await;
            });
        }
        tracing::debug!("tick queue closed; driver exiting");
    }
}
