//! Campaign execution orchestration.
//!
//! [`Orchestrator`] owns the lifecycle operations (launch, pause, resume,
//! archive) and the reconciliation primitives (refresh, finalize). The
//! [`ReconciliationScheduler`] drives periodic ticks through a
//! [`TickScheduler`], evaluating guardrails with [`AlertRuleEvaluator`]
//! and emitting events through an [`EventNotifier`].
//!
//! ```text
//! HTTP / CLI ──► Orchestrator ──► AdapterRegistry ──► vendor
//!                    │   ▲
//!                    ▼   │
//!             CampaignStorage   ReconciliationScheduler ◄── TickDriver
//! ```

mod alerts;
mod config;
mod error;
mod notifier;
mod orchestrator;
mod reconcile;
mod scheduler;

pub use alerts::{AlertRuleEvaluator, EvaluationReport, Firing};
pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use notifier::{BroadcastNotifier, EventNotifier, RecordingNotifier};
pub use orchestrator::{
    CampaignStatusView, Orchestrator, Refreshed, GUARDRAIL_ACTOR, SYSTEM_ACTOR,
};
pub use reconcile::{ReconciliationScheduler, TickOutcome};
pub use scheduler::{BackoffPolicy, RecordingScheduler, TickDriver, TickQueue, TickScheduler};
