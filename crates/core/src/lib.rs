//! Shared vocabulary for the pacer campaign orchestrator.
//!
//! This crate is pure data and pure functions: campaign lifecycle states and
//! the transition table that governs them, guardrail rules and their
//! comparators, the canonical status shape every channel adapter normalizes
//! into, and the audit/event records the orchestrator emits. Nothing here
//! performs I/O.

pub mod audit;
pub mod campaign;
pub mod event;
pub mod guardrail;
pub mod status;

pub use audit::{AuditEventKind, AuditLogEntry, AuditResult};
pub use campaign::{CampaignOperation, CampaignState, Channel, ExternalIds, TransitionError};
pub use event::{CampaignEvent, EventPayload};
pub use guardrail::{Comparator, GuardrailAction, GuardrailRule, MetricKey};
pub use status::{CanonicalState, MetricSnapshot, NormalizedStatus};

