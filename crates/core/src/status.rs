//! Canonical status shape that every channel adapter normalizes into.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::guardrail::MetricKey;

/// Vendor-reported delivery state, mapped onto the canonical vocabulary.
///
/// Vendor states with no mapping are carried through as `Unmapped` so an
/// unexpected value stays visible instead of being coerced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CanonicalState {
    Running,
    Paused,
    Completed,
    Failed,
    Unmapped(String),
}

impl CanonicalState {
    /// Completed and Failed end reconciliation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CanonicalState::Completed | CanonicalState::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            CanonicalState::Running => "running",
            CanonicalState::Paused => "paused",
            CanonicalState::Completed => "completed",
            CanonicalState::Failed => "failed",
            CanonicalState::Unmapped(raw) => raw,
        }
    }
}

impl From<String> for CanonicalState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "running" => CanonicalState::Running,
            "paused" => CanonicalState::Paused,
            "completed" => CanonicalState::Completed,
            "failed" => CanonicalState::Failed,
            _ => CanonicalState::Unmapped(s),
        }
    }
}

impl From<CanonicalState> for String {
    fn from(state: CanonicalState) -> Self {
        match state {
            CanonicalState::Unmapped(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performance metrics reported by a vendor, in account currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub spend: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctr: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpc: Option<Decimal>,
}

impl MetricSnapshot {
    /// Value of a metric, or `None` when the vendor did not report it.
    pub fn get(&self, key: MetricKey) -> Option<Decimal> {
        match key {
            MetricKey::Spend => Some(self.spend),
            MetricKey::Roi => self.roi,
            MetricKey::Ctr => self.ctr,
            MetricKey::Cpc => self.cpc,
        }
    }
}

/// Result of `ChannelAdapter::normalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedStatus {
    pub state: CanonicalState,
    /// The vendor's own label for the state (e.g. `"ENABLED"`).
    pub platform_state: String,
    pub metrics: MetricSnapshot,
    /// The raw vendor payload the status was derived from.
    pub native: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl NormalizedStatus {
    pub fn metric(&self, key: MetricKey) -> Option<Decimal> {
        self.metrics.get(key)
    }
}
