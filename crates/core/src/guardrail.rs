//! Operator-defined performance guardrails.
//!
//! A [`GuardrailRule`] compares one metric from the latest normalized status
//! against a threshold. Comparison is done in `Decimal`; no floats are
//! involved anywhere on the evaluation path.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Id given to the rule synthesized from a record's `roi_threshold` field.
pub const ROI_THRESHOLD_RULE_ID: &str = "roi-threshold";

// ──────────────────────────────────────────────
// MetricKey
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Roi,
    Ctr,
    Cpc,
    Spend,
}

impl MetricKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Roi => "roi",
            MetricKey::Ctr => "ctr",
            MetricKey::Cpc => "cpc",
            MetricKey::Spend => "spend",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Comparator
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "=",
        }
    }

    /// `value <op> threshold`
    pub fn holds(&self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Comparator::Lt => value < threshold,
            Comparator::Le => value <= threshold,
            Comparator::Gt => value > threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Eq => value == threshold,
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            "=" | "==" => Ok(Comparator::Eq),
            other => Err(format!("unknown comparator '{}'", other)),
        }
    }
}

impl TryFrom<String> for Comparator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Comparator> for String {
    fn from(c: Comparator) -> Self {
        c.symbol().to_string()
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ──────────────────────────────────────────────
// GuardrailRule
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailAction {
    NotifyOnly,
    AutoPause,
}

/// A threshold on one performance metric, attached to one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailRule {
    pub id: String,
    pub campaign_id: String,
    pub metric_key: MetricKey,
    pub comparator: Comparator,
    pub threshold: Decimal,
    /// Maximum age of the status sample the rule will look at. 0 = unbounded.
    #[serde(default)]
    pub lookback_minutes: u32,
    pub action: GuardrailAction,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl GuardrailRule {
    /// The implicit rule behind a record's `roi_threshold` convenience field.
    pub fn from_roi_threshold(campaign_id: &str, threshold: Decimal) -> Self {
        GuardrailRule {
            id: ROI_THRESHOLD_RULE_ID.to_string(),
            campaign_id: campaign_id.to_string(),
            metric_key: MetricKey::Roi,
            comparator: Comparator::Lt,
            threshold,
            lookback_minutes: 0,
            action: GuardrailAction::AutoPause,
            is_active: true,
        }
    }

    /// `roi < 1.0`
    pub fn condition(&self) -> String {
        format!("{} {} {}", self.metric_key, self.comparator, self.threshold)
    }

    /// Whether the rule fires for an observed metric value.
    pub fn fires_on(&self, value: Decimal) -> bool {
        self.comparator.holds(value, self.threshold)
    }

    /// Whether a sample observed at `observed_at` is recent enough for this rule.
    pub fn accepts_sample(&self, observed_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        if self.lookback_minutes == 0 {
            return true;
        }
        now - observed_at <= Duration::minutes(i64::from(self.lookback_minutes))
    }

    /// Reason recorded on the campaign when this rule auto-pauses it.
    pub fn pause_reason(&self, observed: Decimal) -> String {
        format!(
            "guardrail {}: {} (observed {})",
            self.id,
            self.condition(),
            observed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn rule(comparator: Comparator, threshold: &str) -> GuardrailRule {
        GuardrailRule {
            id: "r1".to_string(),
            campaign_id: "c1".to_string(),
            metric_key: MetricKey::Roi,
            comparator,
            threshold: dec(threshold),
            lookback_minutes: 0,
            action: GuardrailAction::AutoPause,
            is_active: true,
        }
    }

    #[test]
    fn comparators_apply_value_then_threshold() {
        assert!(Comparator::Lt.holds(dec("0.5"), dec("1.0")));
        assert!(!Comparator::Lt.holds(dec("1.0"), dec("1.0")));
        assert!(Comparator::Le.holds(dec("1.0"), dec("1.0")));
        assert!(Comparator::Gt.holds(dec("2"), dec("1.0")));
        assert!(Comparator::Ge.holds(dec("1.00"), dec("1.0")));
        assert!(Comparator::Eq.holds(dec("1.00"), dec("1.0")));
    }

    #[test]
    fn comparator_parses_symbols_and_alias() {
        for c in [
            Comparator::Lt,
            Comparator::Le,
            Comparator::Gt,
            Comparator::Ge,
            Comparator::Eq,
        ] {
            assert_eq!(c.symbol().parse::<Comparator>(), Ok(c));
        }
        assert_eq!("==".parse::<Comparator>(), Ok(Comparator::Eq));
        assert!("!=".parse::<Comparator>().is_err());
    }

    #[test]
    fn rule_deserializes_from_operator_json() {
        let rule: GuardrailRule = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "campaign_id": "c1",
            "metric_key": "roi",
            "comparator": "<",
            "threshold": "1.0",
            "action": "auto_pause"
        }))
        .unwrap();
        assert_eq!(rule.comparator, Comparator::Lt);
        assert_eq!(rule.threshold, dec("1.0"));
        assert!(rule.is_active);
        assert_eq!(rule.lookback_minutes, 0);
    }

    #[test]
    fn pause_reason_embeds_condition() {
        let r = rule(Comparator::Lt, "1.0");
        assert!(r.fires_on(dec("0.5")));
        let reason = r.pause_reason(dec("0.5"));
        assert!(reason.contains("roi < 1.0"), "{reason}");
        assert!(reason.contains("0.5"));
    }

    #[test]
    fn lookback_rejects_stale_samples() {
        let mut r = rule(Comparator::Lt, "1.0");
        r.lookback_minutes = 30;
        let now = OffsetDateTime::now_utc();
        assert!(r.accepts_sample(now - Duration::minutes(10), now));
        assert!(!r.accepts_sample(now - Duration::minutes(31), now));

        r.lookback_minutes = 0;
        assert!(r.accepts_sample(now - Duration::days(3), now));
    }

    #[test]
    fn roi_threshold_rule_is_auto_pause_lt() {
        let r = GuardrailRule::from_roi_threshold("c9", dec("1.5"));
        assert_eq!(r.id, ROI_THRESHOLD_RULE_ID);
        assert_eq!(r.condition(), "roi < 1.5");
        assert_eq!(r.action, GuardrailAction::AutoPause);
    }
}
