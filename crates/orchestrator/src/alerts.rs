//! Guardrail evaluation against freshly normalized status.

use pacer_core::{CampaignState, GuardrailAction, GuardrailRule, NormalizedStatus};
use pacer_storage::{CampaignRecord, CampaignStorage};
use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::error::OrchestratorError;
use crate::orchestrator::{Orchestrator, GUARDRAIL_ACTOR};

/// A rule whose condition held for the observed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub rule: GuardrailRule,
    pub value: Decimal,
}

/// What one evaluation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub firings: Vec<Firing>,
    /// Id of the rule that paused the campaign, if one did.
    pub paused_by: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertRuleEvaluator;

impl AlertRuleEvaluator {
    pub fn new() -> Self {
        AlertRuleEvaluator
    }

    /// Active stored rules, plus the implicit ROI rule when the record
    /// carries a threshold and no stored rule already uses its id.
    pub fn rules_for(record: &CampaignRecord, stored: Vec<GuardrailRule>) -> Vec<GuardrailRule> {
        let mut rules: Vec<GuardrailRule> = stored.into_iter().filter(|r| r.is_active).collect();
        if let Some(threshold) = record.roi_threshold {
            let implicit = GuardrailRule::from_roi_threshold(&record.id, threshold);
            if !rules.iter().any(|r| r.id == implicit.id) {
                rules.push(implicit);
            }
        }
        rules
    }

    /// Rules that fire on `status`. A rule whose metric the vendor did not
    /// report, or whose lookback the sample is too old for, is skipped.
    pub fn firings(rules: &[GuardrailRule], status: &NormalizedStatus, now: OffsetDateTime) -> Vec<Firing> {
        rules
            .iter()
            .filter(|rule| rule.is_active)
            .filter_map(|rule| {
                if !rule.accepts_sample(status.observed_at, now) {
                    tracing::debug!(rule_id = %rule.id, "status sample outside rule lookback");
                    return None;
                }
                let Some(value) = status.metric(rule.metric_key) else {
                    tracing::debug!(rule_id = %rule.id, metric = %rule.metric_key, "metric not reported; rule skipped");
                    return None;
                };
                rule.fires_on(value).then(|| Firing {
                    rule: rule.clone(),
                    value,
                })
            })
            .collect()
    }

    /// Evaluate every rule for `record` against `status`, audit and announce
    /// each firing, and auto-pause on the first `AutoPause` firing while the
    /// campaign is `Launched`.
    ///
    /// No pause is attempted when `status` is terminal: the campaign has
    /// ended on the vendor and is finalized instead.
    ///
    /// Alert bookkeeping failures are logged and do not stop evaluation.
    /// A pause that loses a race with another mutation is not an error.
    pub async fn evaluate<S: CampaignStorage>(
        &self,
        orchestrator: &Orchestrator<S>,
        record: &CampaignRecord,
        status: &NormalizedStatus,
    ) -> Result<EvaluationReport, OrchestratorError> {
        let stored = orchestrator
            .storage()
            .list_guardrail_rules(&record.id)
            .await?;
        let rules = Self::rules_for(record, stored);
        let firings = Self::firings(&rules, status, OffsetDateTime::now_utc());

        let mut report = EvaluationReport::default();
        let mut pause_attempted = false;
        for firing in &firings {
            tracing::info!(
                campaign_id = %record.id,
                rule_id = %firing.rule.id,
                value = %firing.value,
                condition = %firing.rule.condition(),
                "guardrail fired"
            );
            if let Err(e) = orchestrator.record_alert(record, &firing.rule, firing.value).await {
                tracing::warn!(campaign_id = %record.id, error = %e, "failed to record alert");
            }

            let should_pause = firing.rule.action == GuardrailAction::AutoPause
                && !pause_attempted
                && record.state == CampaignState::Launched;
            if !should_pause {
                continue;
            }
            if status.state.is_terminal() {
                tracing::debug!(
                    campaign_id = %record.id,
                    rule_id = %firing.rule.id,
                    platform_state = %status.platform_state,
                    "vendor reports terminal status; auto-pause skipped"
                );
                pause_attempted = true;
                continue;
            }
            pause_attempted = true;
            let reason = firing.rule.pause_reason(firing.value);
            match orchestrator
                .pause(&record.id, GUARDRAIL_ACTOR, Some(&reason))
                .await
            {
                Ok(_) => report.paused_by = Some(firing.rule.id.clone()),
                Err(e) if e.is_invalid_transition() => {
                    tracing::debug!(campaign_id = %record.id, error = %e, "auto-pause skipped");
                }
                Err(e) => {
                    tracing::warn!(campaign_id = %record.id, error = %e, "auto-pause failed");
                }
            }
        }
        report.firings = firings;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::{CanonicalState, Channel, Comparator, MetricKey, MetricSnapshot};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn status(roi: Option<&str>, observed_at: OffsetDateTime) -> NormalizedStatus {
        NormalizedStatus {
            state: CanonicalState::Running,
            platform_state: "ACTIVE".into(),
            metrics: MetricSnapshot {
                spend: dec("100"),
                roi: roi.map(dec),
                ctr: None,
                cpc: None,
            },
            native: serde_json::Value::Null,
            observed_at,
        }
    }

    fn rule(id: &str, key: MetricKey, cmp: Comparator, threshold: &str) -> GuardrailRule {
        GuardrailRule {
            id: id.into(),
            campaign_id: "c1".into(),
            metric_key: key,
            comparator: cmp,
            threshold: dec(threshold),
            lookback_minutes: 0,
            action: GuardrailAction::NotifyOnly,
            is_active: true,
        }
    }

    #[test]
    fn implicit_roi_rule_added_once() {
        let mut record = CampaignRecord::scheduled("c1", "t", Channel::Meta, "team-a", "alice");
        record.roi_threshold = Some(dec("1.0"));

        let rules = AlertRuleEvaluator::rules_for(&record, Vec::new());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].action, GuardrailAction::AutoPause);

        let mut stored = GuardrailRule::from_roi_threshold("c1", dec("2.0"));
        stored.action = GuardrailAction::NotifyOnly;
        let rules = AlertRuleEvaluator::rules_for(&record, vec![stored]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].threshold, dec("2.0"));
    }

    #[test]
    fn inactive_rules_are_dropped() {
        let record = CampaignRecord::scheduled("c1", "t", Channel::Meta, "team-a", "alice");
        let mut off = rule("r1", MetricKey::Spend, Comparator::Gt, "10");
        off.is_active = false;
        assert!(AlertRuleEvaluator::rules_for(&record, vec![off]).is_empty());
    }

    #[test]
    fn missing_metric_never_fires() {
        let now = OffsetDateTime::now_utc();
        let rules = vec![rule("r1", MetricKey::Roi, Comparator::Lt, "1.0")];
        assert!(AlertRuleEvaluator::firings(&rules, &status(None, now), now).is_empty());
        let fired = AlertRuleEvaluator::firings(&rules, &status(Some("0.5"), now), now);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].value, dec("0.5"));
    }

    #[test]
    fn stale_sample_is_outside_lookback() {
        let now = OffsetDateTime::now_utc();
        let mut r = rule("r1", MetricKey::Spend, Comparator::Gt, "50");
        r.lookback_minutes = 10;
        let old = status(None, now - time::Duration::minutes(30));
        assert!(AlertRuleEvaluator::firings(&[r.clone()], &old, now).is_empty());
        let fresh = status(None, now - time::Duration::minutes(1));
        assert_eq!(AlertRuleEvaluator::firings(&[r], &fresh, now).len(), 1);
    }
}
