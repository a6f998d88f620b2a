use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the orchestrator and the reconciliation loop.
///
/// Durations are whole seconds so the struct maps one-to-one onto the
/// `[orchestrator]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Delay before the first tick after launch, resume, or startup recovery.
    pub initial_tick_delay_secs: u64,
    pub tick_interval_secs: u64,
    /// Upper bound on the backoff after repeated tick failures.
    pub max_backoff_secs: u64,
    /// Timeout on every vendor HTTP call.
    pub vendor_timeout_secs: u64,
    /// Age after which an in-flight claim is considered abandoned.
    pub claim_ttl_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            initial_tick_delay_secs: 5,
            tick_interval_secs: 15,
            max_backoff_secs: 300,
            vendor_timeout_secs: 10,
            claim_ttl_secs: 120,
        }
    }
}

impl OrchestratorConfig {
    pub fn initial_tick_delay(&self) -> Duration {
        Duration::from_secs(self.initial_tick_delay_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn vendor_timeout(&self) -> Duration {
        Duration::from_secs(self.vendor_timeout_secs)
    }

    pub fn claim_ttl(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.claim_ttl_secs).unwrap_or(i64::MAX))
    }

    /// Every problem with the values, empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.tick_interval_secs == 0 {
            problems.push("orchestrator.tick_interval_secs must be greater than 0".to_string());
        }
        if self.vendor_timeout_secs == 0 {
            problems.push("orchestrator.vendor_timeout_secs must be greater than 0".to_string());
        }
        if self.claim_ttl_secs <= self.vendor_timeout_secs {
            problems.push(format!(
                "orchestrator.claim_ttl_secs ({}) must exceed vendor_timeout_secs ({})",
                self.claim_ttl_secs, self.vendor_timeout_secs
            ));
        }
        if self.max_backoff_secs < self.tick_interval_secs {
            problems.push(format!(
                "orchestrator.max_backoff_secs ({}) is below tick_interval_secs ({})",
                self.max_backoff_secs, self.tick_interval_secs
            ));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.tick_interval(), Duration::from_secs(15));
        assert_eq!(config.vendor_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_value(serde_json::json!({"tick_interval_secs": 30})).unwrap();
        assert_eq!(config.tick_interval_secs, 30);
        assert_eq!(config.initial_tick_delay_secs, 5);
    }

    #[test]
    fn validate_reports_every_problem() {
        let config = OrchestratorConfig {
            tick_interval_secs: 0,
            vendor_timeout_secs: 0,
            claim_ttl_secs: 0,
            ..OrchestratorConfig::default()
        };
        assert_eq!(config.validate().len(), 3);
    }
}
