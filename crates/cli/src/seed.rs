//! `--campaigns <file.json>`: preload campaign records and guardrail rules.
//!
//! ```json
//! {
//!   "campaigns": [{ "id": "c1", "title": "...", "channel": "meta", ... }],
//!   "guardrail_rules": [{ "id": "r1", "campaign_id": "c1", ... }]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pacer_core::{CampaignState, GuardrailRule};
use pacer_storage::{CampaignRecord, CampaignStorage, StorageError};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub(crate) enum SeedError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid seed file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid seed data: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SeedFile {
    pub(crate) campaigns: Vec<CampaignRecord>,
    #[serde(default)]
    pub(crate) guardrail_rules: Vec<GuardrailRule>,
}

impl SeedFile {
    pub(crate) fn load(path: &Path) -> Result<Self, SeedError> {
        let text = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let seed: SeedFile = serde_json::from_str(&text).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        seed.check()?;
        Ok(seed)
    }

    /// Reject records the orchestrator could never have produced.
    pub(crate) fn check(&self) -> Result<(), SeedError> {
        let mut ids = HashSet::new();
        for record in &self.campaigns {
            if !ids.insert(record.id.as_str()) {
                return Err(SeedError::Invalid(format!("duplicate campaign id '{}'", record.id)));
            }
            let needs_ids = matches!(record.state, CampaignState::Launched | CampaignState::Paused);
            if needs_ids && record.external_ids.is_none() {
                return Err(SeedError::Invalid(format!(
                    "campaign '{}' is {} but has no external_ids",
                    record.id, record.state
                )));
            }
            if record.state == CampaignState::Scheduled && record.external_ids.is_some() {
                return Err(SeedError::Invalid(format!(
                    "campaign '{}' is scheduled but already has external_ids",
                    record.id
                )));
            }
        }
        for rule in &self.guardrail_rules {
            if !ids.contains(rule.campaign_id.as_str()) {
                return Err(SeedError::Invalid(format!(
                    "guardrail rule '{}' references unknown campaign '{}'",
                    rule.id, rule.campaign_id
                )));
            }
        }
        Ok(())
    }

    /// Insert everything into `storage`, one snapshot per campaign.
    /// Returns the number of campaigns inserted.
    pub(crate) async fn apply<S: CampaignStorage>(self, storage: &S) -> Result<usize, SeedError> {
        let SeedFile {
            campaigns,
            guardrail_rules,
        } = self;
        let count = campaigns.len();

        for mut record in campaigns {
            // Claims never survive a restart.
            record.in_flight = None;
            let rules: Vec<GuardrailRule> = guardrail_rules
                .iter()
                .filter(|r| r.campaign_id == record.id)
                .cloned()
                .collect();

            let mut snap = storage.begin_snapshot().await?;
            if let Err(e) = storage.insert_campaign(&mut snap, record).await {
                let _ = storage.abort_snapshot(snap).await;
                return Err(e.into());
            }
            for rule in rules {
                if let Err(e) = storage.insert_guardrail_rule(&mut snap, rule).await {
                    let _ = storage.abort_snapshot(snap).await;
                    return Err(e.into());
                }
            }
            storage.commit_snapshot(snap).await?;
        }
        Ok(count)
    }
}
