//! In-process `CampaignStorage` backend.
//!
//! Row locks are per-campaign `tokio::sync::Mutex`es whose owned guards live
//! inside the snapshot, so dropping a snapshot releases its locks. Committed
//! data sits behind a std mutex that is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use pacer_core::{AuditLogEntry, CampaignState, GuardrailRule};
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;

use crate::error::StorageError;
use crate::record::CampaignRecord;
use crate::traits::CampaignStorage;

#[derive(Default)]
struct Committed {
    campaigns: BTreeMap<String, CampaignRecord>,
    audit: Vec<AuditLogEntry>,
    rules: Vec<GuardrailRule>,
    next_sequence: u64,
}

/// In-memory storage suitable for a single-process deployment and for tests.
#[derive(Default)]
pub struct InMemoryStorage {
    data: Mutex<Committed>,
    row_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Staged writes plus the row locks held by one transaction.
#[derive(Default)]
pub struct MemorySnapshot {
    guards: HashMap<String, OwnedMutexGuard<()>>,
    inserts: BTreeMap<String, CampaignRecord>,
    updates: BTreeMap<String, CampaignRecord>,
    audit: Vec<AuditLogEntry>,
    rules: Vec<GuardrailRule>,
}

impl MemorySnapshot {
    fn staged(&self, campaign_id: &str) -> Option<&CampaignRecord> {
        self.updates
            .get(campaign_id)
            .or_else(|| self.inserts.get(campaign_id))
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // Recover data even if the mutex was poisoned by a panic in another thread
    fn data(&self) -> MutexGuard<'_, Committed> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_lock(&self, campaign_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(campaign_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl CampaignStorage for InMemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot {
            guards,
            inserts,
            updates,
            audit,
            rules,
        } = snapshot;

        let mut data = self.data();

        // Validate everything before applying anything.
        for id in inserts.keys() {
            if data.campaigns.contains_key(id) {
                return Err(StorageError::AlreadyExists {
                    campaign_id: id.clone(),
                });
            }
        }
        let known = |id: &str| {
            data.campaigns.contains_key(id) || inserts.contains_key(id) || updates.contains_key(id)
        };
        for campaign_id in audit
            .iter()
            .map(|e| e.campaign_id.as_str())
            .chain(rules.iter().map(|r| r.campaign_id.as_str()))
        {
            if !known(campaign_id) {
                return Err(StorageError::CampaignNotFound {
                    campaign_id: campaign_id.to_string(),
                });
            }
        }

        for (id, record) in inserts.into_iter().chain(updates) {
            data.campaigns.insert(id, record);
        }
        for mut entry in audit {
            data.next_sequence += 1;
            entry.sequence = data.next_sequence;
            data.audit.push(entry);
        }
        data.rules.extend(rules);

        drop(data);
        drop(guards);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_campaign(
        &self,
        snapshot: &mut MemorySnapshot,
        record: CampaignRecord,
    ) -> Result<(), StorageError> {
        let exists = self.data().campaigns.contains_key(&record.id)
            || snapshot.staged(&record.id).is_some();
        if exists {
            return Err(StorageError::AlreadyExists {
                campaign_id: record.id,
            });
        }
        snapshot.inserts.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_campaign_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        campaign_id: &str,
    ) -> Result<CampaignRecord, StorageError> {
        if !snapshot.guards.contains_key(campaign_id) {
            let guard = self.row_lock(campaign_id).lock_owned().await;
            snapshot.guards.insert(campaign_id.to_string(), guard);
        }

        if let Some(staged) = snapshot.staged(campaign_id) {
            return Ok(staged.clone());
        }
        self.data()
            .campaigns
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| StorageError::CampaignNotFound {
                campaign_id: campaign_id.to_string(),
            })
    }

    async fn update_campaign(
        &self,
        snapshot: &mut MemorySnapshot,
        mut record: CampaignRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        if !snapshot.guards.contains_key(&record.id) {
            return Err(StorageError::NotLocked {
                campaign_id: record.id,
            });
        }

        let current = match snapshot.staged(&record.id) {
            Some(staged) => staged.clone(),
            None => self
                .data()
                .campaigns
                .get(&record.id)
                .cloned()
                .ok_or_else(|| StorageError::CampaignNotFound {
                    campaign_id: record.id.clone(),
                })?,
        };

        if current.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                campaign_id: record.id,
                expected_version,
            });
        }
        if current.external_ids.is_some() && current.external_ids != record.external_ids {
            return Err(StorageError::ExternalIdsImmutable {
                campaign_id: record.id,
            });
        }

        let new_version = expected_version + 1;
        record.version = new_version;
        record.updated_at = OffsetDateTime::now_utc();
        snapshot.updates.insert(record.id.clone(), record);
        Ok(new_version)
    }

    async fn append_audit_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: AuditLogEntry,
    ) -> Result<(), StorageError> {
        snapshot.audit.push(entry);
        Ok(())
    }

    async fn insert_guardrail_rule(
        &self,
        snapshot: &mut MemorySnapshot,
        rule: GuardrailRule,
    ) -> Result<(), StorageError> {
        snapshot.rules.push(rule);
        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> Result<CampaignRecord, StorageError> {
        self.data()
            .campaigns
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| StorageError::CampaignNotFound {
                campaign_id: campaign_id.to_string(),
            })
    }

    async fn list_campaigns(
        &self,
        owning_team_id: Option<&str>,
        state_filter: Option<CampaignState>,
    ) -> Result<Vec<CampaignRecord>, StorageError> {
        Ok(self
            .data()
            .campaigns
            .values()
            .filter(|c| owning_team_id.map_or(true, |team| c.owning_team_id == team))
            .filter(|c| state_filter.map_or(true, |state| c.state == state))
            .cloned()
            .collect())
    }

    async fn list_audit_entries(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<AuditLogEntry>, StorageError> {
        Ok(self
            .data()
            .audit
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn list_guardrail_rules(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<GuardrailRule>, StorageError> {
        Ok(self
            .data()
            .rules
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}
