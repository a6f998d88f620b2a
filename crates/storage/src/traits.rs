use async_trait::async_trait;
use pacer_core::{AuditLogEntry, CampaignState, GuardrailRule};

use crate::error::StorageError;
use crate::record::CampaignRecord;

/// The storage trait for campaign orchestration backends.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. `get_campaign_for_update()`: lock the record for the rest of the snapshot
/// 3. Call mutating methods with `&mut snapshot`
/// 4. `commit_snapshot(snapshot)`: apply every staged write and release locks
///    OR `abort_snapshot(snapshot)`: discard every staged write and release locks
///
/// If a `Snapshot` is dropped without committing, its writes MUST be
/// discarded and its locks released.
///
/// ## Exclusive Access
///
/// `get_campaign_for_update` has `SELECT ... FOR UPDATE` semantics: a second
/// snapshot asking for the same campaign waits until the first commits or
/// aborts. Different campaigns never contend.
///
/// ## OCC
///
/// `update_campaign` is additionally conditional on `version =
/// expected_version`, so a backend without row locks still rejects lost
/// updates with `StorageError::ConcurrentConflict`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one instance can be
/// shared by request handlers and background reconciliation tasks.
#[async_trait]
pub trait CampaignStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Campaign operations (within snapshot) ────────────────────────────────

    /// Insert a new campaign record.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the id is taken.
    async fn insert_campaign(
        &self,
        snapshot: &mut Self::Snapshot,
        record: CampaignRecord,
    ) -> Result<(), StorageError>;

    /// Read a campaign, locking it until the snapshot ends.
    async fn get_campaign_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        campaign_id: &str,
    ) -> Result<CampaignRecord, StorageError>;

    /// Stage a version-validated replacement of a locked campaign record.
    ///
    /// Returns the new version number on success. Rejects changes to
    /// external ids once they are set.
    async fn update_campaign(
        &self,
        snapshot: &mut Self::Snapshot,
        record: CampaignRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    /// Stage an audit entry. Its sequence number is assigned at commit.
    async fn append_audit_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: AuditLogEntry,
    ) -> Result<(), StorageError>;

    /// Stage a guardrail rule for an existing campaign.
    async fn insert_guardrail_rule(
        &self,
        snapshot: &mut Self::Snapshot,
        rule: GuardrailRule,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    /// Read a campaign's committed state without locking.
    async fn get_campaign(&self, campaign_id: &str) -> Result<CampaignRecord, StorageError>;

    /// List campaigns, optionally filtered by owning team and state.
    async fn list_campaigns(
        &self,
        owning_team_id: Option<&str>,
        state_filter: Option<CampaignState>,
    ) -> Result<Vec<CampaignRecord>, StorageError>;

    /// Audit entries of one campaign, in commit order.
    async fn list_audit_entries(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<AuditLogEntry>, StorageError>;

    async fn list_guardrail_rules(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<GuardrailRule>, StorageError>;
}
