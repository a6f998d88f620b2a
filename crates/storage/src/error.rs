/// All errors that can be returned by a CampaignStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency check failed: the record changed since it was read.
    #[error("concurrent conflict on campaign {campaign_id}: expected version {expected_version}")]
    ConcurrentConflict {
        campaign_id: String,
        expected_version: i64,
    },

    #[error("campaign not found: {campaign_id}")]
    CampaignNotFound { campaign_id: String },

    #[error("campaign already exists: {campaign_id}")]
    AlreadyExists { campaign_id: String },

    /// An update was attempted without first locking the record in this snapshot.
    #[error("campaign {campaign_id} is not locked by this snapshot")]
    NotLocked { campaign_id: String },

    /// External ids are write-once.
    #[error("external ids of campaign {campaign_id} are immutable once set")]
    ExternalIdsImmutable { campaign_id: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
