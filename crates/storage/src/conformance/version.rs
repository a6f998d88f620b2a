use std::future::Future;

use pacer_core::ExternalIds;

use super::{make_campaign, seed, TestResult};
use crate::{CampaignStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "update_increments_version",
            update_increments_version(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_version_conflicts",
            stale_version_conflicts(factory).await,
        ),
        TestResult::from_result(
            "version",
            "update_requires_lock",
            update_requires_lock(factory).await,
        ),
        TestResult::from_result(
            "version",
            "external_ids_write_once",
            external_ids_write_once(factory).await,
        ),
    ]
}

async fn update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_campaign("c1", "team-a")).await?;

    for expected in 0..3i64 {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let record = storage
            .get_campaign_for_update(&mut snap, "c1")
            .await
            .map_err(|e| format!("lock: {e}"))?;
        if record.version != expected {
            return Err(format!(
                "expected version {expected}, read {}",
                record.version
            ));
        }
        let new_version = storage
            .update_campaign(&mut snap, record, expected)
            .await
            .map_err(|e| format!("update: {e}"))?;
        if new_version != expected + 1 {
            return Err(format!(
                "expected new version {}, got {new_version}",
                expected + 1
            ));
        }
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let record = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if record.version != 3 {
        return Err(format!("expected final version 3, got {}", record.version));
    }
    Ok(())
}

async fn stale_version_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_campaign("c1", "team-a")).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let record = storage
        .get_campaign_for_update(&mut snap, "c1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let result = storage.update_campaign(&mut snap, record, 7).await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::ConcurrentConflict {
            campaign_id,
            expected_version: 7,
        }) if campaign_id == "c1" => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn update_requires_lock<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_campaign("c1", "team-a")).await?;

    let record = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage.update_campaign(&mut snap, record, 0).await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::NotLocked { .. }) => Ok(()),
        other => Err(format!("expected NotLocked, got {other:?}")),
    }
}

async fn external_ids_write_once<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_campaign("c1", "team-a")).await?;

    // First assignment succeeds.
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut record = storage
        .get_campaign_for_update(&mut snap, "c1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    record.external_ids = Some(ExternalIds::new("acct-1", "vendor-1"));
    storage
        .update_campaign(&mut snap, record, 0)
        .await
        .map_err(|e| format!("first update: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    // Reassignment is rejected.
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut record = storage
        .get_campaign_for_update(&mut snap, "c1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    record.external_ids = Some(ExternalIds::new("acct-1", "vendor-2"));
    let result = storage.update_campaign(&mut snap, record, 1).await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::ExternalIdsImmutable { .. }) => {}
        other => return Err(format!("expected ExternalIdsImmutable, got {other:?}")),
    }

    let stored = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    match stored.external_ids {
        Some(ids) if ids.campaign_id == "vendor-1" => Ok(()),
        other => Err(format!("external ids changed: {other:?}")),
    }
}
