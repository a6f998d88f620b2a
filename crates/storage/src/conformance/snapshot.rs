use std::future::Future;

use pacer_core::CampaignState;

use super::{make_audit_entry, make_campaign, seed, TestResult};
use crate::CampaignStorage;

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "uncommitted_update_invisible",
            uncommitted_update_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "abort_discards_update_and_audit",
            abort_discards_update_and_audit(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "dropped_snapshot_discards_writes",
            dropped_snapshot_discards_writes(factory).await,
        ),
    ]
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut record = storage
        .get_campaign_for_update(&mut snap, "c1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    record.paused_reason = Some("staged".to_string());
    storage
        .update_campaign(&mut snap, record, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if outside.paused_reason.is_some() || outside.version != 0 {
        return Err("staged update visible before commit".to_string());
    }

    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    let after = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get after: {e}"))?;
    if after.paused_reason.as_deref() != Some("staged") || after.version != 1 {
        return Err(format!("committed update not visible: {after:?}"));
    }
    Ok(())
}

async fn abort_discards_update_and_audit<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut record = storage
        .get_campaign_for_update(&mut snap, "c1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    record.state = CampaignState::Archived;
    storage
        .update_campaign(&mut snap, record, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .append_audit_entry(&mut snap, make_audit_entry("c1", "aborted"))
        .await
        .map_err(|e| format!("audit: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let record = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if record.state != CampaignState::Scheduled {
        return Err(format!("aborted state change visible: {}", record.state));
    }
    let audit = storage
        .list_audit_entries("c1")
        .await
        .map_err(|e| format!("list audit: {e}"))?;
    if !audit.is_empty() {
        return Err(format!("aborted audit entries visible: {}", audit.len()));
    }
    Ok(())
}

async fn dropped_snapshot_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_campaign("c1", "team-a")).await?;

    {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let mut record = storage
            .get_campaign_for_update(&mut snap, "c1")
            .await
            .map_err(|e| format!("lock: {e}"))?;
        record.title = "renamed".to_string();
        storage
            .update_campaign(&mut snap, record, 0)
            .await
            .map_err(|e| format!("update: {e}"))?;
    }

    let record = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if record.title == "renamed" {
        return Err("dropped snapshot was applied".to_string());
    }

    // The lock must have been released as well.
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin again: {e}"))?;
    let relock = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        storage.get_campaign_for_update(&mut snap, "c1"),
    )
    .await;
    let _ = storage.abort_snapshot(snap).await;
    match relock {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("relock: {e}")),
        Err(_) => Err("lock still held after snapshot was dropped".to_string()),
    }
}
