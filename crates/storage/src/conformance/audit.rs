use std::future::Future;

use pacer_core::CampaignState;

use super::{make_audit_entry, make_campaign, seed, TestResult};
use crate::{CampaignStorage, StorageError};

pub(super) async fn run_audit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "audit",
            "entries_ordered_by_sequence",
            entries_ordered_by_sequence(factory).await,
        ),
        TestResult::from_result(
            "audit",
            "audit_commits_with_state",
            audit_commits_with_state(factory).await,
        ),
        TestResult::from_result(
            "audit",
            "unknown_campaign_rejected",
            unknown_campaign_rejected(factory).await,
        ),
    ]
}

async fn entries_ordered_by_sequence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_campaign("c1", "team-a")).await?;
    seed(&storage, make_campaign("c2", "team-a")).await?;

    for (campaign, message) in [("c1", "first"), ("c2", "other"), ("c1", "second")] {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .append_audit_entry(&mut snap, make_audit_entry(campaign, message))
            .await
            .map_err(|e| format!("append: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let entries = storage
        .list_audit_entries("c1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
    if messages != ["first", "second"] {
        return Err(format!("unexpected c1 audit: {messages:?}"));
    }
    if entries[0].sequence >= entries[1].sequence {
        return Err(format!(
            "sequence not increasing: {} then {}",
            entries[0].sequence, entries[1].sequence
        ));
    }
    Ok(())
}

async fn audit_commits_with_state<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .append_audit_entry(&mut snap, make_audit_entry("c1", "archived"))
        .await
        .map_err(|e| format!("append: {e}"))?;

    // Nothing visible until commit.
    let audit = storage
        .list_audit_entries("c1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !audit.is_empty() {
        return Err("audit entry visible before commit".to_string());
    }

    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let record = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let audit = storage
        .list_audit_entries("c1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if record.state != CampaignState::Archived || audit.len() != 1 {
        return Err(format!(
            "expected archived with one audit entry, got {} with {}",
            record.state,
            audit.len()
        ));
    }
    Ok(())
}

async fn unknown_campaign_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let appended = storage
        .append_audit_entry(&mut snap, make_audit_entry("ghost", "orphan"))
        .await;
    let outcome = match appended {
        Ok(()) => storage.commit_snapshot(snap).await,
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::CampaignNotFound { campaign_id }) if campaign_id == "ghost" => {}
        other => return Err(format!("expected CampaignNotFound(ghost), got {other:?}")),
    }

    let audit = storage
        .list_audit_entries("ghost")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !audit.is_empty() {
        return Err("orphan audit entry was stored".to_string());
    }
    Ok(())
}
