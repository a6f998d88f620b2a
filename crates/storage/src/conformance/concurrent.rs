use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pacer_core::CampaignState;

use super::{make_campaign, seed, TestResult};
use crate::{CampaignStorage, StorageError};

const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "second_locker_waits_for_commit",
            second_locker_waits_for_commit(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "single_winner_among_claimers",
            single_winner_among_claimers(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "different_campaigns_do_not_contend",
            different_campaigns_do_not_contend(factory).await,
        ),
    ]
}

async fn second_locker_waits_for_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), make_campaign("c1", "team-a")).await?;

    let mut first = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let record = storage
        .get_campaign_for_update(&mut first, "c1")
        .await
        .map_err(|e| format!("lock: {e}"))?;

    let contender = {
        let storage = Arc::clone(&storage);
        tokio::spawn(async move {
            let mut snap = storage.begin_snapshot().await?;
            let record = storage.get_campaign_for_update(&mut snap, "c1").await?;
            storage.abort_snapshot(snap).await?;
            Ok::<_, StorageError>(record.version)
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    if contender.is_finished() {
        return Err("second locker was not blocked".to_string());
    }

    storage
        .update_campaign(&mut first, record, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_snapshot(first)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let seen = tokio::time::timeout(Duration::from_secs(2), contender)
        .await
        .map_err(|_| "second locker never acquired the lock".to_string())?
        .map_err(|e| format!("join: {e}"))?
        .map_err(|e| format!("second locker: {e}"))?;
    if seen != 1 {
        return Err(format!("second locker read stale version {seen}"));
    }
    Ok(())
}

async fn single_winner_among_claimers<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), make_campaign("c1", "team-a")).await?;

    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            let mut snap = storage.begin_snapshot().await?;
            let mut record = storage.get_campaign_for_update(&mut snap, "c1").await?;
            if record.state != CampaignState::Scheduled {
                storage.abort_snapshot(snap).await?;
                return Ok::<_, StorageError>(false);
            }
            let version = record.version;
            record.state = CampaignState::Launched;
            storage.update_campaign(&mut snap, record, version).await?;
            storage.commit_snapshot(snap).await?;
            Ok(true)
        }));
    }

    let mut winners = 0;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("join: {e}"))?
            .map_err(|e| format!("claimer: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly one winner, got {winners}"));
    }

    let record = storage
        .get_campaign("c1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if record.version != 1 {
        return Err(format!("expected version 1, got {}", record.version));
    }
    Ok(())
}

async fn different_campaigns_do_not_contend<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        seed(storage.as_ref(), make_campaign(&format!("c{i}"), "team-a")).await?;
    }

    // Hold every lock at once; this only finishes if rows are independent.
    let mut snaps = Vec::with_capacity(N);
    for i in 0..N {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let locked = tokio::time::timeout(
            Duration::from_secs(2),
            storage.get_campaign_for_update(&mut snap, &format!("c{i}")),
        )
        .await
        .map_err(|_| format!("lock on c{i} blocked by an unrelated campaign"))?
        .map_err(|e| format!("lock c{i}: {e}"))?;
        snaps.push((snap, locked));
    }

    for (mut snap, record) in snaps {
        storage
            .update_campaign(&mut snap, record, 0)
            .await
            .map_err(|e| format!("update: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let all = storage
        .list_campaigns(Some("team-a"), None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if all.iter().any(|c| c.version != 1) {
        return Err("not every campaign was updated".to_string());
    }
    Ok(())
}
