use std::future::Future;

use pacer_core::CampaignState;

use super::{make_campaign, seed, TestResult};
use crate::{CampaignStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "init",
            "inserted_campaign_is_readable",
            inserted_campaign_is_readable(factory).await,
        ),
        TestResult::from_result(
            "init",
            "duplicate_insert_rejected",
            duplicate_insert_rejected(factory).await,
        ),
        TestResult::from_result(
            "init",
            "missing_campaign_not_found",
            missing_campaign_not_found(factory).await,
        ),
        TestResult::from_result(
            "init",
            "list_filters_by_team_and_state",
            list_filters_by_team_and_state(factory).await,
        ),
    ]
}

async fn inserted_campaign_is_readable<S, F, Fut>(factory: &F) -> Result<(), String>
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
    if record.state != CampaignState::Scheduled {
        return Err(format!("expected scheduled, got {}", record.state));
    }
    if record.version != 0 {
        return Err(format!("expected version 0, got {}", record.version));
    }
    if record.external_ids.is_some() {
        return Err("scheduled campaign must not carry external ids".to_string());
    }
    Ok(())
}

async fn duplicate_insert_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let inserted = storage
        .insert_campaign(&mut snap, make_campaign("c1", "team-a"))
        .await;
    let outcome = match inserted {
        // Some backends only detect the duplicate at commit time.
        Ok(()) => storage.commit_snapshot(snap).await,
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::AlreadyExists { campaign_id }) if campaign_id == "c1" => Ok(()),
        other => Err(format!("expected AlreadyExists(c1), got {other:?}")),
    }
}

async fn missing_campaign_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    match storage.get_campaign("nope").await {
        Err(StorageError::CampaignNotFound { .. }) => {}
        other => return Err(format!("get: expected CampaignNotFound, got {other:?}")),
    }

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let locked = storage.get_campaign_for_update(&mut snap, "nope").await;
    let _ = storage.abort_snapshot(snap).await;
    match locked {
        Err(StorageError::CampaignNotFound { .. }) => Ok(()),
        other => Err(format!(
            "for_update: expected CampaignNotFound, got {other:?}"
        )),
    }
}

async fn list_filters_by_team_and_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(&storage, make_campaign("c1", "team-a")).await?;
    seed(&storage, make_campaign("c2", "team-a")).await?;
    seed(&storage, make_campaign("c3", "team-b")).await?;

    // Move c2 to launched.
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut c2 = storage
        .get_campaign_for_update(&mut snap, "c2")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    c2.state = CampaignState::Launched;
    c2.external_ids = Some(pacer_core::ExternalIds::new("acct", "vendor-2"));
    storage
        .update_campaign(&mut snap, c2, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let all = storage
        .list_campaigns(None, None)
        .await
        .map_err(|e| format!("list all: {e}"))?;
    if all.len() != 3 {
        return Err(format!("expected 3 campaigns, got {}", all.len()));
    }

    let team_a = storage
        .list_campaigns(Some("team-a"), None)
        .await
        .map_err(|e| format!("list team: {e}"))?;
    if team_a.len() != 2 {
        return Err(format!("expected 2 for team-a, got {}", team_a.len()));
    }

    let launched = storage
        .list_campaigns(Some("team-a"), Some(CampaignState::Launched))
        .await
        .map_err(|e| format!("list launched: {e}"))?;
    if launched.len() != 1 || launched[0].id != "c2" {
        return Err(format!("expected only c2 launched, got {launched:?}"));
    }
    Ok(())
}
