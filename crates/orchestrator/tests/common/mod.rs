//! Shared wiring for orchestrator integration tests.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use pacer_channels::{AdapterRegistry, ChannelAdapter, ScriptedAdapter, StaticCredentialStore};
use pacer_core::{CampaignState, Channel, ExternalIds, GuardrailRule};
use pacer_orchestrator::{
    Orchestrator, OrchestratorConfig, RecordingNotifier, RecordingScheduler,
    ReconciliationScheduler,
};
use pacer_storage::{CampaignRecord, CampaignStorage, InMemoryStorage};
use rust_decimal::Decimal;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub adapter: Arc<ScriptedAdapter>,
    pub notifier: Arc<RecordingNotifier>,
    pub ticks: Arc<RecordingScheduler>,
    pub orchestrator: Arc<Orchestrator<InMemoryStorage>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_adapter(ScriptedAdapter::new(Channel::Meta))
    }

    pub fn with_adapter(adapter: ScriptedAdapter) -> Self {
        Self::with_config(adapter, OrchestratorConfig::default())
    }

    pub fn with_config(adapter: ScriptedAdapter, config: OrchestratorConfig) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let adapter = Arc::new(adapter);
        let notifier = Arc::new(RecordingNotifier::new());
        let ticks = Arc::new(RecordingScheduler::new());

        let mut registry = AdapterRegistry::new(Arc::new(StaticCredentialStore::new()));
        registry.register_instance(Channel::Meta, Arc::clone(&adapter) as Arc<dyn ChannelAdapter>);

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&storage),
            Arc::new(registry),
            Arc::clone(&notifier) as _,
            Arc::clone(&ticks) as _,
            config,
        ));
        Harness {
            storage,
            adapter,
            notifier,
            ticks,
            orchestrator,
        }
    }

    pub fn reconciler(&self) -> ReconciliationScheduler<InMemoryStorage> {
        ReconciliationScheduler::new(Arc::clone(&self.orchestrator))
    }

    pub async fn seed(&self, record: CampaignRecord) {
        let mut snap = self.storage.begin_snapshot().await.unwrap();
        self.storage.insert_campaign(&mut snap, record).await.unwrap();
        self.storage.commit_snapshot(snap).await.unwrap();
    }

    pub async fn seed_scheduled(&self, id: &str) -> CampaignRecord {
        let record = CampaignRecord::scheduled(id, "Spring sale", Channel::Meta, "team-a", "alice");
        self.seed(record.clone()).await;
        record
    }

    /// A campaign already live on the vendor, optionally with an ROI floor.
    pub async fn seed_launched(&self, id: &str, roi_threshold: Option<&str>) -> CampaignRecord {
        let mut record =
            CampaignRecord::scheduled(id, "Spring sale", Channel::Meta, "team-a", "alice");
        record.state = CampaignState::Launched;
        record.external_ids = Some(ExternalIds::new("a1", format!("v-{}", id)));
        record.roi_threshold = roi_threshold.map(dec);
        self.seed(record.clone()).await;
        record
    }

    pub async fn add_rule(&self, rule: GuardrailRule) {
        let mut snap = self.storage.begin_snapshot().await.unwrap();
        self.storage
            .insert_guardrail_rule(&mut snap, rule)
            .await
            .unwrap();
        self.storage.commit_snapshot(snap).await.unwrap();
    }

    pub async fn state(&self, id: &str) -> CampaignState {
        self.storage.get_campaign(id).await.unwrap().state
    }
}
