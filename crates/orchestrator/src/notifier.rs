//! Best-effort fan-out of campaign events.
//!
//! Delivery is at-most-once and never blocks or fails the operation that
//! produced the event. Subscribers that fall behind lose events; the loss
//! is logged on their side of the channel.

use std::sync::Mutex;

use pacer_core::CampaignEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

pub trait EventNotifier: Send + Sync {
    /// Hand an event off for delivery. Must return promptly.
    fn notify(&self, event: CampaignEvent);
}

/// Broadcast-channel notifier with per-campaign and per-team subscriptions.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<CampaignEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastNotifier { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CampaignEvent> {
        self.tx.subscribe()
    }

    /// Events about one campaign.
    pub fn campaign_events(
        &self,
        campaign_id: &str,
    ) -> impl Stream<Item = CampaignEvent> + Send + 'static {
        let campaign_id = campaign_id.to_string();
        self.filtered(move |event| event.campaign_id == campaign_id)
    }

    /// Events about every campaign an owning team has, for list views.
    pub fn team_events(&self, team_id: &str) -> impl Stream<Item = CampaignEvent> + Send + 'static {
        let team_id = team_id.to_string();
        self.filtered(move |event| event.owning_team_id == team_id)
    }

    fn filtered<P>(&self, keep: P) -> impl Stream<Item = CampaignEvent> + Send + 'static
    where
        P: Fn(&CampaignEvent) -> bool + Send + 'static,
    {
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |msg| match msg {
            Ok(event) if keep(&event) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event subscriber lagged; events dropped");
                None
            }
        })
    }
}

impl EventNotifier for BroadcastNotifier {
    fn notify(&self, event: CampaignEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            // No subscriber right now; nothing to deliver to.
            tracing::debug!(kind, "event dropped, no subscribers");
        }
    }
}

/// Keeps every event in memory. For tests.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<CampaignEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CampaignEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Events of one kind (`"status_changed"`, `"alert_triggered"`, ...).
    pub fn of_kind(&self, kind: &str) -> Vec<CampaignEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }
}

impl EventNotifier for RecordingNotifier {
    fn notify(&self, event: CampaignEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::{CampaignState, EventPayload};

    fn status_event(campaign: &str, team: &str) -> CampaignEvent {
        CampaignEvent::new(
            campaign,
            team,
            EventPayload::StatusChanged {
                status: CampaignState::Launched,
                platform_status: None,
            },
        )
    }

    #[tokio::test]
    async fn streams_filter_by_campaign_and_team() {
        let notifier = BroadcastNotifier::new(16);
        let campaign = notifier.campaign_events("c1");
        let team = notifier.team_events("team-b");
        tokio::pin!(campaign);
        tokio::pin!(team);

        notifier.notify(status_event("c2", "team-a"));
        notifier.notify(status_event("c1", "team-a"));
        notifier.notify(status_event("c3", "team-b"));

        let got = campaign.next().await.unwrap();
        assert_eq!(got.campaign_id, "c1");
        let got = team.next().await.unwrap();
        assert_eq!(got.campaign_id, "c3");
    }

    #[test]
    fn notify_without_subscribers_does_not_fail() {
        let notifier = BroadcastNotifier::new(4);
        notifier.notify(status_event("c1", "team-a"));
    }

    #[test]
    fn recording_notifier_filters_by_kind() {
        let notifier = RecordingNotifier::new();
        notifier.notify(status_event("c1", "team-a"));
        assert_eq!(notifier.of_kind("status_changed").len(), 1);
        assert!(notifier.of_kind("alert_triggered").is_empty());
    }
}
