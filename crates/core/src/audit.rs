//! Append-only record of orchestration events.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    Launch,
    Pause,
    Resume,
    Adjust,
    AlertTrigger,
    MetricIngest,
    Complete,
    Fail,
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Error,
}

/// One orchestration event. Never updated or deleted once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Assigned by the storage backend at commit; strictly increasing.
    pub sequence: u64,
    pub campaign_id: String,
    pub event_kind: AuditEventKind,
    pub result: AuditResult,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub message: String,
    #[serde(default)]
    pub normalized_details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_vendor_payload: Option<serde_json::Value>,
}

impl AuditLogEntry {
    fn new(
        campaign_id: &str,
        event_kind: AuditEventKind,
        result: AuditResult,
        message: impl Into<String>,
    ) -> Self {
        AuditLogEntry {
            sequence: 0,
            campaign_id: campaign_id.to_string(),
            event_kind,
            result,
            timestamp: OffsetDateTime::now_utc(),
            actor: None,
            message: message.into(),
            normalized_details: serde_json::Value::Null,
            raw_vendor_payload: None,
        }
    }

    pub fn success(campaign_id: &str, kind: AuditEventKind, message: impl Into<String>) -> Self {
        Self::new(campaign_id, kind, AuditResult::Success, message)
    }

    pub fn error(campaign_id: &str, kind: AuditEventKind, message: impl Into<String>) -> Self {
        Self::new(campaign_id, kind, AuditResult::Error, message)
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.normalized_details = details;
        self
    }

    pub fn with_raw_payload(mut self, raw: serde_json::Value) -> Self {
        self.raw_vendor_payload = Some(raw);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == AuditResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let entry = AuditLogEntry::error("c1", AuditEventKind::Pause, "vendor refused")
            .with_actor("ops@example.com")
            .with_details(serde_json::json!({"error_kind": "auth"}))
            .with_raw_payload(serde_json::json!({"error": {"code": 190}}));

        assert_eq!(entry.campaign_id, "c1");
        assert!(!entry.is_success());
        assert_eq!(entry.actor.as_deref(), Some("ops@example.com"));
        assert_eq!(entry.normalized_details["error_kind"], "auth");
        assert!(entry.raw_vendor_payload.is_some());
    }

    #[test]
    fn entry_json_uses_snake_case_kinds() {
        let entry = AuditLogEntry::success("c1", AuditEventKind::AlertTrigger, "fired");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event_kind"], "alert_trigger");
        assert_eq!(json["result"], "success");
        assert!(json.get("actor").is_none());

        let back: AuditLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_kind, AuditEventKind::AlertTrigger);
    }
}
