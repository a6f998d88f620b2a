//! Conformance test suite for `CampaignStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `CampaignStorage` implementation can run to verify correctness. The
//! suite covers:
//!
//! - **Initialization**: insert, duplicate detection, lookups and filters
//! - **Snapshot isolation**: uncommitted writes invisible, aborted and
//!   dropped snapshots discarded
//! - **Version validation / OCC**: conflict detection, write-once external ids
//! - **Audit coupling**: audit entries committed atomically with state, in order
//! - **Exclusive access**: `get_campaign_for_update` blocks a second locker,
//!   and N concurrent claimers produce exactly one winner
//!
//! # Usage
//!
//! ```ignore
//! use pacer_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod audit;
mod concurrent;
mod init;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use pacer_core::{AuditEventKind, AuditLogEntry, Channel};

use crate::record::CampaignRecord;
use crate::CampaignStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "audit").
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: CampaignStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(audit::run_audit_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_campaign(id: &str, team: &str) -> CampaignRecord {
    CampaignRecord::scheduled(id, "Conformance campaign", Channel::Meta, team, "tester")
}

fn make_audit_entry(campaign_id: &str, message: &str) -> AuditLogEntry {
    AuditLogEntry::success(campaign_id, AuditEventKind::MetricIngest, message)
}

/// Insert and commit a campaign in its own snapshot.
async fn seed<S: CampaignStorage>(storage: &S, record: CampaignRecord) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_campaign(&mut snap, record)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}
