//! Append-only audit trail.
//!
//! Every `plan`, `apply_denied`, and `apply` event becomes one LF-terminated
//! JSON object in the audit log. Writers are serialized so each record is a
//! whole line on disk.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::api::{ActionRequest, ActionResult, Decision};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Lifecycle event classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Plan,
    ApplyDenied,
    Apply,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Plan => "plan",
            AuditKind::ApplyDenied => "apply_denied",
            AuditKind::Apply => "apply",
        }
    }
}

/// One audit line. The `actor` field is the front-end-authenticated identity;
/// the embedded request never serializes its own actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub kind: AuditKind,
    pub actor: String,
    pub request: ActionRequest,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
}

/// Sink for audit records.
///
/// The file sink is the production implementation; the no-op sink exists for
/// configurations without an audit path (tests only).
pub trait AuditSink: Send + Sync + 'static {
    fn record<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, crate::Result<()>>;
}

/// Discards all records.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record<'a>(&'a self, _record: &'a AuditRecord) -> BoxFuture<'a, crate::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Appends newline-delimited JSON records to a file, creating the parent
/// directory on first use. The handle is opened per record in append mode to
/// keep the critical section short.
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, crate::Result<()>> {
        Box::pin(async move {
            let line = serde_json::to_string(record)?;

            let _guard = self.write_lock.lock().await;
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{line}")?;
            Ok(())
        })
    }
}

/// Sink for the configured path: file-backed when non-empty, no-op otherwise.
pub fn sink_for_path(path: &str) -> Arc<dyn AuditSink> {
    let path = path.trim();
    if path.is_empty() {
        Arc::new(NoopAuditSink)
    } else {
        Arc::new(FileAuditSink::new(path))
    }
}
