use crate::lifecycle::{ActivationLabel, RuleVersionId};
use crate::persistence::JsonLinesFile;
use crate::util::config::DEFAULT_AUDIT_CAPACITY;
use crate::util::StorageError;
use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PublishRuleVersion,
    ActivateRuleVersion,
    RollbackRuleVersion,
    ReactivateRuleVersion,
    SetRuleGrayMode,
}

impl From<ActivationLabel> for AuditAction {
    fn from(label: ActivationLabel) -> Self {
        match label {
            ActivationLabel::Activate => AuditAction::ActivateRuleVersion,
            ActivationLabel::Rollback => AuditAction::RollbackRuleVersion,
            ActivationLabel::Reactivate => AuditAction::ReactivateRuleVersion,
        }
    }
}

/// One administrative change. Records are kept in append order, which can
/// trail commit order when activations race; activation records carry the
/// pointer epoch in `detail.epoch` for that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAuditRecord {
    pub action: AuditAction,
    pub version: RuleVersionId,
    pub actor: Option<i64>,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub recorded_at_ms: u64,
}

/// Bounded in-memory ring of recent audit records.
#[derive(Debug, Clone)]
pub struct AdminAuditStore {
    capacity: usize,
    entries: VecDeque<AdminAuditRecord>,
}

impl AdminAuditStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }

    /// Records a new audit event and returns the evicted record if the ring buffer overflowed.
    pub fn record(&mut self, record: AdminAuditRecord) -> Option<AdminAuditRecord> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(record);
        evicted
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AdminAuditRecord> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Audit ring backed by an append-only `audit.log`.
///
/// Records are written after the mutation they describe has committed, so a
/// failed append is logged and otherwise ignored.
#[derive(Debug)]
pub struct AdminAuditTrail {
    log: Option<JsonLinesFile>,
    ring: Mutex<AdminAuditStore>,
}

impl AdminAuditTrail {
    /// Opens the durable trail and warms the ring with its newest records.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, StorageError> {
        let log = JsonLinesFile::new(path);
        let history: Vec<AdminAuditRecord> = log.load_all()?;
        let mut ring = AdminAuditStore::new(capacity);
        for record in history {
            ring.record(record);
        }
        Ok(Self {
            log: Some(log),
            ring: Mutex::new(ring),
        })
    }

    pub fn in_memory(capacity: usize) -> Self {
        Self {
            log: None,
            ring: Mutex::new(AdminAuditStore::new(capacity)),
        }
    }

    pub fn record(&self, record: AdminAuditRecord) {
        if let Some(log) = &self.log {
            if let Err(err) = log.append(&record) {
                warn!(
                    "event=admin_audit_append_failed action={:?} version={} error={err}",
                    record.action, record.version
                );
            }
        }
        self.ring.lock().record(record);
    }

    pub fn recent(&self, limit: usize) -> Vec<AdminAuditRecord> {
        self.ring.lock().recent(limit)
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }
}

impl Default for AdminAuditTrail {
    fn default() -> Self {
        Self {
            log: None,
            ring: Mutex::new(AdminAuditStore::with_default_capacity()),
        }
    }
}
