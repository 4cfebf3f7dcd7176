use super::error::RuleError;
use super::versions::{RuleVersion, RuleVersionId, VersionStore};
use crate::persistence::JsonStateFile;
use crate::util::{now_ms, StorageError};
use log::{error, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Persisted form of the process-wide active version pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationPointer {
    pub active: Option<RuleVersionId>,
    /// Bumped on every committed activation, including re-activations.
    pub epoch: u64,
    pub updated_at_ms: u64,
}

/// Audit label for an activation. All three are the same pointer swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationLabel {
    Activate,
    Rollback,
    Reactivate,
}

impl ActivationLabel {
    pub fn classify(previous: Option<RuleVersionId>, target: RuleVersionId) -> Self {
        match previous {
            Some(prev) if prev == target => ActivationLabel::Reactivate,
            Some(prev) if target < prev => ActivationLabel::Rollback,
            _ => ActivationLabel::Activate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivationLabel::Activate => "activate",
            ActivationLabel::Rollback => "rollback",
            ActivationLabel::Reactivate => "reactivate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOutcome {
    pub previous: Option<RuleVersionId>,
    pub pointer: ActivationPointer,
    pub label: ActivationLabel,
}

/// Owns the single active-version pointer.
///
/// Writers serialise on the state-file mutex, persist the new pointer, and
/// only then publish it through the `RwLock`. Readers never touch the file
/// mutex, so they observe either the old or the new pointer and are not held
/// up by publishes.
#[derive(Debug)]
pub struct ActivationController {
    store: Arc<VersionStore>,
    file: Mutex<JsonStateFile<ActivationPointer>>,
    pointer: RwLock<ActivationPointer>,
}

impl ActivationController {
    pub fn open(store: Arc<VersionStore>, path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let file = JsonStateFile::new(path);
        let pointer: ActivationPointer = file.load_or_default()?;
        if let Some(id) = pointer.active {
            if !store.contains(id) {
                error!(
                    "event=activation_pointer_dangling path={} active={} epoch={}",
                    file.path().display(),
                    id,
                    pointer.epoch
                );
            }
        }
        info!(
            "event=activation_open active={} epoch={}",
            describe(pointer.active),
            pointer.epoch
        );
        Ok(Self {
            store,
            file: Mutex::new(file),
            pointer: RwLock::new(pointer),
        })
    }

    /// Atomically points the active pointer at `id`. Re-activating the
    /// current version is accepted and still bumps the epoch.
    pub fn activate(&self, id: RuleVersionId) -> Result<ActivationOutcome, RuleError> {
        let file = self.file.lock();
        if !self.store.contains(id) {
            return Err(RuleError::NotFound { id });
        }
        let previous = self.pointer.read().clone();
        let next = ActivationPointer {
            active: Some(id),
            epoch: previous.epoch + 1,
            updated_at_ms: now_ms(),
        };
        file.persist(&next)?;
        *self.pointer.write() = next.clone();
        drop(file);
        let label = ActivationLabel::classify(previous.active, id);
        info!(
            "event=rule_version_activated label={} from={} to={} epoch={}",
            label.as_str(),
            describe(previous.active),
            id,
            next.epoch
        );
        Ok(ActivationOutcome {
            previous: previous.active,
            pointer: next,
            label,
        })
    }

    pub fn active_id(&self) -> Option<RuleVersionId> {
        self.pointer.read().active
    }

    pub fn pointer(&self) -> ActivationPointer {
        self.pointer.read().clone()
    }

    /// Resolves the active pointer to its version, `None` before the first
    /// activation. A pointer the store cannot resolve is a broken invariant.
    pub fn current_active(&self) -> Result<Option<Arc<RuleVersion>>, RuleError> {
        self.active_snapshot().map(|(_, version)| version)
    }

    /// One read of the pointer together with the version it names, so the
    /// epoch and the version always come from the same activation.
    pub fn active_snapshot(
        &self,
    ) -> Result<(ActivationPointer, Option<Arc<RuleVersion>>), RuleError> {
        let pointer = self.pointer();
        let Some(id) = pointer.active else {
            return Ok((pointer, None));
        };
        match self.store.get(id) {
            Ok(version) => Ok((pointer, Some(version))),
            Err(RuleError::NotFound { .. }) => {
                error!("event=activation_pointer_unresolvable active={id}");
                Err(RuleError::StoreUnavailable { id })
            }
            Err(other) => Err(other),
        }
    }
}

fn describe(id: Option<RuleVersionId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "none".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(tmp: &TempDir) -> (Arc<VersionStore>, ActivationController) {
        let store = Arc::new(VersionStore::open(tmp.path().join("versions.log")).unwrap());
        let controller =
            ActivationController::open(store.clone(), tmp.path().join("activation.json")).unwrap();
        (store, controller)
    }

    #[test]
    fn starts_unset() {
        let tmp = TempDir::new().unwrap();
        let (_, controller) = setup(&tmp);
        assert_eq!(controller.active_id(), None);
        assert!(controller.current_active().unwrap().is_none());
        assert_eq!(controller.pointer().epoch, 0);
    }

    #[test]
    fn unknown_version_leaves_pointer_unchanged() {
        let tmp = TempDir::new().unwrap();
        let (store, controller) = setup(&tmp);
        let v1 = store.publish("init", json!({"topics": ["a"]})).unwrap();
        controller.activate(v1.id).unwrap();
        let before = controller.pointer();
        let missing = RuleVersionId::new(42).unwrap();
        assert!(matches!(
            controller.activate(missing),
            Err(RuleError::NotFound { id }) if id == missing
        ));
        assert_eq!(controller.pointer(), before);
    }

    #[test]
    fn labels_follow_version_order() {
        let tmp = TempDir::new().unwrap();
        let (store, controller) = setup(&tmp);
        let v1 = store.publish("one", json!({"a": 1})).unwrap();
        let v2 = store.publish("two", json!({"a": 2})).unwrap();
        assert_eq!(controller.activate(v2.id).unwrap().label, ActivationLabel::Activate);
        let rollback = controller.activate(v1.id).unwrap();
        assert_eq!(rollback.label, ActivationLabel::Rollback);
        assert_eq!(rollback.previous, Some(v2.id));
        let again = controller.activate(v1.id).unwrap();
        assert_eq!(again.label, ActivationLabel::Reactivate);
        assert_eq!(again.pointer.epoch, 3);
    }

    #[test]
    fn pointer_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let (store, controller) = setup(&tmp);
            let v1 = store.publish("init", json!({"a": 1})).unwrap();
            controller.activate(v1.id).unwrap();
        }
        let (_, controller) = setup(&tmp);
        let active = controller.current_active().unwrap().unwrap();
        assert_eq!(active.id.to_string(), "v1");
        assert_eq!(controller.pointer().epoch, 1);
    }

    #[test]
    fn dangling_pointer_reports_store_unavailable() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("activation.json"),
            r#"{"active":"v7","epoch":3,"updated_at_ms":0}"#,
        )
        .unwrap();
        let (_, controller) = setup(&tmp);
        assert!(matches!(
            controller.current_active(),
            Err(RuleError::StoreUnavailable { id }) if id.to_string() == "v7"
        ));
    }
}
