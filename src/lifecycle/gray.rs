use super::activation::ActivationController;
use super::error::RuleError;
use super::versions::{RuleVersionId, VersionStore};
use crate::persistence::JsonStateFile;
use crate::util::{now_ms, StorageError};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Persisted gray membership. Independent of the active pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraySet {
    pub versions: BTreeSet<RuleVersionId>,
    pub updated_at_ms: u64,
}

/// Routing input handed to a [`CohortPolicy`], typically a stable requester key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingContext {
    pub requester: String,
}

impl RoutingContext {
    pub fn new(requester: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
        }
    }
}

/// Outcome of routing one request: the serving version and whether it came
/// from the gray cohort rather than the active pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: Option<RuleVersionId>,
    pub gray: bool,
}

/// Decides whether a request falls into the gray cohort and, if so, which
/// gray member serves it. `gray` is sorted oldest first.
pub trait CohortPolicy: Send + Sync {
    fn select(&self, context: &RoutingContext, gray: &[RuleVersionId]) -> Option<RuleVersionId>;
}

/// Keeps every request on the active version.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGrayCohort;

impl CohortPolicy for NoGrayCohort {
    fn select(&self, _context: &RoutingContext, _gray: &[RuleVersionId]) -> Option<RuleVersionId> {
        None
    }
}

/// Routes allow-listed requesters to the newest gray version.
#[derive(Debug, Default, Clone)]
pub struct AllowListCohort {
    requesters: HashSet<String>,
}

impl AllowListCohort {
    pub fn new<I, S>(requesters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requesters: requesters.into_iter().map(Into::into).collect(),
        }
    }
}

impl CohortPolicy for AllowListCohort {
    fn select(&self, context: &RoutingContext, gray: &[RuleVersionId]) -> Option<RuleVersionId> {
        if self.requesters.contains(&context.requester) {
            gray.last().copied()
        } else {
            None
        }
    }
}

/// Owns the set of versions flagged for gray exposure.
#[derive(Debug)]
pub struct GrayReleaseManager {
    store: Arc<VersionStore>,
    file: Mutex<JsonStateFile<GraySet>>,
    members: RwLock<GraySet>,
}

impl GrayReleaseManager {
    pub fn open(store: Arc<VersionStore>, path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let file = JsonStateFile::new(path);
        let members: GraySet = file.load_or_default()?;
        for id in members.versions.iter().filter(|id| !store.contains(**id)) {
            error!(
                "event=gray_member_unknown path={} version={}",
                file.path().display(),
                id
            );
        }
        info!("event=gray_open members={}", members.versions.len());
        Ok(Self {
            store,
            file: Mutex::new(file),
            members: RwLock::new(members),
        })
    }

    /// Adds or removes `id` from the gray set. Returns whether membership
    /// changed; a request that matches current state is a no-op.
    pub fn set_gray(&self, id: RuleVersionId, enabled: bool) -> Result<bool, RuleError> {
        let file = self.file.lock();
        if !self.store.contains(id) {
            return Err(RuleError::NotFound { id });
        }
        let mut next = self.members.read().clone();
        let changed = if enabled {
            next.versions.insert(id)
        } else {
            next.versions.remove(&id)
        };
        if !changed {
            debug!("event=gray_toggle_noop version={id} enabled={enabled}");
            return Ok(false);
        }
        next.updated_at_ms = now_ms();
        file.persist(&next)?;
        *self.members.write() = next;
        drop(file);
        info!("event=gray_toggled version={id} enabled={enabled}");
        Ok(true)
    }

    pub fn is_gray(&self, id: RuleVersionId) -> bool {
        self.members.read().versions.contains(&id)
    }

    /// Gray members, oldest first.
    pub fn members(&self) -> Vec<RuleVersionId> {
        self.members.read().versions.iter().copied().collect()
    }

    /// The whole set as of one read, for joins that must not mix states.
    pub fn snapshot(&self) -> GraySet {
        self.members.read().clone()
    }

    /// Chooses the version serving a request: a gray member when the policy
    /// places the context in the gray cohort, otherwise the active version.
    pub fn resolve_version_for_request(
        &self,
        context: &RoutingContext,
        policy: &dyn CohortPolicy,
        activation: &ActivationController,
    ) -> Option<RuleVersionId> {
        self.resolve(context, policy, activation).version
    }

    /// Like [`Self::resolve_version_for_request`], also reporting which branch
    /// produced the answer.
    pub fn resolve(
        &self,
        context: &RoutingContext,
        policy: &dyn CohortPolicy,
        activation: &ActivationController,
    ) -> ResolvedVersion {
        let members = self.members();
        if !members.is_empty() {
            if let Some(selected) = policy.select(context, &members) {
                if members.binary_search(&selected).is_ok() {
                    return ResolvedVersion {
                        version: Some(selected),
                        gray: true,
                    };
                }
                warn!(
                    "event=gray_policy_selected_non_member requester={} version={}",
                    context.requester, selected
                );
            }
        }
        ResolvedVersion {
            version: activation.active_id(),
            gray: false,
        }
    }
}
