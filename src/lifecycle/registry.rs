use super::activation::ActivationController;
use super::gray::{CohortPolicy, GrayReleaseManager, ResolvedVersion, RoutingContext};
use super::versions::{RuleVersionId, VersionStore};
use crate::persistence::{ACTIVATION_FILE, GRAY_FILE, VERSIONS_FILE};
use crate::util::StorageError;
use log::info;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// The version store plus the two pieces of state that refer into it,
/// opened together from one state directory.
#[derive(Debug)]
pub struct RuleRegistry {
    store: Arc<VersionStore>,
    activation: ActivationController,
    gray: GrayReleaseManager,
}

impl RuleRegistry {
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let state_dir = state_dir.as_ref();
        fs::create_dir_all(state_dir)?;
        let store = Arc::new(VersionStore::open(state_dir.join(VERSIONS_FILE))?);
        let activation = ActivationController::open(store.clone(), state_dir.join(ACTIVATION_FILE))?;
        let gray = GrayReleaseManager::open(store.clone(), state_dir.join(GRAY_FILE))?;
        info!(
            "event=rule_registry_open state_dir={} versions={}",
            state_dir.display(),
            store.len()
        );
        Ok(Self {
            store,
            activation,
            gray,
        })
    }

    pub fn versions(&self) -> &VersionStore {
        &self.store
    }

    pub fn activation(&self) -> &ActivationController {
        &self.activation
    }

    pub fn gray(&self) -> &GrayReleaseManager {
        &self.gray
    }

    pub fn resolve_version_for_request(
        &self,
        context: &RoutingContext,
        policy: &dyn CohortPolicy,
    ) -> Option<RuleVersionId> {
        self.gray
            .resolve_version_for_request(context, policy, &self.activation)
    }

    pub fn resolve(&self, context: &RoutingContext, policy: &dyn CohortPolicy) -> ResolvedVersion {
        self.gray.resolve(context, policy, &self.activation)
    }
}
