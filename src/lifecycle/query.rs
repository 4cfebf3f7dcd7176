use super::error::RuleError;
use super::registry::RuleRegistry;
use super::versions::{RuleVersion, RuleVersionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A listed version joined with live activation and gray state.
#[derive(Debug, Clone, Serialize)]
pub struct VersionStatus {
    #[serde(flatten)]
    pub version: Arc<RuleVersion>,
    pub is_active: bool,
    pub is_gray: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusPage {
    pub items: Vec<VersionStatus>,
    pub next_cursor: Option<RuleVersionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSummary {
    pub id: RuleVersionId,
    pub changelog: String,
    pub epoch: u64,
}

impl RuleRegistry {
    /// Read-only join of a version page with the active pointer and gray set
    /// as they stand at call time.
    pub fn list_with_status(
        &self,
        limit: usize,
        cursor: Option<RuleVersionId>,
    ) -> Result<StatusPage, RuleError> {
        let page = self.versions().list(limit, cursor)?;
        let active = self.activation().active_id();
        let gray = self.gray().snapshot();
        let items = page
            .items
            .into_iter()
            .map(|version| VersionStatus {
                is_active: active == Some(version.id),
                is_gray: gray.versions.contains(&version.id),
                version,
            })
            .collect();
        Ok(StatusPage {
            items,
            next_cursor: page.next_cursor,
        })
    }

    pub fn active_summary(&self) -> Result<Option<ActiveSummary>, RuleError> {
        let (pointer, version) = self.activation().active_snapshot()?;
        Ok(version.map(|version| ActiveSummary {
            id: version.id,
            changelog: version.changelog.clone(),
            epoch: pointer.epoch,
        }))
    }
}
