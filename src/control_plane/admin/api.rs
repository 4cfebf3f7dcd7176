use crate::lifecycle::RuleVersionId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;
pub const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRuleRequest {
    pub changelog: String,
    pub content: serde_json::Value,
}

/// Body of `/admin/rules/rollback`; used for first activation as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRuleRequest {
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrayRuleRequest {
    pub version: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrayStatusResponse {
    pub version: RuleVersionId,
    pub is_gray: bool,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub requester: String,
    pub version: Option<RuleVersionId>,
    pub gray: bool,
}
