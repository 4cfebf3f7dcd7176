use super::api::{
    GrayRuleRequest, GrayStatusResponse, PublishRuleRequest, ResolveResponse, RollbackRuleRequest,
    DEFAULT_AUDIT_LIMIT, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use super::audit::{AdminAuditRecord, AdminAuditTrail, AuditAction};
use super::guard::AdminAuthorizer;
use crate::lifecycle::{
    ActiveSummary, CohortPolicy, NoGrayCohort, RoutingContext, RuleError, RuleRegistry,
    RuleVersion, RuleVersionId, StatusPage, MAX_VERSION_ID_CHARS,
};
use crate::util::now_ms;
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Caller identity as asserted by the upstream gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminRequestContext {
    pub actor: Option<i64>,
}

impl AdminRequestContext {
    pub fn new(actor: Option<i64>) -> Self {
        Self { actor }
    }

    pub fn anonymous() -> Self {
        Self { actor: None }
    }
}

#[derive(Debug, Error)]
pub enum AdminServiceError {
    #[error("caller is not an administrator")]
    Forbidden,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rule version {0} not found")]
    UnknownVersion(String),
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Administrative facade over the rule registry: authorization, request
/// validation, and audit recording around each lifecycle operation.
///
/// Every method takes `&self`; the registry components synchronise
/// internally, so concurrent reads never queue behind a mutation.
pub struct RuleAdminService {
    registry: Arc<RuleRegistry>,
    authorizer: AdminAuthorizer,
    audit: AdminAuditTrail,
    cohort: Box<dyn CohortPolicy>,
}

impl RuleAdminService {
    pub fn new(registry: Arc<RuleRegistry>, authorizer: AdminAuthorizer, audit: AdminAuditTrail) -> Self {
        Self {
            registry,
            authorizer,
            audit,
            cohort: Box::new(NoGrayCohort),
        }
    }

    pub fn with_cohort_policy(mut self, policy: impl CohortPolicy + 'static) -> Self {
        self.cohort = Box::new(policy);
        self
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn active(
        &self,
        ctx: &AdminRequestContext,
    ) -> Result<Option<ActiveSummary>, AdminServiceError> {
        self.authorize(ctx)?;
        Ok(self.registry.active_summary()?)
    }

    pub fn list_versions(
        &self,
        ctx: &AdminRequestContext,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<StatusPage, AdminServiceError> {
        self.authorize(ctx)?;
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(AdminServiceError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        let cursor = cursor
            .map(|raw| {
                raw.parse::<RuleVersionId>()
                    .map_err(|err| AdminServiceError::InvalidRequest(err.to_string()))
            })
            .transpose()?;
        Ok(self.registry.list_with_status(limit, cursor)?)
    }

    pub fn publish(
        &self,
        ctx: &AdminRequestContext,
        request: PublishRuleRequest,
    ) -> Result<Arc<RuleVersion>, AdminServiceError> {
        self.authorize(ctx)?;
        let version = self
            .registry
            .versions()
            .publish(&request.changelog, request.content)?;
        self.audit.record(AdminAuditRecord {
            action: AuditAction::PublishRuleVersion,
            version: version.id,
            actor: ctx.actor,
            detail: json!({ "changelog": version.changelog }),
            recorded_at_ms: now_ms(),
        });
        Ok(version)
    }

    /// Activates the requested version. First activation and rollback are
    /// the same pointer swap and differ only in the audit action recorded.
    ///
    /// The audit entry is appended after the activation lock is released, so
    /// concurrent activations may appear in the trail out of commit order.
    /// `detail.epoch` carries the pointer epoch and orders them correctly.
    pub fn rollback(
        &self,
        ctx: &AdminRequestContext,
        request: RollbackRuleRequest,
    ) -> Result<ActiveSummary, AdminServiceError> {
        self.authorize(ctx)?;
        let id = parse_version(&request.version)?;
        let outcome = self.registry.activation().activate(id)?;
        let version = self.registry.versions().get(id)?;
        self.audit.record(AdminAuditRecord {
            action: outcome.label.into(),
            version: id,
            actor: ctx.actor,
            detail: json!({
                "previous": outcome.previous,
                "epoch": outcome.pointer.epoch,
            }),
            recorded_at_ms: now_ms(),
        });
        info!(
            "event=admin_activation actor={:?} version={} label={}",
            ctx.actor,
            id,
            outcome.label.as_str()
        );
        Ok(ActiveSummary {
            id,
            changelog: version.changelog.clone(),
            epoch: outcome.pointer.epoch,
        })
    }

    pub fn set_gray(
        &self,
        ctx: &AdminRequestContext,
        request: GrayRuleRequest,
    ) -> Result<GrayStatusResponse, AdminServiceError> {
        self.authorize(ctx)?;
        let id = parse_version(&request.version)?;
        let changed = self.registry.gray().set_gray(id, request.enabled)?;
        if changed {
            self.audit.record(AdminAuditRecord {
                action: AuditAction::SetRuleGrayMode,
                version: id,
                actor: ctx.actor,
                detail: json!({ "enabled": request.enabled }),
                recorded_at_ms: now_ms(),
            });
        }
        Ok(GrayStatusResponse {
            version: id,
            is_gray: self.registry.gray().is_gray(id),
            changed,
        })
    }

    pub fn recent_audit(
        &self,
        ctx: &AdminRequestContext,
        limit: Option<usize>,
    ) -> Result<Vec<AdminAuditRecord>, AdminServiceError> {
        self.authorize(ctx)?;
        let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(AdminServiceError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok(self.audit.recent(limit))
    }

    /// Resolves the version a request from `requester` would be served with
    /// under the configured cohort policy.
    pub fn resolve(
        &self,
        ctx: &AdminRequestContext,
        requester: &str,
    ) -> Result<ResolveResponse, AdminServiceError> {
        self.authorize(ctx)?;
        if requester.trim().is_empty() {
            return Err(AdminServiceError::InvalidRequest(
                "requester must not be empty".into(),
            ));
        }
        let context = RoutingContext::new(requester.trim());
        let resolved = self.registry.resolve(&context, self.cohort.as_ref());
        Ok(ResolveResponse {
            requester: context.requester,
            version: resolved.version,
            gray: resolved.gray,
        })
    }

    fn authorize(&self, ctx: &AdminRequestContext) -> Result<(), AdminServiceError> {
        if self.authorizer.is_admin(ctx.actor) {
            Ok(())
        } else {
            warn!("event=admin_forbidden actor={:?}", ctx.actor);
            Err(AdminServiceError::Forbidden)
        }
    }
}

fn parse_version(raw: &str) -> Result<RuleVersionId, AdminServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AdminServiceError::InvalidRequest(
            "version must not be empty".into(),
        ));
    }
    if trimmed.chars().count() > MAX_VERSION_ID_CHARS {
        return Err(AdminServiceError::InvalidRequest(format!(
            "version exceeds {MAX_VERSION_ID_CHARS} characters"
        )));
    }
    trimmed
        .parse()
        .map_err(|_| AdminServiceError::UnknownVersion(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::AllowListCohort;
    use serde_json::json;
    use tempfile::TempDir;

    fn service(tmp: &TempDir, authorizer: AdminAuthorizer) -> RuleAdminService {
        let registry = Arc::new(RuleRegistry::open(tmp.path()).unwrap());
        RuleAdminService::new(registry, authorizer, AdminAuditTrail::in_memory(16))
    }

    fn publish(svc: &RuleAdminService, changelog: &str) -> Arc<RuleVersion> {
        svc.publish(
            &AdminRequestContext::new(Some(1)),
            PublishRuleRequest {
                changelog: changelog.into(),
                content: json!({ "topics": [changelog] }),
            },
        )
        .unwrap()
    }

    #[test]
    fn rollback_records_label_specific_audit() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::open());
        let ctx = AdminRequestContext::new(Some(9));
        publish(&svc, "one");
        publish(&svc, "two");
        publish(&svc, "three");
        svc.rollback(&ctx, RollbackRuleRequest { version: "v3".into() })
            .unwrap();
        let summary = svc
            .rollback(&ctx, RollbackRuleRequest { version: "v2".into() })
            .unwrap();
        assert_eq!(summary.changelog, "two");
        assert_eq!(summary.epoch, 2);
        let recent = svc.recent_audit(&ctx, Some(2)).unwrap();
        assert_eq!(recent[0].action, AuditAction::RollbackRuleVersion);
        assert_eq!(recent[0].actor, Some(9));
        assert_eq!(recent[0].detail["previous"], "v3");
        assert_eq!(recent[1].action, AuditAction::ActivateRuleVersion);
    }

    #[test]
    fn malformed_and_unknown_versions() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::open());
        let ctx = AdminRequestContext::new(Some(1));
        let err = svc
            .rollback(&ctx, RollbackRuleRequest { version: " ".into() })
            .unwrap_err();
        assert!(matches!(err, AdminServiceError::InvalidRequest(_)));
        let err = svc
            .rollback(&ctx, RollbackRuleRequest { version: "release-7".into() })
            .unwrap_err();
        assert!(matches!(err, AdminServiceError::UnknownVersion(_)));
        let err = svc
            .set_gray(
                &ctx,
                GrayRuleRequest {
                    version: "v4".into(),
                    enabled: true,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AdminServiceError::Rule(RuleError::NotFound { .. })
        ));
        assert!(svc.recent_audit(&ctx, None).unwrap().is_empty());
    }

    #[test]
    fn forbidden_actor_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::new([1]));
        let outsider = AdminRequestContext::new(Some(2));
        let err = svc
            .publish(
                &outsider,
                PublishRuleRequest {
                    changelog: "sneaky".into(),
                    content: json!({"a": 1}),
                },
            )
            .unwrap_err();
        assert!(matches!(err, AdminServiceError::Forbidden));
        assert!(svc.registry().versions().is_empty());
        assert!(matches!(
            svc.active(&AdminRequestContext::anonymous()),
            Err(AdminServiceError::Forbidden)
        ));
    }

    #[test]
    fn gray_toggle_reports_change_and_audits_once() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::open());
        let ctx = AdminRequestContext::new(Some(3));
        publish(&svc, "one");
        let request = GrayRuleRequest {
            version: "v1".into(),
            enabled: true,
        };
        let first = svc.set_gray(&ctx, request.clone()).unwrap();
        assert!(first.is_gray && first.changed);
        let second = svc.set_gray(&ctx, request).unwrap();
        assert!(second.is_gray && !second.changed);
        let gray_audits = svc
            .recent_audit(&ctx, None)
            .unwrap()
            .into_iter()
            .filter(|r| r.action == AuditAction::SetRuleGrayMode)
            .count();
        assert_eq!(gray_audits, 1);
    }

    #[test]
    fn list_limit_bounds_are_enforced() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::open());
        let ctx = AdminRequestContext::new(Some(1));
        for bad in [0, MAX_PAGE_LIMIT + 1] {
            assert!(matches!(
                svc.list_versions(&ctx, Some(bad), None),
                Err(AdminServiceError::InvalidRequest(_))
            ));
        }
        assert!(matches!(
            svc.list_versions(&ctx, None, Some("latest")),
            Err(AdminServiceError::InvalidRequest(_))
        ));
        publish(&svc, "one");
        assert_eq!(svc.list_versions(&ctx, None, None).unwrap().items.len(), 1);
    }

    #[test]
    fn resolve_uses_configured_cohort() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::open())
            .with_cohort_policy(AllowListCohort::new(["canary-user"]));
        let ctx = AdminRequestContext::new(Some(1));
        publish(&svc, "one");
        publish(&svc, "two");
        svc.rollback(&ctx, RollbackRuleRequest { version: "v1".into() })
            .unwrap();
        svc.set_gray(
            &ctx,
            GrayRuleRequest {
                version: "v2".into(),
                enabled: true,
            },
        )
        .unwrap();
        let canary = svc.resolve(&ctx, "canary-user").unwrap();
        assert_eq!(canary.version.map(|v| v.to_string()).as_deref(), Some("v2"));
        assert!(canary.gray);
        let regular = svc.resolve(&ctx, "someone-else").unwrap();
        assert_eq!(regular.version.map(|v| v.to_string()).as_deref(), Some("v1"));
        assert!(!regular.gray);
    }

    #[test]
    fn resolve_flags_gray_even_when_member_is_active() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::open())
            .with_cohort_policy(AllowListCohort::new(["canary-user"]));
        let ctx = AdminRequestContext::new(Some(1));
        publish(&svc, "one");
        svc.rollback(&ctx, RollbackRuleRequest { version: "v1".into() })
            .unwrap();
        svc.set_gray(
            &ctx,
            GrayRuleRequest {
                version: "v1".into(),
                enabled: true,
            },
        )
        .unwrap();
        let canary = svc.resolve(&ctx, "canary-user").unwrap();
        assert_eq!(canary.version.map(|v| v.to_string()).as_deref(), Some("v1"));
        assert!(canary.gray);
        let regular = svc.resolve(&ctx, "someone-else").unwrap();
        assert_eq!(regular.version, canary.version);
        assert!(!regular.gray);
    }

    #[test]
    fn open_allow_list_still_rejects_missing_actor() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, AdminAuthorizer::open());
        for ctx in [
            AdminRequestContext::anonymous(),
            AdminRequestContext::new(Some(0)),
            AdminRequestContext::new(Some(-4)),
        ] {
            assert!(matches!(
                svc.publish(
                    &ctx,
                    PublishRuleRequest {
                        changelog: "anon".into(),
                        content: json!({"a": 1}),
                    },
                ),
                Err(AdminServiceError::Forbidden)
            ));
            assert!(matches!(svc.active(&ctx), Err(AdminServiceError::Forbidden)));
        }
        assert!(svc.registry().versions().is_empty());
        assert!(svc.active(&AdminRequestContext::new(Some(5))).unwrap().is_none());
    }

    #[test]
    fn audit_detail_orders_activations_by_epoch() {
        let tmp = TempDir::new().unwrap();
        let svc = Arc::new(service(&tmp, AdminAuthorizer::open()));
        publish(&svc, "one");
        publish(&svc, "two");
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let svc = svc.clone();
                std::thread::spawn(move || {
                    let ctx = AdminRequestContext::new(Some(1));
                    for round in 0..3 {
                        let version = if (worker + round) % 2 == 0 { "v1" } else { "v2" };
                        svc.rollback(&ctx, RollbackRuleRequest { version: version.into() })
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        let ctx = AdminRequestContext::new(Some(1));
        let mut epochs: Vec<u64> = svc
            .recent_audit(&ctx, Some(MAX_PAGE_LIMIT))
            .unwrap()
            .into_iter()
            .filter(|r| r.action != AuditAction::PublishRuleVersion)
            .map(|r| r.detail["epoch"].as_u64().unwrap())
            .collect();
        epochs.sort_unstable();
        assert_eq!(epochs, (1..=12).collect::<Vec<u64>>());
    }
}
