//! Versioned matching-rule registry.
//!
//! Rule sets are published as immutable, sequentially numbered versions.
//! Exactly one version is active at a time, any published version can be
//! re-activated (rollback), and versions can be flagged for gray exposure
//! independently of the active pointer. All state survives restarts.

pub mod control_plane;
pub mod lifecycle;
#[cfg(feature = "net")]
pub mod net;
pub mod persistence;
pub mod timeouts;
pub mod util;

pub use control_plane::admin::{
    AdminAuditRecord, AdminAuditTrail, AdminAuthorizer, AdminRequestContext, AdminServiceError,
    AuditAction, RuleAdminService,
};
pub use lifecycle::{
    ActivationController, ActivationLabel, ActivationPointer, ActiveSummary, AllowListCohort,
    CohortPolicy, GrayReleaseManager, NoGrayCohort, RoutingContext, RuleError, RuleRegistry,
    RuleVersion, RuleVersionId, StatusPage, VersionStatus, VersionStore,
};
#[cfg(feature = "net")]
pub use net::{AdminHttpServer, AdminHttpServerConfig, AdminHttpServerHandle, NetError};
pub use util::{ConfigError, RuleGateConfig, StorageError};
