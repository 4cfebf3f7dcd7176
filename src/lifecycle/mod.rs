//! Rule-version lifecycle: the append-only version store, the active pointer,
//! gray membership, and the read-only status queries joining the three.

pub mod activation;
pub mod error;
pub mod gray;
pub mod query;
pub mod registry;
pub mod versions;

pub use activation::{ActivationController, ActivationLabel, ActivationOutcome, ActivationPointer};
pub use error::RuleError;
pub use gray::{
    AllowListCohort, CohortPolicy, GrayReleaseManager, GraySet, NoGrayCohort, ResolvedVersion,
    RoutingContext,
};
pub use query::{ActiveSummary, StatusPage, VersionStatus};
pub use registry::RuleRegistry;
pub use versions::{
    ParseVersionIdError, RuleContent, RuleVersion, RuleVersionId, VersionPage, VersionStore,
    MAX_CHANGELOG_CHARS, MAX_VERSION_ID_CHARS,
};
