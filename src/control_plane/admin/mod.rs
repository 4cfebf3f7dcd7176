mod api;
mod audit;
mod guard;
mod service;

pub use api::*;
pub use audit::{AdminAuditRecord, AdminAuditStore, AdminAuditTrail, AuditAction};
pub use guard::AdminAuthorizer;
pub use service::{AdminRequestContext, AdminServiceError, RuleAdminService};
