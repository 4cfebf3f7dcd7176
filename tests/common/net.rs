#![cfg(test)]

use rulegate::control_plane::admin::{AdminAuditTrail, AdminAuthorizer, RuleAdminService};
use rulegate::lifecycle::{AllowListCohort, RuleRegistry};
use rulegate::net::{AdminHttpServer, AdminHttpServerConfig, AdminHttpServerHandle};
use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

/// Loopback address with an OS-assigned port; read the bound port back
/// from the server handle.
pub fn ephemeral_loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Starts an admin server over `state_dir` admitting `admins` (empty admits
/// any identified actor) and routing `gray_requesters` to gray versions.
pub fn spawn_admin_server(
    state_dir: &Path,
    admins: &[i64],
    gray_requesters: &[&str],
) -> Result<AdminHttpServerHandle, Box<dyn Error>> {
    let registry = Arc::new(RuleRegistry::open(state_dir)?);
    let audit = AdminAuditTrail::open(state_dir.join("audit.log"), 64)?;
    let service = RuleAdminService::new(
        registry,
        AdminAuthorizer::new(admins.iter().copied()),
        audit,
    )
    .with_cohort_policy(AllowListCohort::new(gray_requesters.iter().copied()));
    let handle = AdminHttpServer::spawn(
        AdminHttpServerConfig::new(ephemeral_loopback()),
        Arc::new(service),
    )?;
    Ok(handle)
}
