mod cli;

use crate::cli::{init_logging, Cli};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rulegate::control_plane::admin::{AdminAuditTrail, AdminAuthorizer, RuleAdminService};
use rulegate::lifecycle::{AllowListCohort, RuleRegistry};
use rulegate::net::{AdminHttpServer, AdminHttpServerConfig};
use rulegate::persistence::AUDIT_FILE;
use rulegate::timeouts::ADMIN_STREAM_TIMEOUT;
use rulegate::util::RuleGateConfig;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());
    let config = load_config(&cli)?;
    let bind = config.bind_addr()?;

    let registry = Arc::new(
        RuleRegistry::open(&config.state_dir)
            .with_context(|| format!("opening state dir {}", config.state_dir.display()))?,
    );
    let audit = AdminAuditTrail::open(config.state_dir.join(AUDIT_FILE), config.audit_capacity)
        .context("opening audit log")?;
    let authorizer = AdminAuthorizer::new(config.admin_actor_ids.iter().copied());
    let mut service = RuleAdminService::new(registry, authorizer, audit);
    if !config.gray_allow_list.is_empty() {
        service = service.with_cohort_policy(AllowListCohort::new(config.gray_allow_list.clone()));
    }

    let handle = AdminHttpServer::spawn(
        AdminHttpServerConfig {
            bind,
            request_timeout: config.request_timeout(),
            stream_timeout: ADMIN_STREAM_TIMEOUT,
            max_connections: config.max_connections,
        },
        Arc::new(service),
    )
    .with_context(|| format!("binding admin listener on {bind}"))?;
    info!(
        "event=rulegate_started addr={} state_dir={} admins={} gray_allow_list={}",
        handle.local_addr(),
        config.state_dir.display(),
        config.admin_actor_ids.len(),
        config.gray_allow_list.len()
    );
    handle.wait();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<RuleGateConfig> {
    let mut config = match &cli.config {
        Some(path) => RuleGateConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuleGateConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.bind = bind.clone();
    }
    if let Some(state_dir) = &cli.state_dir {
        config.state_dir = state_dir.clone();
    }
    config.validate()?;
    Ok(config)
}
