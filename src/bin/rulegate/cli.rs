use clap::Parser;
use env_logger::Env;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "rulegate", about = "Rule version registry admin server")]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Admin HTTP listen address (e.g. 127.0.0.1:8088); overrides the config file
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory holding versions.log, activation.json, gray.json and audit.log
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// env_logger-style filter string (e.g. "info,rulegate=debug"); overrides RUST_LOG/defaults
    #[arg(long)]
    pub log_filter: Option<String>,
}

pub const DEFAULT_LOG_FILTER: &str = "info,rulegate=info";

pub fn init_logging(cli_filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }
    builder.format(|buf, record| {
        let ts = buf.timestamp_millis();
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();
}
