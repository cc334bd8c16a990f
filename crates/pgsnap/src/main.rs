//! pgsnap - point-in-time PostgreSQL diagnostic snapshot.
//!
//! Connects once, runs the probe catalog, prints the snapshot as text or
//! JSON and exits. Connection defaults come from the libpq environment
//! variables; flags override them.

mod report;

use clap::{Parser, ValueEnum};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use pgsnap_core::analytics::LagThresholds;
use pgsnap_core::collector::{PgConnector, PgSession};
use pgsnap_core::config::SslMode;
use pgsnap_core::{CollectConfig, CollectError, ConfigError, Model, SnapshotAssembler};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// PostgreSQL diagnostic snapshot.
#[derive(Parser, Debug)]
#[command(name = "pgsnap", about = "Point-in-time PostgreSQL diagnostic snapshot", version)]
struct Args {
    /// Server host (default: $PGHOST or localhost).
    #[arg(long)]
    host: Option<String>,

    /// Server port (default: $PGPORT or 5432).
    #[arg(short, long)]
    port: Option<u16>,

    /// Role name (default: $PGUSER or $USER).
    #[arg(short = 'U', long)]
    user: Option<String>,

    /// Password (default: $PGPASSWORD).
    #[arg(long)]
    password: Option<String>,

    /// Database for per-database probes. Repeatable; the first one is also
    /// used for the main session.
    #[arg(short, long = "dbname", value_name = "DBNAME")]
    dbname: Vec<String>,

    /// Collection deadline in seconds.
    #[arg(short, long)]
    timeout: Option<u64>,

    /// TLS mode: disable, prefer, require, verify-full.
    #[arg(long)]
    sslmode: Option<SslMode>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Number of longest-waiting sessions to show.
    #[arg(long, default_value = "10")]
    top: usize,

    /// Replay lag, in bytes, still counted as caught up.
    #[arg(long, default_value = "0")]
    max_lag_bytes: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["pgsnap", "pgsnap_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries the snapshot only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Environment defaults with command-line overrides applied.
fn build_config(args: &Args) -> Result<CollectConfig, ConfigError> {
    let user = args.user.clone();
    let mut config = CollectConfig::from_lookup(|name| match (name, &user) {
        ("PGUSER", Some(user)) => Some(user.clone()),
        _ => std::env::var(name).ok(),
    })?;

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if !args.dbname.is_empty() {
        config.databases = args.dbname.clone();
    }
    if let Some(timeout) = args.timeout {
        config.timeout_sec = timeout;
    }
    if let Some(mode) = args.sslmode {
        config.ssl_mode = mode;
    }

    config.validate()?;
    Ok(config)
}

fn collect(config: CollectConfig) -> Result<Model, CollectError> {
    let mut session = PgSession::connect(&config, config.main_database())?;
    info!(database = %session.dbname(), "connected to {}:{}", config.host, config.port);

    let connector = PgConnector::new(config.clone());
    let mut assembler =
        SnapshotAssembler::new(config, &mut session)?.with_session_factory(&connector);
    assembler.collect()
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration: {}", e);
            std::process::exit(1);
        }
    };

    let model = match collect(config) {
        Ok(model) => model,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    match args.format {
        Format::Json => match serde_json::to_string_pretty(&model) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("failed to serialize snapshot: {}", e);
                std::process::exit(1);
            }
        },
        Format::Text => {
            let thresholds = LagThresholds {
                max_caught_up_bytes: args.max_lag_bytes,
            };
            print!("{}", report::render_text(&model, args.top, &thresholds));
        }
    }
}
