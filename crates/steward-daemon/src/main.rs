use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use steward_daemon::config::CONFIG_FILE_NAME;
use steward_daemon::{channel, install_signal_handler, Daemon, DaemonConfig, DaemonError};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "stewardd",
    version,
    about = "Service-management daemon that converges system state"
)]
struct Cli {
    /// Directory holding the state checkpoint and instance lock.
    #[arg(long, default_value = "/var/lib/steward")]
    data_dir: PathBuf,

    /// Configuration file (defaults to steward.toml in the data directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between convergence passes; overrides the config file.
    #[arg(long)]
    ensure_interval: Option<u64>,

    /// Prepare, converge once, stop, and exit.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false)]
    trace: bool,
}

fn run(cli: &Cli) -> Result<(), DaemonError> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.data_dir.join(CONFIG_FILE_NAME));
    let mut config = DaemonConfig::load_or_default(&config_path)?;
    if let Some(secs) = cli.ensure_interval {
        config.ensure_interval_secs = secs;
    }

    let daemon = Daemon::new(&config, &cli.data_dir)?;
    if cli.once {
        return daemon.run_once();
    }

    let (handle, commands) = channel();
    install_signal_handler(handle)?;
    info!("stewardd started");
    daemon.run(&commands)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
