mod config;
mod logging;
mod observer;
mod session;

use clap::Parser;
use config::AppConfig;
use observer::{SiteMarkup, SupervisorArgs, SupervisorHandle};
use session::UreqTransport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

/// How often the daemon checks that at least one observer is still alive.
const WATCHDOG_PERIOD: Duration = Duration::from_secs(60);

struct ExitCode;

impl ExitCode {
    const OK: i32 = 0;
    const NO_ACTIVE_OBSERVERS: i32 = 1;
    const CONFIG: i32 = 2;
    const STARTUP: i32 = 3;
}

#[derive(Parser)]
#[command(name = "subguard")]
#[command(about = "Watches mobile accounts for new paid services and cancels subscriptions")]
#[command(version)]
struct Cli {
    /// Path to the JSON or YAML config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log filter, overrides logLevel from the config (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the config file and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init(cli.log_level.as_deref(), None);
            tracing::error!(fatal = true, error = %format!("{:#}", e), "Failed to load config");
            std::process::exit(ExitCode::CONFIG);
        }
    };
    logging::init(cli.log_level.as_deref(), config.log_level.as_deref());

    if cli.check_config {
        tracing::info!(
            path = %cli.config.display(),
            accounts = config.accounts.len(),
            "Config is valid"
        );
        std::process::exit(ExitCode::OK);
    }

    std::process::exit(run(config).await);
}

async fn run(config: AppConfig) -> i32 {
    tracing::info!(
        site = %config.site,
        accounts = config.accounts.len(),
        polling_period_ms = config.polling_period,
        "daemon started"
    );

    let extractor = match SiteMarkup::new() {
        Ok(markup) => Arc::new(markup),
        Err(e) => {
            tracing::error!(fatal = true, error = %e, "Failed to compile page patterns");
            return ExitCode::STARTUP;
        }
    };

    let args = SupervisorArgs {
        accounts: config.accounts(),
        settings: config.observer_settings(),
        transport: Arc::new(UreqTransport::new()),
        extractor,
    };
    let (supervisor, join) = match SupervisorHandle::start(args).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(fatal = true, error = %e, "Failed to start supervisor");
            return ExitCode::STARTUP;
        }
    };

    let code = match wait_for_exit(&supervisor).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(fatal = true, error = %e, "Failed to install signal handlers");
            ExitCode::STARTUP
        }
    };

    supervisor.destroy();
    if let Err(e) = join.await {
        tracing::warn!(error = %e, "Supervisor task did not shut down cleanly");
    }
    tracing::info!(code, "exiting");
    code
}

/// Blocks until a termination signal arrives or every observer is gone.
async fn wait_for_exit(supervisor: &SupervisorHandle) -> std::io::Result<i32> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let start = tokio::time::Instant::now() + WATCHDOG_PERIOD;
    let mut watchdog = tokio::time::interval_at(start, WATCHDOG_PERIOD);

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!(signal = "SIGINT", "Received shutdown signal");
                return Ok(ExitCode::OK);
            }
            _ = sigterm.recv() => {
                tracing::info!(signal = "SIGTERM", "Received shutdown signal");
                return Ok(ExitCode::OK);
            }
            _ = sighup.recv() => {
                tracing::info!(signal = "SIGHUP", "Received shutdown signal");
                return Ok(ExitCode::OK);
            }
            _ = watchdog.tick() => {
                let live = supervisor.live_workers().await;
                if tracing::enabled!(tracing::Level::DEBUG) {
                    for status in supervisor.status().await {
                        tracing::debug!(
                            account = %status.account,
                            state = ?status.state,
                            failures = status.failures,
                            "Observer status"
                        );
                    }
                }
                if live == 0 {
                    tracing::error!(fatal = true, "no active observers");
                    return Ok(ExitCode::NO_ACTIVE_OBSERVERS);
                }
            }
        }
    }
}
