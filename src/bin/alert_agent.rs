use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use baozi_claim_alert::api::BaoziClient;
use baozi_claim_alert::config::{AppConfig, CONFIG_PATH};
use baozi_claim_alert::engine::AlertEngine;
use baozi_claim_alert::notify::{self, DispatchSummary, Notifier};
use baozi_claim_alert::reporter;

#[derive(Parser)]
#[command(name = "alert-agent", about = "Baozi wallet claim & alert agent")]
struct Args {
    /// TOML config file. Without it, `config.toml` is used if present,
    /// otherwise the environment (and `.env`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single check cycle and exit
    #[arg(long)]
    once: bool,

    /// Print alerts as JSON lines instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Write the resolved config to this path and exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    if let Some(path) = &args.config {
        let config = AppConfig::load(path)?;
        info!("Loaded config from {}", path.display());
        return Ok(config);
    }

    let default_path = Path::new(CONFIG_PATH);
    if default_path.exists() {
        let config = AppConfig::load(default_path)?;
        info!("Loaded config from {}", default_path.display());
        return Ok(config);
    }

    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }
    AppConfig::from_env().context("no config.toml found and environment config is incomplete")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(path) = &args.save_config {
        config.save(path)?;
        info!("Wrote config to {}", path.display());
        return Ok(());
    }

    let http = reqwest::Client::builder()
        .timeout(config.settings.http_timeout())
        .build()
        .context("failed to build http client")?;
    let client = BaoziClient::with_http(http.clone(), &config.settings.api_url);
    let notifier = notify::build_notifier(&config.channel, http)?;

    let mode = if args.dry_run { "dry-run" } else { "live" };
    info!(
        "Starting alert agent ({mode}) — wallets={} channel={} poll={}m",
        config.wallets.len(),
        notifier.channel(),
        config.settings.poll_interval_minutes,
    );
    info!(
        "Alerts: claimable={} closing_soon={} ({}h) odds_shift={} ({}%)",
        config.alerts.claimable,
        config.alerts.closing_soon,
        config.alerts.closing_soon_hours,
        config.alerts.odds_shift,
        config.alerts.odds_shift_threshold,
    );

    let mut engine = AlertEngine::new(client, config.wallets.clone(), config.alerts);
    let poll_duration = config.settings.poll_interval();

    run_cycle(&mut engine, notifier.as_ref(), args.dry_run).await;
    if args.once {
        return Ok(());
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(poll_duration) => {
                run_cycle(&mut engine, notifier.as_ref(), args.dry_run).await;
            }
        }
    }

    info!("Alert agent stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_cycle(engine: &mut AlertEngine<BaoziClient>, notifier: &dyn Notifier, dry_run: bool) {
    info!("Checking {} wallet(s)...", engine.wallets().len());
    let alerts = engine.check_wallets().await;
    if alerts.is_empty() {
        info!("No alerts to send");
        return;
    }

    let summary = if dry_run {
        for alert in &alerts {
            reporter::report_alert(alert);
        }
        DispatchSummary::default()
    } else {
        notify::dispatch_alerts(notifier, &alerts).await
    };

    if summary.failed > 0 {
        warn!("{} of {} alert(s) failed to send", summary.failed, alerts.len());
    }
    info!("Cycle complete: {} sent, {} alert(s)", summary.sent, alerts.len());
    if dry_run {
        reporter::report_cycle(engine.wallets().len(), alerts.len(), &summary);
    }
}
