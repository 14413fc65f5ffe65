//! Timeout sweep worker.
//!
//! Connects to PostgreSQL and drives auto-confirmations, warnings, deadline
//! expiry and pending payouts for every live tournament.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Error};
use pico_args::Arguments;
use tokio::time::{MissedTickBehavior, interval};
use tourney::db::Database;
use tourney::{PgOutbox, PgStore, TimeoutScheduler, TournamentEngine};
use tourney_worker::config::{CliOverrides, WorkerConfig};
use tourney_worker::{logging, metrics};
use tracing::{error, info, warn};

const HELP: &str = "\
Run the tournament timeout sweep

USAGE:
  tourney_worker [OPTIONS]

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --interval   SECONDS     Seconds between sweeps      [default: env DEADLINE_SCAN_INTERVAL_SECONDS or 60]
  --metrics    IP:PORT     Prometheus listener address [default: env METRICS_BIND, disabled if unset]

FLAGS:
  --once                   Run a single sweep and exit
  --migrate                Apply database migrations before sweeping
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL                   PostgreSQL connection string
  AUTO_CONFIRM_GRACE_MINUTES     Time an opponent has to confirm a report
  SCHEDULED_NO_SHOW_HOURS        Time a ready match may sit unreported
  MATCH_EXPIRY_POLICY            forfeit_absent, double_forfeit or hold_for_admin
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        database_url: pargs.opt_value_from_str("--db-url")?,
        interval_secs: pargs.opt_value_from_str("--interval")?,
        metrics_addr: pargs.opt_value_from_str("--metrics")?,
        once: pargs.contains("--once"),
        migrate: pargs.contains("--migrate"),
    };

    let leftover = pargs.finish();
    if !leftover.is_empty() {
        anyhow::bail!("Unexpected arguments: {leftover:?}");
    }

    logging::init();
    let config = WorkerConfig::from_env(overrides)?;

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        info!("Metrics exported at http://{addr}/metrics");
    }

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    db.health_check().await.context("Database health check failed")?;
    info!("Database connected successfully");

    let pool = db.shared_pool();
    let store = PgStore::new(pool.clone());
    if config.migrate {
        store.migrate().await.context("Failed to apply migrations")?;
        info!("Migrations applied");
    }

    // The outbox records both ledger credits and notifications
    let outbox = Arc::new(PgOutbox::new(pool));
    let engine = TournamentEngine::new(
        Arc::new(store),
        outbox.clone(),
        outbox,
        config.engine.clone(),
    );
    let scheduler = engine.scheduler();

    if config.once {
        let report = sweep(&scheduler).await?;
        println!(
            "warned={} auto_confirmed={} expired={} stale={} failed={} disbursed={}",
            report.warned,
            report.auto_confirmed,
            report.expired,
            report.stale,
            report.failed,
            report.disbursed
        );
        db.close().await;
        return Ok(());
    }

    let mut ticker = interval(config.engine.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        "Worker started, sweeping every {:?}",
        config.engine.sweep_interval
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweep(&scheduler).await {
                    error!("Sweep aborted: {e}");
                }
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!("Failed to listen for shutdown signal: {e}");
                }
                break;
            }
        }
    }

    info!("Shutting down");
    db.close().await;
    Ok(())
}

/// One timed sweep, recorded in metrics
async fn sweep(scheduler: &TimeoutScheduler) -> Result<tourney::SweepReport, tourney::EngineError> {
    let started = Instant::now();
    match scheduler.sweep().await {
        Ok(report) => {
            metrics::record_sweep(&report, started.elapsed());
            Ok(report)
        }
        Err(e) => {
            metrics::sweep_aborted();
            Err(e)
        }
    }
}
