//! Timeout sweep.
//!
//! Every tick the scheduler asks the store for matches with a timer that has
//! fired and drives each one through the same transitions an API caller
//! would use. Each match is its own unit of work; losing a race to a
//! concurrent report or admin action surfaces as a stale state error and is
//! counted, not treated as a failure. Outstanding prizes and refunds are
//! retried at the end of every sweep.

use crate::bracket::{Match, MatchStatus};
use crate::engine::EngineContext;
use crate::errors::EngineResult;
use crate::lifecycle::{MatchLifecycle, Transition};
use crate::tournament::payouts;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub warned: usize,
    pub auto_confirmed: usize,
    /// Deadlines handled, whether settled by policy or held for an admin
    pub expired: usize,
    /// Matches that moved on before the sweep reached them
    pub stale: usize,
    pub failed: usize,
    /// Participants paid or refunded
    pub disbursed: usize,
    /// Another sweep was still running
    pub skipped: bool,
}

impl SweepReport {
    pub fn transitions(&self) -> usize {
        self.warned + self.auto_confirmed + self.expired
    }
}

/// Drives auto-confirm, warnings and deadline expiry
#[derive(Clone)]
pub struct TimeoutScheduler {
    ctx: Arc<EngineContext>,
    matches: MatchLifecycle,
}

enum Due {
    AutoConfirm,
    Warn,
    Expire,
}

impl TimeoutScheduler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let matches = MatchLifecycle::new(ctx.clone());
        Self { ctx, matches }
    }

    /// Run one sweep now
    pub async fn sweep(&self) -> EngineResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as of `now`. Skips if a sweep is already in progress.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> EngineResult<SweepReport> {
        let Ok(_guard) = self.ctx.sweep_lock.try_lock() else {
            debug!("Previous sweep still running, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        };

        let mut report = SweepReport::default();
        let due = self.ctx.store.list_due_matches(now).await?;
        if !due.is_empty() {
            debug!("Sweep found {} due matches", due.len());
        }

        for m in &due {
            let Some(kind) = due_action(m, now) else {
                continue;
            };

            let result = match kind {
                Due::AutoConfirm => self.matches.auto_confirm(m.id, now).await,
                Due::Warn => self.matches.send_warning(m.id, now).await,
                Due::Expire => self.matches.expire(m.id, now).await,
            };

            match result {
                Ok(Transition::Warned) => report.warned += 1,
                Ok(_) => match kind {
                    Due::AutoConfirm => report.auto_confirmed += 1,
                    _ => report.expired += 1,
                },
                Err(e) if e.is_stale() => {
                    debug!("Match {} moved on before the sweep: {e}", m.id);
                    report.stale += 1;
                }
                Err(e) => {
                    error!("Sweep failed on match {}: {e}", m.id);
                    report.failed += 1;
                }
            }
        }

        match payouts::disburse_pending(&self.ctx).await {
            Ok(count) => report.disbursed = count,
            Err(e) => warn!("Pending disbursements not retried: {e}"),
        }

        if report.transitions() > 0 || report.failed > 0 {
            info!(
                "Sweep done: {} warned, {} auto-confirmed, {} expired, {} stale, {} failed",
                report.warned, report.auto_confirmed, report.expired, report.stale, report.failed
            );
        }
        Ok(report)
    }

    /// Sweep on `sweep_interval` until `shutdown` flips to true or its sender drops
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.ctx.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Timeout scheduler started, sweeping every {:?}",
            self.ctx.config.sweep_interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!("Sweep aborted: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Timeout scheduler stopped");
    }
}

/// Which timer fired. Auto-confirm wins over a warning that was never sent.
fn due_action(m: &Match, now: DateTime<Utc>) -> Option<Due> {
    match m.status {
        MatchStatus::AwaitingConfirmation => {
            if m.auto_confirm_at.is_some_and(|at| at <= now) {
                Some(Due::AutoConfirm)
            } else if m.warning_sent_at.is_none() && m.warn_at.is_some_and(|at| at <= now) {
                Some(Due::Warn)
            } else {
                None
            }
        }
        MatchStatus::Scheduled | MatchStatus::Live => m
            .deadline_at
            .is_some_and(|at| at <= now)
            .then_some(Due::Expire),
        _ => None,
    }
}
