//! Prize and refund disbursement.
//!
//! Money moves after the commit that decided it. Every credit carries a
//! deterministic idempotency key, and a participant is marked paid (or
//! refunded) only once the ledger accepted the credit or reported it as
//! already applied. Anything left over is picked up by the next sweep.

use super::models::{ParticipantId, TournamentId, TournamentStatus, UserId};
use crate::engine::EngineContext;
use crate::errors::{EngineError, EngineResult};
use crate::ledger::{prize_key, refund_key};
use chrono::Utc;
use log::{debug, info, warn};

/// Credit what one tournament still owes. Returns the participants settled.
pub(crate) async fn disburse(ctx: &EngineContext, tournament_id: TournamentId) -> EngineResult<usize> {
    let tournament = ctx
        .store
        .get_tournament(tournament_id)
        .await?
        .ok_or_else(|| EngineError::not_found("tournament", tournament_id))?;
    let participants = ctx.store.list_participants(tournament_id).await?;
    let status = tournament.status;

    let mut settled: Vec<ParticipantId> = Vec::new();
    match status {
        TournamentStatus::Completed => {
            for p in &participants {
                let Some(amount) = p.unpaid_payout() else {
                    continue;
                };
                let key = prize_key(tournament_id, p.id);
                if credit(ctx, p.user_id, amount, &key).await {
                    settled.push(p.id);
                }
            }
        }
        TournamentStatus::Cancelled if tournament.entry_fee > 0 => {
            for p in participants.iter().filter(|p| p.refunded_at.is_none()) {
                let key = refund_key(tournament_id, p.id);
                if credit(ctx, p.user_id, tournament.entry_fee, &key).await {
                    settled.push(p.id);
                }
            }
        }
        _ => return Ok(0),
    }

    if settled.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    ctx.apply(tournament_id, |session| {
        for id in &settled {
            let p = session.participant_mut(*id)?;
            match status {
                TournamentStatus::Completed => {
                    p.payout_paid_at.get_or_insert(now);
                }
                _ => {
                    p.refunded_at.get_or_insert(now);
                }
            }
        }
        Ok(())
    })
    .await?;

    info!(
        "Tournament {tournament_id}: {} {} credited",
        settled.len(),
        if status == TournamentStatus::Completed {
            "prizes"
        } else {
            "refunds"
        }
    );
    Ok(settled.len())
}

/// Retry disbursement for every tournament with money outstanding
pub(crate) async fn disburse_pending(ctx: &EngineContext) -> EngineResult<usize> {
    let pending = ctx.store.list_pending_disbursements().await?;
    let mut total = 0;

    for tournament_id in pending {
        match disburse(ctx, tournament_id).await {
            Ok(count) => total += count,
            Err(e) => warn!("Disbursement for tournament {tournament_id} failed: {e}"),
        }
    }

    Ok(total)
}

/// True when the credit is on the ledger, now or from an earlier attempt
async fn credit(ctx: &EngineContext, user_id: UserId, amount: i64, key: &str) -> bool {
    match ctx.ledger.credit(user_id, amount, key).await {
        Ok(()) => true,
        Err(e) if e.is_already_applied() => {
            debug!("Credit {key} was already applied");
            true
        }
        Err(e) => {
            warn!("Credit {key} of {amount} to user {user_id} failed, will retry: {e}");
            false
        }
    }
}
