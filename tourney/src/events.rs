//! Engine events and the notification port.
//!
//! Events are dispatched after the state change they describe has been
//! committed. A failed delivery is logged and dropped; it never rolls back or
//! blocks a transition.

use crate::bracket::MatchId;
use crate::lifecycle::DisputeId;
use crate::tournament::{ParticipantId, Payout, TournamentId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Something a notification collaborator may act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    #[serde(rename = "tournament.started")]
    TournamentStarted {
        tournament_id: TournamentId,
        match_count: usize,
    },

    #[serde(rename = "tournament.cancelled")]
    TournamentCancelled { tournament_id: TournamentId },

    #[serde(rename = "tournament.completed")]
    TournamentCompleted {
        tournament_id: TournamentId,
        champion_id: Option<ParticipantId>,
        payouts: Vec<Payout>,
    },

    /// The opponent should confirm or contest
    #[serde(rename = "match.awaiting_confirmation")]
    MatchAwaitingConfirmation {
        tournament_id: TournamentId,
        match_id: MatchId,
        reported_by: UserId,
        opponent_id: ParticipantId,
        auto_confirm_at: DateTime<Utc>,
    },

    #[serde(rename = "match.warning")]
    MatchWarning {
        tournament_id: TournamentId,
        match_id: MatchId,
        auto_confirm_at: DateTime<Utc>,
    },

    #[serde(rename = "match.disputed")]
    MatchDisputed {
        tournament_id: TournamentId,
        match_id: MatchId,
        dispute_id: DisputeId,
        raised_by: UserId,
    },

    #[serde(rename = "match.completed")]
    MatchCompleted {
        tournament_id: TournamentId,
        match_id: MatchId,
        winner_id: Option<ParticipantId>,
        auto_verified: bool,
    },

    #[serde(rename = "match.expired")]
    MatchExpired {
        tournament_id: TournamentId,
        match_id: MatchId,
    },

    #[serde(rename = "dispute.resolved")]
    DisputeResolved {
        tournament_id: TournamentId,
        match_id: MatchId,
        dispute_id: DisputeId,
        winner_id: ParticipantId,
    },
}

impl EngineEvent {
    /// Dotted event name, as serialized in `type`
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TournamentStarted { .. } => "tournament.started",
            EngineEvent::TournamentCancelled { .. } => "tournament.cancelled",
            EngineEvent::TournamentCompleted { .. } => "tournament.completed",
            EngineEvent::MatchAwaitingConfirmation { .. } => "match.awaiting_confirmation",
            EngineEvent::MatchWarning { .. } => "match.warning",
            EngineEvent::MatchDisputed { .. } => "match.disputed",
            EngineEvent::MatchCompleted { .. } => "match.completed",
            EngineEvent::MatchExpired { .. } => "match.expired",
            EngineEvent::DisputeResolved { .. } => "dispute.resolved",
        }
    }

    pub fn tournament_id(&self) -> TournamentId {
        match self {
            EngineEvent::TournamentStarted { tournament_id, .. }
            | EngineEvent::TournamentCancelled { tournament_id }
            | EngineEvent::TournamentCompleted { tournament_id, .. }
            | EngineEvent::MatchAwaitingConfirmation { tournament_id, .. }
            | EngineEvent::MatchWarning { tournament_id, .. }
            | EngineEvent::MatchDisputed { tournament_id, .. }
            | EngineEvent::MatchCompleted { tournament_id, .. }
            | EngineEvent::MatchExpired { tournament_id, .. }
            | EngineEvent::DisputeResolved { tournament_id, .. } => *tournament_id,
        }
    }

    /// Rewrite record ids that were provisional when the event was raised
    pub(crate) fn remap_ids(&mut self, resolve: impl Fn(i64) -> i64) {
        match self {
            EngineEvent::MatchAwaitingConfirmation { match_id, .. }
            | EngineEvent::MatchWarning { match_id, .. }
            | EngineEvent::MatchCompleted { match_id, .. }
            | EngineEvent::MatchExpired { match_id, .. } => *match_id = resolve(*match_id),
            EngineEvent::MatchDisputed {
                match_id,
                dispute_id,
                ..
            }
            | EngineEvent::DisputeResolved {
                match_id,
                dispute_id,
                ..
            } => {
                *match_id = resolve(*match_id);
                *dispute_id = resolve(*dispute_id);
            }
            EngineEvent::TournamentStarted { .. }
            | EngineEvent::TournamentCancelled { .. }
            | EngineEvent::TournamentCompleted { .. } => {}
        }
    }
}

/// Notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &EngineEvent) -> Result<(), NotifyError>;
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &EngineEvent) -> Result<(), NotifyError> {
        log::info!(
            "event {} for tournament {}: {:?}",
            event.name(),
            event.tournament_id(),
            event
        );
        Ok(())
    }
}

/// Forwards events to a channel without waiting for the receiver
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<EngineEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::Sender<EngineEvent>) -> Self {
        Self { sender }
    }

    /// Notifier plus the receiving end of a bounded channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: &EngineEvent) -> Result<(), NotifyError> {
        self.sender
            .try_send(event.clone())
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}
