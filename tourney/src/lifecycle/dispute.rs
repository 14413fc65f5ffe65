//! Dispute records.

use crate::bracket::MatchId;
use crate::errors::{EngineError, EngineResult};
use crate::tournament::{TournamentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dispute ID type
pub type DisputeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(DisputeStatus::Open),
            "under_review" => Ok(DisputeStatus::UnderReview),
            "resolved" => Ok(DisputeStatus::Resolved),
            other => Err(format!("unknown dispute status '{other}'")),
        }
    }
}

/// A contested match result awaiting an admin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub tournament_id: TournamentId,
    pub match_id: MatchId,
    pub raised_by: UserId,
    pub reason: String,
    pub evidence_url: Option<String>,
    pub status: DisputeStatus,
    pub resolution_details: Option<String>,
    pub resolved_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Dispute {
    pub fn open(
        id: DisputeId,
        tournament_id: TournamentId,
        match_id: MatchId,
        raised_by: UserId,
        reason: impl Into<String>,
        evidence_url: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(EngineError::Validation(
                "a dispute needs a reason".to_string(),
            ));
        }

        Ok(Self {
            id,
            tournament_id,
            match_id,
            raised_by,
            reason,
            evidence_url,
            status: DisputeStatus::Open,
            resolution_details: None,
            resolved_by: None,
            created_at: now,
            closed_at: None,
            version: 0,
        })
    }

    pub fn is_unresolved(&self) -> bool {
        self.status != DisputeStatus::Resolved
    }

    /// An admin picked the dispute up
    pub fn begin_review(&mut self) -> EngineResult<()> {
        match self.status {
            DisputeStatus::Open => {
                self.status = DisputeStatus::UnderReview;
                Ok(())
            }
            status => Err(EngineError::stale(
                "dispute",
                self.id,
                format!("cannot review a dispute that is {status}"),
            )),
        }
    }

    pub fn resolve(
        &mut self,
        admin: UserId,
        details: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if !self.is_unresolved() {
            return Err(EngineError::stale("dispute", self.id, "already resolved"));
        }

        self.status = DisputeStatus::Resolved;
        self.resolved_by = Some(admin);
        self.resolution_details = details;
        self.closed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispute() -> Dispute {
        Dispute::open(1, 1, 7, 42, "score was 2-1, not 1-2", None, Utc::now()).unwrap()
    }

    #[test]
    fn test_reason_required() {
        let err = Dispute::open(1, 1, 7, 42, "  ", None, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_review_then_resolve() {
        let mut d = dispute();
        d.begin_review().unwrap();
        assert_eq!(d.status, DisputeStatus::UnderReview);
        assert!(d.begin_review().unwrap_err().is_stale());

        d.resolve(9, Some("replay checked".to_string()), Utc::now())
            .unwrap();
        assert!(!d.is_unresolved());
        assert_eq!(d.resolved_by, Some(9));
        assert!(d.resolve(9, None, Utc::now()).unwrap_err().is_stale());
    }

    #[test]
    fn test_resolve_straight_from_open() {
        let mut d = dispute();
        d.resolve(9, None, Utc::now()).unwrap();
        assert_eq!(d.status, DisputeStatus::Resolved);
    }
}
