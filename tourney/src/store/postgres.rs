//! PostgreSQL store.
//!
//! All writes of a changeset run in one transaction. Updates carry
//! `WHERE id = $1 AND version = $n`; zero affected rows rolls the transaction
//! back and reports a version conflict. Foreign keys between matches are
//! deferred so a whole bracket can be inserted in any order.

use super::{
    Change, Changeset, IdKind, StoreError, StoreResult, TournamentStore, Versioned,
};
use crate::bracket::{Feed, Match, MatchId, Slot, SlotPosition};
use crate::db::timeouts::{DEFAULT_TRANSACTION_TIMEOUT, with_default_timeout};
use crate::lifecycle::{Dispute, DisputeId};
use crate::series::Series;
use crate::tournament::{Participant, Tournament, TournamentId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use std::sync::Arc;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Store on a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await
    }

    async fn commit_in_transaction(&self, changes: Changeset) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for change in changes.tournaments {
            write(&mut tx, change, TOURNAMENT_SQL, bind_tournament).await?;
        }
        for change in changes.participants {
            write(&mut tx, change, PARTICIPANT_SQL, bind_participant).await?;
        }
        for change in changes.matches {
            write(&mut tx, change, MATCH_SQL, bind_match).await?;
        }
        for change in changes.series {
            write(&mut tx, change, SERIES_SQL, bind_series).await?;
        }
        for change in changes.disputes {
            write(&mut tx, change, DISPUTE_SQL, bind_dispute).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Statements of one table. Insert and update bind the record in the same
/// order: id first, version last. Delete binds only id and version.
struct TableSql {
    insert: &'static str,
    update: &'static str,
    delete: &'static str,
}

async fn write<T: Versioned>(
    tx: &mut Transaction<'_, Postgres>,
    change: Change<T>,
    sql: TableSql,
    bind: for<'q> fn(PgQuery<'q>, &'q T) -> StoreResult<PgQuery<'q>>,
) -> StoreResult<()> {
    match change {
        Change::Insert(record) => {
            let query = bind(sqlx::query(sql.insert), &record)?;
            match query.execute(&mut **tx).await {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    Err(StoreError::Duplicate {
                        entity: T::ENTITY,
                        detail: e.message().to_string(),
                    })
                }
                Err(e) => Err(e.into()),
            }
        }
        Change::Update(record) => {
            let query = bind(sqlx::query(sql.update), &record)?;
            let result = query.execute(&mut **tx).await?;
            if result.rows_affected() == 0 {
                debug!(
                    "Version conflict on {} {} at version {}",
                    T::ENTITY,
                    record.id(),
                    record.version()
                );
                return Err(StoreError::VersionConflict {
                    entity: T::ENTITY,
                    id: record.id(),
                    expected: record.version(),
                });
            }
            Ok(())
        }
        Change::Delete(record) => {
            let result = sqlx::query(sql.delete)
                .bind(record.id())
                .bind(record.version())
                .execute(&mut **tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::VersionConflict {
                    entity: T::ENTITY,
                    id: record.id(),
                    expected: record.version(),
                });
            }
            Ok(())
        }
    }
}

const TOURNAMENT_SQL: TableSql = TableSql {
    insert: r#"
        INSERT INTO tournaments (
            id, name, format, total_slots, current_slots, status, current_round,
            entry_fee, prize_table, settings, created_at, started_at, completed_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    "#,
    update: r#"
        UPDATE tournaments SET
            name = $2, format = $3, total_slots = $4, current_slots = $5, status = $6,
            current_round = $7, entry_fee = $8, prize_table = $9, settings = $10,
            created_at = $11, started_at = $12, completed_at = $13, version = version + 1
        WHERE id = $1 AND version = $14
    "#,
    delete: "DELETE FROM tournaments WHERE id = $1 AND version = $2",
};

fn bind_tournament<'q>(query: PgQuery<'q>, t: &'q Tournament) -> StoreResult<PgQuery<'q>> {
    Ok(query
        .bind(t.id)
        .bind(&t.name)
        .bind(t.format.as_str())
        .bind(t.total_slots as i32)
        .bind(t.current_slots as i32)
        .bind(t.status.as_str())
        .bind(t.current_round as i32)
        .bind(t.entry_fee)
        .bind(serde_json::to_value(&t.prize_table)?)
        .bind(serde_json::to_value(&t.settings)?)
        .bind(t.created_at)
        .bind(t.started_at)
        .bind(t.completed_at)
        .bind(t.version))
}

const PARTICIPANT_SQL: TableSql = TableSql {
    insert: r#"
        INSERT INTO tournament_participants (
            id, tournament_id, user_id, gamer_tag, seed, checked_in, final_standing,
            payout_amount, payout_paid_at, refunded_at, joined_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    "#,
    update: r#"
        UPDATE tournament_participants SET
            tournament_id = $2, user_id = $3, gamer_tag = $4, seed = $5, checked_in = $6,
            final_standing = $7, payout_amount = $8, payout_paid_at = $9, refunded_at = $10,
            joined_at = $11, version = version + 1
        WHERE id = $1 AND version = $12
    "#,
    delete: "DELETE FROM tournament_participants WHERE id = $1 AND version = $2",
};

fn bind_participant<'q>(query: PgQuery<'q>, p: &'q Participant) -> StoreResult<PgQuery<'q>> {
    Ok(query
        .bind(p.id)
        .bind(p.tournament_id)
        .bind(p.user_id)
        .bind(&p.gamer_tag)
        .bind(p.seed.map(|s| s as i32))
        .bind(p.checked_in)
        .bind(p.final_standing.map(|s| s as i32))
        .bind(p.payout_amount)
        .bind(p.payout_paid_at)
        .bind(p.refunded_at)
        .bind(p.joined_at)
        .bind(p.version))
}

const MATCH_SQL: TableSql = TableSql {
    insert: r#"
        INSERT INTO matches (
            id, tournament_id, round_number, bracket_type, bracket_position,
            participant1_id, participant1_void, participant2_id, participant2_void,
            participant1_score, participant2_score, status, winner_id, reported_by_user_id,
            confirmed_by_user_id, reported_at, confirmed_at, auto_confirm_at, warn_at,
            warning_sent_at, auto_verified, evidence_url, next_match_id, next_match_slot,
            loser_next_match_id, loser_next_match_slot, best_of, series_id, game_number,
            ready_at, deadline_at, live_at, resolution, resolved_at, resolved_by,
            advanced_at, created_at, version
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
            $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34,
            $35, $36, $37, $38
        )
    "#,
    update: r#"
        UPDATE matches SET
            tournament_id = $2, round_number = $3, bracket_type = $4, bracket_position = $5,
            participant1_id = $6, participant1_void = $7, participant2_id = $8,
            participant2_void = $9, participant1_score = $10, participant2_score = $11,
            status = $12, winner_id = $13, reported_by_user_id = $14,
            confirmed_by_user_id = $15, reported_at = $16, confirmed_at = $17,
            auto_confirm_at = $18, warn_at = $19, warning_sent_at = $20, auto_verified = $21,
            evidence_url = $22, next_match_id = $23, next_match_slot = $24,
            loser_next_match_id = $25, loser_next_match_slot = $26, best_of = $27,
            series_id = $28, game_number = $29, ready_at = $30, deadline_at = $31,
            live_at = $32, resolution = $33, resolved_at = $34, resolved_by = $35,
            advanced_at = $36, created_at = $37, version = version + 1
        WHERE id = $1 AND version = $38
    "#,
    delete: "DELETE FROM matches WHERE id = $1 AND version = $2",
};

fn bind_match<'q>(query: PgQuery<'q>, m: &'q Match) -> StoreResult<PgQuery<'q>> {
    Ok(query
        .bind(m.id)
        .bind(m.tournament_id)
        .bind(m.round_number as i32)
        .bind(m.bracket_type.as_str())
        .bind(m.bracket_position as i32)
        .bind(m.participant1.participant())
        .bind(m.participant1 == Slot::Void)
        .bind(m.participant2.participant())
        .bind(m.participant2 == Slot::Void)
        .bind(m.participant1_score)
        .bind(m.participant2_score)
        .bind(m.status.as_str())
        .bind(m.winner_id)
        .bind(m.reported_by_user_id)
        .bind(m.confirmed_by_user_id)
        .bind(m.reported_at)
        .bind(m.confirmed_at)
        .bind(m.auto_confirm_at)
        .bind(m.warn_at)
        .bind(m.warning_sent_at)
        .bind(m.auto_verified)
        .bind(&m.evidence_url)
        .bind(m.next_match.map(|f| f.match_id))
        .bind(m.next_match.map(|f| f.slot.number()))
        .bind(m.loser_next_match.map(|f| f.match_id))
        .bind(m.loser_next_match.map(|f| f.slot.number()))
        .bind(m.best_of as i32)
        .bind(m.series_id)
        .bind(m.game_number.map(|g| g as i32))
        .bind(m.ready_at)
        .bind(m.deadline_at)
        .bind(m.live_at)
        .bind(m.resolution.map(|r| r.as_str()))
        .bind(m.resolved_at)
        .bind(m.resolved_by)
        .bind(m.advanced_at)
        .bind(m.created_at)
        .bind(m.version))
}

const SERIES_SQL: TableSql = TableSql {
    insert: r#"
        INSERT INTO match_series (
            id, tournament_id, anchor_match_id, participant1_id, participant2_id, best_of,
            participant1_wins, participant2_wins, status, winner_id, created_at,
            completed_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    "#,
    update: r#"
        UPDATE match_series SET
            tournament_id = $2, anchor_match_id = $3, participant1_id = $4,
            participant2_id = $5, best_of = $6, participant1_wins = $7,
            participant2_wins = $8, status = $9, winner_id = $10, created_at = $11,
            completed_at = $12, version = version + 1
        WHERE id = $1 AND version = $13
    "#,
    delete: "DELETE FROM match_series WHERE id = $1 AND version = $2",
};

fn bind_series<'q>(query: PgQuery<'q>, s: &'q Series) -> StoreResult<PgQuery<'q>> {
    Ok(query
        .bind(s.id)
        .bind(s.tournament_id)
        .bind(s.anchor_match_id)
        .bind(s.participant1_id)
        .bind(s.participant2_id)
        .bind(s.best_of as i32)
        .bind(s.participant1_wins as i32)
        .bind(s.participant2_wins as i32)
        .bind(s.status.as_str())
        .bind(s.winner_id)
        .bind(s.created_at)
        .bind(s.completed_at)
        .bind(s.version))
}

const DISPUTE_SQL: TableSql = TableSql {
    insert: r#"
        INSERT INTO match_disputes (
            id, tournament_id, match_id, raised_by, reason, evidence_url, status,
            resolution_details, resolved_by, created_at, closed_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    "#,
    update: r#"
        UPDATE match_disputes SET
            tournament_id = $2, match_id = $3, raised_by = $4, reason = $5,
            evidence_url = $6, status = $7, resolution_details = $8, resolved_by = $9,
            created_at = $10, closed_at = $11, version = version + 1
        WHERE id = $1 AND version = $12
    "#,
    delete: "DELETE FROM match_disputes WHERE id = $1 AND version = $2",
};

fn bind_dispute<'q>(query: PgQuery<'q>, d: &'q Dispute) -> StoreResult<PgQuery<'q>> {
    Ok(query
        .bind(d.id)
        .bind(d.tournament_id)
        .bind(d.match_id)
        .bind(d.raised_by)
        .bind(&d.reason)
        .bind(&d.evidence_url)
        .bind(d.status.as_str())
        .bind(&d.resolution_details)
        .bind(d.resolved_by)
        .bind(d.created_at)
        .bind(d.closed_at)
        .bind(d.version))
}

fn corrupt(table: &'static str, detail: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table,
        detail: detail.into(),
    }
}

fn get_u32(row: &PgRow, table: &'static str, column: &str) -> StoreResult<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| corrupt(table, format!("{column} is negative: {value}")))
}

fn get_opt_u32(row: &PgRow, table: &'static str, column: &str) -> StoreResult<Option<u32>> {
    let value: Option<i32> = row.try_get(column)?;
    value
        .map(|v| u32::try_from(v).map_err(|_| corrupt(table, format!("{column} is negative: {v}"))))
        .transpose()
}

fn parse<T>(row: &PgRow, table: &'static str, column: &str) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    let value: String = row.try_get(column)?;
    value.parse().map_err(|e: String| corrupt(table, e))
}

fn get_slot(row: &PgRow, id_column: &str, void_column: &str) -> StoreResult<Slot> {
    let id: Option<i64> = row.try_get(id_column)?;
    let void: bool = row.try_get(void_column)?;
    Ok(match (id, void) {
        (Some(id), false) => Slot::Occupied(id),
        (None, true) => Slot::Void,
        (None, false) => Slot::Pending,
        (Some(id), true) => {
            return Err(corrupt(
                "matches",
                format!("{id_column} = {id} on a void slot"),
            ));
        }
    })
}

fn get_feed(row: &PgRow, id_column: &str, slot_column: &str) -> StoreResult<Option<Feed>> {
    let id: Option<i64> = row.try_get(id_column)?;
    let slot: Option<i16> = row.try_get(slot_column)?;
    match (id, slot) {
        (None, None) => Ok(None),
        (Some(match_id), Some(n)) => {
            let slot = SlotPosition::from_number(n)
                .ok_or_else(|| corrupt("matches", format!("{slot_column} = {n}")))?;
            Ok(Some(Feed { match_id, slot }))
        }
        _ => Err(corrupt(
            "matches",
            format!("{id_column} and {slot_column} must be set together"),
        )),
    }
}

fn tournament_from_row(row: &PgRow) -> StoreResult<Tournament> {
    const TABLE: &str = "tournaments";
    Ok(Tournament {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        format: parse(row, TABLE, "format")?,
        total_slots: get_u32(row, TABLE, "total_slots")?,
        current_slots: get_u32(row, TABLE, "current_slots")?,
        status: parse(row, TABLE, "status")?,
        current_round: get_u32(row, TABLE, "current_round")?,
        entry_fee: row.try_get("entry_fee")?,
        prize_table: serde_json::from_value(row.try_get("prize_table")?)?,
        settings: serde_json::from_value(row.try_get("settings")?)?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        version: row.try_get("version")?,
    })
}

fn participant_from_row(row: &PgRow) -> StoreResult<Participant> {
    const TABLE: &str = "tournament_participants";
    Ok(Participant {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        user_id: row.try_get("user_id")?,
        gamer_tag: row.try_get("gamer_tag")?,
        seed: get_opt_u32(row, TABLE, "seed")?,
        checked_in: row.try_get("checked_in")?,
        final_standing: get_opt_u32(row, TABLE, "final_standing")?,
        payout_amount: row.try_get("payout_amount")?,
        payout_paid_at: row.try_get("payout_paid_at")?,
        refunded_at: row.try_get("refunded_at")?,
        joined_at: row.try_get("joined_at")?,
        version: row.try_get("version")?,
    })
}

fn match_from_row(row: &PgRow) -> StoreResult<Match> {
    const TABLE: &str = "matches";
    let resolution: Option<String> = row.try_get("resolution")?;
    Ok(Match {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        round_number: get_u32(row, TABLE, "round_number")?,
        bracket_type: parse(row, TABLE, "bracket_type")?,
        bracket_position: get_u32(row, TABLE, "bracket_position")?,
        participant1: get_slot(row, "participant1_id", "participant1_void")?,
        participant2: get_slot(row, "participant2_id", "participant2_void")?,
        participant1_score: row.try_get("participant1_score")?,
        participant2_score: row.try_get("participant2_score")?,
        status: parse(row, TABLE, "status")?,
        winner_id: row.try_get("winner_id")?,
        reported_by_user_id: row.try_get("reported_by_user_id")?,
        confirmed_by_user_id: row.try_get("confirmed_by_user_id")?,
        reported_at: row.try_get("reported_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        auto_confirm_at: row.try_get("auto_confirm_at")?,
        warn_at: row.try_get("warn_at")?,
        warning_sent_at: row.try_get("warning_sent_at")?,
        auto_verified: row.try_get("auto_verified")?,
        evidence_url: row.try_get("evidence_url")?,
        next_match: get_feed(row, "next_match_id", "next_match_slot")?,
        loser_next_match: get_feed(row, "loser_next_match_id", "loser_next_match_slot")?,
        best_of: get_u32(row, TABLE, "best_of")?,
        series_id: row.try_get("series_id")?,
        game_number: get_opt_u32(row, TABLE, "game_number")?,
        ready_at: row.try_get("ready_at")?,
        deadline_at: row.try_get("deadline_at")?,
        live_at: row.try_get("live_at")?,
        resolution: resolution
            .map(|r| r.parse().map_err(|e: String| corrupt(TABLE, e)))
            .transpose()?,
        resolved_at: row.try_get("resolved_at")?,
        resolved_by: row.try_get("resolved_by")?,
        advanced_at: row.try_get("advanced_at")?,
        created_at: row.try_get("created_at")?,
        version: row.try_get("version")?,
    })
}

fn series_from_row(row: &PgRow) -> StoreResult<Series> {
    const TABLE: &str = "match_series";
    Ok(Series {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        anchor_match_id: row.try_get("anchor_match_id")?,
        participant1_id: row.try_get("participant1_id")?,
        participant2_id: row.try_get("participant2_id")?,
        best_of: get_u32(row, TABLE, "best_of")?,
        participant1_wins: get_u32(row, TABLE, "participant1_wins")?,
        participant2_wins: get_u32(row, TABLE, "participant2_wins")?,
        status: parse(row, TABLE, "status")?,
        winner_id: row.try_get("winner_id")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        version: row.try_get("version")?,
    })
}

fn dispute_from_row(row: &PgRow) -> StoreResult<Dispute> {
    Ok(Dispute {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        match_id: row.try_get("match_id")?,
        raised_by: row.try_get("raised_by")?,
        reason: row.try_get("reason")?,
        evidence_url: row.try_get("evidence_url")?,
        status: parse(row, "match_disputes", "status")?,
        resolution_details: row.try_get("resolution_details")?,
        resolved_by: row.try_get("resolved_by")?,
        created_at: row.try_get("created_at")?,
        closed_at: row.try_get("closed_at")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl TournamentStore for PgStore {
    async fn reserve_ids(&self, kind: IdKind, count: usize) -> StoreResult<Vec<i64>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT nextval(pg_get_serial_sequence($1, 'id')) AS id FROM generate_series(1, $2)",
            )
            .bind(kind.table())
            .bind(count as i64)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(StoreError::from))
            .collect()
    }

    async fn get_tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        let row = with_default_timeout(
            sqlx::query("SELECT * FROM tournaments WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.as_ref().map(tournament_from_row).transpose()
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<Participant>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT * FROM tournament_participants WHERE tournament_id = $1 ORDER BY id",
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(participant_from_row).collect()
    }

    async fn find_participant(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> StoreResult<Option<Participant>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT * FROM tournament_participants WHERE tournament_id = $1 AND user_id = $2",
            )
            .bind(tournament_id)
            .bind(user_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.as_ref().map(participant_from_row).transpose()
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        let row = with_default_timeout(
            sqlx::query("SELECT * FROM matches WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn list_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>> {
        let rows = with_default_timeout(
            sqlx::query("SELECT * FROM matches WHERE tournament_id = $1 ORDER BY id")
                .bind(tournament_id)
                .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn list_series(&self, tournament_id: TournamentId) -> StoreResult<Vec<Series>> {
        let rows = with_default_timeout(
            sqlx::query("SELECT * FROM match_series WHERE tournament_id = $1 ORDER BY id")
                .bind(tournament_id)
                .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(series_from_row).collect()
    }

    async fn get_dispute(&self, id: DisputeId) -> StoreResult<Option<Dispute>> {
        let row = with_default_timeout(
            sqlx::query("SELECT * FROM match_disputes WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn list_disputes(&self, tournament_id: TournamentId) -> StoreResult<Vec<Dispute>> {
        let rows = with_default_timeout(
            sqlx::query("SELECT * FROM match_disputes WHERE tournament_id = $1 ORDER BY id")
                .bind(tournament_id)
                .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(dispute_from_row).collect()
    }

    async fn list_due_matches(&self, now: DateTime<Utc>) -> StoreResult<Vec<Match>> {
        let sql = r#"
            SELECT * FROM matches
            WHERE (
                status = 'awaiting_confirmation'
                AND (auto_confirm_at <= $1 OR (warning_sent_at IS NULL AND warn_at <= $1))
            ) OR (
                status IN ('scheduled', 'live')
                AND deadline_at <= $1
                AND participant1_id IS NOT NULL
                AND participant2_id IS NOT NULL
                AND (best_of = 1 OR game_number IS NOT NULL)
            )
            ORDER BY id
        "#;
        let rows = with_default_timeout(sqlx::query(sql).bind(now).fetch_all(self.pool.as_ref()))
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn list_pending_disbursements(&self) -> StoreResult<Vec<TournamentId>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT DISTINCT t.id
                FROM tournaments t
                JOIN tournament_participants p ON p.tournament_id = t.id
                WHERE (
                    t.status = 'completed'
                    AND p.payout_amount > 0
                    AND p.payout_paid_at IS NULL
                ) OR (
                    t.status = 'cancelled'
                    AND t.entry_fee > 0
                    AND p.refunded_at IS NULL
                )
                ORDER BY t.id
                "#,
            )
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(StoreError::from))
            .collect()
    }

    async fn commit(&self, changes: Changeset) -> StoreResult<()> {
        let size = changes.len();
        match tokio::time::timeout(
            DEFAULT_TRANSACTION_TIMEOUT,
            self.commit_in_transaction(changes),
        )
        .await
        {
            Ok(result) => {
                if result.is_ok() {
                    debug!("Committed changeset of {size} records");
                }
                result
            }
            Err(_) => Err(StoreError::Timeout(DEFAULT_TRANSACTION_TIMEOUT)),
        }
    }
}
