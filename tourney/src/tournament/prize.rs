//! Prize pool distribution.

use super::models::{FULL_PERCENT_BPS, Payout, PrizeEntry, Standing};
use crate::errors::{EngineError, EngineResult};
use std::collections::HashSet;

/// Splits a prize pool according to a prize table
///
/// Each entry pays `pool * share`, rounded half-up to the minor unit. The
/// difference between the rounded total and the sum of the entries goes to
/// first place, so the payouts always add up to `round(pool * Σshare)` and
/// never exceed the pool.
pub struct PrizeCalculator;

impl PrizeCalculator {
    /// Check a prize table. `participants` bounds the positions once known.
    pub fn validate(table: &[PrizeEntry], participants: Option<u32>) -> EngineResult<()> {
        let mut positions = HashSet::new();
        let mut total: u64 = 0;

        for entry in table {
            if entry.position == 0 {
                return Err(EngineError::Validation(
                    "prize positions start at 1".to_string(),
                ));
            }
            if !positions.insert(entry.position) {
                return Err(EngineError::Validation(format!(
                    "position {} appears twice in the prize table",
                    entry.position
                )));
            }
            if entry.percentage_bps > FULL_PERCENT_BPS {
                return Err(EngineError::Validation(format!(
                    "position {} pays more than 100%",
                    entry.position
                )));
            }
            match participants {
                Some(count) if entry.position > count => {
                    return Err(EngineError::Validation(format!(
                        "position {} pays out but only {count} participants entered",
                        entry.position
                    )));
                }
                _ => {}
            }
            total += u64::from(entry.percentage_bps);
        }

        // The rounding residual is owed to first place
        if !table.is_empty() && !positions.contains(&1) {
            return Err(EngineError::Validation(
                "a prize table must pay position 1".to_string(),
            ));
        }

        if total > u64::from(FULL_PERCENT_BPS) {
            return Err(EngineError::Validation(format!(
                "prize table pays out {}.{:02}% of the pool",
                total / 100,
                total % 100
            )));
        }

        Ok(())
    }

    /// Amount each prize position receives, in position order
    pub fn amounts(pool: i64, table: &[PrizeEntry]) -> EngineResult<Vec<(u32, i64)>> {
        if pool < 0 {
            return Err(EngineError::Validation(format!(
                "prize pool cannot be negative, got {pool}"
            )));
        }
        Self::validate(table, None)?;

        let mut entries: Vec<PrizeEntry> = table.to_vec();
        entries.sort_by_key(|e| e.position);

        let mut amounts: Vec<(u32, i64)> = entries
            .iter()
            .map(|e| (e.position, share(pool, u64::from(e.percentage_bps))))
            .collect();

        let total_bps: u64 = entries.iter().map(|e| u64::from(e.percentage_bps)).sum();
        let expected = share(pool, total_bps);
        let mut residual = expected - amounts.iter().map(|(_, a)| a).sum::<i64>();

        // Residual lands on first place; a negative one never drives a payout below zero
        for (_, amount) in amounts.iter_mut() {
            if residual == 0 {
                break;
            }
            let adjusted = (*amount + residual).max(0);
            residual -= adjusted - *amount;
            *amount = adjusted;
        }

        Ok(amounts)
    }

    /// Payouts for final standings
    pub fn distribute(
        pool: i64,
        table: &[PrizeEntry],
        standings: &[Standing],
    ) -> EngineResult<Vec<Payout>> {
        Self::validate(table, Some(standings.len() as u32))?;

        let payouts = Self::amounts(pool, table)?
            .into_iter()
            .filter_map(|(position, amount)| {
                standings
                    .iter()
                    .find(|s| s.position == position)
                    .map(|s| Payout {
                        participant_id: s.participant_id,
                        position,
                        amount,
                    })
            })
            .collect();

        Ok(payouts)
    }
}

/// `pool * bps / 10_000`, rounded half-up
fn share(pool: i64, bps: u64) -> i64 {
    let scaled = i128::from(pool) * i128::from(bps);
    let rounded = (scaled + i128::from(FULL_PERCENT_BPS / 2)) / i128::from(FULL_PERCENT_BPS);
    rounded as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn standings(n: u32) -> Vec<Standing> {
        (1..=n)
            .map(|position| Standing {
                participant_id: i64::from(position) * 10,
                position,
                wins: 0,
                losses: 0,
            })
            .collect()
    }

    #[test]
    fn test_two_way_split() {
        let table = [PrizeEntry::percent(1, 70), PrizeEntry::percent(2, 30)];
        let amounts = PrizeCalculator::amounts(1000, &table).unwrap();
        assert_eq!(amounts, vec![(1, 700), (2, 300)]);

        let amounts = PrizeCalculator::amounts(40, &table).unwrap();
        assert_eq!(amounts, vec![(1, 28), (2, 12)]);
    }

    #[test]
    fn test_three_way_split() {
        let table = [
            PrizeEntry::percent(1, 50),
            PrizeEntry::percent(2, 30),
            PrizeEntry::percent(3, 20),
        ];
        let amounts = PrizeCalculator::amounts(1000, &table).unwrap();
        assert_eq!(amounts, vec![(1, 500), (2, 300), (3, 200)]);
    }

    #[test]
    fn test_residual_goes_to_first_place() {
        // 3 equal thirds of 100: 33.33 each rounds to 33, total 99.99 rounds to 100
        let table = [
            PrizeEntry::basis_points(1, 3333),
            PrizeEntry::basis_points(2, 3333),
            PrizeEntry::basis_points(3, 3333),
        ];
        let amounts = PrizeCalculator::amounts(100, &table).unwrap();
        assert_eq!(amounts, vec![(1, 34), (2, 33), (3, 33)]);
    }

    #[test]
    fn test_negative_residual_does_not_go_below_zero() {
        // Two halves of 1 each round up to 1, but only 1 is owed in total
        let table = [
            PrizeEntry::percent(1, 0),
            PrizeEntry::percent(2, 50),
            PrizeEntry::percent(3, 50),
        ];
        let amounts = PrizeCalculator::amounts(1, &table).unwrap();
        assert_eq!(amounts, vec![(1, 0), (2, 0), (3, 1)]);
    }

    #[test]
    fn test_validation() {
        assert!(PrizeCalculator::validate(&[PrizeEntry::percent(0, 10)], None).is_err());
        assert!(
            PrizeCalculator::validate(
                &[PrizeEntry::percent(1, 10), PrizeEntry::percent(1, 10)],
                None
            )
            .is_err()
        );
        assert!(
            PrizeCalculator::validate(
                &[PrizeEntry::percent(1, 60), PrizeEntry::percent(2, 50)],
                None
            )
            .is_err()
        );
        assert!(PrizeCalculator::validate(&[PrizeEntry::percent(1, 101)], None).is_err());
        assert!(PrizeCalculator::validate(&[PrizeEntry::percent(3, 10)], Some(2)).is_err());
        assert!(PrizeCalculator::validate(&[], Some(2)).is_ok());
    }

    #[test]
    fn test_table_without_first_place_rejected() {
        let table = [
            PrizeEntry::basis_points(2, 3333),
            PrizeEntry::basis_points(3, 3333),
        ];
        assert!(matches!(
            PrizeCalculator::validate(&table, None),
            Err(EngineError::Validation(_))
        ));
        assert!(PrizeCalculator::amounts(100, &table).is_err());
    }

    #[test]
    fn test_distribute_follows_standings() {
        let table = [PrizeEntry::percent(1, 70), PrizeEntry::percent(2, 30)];
        let payouts = PrizeCalculator::distribute(40, &table, &standings(4)).unwrap();
        assert_eq!(
            payouts,
            vec![
                Payout {
                    participant_id: 10,
                    position: 1,
                    amount: 28
                },
                Payout {
                    participant_id: 20,
                    position: 2,
                    amount: 12
                },
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_payouts_never_exceed_pool(
            pool in 0i64..10_000_000,
            shares in prop::collection::vec(0u32..=2_500, 1..=4),
        ) {
            let table: Vec<PrizeEntry> = shares
                .iter()
                .enumerate()
                .map(|(i, bps)| PrizeEntry::basis_points(i as u32 + 1, *bps))
                .collect();

            let amounts = PrizeCalculator::amounts(pool, &table).unwrap();
            let total: i64 = amounts.iter().map(|(_, a)| a).sum();
            prop_assert!(total <= pool);
            prop_assert!(amounts.iter().all(|(_, a)| *a >= 0));
        }
    }
}
