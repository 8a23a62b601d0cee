//! Number pool selection rules.
//!
//! A dedicated pool owns the fixed range `[1, capacity]` and hands out
//! numbers chosen uniformly at random from the unissued complement. A
//! custom (shared) pool is a monotonic counter: each draw appends the next
//! sequential block. Persistence of the draw happens in the allocation
//! transaction; this module only decides *which* numbers.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::TicketNumber;

/// Pool flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Numbers `[1, capacity]` belonging to one raffle.
    Dedicated,
    /// Shared, growing counter used by leftover raffles.
    Custom,
}

impl PoolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dedicated => "dedicated",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dedicated" => Ok(Self::Dedicated),
            "custom" => Ok(Self::Custom),
            other => Err(format!(
                "Unknown pool kind '{other}'. Must be one of: dedicated, custom"
            )),
        }
    }
}

/// Why a draw could not be served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),

    #[error("Pool exhausted: requested {requested}, remaining {remaining}")]
    PoolExhausted { requested: i32, remaining: i32 },

    #[error("Dedicated pool has no capacity configured")]
    MissingCapacity,
}

/// Snapshot of a pool taken at the start of an allocation attempt.
#[derive(Debug, Clone, Copy)]
pub struct PoolSnapshot<'a> {
    pub kind: PoolKind,
    pub capacity: Option<i32>,
    pub numbers_issued: i32,
    /// Issued numbers in ascending order. Only consulted for dedicated pools.
    pub issued: &'a [TicketNumber],
}

impl PoolSnapshot<'_> {
    /// Numbers still available, or `None` for unbounded custom pools.
    pub fn remaining(&self) -> Option<i32> {
        match self.kind {
            PoolKind::Dedicated => self
                .capacity
                .map(|cap| (cap - self.numbers_issued).max(0)),
            PoolKind::Custom => None,
        }
    }

    /// Choose `quantity` numbers to issue. The result is ascending and never
    /// contains an already-issued number.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        quantity: i32,
        rng: &mut R,
    ) -> Result<Vec<TicketNumber>, DrawError> {
        match self.kind {
            PoolKind::Dedicated => {
                let capacity = self.capacity.ok_or(DrawError::MissingCapacity)?;
                draw_dedicated(capacity, self.issued, quantity, rng)
            }
            PoolKind::Custom => draw_sequential(self.numbers_issued, quantity),
        }
    }
}

/// Pick `quantity` distinct numbers uniformly at random from
/// `[1, capacity] \ issued`.
///
/// `issued` must be sorted ascending without duplicates.
pub fn draw_dedicated<R: Rng + ?Sized>(
    capacity: i32,
    issued: &[TicketNumber],
    quantity: i32,
    rng: &mut R,
) -> Result<Vec<TicketNumber>, DrawError> {
    if quantity < 1 {
        return Err(DrawError::InvalidQuantity(quantity));
    }
    debug_assert!(issued.windows(2).all(|w| w[0] < w[1]));

    let remaining = (capacity - issued.len() as i32).max(0);
    if quantity > remaining {
        return Err(DrawError::PoolExhausted {
            requested: quantity,
            remaining,
        });
    }

    // Ranks among the free numbers, then map each rank onto its value by
    // skipping over issued numbers. Both sequences are ascending, so a
    // single forward pass suffices.
    let mut ranks = rand::seq::index::sample(rng, remaining as usize, quantity as usize).into_vec();
    ranks.sort_unstable();

    let mut numbers = Vec::with_capacity(ranks.len());
    let mut skipped = 0usize;
    for rank in ranks {
        let mut candidate = rank as TicketNumber + 1 + skipped as TicketNumber;
        while skipped < issued.len() && issued[skipped] <= candidate {
            skipped += 1;
            candidate += 1;
        }
        numbers.push(candidate);
    }
    Ok(numbers)
}

/// Append `quantity` sequential numbers after `numbers_issued`.
pub fn draw_sequential(
    numbers_issued: i32,
    quantity: i32,
) -> Result<Vec<TicketNumber>, DrawError> {
    if quantity < 1 {
        return Err(DrawError::InvalidQuantity(quantity));
    }
    let last = numbers_issued
        .checked_add(quantity)
        .ok_or(DrawError::PoolExhausted {
            requested: quantity,
            remaining: i32::MAX - numbers_issued,
        })?;
    Ok((numbers_issued + 1..=last).collect())
}

/// Validate an operator capacity change.
///
/// Dedicated pools are sized by their raffle and cannot be resized here.
/// Custom pool capacity is advisory but may never drop below what has
/// already been issued.
pub fn validate_resize(
    kind: PoolKind,
    numbers_issued: i32,
    new_capacity: i32,
) -> Result<(), String> {
    if kind == PoolKind::Dedicated {
        return Err("Dedicated pools are sized by their raffle and cannot be resized".into());
    }
    if new_capacity < 1 {
        return Err(format!("Capacity must be at least 1, got {new_capacity}"));
    }
    if new_capacity < numbers_issued {
        return Err(format!(
            "Capacity {new_capacity} is below the {numbers_issued} numbers already issued"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn dedicated_draw_returns_ascending_unique_numbers_in_range() {
        let numbers = draw_dedicated(100, &[], 10, &mut rng()).unwrap();
        assert_eq!(numbers.len(), 10);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
        assert!(numbers.iter().all(|n| (1..=100).contains(n)));
    }

    #[test]
    fn dedicated_draw_skips_issued_numbers() {
        let issued: Vec<i32> = (1..=95).collect();
        let numbers = draw_dedicated(100, &issued, 5, &mut rng()).unwrap();
        assert_eq!(numbers, vec![96, 97, 98, 99, 100]);
    }

    #[test]
    fn dedicated_draw_fills_holes_between_issued_numbers() {
        let issued = vec![1, 3, 5, 7, 9];
        let numbers = draw_dedicated(10, &issued, 5, &mut rng()).unwrap();
        assert_eq!(numbers, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn repeated_draws_never_overlap() {
        let mut rng = rng();
        let mut issued = BTreeSet::new();
        for _ in 0..10 {
            let snapshot: Vec<i32> = issued.iter().copied().collect();
            let numbers = draw_dedicated(50, &snapshot, 5, &mut rng).unwrap();
            for n in numbers {
                assert!(issued.insert(n), "number {n} issued twice");
            }
        }
        assert_eq!(issued.len(), 50);
        let full: Vec<i32> = issued.into_iter().collect();
        assert_eq!(
            draw_dedicated(50, &full, 1, &mut rng),
            Err(DrawError::PoolExhausted {
                requested: 1,
                remaining: 0
            })
        );
    }

    #[test]
    fn dedicated_draw_over_capacity_is_exhausted() {
        let issued: Vec<i32> = (1..=60).collect();
        let err = draw_dedicated(100, &issued, 60, &mut rng()).unwrap_err();
        assert_eq!(
            err,
            DrawError::PoolExhausted {
                requested: 60,
                remaining: 40
            }
        );
    }

    #[test]
    fn zero_quantity_rejected() {
        assert_eq!(
            draw_dedicated(10, &[], 0, &mut rng()),
            Err(DrawError::InvalidQuantity(0))
        );
        assert_eq!(draw_sequential(0, -1), Err(DrawError::InvalidQuantity(-1)));
    }

    #[test]
    fn sequential_draw_continues_after_counter() {
        assert_eq!(draw_sequential(0, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(draw_sequential(41, 2).unwrap(), vec![42, 43]);
    }

    #[test]
    fn sequential_draw_detects_counter_overflow() {
        let err = draw_sequential(i32::MAX - 1, 5).unwrap_err();
        assert!(matches!(err, DrawError::PoolExhausted { remaining: 1, .. }));
    }

    #[test]
    fn custom_snapshot_ignores_capacity() {
        let snapshot = PoolSnapshot {
            kind: PoolKind::Custom,
            capacity: Some(5),
            numbers_issued: 5,
            issued: &[],
        };
        assert_eq!(snapshot.remaining(), None);
        assert_eq!(snapshot.draw(2, &mut rng()).unwrap(), vec![6, 7]);
    }

    #[test]
    fn dedicated_snapshot_without_capacity_is_an_error() {
        let snapshot = PoolSnapshot {
            kind: PoolKind::Dedicated,
            capacity: None,
            numbers_issued: 0,
            issued: &[],
        };
        assert_eq!(snapshot.draw(1, &mut rng()), Err(DrawError::MissingCapacity));
    }

    #[test]
    fn resize_rules() {
        assert!(validate_resize(PoolKind::Custom, 10, 10).is_ok());
        assert!(validate_resize(PoolKind::Custom, 10, 500).is_ok());
        assert!(validate_resize(PoolKind::Custom, 10, 9).is_err());
        assert!(validate_resize(PoolKind::Custom, 0, 0).is_err());
        assert!(validate_resize(PoolKind::Dedicated, 0, 100).is_err());
    }

    #[test]
    fn pool_kind_parses() {
        assert_eq!("custom".parse::<PoolKind>(), Ok(PoolKind::Custom));
        assert!("shared".parse::<PoolKind>().is_err());
    }
}
