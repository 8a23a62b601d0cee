//! Prize rule evaluation.
//!
//! Rules are stored as JSON on the raffle and evaluated once per assignment.
//! Evaluation is a pure function of the rules, the assignment's ordered
//! numbers and a small amount of raffle history, so re-running it always
//! yields the same tags.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::TicketNumber;

/// Prize tier. Declaration order defines precedence: `Major > Minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeTier {
    Minor,
    Major,
}

impl PrizeTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

impl FromStr for PrizeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            other => Err(format!("Unknown prize tier '{other}'")),
        }
    }
}

/// A configured prize rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrizeRule {
    /// Every `n`-th number of an assignment (1-based position in the
    /// assignment's ordered numbers).
    EveryNth { n: i32, tier: PrizeTier },
    /// Specific pre-selected numbers.
    BlessedNumbers {
        numbers: Vec<TicketNumber>,
        tier: PrizeTier,
    },
    /// The first assignment in the raffle whose quantity reaches
    /// `min_quantity` wins on its first number.
    FirstPurchaseOver { min_quantity: i32, tier: PrizeTier },
}

/// Misconfigured rule set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrizeRuleError {
    #[error("Malformed prize rules: {0}")]
    Malformed(String),

    #[error("every_nth rule requires n >= 1, got {0}")]
    InvalidInterval(i32),

    #[error("blessed_numbers rule has no numbers")]
    EmptyBlessedNumbers,

    #[error("blessed_numbers rule contains non-positive number {0}")]
    InvalidBlessedNumber(TicketNumber),

    #[error("first_purchase_over rule requires min_quantity >= 1, got {0}")]
    InvalidThreshold(i32),
}

/// Raffle history the `first_purchase_over` rule depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggingContext {
    /// Largest quantity among assignments in the same raffle created before
    /// the one being tagged.
    pub largest_earlier_purchase: Option<i32>,
}

/// A number selected as prize-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrizeHit {
    pub number: TicketNumber,
    pub tier: PrizeTier,
}

/// Decode the raffle's `prize_rules` JSON column and validate it.
pub fn parse_rules(value: &serde_json::Value) -> Result<Vec<PrizeRule>, PrizeRuleError> {
    let rules: Vec<PrizeRule> = serde_json::from_value(value.clone())
        .map_err(|e| PrizeRuleError::Malformed(e.to_string()))?;
    validate_rules(&rules)?;
    Ok(rules)
}

pub fn validate_rules(rules: &[PrizeRule]) -> Result<(), PrizeRuleError> {
    for rule in rules {
        match rule {
            PrizeRule::EveryNth { n, .. } if *n < 1 => {
                return Err(PrizeRuleError::InvalidInterval(*n));
            }
            PrizeRule::BlessedNumbers { numbers, .. } => {
                if numbers.is_empty() {
                    return Err(PrizeRuleError::EmptyBlessedNumbers);
                }
                if let Some(bad) = numbers.iter().find(|n| **n < 1) {
                    return Err(PrizeRuleError::InvalidBlessedNumber(*bad));
                }
            }
            PrizeRule::FirstPurchaseOver { min_quantity, .. } if *min_quantity < 1 => {
                return Err(PrizeRuleError::InvalidThreshold(*min_quantity));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Evaluate `rules` against an assignment's ordered `numbers`.
///
/// Each number is tagged at most once; when several rules match, the
/// highest tier wins. Hits come back in ascending number order.
pub fn evaluate(
    rules: &[PrizeRule],
    numbers: &[TicketNumber],
    ctx: &TaggingContext,
) -> Result<Vec<PrizeHit>, PrizeRuleError> {
    validate_rules(rules)?;

    let mut hits: BTreeMap<TicketNumber, PrizeTier> = BTreeMap::new();
    let mut mark = |number: TicketNumber, tier: PrizeTier| {
        hits.entry(number)
            .and_modify(|existing| *existing = (*existing).max(tier))
            .or_insert(tier);
    };

    let quantity = numbers.len() as i32;
    for rule in rules {
        match rule {
            PrizeRule::EveryNth { n, tier } => {
                let step = *n as usize;
                for number in numbers.iter().skip(step - 1).step_by(step) {
                    mark(*number, *tier);
                }
            }
            PrizeRule::BlessedNumbers {
                numbers: blessed,
                tier,
            } => {
                for number in numbers.iter().filter(|n| blessed.contains(n)) {
                    mark(*number, *tier);
                }
            }
            PrizeRule::FirstPurchaseOver { min_quantity, tier } => {
                let earlier_qualified = ctx
                    .largest_earlier_purchase
                    .is_some_and(|q| q >= *min_quantity);
                if quantity >= *min_quantity && !earlier_qualified {
                    if let Some(first) = numbers.first() {
                        mark(*first, *tier);
                    }
                }
            }
        }
    }

    Ok(hits
        .into_iter()
        .map(|(number, tier)| PrizeHit { number, tier })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_fifth_minor() -> Vec<PrizeRule> {
        vec![PrizeRule::EveryNth {
            n: 5,
            tier: PrizeTier::Minor,
        }]
    }

    #[test]
    fn every_fifth_of_ten_numbers_yields_two_tags() {
        let numbers = vec![3, 8, 15, 22, 31, 40, 47, 58, 66, 91];
        let hits = evaluate(&every_fifth_minor(), &numbers, &TaggingContext::default()).unwrap();
        assert_eq!(
            hits,
            vec![
                PrizeHit {
                    number: 31,
                    tier: PrizeTier::Minor
                },
                PrizeHit {
                    number: 91,
                    tier: PrizeTier::Minor
                },
            ]
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let numbers: Vec<i32> = (1..=10).collect();
        let ctx = TaggingContext::default();
        let first = evaluate(&every_fifth_minor(), &numbers, &ctx).unwrap();
        let second = evaluate(&every_fifth_minor(), &numbers, &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fewer_numbers_than_interval_yields_nothing() {
        let hits = evaluate(&every_fifth_minor(), &[1, 2, 3], &TaggingContext::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn blessed_numbers_match_by_value() {
        let rules = vec![PrizeRule::BlessedNumbers {
            numbers: vec![7, 77],
            tier: PrizeTier::Major,
        }];
        let hits = evaluate(&rules, &[5, 7, 9], &TaggingContext::default()).unwrap();
        assert_eq!(
            hits,
            vec![PrizeHit {
                number: 7,
                tier: PrizeTier::Major
            }]
        );
    }

    #[test]
    fn overlapping_rules_keep_highest_tier_once() {
        let rules = vec![
            PrizeRule::EveryNth {
                n: 1,
                tier: PrizeTier::Minor,
            },
            PrizeRule::BlessedNumbers {
                numbers: vec![2],
                tier: PrizeTier::Major,
            },
        ];
        let hits = evaluate(&rules, &[1, 2], &TaggingContext::default()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].tier, PrizeTier::Major);
    }

    #[test]
    fn first_purchase_over_threshold_only_once() {
        let rules = vec![PrizeRule::FirstPurchaseOver {
            min_quantity: 5,
            tier: PrizeTier::Major,
        }];
        let numbers = [10, 11, 12, 13, 14];

        let fresh = evaluate(&rules, &numbers, &TaggingContext::default()).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].number, 10);

        let later = TaggingContext {
            largest_earlier_purchase: Some(6),
        };
        assert!(evaluate(&rules, &numbers, &later).unwrap().is_empty());

        let small_earlier = TaggingContext {
            largest_earlier_purchase: Some(2),
        };
        assert_eq!(evaluate(&rules, &numbers, &small_earlier).unwrap().len(), 1);
    }

    #[test]
    fn misconfigured_rules_are_reported() {
        let bad = vec![PrizeRule::EveryNth {
            n: 0,
            tier: PrizeTier::Minor,
        }];
        assert_eq!(
            evaluate(&bad, &[1], &TaggingContext::default()),
            Err(PrizeRuleError::InvalidInterval(0))
        );
        let empty = vec![PrizeRule::BlessedNumbers {
            numbers: vec![],
            tier: PrizeTier::Minor,
        }];
        assert_eq!(
            validate_rules(&empty),
            Err(PrizeRuleError::EmptyBlessedNumbers)
        );
    }

    #[test]
    fn rules_parse_from_json() {
        let json = serde_json::json!([
            { "kind": "every_nth", "n": 5, "tier": "minor" },
            { "kind": "blessed_numbers", "numbers": [1, 99], "tier": "major" },
            { "kind": "first_purchase_over", "min_quantity": 20, "tier": "major" }
        ]);
        let rules = parse_rules(&json).unwrap();
        assert_eq!(rules.len(), 3);
        assert!(matches!(
            parse_rules(&serde_json::json!([{ "kind": "lucky_dip" }])),
            Err(PrizeRuleError::Malformed(_))
        ));
    }

    #[test]
    fn tier_precedence() {
        assert!(PrizeTier::Major > PrizeTier::Minor);
        assert_eq!("major".parse::<PrizeTier>(), Ok(PrizeTier::Major));
    }
}
