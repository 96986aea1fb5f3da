//! Pair sequencing from a declared rank order.
//!
//! Items are sorted by ascending rank (most important first) and every
//! unordered pair is emitted once, lexicographically by sorted position,
//! with the higher-ranked item in the `first` slot.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Bijection from item index to rank position `1..=n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    ranks: Vec<usize>,
}

impl RankAssignment {
    /// `ranks[item]` is the 1-based rank of `item`; ties are rejected.
    pub fn new(ranks: Vec<usize>) -> Result<Self, ValidationError> {
        let n = ranks.len();
        let mut holder: Vec<Option<usize>> = vec![None; n];
        for (item, &rank) in ranks.iter().enumerate() {
            if rank == 0 || rank > n {
                return Err(ValidationError::RankOutOfRange { item, rank, n });
            }
            if let Some(first) = holder[rank - 1] {
                return Err(ValidationError::DuplicateRank {
                    rank,
                    first,
                    second: item,
                });
            }
            holder[rank - 1] = Some(item);
        }
        Ok(Self { ranks })
    }

    /// Rank items in their listed order.
    pub fn identity(n: usize) -> Self {
        Self {
            ranks: (1..=n).collect(),
        }
    }

    /// Re-derive a strict order from live weights.
    ///
    /// Items whose weights differ by less than `epsilon` keep their
    /// relative order from `previous`.
    pub fn from_weights(weights: &[f64], previous: &RankAssignment, epsilon: f64) -> Self {
        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by(|&a, &b| {
            weights[b]
                .total_cmp(&weights[a])
                .then_with(|| previous.rank_of(a).cmp(&previous.rank_of(b)))
        });

        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && (weights[order[end - 1]] - weights[order[end]]).abs() < epsilon {
                end += 1;
            }
            order[start..end].sort_by_key(|&item| previous.rank_of(item));
            start = end;
        }

        let mut ranks = vec![0; weights.len()];
        for (pos, &item) in order.iter().enumerate() {
            ranks[item] = pos + 1;
        }
        Self { ranks }
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn rank_of(&self, item: usize) -> usize {
        self.ranks.get(item).copied().unwrap_or(usize::MAX)
    }

    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// True when `a` was declared more important than `b`.
    pub fn outranks(&self, a: usize, b: usize) -> bool {
        self.rank_of(a) < self.rank_of(b)
    }

    /// Item indices sorted from most to least important.
    pub fn order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.ranks.len()).collect();
        order.sort_by_key(|&item| self.ranks[item]);
        order
    }
}

/// One comparison question. `first` is presented first and was ranked
/// at least as important as `second` when the slot was last assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonPair {
    pub index: usize,
    pub first: usize,
    pub second: usize,
    /// 0-based positions of `first` / `second` in rank-sorted order.
    pub first_position: usize,
    pub second_position: usize,
}

impl ComparisonPair {
    /// Unordered identity of the pair.
    pub fn key(&self) -> (usize, usize) {
        (self.first.min(self.second), self.first.max(self.second))
    }

    pub fn involves(&self, item: usize) -> bool {
        self.first == item || self.second == item
    }
}

pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

pub fn build_pairs(ranks: &RankAssignment) -> Vec<ComparisonPair> {
    let order = ranks.order();
    let mut pairs = Vec::with_capacity(pair_count(order.len()));
    for a in 0..order.len() {
        for b in (a + 1)..order.len() {
            pairs.push(ComparisonPair {
                index: pairs.len(),
                first: order[a],
                second: order[b],
                first_position: a,
                second_position: b,
            });
        }
    }
    pairs
}

/// Re-orient unanswered pairs so the currently higher-ranked item is shown first.
///
/// Answered pairs are returned untouched; list order never changes.
pub fn resequence(
    pairs: &[ComparisonPair],
    answered: &[bool],
    ranks: &RankAssignment,
) -> Vec<ComparisonPair> {
    pairs
        .iter()
        .enumerate()
        .map(|(idx, pair)| {
            if answered.get(idx).copied().unwrap_or(false) {
                return pair.clone();
            }
            let (first, second) = match ranks.rank_of(pair.first).cmp(&ranks.rank_of(pair.second)) {
                Ordering::Greater => (pair.second, pair.first),
                _ => (pair.first, pair.second),
            };
            ComparisonPair {
                index: pair.index,
                first,
                second,
                first_position: ranks.rank_of(first) - 1,
                second_position: ranks.rank_of(second) - 1,
            }
        })
        .collect()
}
