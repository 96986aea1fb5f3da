//! Rank-inversion detection and transitive recommendations.
//!
//! An inversion is a pair whose live weights contradict the declared rank
//! order by more than the tie epsilon. Equal weights never count.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::matrix::ReciprocalMatrix;
use crate::scale::{saaty_weight, SaatyScale};
use crate::sequencer::RankAssignment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inversion {
    /// Declared more important, now weighted lower.
    pub overtaken: usize,
    pub overtaker: usize,
    pub weight_gap: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InversionReport {
    pub inversions: Vec<Inversion>,
    /// Every item taking part in at least one inversion.
    pub flagged: BTreeSet<usize>,
}

impl InversionReport {
    pub fn is_empty(&self) -> bool {
        self.inversions.is_empty()
    }

    pub fn is_flagged(&self, item: usize) -> bool {
        self.flagged.contains(&item)
    }
}

pub fn detect_inversions(weights: &[f64], ranks: &RankAssignment, epsilon: f64) -> InversionReport {
    let mut report = InversionReport::default();
    for i in 0..weights.len() {
        for j in 0..weights.len() {
            if i == j || !ranks.outranks(i, j) {
                continue;
            }
            if weights[i] < weights[j] - epsilon {
                report.inversions.push(Inversion {
                    overtaken: i,
                    overtaker: j,
                    weight_gap: weights[j] - weights[i],
                });
                report.flagged.insert(i);
                report.flagged.insert(j);
            }
        }
    }
    report
}

/// How the respondent settles a pending judgment that caused an inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionResolution {
    /// Drop the pending judgment and re-enter it from "equal".
    Revise,
    /// Keep it, re-derive ranks from live weights and re-orient unanswered pairs.
    Accept,
}

/// Suggested value for one pair, derived from two-hop comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub first: usize,
    pub second: usize,
    /// Items already compared with both `first` and `second`.
    pub intermediates: Vec<usize>,
    /// Geometric mean of `M[first][k] * M[k][second]`, if any path exists.
    pub indirect_ratio: Option<f64>,
    pub judgment: i32,
    pub weight: f64,
}

/// Recommend a value for `first` vs `second`.
///
/// The geometric mean of the indirect products is rounded to a whole
/// intensity step in favour of `first`; a missing path or a mean that
/// rounds below 1 falls back to "equal". That fallback can itself be
/// inconsistent with the other judgments.
pub fn recommend_value(
    matrix: &ReciprocalMatrix,
    first: usize,
    second: usize,
    scale: &SaatyScale,
) -> Recommendation {
    let intermediates: Vec<usize> = (0..matrix.n())
        .filter(|&k| k != first && k != second)
        .filter(|&k| matrix.is_judged(first, k) && matrix.is_judged(k, second))
        .collect();

    let indirect_ratio = if intermediates.is_empty() {
        None
    } else {
        let log_sum: f64 = intermediates
            .iter()
            .map(|&k| (matrix.get(first, k) * matrix.get(k, second)).ln())
            .sum();
        Some((log_sum / intermediates.len() as f64).exp())
    };

    let judgment = match indirect_ratio {
        Some(ratio) if ratio.round() >= 1.0 => {
            let steps = ratio.round().min(scale.max_ratio()) as i32 - 1;
            -steps
        }
        _ => 0,
    };

    Recommendation {
        first,
        second,
        intermediates,
        indirect_ratio,
        judgment,
        weight: saaty_weight(judgment),
    }
}

/// Advisory raised when a pending judgment pushes CR over the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyWarning {
    pub cr: f64,
    pub threshold: f64,
    pub recommendation: Recommendation,
}
