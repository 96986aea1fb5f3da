//! Priority weights and consistency for one reciprocal matrix.
//!
//! Weights use the geometric-mean (row-product) method. The Consistency
//! Ratio uses the column-sum approximation of the principal eigenvalue and
//! Saaty's Random Index table.

use serde::{Deserialize, Serialize};

use crate::matrix::ReciprocalMatrix;

/// Random Index by matrix order, `RANDOM_INDEX[n - 1]`.
pub const RANDOM_INDEX: [f64; 10] = [0.0, 0.0, 0.58, 0.90, 1.12, 1.24, 1.32, 1.41, 1.45, 1.49];

/// Conventional acceptability threshold for the Consistency Ratio.
pub const CR_THRESHOLD: f64 = 0.1;

/// Weight differences below this are treated as ties.
pub const DEFAULT_TIE_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tolerance for weight equality in ranking and inversion checks.
    pub tie_epsilon: f64,
    /// A matrix is consistent when `CR <= cr_threshold`.
    pub cr_threshold: f64,
    /// Prior judgments in a group required before the CR advisory runs.
    pub min_judgments_for_cr_check: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tie_epsilon: DEFAULT_TIE_EPSILON,
            cr_threshold: CR_THRESHOLD,
            min_judgments_for_cr_check: 2,
        }
    }
}

pub fn random_index(n: usize) -> f64 {
    match n {
        0 => 0.0,
        n => RANDOM_INDEX[n.min(RANDOM_INDEX.len()) - 1],
    }
}

/// Normalized geometric-mean weights. Non-negative and summing to 1 for n >= 1.
pub fn geometric_mean_weights(matrix: &ReciprocalMatrix) -> Vec<f64> {
    let n = matrix.n();
    if n == 0 {
        return Vec::new();
    }
    // n-th root of the row product, evaluated in log space
    let raw: Vec<f64> = (0..n)
        .map(|i| (matrix.row_log_sum(i) / n as f64).exp())
        .collect();
    let total: f64 = raw.iter().sum();
    raw.iter().map(|w| w / total).collect()
}

/// Standard competition ranking ("1224") by descending weight.
///
/// A weight within `epsilon` of the previous one shares its rank; the next
/// distinct weight resumes at its 1-based position.
pub fn competition_ranks(weights: &[f64], epsilon: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]).then_with(|| a.cmp(&b)));

    let mut ranks = vec![0; weights.len()];
    let mut current = 1;
    for (pos, &item) in order.iter().enumerate() {
        if pos > 0 && (weights[item] - weights[order[pos - 1]]).abs() >= epsilon {
            current = pos + 1;
        }
        ranks[item] = current;
    }
    ranks
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub lambda_max: f64,
    pub ci: f64,
    pub cr: f64,
}

impl ConsistencyReport {
    fn trivial(n: usize) -> Self {
        Self {
            lambda_max: n as f64,
            ci: 0.0,
            cr: 0.0,
        }
    }
}

/// Consistency Ratio for `matrix` given its weights. Always 0 for n <= 2.
pub fn consistency(matrix: &ReciprocalMatrix, weights: &[f64]) -> ConsistencyReport {
    let n = matrix.n();
    if n <= 2 {
        return ConsistencyReport::trivial(n);
    }
    let lambda_max: f64 = (0..n).map(|i| matrix.column_sum(i) * weights[i]).sum();
    let ci = (lambda_max - n as f64) / (n as f64 - 1.0);
    let ri = random_index(n);
    let cr = if ri > 0.0 { ci / ri } else { 0.0 };
    ConsistencyReport { lambda_max, ci, cr }
}

/// Live evaluation of one matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub weights: Vec<f64>,
    pub ranks: Vec<usize>,
    pub consistency: ConsistencyReport,
}

impl Evaluation {
    pub fn cr(&self) -> f64 {
        self.consistency.cr
    }

    pub fn is_consistent(&self, cfg: &EngineConfig) -> bool {
        self.consistency.cr <= cfg.cr_threshold
    }
}

pub fn evaluate(matrix: &ReciprocalMatrix, cfg: &EngineConfig) -> Evaluation {
    let weights = geometric_mean_weights(matrix);
    let ranks = competition_ranks(&weights, cfg.tie_epsilon);
    let consistency = consistency(matrix, &weights);
    Evaluation {
        weights,
        ranks,
        consistency,
    }
}
