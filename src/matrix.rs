//! Reciprocal pairwise comparison matrix.
//!
//! Invariants held by every mutation:
//! - `M[i][i] == 1`
//! - `M[i][j] * M[j][i] == 1`
//! - unjudged pairs read as 1 (equal), so partial matrices always yield weights.

use nalgebra::DMatrix;

use crate::error::ValidationError;
use crate::scale::SaatyScale;

#[derive(Debug, Clone, PartialEq)]
pub struct ReciprocalMatrix {
    values: DMatrix<f64>,
    judged: DMatrix<bool>,
}

impl ReciprocalMatrix {
    pub fn identity(n: usize) -> Self {
        Self {
            values: DMatrix::from_element(n, n, 1.0),
            judged: DMatrix::from_element(n, n, false),
        }
    }

    /// Build from `(i, j, weight)` triples; later triples for the same pair win.
    pub fn from_judgments(n: usize, entries: &[(usize, usize, f64)]) -> Result<Self, ValidationError> {
        let mut matrix = Self::identity(n);
        for &(i, j, weight) in entries {
            matrix.set_weight(i, j, weight)?;
        }
        Ok(matrix)
    }

    pub fn n(&self) -> usize {
        self.values.nrows()
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[(i, j)]
    }

    pub fn is_judged(&self, i: usize, j: usize) -> bool {
        self.judged[(i, j)]
    }

    /// Number of distinct unordered pairs that carry a judgment.
    pub fn judged_count(&self) -> usize {
        let n = self.n();
        let mut count = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                if self.judged[(i, j)] {
                    count += 1;
                }
            }
        }
        count
    }

    fn check_pair(&self, i: usize, j: usize) -> Result<(), ValidationError> {
        let n = self.n();
        for index in [i, j] {
            if index >= n {
                return Err(ValidationError::IndexOutOfRange { index, n });
            }
        }
        if i == j {
            return Err(ValidationError::SelfComparison { index: i });
        }
        Ok(())
    }

    /// Record that item `i` is `weight` times as important as item `j`.
    ///
    /// The side `>= 1` is stored as given and the other side as its
    /// reciprocal, so small-integer scale ratios multiply back to exactly 1.
    pub fn set_weight(&mut self, i: usize, j: usize, weight: f64) -> Result<(), ValidationError> {
        self.check_pair(i, j)?;
        if !weight.is_finite() || weight <= 0.0 {
            return Err(ValidationError::InvalidWeight { i, j, weight });
        }
        let (dominant, dominated, ratio) = if weight >= 1.0 {
            (i, j, weight)
        } else {
            (j, i, 1.0 / weight)
        };
        self.values[(dominant, dominated)] = ratio;
        self.values[(dominated, dominant)] = 1.0 / ratio;
        self.judged[(i, j)] = true;
        self.judged[(j, i)] = true;
        Ok(())
    }

    pub fn set_judgment(
        &mut self,
        i: usize,
        j: usize,
        judgment: i32,
        scale: &SaatyScale,
    ) -> Result<(), ValidationError> {
        let weight = scale.to_weight(judgment)?;
        self.set_weight(i, j, weight)
    }

    /// Forget a judgment; the pair reads as equal again.
    pub fn clear(&mut self, i: usize, j: usize) -> Result<(), ValidationError> {
        self.check_pair(i, j)?;
        self.values[(i, j)] = 1.0;
        self.values[(j, i)] = 1.0;
        self.judged[(i, j)] = false;
        self.judged[(j, i)] = false;
        Ok(())
    }

    pub fn column_sum(&self, col: usize) -> f64 {
        self.values.column(col).sum()
    }

    /// `Σ_j ln M[i][j]`; the log of the row product.
    pub fn row_log_sum(&self, row: usize) -> f64 {
        self.values.row(row).iter().map(|v| v.ln()).sum()
    }
}
