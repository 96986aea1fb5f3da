//! Error taxonomy shared by the comparison engine and the aggregator.
//!
//! Validation errors are raised while a respondent is entering data and
//! must be re-prompted. Aggregation errors are scoped to one submitted
//! record and never abort a batch.

use thiserror::Error;

/// Input problems detected before any matrix state is created or mutated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("items {first} and {second} share rank {rank}")]
    DuplicateRank {
        rank: usize,
        first: usize,
        second: usize,
    },
    #[error("rank {rank} of item {item} is outside 1..={n}")]
    RankOutOfRange { item: usize, rank: usize, n: usize },
    #[error("expected {expected} ranks, got {got}")]
    RankCountMismatch { expected: usize, got: usize },
    #[error("group '{group}' has {count} item(s); at least 2 are needed for a comparison")]
    InsufficientItems { group: String, count: usize },
    #[error("judgment {judgment} is outside -{max_step}..={max_step}")]
    JudgmentOutOfRange { judgment: i32, max_step: i32 },
    #[error("invalid ratio weight {weight} for pair ({i}, {j})")]
    InvalidWeight { i: usize, j: usize, weight: f64 },
    #[error("item index {index} out of range for {n} items")]
    IndexOutOfRange { index: usize, n: usize },
    #[error("item {index} cannot be compared with itself")]
    SelfComparison { index: usize },
    #[error("scale must allow at least one intensity step, got {max_step}")]
    InvalidScale { max_step: i32 },
}

/// Per-respondent failure while turning a submitted record into weights.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregationError {
    #[error("respondent '{respondent}': no main-criteria group among {groups:?}")]
    MissingMainGroup {
        respondent: String,
        groups: Vec<String>,
    },
    #[error("respondent '{respondent}': malformed record: {reason}")]
    MalformedRecord { respondent: String, reason: String },
}

impl AggregationError {
    pub fn respondent(&self) -> &str {
        match self {
            AggregationError::MissingMainGroup { respondent, .. } => respondent,
            AggregationError::MalformedRecord { respondent, .. } => respondent,
        }
    }

    /// Stable short code for status tables and exports.
    pub fn code(&self) -> &'static str {
        match self {
            AggregationError::MissingMainGroup { .. } => "missing_main_group",
            AggregationError::MalformedRecord { .. } => "malformed_record",
        }
    }
}
