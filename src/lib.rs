#![forbid(unsafe_code)]

//! # ahp-harness
//!
//! Pairwise-comparison survey engine built on the Analytic Hierarchy Process.
//!
//! Respondents rank the items of each sibling group, then answer slider
//! questions on a bounded Saaty scale. Every answer immediately recomputes
//! geometric-mean weights and the Consistency Ratio, flags judgments that
//! contradict the declared ranks, and can suggest a transitively consistent
//! value. Completed surveys are aggregated into composite weights across the
//! criteria hierarchy, keeping only respondents with CR ≤ 0.1.

pub mod aggregate;
pub mod consistency;
pub mod error;
pub mod hierarchy;
pub mod inversion;
pub mod matrix;
pub mod record;
pub mod report;
pub mod scale;
pub mod sequencer;
pub mod session;
pub mod simulate;
pub mod store;
pub mod trace;

pub use aggregate::{aggregate, evaluate_respondent, AggregationReport, AggregatorConfig};
pub use consistency::{evaluate, geometric_mean_weights, EngineConfig, Evaluation};
pub use error::{AggregationError, ValidationError};
pub use hierarchy::{ComparisonGroup, GroupLabels, Hierarchy, HierarchyError};
pub use inversion::{
    detect_inversions, recommend_value, ConsistencyWarning, InversionResolution, Recommendation,
};
pub use matrix::ReciprocalMatrix;
pub use record::{pair_key, ParsedRecord, RawRecord, RespondentRecord};
pub use report::render_report_markdown;
pub use scale::SaatyScale;
pub use sequencer::{build_pairs, ComparisonPair, RankAssignment};
pub use session::{GroupSession, SessionError, SurveyConfig, SurveySession, SurveyStep};
pub use simulate::{simulate_respondents, SimulationConfig};
pub use store::{ResponseStore, SqliteResponseStore, StoreError, SurveyKey};
pub use trace::{
    GroupTrace, JsonlTraceSink, JudgmentTrace, TraceError, TraceEvent, TraceSink, TraceSummary,
    TraceWorker,
};
