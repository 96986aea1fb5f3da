//! Per-respondent comparison sessions.
//!
//! Session values are never mutated in place: every command takes `&self`
//! and returns the next state, so the caller owns (and may discard) each step.
//! [`GroupSession::submit_judgment`] is the single entry point that changes
//! matrix contents; it recomputes live weights, CR and inversions before
//! anything is committed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::consistency::{evaluate, EngineConfig, Evaluation};
use crate::error::ValidationError;
use crate::hierarchy::{ComparisonGroup, GroupLabels, Hierarchy, HierarchyError};
use crate::inversion::{
    detect_inversions, recommend_value, ConsistencyWarning, InversionReport, InversionResolution,
    Recommendation,
};
use crate::matrix::ReciprocalMatrix;
use crate::record::{pair_key, RespondentRecord};
use crate::scale::{saaty_weight, SaatyScale};
use crate::sequencer::{build_pairs, resequence, ComparisonPair, RankAssignment};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub scale: SaatyScale,
    pub engine: EngineConfig,
    pub labels: GroupLabels,
    /// Decimal places kept for ratio weights in answer maps.
    pub answer_precision: u32,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            scale: SaatyScale::default(),
            engine: EngineConfig::default(),
            labels: GroupLabels::default(),
            answer_precision: 3,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error("group '{group}': pair index {index} out of range ({count} pairs)")]
    PairOutOfRange {
        group: String,
        index: usize,
        count: usize,
    },
    #[error("group '{group}': pair {pair_index} awaits an inversion resolution")]
    ResolutionPending { group: String, pair_index: usize },
    #[error("group '{group}': no pending judgment to resolve")]
    NothingPending { group: String },
    #[error("group '{group}': ranks are locked once a pair has been answered")]
    RanksLocked { group: String },
    #[error("group '{group}': {remaining} pair(s) still unanswered")]
    GroupIncomplete { group: String, remaining: usize },
    #[error("no pair in group '{group}' compares items {first} and {second}")]
    UnknownPair {
        group: String,
        first: usize,
        second: usize,
    },
    #[error("survey is in the {actual:?} step, expected {expected:?}")]
    WrongStep {
        expected: SurveyStep,
        actual: SurveyStep,
    },
}

/// A judgment that produced an inversion and is waiting for Revise/Accept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingJudgment {
    pub pair_index: usize,
    pub judgment: i32,
}

/// Live state reported after every submitted judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveState {
    pub evaluation: Evaluation,
    pub inversions: InversionReport,
    pub warning: Option<ConsistencyWarning>,
    /// False when the judgment is pending an inversion resolution.
    pub committed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgmentOutcome {
    pub session: GroupSession,
    pub live: LiveState,
}

/// Comparison state of one respondent for one sibling group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSession {
    group: ComparisonGroup,
    ranks: RankAssignment,
    pairs: Vec<ComparisonPair>,
    /// Committed judgments by pair index, oriented `first` vs `second`.
    judgments: Vec<Option<i32>>,
    /// Includes the pending judgment, if any.
    matrix: ReciprocalMatrix,
    pending: Option<PendingJudgment>,
    cursor: usize,
}

impl GroupSession {
    /// Start comparing `group` from a declared rank order (`ranks[item]`, 1-based).
    pub fn start(group: ComparisonGroup, ranks: Vec<usize>) -> Result<Self, SessionError> {
        if group.len() <= 1 {
            return Err(ValidationError::InsufficientItems {
                group: group.label.clone(),
                count: group.len(),
            }
            .into());
        }
        if ranks.len() != group.len() {
            return Err(ValidationError::RankCountMismatch {
                expected: group.len(),
                got: ranks.len(),
            }
            .into());
        }
        let ranks = RankAssignment::new(ranks)?;
        let pairs = build_pairs(&ranks);
        let n = group.len();
        Ok(Self {
            judgments: vec![None; pairs.len()],
            matrix: ReciprocalMatrix::identity(n),
            group,
            ranks,
            pairs,
            pending: None,
            cursor: 0,
        })
    }

    pub fn group(&self) -> &ComparisonGroup {
        &self.group
    }

    pub fn ranks(&self) -> &RankAssignment {
        &self.ranks
    }

    pub fn pairs(&self) -> &[ComparisonPair] {
        &self.pairs
    }

    pub fn matrix(&self) -> &ReciprocalMatrix {
        &self.matrix
    }

    pub fn pending(&self) -> Option<PendingJudgment> {
        self.pending
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn judgment(&self, pair_index: usize) -> Option<i32> {
        self.judgments.get(pair_index).copied().flatten()
    }

    pub fn current_pair(&self) -> Option<&ComparisonPair> {
        self.pairs.get(self.cursor)
    }

    pub fn answered_count(&self) -> usize {
        self.judgments.iter().filter(|j| j.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_none() && self.answered_count() == self.pairs.len()
    }

    pub fn live(&self, cfg: &EngineConfig) -> Evaluation {
        evaluate(&self.matrix, cfg)
    }

    fn pair(&self, pair_index: usize) -> Result<&ComparisonPair, SessionError> {
        self.pairs
            .get(pair_index)
            .ok_or_else(|| SessionError::PairOutOfRange {
                group: self.group.label.clone(),
                index: pair_index,
                count: self.pairs.len(),
            })
    }

    fn ensure_no_pending(&self) -> Result<(), SessionError> {
        match self.pending {
            Some(p) => Err(SessionError::ResolutionPending {
                group: self.group.label.clone(),
                pair_index: p.pair_index,
            }),
            None => Ok(()),
        }
    }

    /// Enter (or overwrite) the judgment for one pair.
    ///
    /// If live weights then contradict the declared ranks the judgment is
    /// held as pending until [`GroupSession::resolve`] is called.
    pub fn submit_judgment(
        &self,
        pair_index: usize,
        judgment: i32,
        cfg: &SurveyConfig,
    ) -> Result<JudgmentOutcome, SessionError> {
        self.ensure_no_pending()?;
        let pair = self.pair(pair_index)?.clone();
        cfg.scale.check(judgment)?;

        let mut next = self.clone();
        next.matrix
            .set_judgment(pair.first, pair.second, judgment, &cfg.scale)?;

        let evaluation = evaluate(&next.matrix, &cfg.engine);
        let inversions = detect_inversions(&evaluation.weights, &next.ranks, cfg.engine.tie_epsilon);

        let prior = self
            .judgments
            .iter()
            .enumerate()
            .filter(|(idx, j)| *idx != pair_index && j.is_some())
            .count();
        let warning = if prior >= cfg.engine.min_judgments_for_cr_check
            && evaluation.cr() > cfg.engine.cr_threshold
        {
            Some(ConsistencyWarning {
                cr: evaluation.cr(),
                threshold: cfg.engine.cr_threshold,
                recommendation: recommend_value(&next.matrix, pair.first, pair.second, &cfg.scale),
            })
        } else {
            None
        };

        let committed = inversions.is_empty();
        if committed {
            next.judgments[pair_index] = Some(judgment);
            next.cursor = pair_index + 1;
        } else {
            next.pending = Some(PendingJudgment {
                pair_index,
                judgment,
            });
            next.cursor = pair_index;
        }

        debug!(
            group = %self.group.label,
            pair = pair_index,
            judgment,
            cr = evaluation.cr(),
            inversions = inversions.inversions.len(),
            committed,
            "judgment submitted"
        );

        Ok(JudgmentOutcome {
            session: next,
            live: LiveState {
                evaluation,
                inversions,
                warning,
                committed,
            },
        })
    }

    /// Settle a pending judgment.
    pub fn resolve(
        &self,
        resolution: InversionResolution,
        cfg: &SurveyConfig,
    ) -> Result<GroupSession, SessionError> {
        let pending = self.pending.ok_or_else(|| SessionError::NothingPending {
            group: self.group.label.clone(),
        })?;
        let pair = self.pair(pending.pair_index)?.clone();
        let mut next = self.clone();
        next.pending = None;

        match resolution {
            InversionResolution::Revise => {
                next.matrix.clear(pair.first, pair.second)?;
                next.judgments[pending.pair_index] = None;
                next.cursor = pending.pair_index;
            }
            InversionResolution::Accept => {
                next.judgments[pending.pair_index] = Some(pending.judgment);
                let live = evaluate(&next.matrix, &cfg.engine);
                next.ranks =
                    RankAssignment::from_weights(&live.weights, &self.ranks, cfg.engine.tie_epsilon);
                let answered: Vec<bool> = next.judgments.iter().map(Option::is_some).collect();
                next.pairs = resequence(&next.pairs, &answered, &next.ranks);
                next.cursor = pending.pair_index + 1;
                info!(
                    group = %self.group.label,
                    ranks = ?next.ranks.ranks(),
                    "rank update accepted"
                );
            }
        }
        Ok(next)
    }

    /// Replace a judgment with the advisory recommendation.
    ///
    /// A pending judgment on the same pair is discarded first.
    pub fn apply_recommendation(
        &self,
        recommendation: &Recommendation,
        cfg: &SurveyConfig,
    ) -> Result<JudgmentOutcome, SessionError> {
        let wanted = (
            recommendation.first.min(recommendation.second),
            recommendation.first.max(recommendation.second),
        );
        let pair = self
            .pairs
            .iter()
            .find(|p| p.key() == wanted)
            .ok_or_else(|| SessionError::UnknownPair {
                group: self.group.label.clone(),
                first: recommendation.first,
                second: recommendation.second,
            })?;
        // recommendations are expressed as `first` vs `second`; flip if the slot is reversed
        let judgment = if pair.first == recommendation.first {
            recommendation.judgment
        } else {
            -recommendation.judgment
        };
        let base = match self.pending {
            Some(p) if p.pair_index == pair.index => self.resolve(InversionResolution::Revise, cfg)?,
            _ => self.clone(),
        };
        base.submit_judgment(pair.index, judgment, cfg)
    }

    /// Step back to the previous pair so it can be re-entered.
    pub fn previous(&self) -> Result<GroupSession, SessionError> {
        self.ensure_no_pending()?;
        let mut next = self.clone();
        next.cursor = self.cursor.saturating_sub(1);
        Ok(next)
    }

    /// Restart the group with new ranks; only before any pair is answered.
    pub fn reset_ranks(&self, ranks: Vec<usize>) -> Result<GroupSession, SessionError> {
        if self.answered_count() > 0 || self.pending.is_some() {
            return Err(SessionError::RanksLocked {
                group: self.group.label.clone(),
            });
        }
        GroupSession::start(self.group.clone(), ranks)
    }

    /// Answer-map entries for every committed pair.
    pub fn answers(&self, precision: u32) -> Vec<(String, f64)> {
        let factor = 10f64.powi(precision as i32);
        self.pairs
            .iter()
            .filter_map(|pair| {
                let judgment = self.judgment(pair.index)?;
                let key = pair_key(
                    &self.group.label,
                    &self.group.items[pair.first],
                    &self.group.items[pair.second],
                );
                let weight = (saaty_weight(judgment) * factor).round() / factor;
                Some((key, weight))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStep {
    /// Waiting for the respondent's rank order of the current group.
    Ranking,
    /// Pairwise comparisons of the current group.
    Comparing,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyOutcome {
    pub survey: SurveySession,
    pub live: LiveState,
}

/// One respondent's walk through every comparison group of a hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveySession {
    hierarchy: Hierarchy,
    groups: Vec<ComparisonGroup>,
    group_index: usize,
    active: Option<GroupSession>,
    answers: BTreeMap<String, f64>,
}

impl SurveySession {
    pub fn new(hierarchy: Hierarchy, cfg: &SurveyConfig) -> Result<Self, SessionError> {
        hierarchy.validate()?;
        let groups = hierarchy.comparison_groups(&cfg.labels);
        Ok(Self {
            hierarchy,
            groups,
            group_index: 0,
            active: None,
            answers: BTreeMap::new(),
        })
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn groups(&self) -> &[ComparisonGroup] {
        &self.groups
    }

    pub fn step(&self) -> SurveyStep {
        if self.group_index >= self.groups.len() {
            SurveyStep::Finished
        } else if self.active.is_none() {
            SurveyStep::Ranking
        } else {
            SurveyStep::Comparing
        }
    }

    pub fn current_group(&self) -> Option<&ComparisonGroup> {
        self.groups.get(self.group_index)
    }

    pub fn active(&self) -> Option<&GroupSession> {
        self.active.as_ref()
    }

    pub fn answers(&self) -> &BTreeMap<String, f64> {
        &self.answers
    }

    fn expect_step(&self, expected: SurveyStep) -> Result<(), SessionError> {
        let actual = self.step();
        if actual != expected {
            return Err(SessionError::WrongStep { expected, actual });
        }
        Ok(())
    }

    fn active_group(&self) -> Result<&GroupSession, SessionError> {
        self.expect_step(SurveyStep::Comparing)?;
        self.active.as_ref().ok_or(SessionError::WrongStep {
            expected: SurveyStep::Comparing,
            actual: self.step(),
        })
    }

    fn with_active(&self, active: GroupSession) -> SurveySession {
        let mut next = self.clone();
        next.active = Some(active);
        next
    }

    pub fn set_ranks(&self, ranks: Vec<usize>) -> Result<SurveySession, SessionError> {
        self.expect_step(SurveyStep::Ranking)?;
        let group = self
            .current_group()
            .cloned()
            .ok_or(SessionError::WrongStep {
                expected: SurveyStep::Ranking,
                actual: SurveyStep::Finished,
            })?;
        Ok(self.with_active(GroupSession::start(group, ranks)?))
    }

    pub fn submit_judgment(
        &self,
        pair_index: usize,
        judgment: i32,
        cfg: &SurveyConfig,
    ) -> Result<SurveyOutcome, SessionError> {
        let outcome = self.active_group()?.submit_judgment(pair_index, judgment, cfg)?;
        Ok(SurveyOutcome {
            survey: self.with_active(outcome.session),
            live: outcome.live,
        })
    }

    pub fn resolve(
        &self,
        resolution: InversionResolution,
        cfg: &SurveyConfig,
    ) -> Result<SurveySession, SessionError> {
        let next = self.active_group()?.resolve(resolution, cfg)?;
        Ok(self.with_active(next))
    }

    pub fn apply_recommendation(
        &self,
        recommendation: &Recommendation,
        cfg: &SurveyConfig,
    ) -> Result<SurveyOutcome, SessionError> {
        let outcome = self
            .active_group()?
            .apply_recommendation(recommendation, cfg)?;
        Ok(SurveyOutcome {
            survey: self.with_active(outcome.session),
            live: outcome.live,
        })
    }

    pub fn previous(&self) -> Result<SurveySession, SessionError> {
        let next = self.active_group()?.previous()?;
        Ok(self.with_active(next))
    }

    /// Go back to rank entry for the current group (before its first answer).
    pub fn reset_ranks(&self) -> Result<SurveySession, SessionError> {
        let active = self.active_group()?;
        if active.answered_count() > 0 || active.pending().is_some() {
            return Err(SessionError::RanksLocked {
                group: active.group().label.clone(),
            });
        }
        let mut next = self.clone();
        next.active = None;
        Ok(next)
    }

    /// Fold the completed group's answers and move to the next group.
    pub fn complete_group(&self, cfg: &SurveyConfig) -> Result<SurveySession, SessionError> {
        let active = self.active_group()?;
        if !active.is_complete() {
            return Err(SessionError::GroupIncomplete {
                group: active.group().label.clone(),
                remaining: active.pairs().len() - active.answered_count(),
            });
        }
        let mut next = self.clone();
        next.answers.extend(active.answers(cfg.answer_precision));
        next.active = None;
        next.group_index += 1;
        info!(
            group = %active.group().label,
            cr = active.live(&cfg.engine).cr(),
            "comparison group completed"
        );
        Ok(next)
    }

    pub fn finish(&self, respondent: &str) -> Result<RespondentRecord, SessionError> {
        self.expect_step(SurveyStep::Finished)?;
        Ok(RespondentRecord::new(respondent, self.answers.clone()))
    }
}
