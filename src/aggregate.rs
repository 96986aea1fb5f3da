//! Hierarchical aggregation of submitted respondent records.
//!
//! Each record is evaluated on its own: main-criteria weights times
//! sub-criteria weights give composite weights, and the worst CR across
//! the record's groups decides whether the respondent is admitted to the
//! group average. A record that fails to parse or has no main group is
//! reported in the status table and skipped; it never aborts the batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::consistency::{competition_ranks, evaluate, EngineConfig};
use crate::error::AggregationError;
use crate::hierarchy::Hierarchy;
use crate::record::{ParsedGroup, ParsedRecord, RawRecord};
use crate::scale::SaatyScale;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub engine: EngineConfig,
    pub scale: SaatyScale,
    /// A group is the main group when its label equals, or else contains,
    /// one of these markers.
    pub main_group_markers: Vec<String>,
    /// Relative tolerance for snapping rounded wire weights onto exact
    /// scale ratios; `None` keeps weights as stored.
    pub snap_tolerance: Option<f64>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            scale: SaatyScale::default(),
            main_group_markers: vec!["Main criteria".to_string()],
            snap_tolerance: Some(0.01),
        }
    }
}

impl AggregatorConfig {
    /// Add the survey's main-group label to the markers if it is missing.
    pub fn with_main_group_label(mut self, label: &str) -> Self {
        let label = label.trim();
        if !label.is_empty() && !self.main_group_markers.iter().any(|m| m == label) {
            self.main_group_markers.push(label.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRow {
    pub parent: String,
    pub parent_weight: f64,
    pub child: String,
    pub child_weight: f64,
    pub composite_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConsistency {
    pub label: String,
    pub cr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondentEvaluation {
    pub response_id: Option<Uuid>,
    pub respondent: String,
    pub submitted_at: String,
    pub main_weights: Vec<(String, f64)>,
    pub groups: Vec<GroupConsistency>,
    /// Worst CR over the main group and every sub-group.
    pub max_cr: f64,
    pub rows: Vec<CompositeRow>,
}

impl RespondentEvaluation {
    pub fn is_valid(&self, cfg: &EngineConfig) -> bool {
        self.max_cr <= cfg.cr_threshold
    }
}

/// Index of the main-criteria group: exact marker match first, then containment.
pub fn find_main_group(groups: &[ParsedGroup], markers: &[String]) -> Option<usize> {
    groups
        .iter()
        .position(|g| markers.iter().any(|m| g.label == *m))
        .or_else(|| {
            groups
                .iter()
                .position(|g| markers.iter().any(|m| !m.is_empty() && g.label.contains(m.as_str())))
        })
}

/// Parent criterion whose name appears in `label`; the longest name wins
/// so that "Cost" does not capture "Running Cost sub-criteria".
pub fn match_parent<'a>(label: &str, parents: &'a [String]) -> Option<&'a String> {
    parents
        .iter()
        .filter(|p| !p.is_empty() && label.contains(p.as_str()))
        .max_by_key(|p| p.len())
}

fn group_weights(
    group: &ParsedGroup,
    record: &ParsedRecord,
    cfg: &AggregatorConfig,
) -> Result<(Vec<(String, f64)>, f64), AggregationError> {
    let matrix = group
        .matrix(&cfg.scale, cfg.snap_tolerance)
        .map_err(|e| AggregationError::MalformedRecord {
            respondent: record.respondent.clone(),
            reason: format!("group '{}': {e}", group.label),
        })?;
    let eval = evaluate(&matrix, &cfg.engine);
    let weights = group
        .items
        .iter()
        .cloned()
        .zip(eval.weights.iter().copied())
        .collect();
    Ok((weights, eval.cr()))
}

pub fn evaluate_respondent(
    record: &ParsedRecord,
    hierarchy: Option<&Hierarchy>,
    cfg: &AggregatorConfig,
) -> Result<RespondentEvaluation, AggregationError> {
    let main_idx = find_main_group(&record.groups, &cfg.main_group_markers);

    let mut groups = Vec::new();
    let main_weights = match (main_idx, hierarchy) {
        (Some(idx), _) => {
            let main = &record.groups[idx];
            let (weights, cr) = group_weights(main, record, cfg)?;
            groups.push(GroupConsistency {
                label: main.label.clone(),
                cr,
            });
            weights
        }
        // a single main criterion is never compared; it carries all weight
        (None, Some(h)) if h.main_criteria.len() == 1 => vec![(h.main_criteria[0].clone(), 1.0)],
        (None, _) => {
            return Err(AggregationError::MissingMainGroup {
                respondent: record.respondent.clone(),
                groups: record.group_labels(),
            })
        }
    };
    let parents: Vec<String> = main_weights.iter().map(|(name, _)| name.clone()).collect();

    let mut rows = Vec::new();
    for (idx, group) in record.groups.iter().enumerate() {
        if Some(idx) == main_idx {
            continue;
        }
        let Some(parent) = match_parent(&group.label, &parents) else {
            warn!(
                respondent = %record.respondent,
                group = %group.label,
                "sub-group matches no main criterion; skipped"
            );
            continue;
        };
        let parent_weight = main_weights
            .iter()
            .find(|(name, _)| name == parent)
            .map(|(_, w)| *w)
            .unwrap_or(0.0);
        let (weights, cr) = group_weights(group, record, cfg)?;
        groups.push(GroupConsistency {
            label: group.label.clone(),
            cr,
        });
        for (child, child_weight) in weights {
            rows.push(CompositeRow {
                parent: parent.clone(),
                parent_weight,
                child,
                child_weight,
                composite_weight: parent_weight * child_weight,
            });
        }
    }

    if let Some(h) = hierarchy {
        // parents with fewer than two children have no sub-group to compare
        for (parent, parent_weight) in &main_weights {
            if rows.iter().any(|r| &r.parent == parent) {
                continue;
            }
            let children = h.children_of(parent);
            if children.len() > 1 {
                continue;
            }
            let child = children.first().cloned().unwrap_or_else(|| parent.clone());
            rows.push(CompositeRow {
                parent: parent.clone(),
                parent_weight: *parent_weight,
                child,
                child_weight: 1.0,
                composite_weight: *parent_weight,
            });
        }
    }

    let max_cr = groups.iter().map(|g| g.cr).fold(0.0, f64::max);
    Ok(RespondentEvaluation {
        response_id: record.response_id,
        respondent: record.respondent.clone(),
        submitted_at: record.submitted_at.clone(),
        main_weights,
        groups,
        max_cr,
        rows,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondentStatus {
    /// 1-based position in the submitted batch.
    pub index: usize,
    pub respondent: String,
    pub submitted_at: String,
    pub cr: Option<f64>,
    pub valid: bool,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub respondent: String,
    pub submitted_at: String,
    pub cr: f64,
    pub rank: usize,
    pub parent: String,
    pub parent_weight: f64,
    pub child: String,
    pub child_weight: f64,
    pub composite_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRankingRow {
    pub rank: usize,
    pub parent: String,
    pub child: String,
    pub composite_weight: f64,
    /// Valid respondents that contributed to the average.
    pub respondents: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub status: Vec<RespondentStatus>,
    pub details: Vec<DetailRow>,
    pub ranking: Vec<GroupRankingRow>,
}

impl AggregationReport {
    pub fn valid_count(&self) -> usize {
        self.status.iter().filter(|s| s.valid).count()
    }
}

/// Sort rows by descending composite weight (name order on exact ties)
/// and attach competition ranks.
fn rank_rows<T>(
    mut rows: Vec<T>,
    weight: impl Fn(&T) -> f64,
    name: impl Fn(&T) -> (String, String),
    epsilon: f64,
) -> Vec<(usize, T)> {
    rows.sort_by(|a, b| {
        weight(b)
            .total_cmp(&weight(a))
            .then_with(|| name(a).cmp(&name(b)))
    });
    let weights: Vec<f64> = rows.iter().map(&weight).collect();
    let ranks = competition_ranks(&weights, epsilon);
    ranks.into_iter().zip(rows).collect()
}

pub fn aggregate(
    records: &[RawRecord],
    hierarchy: Option<&Hierarchy>,
    cfg: &AggregatorConfig,
) -> AggregationReport {
    let mut report = AggregationReport::default();
    let mut sums: HashMap<(String, String), (f64, usize)> = HashMap::new();

    for (idx, raw) in records.iter().enumerate() {
        let result = ParsedRecord::parse(raw)
            .and_then(|parsed| evaluate_respondent(&parsed, hierarchy, cfg));
        let evaluation = match result {
            Ok(evaluation) => evaluation,
            Err(err) => {
                warn!(index = idx + 1, respondent = %err.respondent(), error = %err, "record excluded");
                report.status.push(RespondentStatus {
                    index: idx + 1,
                    respondent: err.respondent().to_string(),
                    submitted_at: raw.submitted_at.clone(),
                    cr: None,
                    valid: false,
                    error_code: Some(err.code().to_string()),
                    error: Some(err.to_string()),
                });
                continue;
            }
        };

        let valid = evaluation.is_valid(&cfg.engine);
        report.status.push(RespondentStatus {
            index: idx + 1,
            respondent: evaluation.respondent.clone(),
            submitted_at: evaluation.submitted_at.clone(),
            cr: Some(evaluation.max_cr),
            valid,
            error_code: None,
            error: None,
        });
        if !valid {
            info!(
                respondent = %evaluation.respondent,
                cr = evaluation.max_cr,
                "respondent above CR threshold; excluded from group ranking"
            );
            continue;
        }

        for row in &evaluation.rows {
            let entry = sums
                .entry((row.parent.clone(), row.child.clone()))
                .or_insert((0.0, 0));
            entry.0 += row.composite_weight;
            entry.1 += 1;
        }

        let ranked = rank_rows(
            evaluation.rows.clone(),
            |r| r.composite_weight,
            |r| (r.parent.clone(), r.child.clone()),
            cfg.engine.tie_epsilon,
        );
        for (rank, row) in ranked {
            report.details.push(DetailRow {
                respondent: evaluation.respondent.clone(),
                submitted_at: evaluation.submitted_at.clone(),
                cr: evaluation.max_cr,
                rank,
                parent: row.parent,
                parent_weight: row.parent_weight,
                child: row.child,
                child_weight: row.child_weight,
                composite_weight: row.composite_weight,
            });
        }
    }

    let averaged: Vec<GroupRankingRow> = sums
        .into_iter()
        .map(|((parent, child), (sum, count))| GroupRankingRow {
            rank: 0,
            parent,
            child,
            composite_weight: sum / count as f64,
            respondents: count,
        })
        .collect();
    report.ranking = rank_rows(
        averaged,
        |r| r.composite_weight,
        |r| (r.parent.clone(), r.child.clone()),
        cfg.engine.tie_epsilon,
    )
    .into_iter()
    .map(|(rank, row)| GroupRankingRow { rank, ..row })
    .collect();

    info!(
        records = records.len(),
        valid = report.valid_count(),
        rows = report.ranking.len(),
        "aggregation finished"
    );
    report
}
