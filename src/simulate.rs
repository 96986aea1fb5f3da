//! Seeded synthetic respondents for offline evaluation.
//!
//! Each simulated respondent walks a real [`SurveySession`]: ranks follow
//! the true scores, judgments are the true ratio perturbed by log-normal
//! noise, and every inversion is accepted.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hierarchy::Hierarchy;
use crate::inversion::InversionResolution;
use crate::record::RespondentRecord;
use crate::session::{SessionError, SurveyConfig, SurveySession, SurveyStep};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub respondents: usize,
    /// Standard deviation of the log-ratio noise.
    pub noise_sigma: f64,
    pub seed: u64,
    /// Share of respondents answering with heavy noise and random flips.
    pub inconsistent_share: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            respondents: 10,
            noise_sigma: 0.2,
            seed: 7,
            inconsistent_share: 0.0,
        }
    }
}

const INCONSISTENT_NOISE_FACTOR: f64 = 4.0;
const INCONSISTENT_FLIP_RATE: f64 = 0.3;

fn sample_normal(rng: &mut impl Rng, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return mean;
    }
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z0 * std
}

fn truth_of(truth: &BTreeMap<String, f64>, item: &str) -> f64 {
    truth
        .get(item)
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(1.0)
}

/// 1-based ranks by descending truth score; declaration order breaks ties.
fn truth_ranks(items: &[String], truth: &BTreeMap<String, f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| truth_of(truth, &items[b]).total_cmp(&truth_of(truth, &items[a])));
    let mut ranks = vec![0; items.len()];
    for (pos, item) in order.into_iter().enumerate() {
        ranks[item] = pos + 1;
    }
    ranks
}

struct Respondent {
    sigma: f64,
    flip_rate: f64,
}

fn simulate_one(
    hierarchy: &Hierarchy,
    truth: &BTreeMap<String, f64>,
    respondent: &Respondent,
    name: &str,
    rng: &mut StdRng,
    cfg: &SurveyConfig,
) -> Result<RespondentRecord, SessionError> {
    let mut survey = SurveySession::new(hierarchy.clone(), cfg)?;
    loop {
        match survey.step() {
            SurveyStep::Finished => return survey.finish(name),
            SurveyStep::Ranking => {
                let items = survey
                    .current_group()
                    .map(|g| g.items.clone())
                    .unwrap_or_default();
                survey = survey.set_ranks(truth_ranks(&items, truth))?;
            }
            SurveyStep::Comparing => {
                let Some(active) = survey.active() else {
                    return Err(SessionError::WrongStep {
                        expected: SurveyStep::Comparing,
                        actual: survey.step(),
                    });
                };
                let next_pair = active
                    .pairs()
                    .iter()
                    .find(|p| active.judgment(p.index).is_none())
                    .cloned();
                let Some(pair) = next_pair else {
                    survey = survey.complete_group(cfg)?;
                    continue;
                };
                let items = &active.group().items;
                let true_ratio = truth_of(truth, &items[pair.first]) / truth_of(truth, &items[pair.second]);
                let mut ratio = true_ratio * sample_normal(rng, 0.0, respondent.sigma).exp();
                if respondent.flip_rate > 0.0 && rng.gen::<f64>() < respondent.flip_rate {
                    ratio = 1.0 / ratio;
                }
                let judgment = cfg.scale.from_weight(ratio);
                let outcome = survey.submit_judgment(pair.index, judgment, cfg)?;
                survey = if outcome.live.committed {
                    outcome.survey
                } else {
                    outcome.survey.resolve(InversionResolution::Accept, cfg)?
                };
            }
        }
    }
}

/// Generate `cfg.respondents` completed records for `hierarchy`.
///
/// `truth` maps item names (main and sub-criteria) to positive scores;
/// missing names score 1.
pub fn simulate_respondents(
    hierarchy: &Hierarchy,
    truth: &BTreeMap<String, f64>,
    cfg: &SimulationConfig,
    survey_cfg: &SurveyConfig,
) -> Result<Vec<RespondentRecord>, SessionError> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut records = Vec::with_capacity(cfg.respondents);
    for idx in 0..cfg.respondents {
        let inconsistent = cfg.inconsistent_share > 0.0 && rng.gen::<f64>() < cfg.inconsistent_share;
        let respondent = if inconsistent {
            Respondent {
                sigma: cfg.noise_sigma.max(0.1) * INCONSISTENT_NOISE_FACTOR,
                flip_rate: INCONSISTENT_FLIP_RATE,
            }
        } else {
            Respondent {
                sigma: cfg.noise_sigma,
                flip_rate: 0.0,
            }
        };
        let name = format!("sim-{:03}", idx + 1);
        let record = simulate_one(hierarchy, truth, &respondent, &name, &mut rng, survey_cfg)?;
        debug!(respondent = %name, inconsistent, answers = record.answers.len(), "simulated respondent");
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> Hierarchy {
        let mut sub = BTreeMap::new();
        sub.insert("Cost".to_string(), vec!["Price".to_string(), "Upkeep".to_string()]);
        Hierarchy {
            goal: "Pick".to_string(),
            main_criteria: vec!["Cost".to_string(), "Safety".to_string(), "Comfort".to_string()],
            sub_criteria: sub,
        }
    }

    #[test]
    fn noiseless_respondents_reproduce_truth_ratios() {
        let mut truth = BTreeMap::new();
        truth.insert("Safety".to_string(), 3.0);
        truth.insert("Cost".to_string(), 1.0);
        truth.insert("Comfort".to_string(), 1.0);
        truth.insert("Price".to_string(), 2.0);
        let cfg = SimulationConfig {
            respondents: 2,
            noise_sigma: 0.0,
            ..SimulationConfig::default()
        };
        let records =
            simulate_respondents(&hierarchy(), &truth, &cfg, &SurveyConfig::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].respondent, "sim-001");
        // 3 main pairs + 1 cost pair
        assert_eq!(records[0].answers.len(), 4);
        assert_eq!(records[0].answers["[Main criteria] Safety vs Cost"], 3.0);
        assert_eq!(records[0].answers["[Cost sub-criteria] Price vs Upkeep"], 2.0);
    }

    #[test]
    fn same_seed_gives_same_answers() {
        let truth = BTreeMap::new();
        let cfg = SimulationConfig {
            respondents: 3,
            noise_sigma: 0.5,
            inconsistent_share: 0.5,
            ..SimulationConfig::default()
        };
        let a = simulate_respondents(&hierarchy(), &truth, &cfg, &SurveyConfig::default()).unwrap();
        let b = simulate_respondents(&hierarchy(), &truth, &cfg, &SurveyConfig::default()).unwrap();
        let answers_a: Vec<_> = a.iter().map(|r| r.answers.clone()).collect();
        let answers_b: Vec<_> = b.iter().map(|r| r.answers.clone()).collect();
        assert_eq!(answers_a, answers_b);
    }

    #[test]
    fn truth_ranks_are_descending_scores() {
        let mut truth = BTreeMap::new();
        truth.insert("b".to_string(), 5.0);
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(truth_ranks(&items, &truth), vec![2, 1, 3]);
    }
}
