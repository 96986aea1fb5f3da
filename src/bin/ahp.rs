#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ahp_harness::aggregate::{aggregate, AggregatorConfig};
use ahp_harness::consistency::evaluate;
use ahp_harness::hierarchy::Hierarchy;
use ahp_harness::inversion::{ConsistencyWarning, InversionResolution};
use ahp_harness::record::{ParsedRecord, RawRecord, RespondentRecord};
use ahp_harness::report::render_report_markdown;
use ahp_harness::sequencer::{build_pairs, RankAssignment};
use ahp_harness::session::{SurveyConfig, SurveySession, SurveyStep};
use ahp_harness::simulate::{simulate_respondents, SimulationConfig};
use ahp_harness::store::{ResponseStore, SqliteResponseStore, SurveyKey, DEFAULT_PROJECT_KEY};
use ahp_harness::trace::{GroupTrace, JsonlTraceSink, JudgmentTrace, TraceSink};

#[derive(Parser)]
#[command(name = "ahp", version, about = "AHP pairwise survey CLI")]
struct Cli {
    /// JSON file with `survey` and/or `aggregator` settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a hierarchy and list its comparison groups
    Validate {
        #[arg(long)]
        hierarchy: PathBuf,
    },
    /// Print the pair sequence for ranked items
    Pairs {
        /// Comma-separated item names
        #[arg(long, value_delimiter = ',')]
        items: Vec<String>,
        /// Comma-separated 1-based ranks, one per item (defaults to listed order)
        #[arg(long, value_delimiter = ',')]
        ranks: Vec<usize>,
    },
    /// Compute per-group weights and CR for one answer map
    Weights {
        /// JSON object of `"[group] A vs B"` -> weight
        #[arg(long)]
        answers: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Drive a survey session from a JSON script of steps
    Replay {
        #[arg(long)]
        hierarchy: PathBuf,
        #[arg(long)]
        script: PathBuf,
        #[arg(long, default_value = "")]
        respondent: String,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write one JSON line per submitted judgment
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Generate synthetic respondents
    Simulate {
        #[arg(long)]
        hierarchy: PathBuf,
        /// JSON object of item name -> true score
        #[arg(long)]
        truth: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        respondents: usize,
        #[arg(long, default_value_t = 0.2)]
        noise_sigma: f64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[arg(long, default_value_t = 0.0)]
        inconsistent_share: f64,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Append the generated records to the response store
        #[arg(long)]
        store: bool,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_PROJECT_KEY)]
        project: String,
    },
    /// Append respondent records (and optionally the survey definition) to the store
    Submit {
        /// JSON record or array of records
        #[arg(long)]
        records: PathBuf,
        #[arg(long)]
        hierarchy: Option<PathBuf>,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long, default_value = DEFAULT_PROJECT_KEY)]
        project: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Aggregate stored responses of one survey
    Aggregate {
        #[arg(long)]
        goal: String,
        #[arg(long, default_value = DEFAULT_PROJECT_KEY)]
        project: String,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Overrides the stored survey definition
        #[arg(long)]
        hierarchy: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value = "json")]
        format: String,
        #[arg(long, default_value_t = 20)]
        top_n: usize,
    },
    /// Export stored responses of one survey to JSONL
    Export {
        #[arg(long)]
        goal: String,
        #[arg(long, default_value = DEFAULT_PROJECT_KEY)]
        project: String,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// List surveys of a project
    Surveys {
        #[arg(long, default_value = DEFAULT_PROJECT_KEY)]
        project: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Delete a survey and all of its responses
    Reset {
        #[arg(long)]
        goal: String,
        #[arg(long, default_value = DEFAULT_PROJECT_KEY)]
        project: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    survey: SurveyConfig,
    aggregator: AggregatorConfig,
}

impl CliConfig {
    /// Records written under a custom main-group label must still be found
    /// by the aggregator.
    fn linked(self) -> Self {
        let aggregator = self
            .aggregator
            .with_main_group_label(&self.survey.labels.main_group_label);
        Self {
            survey: self.survey,
            aggregator,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ReplayStep {
    Ranks { ranks: Vec<usize> },
    Judge { pair: usize, judgment: i32 },
    Resolve { resolution: InversionResolution },
    ApplyRecommendation,
    Previous,
    ResetRanks,
    CompleteGroup,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Serialize)]
struct PairView {
    index: usize,
    first: String,
    second: String,
    first_position: usize,
    second_position: usize,
}

#[derive(Debug, Serialize)]
struct GroupWeights {
    label: String,
    items: Vec<String>,
    weights: Vec<f64>,
    ranks: Vec<usize>,
    lambda_max: f64,
    cr: f64,
    consistent: bool,
}

#[derive(Debug, Serialize)]
struct GroupView {
    label: String,
    parent: Option<String>,
    items: Vec<String>,
    pairs: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let config: CliConfig = match &cli.config {
        Some(path) => read_json::<CliConfig>(path)?.linked(),
        None => CliConfig::default(),
    };

    match cli.command {
        Commands::Validate { hierarchy } => {
            let hierarchy: Hierarchy = read_json(&hierarchy)?;
            hierarchy.validate()?;
            let groups: Vec<GroupView> = hierarchy
                .comparison_groups(&config.survey.labels)
                .into_iter()
                .map(|g| GroupView {
                    pairs: ahp_harness::sequencer::pair_count(g.len()),
                    label: g.label,
                    parent: g.parent,
                    items: g.items,
                })
                .collect();
            print_json(&groups)?;
        }
        Commands::Pairs { items, ranks } => {
            let ranks = if ranks.is_empty() {
                RankAssignment::identity(items.len())
            } else {
                if ranks.len() != items.len() {
                    return Err(format!(
                        "got {} ranks for {} items",
                        ranks.len(),
                        items.len()
                    )
                    .into());
                }
                RankAssignment::new(ranks)?
            };
            let pairs: Vec<PairView> = build_pairs(&ranks)
                .into_iter()
                .map(|p| PairView {
                    index: p.index,
                    first: items[p.first].clone(),
                    second: items[p.second].clone(),
                    first_position: p.first_position,
                    second_position: p.second_position,
                })
                .collect();
            print_json(&pairs)?;
        }
        Commands::Weights { answers, out } => {
            let raw_data = std::fs::read_to_string(&answers)?;
            let raw = RawRecord {
                response_id: None,
                respondent: String::new(),
                submitted_at: String::new(),
                raw_data,
            };
            let parsed = ParsedRecord::parse(&raw)?;
            let agg = &config.aggregator;
            let mut groups = Vec::with_capacity(parsed.groups.len());
            for group in &parsed.groups {
                let matrix = group.matrix(&agg.scale, agg.snap_tolerance)?;
                let eval = evaluate(&matrix, &agg.engine);
                groups.push(GroupWeights {
                    label: group.label.clone(),
                    items: group.items.clone(),
                    consistent: eval.is_consistent(&agg.engine),
                    lambda_max: eval.consistency.lambda_max,
                    cr: eval.cr(),
                    weights: eval.weights,
                    ranks: eval.ranks,
                });
            }
            write_output(out.as_ref(), &groups)?;
        }
        Commands::Replay {
            hierarchy,
            script,
            respondent,
            out,
            trace,
        } => {
            let hierarchy: Hierarchy = read_json(&hierarchy)?;
            let steps: Vec<ReplayStep> = read_json(&script)?;
            let (sink, worker) = match trace {
                Some(path) => {
                    let (sink, worker) = JsonlTraceSink::new(path)?;
                    (Some(sink), Some(worker))
                }
                None => (None, None),
            };
            let record = replay(hierarchy, steps, &respondent, sink.as_ref(), &config.survey);
            drop(sink);
            if let Some(worker) = worker {
                let summary = worker.join()?;
                info!(
                    judgments = summary.judgments,
                    contested = summary.contested,
                    groups = summary.groups,
                    "trace written"
                );
            }
            write_output(out.as_ref(), &record?)?;
        }
        Commands::Simulate {
            hierarchy,
            truth,
            respondents,
            noise_sigma,
            seed,
            inconsistent_share,
            out,
            store,
            db,
            project,
        } => {
            let hierarchy: Hierarchy = read_json(&hierarchy)?;
            let truth: BTreeMap<String, f64> = match truth {
                Some(path) => read_json(&path)?,
                None => BTreeMap::new(),
            };
            let sim = SimulationConfig {
                respondents,
                noise_sigma,
                seed,
                inconsistent_share,
            };
            let records = simulate_respondents(&hierarchy, &truth, &sim, &config.survey)?;
            if store {
                let store = open_store(db)?;
                let key = SurveyKey::new(&project, &hierarchy.goal);
                store.save_hierarchy(&key, &hierarchy).await?;
                for record in &records {
                    store.append(&key, record).await?;
                }
                info!(survey = %key.short_id(), count = records.len(), "simulated records stored");
            }
            write_output(out.as_ref(), &records)?;
        }
        Commands::Submit {
            records,
            hierarchy,
            goal,
            project,
            db,
        } => {
            let records: OneOrMany<RespondentRecord> = read_json(&records)?;
            let hierarchy: Option<Hierarchy> = match hierarchy {
                Some(path) => Some(read_json(&path)?),
                None => None,
            };
            let goal = goal
                .or_else(|| hierarchy.as_ref().map(|h| h.goal.clone()))
                .ok_or("submit requires --goal or --hierarchy")?;
            let store = open_store(db)?;
            let key = SurveyKey::new(&project, &goal);
            if let Some(hierarchy) = &hierarchy {
                hierarchy.validate()?;
                store.save_hierarchy(&key, hierarchy).await?;
            }
            let records = records.into_vec();
            for record in &records {
                store.append(&key, record).await?;
            }
            println!("stored {} record(s) for survey {}", records.len(), key.short_id());
        }
        Commands::Aggregate {
            goal,
            project,
            db,
            hierarchy,
            out,
            format,
            top_n,
        } => {
            let store = open_store(db)?;
            let key = SurveyKey::new(&project, &goal);
            let hierarchy: Option<Hierarchy> = match hierarchy {
                Some(path) => Some(read_json(&path)?),
                None => store.load_hierarchy(&key).await?,
            };
            let records = store.load(&key).await?;
            let report = aggregate(&records, hierarchy.as_ref(), &config.aggregator);
            match format.as_str() {
                "json" => write_output(out.as_ref(), &report)?,
                "md" => {
                    let md = render_report_markdown(&report, top_n);
                    match out {
                        Some(path) => std::fs::write(path, md)?,
                        None => print!("{md}"),
                    }
                }
                other => return Err(format!("unknown format '{other}' (json|md)").into()),
            }
        }
        Commands::Export {
            goal,
            project,
            db,
            out,
        } => {
            let store = open_store(db)?;
            let key = SurveyKey::new(&project, &goal);
            let count = store.export_jsonl(&key, out).await?;
            println!("exported {count} record(s)");
        }
        Commands::Surveys { project, db } => {
            let store = open_store(db)?;
            let surveys = store.list_surveys(&project).await?;
            print_json(&surveys)?;
        }
        Commands::Reset { goal, project, db } => {
            let store = open_store(db)?;
            let _lock = store.lock_exclusive()?;
            let key = SurveyKey::new(&project, &goal);
            let removed = store.delete_survey(&key).await?;
            println!("deleted {removed} record(s) for survey {}", key.short_id());
        }
    }

    Ok(())
}

fn replay(
    hierarchy: Hierarchy,
    steps: Vec<ReplayStep>,
    respondent: &str,
    sink: Option<&JsonlTraceSink>,
    cfg: &SurveyConfig,
) -> Result<RespondentRecord, Box<dyn std::error::Error>> {
    let mut survey = SurveySession::new(hierarchy, cfg)?;
    let mut warning: Option<ConsistencyWarning> = None;
    let mut last_trace: Option<JudgmentTrace> = None;

    for (idx, step) in steps.into_iter().enumerate() {
        survey = match step {
            ReplayStep::Ranks { ranks } => survey.set_ranks(ranks)?,
            ReplayStep::Judge { pair, judgment } => {
                let outcome = survey.submit_judgment(pair, judgment, cfg)?;
                warning = outcome.live.warning.clone();
                let trace = outcome.survey.active().and_then(|active| {
                    JudgmentTrace::from_outcome(respondent, active, pair, judgment, &outcome.live)
                });
                match (&trace, sink) {
                    (Some(event), Some(sink)) if outcome.live.committed => {
                        sink.record_judgment(event.clone())?
                    }
                    _ => {}
                }
                last_trace = if outcome.live.committed { None } else { trace };
                outcome.survey
            }
            ReplayStep::Resolve { resolution } => {
                if let (Some(event), Some(sink)) = (last_trace.take(), sink) {
                    sink.record_judgment(event.with_resolution(resolution))?;
                }
                survey.resolve(resolution, cfg)?
            }
            ReplayStep::ApplyRecommendation => {
                let Some(w) = warning.take() else {
                    return Err(format!("step {idx}: no recommendation to apply").into());
                };
                last_trace = None;
                survey.apply_recommendation(&w.recommendation, cfg)?.survey
            }
            ReplayStep::Previous => survey.previous()?,
            ReplayStep::ResetRanks => survey.reset_ranks()?,
            ReplayStep::CompleteGroup => {
                let next = survey.complete_group(cfg)?;
                if let (Some(sink), Some(finished)) = (sink, survey.active()) {
                    sink.record_group(GroupTrace::from_session(respondent, finished, &cfg.engine))?;
                }
                next
            }
        };
    }

    if survey.step() != SurveyStep::Finished {
        return Err(format!("script ended in the {:?} step", survey.step()).into());
    }
    Ok(survey.finish(respondent)?)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteResponseStore, Box<dyn std::error::Error>> {
    let path = db.unwrap_or_else(SqliteResponseStore::default_path);
    Ok(SqliteResponseStore::new(path)?)
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{json}");
    Ok(())
}

fn write_output<T: serde::Serialize>(path: Option<&PathBuf>, value: &T) -> Result<(), io::Error> {
    match path {
        Some(path) => write_json(path, value),
        None => print_json(value),
    }
}
