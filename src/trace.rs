//! Judgment trace capture for survey sessions.
//!
//! The trace is a JSONL audit log with one line per event. Judgment lines
//! record every submission with the live weights it produced. A group line
//! closes each finished comparison group, and the writer flushes there, so
//! an interrupted survey leaves only whole groups on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::consistency::{evaluate, EngineConfig};
use crate::inversion::InversionResolution;
use crate::session::{GroupSession, LiveState};

#[derive(Debug, Clone, Serialize)]
pub struct JudgmentTrace {
    pub timestamp_ms: i64,
    pub respondent: String,
    pub group: String,
    pub pair_index: usize,
    pub first: String,
    pub second: String,
    pub judgment: i32,
    pub weight: f64,
    pub weights: Vec<f64>,
    pub cr: f64,
    pub inversions: usize,
    pub committed: bool,
    pub recommendation: Option<i32>,
    pub resolution: Option<InversionResolution>,
}

impl JudgmentTrace {
    /// Build a trace event from a submitted judgment and the session it produced.
    pub fn from_outcome(
        respondent: &str,
        session: &GroupSession,
        pair_index: usize,
        judgment: i32,
        live: &LiveState,
    ) -> Option<Self> {
        let pair = session.pairs().get(pair_index)?;
        let items = &session.group().items;
        Some(Self {
            timestamp_ms: now_epoch_ms(),
            respondent: respondent.to_string(),
            group: session.group().label.clone(),
            pair_index,
            first: items.get(pair.first)?.clone(),
            second: items.get(pair.second)?.clone(),
            judgment,
            weight: crate::scale::saaty_weight(judgment),
            weights: live.evaluation.weights.clone(),
            cr: live.evaluation.cr(),
            inversions: live.inversions.inversions.len(),
            committed: live.committed,
            recommendation: live.warning.as_ref().map(|w| w.recommendation.judgment),
            resolution: None,
        })
    }

    pub fn with_resolution(mut self, resolution: InversionResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

/// Final state of one comparison group for one respondent.
#[derive(Debug, Clone, Serialize)]
pub struct GroupTrace {
    pub timestamp_ms: i64,
    pub respondent: String,
    pub group: String,
    pub items: Vec<String>,
    pub ranks: Vec<usize>,
    pub weights: Vec<f64>,
    pub cr: f64,
    pub answered: usize,
}

impl GroupTrace {
    pub fn from_session(respondent: &str, session: &GroupSession, engine: &EngineConfig) -> Self {
        let evaluation = evaluate(session.matrix(), engine);
        Self {
            timestamp_ms: now_epoch_ms(),
            respondent: respondent.to_string(),
            group: session.group().label.clone(),
            items: session.group().items.clone(),
            ranks: session.ranks().ranks().to_vec(),
            cr: evaluation.cr(),
            weights: evaluation.weights,
            answered: session.answered_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Judgment(JudgmentTrace),
    GroupCompleted(GroupTrace),
}

/// Counts returned by [`TraceWorker::join`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub judgments: usize,
    /// Judgments that raised an inversion before being resolved.
    pub contested: usize,
    pub groups: usize,
    pub respondents: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("trace channel closed")]
    Closed,
    #[error("trace writer thread panicked")]
    Panicked,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent) -> Result<(), TraceError>;

    fn record_judgment(&self, trace: JudgmentTrace) -> Result<(), TraceError> {
        self.record(TraceEvent::Judgment(trace))
    }

    fn record_group(&self, trace: GroupTrace) -> Result<(), TraceError> {
        self.record(TraceEvent::GroupCompleted(trace))
    }
}

#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<TraceEvent>,
}

pub struct TraceWorker {
    handle: std::thread::JoinHandle<Result<TraceSummary, TraceError>>,
}

impl TraceWorker {
    /// Wait for the writer; every sink clone must be dropped first.
    pub fn join(self) -> Result<TraceSummary, TraceError> {
        self.handle.join().map_err(|_| TraceError::Panicked)?
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel();
        let handle = std::thread::spawn(move || write_events(BufWriter::new(file), receiver));
        Ok((Self { sender }, TraceWorker { handle }))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: TraceEvent) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_events<W: Write>(
    mut writer: W,
    receiver: mpsc::Receiver<TraceEvent>,
) -> Result<TraceSummary, TraceError> {
    let mut summary = TraceSummary::default();
    let mut respondents = BTreeSet::new();
    for event in receiver {
        serde_json::to_writer(&mut writer, &event)?;
        writer.write_all(b"\n")?;
        match &event {
            TraceEvent::Judgment(trace) => {
                summary.judgments += 1;
                if trace.resolution.is_some() {
                    summary.contested += 1;
                }
                respondents.insert(trace.respondent.clone());
            }
            TraceEvent::GroupCompleted(trace) => {
                summary.groups += 1;
                respondents.insert(trace.respondent.clone());
                writer.flush()?;
                debug!(respondent = %trace.respondent, group = %trace.group, "trace group flushed");
            }
        }
    }
    writer.flush()?;
    summary.respondents = respondents.len();
    Ok(summary)
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judgment(respondent: &str, resolution: Option<InversionResolution>) -> JudgmentTrace {
        JudgmentTrace {
            timestamp_ms: 0,
            respondent: respondent.to_string(),
            group: "Main criteria".to_string(),
            pair_index: 0,
            first: "Cost".to_string(),
            second: "Safety".to_string(),
            judgment: -1,
            weight: 2.0,
            weights: vec![2.0 / 3.0, 1.0 / 3.0],
            cr: 0.0,
            inversions: 0,
            committed: resolution.is_none(),
            recommendation: None,
            resolution,
        }
    }

    #[test]
    fn writer_counts_events_per_kind() {
        let (sender, receiver) = mpsc::channel();
        sender
            .send(TraceEvent::Judgment(judgment("kim", None)))
            .unwrap();
        sender
            .send(TraceEvent::Judgment(judgment(
                "lee",
                Some(InversionResolution::Revise),
            )))
            .unwrap();
        sender
            .send(TraceEvent::GroupCompleted(GroupTrace {
                timestamp_ms: 0,
                respondent: "kim".to_string(),
                group: "Main criteria".to_string(),
                items: vec!["Cost".to_string(), "Safety".to_string()],
                ranks: vec![1, 2],
                weights: vec![2.0 / 3.0, 1.0 / 3.0],
                cr: 0.0,
                answered: 1,
            }))
            .unwrap();
        drop(sender);

        let mut out = Vec::new();
        let summary = write_events(&mut out, receiver).unwrap();
        assert_eq!(
            summary,
            TraceSummary {
                judgments: 2,
                contested: 1,
                groups: 1,
                respondents: 2,
            }
        );
        let text = String::from_utf8(out).unwrap();
        let events: Vec<&str> = text
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                match value["event"].as_str().unwrap() {
                    "judgment" => "judgment",
                    "group_completed" => "group_completed",
                    other => panic!("unexpected event {other}"),
                }
            })
            .collect();
        assert_eq!(events, vec!["judgment", "judgment", "group_completed"]);
    }
}
