//! Respondent records and the `"[group] A vs B"` answer wire format.
//!
//! Raw answer maps are parsed exactly once, at the boundary, into
//! [`ParsedRecord`]; nothing downstream looks at key strings again.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AggregationError, ValidationError};
use crate::hierarchy::PAIR_SEPARATOR;
use crate::matrix::ReciprocalMatrix;
use crate::scale::SaatyScale;

pub const ANONYMOUS: &str = "anonymous";

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]*)\]\s*(.*)$").expect("Invalid pair key regex"));

pub fn pair_key(group: &str, first: &str, second: &str) -> String {
    format!("[{group}] {first}{PAIR_SEPARATOR}{second}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairKey {
    pub group: String,
    pub first: String,
    pub second: String,
}

/// Parse one answer key.
///
/// `Ok(None)` means the key is not a bracketed pair key and is ignored;
/// `Err` means it looks like one but cannot be split unambiguously.
pub fn parse_pair_key(key: &str) -> Result<Option<PairKey>, String> {
    let Some(caps) = KEY_PATTERN.captures(key.trim()) else {
        return Ok(None);
    };
    let group = caps[1].trim().to_string();
    let rest = &caps[2];
    let parts: Vec<&str> = rest.split(PAIR_SEPARATOR).collect();
    match parts.as_slice() {
        [_] => Ok(None),
        [first, second] => {
            let (first, second) = (first.trim(), second.trim());
            if first.is_empty() || second.is_empty() {
                return Err(format!("empty item name in key '{key}'"));
            }
            if first == second {
                return Err(format!("self comparison in key '{key}'"));
            }
            Ok(Some(PairKey {
                group,
                first: first.to_string(),
                second: second.to_string(),
            }))
        }
        _ => Err(format!(
            "key '{key}' contains the separator '{}' more than once",
            PAIR_SEPARATOR.trim()
        )),
    }
}

/// One completed survey submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondentRecord {
    pub response_id: Uuid,
    pub respondent: String,
    pub submitted_at: DateTime<Utc>,
    /// `"[group] A vs B"` -> ratio of A to B.
    pub answers: BTreeMap<String, f64>,
}

impl RespondentRecord {
    pub fn new(respondent: &str, answers: BTreeMap<String, f64>) -> Self {
        let respondent = respondent.trim();
        Self {
            response_id: Uuid::new_v4(),
            respondent: if respondent.is_empty() {
                ANONYMOUS.to_string()
            } else {
                respondent.to_string()
            },
            submitted_at: Utc::now(),
            answers,
        }
    }

    pub fn to_raw(&self) -> Result<RawRecord, serde_json::Error> {
        Ok(RawRecord {
            response_id: Some(self.response_id),
            respondent: self.respondent.clone(),
            submitted_at: self.submitted_at.to_rfc3339(),
            raw_data: serde_json::to_string(&self.answers)?,
        })
    }
}

/// Stored form of a submission; `raw_data` is unvalidated JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub response_id: Option<Uuid>,
    pub respondent: String,
    pub submitted_at: String,
    pub raw_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedEntry {
    pub first: usize,
    pub second: usize,
    pub weight: f64,
}

/// All judgments of one respondent in one sibling group.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGroup {
    pub label: String,
    /// Items in first-seen order; indices used by `entries`.
    pub items: Vec<String>,
    pub entries: Vec<ParsedEntry>,
}

impl ParsedGroup {
    fn new(label: String) -> Self {
        Self {
            label,
            items: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn item_index(&mut self, name: &str) -> usize {
        match self.items.iter().position(|item| item == name) {
            Some(idx) => idx,
            None => {
                self.items.push(name.to_string());
                self.items.len() - 1
            }
        }
    }

    /// Reciprocal matrix of this group; weights are optionally snapped back
    /// onto exact scale ratios first.
    pub fn matrix(
        &self,
        scale: &SaatyScale,
        snap_tolerance: Option<f64>,
    ) -> Result<ReciprocalMatrix, ValidationError> {
        let mut matrix = ReciprocalMatrix::identity(self.items.len());
        for entry in &self.entries {
            let weight = match snap_tolerance {
                Some(tol) => scale.snap(entry.weight, tol),
                None => entry.weight,
            };
            matrix.set_weight(entry.first, entry.second, weight)?;
        }
        Ok(matrix)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub response_id: Option<Uuid>,
    pub respondent: String,
    pub submitted_at: String,
    /// Groups in first-seen key order.
    pub groups: Vec<ParsedGroup>,
    /// Keys that were not bracketed pair keys.
    pub skipped_keys: Vec<String>,
}

fn value_to_weight(value: &Value) -> Result<f64, String> {
    let weight = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("unrepresentable number {n}"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number"))?,
        other => return Err(format!("unexpected value {other}")),
    };
    if !weight.is_finite() || weight <= 0.0 {
        return Err(format!("ratio {weight} must be positive and finite"));
    }
    Ok(weight)
}

impl ParsedRecord {
    pub fn parse(raw: &RawRecord) -> Result<Self, AggregationError> {
        let respondent = if raw.respondent.trim().is_empty() {
            ANONYMOUS.to_string()
        } else {
            raw.respondent.clone()
        };
        let malformed = |reason: String| AggregationError::MalformedRecord {
            respondent: respondent.clone(),
            reason,
        };

        let data: serde_json::Map<String, Value> =
            serde_json::from_str(&raw.raw_data).map_err(|e| malformed(e.to_string()))?;

        let mut parsed = ParsedRecord {
            response_id: raw.response_id,
            respondent: respondent.clone(),
            submitted_at: raw.submitted_at.clone(),
            groups: Vec::new(),
            skipped_keys: Vec::new(),
        };

        for (key, value) in &data {
            let Some(pair) = parse_pair_key(key).map_err(malformed)? else {
                debug!(respondent = %respondent, key = %key, "skipping non-pair answer key");
                parsed.skipped_keys.push(key.clone());
                continue;
            };
            let weight = value_to_weight(value).map_err(|reason| malformed(format!("{key}: {reason}")))?;
            let group = match parsed.groups.iter().position(|g| g.label == pair.group) {
                Some(idx) => &mut parsed.groups[idx],
                None => {
                    parsed.groups.push(ParsedGroup::new(pair.group.clone()));
                    let last = parsed.groups.len() - 1;
                    &mut parsed.groups[last]
                }
            };
            let first = group.item_index(&pair.first);
            let second = group.item_index(&pair.second);
            group.entries.push(ParsedEntry {
                first,
                second,
                weight,
            });
        }
        Ok(parsed)
    }

    pub fn group_labels(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.label.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(data: &str) -> RawRecord {
        RawRecord {
            response_id: None,
            respondent: "kim".to_string(),
            submitted_at: "2026-01-01T00:00:00+00:00".to_string(),
            raw_data: data.to_string(),
        }
    }

    #[test]
    fn pair_keys_round_trip_through_the_parser() {
        let key = pair_key("Main criteria", "Cost", "Safety");
        assert_eq!(key, "[Main criteria] Cost vs Safety");
        let parsed = parse_pair_key(&key).unwrap().unwrap();
        assert_eq!(parsed.group, "Main criteria");
        assert_eq!(parsed.first, "Cost");
        assert_eq!(parsed.second, "Safety");
    }

    #[test]
    fn non_pair_keys_are_skipped_and_ambiguous_keys_rejected() {
        assert_eq!(parse_pair_key("comment").unwrap(), None);
        assert_eq!(parse_pair_key("[g] no separator").unwrap(), None);
        assert!(parse_pair_key("[g] a vs b vs c").is_err());
        assert!(parse_pair_key("[g] a vs a").is_err());
    }

    #[test]
    fn parse_groups_entries_and_accepts_numeric_strings() {
        let record = ParsedRecord::parse(&raw(
            r#"{"[Main criteria] Cost vs Safety": 0.25, "[Main criteria] Cost vs Comfort": "2", "note": "x"}"#,
        ))
        .unwrap();
        assert_eq!(record.groups.len(), 1);
        let group = &record.groups[0];
        assert_eq!(group.items, vec!["Cost", "Comfort", "Safety"]);
        assert_eq!(group.entries.len(), 2);
        assert_eq!(record.skipped_keys, vec!["note".to_string()]);

        let m = group.matrix(&SaatyScale::default(), None).unwrap();
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.get(2, 0), 4.0);
    }

    #[test]
    fn malformed_payloads_are_reported_per_respondent() {
        let err = ParsedRecord::parse(&raw("not json")).unwrap_err();
        assert_eq!(err.respondent(), "kim");
        assert_eq!(err.code(), "malformed_record");

        assert!(ParsedRecord::parse(&raw(r#"{"[g] a vs b": -2}"#)).is_err());
        assert!(ParsedRecord::parse(&raw(r#"{"[g] a vs b": true}"#)).is_err());
        assert!(ParsedRecord::parse(&raw("[1, 2]")).is_err());
    }

    #[test]
    fn record_serializes_answers_as_json_text() {
        let mut answers = BTreeMap::new();
        answers.insert(pair_key("g", "a", "b"), 3.0);
        let record = RespondentRecord::new("  ", answers);
        assert_eq!(record.respondent, ANONYMOUS);
        let raw = record.to_raw().unwrap();
        assert_eq!(raw.raw_data, r#"{"[g] a vs b":3.0}"#);
        let parsed = ParsedRecord::parse(&raw).unwrap();
        assert_eq!(parsed.response_id, Some(record.response_id));
    }
}
