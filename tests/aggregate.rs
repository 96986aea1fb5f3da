use std::collections::BTreeMap;

use ahp_harness::aggregate::{aggregate, AggregatorConfig};
use ahp_harness::hierarchy::Hierarchy;
use ahp_harness::record::{RawRecord, RespondentRecord};
use ahp_harness::session::{SurveyConfig, SurveySession};
use ahp_harness::simulate::{simulate_respondents, SimulationConfig};

fn hierarchy() -> Hierarchy {
    let mut sub = BTreeMap::new();
    sub.insert(
        "Cost".to_string(),
        vec!["Price".to_string(), "Fuel".to_string(), "Insurance".to_string()],
    );
    Hierarchy {
        goal: "Choose a car".to_string(),
        main_criteria: vec!["Cost".to_string(), "Safety".to_string()],
        sub_criteria: sub,
    }
}

fn raw(respondent: &str, data: &str) -> RawRecord {
    RawRecord {
        response_id: None,
        respondent: respondent.to_string(),
        submitted_at: "2026-03-01T10:00:00+00:00".to_string(),
        raw_data: data.to_string(),
    }
}

fn consistent() -> RawRecord {
    raw(
        "ana",
        r#"{
            "[Main criteria] Cost vs Safety": 0.333,
            "[Cost sub-criteria] Price vs Fuel": 2,
            "[Cost sub-criteria] Price vs Insurance": 4,
            "[Cost sub-criteria] Fuel vs Insurance": 2
        }"#,
    )
}

fn inconsistent() -> RawRecord {
    raw(
        "ben",
        r#"{
            "[Main criteria] Cost vs Safety": 1,
            "[Cost sub-criteria] Price vs Fuel": 5,
            "[Cost sub-criteria] Fuel vs Insurance": 5,
            "[Cost sub-criteria] Price vs Insurance": 0.2
        }"#,
    )
}

#[test]
fn invalid_respondents_are_reported_but_excluded_from_ranking() {
    let records = vec![
        consistent(),
        inconsistent(),
        raw("cy", r#"{"[Cost sub-criteria] Price vs Fuel": 2}"#),
        raw("dee", "not json"),
    ];
    let h = hierarchy();
    let report = aggregate(&records, Some(&h), &AggregatorConfig::default());

    assert_eq!(report.status.len(), 4);
    let valid: Vec<bool> = report.status.iter().map(|s| s.valid).collect();
    assert_eq!(valid, vec![true, false, false, false]);
    assert!(report.status[0].cr.unwrap() < 1e-9);
    assert!(report.status[1].cr.unwrap() > 0.1);
    assert_eq!(report.status[1].error_code, None);
    assert_eq!(report.status[2].error_code.as_deref(), Some("missing_main_group"));
    assert_eq!(report.status[3].error_code.as_deref(), Some("malformed_record"));
    assert_eq!(report.status[3].respondent, "dee");
    assert_eq!(report.status[3].index, 4);

    // the remaining valid respondent still produces a ranking
    let names: Vec<(&str, &str)> = report
        .ranking
        .iter()
        .map(|r| (r.parent.as_str(), r.child.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("Safety", "Safety"),
            ("Cost", "Price"),
            ("Cost", "Fuel"),
            ("Cost", "Insurance")
        ]
    );
    assert!((report.ranking[0].composite_weight - 0.75).abs() < 1e-9);
    assert!((report.ranking[1].composite_weight - 0.25 * 4.0 / 7.0).abs() < 1e-9);
    assert_eq!(
        report.ranking.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(report.ranking.iter().all(|r| r.respondents == 1));
}

#[test]
fn composite_weight_is_parent_times_child() {
    let h = hierarchy();
    let report = aggregate(&[consistent()], Some(&h), &AggregatorConfig::default());
    assert_eq!(report.details.len(), 4);
    for row in &report.details {
        assert_eq!(row.composite_weight, row.parent_weight * row.child_weight);
        assert_eq!(row.respondent, "ana");
    }
    let total: f64 = report.details.iter().map(|r| r.composite_weight).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn group_ranking_averages_valid_respondents() {
    let h = Hierarchy {
        goal: "Lunch".to_string(),
        main_criteria: vec!["Taste".to_string(), "Price".to_string()],
        sub_criteria: BTreeMap::new(),
    };
    let records = vec![
        raw("a", r#"{"[Main criteria] Taste vs Price": 1}"#),
        raw("b", r#"{"[Main criteria] Taste vs Price": "3"}"#),
    ];
    let report = aggregate(&records, Some(&h), &AggregatorConfig::default());
    assert_eq!(report.valid_count(), 2);
    assert_eq!(report.ranking[0].child, "Taste");
    assert!((report.ranking[0].composite_weight - 0.625).abs() < 1e-9);
    assert!((report.ranking[1].composite_weight - 0.375).abs() < 1e-9);
    assert_eq!(report.ranking[0].respondents, 2);
}

#[test]
fn equal_averages_share_a_rank() {
    let h = Hierarchy {
        goal: "Tie".to_string(),
        main_criteria: vec!["X".to_string(), "Y".to_string(), "Z".to_string()],
        sub_criteria: BTreeMap::new(),
    };
    let records = vec![raw(
        "a",
        r#"{"[Main criteria] X vs Y": 1, "[Main criteria] X vs Z": 2, "[Main criteria] Y vs Z": 2}"#,
    )];
    let report = aggregate(&records, Some(&h), &AggregatorConfig::default());
    let ranks: Vec<usize> = report.ranking.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 1, 3]);
}

#[test]
fn session_records_aggregate_end_to_end() {
    let cfg = SurveyConfig::default();
    let h = hierarchy();
    let mut truth = BTreeMap::new();
    truth.insert("Safety".to_string(), 2.0);
    truth.insert("Price".to_string(), 4.0);
    truth.insert("Fuel".to_string(), 2.0);
    let sim = SimulationConfig {
        respondents: 5,
        noise_sigma: 0.0,
        ..SimulationConfig::default()
    };
    let records = simulate_respondents(&h, &truth, &sim, &cfg).unwrap();
    let raws: Vec<RawRecord> = records.iter().map(|r| r.to_raw().unwrap()).collect();
    let report = aggregate(&raws, Some(&h), &AggregatorConfig::default());

    assert_eq!(report.valid_count(), 5);
    let top = &report.ranking[0];
    assert_eq!((top.parent.as_str(), top.child.as_str()), ("Safety", "Safety"));
    assert!((top.composite_weight - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(top.respondents, 5);
}

#[test]
fn single_main_criterion_carries_full_weight() {
    let mut sub = BTreeMap::new();
    sub.insert("Only".to_string(), vec!["a".to_string(), "b".to_string()]);
    let h = Hierarchy {
        goal: "Solo".to_string(),
        main_criteria: vec!["Only".to_string()],
        sub_criteria: sub,
    };
    let survey = SurveySession::new(h.clone(), &SurveyConfig::default()).unwrap();
    assert_eq!(survey.groups().len(), 1);

    let mut answers = BTreeMap::new();
    answers.insert("[Only sub-criteria] a vs b".to_string(), 3.0);
    let record = RespondentRecord::new("solo", answers).to_raw().unwrap();
    let report = aggregate(&[record], Some(&h), &AggregatorConfig::default());
    assert_eq!(report.valid_count(), 1);
    assert!((report.ranking[0].composite_weight - 0.75).abs() < 1e-9);
    assert_eq!(report.ranking[0].parent, "Only");
}
