//! Markdown rendering of aggregation output.

use crate::aggregate::AggregationReport;

fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}

pub fn render_report_markdown(report: &AggregationReport, top_n: usize) -> String {
    let mut out = String::new();
    out.push_str("# AHP Aggregation Report\n\n");
    out.push_str(&format!("- Records: {}\n", report.status.len()));
    out.push_str(&format!("- Valid respondents: {}\n", report.valid_count()));
    let excluded = report.status.len() - report.valid_count();
    out.push_str(&format!("- Excluded: {excluded}\n"));

    out.push_str("\n## Group Ranking\n\n");
    if report.ranking.is_empty() {
        out.push_str("No valid respondents.\n");
    } else {
        out.push_str("| Rank | Criterion | Sub-criterion | Weight | Respondents |\n");
        out.push_str("|---:|---|---|---:|---:|\n");
        for row in report.ranking.iter().take(top_n) {
            out.push_str(&format!(
                "| {} | {} | {} | {:.4} | {} |\n",
                row.rank,
                cell(&row.parent),
                cell(&row.child),
                row.composite_weight,
                row.respondents
            ));
        }
    }

    out.push_str("\n## Respondents\n\n");
    out.push_str("| # | Respondent | Submitted | CR | Valid | Note |\n");
    out.push_str("|---:|---|---|---:|---|---|\n");
    for status in &report.status {
        let cr = status
            .cr
            .map(|cr| format!("{cr:.4}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            status.index,
            cell(&status.respondent),
            cell(&status.submitted_at),
            cr,
            if status.valid { "yes" } else { "no" },
            cell(status.error.as_deref().unwrap_or("")),
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{GroupRankingRow, RespondentStatus};

    #[test]
    fn renders_ranking_and_truncates_to_top_n() {
        let report = AggregationReport {
            status: vec![
                RespondentStatus {
                    index: 1,
                    respondent: "ana".to_string(),
                    submitted_at: "2026-01-01".to_string(),
                    cr: Some(0.01234),
                    valid: true,
                    error_code: None,
                    error: None,
                },
                RespondentStatus {
                    index: 2,
                    respondent: "bo".to_string(),
                    submitted_at: "2026-01-02".to_string(),
                    cr: None,
                    valid: false,
                    error_code: Some("malformed_record".to_string()),
                    error: Some("bad | json".to_string()),
                },
            ],
            details: Vec::new(),
            ranking: vec![
                GroupRankingRow {
                    rank: 1,
                    parent: "Safety".to_string(),
                    child: "Safety".to_string(),
                    composite_weight: 0.6,
                    respondents: 1,
                },
                GroupRankingRow {
                    rank: 2,
                    parent: "Cost".to_string(),
                    child: "Cost".to_string(),
                    composite_weight: 0.4,
                    respondents: 1,
                },
            ],
        };
        let md = render_report_markdown(&report, 1);
        assert!(md.contains("- Valid respondents: 1"));
        assert!(md.contains("| 1 | Safety | Safety | 0.6000 | 1 |"));
        assert!(!md.contains("| Cost |"));
        assert!(md.contains("0.0123"));
        assert!(md.contains("bad \\| json"));
    }
}
