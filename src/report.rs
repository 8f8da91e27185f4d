use std::fmt::Write;

use crate::leaderboard::{self, RankedRow, SortOrder};
use crate::models::{AgentPerformanceRecord, FilterState, PeriodType};

fn period_label(filter: &FilterState) -> String {
    let kind = match filter.period_type {
        PeriodType::Weekly => "week",
        PeriodType::Monthly => "month",
    };
    if filter.selected_period.is_empty() {
        format!("no {kind} available")
    } else {
        format!("{kind} {}", filter.selected_period)
    }
}

pub fn format_row(row: &RankedRow) -> String {
    let record = &row.record;
    let status = if row.issues.is_empty() {
        "All OK".to_string()
    } else {
        format!("Check {}", row.issues.join(", "))
    };
    format!(
        "{}. {} ({}) chats {} | SL {:.1}% | FRT {:.1}s | ART {:.1}s | AHT {:.1}m | score {} | {}",
        row.rank,
        record.agent_name,
        record.agent_id,
        record.number_of_chats,
        record.sl_percentage,
        record.frt_seconds,
        record.art_seconds,
        record.aht_minutes,
        row.score,
        status
    )
}

pub fn build_report(
    records: &[AgentPerformanceRecord],
    filter: &FilterState,
    order: SortOrder,
) -> String {
    let view = leaderboard::build_view(records, filter, order);

    let mut output = String::new();
    let role_label = if view.filter.role.is_empty() {
        "all roles"
    } else {
        view.filter.role.as_str()
    };

    let _ = writeln!(output, "# Agent Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({})",
        period_label(&view.filter),
        role_label
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");

    if view.top_performers.is_empty() {
        let _ = writeln!(output, "No data available for the selected period.");
    } else {
        for row in view.top_performers.iter() {
            let marker = if row.eligible { "" } else { " (below target)" };
            let _ = writeln!(
                output,
                "- #{} {} with {} chats{}",
                row.rank, row.record.agent_name, row.record.number_of_chats, marker
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leaderboard");

    if view.rows.is_empty() {
        let _ = writeln!(output, "No agents found matching the filters.");
    } else {
        for row in view.rows.iter() {
            let _ = writeln!(output, "{}", format_row(row));
        }
    }

    let attention: Vec<&RankedRow> = view.rows.iter().filter(|row| !row.eligible).collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");

    if attention.is_empty() {
        let _ = writeln!(output, "Every listed agent meets all targets.");
    } else {
        for row in attention {
            let _ = writeln!(
                output,
                "- {}: {}",
                row.record.agent_name,
                row.issues.join(", ")
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(agent_id: &str, name: &str, chats: u64, frt: f64) -> AgentPerformanceRecord {
        AgentPerformanceRecord::from_json(json!({
            "id": format!("{agent_id}-2025-11"),
            "agentId": agent_id,
            "agentName": name,
            "month": "2025-11",
            "numberOfChats": chats,
            "slPercentage": 96,
            "frtSeconds": frt,
            "artSeconds": 22,
            "ahtMinutes": 5
        }))
        .expect("valid record")
    }

    #[test]
    fn report_lists_podium_leaderboard_and_gaps() {
        let records = vec![
            record("A1", "Avery Lee", 40, 18.0),
            record("J2", "Jules Moreno", 90, 41.0),
        ];
        let report = build_report(&records, &FilterState::default(), SortOrder::default());

        assert!(report.contains("Generated for month 2025-11 (All)"));
        assert!(report.contains("- #1 Avery Lee with 40 chats\n"));
        assert!(report.contains("- #2 Jules Moreno with 90 chats (below target)"));
        assert!(report.contains("1. Avery Lee (A1) chats 40"));
        assert!(report.contains("Check FRT"));
        assert!(report.contains("- Jules Moreno: FRT"));
    }

    #[test]
    fn empty_data_produces_placeholders() {
        let report = build_report(&[], &FilterState::default(), SortOrder::default());
        assert!(report.contains("no month available"));
        assert!(report.contains("No data available for the selected period."));
        assert!(report.contains("No agents found matching the filters."));
        assert!(report.contains("Every listed agent meets all targets."));
    }
}
