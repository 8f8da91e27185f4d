use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate_for, available_periods, resolve_filter, AvailablePeriods};
use crate::models::{AgentPerformanceRecord, FilterState, PeriodType, ALL_ROLES};
use crate::scoring::{self, Metric, MetricInsight, StatusColor};

const PODIUM_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    NumberOfChats,
    SlPercentage,
    FrtSeconds,
    ArtSeconds,
    AhtMinutes,
    AgentName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricColors {
    pub sl: StatusColor,
    pub frt: StatusColor,
    pub art: StatusColor,
    pub aht: StatusColor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRow {
    pub rank: usize,
    pub record: AgentPerformanceRecord,
    pub eligible: bool,
    pub score: u32,
    pub issues: Vec<&'static str>,
    pub colors: MetricColors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardView {
    pub filter: FilterState,
    pub sort: SortOrder,
    pub periods: AvailablePeriods,
    pub top_performers: Vec<RankedRow>,
    pub rows: Vec<RankedRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetail {
    pub period_type: PeriodType,
    pub period: String,
    pub record: AgentPerformanceRecord,
    pub eligible: bool,
    pub score: u32,
    pub strengths: Vec<MetricInsight>,
    pub weaknesses: Vec<MetricInsight>,
}

fn matches_role(record: &AgentPerformanceRecord, role: &str) -> bool {
    role.is_empty() || role == ALL_ROLES || record.role == role
}

fn matches_search(record: &AgentPerformanceRecord, query: &str) -> bool {
    record
        .agent_name
        .to_lowercase()
        .contains(&query.trim().to_lowercase())
}

fn compare_field(
    a: &AgentPerformanceRecord,
    b: &AgentPerformanceRecord,
    field: SortField,
) -> Ordering {
    let metric = match field {
        SortField::NumberOfChats => return a.number_of_chats.cmp(&b.number_of_chats),
        SortField::AgentName => return a.agent_name.cmp(&b.agent_name),
        SortField::SlPercentage => Metric::ServiceLevel,
        SortField::FrtSeconds => Metric::FirstResponse,
        SortField::ArtSeconds => Metric::AverageResponse,
        SortField::AhtMinutes => Metric::HandleTime,
    };
    metric
        .value(a)
        .partial_cmp(&metric.value(b))
        .unwrap_or(Ordering::Equal)
}

/// Eligible agents first, then the chosen field and direction. Stable.
pub fn sort_rows(rows: &mut [AgentPerformanceRecord], order: SortOrder) {
    rows.sort_by(|a, b| {
        let eligibility = scoring::meets_all_thresholds(b).cmp(&scoring::meets_all_thresholds(a));
        eligibility.then_with(|| {
            let ordering = compare_field(a, b, order.field);
            match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        })
    });
}

fn ranked(records: Vec<AgentPerformanceRecord>) -> Vec<RankedRow> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| RankedRow {
            rank: index + 1,
            eligible: scoring::meets_all_thresholds(&record),
            score: scoring::composite_score(&record),
            issues: scoring::issues(&record),
            colors: MetricColors {
                sl: Metric::ServiceLevel.color(&record),
                frt: Metric::FirstResponse.color(&record),
                art: Metric::AverageResponse.color(&record),
                aht: Metric::HandleTime.color(&record),
            },
            record,
        })
        .collect()
}

/// Leaderboard rows: period, role and name-search filtered, then ranked.
pub fn rank(
    records: &[AgentPerformanceRecord],
    filter: &FilterState,
    order: SortOrder,
) -> Vec<RankedRow> {
    let mut rows: Vec<AgentPerformanceRecord> = aggregate_for(records, filter)
        .into_iter()
        .filter(|record| matches_role(record, &filter.role))
        .filter(|record| matches_search(record, &filter.search_query))
        .collect();
    sort_rows(&mut rows, order);
    ranked(rows)
}

/// The podium ignores the search box: role filter only, eligible first,
/// then chat volume, then the lower handle time.
pub fn top_performers(
    records: &[AgentPerformanceRecord],
    filter: &FilterState,
) -> Vec<RankedRow> {
    let mut rows: Vec<AgentPerformanceRecord> = aggregate_for(records, filter)
        .into_iter()
        .filter(|record| matches_role(record, &filter.role))
        .collect();

    rows.sort_by(|a, b| {
        scoring::meets_all_thresholds(b)
            .cmp(&scoring::meets_all_thresholds(a))
            .then_with(|| b.number_of_chats.cmp(&a.number_of_chats))
            .then_with(|| {
                a.aht_minutes
                    .partial_cmp(&b.aht_minutes)
                    .unwrap_or(Ordering::Equal)
            })
    });
    rows.truncate(PODIUM_SIZE);
    ranked(rows)
}

pub fn build_view(
    records: &[AgentPerformanceRecord],
    filter: &FilterState,
    order: SortOrder,
) -> LeaderboardView {
    let filter = resolve_filter(records, filter);
    LeaderboardView {
        periods: available_periods(records),
        top_performers: top_performers(records, &filter),
        rows: rank(records, &filter, order),
        sort: order,
        filter,
    }
}

pub fn agent_detail(
    records: &[AgentPerformanceRecord],
    filter: &FilterState,
    agent_id: &str,
) -> Option<AgentDetail> {
    let filter = resolve_filter(records, filter);
    let record = aggregate_for(records, &filter)
        .into_iter()
        .find(|record| record.agent_id == agent_id)?;

    let (strengths, weaknesses): (Vec<_>, Vec<_>) = scoring::insights(&record)
        .into_iter()
        .partition(|insight| insight.is_good);

    Some(AgentDetail {
        period_type: filter.period_type,
        period: filter.selected_period,
        eligible: scoring::meets_all_thresholds(&record),
        score: scoring::composite_score(&record),
        strengths,
        weaknesses,
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(agent_id: &str, name: &str, chats: u64, sl: f64, aht: f64) -> AgentPerformanceRecord {
        AgentPerformanceRecord::from_json(json!({
            "id": format!("{agent_id}-2025-W45"),
            "agentId": agent_id,
            "agentName": name,
            "week": "2025-W45",
            "month": "2025-11",
            "numberOfChats": chats,
            "slPercentage": sl,
            "frtSeconds": 20.0,
            "artSeconds": 20.0,
            "ahtMinutes": aht
        }))
        .expect("valid record")
    }

    fn sample() -> Vec<AgentPerformanceRecord> {
        vec![
            record("A1", "Avery Lee", 40, 97.0, 5.0),
            record("J2", "Jules Moreno", 120, 90.0, 5.0),
            record("K3", "Kiara Patel", 60, 99.0, 4.0),
            record("M4", "Morgan Diaz", 60, 96.0, 3.5),
        ]
    }

    fn monthly() -> FilterState {
        FilterState {
            selected_period: "2025-11".into(),
            ..FilterState::default()
        }
    }

    #[test]
    fn eligible_agents_rank_above_higher_volume() {
        let rows = rank(&sample(), &monthly(), SortOrder::default());
        let order: Vec<_> = rows.iter().map(|r| r.record.agent_id.as_str()).collect();
        assert_eq!(order, vec!["K3", "M4", "A1", "J2"]);
        assert_eq!(rows[0].rank, 1);
        assert!(!rows[3].eligible);
        assert_eq!(rows[3].issues, vec!["SL"]);
    }

    #[test]
    fn ascending_sort_on_a_metric() {
        let order = SortOrder {
            field: SortField::AhtMinutes,
            direction: SortDirection::Asc,
        };
        let rows = rank(&sample(), &monthly(), order);
        let ids: Vec<_> = rows.iter().map(|r| r.record.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["M4", "K3", "A1", "J2"]);
    }

    #[test]
    fn search_and_role_filters_apply() {
        let mut filter = monthly();
        filter.search_query = "  MORENO".into();
        let rows = rank(&sample(), &filter, SortOrder::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.agent_id, "J2");

        filter.search_query.clear();
        filter.role = "Tier 2".into();
        assert!(rank(&sample(), &filter, SortOrder::default()).is_empty());
    }

    #[test]
    fn podium_breaks_volume_ties_on_handle_time() {
        let mut filter = monthly();
        filter.search_query = "nobody matches".into();
        let podium = top_performers(&sample(), &filter);
        let ids: Vec<_> = podium.iter().map(|r| r.record.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["M4", "K3", "A1"]);
    }

    #[test]
    fn view_resolves_default_period() {
        let view = build_view(&sample(), &FilterState::default(), SortOrder::default());
        assert_eq!(view.filter.selected_period, "2025-11");
        assert_eq!(view.periods.weeks, vec!["2025-W45"]);
        assert_eq!(view.rows.len(), 4);
        assert_eq!(view.top_performers.len(), 3);
    }

    #[test]
    fn agent_detail_reports_strengths_and_weaknesses() {
        let detail = agent_detail(&sample(), &monthly(), "J2").expect("agent present");
        assert!(!detail.eligible);
        assert_eq!(detail.weaknesses.len(), 1);
        assert_eq!(detail.weaknesses[0].metric, Metric::ServiceLevel);
        assert_eq!(detail.strengths.len(), 3);

        assert!(agent_detail(&sample(), &monthly(), "nobody").is_none());
    }
}
