use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::models::{AgentPerformanceRecord, FilterState, PeriodType};

/// One row per agent for the selected period. Weekly rows are passed through;
/// monthly rows merge an agent's entries weighted by chat volume.
pub fn aggregate(
    records: &[AgentPerformanceRecord],
    period_type: PeriodType,
    selected_period: &str,
) -> Vec<AgentPerformanceRecord> {
    match period_type {
        PeriodType::Weekly => records
            .iter()
            .filter(|record| record.week.as_deref() == Some(selected_period))
            .cloned()
            .collect(),
        PeriodType::Monthly => {
            let mut order: Vec<String> = Vec::new();
            let mut grouped: HashMap<String, AgentPerformanceRecord> = HashMap::new();

            for record in records.iter().filter(|record| record.month == selected_period) {
                match grouped.get_mut(&record.agent_id) {
                    Some(existing) => merge_into(existing, record),
                    None => {
                        order.push(record.agent_id.clone());
                        grouped.insert(record.agent_id.clone(), record.clone());
                    }
                }
            }

            order
                .iter()
                .filter_map(|agent_id| grouped.remove(agent_id))
                .collect()
        }
    }
}

pub fn aggregate_for(
    records: &[AgentPerformanceRecord],
    filter: &FilterState,
) -> Vec<AgentPerformanceRecord> {
    aggregate(records, filter.period_type, &filter.selected_period)
}

fn merge_into(existing: &mut AgentPerformanceRecord, incoming: &AgentPerformanceRecord) {
    let existing_weight = existing.number_of_chats as f64;
    let incoming_weight = incoming.number_of_chats as f64;
    let total = existing_weight + incoming_weight;

    let blend = |current: f64, next: f64| {
        if total > 0.0 {
            (current * existing_weight + next * incoming_weight) / total
        } else {
            (current + next) / 2.0
        }
    };

    existing.sl_percentage = blend(existing.sl_percentage, incoming.sl_percentage);
    existing.frt_seconds = blend(existing.frt_seconds, incoming.frt_seconds);
    existing.art_seconds = blend(existing.art_seconds, incoming.art_seconds);
    existing.aht_minutes = blend(existing.aht_minutes, incoming.aht_minutes);
    existing.number_of_chats = existing.number_of_chats.saturating_add(incoming.number_of_chats);

    if existing.image_url.is_none() {
        existing.image_url = incoming.image_url.clone();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailablePeriods {
    pub weeks: Vec<String>,
    pub months: Vec<String>,
}

/// Distinct weeks and months present in the data, newest first.
pub fn available_periods(records: &[AgentPerformanceRecord]) -> AvailablePeriods {
    let weeks: BTreeSet<&str> = records.iter().filter_map(|r| r.week.as_deref()).collect();
    let months: BTreeSet<&str> = records.iter().map(|r| r.month.as_str()).collect();

    AvailablePeriods {
        weeks: weeks.into_iter().rev().map(str::to_string).collect(),
        months: months.into_iter().rev().map(str::to_string).collect(),
    }
}

/// Fills an empty selected period with the most recent one of the filter's type.
pub fn resolve_filter(records: &[AgentPerformanceRecord], filter: &FilterState) -> FilterState {
    let mut resolved = filter.clone();
    if resolved.selected_period.trim().is_empty() {
        let periods = available_periods(records);
        let newest = match resolved.period_type {
            PeriodType::Weekly => periods.weeks.first(),
            PeriodType::Monthly => periods.months.first(),
        };
        resolved.selected_period = newest.cloned().unwrap_or_default();
    }
    resolved
}
