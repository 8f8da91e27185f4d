use serde::Serialize;

use crate::models::AgentPerformanceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    /// Service level target, percent (at least).
    pub sl: f64,
    /// First response target, seconds (at most).
    pub frt: f64,
    /// Average response target, seconds (at most).
    pub art: f64,
    /// Handle time target, minutes (at most).
    pub aht: f64,
}

pub const THRESHOLDS: Thresholds = Thresholds {
    sl: 95.0,
    frt: 30.0,
    art: 30.0,
    aht: 6.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Ok,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Amber,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Metric {
    #[serde(rename = "SL")]
    ServiceLevel,
    #[serde(rename = "FRT")]
    FirstResponse,
    #[serde(rename = "ART")]
    AverageResponse,
    #[serde(rename = "AHT")]
    HandleTime,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::ServiceLevel,
        Metric::FirstResponse,
        Metric::AverageResponse,
        Metric::HandleTime,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Metric::ServiceLevel => "SL",
            Metric::FirstResponse => "FRT",
            Metric::AverageResponse => "ART",
            Metric::HandleTime => "AHT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::ServiceLevel => "Service Level",
            Metric::FirstResponse => "First Response",
            Metric::AverageResponse => "Avg Response",
            Metric::HandleTime => "Handle Time",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Metric::ServiceLevel => Direction::HigherIsBetter,
            _ => Direction::LowerIsBetter,
        }
    }

    pub fn threshold(self, thresholds: &Thresholds) -> f64 {
        match self {
            Metric::ServiceLevel => thresholds.sl,
            Metric::FirstResponse => thresholds.frt,
            Metric::AverageResponse => thresholds.art,
            Metric::HandleTime => thresholds.aht,
        }
    }

    pub fn value(self, record: &AgentPerformanceRecord) -> f64 {
        match self {
            Metric::ServiceLevel => record.sl_percentage,
            Metric::FirstResponse => record.frt_seconds,
            Metric::AverageResponse => record.art_seconds,
            Metric::HandleTime => record.aht_minutes,
        }
    }

    pub fn status(self, record: &AgentPerformanceRecord) -> MetricStatus {
        status_of(self.value(record), self.threshold(&THRESHOLDS), self.direction())
    }

    pub fn color(self, record: &AgentPerformanceRecord) -> StatusColor {
        color_of(self.value(record), self.threshold(&THRESHOLDS), self.direction())
    }
}

pub fn status_of(value: f64, threshold: f64, direction: Direction) -> MetricStatus {
    let on_target = match direction {
        Direction::HigherIsBetter => value >= threshold,
        Direction::LowerIsBetter => value <= threshold,
    };
    if on_target {
        MetricStatus::Ok
    } else {
        MetricStatus::Warning
    }
}

/// Amber only exists for lower-is-better metrics up to 20% over target.
pub fn color_of(value: f64, threshold: f64, direction: Direction) -> StatusColor {
    match direction {
        Direction::LowerIsBetter if value <= threshold => StatusColor::Green,
        Direction::LowerIsBetter if value <= threshold * 1.2 => StatusColor::Amber,
        Direction::LowerIsBetter => StatusColor::Red,
        Direction::HigherIsBetter if value >= threshold => StatusColor::Green,
        Direction::HigherIsBetter => StatusColor::Red,
    }
}

pub fn meets_all_thresholds(record: &AgentPerformanceRecord) -> bool {
    Metric::ALL
        .iter()
        .all(|metric| metric.status(record) == MetricStatus::Ok)
}

/// Codes of the metrics that miss their target, in display order.
pub fn issues(record: &AgentPerformanceRecord) -> Vec<&'static str> {
    Metric::ALL
        .iter()
        .filter(|metric| metric.status(record) == MetricStatus::Warning)
        .map(|metric| metric.code())
        .collect()
}

pub fn composite_score(record: &AgentPerformanceRecord) -> u32 {
    if meets_all_thresholds(record) {
        return 100;
    }

    let t = &THRESHOLDS;
    let mut score = (record.number_of_chats as f64 / 2.0).min(50.0);

    if record.sl_percentage >= t.sl {
        score += 20.0;
    } else if record.sl_percentage >= t.sl - 5.0 {
        score += 10.0;
    }

    if record.art_seconds <= t.art {
        score += 15.0;
    } else if record.art_seconds <= t.art + 10.0 {
        score += 5.0;
    }

    if record.aht_minutes <= t.aht {
        score += 15.0;
    } else if record.aht_minutes <= t.aht + 1.0 {
        score += 5.0;
    }

    score.round().min(100.0) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricInsight {
    pub metric: Metric,
    pub label: &'static str,
    pub value: f64,
    pub target: f64,
    pub is_good: bool,
    pub higher_is_better: bool,
    pub color: StatusColor,
}

pub fn insights(record: &AgentPerformanceRecord) -> Vec<MetricInsight> {
    Metric::ALL
        .iter()
        .map(|&metric| MetricInsight {
            metric,
            label: metric.label(),
            value: metric.value(record),
            target: metric.threshold(&THRESHOLDS),
            is_good: metric.status(record) == MetricStatus::Ok,
            higher_is_better: metric.direction() == Direction::HigherIsBetter,
            color: metric.color(record),
        })
        .collect()
}
