use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub const DEFAULT_ROLE: &str = "AHD";
pub const ALL_ROLES: &str = "All";

static LEADING_FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").expect("valid float pattern")
});
static LEADING_INT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+").expect("valid integer pattern"));

/// One agent's metrics for one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformanceRecord {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default = "default_role", deserialize_with = "role_or_default")]
    pub role: String,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub week: Option<String>,
    pub month: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub number_of_chats: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sl_percentage: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub frt_seconds: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub art_seconds: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub aht_minutes: f64,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,
    /// Columns the dashboard does not interpret, kept as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AgentPerformanceRecord {
    /// Decodes a loosely shaped JSON document and checks the required fields.
    pub fn from_json(value: Value) -> AppResult<Self> {
        let record: AgentPerformanceRecord = serde_json::from_value(value)
            .map_err(|err| AppError::validation(format!("Invalid record: {err}")))?;
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> AppResult<()> {
        let required = [
            ("id", &self.id),
            ("agentId", &self.agent_id),
            ("agentName", &self.agent_name),
            ("month", &self.month),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "Missing required field: {field}"
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> AppResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

pub fn stable_id(agent_id: &str, week: Option<&str>, month: &str) -> String {
    format!("{}-{}", agent_id, week.unwrap_or(month))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum PeriodType {
    Weekly,
    #[default]
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub period_type: PeriodType,
    pub selected_period: String,
    pub role: String,
    pub search_query: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            period_type: PeriodType::Monthly,
            selected_period: String::new(),
            role: ALL_ROLES.to_string(),
            search_query: String::new(),
        }
    }
}

pub fn parse_leading_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start();
    LEADING_FLOAT
        .find(trimmed)
        .and_then(|found| found.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

pub fn parse_leading_count(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    LEADING_INT
        .find(trimmed)
        .and_then(|found| found.as_str().parse::<i64>().ok())
        .map(|value| value.max(0) as u64)
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

fn role_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(non_empty_string(deserializer)?.unwrap_or_else(default_role))
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => parse_leading_float(&text),
        _ => None,
    };
    Ok(parsed.unwrap_or(0.0))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_f64().map(|float| float.max(0.0).trunc() as u64)),
        Some(Value::String(text)) => parse_leading_count(&text),
        _ => None,
    };
    Ok(parsed.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leading_number_parsing_matches_prefix() {
        assert_eq!(parse_leading_float("12.5s"), Some(12.5));
        assert_eq!(parse_leading_float("  .5"), Some(0.5));
        assert_eq!(parse_leading_float("abc"), None);
        assert_eq!(parse_leading_count("40 chats"), Some(40));
        assert_eq!(parse_leading_count("12.9"), Some(12));
        assert_eq!(parse_leading_count("-3"), Some(0));
    }

    #[test]
    fn decodes_loose_document_with_defaults() {
        let record = AgentPerformanceRecord::from_json(json!({
            "id": "A1-2025-11",
            "agentId": "A1",
            "agentName": "Avery Lee",
            "month": "2025-11",
            "numberOfChats": "42",
            "slPercentage": null,
            "team": "Night shift"
        }))
        .expect("valid record");

        assert_eq!(record.role, DEFAULT_ROLE);
        assert_eq!(record.number_of_chats, 42);
        assert_eq!(record.sl_percentage, 0.0);
        assert_eq!(record.week, None);
        assert_eq!(record.extra.get("team"), Some(&json!("Night shift")));
    }

    #[test]
    fn rejects_missing_required_fields() {
        let err = AgentPerformanceRecord::from_json(json!({
            "id": "A1-2025-11",
            "agentId": "A1",
            "agentName": "  ",
            "month": "2025-11"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("agentName"));

        assert!(AgentPerformanceRecord::from_json(json!({"id": "x"})).is_err());
    }

    #[test]
    fn serializes_camel_case_and_flattens_extra() {
        let mut record = AgentPerformanceRecord::from_json(json!({
            "id": "A1-2025-W45",
            "agentId": "A1",
            "agentName": "Avery Lee",
            "week": "2025-W45",
            "month": "2025-11",
            "ahtMinutes": 5.5
        }))
        .expect("valid record");
        record.extra.insert("site".into(), json!("Lisbon"));

        let value = record.to_json().expect("serializable");
        assert_eq!(value["agentName"], "Avery Lee");
        assert_eq!(value["ahtMinutes"], 5.5);
        assert_eq!(value["site"], "Lisbon");
        assert!(value.get("imageUrl").is_none());
    }

    #[test]
    fn stable_id_prefers_week() {
        assert_eq!(stable_id("A1", Some("2025-W45"), "2025-11"), "A1-2025-W45");
        assert_eq!(stable_id("A1", None, "2025-11"), "A1-2025-11");
    }
}
