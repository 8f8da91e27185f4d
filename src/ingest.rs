use std::collections::BTreeMap;
use std::io::Read;

use chrono::{NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{
    parse_leading_count, parse_leading_float, stable_id, AgentPerformanceRecord, DEFAULT_ROLE,
};

const SPREADSHEET_HOST: &str = "docs.google.com/spreadsheets";

static SPREADSHEET_DOC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").expect("valid document pattern"));
static SPREADSHEET_GID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[#&?]gid=([0-9]+)").expect("valid gid pattern"));
static ISO_WEEK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").expect("valid iso week pattern"));

const KNOWN_COLUMNS: &[&str] = &[
    "id",
    "agentId",
    "agentName",
    "role",
    "week",
    "month",
    "numberOfChats",
    "slPercentage",
    "sl",
    "frtSeconds",
    "frt",
    "artSeconds",
    "ahtMinutes",
    "ahtSeconds",
    "imageUrl",
];

/// What to do with a row that lacks a required column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPolicy {
    /// Uploaded files: one bad row fails the whole batch.
    RejectBatch,
    /// Remote sources: bad rows are dropped and the rest imported.
    SkipInvalid,
}

type RawRow = BTreeMap<String, String>;

pub fn parse_csv(text: &str, policy: RowPolicy) -> AppResult<Vec<AgentPerformanceRecord>> {
    parse_reader(text.as_bytes(), policy)
}

pub fn parse_csv_file(path: &std::path::Path) -> AppResult<Vec<AgentPerformanceRecord>> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    parse_reader(file, RowPolicy::RejectBatch)
}

pub fn parse_reader<R: Read>(
    source: R,
    policy: RowPolicy,
) -> AppResult<Vec<AgentPerformanceRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, result) in reader.records().enumerate() {
        let line = match result {
            Ok(line) => line,
            Err(err) if policy == RowPolicy::SkipInvalid => {
                warn!(
                    target: "perfdash::ingest",
                    row = index + 1,
                    error = %err,
                    "CSV parsing error"
                );
                skipped += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let row: RawRow = headers
            .iter()
            .zip(line.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();

        match record_from_row(&row) {
            Some(record) => records.push(record),
            None if policy == RowPolicy::SkipInvalid => {
                debug!(
                    target: "perfdash::ingest",
                    row = index + 1,
                    "skipping row without agentId/agentName"
                );
                skipped += 1;
            }
            None => {
                return Err(AppError::validation(format!(
                    "Missing required fields on row {}",
                    index + 1
                )))
            }
        }
    }

    if records.is_empty() {
        return Err(AppError::NoValidData);
    }

    info!(
        target: "perfdash::ingest",
        parsed = records.len(),
        skipped,
        "CSV ingestion finished"
    );
    Ok(records)
}

fn field<'a>(row: &'a RawRow, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| row.get(*name))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

fn metric(row: &RawRow, names: &[&str]) -> f64 {
    field(row, names)
        .and_then(parse_leading_float)
        .unwrap_or(0.0)
}

fn record_from_row(row: &RawRow) -> Option<AgentPerformanceRecord> {
    let agent_id = field(row, &["agentId"])?;
    let agent_name = field(row, &["agentName"])?;
    let week = field(row, &["week"]).map(str::to_string);
    let month = field(row, &["month"])
        .map(str::to_string)
        .or_else(|| week.as_deref().and_then(month_of_iso_week))?;

    let number_of_chats = field(row, &["numberOfChats"])
        .and_then(parse_leading_count)
        .unwrap_or(0);
    let sl_percentage = field(row, &["slPercentage", "sl"])
        .and_then(|raw| parse_leading_float(&raw.replacen('%', "", 1)))
        .unwrap_or(0.0);

    let extra = row
        .iter()
        .filter(|(column, value)| !KNOWN_COLUMNS.contains(&column.as_str()) && !value.is_empty())
        .map(|(column, value)| (column.clone(), Value::String(value.clone())))
        .collect();

    Some(AgentPerformanceRecord {
        id: stable_id(agent_id, week.as_deref(), &month),
        agent_id: agent_id.to_string(),
        agent_name: agent_name.to_string(),
        role: field(row, &["role"]).unwrap_or(DEFAULT_ROLE).to_string(),
        week,
        month,
        number_of_chats,
        sl_percentage,
        frt_seconds: metric(row, &["frtSeconds", "frt"]),
        art_seconds: metric(row, &["artSeconds"]),
        aht_minutes: metric(row, &["ahtMinutes", "ahtSeconds"]),
        image_url: field(row, &["imageUrl"]).map(str::to_string),
        extra,
    })
}

/// "2025-W45" -> "2025-11", using the Monday of that ISO week.
pub fn month_of_iso_week(week: &str) -> Option<String> {
    let captures = ISO_WEEK.captures(week.trim())?;
    let year: i32 = captures[1].parse().ok()?;
    let number: u32 = captures[2].parse().ok()?;
    NaiveDate::from_isoywd_opt(year, number, Weekday::Mon)
        .map(|date| date.format("%Y-%m").to_string())
}

/// Rewrites spreadsheet editor links to their CSV export form.
/// Returns `Ok(None)` for URLs that are not spreadsheet links.
pub fn spreadsheet_export_url(url: &str) -> AppResult<Option<String>> {
    if !url.contains(SPREADSHEET_HOST) {
        return Ok(None);
    }
    let document = SPREADSHEET_DOC
        .captures(url)
        .map(|captures| captures[1].to_string())
        .ok_or_else(|| AppError::validation("Invalid Google Sheets URL"))?;
    let gid = SPREADSHEET_GID
        .captures(url)
        .map(|captures| captures[1].to_string())
        .unwrap_or_else(|| "0".to_string());

    Ok(Some(format!(
        "https://docs.google.com/spreadsheets/d/{document}/export?format=csv&gid={gid}"
    )))
}

#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    relay: Option<String>,
}

impl SourceResolver {
    pub fn new(relay: Option<String>) -> Self {
        Self {
            relay: relay.filter(|prefix| !prefix.trim().is_empty()),
        }
    }

    pub fn resolve(&self, url: &str) -> AppResult<String> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::validation("url must be http or https"));
        }

        match spreadsheet_export_url(url)? {
            Some(export) => Ok(match &self.relay {
                Some(prefix) => format!("{}{}", prefix, urlencoding::encode(&export)),
                None => export,
            }),
            None => Ok(url.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvFetcher {
    client: reqwest::Client,
    resolver: SourceResolver,
}

impl CsvFetcher {
    pub fn new(resolver: SourceResolver) -> Self {
        Self {
            client: reqwest::Client::new(),
            resolver,
        }
    }

    pub async fn fetch_text(&self, url: &str) -> AppResult<String> {
        let target = self.resolver.resolve(url)?;
        debug!(target: "perfdash::ingest", %target, "fetching CSV source");

        let response = self.client.get(&target).send().await?;
        if !response.status().is_success() {
            return Err(AppError::fetch_failed(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }

    /// Remote imports drop invalid rows instead of failing the batch.
    pub async fn fetch_records(&self, url: &str) -> AppResult<Vec<AgentPerformanceRecord>> {
        let text = self.fetch_text(url).await?;
        parse_csv(&text, RowPolicy::SkipInvalid)
    }
}
