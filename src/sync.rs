use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::ingest::CsvFetcher;
use crate::models::AgentPerformanceRecord;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Disconnected,
    Idle,
    Syncing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub url: Option<String>,
    pub is_syncing: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_record_count: Option<usize>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub enum SyncOutcome {
    NotConnected,
    /// A cycle was already running; periodic ticks do not queue behind it.
    Skipped,
    Synced(Vec<AgentPerformanceRecord>),
}

#[derive(Debug, Default)]
struct Source {
    url: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    last_record_count: Option<usize>,
    last_error: Option<String>,
}

pub struct SyncController {
    store: Arc<dyn RecordStore>,
    fetcher: CsvFetcher,
    source: Mutex<Source>,
    flight: Mutex<()>,
}

impl SyncController {
    pub fn new(store: Arc<dyn RecordStore>, fetcher: CsvFetcher) -> Self {
        Self {
            store,
            fetcher,
            source: Mutex::new(Source::default()),
            flight: Mutex::new(()),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let source = self.source.lock().await;
        let is_syncing = self.flight.try_lock().is_err();
        let state = match (&source.url, is_syncing) {
            (None, _) => SyncState::Disconnected,
            (Some(_), false) => SyncState::Idle,
            (Some(_), true) => SyncState::Syncing,
        };
        SyncStatus {
            state,
            url: source.url.clone(),
            is_syncing,
            last_synced_at: source.last_synced_at,
            last_record_count: source.last_record_count,
            last_error: source.last_error.clone(),
        }
    }

    /// Remembers `url` and runs one cycle right away. The url stays
    /// remembered when that first cycle fails, so the next tick retries.
    pub async fn connect(&self, url: &str) -> AppResult<Vec<AgentPerformanceRecord>> {
        let url = url.trim().to_string();
        {
            let mut source = self.source.lock().await;
            *source = Source {
                url: Some(url.clone()),
                ..Source::default()
            };
        }
        info!(target: "perfdash::sync", %url, "sync source connected");

        let _flight = self.flight.lock().await;
        self.run_cycle(&url).await
    }

    /// Clears the remembered url and timestamp. Stored records are kept.
    pub async fn disconnect(&self) {
        let mut source = self.source.lock().await;
        if let Some(url) = source.url.take() {
            info!(target: "perfdash::sync", %url, "sync source disconnected");
        }
        *source = Source::default();
    }

    /// Manual re-sync; waits for an in-flight cycle instead of overlapping it.
    /// Returns `None` when no source is connected.
    pub async fn sync_now(&self) -> AppResult<Option<Vec<AgentPerformanceRecord>>> {
        let _flight = self.flight.lock().await;
        match self.current_url().await {
            Some(url) => Ok(Some(self.run_cycle(&url).await?)),
            None => Ok(None),
        }
    }

    /// Disconnects, waits out any running cycle, then empties the store so
    /// nothing fetched before the reset lands after it.
    pub async fn reset(&self) -> AppResult<u64> {
        self.disconnect().await;
        let _flight = self.flight.lock().await;
        self.store.delete_all().await
    }

    pub async fn tick(&self) -> AppResult<SyncOutcome> {
        let Ok(_flight) = self.flight.try_lock() else {
            debug!(target: "perfdash::sync", "sync already running, skipping tick");
            return Ok(SyncOutcome::Skipped);
        };
        match self.current_url().await {
            Some(url) => Ok(SyncOutcome::Synced(self.run_cycle(&url).await?)),
            None => Ok(SyncOutcome::NotConnected),
        }
    }

    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            // connect() already ran the first cycle.
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = self.tick().await {
                    warn!(target: "perfdash::sync", error = %err, "periodic sync failed");
                }
            }
        })
    }

    async fn current_url(&self) -> Option<String> {
        self.source.lock().await.url.clone()
    }

    // Caller holds the flight guard.
    async fn run_cycle(&self, url: &str) -> AppResult<Vec<AgentPerformanceRecord>> {
        let result = match self.fetcher.fetch_records(url).await {
            Ok(records) => self.store.bulk_upsert_by_id(records).await,
            Err(err) => Err(err),
        };

        let mut source = self.source.lock().await;
        if source.url.as_deref() != Some(url) {
            debug!(
                target: "perfdash::sync",
                %url,
                "source changed during sync, not recording result"
            );
            return result;
        }
        match &result {
            Ok(records) => {
                source.last_synced_at = Some(Utc::now());
                source.last_record_count = Some(records.len());
                source.last_error = None;
                info!(target: "perfdash::sync", %url, records = records.len(), "sync finished");
            }
            Err(err) => {
                source.last_error = Some(err.to_string());
                warn!(target: "perfdash::sync", %url, error = %err, "sync failed");
            }
        }
        result
    }
}
