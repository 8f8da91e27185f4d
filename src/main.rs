use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::{info, warn};

mod aggregate;
mod api;
mod config;
mod db;
mod error;
mod ingest;
mod leaderboard;
mod logging;
mod models;
mod report;
mod scoring;
mod store;
mod sync;

use crate::config::Config;
use crate::ingest::{CsvFetcher, SourceResolver};
use crate::leaderboard::{SortDirection, SortField, SortOrder};
use crate::models::{FilterState, PeriodType, ALL_ROLES};
use crate::store::{MemoryStore, RecordStore};
use crate::sync::SyncController;

#[derive(Parser)]
#[command(name = "perfdash")]
#[command(about = "Support agent performance dashboard service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct ViewArgs {
    #[arg(long, value_enum, default_value_t = PeriodType::Monthly)]
    period_type: PeriodType,
    /// Week ("2025-W45") or month ("2025-11"); defaults to the most recent
    #[arg(long)]
    period: Option<String>,
    #[arg(long, default_value = ALL_ROLES)]
    role: String,
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, value_enum, default_value_t = SortField::NumberOfChats)]
    sort: SortField,
    #[arg(long, value_enum, default_value_t = SortDirection::Desc)]
    direction: SortDirection,
}

impl ViewArgs {
    fn filter(&self) -> FilterState {
        FilterState {
            period_type: self.period_type,
            selected_period: self.period.clone().unwrap_or_default(),
            role: self.role.clone(),
            search_query: self.search.clone(),
        }
    }

    fn order(&self) -> SortOrder {
        SortOrder {
            field: self.sort,
            direction: self.direction,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Serve the REST API and run the periodic sync
    Serve {
        /// Keep records in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Import records from a CSV file; any invalid row rejects the file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import records from a CSV or spreadsheet URL, skipping invalid rows
    ImportUrl {
        #[arg(long)]
        url: String,
    },
    /// Print the ranked leaderboard
    Leaderboard {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Delete every stored record
    Reset,
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    db::pool_options()
        .connect(config.require_database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn pg_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    Ok(Arc::new(db::PgRecordStore::new(connect(config).await?)))
}

async fn serve(config: Config, in_memory: bool) -> anyhow::Result<()> {
    let store: Arc<dyn RecordStore> = if in_memory {
        info!("using in-memory record store");
        Arc::new(MemoryStore::new())
    } else {
        // Lazy so an unreachable database fails requests, not startup.
        let pool = db::pool_options()
            .connect_lazy(config.require_database_url()?)
            .context("invalid DATABASE_URL")?;
        Arc::new(db::PgRecordStore::new(pool))
    };

    let fetcher = CsvFetcher::new(SourceResolver::new(config.sync_relay_url.clone()));
    let sync = Arc::new(SyncController::new(store.clone(), fetcher));

    if let Some(url) = &config.sync_url {
        if let Err(err) = sync.connect(url).await {
            warn!(error = %err, "initial sync failed; will retry on the next tick");
        }
    }
    let _sync_task = sync.clone().spawn(config.sync_interval);

    let app = api::router(
        api::AppState { store, sync },
        config.body_limit_bytes,
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging()?;
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect(&config).await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = pg_store(&config).await?;
            let count = db::seed(store.as_ref()).await?;
            println!("Seed data upserted ({count} records).");
        }
        Commands::Serve { in_memory } => {
            serve(config, in_memory).await?;
        }
        Commands::Import { csv } => {
            let records = ingest::parse_csv_file(&csv)
                .with_context(|| format!("failed to import {}", csv.display()))?;
            let imported = records.len();
            let store = pg_store(&config).await?;
            let all = store.bulk_upsert_by_id(records).await?;
            println!(
                "Upserted {imported} records from {} ({} stored).",
                csv.display(),
                all.len()
            );
        }
        Commands::ImportUrl { url } => {
            let fetcher = CsvFetcher::new(SourceResolver::new(config.sync_relay_url.clone()));
            let records = fetcher.fetch_records(&url).await?;
            let imported = records.len();
            let store = pg_store(&config).await?;
            let all = store.bulk_upsert_by_id(records).await?;
            println!("Upserted {imported} records from {url} ({} stored).", all.len());
        }
        Commands::Leaderboard { view, limit } => {
            let records = pg_store(&config).await?.list_all().await?;
            let rows = leaderboard::rank(
                &records,
                &aggregate::resolve_filter(&records, &view.filter()),
                view.order(),
            );

            if rows.is_empty() {
                println!("No agents found matching the filters.");
                return Ok(());
            }

            println!("Leaderboard:");
            for row in rows.iter().take(limit) {
                println!("{}", report::format_row(row));
            }
        }
        Commands::Report { view, out } => {
            let records = pg_store(&config).await?.list_all().await?;
            let report = report::build_report(&records, &view.filter(), view.order());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Reset => {
            let deleted = pg_store(&config).await?.delete_all().await?;
            println!("Deleted {deleted} records.");
        }
    }

    Ok(())
}
