use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{stable_id, AgentPerformanceRecord, DEFAULT_ROLE};
use crate::store::{apply_patch, RecordStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(45);

pub fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(CONNECT_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(store: &dyn RecordStore) -> anyhow::Result<usize> {
    let agents = [
        ("A1001", "Avery Lee", [(62, 97.2, 18.0, 22.5, 5.1), (58, 96.0, 21.0, 24.0, 5.6)]),
        ("A1002", "Jules Moreno", [(81, 93.4, 27.0, 31.5, 6.4), (77, 95.8, 24.0, 29.0, 5.9)]),
        ("A1003", "Kiara Patel", [(44, 98.9, 12.0, 18.0, 4.2), (51, 99.1, 14.0, 19.5, 4.4)]),
    ];
    let weeks = ["2025-W45", "2025-W46"];

    let mut records = Vec::new();
    for (agent_id, agent_name, periods) in agents {
        for (week, (chats, sl, frt, art, aht)) in weeks.iter().zip(periods) {
            records.push(AgentPerformanceRecord {
                id: stable_id(agent_id, Some(*week), "2025-11"),
                agent_id: agent_id.to_string(),
                agent_name: agent_name.to_string(),
                role: DEFAULT_ROLE.to_string(),
                week: Some(week.to_string()),
                month: "2025-11".to_string(),
                number_of_chats: chats,
                sl_percentage: sl,
                frt_seconds: frt,
                art_seconds: art,
                aht_minutes: aht,
                image_url: None,
                extra: Default::default(),
            });
        }
    }

    let count = records.len();
    store.bulk_upsert_by_id(records).await?;
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: PgRow) -> AppResult<AgentPerformanceRecord> {
    let Json(record) = row.try_get::<Json<AgentPerformanceRecord>, _>("doc")?;
    Ok(record)
}

fn unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn list_all(&self) -> AppResult<Vec<AgentPerformanceRecord>> {
        let rows = sqlx::query("SELECT doc FROM agent_performance.records ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(decode).collect()
    }

    async fn insert_one(
        &self,
        record: AgentPerformanceRecord,
    ) -> AppResult<AgentPerformanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO agent_performance.records (id, agent_id, month, doc)
            VALUES ($1, $2, $3, $4)
            RETURNING doc
            "#,
        )
        .bind(&record.id)
        .bind(&record.agent_id)
        .bind(&record.month)
        .bind(Json(&record))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => decode(row),
            Err(err) if unique_violation(&err) => Err(AppError::collision(record.id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn update_one_by_id(
        &self,
        id: &str,
        patch: Map<String, Value>,
    ) -> AppResult<AgentPerformanceRecord> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query(
            "SELECT doc FROM agent_performance.records WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found(id))?;

        let updated = apply_patch(&decode(current)?, patch)?;
        sqlx::query(
            r#"
            UPDATE agent_performance.records
            SET agent_id = $2, month = $3, doc = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&updated.agent_id)
        .bind(&updated.month)
        .bind(Json(&updated))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(updated)
    }

    async fn delete_one_by_id(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM agent_performance.records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(id));
        }
        Ok(())
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM agent_performance.records")
            .execute(&self.pool)
            .await?;
        info!(target: "perfdash::db", removed = result.rows_affected(), "all records deleted");
        Ok(result.rows_affected())
    }

    async fn bulk_upsert_by_id(
        &self,
        records: Vec<AgentPerformanceRecord>,
    ) -> AppResult<Vec<AgentPerformanceRecord>> {
        // Applied one by one without a transaction: earlier writes stay if a
        // later one fails.
        for record in &records {
            let result = sqlx::query(
                r#"
                INSERT INTO agent_performance.records (id, agent_id, month, doc)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE
                SET agent_id = EXCLUDED.agent_id,
                    month = EXCLUDED.month,
                    doc = EXCLUDED.doc,
                    updated_at = now()
                "#,
            )
            .bind(&record.id)
            .bind(&record.agent_id)
            .bind(&record.month)
            .bind(Json(record))
            .execute(&self.pool)
            .await;

            if let Err(err) = result {
                if unique_violation(&err) {
                    return Err(AppError::collision(record.id.clone()));
                }
                return Err(err.into());
            }
        }
        debug!(target: "perfdash::db", upserted = records.len(), "bulk upsert applied");

        self.list_all().await
    }
}
