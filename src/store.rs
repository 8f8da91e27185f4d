use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::AgentPerformanceRecord;

/// Persistence for agent performance records, keyed on the business `id`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records in insertion order.
    async fn list_all(&self) -> AppResult<Vec<AgentPerformanceRecord>>;

    /// Fails with `Collision` when the id is already taken.
    async fn insert_one(&self, record: AgentPerformanceRecord)
        -> AppResult<AgentPerformanceRecord>;

    async fn update_one_by_id(
        &self,
        id: &str,
        patch: Map<String, Value>,
    ) -> AppResult<AgentPerformanceRecord>;

    async fn delete_one_by_id(&self, id: &str) -> AppResult<()>;

    /// Returns the number of records removed.
    async fn delete_all(&self) -> AppResult<u64>;

    /// Replaces records with a matching id and inserts the rest, then
    /// returns the full collection.
    async fn bulk_upsert_by_id(
        &self,
        records: Vec<AgentPerformanceRecord>,
    ) -> AppResult<Vec<AgentPerformanceRecord>>;
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Merges top-level fields of `patch` into `record`. The stored id wins over
/// any id in the patch.
pub fn apply_patch(
    record: &AgentPerformanceRecord,
    patch: Map<String, Value>,
) -> AppResult<AgentPerformanceRecord> {
    let mut document = match record.to_json()? {
        Value::Object(document) => document,
        _ => return Err(AppError::validation("record is not a JSON object")),
    };
    for (field, value) in patch {
        if field != "id" {
            document.insert(field, value);
        }
    }
    document.insert("id".to_string(), Value::String(record.id.clone()));
    AgentPerformanceRecord::from_json(Value::Object(document))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<AgentPerformanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_all(&self) -> AppResult<Vec<AgentPerformanceRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn insert_one(
        &self,
        record: AgentPerformanceRecord,
    ) -> AppResult<AgentPerformanceRecord> {
        let mut records = self.records.write().await;
        if records.iter().any(|existing| existing.id == record.id) {
            return Err(AppError::collision(record.id));
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn update_one_by_id(
        &self,
        id: &str,
        patch: Map<String, Value>,
    ) -> AppResult<AgentPerformanceRecord> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|existing| existing.id == id)
            .ok_or_else(|| AppError::not_found(id))?;
        let updated = apply_patch(slot, patch)?;
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_one_by_id(&self, id: &str) -> AppResult<()> {
        let mut records = self.records.write().await;
        let position = records
            .iter()
            .position(|existing| existing.id == id)
            .ok_or_else(|| AppError::not_found(id))?;
        records.remove(position);
        Ok(())
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn bulk_upsert_by_id(
        &self,
        incoming: Vec<AgentPerformanceRecord>,
    ) -> AppResult<Vec<AgentPerformanceRecord>> {
        let mut records = self.records.write().await;
        let mut inserted = 0usize;
        let total = incoming.len();
        for record in incoming {
            match records.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => {
                    records.push(record);
                    inserted += 1;
                }
            }
        }
        debug!(target: "perfdash::store", total, inserted, "bulk upsert applied");
        Ok(records.clone())
    }
}
