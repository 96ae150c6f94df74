//! Analysis store abstraction and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;

use intervu_models::{AnalysisRecord, AnalysisResult, AnalysisSource, RecordId, Requester};

use crate::error::FirestoreResult;

/// Lazy, newest-first sequence of records.
pub type RecordStream = BoxStream<'static, FirestoreResult<AnalysisRecord>>;

/// Append-only, per-owner record store.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persist a new record. Never overwrites an existing one.
    async fn save(
        &self,
        owner: &Requester,
        result: &AnalysisResult,
        video_reference: &str,
        source: AnalysisSource,
    ) -> FirestoreResult<AnalysisRecord>;

    /// All records of `owner_id`, newest first.
    ///
    /// Nothing is read until the stream is polled, and every call queries
    /// again, so records saved in between are included.
    fn list(&self, owner_id: &str) -> RecordStream;

    async fn get(&self, owner_id: &str, id: &RecordId) -> FirestoreResult<Option<AnalysisRecord>>;
}

/// Process-local store, for offline use and tests.
#[derive(Clone, Default)]
pub struct MemoryAnalysisStore {
    /// Per owner, oldest first
    records: Arc<RwLock<HashMap<String, Vec<AnalysisRecord>>>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, owner_id: &str) -> usize {
        self.records
            .read()
            .await
            .get(owner_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn save(
        &self,
        owner: &Requester,
        result: &AnalysisResult,
        video_reference: &str,
        source: AnalysisSource,
    ) -> FirestoreResult<AnalysisRecord> {
        let mut records = self.records.write().await;
        let owned = records.entry(owner.id.clone()).or_default();

        // Keep timestamps strictly increasing so ordering is total.
        let mut created_at = Utc::now();
        if let Some(last) = owned.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + Duration::microseconds(1);
            }
        }

        let record = AnalysisRecord {
            id: RecordId::new(),
            owner_id: owner.id.clone(),
            owner_name: owner.display_name.clone(),
            result: result.clone(),
            video_reference: video_reference.to_string(),
            source,
            created_at,
        };
        owned.push(record.clone());
        Ok(record)
    }

    fn list(&self, owner_id: &str) -> RecordStream {
        let records = Arc::clone(&self.records);
        let owner_id = owner_id.to_string();

        stream::once(async move {
            let snapshot = records
                .read()
                .await
                .get(&owner_id)
                .cloned()
                .unwrap_or_default();
            stream::iter(snapshot.into_iter().rev().map(Ok))
        })
        .flatten()
        .boxed()
    }

    async fn get(&self, owner_id: &str, id: &RecordId) -> FirestoreResult<Option<AnalysisRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(owner_id)
            .and_then(|owned| owned.iter().find(|r| &r.id == id).cloned()))
    }
}
