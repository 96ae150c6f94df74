//! Firestore-backed analysis store.
//!
//! Records live at `users/{owner}/interview_analyses/{id}`. The `timestamp`
//! field is set by the server at commit time, so ordering never depends on
//! client clocks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use intervu_models::{AnalysisRecord, AnalysisResult, AnalysisSource, RecordId, Requester};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_listed;
use crate::store::{AnalysisStore, RecordStream};
use crate::types::{
    json_to_value, value_to_json, CollectionSelector, CommitResponse, Cursor, Document,
    FieldTransform, FromFirestoreValue, Order, Precondition, StructuredQuery, ToFirestoreValue,
    Value, Write,
};

/// Subcollection holding one user's records.
pub const COLLECTION: &str = "interview_analyses";

/// Records fetched per runQuery page.
pub const DEFAULT_PAGE_SIZE: i32 = 50;

const TIMESTAMP_FIELD: &str = "timestamp";

/// Analysis store backed by Firestore.
#[derive(Clone)]
pub struct FirestoreAnalysisStore {
    client: FirestoreClient,
    page_size: i32,
}

impl FirestoreAnalysisStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn owner_path(owner_id: &str) -> String {
        format!("users/{}", owner_id)
    }

    fn record_path(owner_id: &str, id: &RecordId) -> String {
        format!("{}/{}/{}", Self::owner_path(owner_id), COLLECTION, id)
    }

    fn record_fields(
        owner: &Requester,
        result: &AnalysisResult,
        video_reference: &str,
        source: AnalysisSource,
    ) -> FirestoreResult<HashMap<String, Value>> {
        let analysis = serde_json::to_value(result)?;

        let mut fields = HashMap::new();
        fields.insert("analysis".to_string(), json_to_value(&analysis));
        fields.insert("videoUrl".to_string(), video_reference.to_firestore_value());
        fields.insert("userId".to_string(), owner.id.to_firestore_value());
        fields.insert("userName".to_string(), owner.display_name.to_firestore_value());
        fields.insert("source".to_string(), source.as_str().to_firestore_value());
        fields.insert("isLive".to_string(), source.is_live().to_firestore_value());
        Ok(fields)
    }

    /// Server-assigned timestamp from a commit response.
    fn committed_timestamp(response: &CommitResponse) -> Option<DateTime<Utc>> {
        response
            .write_results
            .first()
            .and_then(|w| w.transform_results.first())
            .and_then(DateTime::<Utc>::from_firestore_value)
            .or_else(|| {
                response
                    .commit_time
                    .as_deref()
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc))
            })
    }

    /// Cursor positioned just after `doc` in timestamp-then-name order.
    fn cursor_after(doc: &Document) -> Option<Cursor> {
        let timestamp = doc.field(TIMESTAMP_FIELD)?.clone();
        let name = doc.name.clone()?;
        Some(Cursor {
            values: vec![timestamp, Value::ReferenceValue(name)],
            before: false,
        })
    }

    fn page_query(page_size: i32, start_at: Option<Cursor>) -> StructuredQuery {
        StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: COLLECTION.to_string(),
            }],
            order_by: vec![
                Order::descending(TIMESTAMP_FIELD),
                Order::descending("__name__"),
            ],
            start_at,
            limit: Some(page_size),
        }
    }
}

/// Convert a stored document into a record.
pub fn document_to_record(doc: &Document) -> FirestoreResult<AnalysisRecord> {
    let id = doc
        .id()
        .ok_or_else(|| FirestoreError::invalid_response("document without a name"))?;

    let string_field = |key: &str| doc.field(key).and_then(String::from_firestore_value);

    let owner_id = string_field("userId")
        .ok_or_else(|| FirestoreError::invalid_response(format!("{}: missing userId", id)))?;

    let analysis = doc
        .field("analysis")
        .map(value_to_json)
        .ok_or_else(|| FirestoreError::invalid_response(format!("{}: missing analysis", id)))?;
    let result: AnalysisResult = serde_json::from_value(analysis).map_err(|e| {
        FirestoreError::invalid_response(format!("{}: malformed analysis: {}", id, e))
    })?;

    // Records written before the source marker existed were all live.
    let source = string_field("source")
        .and_then(|s| AnalysisSource::parse(&s))
        .unwrap_or_default();

    let created_at = doc
        .field(TIMESTAMP_FIELD)
        .and_then(DateTime::<Utc>::from_firestore_value)
        .ok_or_else(|| FirestoreError::invalid_response(format!("{}: missing timestamp", id)))?;

    Ok(AnalysisRecord {
        id: RecordId::from(id),
        owner_id,
        owner_name: string_field("userName"),
        result,
        video_reference: string_field("videoUrl").unwrap_or_default(),
        source,
        created_at,
    })
}

enum Page {
    First,
    After(Cursor),
    Done,
}

#[async_trait]
impl AnalysisStore for FirestoreAnalysisStore {
    async fn save(
        &self,
        owner: &Requester,
        result: &AnalysisResult,
        video_reference: &str,
        source: AnalysisSource,
    ) -> FirestoreResult<AnalysisRecord> {
        let id = RecordId::new();
        let path = Self::record_path(&owner.id, &id);
        let fields = Self::record_fields(owner, result, video_reference, source)?;

        let write = Write {
            update: Some(Document::new(self.client.full_document_name(&path), fields)),
            update_transforms: vec![FieldTransform::request_time(TIMESTAMP_FIELD)],
            current_document: Some(Precondition::must_not_exist()),
        };

        let created_at = match self.client.commit(vec![write]).await {
            Ok(response) => Self::committed_timestamp(&response).unwrap_or_else(|| {
                warn!(record_id = %id, "Commit response carried no timestamp");
                Utc::now()
            }),
            // The id is fresh, so the document can only exist because an
            // earlier attempt of this same commit was applied.
            Err(FirestoreError::AlreadyExists(_)) => {
                debug!(record_id = %id, "Record already written by a retried commit");
                let doc = self
                    .client
                    .get_document(&path)
                    .await?
                    .ok_or_else(|| FirestoreError::not_found(path.clone()))?;
                return document_to_record(&doc);
            }
            Err(e) => return Err(e),
        };

        info!(
            record_id = %id,
            owner_id = %owner.id,
            source = %source,
            "Analysis record saved"
        );

        Ok(AnalysisRecord {
            id,
            owner_id: owner.id.clone(),
            owner_name: owner.display_name.clone(),
            result: result.clone(),
            video_reference: video_reference.to_string(),
            source,
            created_at,
        })
    }

    fn list(&self, owner_id: &str) -> RecordStream {
        let client = self.client.clone();
        let parent = Self::owner_path(owner_id);
        let page_size = self.page_size;

        stream::try_unfold(Page::First, move |page| {
            let client = client.clone();
            let parent = parent.clone();
            async move {
                let start_at = match page {
                    Page::Done => return Ok::<_, FirestoreError>(None),
                    Page::First => None,
                    Page::After(cursor) => Some(cursor),
                };

                let docs = client
                    .run_query(&parent, Self::page_query(page_size, start_at))
                    .await?;

                let next = if docs.len() < page_size as usize {
                    Page::Done
                } else {
                    docs.last()
                        .and_then(Self::cursor_after)
                        .map(Page::After)
                        .unwrap_or(Page::Done)
                };

                let records = docs
                    .iter()
                    .map(document_to_record)
                    .collect::<FirestoreResult<Vec<_>>>()?;
                record_listed(records.len());

                Ok(Some((records, next)))
            }
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn get(&self, owner_id: &str, id: &RecordId) -> FirestoreResult<Option<AnalysisRecord>> {
        let path = Self::record_path(owner_id, id);
        match self.client.get_document(&path).await? {
            Some(doc) => document_to_record(&doc).map(Some),
            None => Ok(None),
        }
    }
}
