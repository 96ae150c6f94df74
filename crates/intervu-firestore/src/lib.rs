//! Analysis record persistence.
//!
//! This crate provides:
//! - The `AnalysisStore` trait: append-only save, lazy newest-first listing
//! - A Firestore REST implementation with server-assigned timestamps
//! - An in-memory implementation for offline runs and tests
//! - Service account authentication via gcp_auth, with emulator support
//! - Retry with backoff and per-request metrics

pub mod analysis_repo;
pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use analysis_repo::{document_to_record, FirestoreAnalysisStore, COLLECTION};
pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryConfig;
pub use store::{AnalysisStore, MemoryAnalysisStore, RecordStream};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
