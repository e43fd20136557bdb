//! Connection and collection-handle abstraction for document stores.
//!
//! This module defines the boundary between the mapping layer and whatever driver
//! actually talks to the database. The core never opens or closes connections: it
//! asks a [`ConnectionProvider`] for a [`CollectionHandle`] and issues every round-trip
//! through that handle.
//!
//! # Traits
//!
//! - [`CollectionHandle`]: async operations against one named collection
//! - [`ConnectionProvider`]: hands out collection handles and reports connection status
//! - [`ConnectionProviderBuilder`]: factory that establishes a provider
//!
//! All filters, updates and pipelines are expressed in the MongoDB query shape
//! (`bson::Document`), which is passed through untouched to the driver.
//!
//! # Examples
//!
//! ```ignore
//! use docmap::backend::{CollectionHandle, ConnectionProvider};
//! use bson::doc;
//!
//! let users = provider.collection_handle("users");
//! let outcome = users.insert_one(doc! { "firstName": "Ada" }).await?;
//! let found = users.find_one(doc! { "_id": outcome.inserted_id }, Default::default()).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::error::DocumentResult;

/// Options for a single-document lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    /// Field-inclusion (or exclusion) map applied to the returned document.
    pub projection: Option<Document>,
    /// Sort applied before picking the first match.
    pub sort: Option<Document>,
}

/// Options for a cursor-returning find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Field-inclusion (or exclusion) map applied to every returned document.
    pub projection: Option<Document>,
    /// Ordered sort specification.
    pub sort: Option<Document>,
    /// Number of matching documents to omit from the front.
    pub skip: Option<u64>,
    /// Maximum number of documents to return. The driver reads `0` as "no limit".
    pub limit: Option<i64>,
}

/// Options for an update-by-filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches the filter.
    pub upsert: bool,
}

/// Options for counting documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountOptions {
    /// Number of matching documents to ignore before counting.
    pub skip: Option<u64>,
    /// Stop counting after this many documents.
    pub limit: Option<u64>,
}

/// Which version of a document an atomic find-and-update returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the update was applied.
    Before,
    /// The document after the update was applied.
    #[default]
    After,
}

/// Options for an atomic find-and-update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    /// Which version of the document to return.
    pub return_document: ReturnDocument,
    /// Insert a new document when nothing matches the filter.
    pub upsert: bool,
    /// Field-inclusion (or exclusion) map applied to the returned document.
    pub projection: Option<Document>,
    /// Sort used to pick the document to update when several match.
    pub sort: Option<Document>,
}

/// Result of inserting a single document.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneOutcome {
    /// The identifier the stored document ended up with (store-assigned if none was given).
    pub inserted_id: Bson,
    /// Number of documents the store reports as inserted.
    pub inserted_count: u64,
}

/// Result of an update-by-filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Number of documents matching the filter.
    pub matched_count: u64,
    /// Number of documents actually modified.
    pub modified_count: u64,
    /// Identifier of the upserted document, if an upsert happened.
    pub upserted_id: Option<Bson>,
}

impl UpdateOutcome {
    /// Number of documents upserted (0 or 1).
    pub fn upserted_count(&self) -> u64 {
        u64::from(self.upserted_id.is_some())
    }
}

/// Result of a delete-by-filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Number of documents removed.
    pub deleted_count: u64,
}

/// Connection state reported by a [`ConnectionProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The provider can reach the store.
    Connected,
    /// The provider cannot currently reach the store.
    Disconnected,
}

impl ConnectionStatus {
    /// Returns `true` for [`ConnectionStatus::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Async operations against a single named collection.
///
/// Handles are cheap to clone and are shared freely across concurrent calls; the
/// mapping layer performs no locking of its own. Every method is a store round-trip
/// that suspends the calling task without blocking other tasks.
///
/// Implementations must not treat "no match" as an error: `find_one` and
/// `find_one_and_update` return `Ok(None)`, `find` returns an empty vector.
#[async_trait]
pub trait CollectionHandle: Send + Sync + Debug + Clone + 'static {
    /// Returns the name of the collection behind this handle.
    fn name(&self) -> &str;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        filter: Document,
        options: FindOneOptions,
    ) -> DocumentResult<Option<Document>>;

    /// Returns every document matching `filter`, shaped by `options`.
    async fn find(&self, filter: Document, options: FindOptions) -> DocumentResult<Vec<Document>>;

    /// Runs an aggregation pipeline and materializes its output.
    async fn aggregate(&self, pipeline: Vec<Document>) -> DocumentResult<Vec<Document>>;

    /// Inserts a single document, assigning an `_id` when it has none.
    async fn insert_one(&self, document: Document) -> DocumentResult<InsertOneOutcome>;

    /// Applies `update` (operator document or full replacement) to the first match.
    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentResult<UpdateOutcome>;

    /// Removes the first document matching `filter`.
    async fn delete_one(&self, filter: Document) -> DocumentResult<DeleteOutcome>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, filter: Document, options: CountOptions) -> DocumentResult<u64>;

    /// Atomically finds the first match, applies `update`, and returns the document
    /// version selected by `options.return_document`.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentResult<Option<Document>>;
}

/// Supplies collection handles within a connected database.
///
/// Connection lifecycle (connect, retry, close) belongs entirely to the provider;
/// the mapping layer only consumes handles.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + Debug {
    /// The handle type this provider hands out.
    type Handle: CollectionHandle;

    /// Returns a handle to the named collection.
    fn collection_handle(&self, name: &str) -> Self::Handle;

    /// Reports whether the store is currently reachable.
    async fn status(&self) -> ConnectionStatus;

    /// Closes the underlying connection.
    ///
    /// The default implementation is a no-op, but providers holding sockets or
    /// pools should release them here.
    async fn shutdown(self) -> DocumentResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory trait for establishing a [`ConnectionProvider`].
#[async_trait]
pub trait ConnectionProviderBuilder {
    /// The provider produced by this builder.
    type Provider: ConnectionProvider;

    /// Connects and returns the provider.
    async fn connect(self) -> DocumentResult<Self::Provider>;
}
