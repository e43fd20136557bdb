//! In-memory storage implementation for document stores.
//!
//! This module provides a provider that keeps every collection as an ordered list of
//! BSON documents behind an async-safe read-write lock, and interprets the
//! MongoDB-shaped filters, updates and pipelines the mapping layer issues.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, doc, oid::ObjectId};
use tracing::trace;

use docmap_core::{
    backend::{
        CollectionHandle, ConnectionProvider, ConnectionProviderBuilder, ConnectionStatus, CountOptions,
        DeleteOutcome, FindOneAndUpdateOptions, FindOneOptions, FindOptions, InsertOneOutcome,
        ReturnDocument, UpdateOptions, UpdateOutcome,
    },
    error::{DocumentError, DocumentResult},
    identifier::ID_FIELD,
};

use crate::{
    evaluator::{DocumentEvaluator, compare_documents, sort_documents, values_equal},
    pipeline::{apply_projection, run_pipeline},
    update::{apply_update, upsert_seed},
};

type StoreMap = HashMap<String, Vec<Document>>;


/// Thread-safe in-memory connection provider.
///
/// `InMemoryProvider` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Clones of the same instance, and every
/// [`InMemoryCollection`] handed out by it, share the same underlying data.
///
/// Queries scan all documents in a collection (no indexing). Documents keep their
/// insertion order, which is the order unsorted finds return them in.
///
/// # Example
///
/// ```ignore
/// use docmap::memory::InMemoryProvider;
/// use docmap::backend::{CollectionHandle, ConnectionProvider};
/// use bson::doc;
///
/// let provider = InMemoryProvider::new();
/// let users = provider.collection_handle("users");
///
/// users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
/// assert_eq!(users.count_documents(doc! {}, Default::default()).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryProvider {
    collections: Arc<RwLock<StoreMap>>,
}

impl InMemoryProvider {
    /// Creates a new empty in-memory provider.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryProvider`.
    ///
    /// ```ignore
    /// let provider = InMemoryProvider::builder().connect().await?;
    /// ```
    pub fn builder() -> InMemoryProviderBuilder {
        InMemoryProviderBuilder::default()
    }

    /// Lists the names of the collections that currently hold data.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names = self.collections.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

#[async_trait]
impl ConnectionProvider for InMemoryProvider {
    type Handle = InMemoryCollection;

    fn collection_handle(&self, name: &str) -> Self::Handle {
        InMemoryCollection {
            name: name.to_string(),
            collections: Arc::clone(&self.collections),
        }
    }

    async fn status(&self) -> ConnectionStatus {
        ConnectionStatus::Connected
    }
}


/// Builder for constructing [`InMemoryProvider`] instances.
#[derive(Default)]
pub struct InMemoryProviderBuilder;

#[async_trait]
impl ConnectionProviderBuilder for InMemoryProviderBuilder {
    type Provider = InMemoryProvider;

    /// Always succeeds with a freshly initialized, empty provider.
    async fn connect(self) -> DocumentResult<Self::Provider> {
        Ok(InMemoryProvider::new())
    }
}


/// A handle to one named collection of an [`InMemoryProvider`].
#[derive(Clone, Debug)]
pub struct InMemoryCollection {
    name: String,
    collections: Arc<RwLock<StoreMap>>,
}

impl InMemoryCollection {
    fn duplicate_key(&self, id: &Bson) -> DocumentError {
        DocumentError::backend(format!("duplicate key: {ID_FIELD} {id} already exists in {}", self.name))
    }

    fn project(document: Document, projection: Option<&Document>) -> DocumentResult<Document> {
        match projection {
            Some(projection) if !projection.is_empty() => apply_projection(&document, projection),
            _ => Ok(document),
        }
    }
}

/// Assigns a fresh ObjectId when `document` has no `_id`, keeping `_id` as the first field.
fn with_identifier(document: Document) -> Document {
    if document.contains_key(ID_FIELD) {
        return document;
    }

    let mut stored = doc! { ID_FIELD: ObjectId::new() };
    stored.extend(document);
    stored
}

fn contains_id(documents: &[Document], id: &Bson) -> bool {
    documents
        .iter()
        .any(|document| document.get(ID_FIELD).is_some_and(|existing| values_equal(existing, id)))
}

/// Position of the first document matching `filter`, after ordering matches by `sort`.
fn first_match(documents: &[Document], filter: &Document, sort: Option<&Document>) -> DocumentResult<Option<usize>> {
    let mut candidates = Vec::new();

    for (index, document) in documents.iter().enumerate() {
        if DocumentEvaluator::new(document).evaluate(filter)? {
            candidates.push(index);
        }
    }

    if let Some(sort) = sort {
        candidates.sort_by(|a, b| compare_documents(&documents[*a], &documents[*b], sort));
    }

    Ok(candidates.first().copied())
}

/// Inserts a new document built from the equality fields of `filter` plus `update`.
fn upsert(documents: &mut Vec<Document>, filter: &Document, update: &Document) -> DocumentResult<(Bson, Document)> {
    let mut seeded = upsert_seed(filter)?;
    apply_update(&mut seeded, update, true)?;

    let seeded = with_identifier(seeded);
    let id = seeded.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

    if contains_id(documents, &id) {
        return Err(DocumentError::backend(format!("duplicate key: {ID_FIELD} {id}")));
    }

    documents.push(seeded.clone());
    Ok((id, seeded))
}

#[async_trait]
impl CollectionHandle for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, filter: Document, options: FindOneOptions) -> DocumentResult<Option<Document>> {
        let found = self
            .find(
                filter,
                FindOptions {
                    projection: options.projection,
                    sort: options.sort,
                    skip: None,
                    limit: Some(1),
                },
            )
            .await?;

        Ok(found.into_iter().next())
    }

    async fn find(&self, filter: Document, options: FindOptions) -> DocumentResult<Vec<Document>> {
        trace!(collection = %self.name, %filter, "in-memory find");

        let collections = self.collections.read().await;
        let Some(documents) = collections.get(&self.name) else {
            return Ok(vec![]);
        };

        let mut matched = DocumentEvaluator::filter_documents(documents, &filter)?;
        drop(collections);

        if let Some(sort) = &options.sort {
            sort_documents(&mut matched, sort);
        }

        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let take = match options.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
        };

        matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|document| Self::project(document, options.projection.as_ref()))
            .collect()
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> DocumentResult<Vec<Document>> {
        trace!(collection = %self.name, stages = pipeline.len(), "in-memory aggregate");

        let documents = self
            .collections
            .read()
            .await
            .get(&self.name)
            .cloned()
            .unwrap_or_default();

        run_pipeline(documents, &pipeline)
    }

    async fn insert_one(&self, document: Document) -> DocumentResult<InsertOneOutcome> {
        let document = with_identifier(document);
        let inserted_id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

        let mut collections = self.collections.write().await;
        let documents = collections.entry(self.name.clone()).or_default();

        if contains_id(documents, &inserted_id) {
            return Err(self.duplicate_key(&inserted_id));
        }

        documents.push(document);

        Ok(InsertOneOutcome {
            inserted_id,
            inserted_count: 1,
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentResult<UpdateOutcome> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(self.name.clone()).or_default();

        match first_match(documents, &filter, None)? {
            Some(index) => {
                let mut updated = documents[index].clone();
                apply_update(&mut updated, &update, false)?;

                let modified = updated != documents[index];
                documents[index] = updated;

                Ok(UpdateOutcome {
                    matched_count: 1,
                    modified_count: u64::from(modified),
                    upserted_id: None,
                })
            }
            None if options.upsert => {
                let (id, _) = upsert(documents, &filter, &update)?;

                Ok(UpdateOutcome {
                    matched_count: 0,
                    modified_count: 0,
                    upserted_id: Some(id),
                })
            }
            None => Ok(UpdateOutcome::default()),
        }
    }

    async fn delete_one(&self, filter: Document) -> DocumentResult<DeleteOutcome> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(&self.name) else {
            return Ok(DeleteOutcome::default());
        };

        match first_match(documents, &filter, None)? {
            Some(index) => {
                documents.remove(index);
                Ok(DeleteOutcome { deleted_count: 1 })
            }
            None => Ok(DeleteOutcome::default()),
        }
    }

    async fn count_documents(&self, filter: Document, options: CountOptions) -> DocumentResult<u64> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(&self.name) else {
            return Ok(0);
        };

        let mut count = 0_u64;
        for document in documents {
            if DocumentEvaluator::new(document).evaluate(&filter)? {
                count += 1;
            }
        }

        let count = count.saturating_sub(options.skip.unwrap_or(0));

        Ok(match options.limit {
            Some(limit) if limit > 0 => count.min(limit),
            _ => count,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(self.name.clone()).or_default();

        let selected = match first_match(documents, &filter, options.sort.as_ref())? {
            Some(index) => {
                let before = documents[index].clone();
                let mut after = before.clone();
                apply_update(&mut after, &update, false)?;
                documents[index] = after.clone();

                match options.return_document {
                    ReturnDocument::Before => Some(before),
                    ReturnDocument::After => Some(after),
                }
            }
            None if options.upsert => {
                let (_, inserted) = upsert(documents, &filter, &update)?;

                match options.return_document {
                    ReturnDocument::Before => None,
                    ReturnDocument::After => Some(inserted),
                }
            }
            None => None,
        };

        selected
            .map(|document| Self::project(document, options.projection.as_ref()))
            .transpose()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seeded() -> InMemoryCollection {
        let provider = InMemoryProvider::builder().connect().await.unwrap();
        let handle = provider.collection_handle("people");

        for (id, name, age) in [(1, "ada", 36), (2, "grace", 45), (3, "alan", 41)] {
            handle
                .insert_one(doc! { "_id": id, "name": name, "age": age })
                .await
                .unwrap();
        }

        handle
    }

    #[tokio::test]
    async fn test_insert_assigns_object_id_first() {
        let provider = InMemoryProvider::new();
        let handle = provider.collection_handle("things");

        let outcome = handle.insert_one(doc! { "name": "lamp" }).await.unwrap();
        let stored = handle.find_one(doc! {}, FindOneOptions::default()).await.unwrap().unwrap();

        assert!(matches!(outcome.inserted_id, Bson::ObjectId(_)));
        assert_eq!(stored.keys().next().map(String::as_str), Some(ID_FIELD));
        assert_eq!(stored.get(ID_FIELD), Some(&outcome.inserted_id));
        assert_eq!(provider.collection_names().await, vec!["things".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let handle = seeded().await;

        let err = handle.insert_one(doc! { "_id": 1, "name": "copy" }).await.unwrap_err();

        assert!(matches!(err, DocumentError::Backend(_)));
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit_projection() {
        let handle = seeded().await;

        let found = handle
            .find(
                doc! {},
                FindOptions {
                    projection: Some(doc! { "name": 1, "_id": 0 }),
                    sort: Some(doc! { "age": -1 }),
                    skip: Some(1),
                    limit: Some(5),
                },
            )
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "name": "alan" }, doc! { "name": "ada" }]);
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let handle = InMemoryProvider::new().collection_handle("nothing");

        assert!(handle.find(doc! {}, FindOptions::default()).await.unwrap().is_empty());
        assert_eq!(handle.count_documents(doc! {}, CountOptions::default()).await.unwrap(), 0);
        assert_eq!(handle.delete_one(doc! {}).await.unwrap().deleted_count, 0);
        assert!(handle.aggregate(vec![doc! { "$count": "n" }]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_one_and_upsert() {
        let handle = seeded().await;

        let outcome = handle
            .update_one(doc! { "_id": 2 }, doc! { "$set": { "age": 46 } }, UpdateOptions::default())
            .await
            .unwrap();
        assert_eq!((outcome.matched_count, outcome.modified_count), (1, 1));

        let unchanged = handle
            .update_one(doc! { "_id": 2 }, doc! { "$set": { "age": 46 } }, UpdateOptions::default())
            .await
            .unwrap();
        assert_eq!((unchanged.matched_count, unchanged.modified_count), (1, 0));

        let upserted = handle
            .update_one(
                doc! { "_id": 9 },
                doc! { "$set": { "name": "barbara" } },
                UpdateOptions { upsert: true },
            )
            .await
            .unwrap();
        assert_eq!(upserted.upserted_id, Some(Bson::Int32(9)));
        assert_eq!(upserted.upserted_count(), 1);

        let stored = handle.find_one(doc! { "_id": 9 }, FindOneOptions::default()).await.unwrap();
        assert_eq!(stored, Some(doc! { "_id": 9, "name": "barbara" }));
    }

    #[tokio::test]
    async fn test_count_with_skip_and_limit() {
        let handle = seeded().await;

        let count = handle
            .count_documents(doc! { "age": { "$gt": 30 } }, CountOptions { skip: Some(1), limit: Some(1) })
            .await
            .unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_find_one_and_update_returns_selected_version() {
        let handle = seeded().await;

        let before = handle
            .find_one_and_update(
                doc! {},
                doc! { "$inc": { "age": 1 } },
                FindOneAndUpdateOptions {
                    return_document: ReturnDocument::Before,
                    sort: Some(doc! { "age": 1 }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(before, Some(doc! { "_id": 1, "name": "ada", "age": 36 }));

        let after = handle
            .find_one_and_update(
                doc! { "name": "ada" },
                doc! { "$inc": { "age": 1 } },
                FindOneAndUpdateOptions {
                    projection: Some(doc! { "age": 1 }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(after, Some(doc! { "_id": 1, "age": 38 }));

        let missing = handle
            .find_one_and_update(doc! { "name": "nobody" }, doc! { "$set": { "x": 1 } }, Default::default())
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let provider = InMemoryProvider::new();
        let writer = provider.clone().collection_handle("shared");

        writer.insert_one(doc! { "a": 1 }).await.unwrap();

        let reader = provider.collection_handle("shared");
        assert_eq!(reader.count_documents(doc! {}, CountOptions::default()).await.unwrap(), 1);
        assert!(provider.status().await.is_connected());
    }
}
