//! Typed gateway over one collection.
//!
//! [`CollectionGateway`] pairs a [`CollectionHandle`] with an [`Entity`] type and offers
//! typed lookups, atomic updates, counting and paginated search.
//!
//! # Pagination
//!
//! [`CollectionGateway::find_with_pagination`] runs the page query and the total count
//! concurrently and joins them. The record type of the returned page selects the output:
//!
//! - `E` - hydrated entities
//! - `bson::Document` - raw records
//! - `serde_json::Value` - hydrated entities rendered in their display form
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let users = store.collection::<User>();
//! let params = QueryParameters::new().filter("smith").sort("-lastName").limit(20);
//!
//! let page: Page<User> = users
//!     .find_with_pagination(Some(&params), PaginationOptions::new())
//!     .await?;
//! ```

use bson::{Bson, Document, doc};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info};

use crate::{
    backend::{
        CollectionHandle, CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
    },
    cursor::{AggregationCursor, FindCursor},
    document::{Entity, EntityExt},
    error::{DocumentError, DocumentResult},
    identifier::{ID_FIELD, sanitize_id},
    page::Page,
    query::{KeyOrList, QueryFilter, QueryParameters, coerce_count},
};

/// Converts a value into an entity of type `E`.
pub trait IntoEntity<E> {
    /// Performs the conversion.
    fn into_entity(self) -> DocumentResult<E>;
}

impl<E: Entity> IntoEntity<E> for E {
    fn into_entity(self) -> DocumentResult<E> {
        Ok(self)
    }
}

impl<E: Entity> IntoEntity<E> for Document {
    fn into_entity(self) -> DocumentResult<E> {
        E::build(&self)
    }
}

/// Record types a paginated find can produce for entity `E`.
pub trait PageRecord<E: Entity>: Sized {
    /// Converts one raw record into the page's record type.
    fn from_record(record: Document) -> DocumentResult<Self>;
}

impl<E: Entity> PageRecord<E> for E {
    fn from_record(record: Document) -> DocumentResult<Self> {
        E::build(&record)
    }
}

impl<E: Entity> PageRecord<E> for Document {
    fn from_record(record: Document) -> DocumentResult<Self> {
        Ok(record)
    }
}

impl<E: Entity> PageRecord<E> for Value {
    fn from_record(record: Document) -> DocumentResult<Self> {
        Ok(E::build(&record)?.to_json())
    }
}

/// Builds a fresh aggregation cursor. Called once for the page and once for the total.
pub type AggregationFactory<H> = Box<dyn Fn() -> AggregationCursor<H> + Send + Sync>;

/// Options for [`CollectionGateway::find_with_pagination`].
pub struct PaginationOptions<H> {
    /// Base pipeline; when set, the aggregation strategy is used.
    pub aggregation: Option<AggregationFactory<H>>,
    /// Filter supplied alongside the query parameters.
    pub filter: Option<QueryFilter>,
    /// Fields matched by a text filter in this call, instead of the gateway's.
    pub searchable_fields: Option<Vec<String>>,
    /// Log the constructed command before it runs.
    pub debug: bool,
}

impl<H> PaginationOptions<H> {
    /// Creates options selecting the plain find strategy with no extra filter.
    pub fn new() -> Self {
        Self {
            aggregation: None,
            filter: None,
            searchable_fields: None,
            debug: false,
        }
    }

    /// Uses the aggregation strategy over pipelines built by `factory`.
    pub fn aggregation(mut self, factory: impl Fn() -> AggregationCursor<H> + Send + Sync + 'static) -> Self {
        self.aggregation = Some(Box::new(factory));
        self
    }

    /// Sets the filter.
    pub fn filter(mut self, filter: impl Into<QueryFilter>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Overrides the searchable fields for this call.
    pub fn searchable_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.searchable_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Enables command logging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl<H> Default for PaginationOptions<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for PaginationOptions<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationOptions")
            .field("aggregation", &self.aggregation.is_some())
            .field("filter", &self.filter)
            .field("searchable_fields", &self.searchable_fields)
            .field("debug", &self.debug)
            .finish()
    }
}

/// A typed gateway over the collection that stores `E`.
///
/// # Type Parameters
///
/// * `H` - The collection handle type
/// * `E` - The entity type stored in the collection
pub struct CollectionGateway<H, E> {
    handle: H,
    searchable_fields: Vec<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<H: Clone, E> Clone for CollectionGateway<H, E> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            searchable_fields: self.searchable_fields.clone(),
            _entity: PhantomData,
        }
    }
}

impl<H: fmt::Debug, E> fmt::Debug for CollectionGateway<H, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionGateway")
            .field("handle", &self.handle)
            .field("searchable_fields", &self.searchable_fields)
            .finish()
    }
}

impl<H: CollectionHandle, E: Entity> CollectionGateway<H, E> {
    /// Creates a gateway searching `E::searchable_fields()` by default.
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            searchable_fields: E::searchable_fields()
                .into_iter()
                .map(str::to_string)
                .collect(),
            _entity: PhantomData,
        }
    }

    /// Replaces the default searchable fields.
    pub fn with_searchable_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.searchable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the name of the underlying collection.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Returns the underlying collection handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Returns the default searchable fields.
    pub fn searchable_fields(&self) -> &[String] {
        &self.searchable_fields
    }

    /// Returns the first entity matching `filter`.
    ///
    /// A plain `_id` in `filter` is rewritten into an ObjectId in place before the lookup.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidIdentifier`] for an unparseable `_id`, or the
    /// store's error. No match is `Ok(None)`.
    pub async fn find_one(&self, filter: &mut Document, options: FindOneOptions) -> DocumentResult<Option<E>> {
        sanitize_id(filter)?;

        self.handle
            .find_one(filter.clone(), options)
            .await?
            .map(|record| E::build(&record))
            .transpose()
    }

    /// Returns the entity with the given identifier (ObjectId, hex string or integer).
    pub async fn find_by_id(&self, id: impl Into<Bson>) -> DocumentResult<Option<E>> {
        let mut filter = doc! { ID_FIELD: id.into() };

        self.find_one(&mut filter, FindOneOptions::default()).await
    }

    /// Atomically applies `update` to the first match and returns the entity version
    /// selected by `options.return_document` (the updated one by default).
    ///
    /// A plain `_id` in `filter` is rewritten into an ObjectId in place.
    pub async fn find_one_and_update(
        &self,
        filter: &mut Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentResult<Option<E>> {
        sanitize_id(filter)?;

        self.handle
            .find_one_and_update(filter.clone(), update, options)
            .await?
            .map(|record| E::build(&record))
            .transpose()
    }

    /// Counts the entities matching `filter`.
    pub async fn count(&self, filter: Document, options: CountOptions) -> DocumentResult<u64> {
        self.handle.count_documents(filter, options).await
    }

    /// Returns one page of records and the total number of matches.
    ///
    /// # Arguments
    ///
    /// * `params` - Filter text, sort, projection, skip and limit
    /// * `options` - Aggregation factory, explicit filter, searchable fields and debug flag
    ///
    /// The text filter of `params` and `options.filter` must agree when both are set. A
    /// text filter is matched against `options.searchable_fields`, or the gateway's.
    /// A limit of `0` yields no records, while the total is still computed.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Configuration`] before any store call when the two
    /// filters conflict, or when there are no parameters, no filter and no aggregation.
    /// Store errors from either round-trip propagate.
    pub async fn find_with_pagination<R: PageRecord<E>>(
        &self,
        params: Option<&QueryParameters>,
        options: PaginationOptions<H>,
    ) -> DocumentResult<Page<R>> {
        let PaginationOptions {
            aggregation,
            filter,
            searchable_fields,
            debug,
        } = options;

        if params.is_none() && filter.is_none() && aggregation.is_none() {
            return Err(DocumentError::configuration(
                "paginated find needs query parameters, a filter or an aggregation",
            ));
        }

        let defaults = QueryParameters::default();
        let params = params.unwrap_or(&defaults);

        let predicate = reconcile_filter(params.filter.as_deref(), filter)?.map(|filter| {
            filter.resolve(searchable_fields.as_deref().unwrap_or(self.searchable_fields.as_slice()))
        });

        let skip = params.skip_count();
        let limit = params.limit_count();
        let sort = params.sort_document();
        let projection = params.projection_document();

        let (records, total) = match aggregation {
            Some(factory) => {
                debug!(collection = %self.name(), "Paginating with aggregation pipeline");

                let mut data = factory();
                let mut count = factory();

                if let Some(predicate) = predicate {
                    data = data.match_stage(predicate.clone());
                    count = count.match_stage(predicate);
                }
                if let Some(sort) = sort {
                    data = data.sort(sort);
                }
                if let Some(skip) = skip {
                    data = data.skip(skip);
                }
                if let Some(limit) = limit.filter(|limit| *limit > 0) {
                    data = data.limit(limit);
                }
                if let Some(projection) = projection {
                    data = data.project(projection);
                }
                let count = count.group(doc! { "_id": Bson::Null, "count": { "$sum": 1 } });

                if debug {
                    info!(collection = %self.name(), command = %data.command(), "Paginated aggregation");
                }

                futures::try_join!(
                    async move {
                        match limit {
                            Some(0) => Ok(Vec::new()),
                            _ => data.to_vec().await,
                        }
                    },
                    async move {
                        let rows = count.to_vec().await?;
                        Ok::<_, DocumentError>(
                            rows.first()
                                .and_then(|row| row.get("count"))
                                .and_then(coerce_count)
                                .unwrap_or(0),
                        )
                    },
                )?
            }
            None => {
                debug!(collection = %self.name(), "Paginating with find cursor");

                let filter = predicate.unwrap_or_default();
                let mut cursor = FindCursor::new(self.handle.clone(), filter.clone());

                if let Some(sort) = sort {
                    cursor = cursor.sort(sort);
                }
                if let Some(skip) = skip {
                    cursor = cursor.skip(skip);
                }
                if let Some(limit) = limit.filter(|limit| *limit > 0) {
                    cursor = cursor.limit(i64::try_from(limit).unwrap_or(i64::MAX));
                }
                if let Some(projection) = projection {
                    cursor = cursor.projection(projection);
                }

                if debug {
                    info!(collection = %self.name(), command = %cursor.command(), "Paginated find");
                }

                futures::try_join!(
                    async move {
                        match limit {
                            Some(0) => Ok(Vec::new()),
                            _ => cursor.to_vec().await,
                        }
                    },
                    self.handle.count_documents(filter, CountOptions::default()),
                )?
            }
        };

        let data = records
            .into_iter()
            .map(R::from_record)
            .collect::<DocumentResult<Vec<_>>>()?;

        Ok(Page::new(data, total))
    }

    /// Paginated find over a structured filter.
    ///
    /// `options.sort` becomes the sort override and `options.projection` the projection.
    /// `skip` and `limit` take precedence over the values in `options`.
    pub async fn find<R: PageRecord<E>>(
        &self,
        filter: Document,
        options: FindOptions,
        skip: Option<u64>,
        limit: Option<u64>,
        debug: bool,
    ) -> DocumentResult<Page<R>> {
        let skip = skip.or(options.skip);
        let limit = limit.or(options.limit.and_then(|limit| u64::try_from(limit).ok()));

        let params = QueryParameters {
            sort_override: options.sort,
            projection_key_or_list: options.projection.map(KeyOrList::Spec),
            skip: skip.map(count_to_bson),
            limit: limit.map(count_to_bson),
            ..QueryParameters::default()
        };

        self.find_with_pagination(
            Some(&params),
            PaginationOptions::new().filter(filter).debug(debug),
        )
        .await
    }

    /// Converts a raw record (or an existing entity, unchanged) into an entity.
    pub fn hydrate_object(&self, raw: impl IntoEntity<E>) -> DocumentResult<E> {
        raw.into_entity()
    }

    /// Starts an aggregation over `pipeline`.
    pub fn aggregate(&self, pipeline: Vec<Document>) -> AggregationCursor<H> {
        AggregationCursor::new(self.handle.clone(), pipeline)
    }

    /// Starts a find over `filter`.
    pub fn find_cursor(&self, filter: Document, projection: Option<Document>) -> FindCursor<H> {
        let cursor = FindCursor::new(self.handle.clone(), filter);

        match projection {
            Some(projection) => cursor.projection(projection),
            None => cursor,
        }
    }
}

fn count_to_bson(count: u64) -> Bson {
    Bson::Int64(i64::try_from(count).unwrap_or(i64::MAX))
}

fn reconcile_filter(text: Option<&str>, explicit: Option<QueryFilter>) -> DocumentResult<Option<QueryFilter>> {
    match (text, explicit) {
        (Some(text), Some(explicit)) => match &explicit {
            QueryFilter::Text(other) if other == text => Ok(Some(explicit)),
            _ => Err(DocumentError::configuration(format!(
                "conflicting filters: query parameters carry {text:?} but {explicit:?} was also given"
            ))),
        },
        (Some(text), None) => Ok(Some(QueryFilter::Text(text.to_string()))),
        (None, explicit) => Ok(explicit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_accepts_equal_filters() {
        assert_eq!(
            reconcile_filter(Some("smith"), Some("smith".into())).unwrap(),
            Some(QueryFilter::Text("smith".into())),
        );
        assert_eq!(reconcile_filter(None, None).unwrap(), None);
        assert_eq!(
            reconcile_filter(None, Some(doc! { "a": 1 }.into())).unwrap(),
            Some(QueryFilter::Structured(doc! { "a": 1 })),
        );
    }

    #[test]
    fn test_reconcile_rejects_conflicts() {
        assert!(reconcile_filter(Some("smith"), Some("jones".into())).unwrap_err().is_configuration());
        assert!(reconcile_filter(Some("smith"), Some(doc! { "a": 1 }.into())).unwrap_err().is_configuration());
    }
}
