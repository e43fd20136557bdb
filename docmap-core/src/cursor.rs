//! Deferred find and aggregation commands.
//!
//! A cursor collects the shape of a query and issues it only when materialized with
//! `to_vec`, which consumes the cursor. Since a cursor is single-use, callers that need
//! the same pipeline twice (data and total) supply a factory that builds a fresh one.

use bson::{Bson, Document, doc};

use crate::backend::{CollectionHandle, FindOptions};
use crate::error::DocumentResult;
use crate::query::{SortSpec, merge_specs};

/// A deferred find over one collection.
///
/// ```ignore
/// let users = gateway
///     .find_cursor(doc! { "lastName": "Smith" }, None)
///     .sort(doc! { "firstName": 1 })
///     .skip(10)
///     .limit(10)
///     .to_vec()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct FindCursor<H> {
    handle: H,
    filter: Document,
    options: FindOptions,
}

impl<H: CollectionHandle> FindCursor<H> {
    /// Creates a cursor matching `filter`.
    pub fn new(handle: H, filter: Document) -> Self {
        Self {
            handle,
            filter,
            options: FindOptions::default(),
        }
    }

    /// Adds sort keys. Keys from successive calls are merged in call order.
    pub fn sort(mut self, sort: Document) -> Self {
        let current = self.options.sort.take().unwrap_or_default();

        self.options.sort = Some(merge_specs([SortSpec::Raw(current), SortSpec::Raw(sort)]));
        self
    }

    /// Omits the first `skip` matches.
    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Returns at most `limit` matches.
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Restricts the returned fields.
    pub fn projection(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    /// Returns the filter this cursor matches.
    pub fn filter(&self) -> &Document {
        &self.filter
    }

    /// Returns the accumulated find options.
    pub fn options(&self) -> &FindOptions {
        &self.options
    }

    /// Describes the find command this cursor will issue.
    pub fn command(&self) -> Document {
        let mut command = doc! {
            "find": self.handle.name(),
            "filter": self.filter.clone(),
        };

        if let Some(sort) = &self.options.sort {
            command.insert("sort", sort.clone());
        }
        if let Some(projection) = &self.options.projection {
            command.insert("projection", projection.clone());
        }
        if let Some(skip) = self.options.skip {
            command.insert("skip", i64::try_from(skip).unwrap_or(i64::MAX));
        }
        if let Some(limit) = self.options.limit {
            command.insert("limit", limit);
        }

        command
    }

    /// Issues the find and collects every returned document.
    pub async fn to_vec(self) -> DocumentResult<Vec<Document>> {
        self.handle.find(self.filter, self.options).await
    }
}

/// A deferred aggregation pipeline over one collection.
#[derive(Debug, Clone)]
pub struct AggregationCursor<H> {
    handle: H,
    pipeline: Vec<Document>,
}

impl<H: CollectionHandle> AggregationCursor<H> {
    /// Creates a cursor over `pipeline`.
    pub fn new(handle: H, pipeline: Vec<Document>) -> Self {
        Self { handle, pipeline }
    }

    /// Appends an arbitrary stage.
    pub fn stage(mut self, stage: Document) -> Self {
        self.pipeline.push(stage);
        self
    }

    /// Appends a `$match` stage.
    pub fn match_stage(self, filter: Document) -> Self {
        self.stage(doc! { "$match": filter })
    }

    /// Appends a `$group` stage.
    pub fn group(self, group: Document) -> Self {
        self.stage(doc! { "$group": group })
    }

    /// Appends a `$sort` stage.
    pub fn sort(self, sort: Document) -> Self {
        self.stage(doc! { "$sort": sort })
    }

    /// Appends a `$skip` stage.
    pub fn skip(self, skip: u64) -> Self {
        self.stage(doc! { "$skip": i64::try_from(skip).unwrap_or(i64::MAX) })
    }

    /// Appends a `$limit` stage.
    pub fn limit(self, limit: u64) -> Self {
        self.stage(doc! { "$limit": i64::try_from(limit).unwrap_or(i64::MAX) })
    }

    /// Appends a `$project` stage.
    pub fn project(self, projection: Document) -> Self {
        self.stage(doc! { "$project": projection })
    }

    /// Returns the stages accumulated so far.
    pub fn pipeline(&self) -> &[Document] {
        &self.pipeline
    }

    /// Describes the aggregate command this cursor will issue.
    pub fn command(&self) -> Document {
        doc! {
            "aggregate": self.handle.name(),
            "pipeline": self.pipeline.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
        }
    }

    /// Runs the pipeline and collects its output.
    pub async fn to_vec(self) -> DocumentResult<Vec<Document>> {
        self.handle.aggregate(self.pipeline).await
    }
}
