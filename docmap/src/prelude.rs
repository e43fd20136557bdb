//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - Entity traits and hydration helpers
//! - Connection providers and collection handles
//! - Query parameters, filters and predicates
//! - Gateways, cursors and pages
//! - Error types

pub use bson::{Bson, Document, doc, oid::ObjectId};

pub use docmap_core::{
    backend::{
        CollectionHandle, ConnectionProvider, ConnectionProviderBuilder, ConnectionStatus, CountOptions,
        DeleteOutcome, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument, UpdateOptions,
    },
    collection::{CollectionGateway, IntoEntity, PageRecord, PaginationOptions},
    cursor::{AggregationCursor, FindCursor},
    document::{Entity, EntityExt, Hydrate, SaveOptions, absorb, absorb_id, absorb_nested, absorb_nested_list, absorb_nested_option},
    error::{DocumentError, DocumentResult},
    filter::{Expr, FieldOp, Filter, Predicate},
    page::Page,
    query::{KeyOrList, KeySpec, QueryFilter, QueryParameters, build_tokenized_query},
    serializer::{FieldAccess, FieldSerializer, FieldValue, Render, SerializationStrategy, SerializationTarget},
    store::DocumentStore,
};
