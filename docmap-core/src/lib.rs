//! A thin object-document mapping layer over MongoDB-shaped document stores.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Connection seam** ([`backend`]) - Traits for connection providers and collection handles
//! - **Query shaping** ([`query`]) - Tokenized search, sort keys, projections and query parameters
//! - **Structured filters** ([`filter`]) - Filter expressions and schema-checked predicates
//! - **Cursors** ([`cursor`]) - Deferred find and aggregation commands
//! - **Serialization** ([`serializer`]) - Strategy-driven field rendering
//! - **Entities** ([`document`]) - Hydration, field sets, save and delete
//! - **Identifiers** ([`identifier`]) - ObjectId validation and filter sanitization
//! - **Gateways** ([`collection`]) - Typed finds, counts and paginated search
//! - **Document store** ([`store`]) - Entry point binding entities to a provider
//! - **Pages** ([`page`]) - Paginated results
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let store = DocumentStore::new(provider);
//! let page: Page<User> = store
//!     .collection::<User>()
//!     .find_with_pagination(Some(&QueryParameters::page(1, 20)), PaginationOptions::new())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod backend;
pub mod collection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod filter;
pub mod identifier;
pub mod page;
pub mod query;
pub mod serializer;
pub mod store;
