//! Main docmap crate providing a unified interface for mapping typed entities onto
//! MongoDB-shaped document stores.
//!
//! This crate is the primary entry point for users of docmap. It re-exports the core
//! types and functionality from the sub-crates and provides access to the storage
//! backends.
//!
//! # Features
//!
//! - **Typed entities** - Hydrate records into Rust types, render them for display or storage
//! - **Paginated search** - Free-text search over declared fields, sort keys, projections and totals
//! - **Aggregations** - Paginate over a caller-supplied pipeline with a matching total
//! - **Multiple backends** - In-memory and MongoDB providers behind one trait seam
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryProvider};
//!
//! #[tokio::main]
//! async fn main() -> DocumentResult<()> {
//!     let store = DocumentStore::new(InMemoryProvider::builder().connect().await?);
//!
//!     let mut user = User { first_name: "Ada".into(), ..Default::default() };
//!     assert!(store.save(&mut user, SaveOptions::default()).await);
//!
//!     let params = QueryParameters::new().filter("ada").sort("-lastName").limit(20);
//!     let page: Page<User> = store
//!         .collection::<User>()
//!         .find_with_pagination(Some(&params), PaginationOptions::new())
//!         .await?;
//!
//!     println!("{} of {} users", page.len(), page.total);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmap_core::{
    backend, collection, cursor, document, error, filter, identifier, page, query, serializer, store,
};

// Re-exported for entity implementations and trait impls downstream.
pub use async_trait::async_trait;
pub use bson;
pub use serde_json;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmap_memory::{InMemoryCollection, InMemoryProvider, InMemoryProviderBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoCollectionHandle, MongoConfig, MongoProvider, MongoProviderBuilder};
}
