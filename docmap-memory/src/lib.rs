//! In-memory document storage backend for docmap.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `ConnectionProvider` and `CollectionHandle` traits. It uses async-aware read-write
//! locks for concurrent access and is ideal for development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Filter interpretation** - Comparison, logical, array and `$regex` operators
//! - **Updates** - `$set`, `$unset`, `$inc`, `$push`, `$setOnInsert`, replacements and upserts
//! - **Aggregation** - `$match`, `$project`, `$sort`, `$skip`, `$limit`, `$group`, `$count`, `$unset`
//!
//! Operators outside this subset fail with `DocumentError::UnsupportedOperator`
//! rather than being ignored.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryProvider};
//!
//! let provider = InMemoryProvider::builder().connect().await?;
//! let store = DocumentStore::new(provider);
//!
//! let mut user = User::default();
//! assert!(store.save(&mut user, SaveOptions::default()).await);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

mod evaluator;
mod pipeline;
mod update;
pub mod store;

pub use store::{InMemoryCollection, InMemoryProvider, InMemoryProviderBuilder};
