//! MongoDB backend implementation for docmap.
//!
//! This crate provides a `ConnectionProvider` over the official MongoDB driver.
//! Filters, updates and pipelines are handed to the server untouched.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Connection retry** - The initial ping is retried with a fixed wait between attempts
//! - **TLS** - A CA certificate can be supplied for production deployments
//! - **Serde configuration** - [`MongoConfig`] deserializes from application config
//!
//! # Example
//!
//! ```ignore
//! use docmap::{backend::ConnectionProviderBuilder, mongodb::MongoProvider, DocumentStore};
//!
//! let provider = MongoProvider::builder("mongodb://localhost:27017/shop")
//!     .connection_retry_max(3)
//!     .connect()
//!     .await?;
//! let store = DocumentStore::new(provider);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_mongodb;

pub mod config;
pub mod store;

pub use config::MongoConfig;
pub use store::{MongoCollectionHandle, MongoProvider, MongoProviderBuilder};
