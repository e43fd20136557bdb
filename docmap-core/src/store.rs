//! Main entry point binding entities to a connected provider.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let store = DocumentStore::new(provider);
//! let users = store.collection::<User>();
//!
//! let mut user = User::default();
//! store.save(&mut user, SaveOptions::default()).await;
//! ```

use crate::{
    backend::{ConnectionProvider, ConnectionStatus, DeleteOutcome},
    collection::CollectionGateway,
    document::{Entity, EntityExt, SaveOptions},
    error::DocumentResult,
};

/// A document store bound to a specific connection provider.
///
/// # Type Parameters
///
/// * `P` - The connection provider type
#[derive(Debug)]
pub struct DocumentStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> DocumentStore<P> {
    /// Creates a new document store over `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Gets the gateway for the specified entity type.
    ///
    /// The collection name is taken from `E::collection_name()`.
    pub fn collection<E: Entity>(&self) -> CollectionGateway<P::Handle, E> {
        CollectionGateway::new(self.provider.collection_handle(E::collection_name()))
    }

    /// Gets a raw handle to the named collection.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the collection
    pub fn handle(&self, name: &str) -> P::Handle {
        self.provider.collection_handle(name)
    }

    /// Saves `entity`, returning `true` on success. See [`EntityExt::save`].
    pub async fn save<E: Entity>(&self, entity: &mut E, options: SaveOptions) -> bool {
        entity.save(&self.provider, options).await
    }

    /// Deletes `entity` by identifier. See [`EntityExt::delete`].
    ///
    /// # Errors
    ///
    /// Returns the store's error when the delete fails.
    pub async fn delete<E: Entity>(&self, entity: &E) -> DocumentResult<DeleteOutcome> {
        entity.delete(&self.provider).await
    }

    /// Reports whether the store is reachable.
    pub async fn status(&self) -> ConnectionStatus {
        self.provider.status().await
    }

    /// Closes the provider's connection.
    pub async fn shutdown(self) -> DocumentResult<()> {
        self.provider.shutdown().await
    }
}
