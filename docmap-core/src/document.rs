//! The entity contract: hydration, field sets, rendering and persistence.
//!
//! A type becomes a stored entity by implementing three traits:
//!
//! - [`Hydrate`] - absorb the known fields of a raw record
//! - [`FieldAccess`](crate::serializer::FieldAccess) - expose fields by name to the serializer
//! - [`Entity`] - declare the collection, the schema and the field-set hooks
//!
//! [`EntityExt`] is implemented for every entity and supplies rendering
//! (`to_display`, `to_storage`), `save` and `delete`.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! #[derive(Debug, Default)]
//! pub struct User {
//!     pub id: Option<ObjectId>,
//!     pub email: String,
//!     pub password: String,
//! }
//!
//! impl Hydrate for User {
//!     fn fill_data(&mut self, data: &Document) -> DocumentResult<()> {
//!         absorb_id(data, &mut self.id);
//!         absorb(data, "email", &mut self.email)?;
//!         absorb(data, "password", &mut self.password)
//!     }
//! }
//!
//! impl FieldAccess for User {
//!     fn field(&self, name: &str) -> Option<FieldValue<'_>> {
//!         match name {
//!             "_id" => Some(FieldValue::value(self.id)),
//!             "email" => Some(FieldValue::value(self.email.as_str())),
//!             "password" => Some(FieldValue::value(self.password.as_str())),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! impl Entity for User {
//!     fn collection_name() -> &'static str { "users" }
//!     fn schema() -> &'static [&'static str] { &["_id", "email", "password"] }
//!     fn id(&self) -> Option<&ObjectId> { self.id.as_ref() }
//!     fn properties_to_exclude(&self) -> Vec<&'static str> { vec!["password"] }
//! }
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, de::deserialize_from_bson, doc, oid::ObjectId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, warn};

use crate::backend::{CollectionHandle, ConnectionProvider, DeleteOutcome, UpdateOptions};
use crate::error::{DocumentError, DocumentResult};
use crate::identifier::{ID_FIELD, coerce_identifier, is_valid_identifier};
use crate::serializer::{FieldAccess, FieldSerializer, Render, SerializationStrategy, SerializationTarget};

/// Field names that are never serialized, whatever an entity declares.
pub const SYSTEM_EXCLUDES: [&str; 3] = ["collectionName", "includes", "excludes"];

/// Absorbs the known fields of a raw record into a value.
pub trait Hydrate: Default {
    /// Copies every recognized field of `data` onto `self`, hydrating nested
    /// values into their own types. Unknown fields are ignored and fields absent
    /// from `data` keep their current value, so filling twice with the same
    /// record is idempotent.
    fn fill_data(&mut self, data: &Document) -> DocumentResult<()>;

    /// Builds a fresh value from `data`.
    fn build(data: &Document) -> DocumentResult<Self>
    where
        Self: Sized,
    {
        let mut value = Self::default();
        value.fill_data(data)?;
        Ok(value)
    }
}

/// Deserializes `data[field]` into `slot` when the field is present.
pub fn absorb<T: DeserializeOwned>(data: &Document, field: &str, slot: &mut T) -> DocumentResult<()> {
    if let Some(value) = data.get(field) {
        *slot = deserialize_from_bson(value.clone())
            .map_err(|err| DocumentError::Hydration(field.to_string(), err.to_string()))?;
    }

    Ok(())
}

/// Absorbs the identifier. A value that cannot be coerced into an identifier is
/// discarded, leaving the slot empty.
pub fn absorb_id(data: &Document, slot: &mut Option<ObjectId>) {
    let Some(value) = data.get(ID_FIELD) else {
        return;
    };

    *slot = match value {
        Bson::Null => None,
        value => {
            let id = coerce_identifier(value);
            if id.is_none() {
                warn!(value = %value, "Discarding malformed identifier");
            }
            id
        }
    };
}

/// Hydrates a nested value in place from a sub-document.
pub fn absorb_nested<T: Hydrate>(data: &Document, field: &str, slot: &mut T) -> DocumentResult<()> {
    match data.get(field) {
        None | Some(Bson::Null) => Ok(()),
        Some(Bson::Document(nested)) => slot.fill_data(nested),
        Some(other) => Err(DocumentError::Hydration(
            field.to_string(),
            format!("expected a document, found {:?}", other.element_type()),
        )),
    }
}

/// Hydrates an optional nested value. `null` clears the slot.
pub fn absorb_nested_option<T: Hydrate>(
    data: &Document,
    field: &str,
    slot: &mut Option<T>,
) -> DocumentResult<()> {
    match data.get(field) {
        None => Ok(()),
        Some(Bson::Null) => {
            *slot = None;
            Ok(())
        }
        Some(Bson::Document(nested)) => {
            *slot = Some(T::build(nested)?);
            Ok(())
        }
        Some(other) => Err(DocumentError::Hydration(
            field.to_string(),
            format!("expected a document, found {:?}", other.element_type()),
        )),
    }
}

/// Hydrates a list of nested values, one per sub-document.
pub fn absorb_nested_list<T: Hydrate>(data: &Document, field: &str, slot: &mut Vec<T>) -> DocumentResult<()> {
    let items = match data.get(field) {
        None => return Ok(()),
        Some(Bson::Null) => {
            slot.clear();
            return Ok(());
        }
        Some(Bson::Array(items)) => items,
        Some(other) => {
            return Err(DocumentError::Hydration(
                field.to_string(),
                format!("expected an array, found {:?}", other.element_type()),
            ));
        }
    };

    *slot = items
        .iter()
        .map(|item| match item {
            Bson::Document(nested) => T::build(nested),
            other => Err(DocumentError::Hydration(
                field.to_string(),
                format!("expected a document element, found {:?}", other.element_type()),
            )),
        })
        .collect::<DocumentResult<Vec<_>>>()?;

    Ok(())
}

/// A typed record stored in a named collection.
pub trait Entity: Hydrate + FieldAccess + Send + Sync + 'static {
    /// Returns the name of the collection this entity is stored in.
    fn collection_name() -> &'static str;

    /// Returns every declared field name, `_id` included, in declaration order.
    fn schema() -> &'static [&'static str];

    /// Returns the identifier, if one has been assigned.
    fn id(&self) -> Option<&ObjectId>;

    /// Returns the fields this instance serializes before exclusions apply.
    fn own_fields(&self) -> Vec<&'static str> {
        Self::schema().to_vec()
    }

    /// Fields removed from the display form (e.g. credentials).
    fn properties_to_exclude(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Derived fields appended to the display form. Never stored.
    fn calculated_properties_to_include(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Default fields matched by free-text search in this entity's gateway.
    fn searchable_fields() -> Vec<&'static str> {
        Vec::new()
    }
}

/// Options for [`EntityExt::save`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Insert when an update by identifier matches nothing.
    pub upsert: bool,
}

/// Rendering and persistence, available on every [`Entity`].
#[async_trait]
pub trait EntityExt: Entity {
    /// Computes the serialized field set: own fields minus system and caller
    /// exclusions (declaration order), then `includes`, without duplicates.
    fn fields_to_serialize(&self, excludes: &[&str], includes: &[&str]) -> Vec<String>;

    /// Renders the presentation form.
    fn to_display(&self) -> Document;

    /// Renders the presentation form as relaxed extended JSON.
    fn to_json(&self) -> Value;

    /// Renders the persistence form.
    fn to_storage(&self) -> Document;

    /// Renders the persistence form as a BSON value.
    fn to_bson(&self) -> Bson;

    /// Returns `true` when the entity holds a valid identifier.
    fn has_valid_identifier(&self) -> bool;

    /// Persists the entity. Inserts when there is no valid identifier (absorbing the
    /// store-assigned one), otherwise updates by identifier.
    ///
    /// Never fails: store errors are logged and reported as `false`.
    async fn save<P: ConnectionProvider>(&mut self, provider: &P, options: SaveOptions) -> bool;

    /// Deletes the entity by identifier.
    ///
    /// An entity without a valid identifier deletes nothing and issues no store call.
    async fn delete<P: ConnectionProvider>(&self, provider: &P) -> DocumentResult<DeleteOutcome>;
}

#[async_trait]
impl<E: Entity> EntityExt for E {
    fn fields_to_serialize(&self, excludes: &[&str], includes: &[&str]) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();

        let own = self
            .own_fields()
            .into_iter()
            .filter(|field| !SYSTEM_EXCLUDES.contains(field) && !excludes.contains(field));

        for field in own.chain(includes.iter().copied()) {
            if !fields.iter().any(|existing| existing == field) {
                fields.push(field.to_string());
            }
        }

        fields
    }

    fn to_display(&self) -> Document {
        let fields = self.fields_to_serialize(
            &self.properties_to_exclude(),
            &self.calculated_properties_to_include(),
        );

        FieldSerializer::serialize(SerializationStrategy::Display, self, Some(&fields))
    }

    fn to_json(&self) -> Value {
        Bson::Document(self.to_display()).into_relaxed_extjson()
    }

    fn to_storage(&self) -> Document {
        let fields = self.fields_to_serialize(&[], &[]);

        FieldSerializer::serialize(SerializationStrategy::Storage, self, Some(&fields))
    }

    fn to_bson(&self) -> Bson {
        Bson::Document(self.to_storage())
    }

    fn has_valid_identifier(&self) -> bool {
        self.id().is_some_and(is_valid_identifier)
    }

    async fn save<P: ConnectionProvider>(&mut self, provider: &P, options: SaveOptions) -> bool {
        let handle = provider.collection_handle(Self::collection_name());

        let result = if self.has_valid_identifier() {
            update_entity(self, &handle, options).await
        } else {
            insert_entity(self, &handle).await
        };

        match result {
            Ok(saved) => saved,
            Err(err) => {
                error!(collection = %handle.name(), error = %err, "Failed to save entity");
                false
            }
        }
    }

    async fn delete<P: ConnectionProvider>(&self, provider: &P) -> DocumentResult<DeleteOutcome> {
        let Some(id) = self.id().copied().filter(is_valid_identifier) else {
            return Ok(DeleteOutcome::default());
        };

        provider
            .collection_handle(Self::collection_name())
            .delete_one(doc! { ID_FIELD: id })
            .await
    }
}

impl<E: Entity> Render for E {
    fn render_display(&self) -> Document {
        self.to_display()
    }

    fn render_storage(&self) -> Document {
        self.to_storage()
    }
}

impl<E: Entity> SerializationTarget for E {
    fn renderer(&self) -> Option<&dyn Render> {
        Some(self)
    }
}

async fn insert_entity<E: Entity, H: CollectionHandle>(entity: &mut E, handle: &H) -> DocumentResult<bool> {
    let mut record = entity.to_storage();
    record.remove(ID_FIELD);

    let outcome = handle.insert_one(record).await.map_err(|err| {
        error!(collection = %handle.name(), error = %err, "Insert rejected by store");
        DocumentError::Insert(err.to_string(), handle.name().to_string())
    })?;

    entity.fill_data(&doc! { ID_FIELD: outcome.inserted_id })?;

    Ok(outcome.inserted_count == 1)
}

async fn update_entity<E: Entity, H: CollectionHandle>(
    entity: &E,
    handle: &H,
    options: SaveOptions,
) -> DocumentResult<bool> {
    let Some(id) = entity.id().copied() else {
        return Ok(false);
    };

    let mut record = entity.to_storage();
    record.remove(ID_FIELD);

    let outcome = handle
        .update_one(
            doc! { ID_FIELD: id },
            doc! { "$set": record },
            UpdateOptions { upsert: options.upsert },
        )
        .await?;

    Ok(outcome.matched_count == 1 || outcome.modified_count == 1 || outcome.upserted_count() == 1)
}
