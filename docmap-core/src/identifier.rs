//! Identifier validation and coercion.
//!
//! Entities are keyed by [`ObjectId`] under the reserved `_id` field. An identifier
//! counts as valid only when its embedded timestamp is non-zero; a zeroed id is
//! treated like a malformed one and routes a save to the insert path.

use bson::{Bson, Document, oid::ObjectId};

use crate::error::{DocumentError, DocumentResult};

/// Reserved field name of the identifier.
pub const ID_FIELD: &str = "_id";

/// Returns `true` when `id` carries a non-zero timestamp.
pub fn is_valid_identifier(id: &ObjectId) -> bool {
    id.timestamp().timestamp_millis() > 0
}

/// Builds an identifier whose timestamp is `seconds` and whose remaining bytes are zero.
pub fn identifier_from_timestamp(seconds: u32) -> ObjectId {
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    ObjectId::from_bytes(bytes)
}

/// Coerces a raw value into an identifier.
///
/// Accepts ObjectIds, 24-character hex strings and non-negative integers that fit a
/// 32-bit timestamp. Anything else yields `None`.
pub fn coerce_identifier(value: &Bson) -> Option<ObjectId> {
    match value {
        Bson::ObjectId(id) => Some(*id),
        Bson::String(hex) => ObjectId::parse_str(hex).ok(),
        Bson::Int32(n) => u32::try_from(*n).ok().map(identifier_from_timestamp),
        Bson::Int64(n) => u32::try_from(*n).ok().map(identifier_from_timestamp),
        _ => None,
    }
}

/// Rewrites a plain `_id` in `filter` into an [`ObjectId`], in place.
///
/// Hex strings and integers are converted; ObjectIds and operator documents such as
/// `{ "$in": [..] }` are left alone.
///
/// # Errors
///
/// Returns [`DocumentError::InvalidIdentifier`] when a string or integer `_id` cannot
/// be converted.
pub fn sanitize_id(filter: &mut Document) -> DocumentResult<()> {
    let Some(value) = filter.get_mut(ID_FIELD) else {
        return Ok(());
    };

    let replacement = match value {
        Bson::String(_) | Bson::Int32(_) | Bson::Int64(_) => Some(
            coerce_identifier(value)
                .ok_or_else(|| DocumentError::InvalidIdentifier(value.to_string()))?,
        ),
        _ => None,
    };

    if let Some(id) = replacement {
        *value = Bson::ObjectId(id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_zeroed_identifier_is_invalid() {
        assert!(!is_valid_identifier(&ObjectId::from_bytes([0; 12])));
        assert!(is_valid_identifier(&ObjectId::new()));
        assert!(is_valid_identifier(&identifier_from_timestamp(1)));
    }

    #[test]
    fn test_sanitize_hex_string() {
        let id = ObjectId::new();
        let mut filter = doc! { "_id": id.to_hex(), "name": "x" };

        sanitize_id(&mut filter).unwrap();

        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        assert_eq!(filter.get_str("name").unwrap(), "x");
    }

    #[test]
    fn test_sanitize_integer() {
        let mut filter = doc! { "_id": 42 };

        sanitize_id(&mut filter).unwrap();

        let id = filter.get_object_id("_id").unwrap();
        assert_eq!(id.timestamp().timestamp_millis(), 42_000);
        assert_eq!(&id.bytes()[4..], &[0; 8]);
    }

    #[test]
    fn test_sanitize_leaves_operators_and_missing_ids() {
        let mut filter = doc! { "_id": { "$in": ["a"] } };
        sanitize_id(&mut filter).unwrap();
        assert_eq!(filter, doc! { "_id": { "$in": ["a"] } });

        let mut filter = doc! { "name": "x" };
        sanitize_id(&mut filter).unwrap();
        assert_eq!(filter, doc! { "name": "x" });
    }

    #[test]
    fn test_sanitize_rejects_malformed_string() {
        let mut filter = doc! { "_id": "not-an-id" };

        assert!(matches!(
            sanitize_id(&mut filter),
            Err(DocumentError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_coerce_rejects_other_types() {
        assert_eq!(coerce_identifier(&Bson::Boolean(true)), None);
        assert_eq!(coerce_identifier(&Bson::Int64(-1)), None);
    }
}
