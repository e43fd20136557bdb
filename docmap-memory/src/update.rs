//! Update operators and upsert seeding for in-memory documents.

use bson::{Bson, Document};

use docmap_core::error::{DocumentError, DocumentResult};
use docmap_core::identifier::ID_FIELD;

use crate::evaluator::as_number;

/// Applies `update` to `document`.
///
/// An update whose keys are all operators (`$set`, `$unset`, `$inc`, `$push`,
/// `$setOnInsert`) modifies fields in place; any other update replaces every field
/// except `_id`. `$setOnInsert` only applies when `inserting` is set.
pub(crate) fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> DocumentResult<()> {
    let operator_keys = update.keys().filter(|key| key.starts_with('$')).count();

    if operator_keys == 0 {
        let id = document.get(ID_FIELD).cloned();
        *document = Document::new();
        if let Some(id) = id {
            document.insert(ID_FIELD, id);
        }
        for (key, value) in update {
            if key != ID_FIELD {
                document.insert(key.clone(), value.clone());
            }
        }
        return Ok(());
    }

    if operator_keys != update.len() {
        return Err(DocumentError::backend("update mixes operators and replacement fields"));
    }

    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| DocumentError::backend(format!("{op} requires a document")))?;

        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (path, value) in fields {
                        set_path(document, path, value.clone())?;
                    }
                }
            }
            "$unset" => {
                for (path, _) in fields {
                    remove_path(document, path);
                }
            }
            "$inc" => {
                for (path, amount) in fields {
                    let current = get_path(document, path).cloned().unwrap_or(Bson::Int32(0));
                    set_path(document, path, increment(path, &current, amount)?)?;
                }
            }
            "$push" => {
                for (path, value) in fields {
                    let mut items = match get_path(document, path) {
                        None | Some(Bson::Null) => Vec::new(),
                        Some(Bson::Array(items)) => items.clone(),
                        Some(_) => {
                            return Err(DocumentError::backend(format!("$push target {path} is not an array")));
                        }
                    };

                    match value.as_document().and_then(|spec| spec.get_array("$each").ok()) {
                        Some(each) => items.extend(each.iter().cloned()),
                        None => items.push(value.clone()),
                    }

                    set_path(document, path, Bson::Array(items))?;
                }
            }
            other => return Err(DocumentError::UnsupportedOperator(other.to_string())),
        }
    }

    Ok(())
}

/// Adds two 64-bit integers, widening to a double on overflow.
pub(crate) fn add_wide(a: i64, b: i64) -> Bson {
    a.checked_add(b)
        .map(Bson::Int64)
        .unwrap_or_else(|| Bson::Double(a as f64 + b as f64))
}

fn increment(path: &str, current: &Bson, amount: &Bson) -> DocumentResult<Bson> {
    match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)))),
        (Bson::Int32(a), Bson::Int64(b)) => Ok(add_wide(i64::from(*a), *b)),
        (Bson::Int64(a), Bson::Int32(b)) => Ok(add_wide(*a, i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Ok(add_wide(*a, *b)),
        (current, amount) => match (as_number(current), as_number(amount)) {
            (Some(a), Some(b)) => Ok(Bson::Double(a + b)),
            _ => Err(DocumentError::backend(format!("$inc on non-numeric field {path}"))),
        },
    }
}

/// Reads the value at a dotted path of embedded documents.
pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(child)) => set_path(child, rest, value),
                _ => Err(DocumentError::backend(format!("cannot set {path}: {head} is not a document"))),
            }
        }
    }
}

/// Removes the value at a dotted path, if present.
pub(crate) fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// Builds the document an upsert starts from: the equality fields of `filter`.
pub(crate) fn upsert_seed(filter: &Document) -> DocumentResult<Document> {
    let mut seed = Document::new();

    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }

        let value = match condition {
            Bson::Document(operators) if operators.keys().next().is_some_and(|k| k.starts_with('$')) => {
                match operators.get("$eq") {
                    Some(value) => value.clone(),
                    None => continue,
                }
            }
            value => value.clone(),
        };

        set_path(&mut seed, key, value)?;
    }

    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inc_widens_on_overflow() {
        let mut document = doc! { "_id": 1, "small": i32::MAX, "big": i64::MAX };

        apply_update(&mut document, &doc! { "$inc": { "small": 1, "big": 1 } }, false).unwrap();

        assert_eq!(document.get("small"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(document.get("big"), Some(&Bson::Double(i64::MAX as f64 + 1.0)));
    }

    #[test]
    fn test_set_unset_inc_push() {
        let mut document = doc! { "_id": 1, "count": 1, "tags": ["a"], "old": true };

        apply_update(
            &mut document,
            &doc! {
                "$set": { "name": "ada", "address.city": "London" },
                "$unset": { "old": "" },
                "$inc": { "count": 2 },
                "$push": { "tags": "b" },
            },
            false,
        )
        .unwrap();

        assert_eq!(
            document,
            doc! {
                "_id": 1,
                "count": 3,
                "tags": ["a", "b"],
                "name": "ada",
                "address": { "city": "London" },
            },
        );
    }

    #[test]
    fn test_replacement_keeps_id() {
        let mut document = doc! { "_id": 7, "a": 1 };

        apply_update(&mut document, &doc! { "b": 2 }, false).unwrap();

        assert_eq!(document, doc! { "_id": 7, "b": 2 });
    }

    #[test]
    fn test_set_on_insert_only_when_inserting() {
        let mut document = doc! {};
        apply_update(&mut document, &doc! { "$setOnInsert": { "a": 1 } }, false).unwrap();
        assert_eq!(document, doc! {});

        apply_update(&mut document, &doc! { "$setOnInsert": { "a": 1 } }, true).unwrap();
        assert_eq!(document, doc! { "a": 1 });
    }

    #[test]
    fn test_upsert_seed_takes_equality_fields() {
        let seed = upsert_seed(&doc! {
            "email": "ada@example.com",
            "age": { "$gt": 3 },
            "role": { "$eq": "admin" },
            "$or": [ { "x": 1 } ],
        })
        .unwrap();

        assert_eq!(seed, doc! { "email": "ada@example.com", "role": "admin" });
    }

    #[test]
    fn test_mixed_update_is_rejected() {
        let mut document = doc! {};

        assert!(apply_update(&mut document, &doc! { "$set": { "a": 1 }, "b": 2 }, false).is_err());
    }
}
