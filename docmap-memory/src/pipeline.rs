//! Projection and aggregation pipeline stages for in-memory documents.

use bson::{Bson, Document, doc};

use docmap_core::error::{DocumentError, DocumentResult};
use docmap_core::identifier::ID_FIELD;

use crate::evaluator::{DocumentEvaluator, as_number, compare_values, lookup_first, sort_documents, values_equal};
use crate::update::{add_wide, remove_path};

fn is_truthy(op: &str, value: &Bson) -> DocumentResult<bool> {
    match value {
        Bson::Boolean(flag) => Ok(*flag),
        other => as_number(other)
            .map(|n| n != 0.0)
            .ok_or_else(|| DocumentError::UnsupportedOperator(format!("{op} expression {other}"))),
    }
}

/// Applies a field-inclusion (or exclusion) map. `_id` is kept unless excluded explicitly.
pub(crate) fn apply_projection(document: &Document, projection: &Document) -> DocumentResult<Document> {
    let mut include_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for (field, value) in projection {
        let keep = is_truthy("$project", value)?;

        if field == ID_FIELD {
            include_id = keep;
        } else if keep {
            included.push(field.as_str());
        } else {
            excluded.push(field.as_str());
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        return Err(DocumentError::backend("projection cannot mix inclusion and exclusion"));
    }

    let mut projected = if included.is_empty() {
        let mut projected = document.clone();
        for path in excluded {
            remove_path(&mut projected, path);
        }
        projected
    } else {
        let mut projected = Document::new();
        if let Some(id) = document.get(ID_FIELD) {
            projected.insert(ID_FIELD, id.clone());
        }
        projected.extend(include_paths(document, &included));
        projected
    };

    if !include_id {
        projected.remove(ID_FIELD);
    }

    Ok(projected)
}

fn include_paths(document: &Document, paths: &[&str]) -> Document {
    let mut projected = Document::new();

    for (key, value) in document {
        if paths.contains(&key.as_str()) {
            projected.insert(key.clone(), value.clone());
            continue;
        }

        let nested = paths
            .iter()
            .filter_map(|path| path.strip_prefix(key.as_str())?.strip_prefix('.'))
            .collect::<Vec<_>>();

        if let (false, Bson::Document(child)) = (nested.is_empty(), value) {
            projected.insert(key.clone(), include_paths(child, &nested));
        }
    }

    projected
}

fn stage_count(op: &str, value: &Bson) -> DocumentResult<usize> {
    as_number(value)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
        .ok_or_else(|| DocumentError::backend(format!("{op} requires a non-negative number")))
}

/// Evaluates a `$group` key or accumulator operand: `"$field"` reads the field,
/// anything else is a constant.
fn evaluate_operand(document: &Document, operand: &Bson) -> Bson {
    match operand {
        Bson::String(path) if path.starts_with('$') => lookup_first(document, &path[1..]),
        other => other.clone(),
    }
}

enum Accumulator {
    Sum { operand: Bson, total: Bson },
    Min { operand: Bson, value: Option<Bson> },
    Max { operand: Bson, value: Option<Bson> },
    First { operand: Bson, value: Option<Bson> },
    Push { operand: Bson, values: Vec<Bson> },
}

impl Accumulator {
    fn new(spec: &Bson) -> DocumentResult<Self> {
        let (op, operand) = spec
            .as_document()
            .and_then(|spec| spec.iter().next())
            .ok_or_else(|| DocumentError::backend("$group accumulators must be documents"))?;
        let operand = operand.clone();

        Ok(match op.as_str() {
            "$sum" => Accumulator::Sum { operand, total: Bson::Int32(0) },
            "$min" => Accumulator::Min { operand, value: None },
            "$max" => Accumulator::Max { operand, value: None },
            "$first" => Accumulator::First { operand, value: None },
            "$push" => Accumulator::Push { operand, values: Vec::new() },
            other => return Err(DocumentError::UnsupportedOperator(other.to_string())),
        })
    }

    fn accumulate(&mut self, document: &Document) {
        match self {
            Accumulator::Sum { operand, total } => {
                let value = evaluate_operand(document, operand);
                *total = match (&*total, &value) {
                    (Bson::Int32(a), Bson::Int32(b)) => a
                        .checked_add(*b)
                        .map(Bson::Int32)
                        .unwrap_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b))),
                    (Bson::Int32(a), Bson::Int64(b)) => add_wide(i64::from(*a), *b),
                    (Bson::Int64(a), Bson::Int32(b)) => add_wide(*a, i64::from(*b)),
                    (Bson::Int64(a), Bson::Int64(b)) => add_wide(*a, *b),
                    (current, value) => match (as_number(current), as_number(value)) {
                        (Some(a), Some(b)) => Bson::Double(a + b),
                        _ => current.clone(),
                    },
                };
            }
            Accumulator::Min { operand, value } => {
                let candidate = evaluate_operand(document, operand);
                if value.as_ref().is_none_or(|current| compare_values(&candidate, current).is_lt()) {
                    *value = Some(candidate);
                }
            }
            Accumulator::Max { operand, value } => {
                let candidate = evaluate_operand(document, operand);
                if value.as_ref().is_none_or(|current| compare_values(&candidate, current).is_gt()) {
                    *value = Some(candidate);
                }
            }
            Accumulator::First { operand, value } => {
                if value.is_none() {
                    *value = Some(evaluate_operand(document, operand));
                }
            }
            Accumulator::Push { operand, values } => values.push(evaluate_operand(document, operand)),
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum { total, .. } => total,
            Accumulator::Min { value, .. } | Accumulator::Max { value, .. } | Accumulator::First { value, .. } => {
                value.unwrap_or(Bson::Null)
            }
            Accumulator::Push { values, .. } => Bson::Array(values),
        }
    }
}

fn group(documents: Vec<Document>, spec: &Document) -> DocumentResult<Vec<Document>> {
    let key = spec
        .get(ID_FIELD)
        .ok_or_else(|| DocumentError::backend("$group requires an _id"))?;

    let mut groups: Vec<(Bson, Vec<(String, Accumulator)>)> = Vec::new();

    for document in &documents {
        let group_key = evaluate_operand(document, key);

        let index = match groups.iter().position(|(existing, _)| values_equal(existing, &group_key)) {
            Some(index) => index,
            None => {
                let accumulators = spec
                    .iter()
                    .filter(|(field, _)| field.as_str() != ID_FIELD)
                    .map(|(field, accumulator)| Ok((field.clone(), Accumulator::new(accumulator)?)))
                    .collect::<DocumentResult<Vec<_>>>()?;
                groups.push((group_key, accumulators));
                groups.len() - 1
            }
        };

        for (_, accumulator) in &mut groups[index].1 {
            accumulator.accumulate(document);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut output = doc! { ID_FIELD: key };
            for (field, accumulator) in accumulators {
                output.insert(field, accumulator.finish());
            }
            output
        })
        .collect())
}

/// Runs `pipeline` over `documents`.
///
/// Interpreted stages: `$match`, `$project`, `$sort`, `$skip`, `$limit`, `$group`,
/// `$count` and `$unset`. Any other stage yields [`DocumentError::UnsupportedOperator`].
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> DocumentResult<Vec<Document>> {
    for stage in pipeline {
        let (op, spec) = match (stage.len(), stage.iter().next()) {
            (1, Some(entry)) => entry,
            _ => return Err(DocumentError::backend("a pipeline stage must hold exactly one operator")),
        };

        documents = match op.as_str() {
            "$match" => {
                let filter = spec
                    .as_document()
                    .ok_or_else(|| DocumentError::backend("$match requires a document"))?;
                DocumentEvaluator::filter_documents(&documents, filter)?
            }
            "$project" => {
                let projection = spec
                    .as_document()
                    .ok_or_else(|| DocumentError::backend("$project requires a document"))?;
                documents
                    .iter()
                    .map(|document| apply_projection(document, projection))
                    .collect::<DocumentResult<Vec<_>>>()?
            }
            "$sort" => {
                let sort = spec
                    .as_document()
                    .ok_or_else(|| DocumentError::backend("$sort requires a document"))?;
                sort_documents(&mut documents, sort);
                documents
            }
            "$skip" => {
                let skip = stage_count(op, spec)?;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => {
                let limit = stage_count(op, spec)?;
                documents.truncate(limit);
                documents
            }
            "$group" => {
                let spec = spec
                    .as_document()
                    .ok_or_else(|| DocumentError::backend("$group requires a document"))?;
                group(documents, spec)?
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .ok_or_else(|| DocumentError::backend("$count requires a field name"))?;
                match documents.len() {
                    0 => Vec::new(),
                    n => vec![doc! { field: i64::try_from(n).unwrap_or(i64::MAX) }],
                }
            }
            "$unset" => {
                let paths = match spec {
                    Bson::String(path) => vec![path.clone()],
                    Bson::Array(paths) => paths
                        .iter()
                        .filter_map(|path| path.as_str().map(str::to_string))
                        .collect(),
                    _ => return Err(DocumentError::backend("$unset requires a field name or list")),
                };
                for document in &mut documents {
                    for path in &paths {
                        remove_path(document, path);
                    }
                }
                documents
            }
            other => return Err(DocumentError::UnsupportedOperator(other.to_string())),
        };
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn people() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "name": "ada", "team": "a", "age": 36, "secret": "x" },
            doc! { "_id": 2, "name": "grace", "team": "b", "age": 45, "secret": "y" },
            doc! { "_id": 3, "name": "alan", "team": "a", "age": 41, "secret": "z" },
        ]
    }

    #[test]
    fn test_inclusion_projection_keeps_id() {
        let projected = apply_projection(&people()[0], &doc! { "name": 1 }).unwrap();

        assert_eq!(projected, doc! { "_id": 1, "name": "ada" });
    }

    #[test]
    fn test_exclusion_projection() {
        let projected = apply_projection(&people()[0], &doc! { "secret": 0, "_id": 0 }).unwrap();

        assert_eq!(projected, doc! { "name": "ada", "team": "a", "age": 36 });
    }

    #[test]
    fn test_dotted_inclusion() {
        let document = doc! { "_id": 1, "address": { "city": "London", "zip": "N1" } };

        assert_eq!(
            apply_projection(&document, &doc! { "address.city": 1 }).unwrap(),
            doc! { "_id": 1, "address": { "city": "London" } },
        );
    }

    #[test]
    fn test_match_sort_skip_limit() {
        let output = run_pipeline(
            people(),
            &[
                doc! { "$match": { "team": "a" } },
                doc! { "$sort": { "age": -1 } },
                doc! { "$skip": 0 },
                doc! { "$limit": 1 },
                doc! { "$project": { "name": 1, "_id": 0 } },
            ],
        )
        .unwrap();

        assert_eq!(output, vec![doc! { "name": "alan" }]);
    }

    #[test]
    fn test_group_count_by_null() {
        let output = run_pipeline(
            people(),
            &[doc! { "$group": { "_id": Bson::Null, "count": { "$sum": 1 } } }],
        )
        .unwrap();

        assert_eq!(output, vec![doc! { "_id": Bson::Null, "count": 3 }]);
    }

    #[test]
    fn test_group_by_field_with_accumulators() {
        let output = run_pipeline(
            people(),
            &[doc! { "$group": {
                "_id": "$team",
                "total": { "$sum": "$age" },
                "oldest": { "$max": "$age" },
                "names": { "$push": "$name" },
            } }],
        )
        .unwrap();

        assert_eq!(
            output,
            vec![
                doc! { "_id": "a", "total": 77, "oldest": 41, "names": ["ada", "alan"] },
                doc! { "_id": "b", "total": 45, "oldest": 45, "names": ["grace"] },
            ],
        );
    }

    #[test]
    fn test_count_and_unset() {
        assert_eq!(
            run_pipeline(people(), &[doc! { "$count": "n" }]).unwrap(),
            vec![doc! { "n": 3_i64 }],
        );
        assert!(run_pipeline(Vec::new(), &[doc! { "$count": "n" }]).unwrap().is_empty());

        let output = run_pipeline(people(), &[doc! { "$unset": ["secret", "age"] }]).unwrap();
        assert_eq!(output[0], doc! { "_id": 1, "name": "ada", "team": "a" });
    }

    #[test]
    fn test_unknown_stage_is_unsupported() {
        let err = run_pipeline(people(), &[doc! { "$lookup": {} }]).unwrap_err();

        assert!(matches!(err, DocumentError::UnsupportedOperator(op) if op == "$lookup"));
    }

    #[test]
    fn test_sum_widens_on_overflow() {
        let documents = vec![doc! { "n": i64::MAX }, doc! { "n": 1_i64 }, doc! { "n": 1 }];
        let output = run_pipeline(
            documents,
            &[doc! { "$group": { "_id": Bson::Null, "n": { "$sum": "$n" } } }],
        )
        .unwrap();

        assert_eq!(output, vec![doc! { "_id": Bson::Null, "n": i64::MAX as f64 + 2.0 }]);
    }
}
