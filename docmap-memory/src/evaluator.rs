//! Filter evaluation for in-memory documents.
//!
//! This module interprets filters written in the MongoDB query shape against BSON
//! documents, and provides the cross-type value ordering used for sorting.

use std::cmp::Ordering;
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex_lite::{Regex, RegexBuilder};

use docmap_core::error::{DocumentError, DocumentResult};


/// Comparable view of a BSON value following MongoDB's cross-type order:
/// null < numbers < strings < documents < arrays < ObjectId < booleans < dates.
///
/// Numbers compare by value whatever their width; strings compare lexicographically.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null or missing value
    Null,
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Embedded document, compared field by field in order
    Map(&'a Document),
    /// Array, compared element by element
    Array(&'a [Bson]),
    /// ObjectId value
    ObjectId(ObjectId),
    /// Boolean value
    Bool(bool),
    /// DateTime value
    DateTime(DateTime),
    /// Any other type; only equal to itself
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Document(doc) => Comparable::Map(doc),
            Bson::Array(arr) => Comparable::Array(arr),
            Bson::ObjectId(id) => Comparable::ObjectId(*id),
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(_) => 10,
        }
    }

    /// Returns `true` when both values fall in the same type bracket.
    pub(crate) fn same_bracket(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Comparable<'_> {}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => {
                for ((left_key, left), (right_key, right)) in a.iter().zip(b.iter()) {
                    let ordering = Comparable::from(left)
                        .cmp(&Comparable::from(right))
                        .then_with(|| left_key.cmp(right_key));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::Array(a), Comparable::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    let ordering = Comparable::from(left).cmp(&Comparable::from(right));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Other(a), Comparable::Other(b)) if a == b => Ordering::Equal,
            (left, right) => left.rank().cmp(&right.rank()),
        }
    }
}

/// Orders two values for sorting.
pub(crate) fn compare_values(left: &Bson, right: &Bson) -> Ordering {
    Comparable::from(left).cmp(&Comparable::from(right))
}

/// Equality with numeric widening (`1 == 1i64 == 1.0`).
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    compare_values(left, right) == Ordering::Equal
}

/// Reads a numeric value as `f64`.
pub(crate) fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(*value as f64),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

/// Collects every value reachable at a dotted `path`, descending into arrays of
/// sub-documents. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            collect_path(value, rest, &mut found);
        }
    }

    found
}

fn collect_path<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*head) {
                collect_path(next, rest, found);
            }
        }
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(next) = items.get(index) {
                    collect_path(next, rest, found);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                    collect_path(item, segments, found);
                }
            }
        },
        _ => {}
    }
}

/// Returns the first value at `path`, or null when the path is missing.
pub(crate) fn lookup_first(document: &Document, path: &str) -> Bson {
    lookup(document, path)
        .into_iter()
        .next()
        .cloned()
        .unwrap_or(Bson::Null)
}

/// A compiled `$regex` condition.
///
/// The lookahead conjunction `^(?=.*a)(?=.*b).*$` is split into independent
/// anchored patterns, all of which must match.
#[derive(Debug)]
pub(crate) struct Pattern {
    parts: Vec<Regex>,
}

impl Pattern {
    pub(crate) fn compile(pattern: &str, options: &str) -> DocumentResult<Self> {
        let sources = match split_lookaheads(pattern) {
            Some(parts) => parts
                .into_iter()
                .map(|part| format!("^(?:{part})"))
                .collect(),
            None => vec![pattern.to_string()],
        };

        let parts = sources
            .iter()
            .map(|source| {
                RegexBuilder::new(source)
                    .case_insensitive(options.contains('i'))
                    .multi_line(options.contains('m'))
                    .dot_matches_new_line(options.contains('s'))
                    .ignore_whitespace(options.contains('x'))
                    .build()
                    .map_err(|err| DocumentError::backend(format!("invalid regular expression {pattern:?}: {err}")))
            })
            .collect::<DocumentResult<Vec<_>>>()?;

        Ok(Self { parts })
    }

    pub(crate) fn is_match(&self, text: &str) -> bool {
        self.parts.iter().all(|part| part.is_match(text))
    }
}

fn split_lookaheads(pattern: &str) -> Option<Vec<&str>> {
    let mut rest = pattern.strip_prefix('^')?;
    let mut parts = Vec::new();

    while let Some(group) = rest.strip_prefix("(?=") {
        let end = closing_paren(group)?;
        parts.push(&group[..end]);
        rest = &group[end + 1..];
    }

    (!parts.is_empty() && rest == ".*$").then_some(parts)
}

fn closing_paren(group: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut chars = group.char_indices();

    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    None
}


/// Evaluates MongoDB-shaped filters against documents.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` when the document satisfies `filter`. The empty filter matches everything.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnsupportedOperator`] for operators outside the
    /// interpreted subset.
    pub fn evaluate(&self, filter: &Document) -> DocumentResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all_of(key, condition)?,
                "$or" => self.any_of(key, condition)?,
                "$nor" => !self.any_of(key, condition)?,
                op if op.starts_with('$') => {
                    return Err(DocumentError::UnsupportedOperator(op.to_string()));
                }
                path => {
                    let values = lookup(self.document, path);
                    matches_condition(&values, condition)?
                }
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> DocumentResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn clauses<'f>(op: &str, condition: &'f Bson) -> DocumentResult<Vec<&'f Document>> {
        match condition {
            Bson::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_document()
                        .ok_or_else(|| DocumentError::backend(format!("{op} entries must be documents")))
                })
                .collect(),
            _ => Err(DocumentError::backend(format!("{op} requires an array"))),
        }
    }

    fn all_of(&self, op: &str, condition: &Bson) -> DocumentResult<bool> {
        for clause in Self::clauses(op, condition)? {
            if !self.evaluate(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any_of(&self, op: &str, condition: &Bson) -> DocumentResult<bool> {
        for clause in Self::clauses(op, condition)? {
            if self.evaluate(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(doc) if doc.keys().next().is_some_and(|key| key.starts_with('$')) => Some(doc),
        _ => None,
    }
}

/// Flattens candidate values so that array fields also expose their elements.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());

    for value in values {
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
        expanded.push(*value);
    }

    expanded
}

fn matches_condition(values: &[&Bson], condition: &Bson) -> DocumentResult<bool> {
    match is_operator_document(condition) {
        Some(operators) => {
            for (op, operand) in operators {
                if !matches_operator(values, op, operand, operators)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        None => matches_equal(values, condition),
    }
}

fn matches_equal(values: &[&Bson], expected: &Bson) -> DocumentResult<bool> {
    if let Bson::RegularExpression(regex) = expected {
        let pattern = Pattern::compile(regex.pattern.as_str(), regex.options.as_str())?;
        return Ok(matches_pattern(values, &pattern));
    }

    if values.is_empty() {
        return Ok(matches!(expected, Bson::Null));
    }

    Ok(expand(values)
        .into_iter()
        .any(|value| values_equal(value, expected)))
}

fn matches_pattern(values: &[&Bson], pattern: &Pattern) -> bool {
    expand(values).into_iter().any(|value| match value {
        Bson::String(text) => pattern.is_match(text),
        _ => false,
    })
}

fn matches_ordering(values: &[&Bson], operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let expected = Comparable::from(operand);

    expand(values).into_iter().any(|value| {
        let actual = Comparable::from(value);
        actual.same_bracket(&expected) && accept(actual.cmp(&expected))
    })
}

fn operand_array<'b>(op: &str, operand: &'b Bson) -> DocumentResult<&'b [Bson]> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(DocumentError::backend(format!("{op} requires an array"))),
    }
}

fn matches_operator(values: &[&Bson], op: &str, operand: &Bson, siblings: &Document) -> DocumentResult<bool> {
    match op {
        "$eq" => matches_equal(values, operand),
        "$ne" => Ok(!matches_equal(values, operand)?),
        "$gt" => Ok(matches_ordering(values, operand, Ordering::is_gt)),
        "$gte" => Ok(matches_ordering(values, operand, Ordering::is_ge)),
        "$lt" => Ok(matches_ordering(values, operand, Ordering::is_lt)),
        "$lte" => Ok(matches_ordering(values, operand, Ordering::is_le)),
        "$in" => {
            for candidate in operand_array(op, operand)? {
                if matches_equal(values, candidate)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "$nin" => Ok(!matches_operator(values, "$in", operand, siblings)?),
        "$exists" => {
            let should_exist = match operand {
                Bson::Boolean(flag) => *flag,
                other => as_number(other).is_some_and(|n| n != 0.0),
            };
            Ok(values.is_empty() != should_exist)
        }
        "$regex" => {
            let options = siblings.get_str("$options").unwrap_or_default();
            let pattern = match operand {
                Bson::String(source) => Pattern::compile(source, options)?,
                Bson::RegularExpression(regex) => {
                    Pattern::compile(regex.pattern.as_str(), &format!("{}{options}", regex.options.as_str()))?
                }
                _ => return Err(DocumentError::backend("$regex requires a string pattern")),
            };
            Ok(matches_pattern(values, &pattern))
        }
        "$options" => Ok(true),
        "$not" => Ok(!matches_condition(values, operand)?),
        "$all" => {
            for candidate in operand_array(op, operand)? {
                if !matches_equal(values, candidate)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$size" => {
            let size = as_number(operand).ok_or_else(|| DocumentError::backend("$size requires a number"))?;
            Ok(values.iter().any(|value| match value {
                Bson::Array(items) => items.len() as f64 == size,
                _ => false,
            }))
        }
        other => Err(DocumentError::UnsupportedOperator(other.to_string())),
    }
}

fn sort_keys(sort: &Document) -> Vec<(&str, bool)> {
    sort.iter()
        .map(|(field, direction)| (field.as_str(), as_number(direction).unwrap_or(1.0) < 0.0))
        .collect()
}

fn compare_by_keys(a: &Document, b: &Document, keys: &[(&str, bool)]) -> Ordering {
    for (field, descending) in keys {
        let ordering = compare_values(&lookup_first(a, field), &lookup_first(b, field));
        let ordering = if *descending { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Orders two documents by a sort specification (`1` ascending, `-1` descending).
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &Document) -> Ordering {
    compare_by_keys(a, b, &sort_keys(sort))
}

/// Sorts documents in place by a sort specification.
/// The sort is stable: ties keep insertion order.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    let keys = sort_keys(sort);
    documents.sort_by(|a, b| compare_by_keys(a, b, &keys));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    fn matches(document: &Document, filter: Document) -> bool {
        DocumentEvaluator::new(document).evaluate(&filter).unwrap()
    }

    #[test]
    fn test_implicit_equality_and_dotted_paths() {
        let document = doc! { "name": "ada", "address": { "city": "London" }, "tags": ["a", "b"] };

        assert!(matches(&document, doc! { "name": "ada" }));
        assert!(matches(&document, doc! { "address.city": "London" }));
        assert!(matches(&document, doc! { "tags": "b" }));
        assert!(matches(&document, doc! { "tags": ["a", "b"] }));
        assert!(!matches(&document, doc! { "name": "grace" }));
        assert!(matches(&document, doc! { "missing": Bson::Null }));
    }

    #[test]
    fn test_comparison_operators_stay_in_type_bracket() {
        let document = doc! { "age": 30, "name": "ada" };

        assert!(matches(&document, doc! { "age": { "$gt": 18, "$lte": 30 } }));
        assert!(matches(&document, doc! { "age": { "$gte": 30.0 } }));
        assert!(!matches(&document, doc! { "age": { "$gt": "10" } }));
        assert!(matches(&document, doc! { "age": { "$in": [1, 30] } }));
        assert!(matches(&document, doc! { "age": { "$nin": [1, 2] } }));
        assert!(matches(&document, doc! { "age": { "$ne": 31 } }));
    }

    #[test]
    fn test_logical_operators() {
        let document = doc! { "a": 1, "b": 2 };

        assert!(matches(&document, doc! { "$and": [ { "a": 1 }, { "b": 2 } ] }));
        assert!(matches(&document, doc! { "$or": [ { "a": 9 }, { "b": 2 } ] }));
        assert!(!matches(&document, doc! { "$nor": [ { "a": 1 } ] }));
        assert!(!matches(&document, doc! { "$nor": [ {} ] }));
        assert!(matches(&document, doc! {}));
    }

    #[test]
    fn test_lookahead_regex_is_split() {
        let document = doc! { "email": "Jones.Smith@example.com" };

        assert!(matches(
            &document,
            doc! { "email": { "$regex": "^(?=.*smith)(?=.*jones).*$", "$options": "is" } },
        ));
        assert!(!matches(
            &document,
            doc! { "email": { "$regex": "^(?=.*smith)(?=.*brown).*$", "$options": "is" } },
        ));
    }

    #[test]
    fn test_escaped_regex_tokens() {
        let document = doc! { "expr": "x = a+b (c)" };

        assert!(matches(
            &document,
            doc! { "expr": { "$regex": r"^(?=.*a\+b)(?=.*\(c).*$", "$options": "is" } },
        ));
    }

    #[test]
    fn test_exists_not_all_size() {
        let document = doc! { "tags": ["a", "b", "c"] };

        assert!(matches(&document, doc! { "tags": { "$exists": true } }));
        assert!(matches(&document, doc! { "other": { "$exists": false } }));
        assert!(matches(&document, doc! { "tags": { "$all": ["a", "c"] } }));
        assert!(matches(&document, doc! { "tags": { "$size": 3 } }));
        assert!(matches(&document, doc! { "tags": { "$not": { "$size": 2 } } }));
    }

    #[test]
    fn test_unsupported_operator_is_reported() {
        let document = doc! { "a": 1 };
        let err = DocumentEvaluator::new(&document)
            .evaluate(&doc! { "a": { "$where": "true" } })
            .unwrap_err();

        assert!(matches!(err, DocumentError::UnsupportedOperator(op) if op == "$where"));
    }

    #[test]
    fn test_cross_type_order() {
        let mut values = vec![
            Bson::Boolean(false),
            Bson::String("a".into()),
            Bson::ObjectId(ObjectId::new()),
            Bson::Int32(3),
            Bson::Null,
            Bson::Array(vec![]),
            doc! {}.into(),
        ];
        values.sort_by(compare_values);

        let kinds = values.iter().map(|v| Comparable::from(v).rank()).collect::<Vec<_>>();
        assert_eq!(kinds, vec![1, 2, 3, 4, 5, 7, 8]);
    }

    #[test]
    fn test_sort_is_lexicographic_for_strings() {
        let mut documents = ["9", "10", "2", "1"]
            .iter()
            .map(|n| doc! { "n": *n })
            .collect::<Vec<_>>();

        sort_documents(&mut documents, &doc! { "n": 1 });

        let order = documents.iter().map(|d| d.get_str("n").unwrap()).collect::<Vec<_>>();
        assert_eq!(order, vec!["1", "10", "2", "9"]);
    }
}
