//! Query shaping: free-text search, sort keys, projections and query parameters.
//!
//! This module turns loosely-typed request parameters into the MongoDB query shape
//! consumed by [`CollectionHandle`](crate::backend::CollectionHandle):
//!
//! - [`tokenize`] / [`build_tokenized_query`] - free-text search over a set of fields
//! - [`key_to_sort_spec`] / [`key_or_list_to_sort_specs`] - `-field` sign convention
//! - [`coerce_count`] - lenient skip/limit coercion
//! - [`QueryParameters`] - the parameter bundle accepted by paginated finds
//! - [`QueryFilter`] - free text or a structured predicate
//!
//! # Example
//!
//! ```ignore
//! use docmap::query::{QueryParameters, build_tokenized_query};
//!
//! let params = QueryParameters::new()
//!     .filter("smith jones")
//!     .sort(["-lastName", "firstName"])
//!     .skip(10)
//!     .limit(10);
//!
//! let predicate = build_tokenized_query("smith jones", &["firstName", "lastName"]);
//! ```

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

/// Direction value used for descending sort keys.
pub const DESCENDING: i32 = -1;

/// Direction value used for excluded projection keys.
pub const EXCLUDED: i32 = 0;

/// A free-text search pattern.
///
/// Matches any string that contains every token as a case-insensitive substring,
/// in any order. A pattern without tokens matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tokens: Vec<String>,
}

impl Pattern {
    /// Returns the tokens this pattern requires.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns `true` if this pattern matches any string.
    pub fn matches_all(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Renders the pattern as a lookahead chain with every token escaped.
    ///
    /// `"smith jones"` renders as `^(?=.*smith)(?=.*jones).*$`.
    pub fn as_regex(&self) -> String {
        let lookaheads = self
            .tokens
            .iter()
            .map(|token| format!("(?=.*{})", regex_lite::escape(token)))
            .collect::<String>();

        format!("^{lookaheads}.*$")
    }

    /// Renders the pattern as a `$regex` condition.
    ///
    /// The `s` option lets `.` cross newlines so a token on any line is found.
    pub fn to_condition(&self) -> Document {
        doc! { "$regex": self.as_regex(), "$options": "is" }
    }

    /// Evaluates the pattern in-process.
    pub fn is_match(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();

        self.tokens
            .iter()
            .all(|token| haystack.contains(&token.to_lowercase()))
    }
}

/// Splits `search_text` on whitespace into a [`Pattern`].
///
/// Pattern metacharacters inside tokens are escaped when rendered, so user input
/// such as `"a+b (c"` is matched literally.
pub fn tokenize(search_text: &str) -> Pattern {
    Pattern {
        tokens: search_text
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    }
}

/// Predicate that matches no document: the negation of the empty (match-all) filter.
pub fn match_nothing() -> Document {
    doc! { "$nor": [ {} ] }
}

/// Builds a predicate matching documents where any of `searchable_fields` matches
/// every token of `filter_text`.
///
/// An empty field list yields [`match_nothing`]: no field is searchable, so nothing matches.
pub fn build_tokenized_query<S: AsRef<str>>(filter_text: &str, searchable_fields: &[S]) -> Document {
    if searchable_fields.is_empty() {
        return match_nothing();
    }

    let condition = tokenize(filter_text).to_condition();

    doc! {
        "$or": searchable_fields
            .iter()
            .map(|field| {
                let mut clause = Document::new();
                clause.insert(field.as_ref(), condition.clone());
                Bson::Document(clause)
            })
            .collect::<Vec<_>>(),
    }
}

/// A single sort or projection key: a field name (optionally `-`-prefixed) or a
/// ready-made specification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    /// A field name; a leading `-` marks descending order (or exclusion).
    Name(String),
    /// An already structured specification, passed through unchanged.
    Spec(Document),
}

impl From<&str> for KeySpec {
    fn from(value: &str) -> Self {
        KeySpec::Name(value.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(value: String) -> Self {
        KeySpec::Name(value)
    }
}

impl From<Document> for KeySpec {
    fn from(value: Document) -> Self {
        KeySpec::Spec(value)
    }
}

/// One key, an ordered list of keys, or a single specification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyOrList {
    /// A single field name.
    Key(String),
    /// An ordered list of keys.
    List(Vec<KeySpec>),
    /// A single structured specification.
    Spec(Document),
}

impl From<&str> for KeyOrList {
    fn from(value: &str) -> Self {
        KeyOrList::Key(value.to_string())
    }
}

impl From<String> for KeyOrList {
    fn from(value: String) -> Self {
        KeyOrList::Key(value)
    }
}

impl From<Document> for KeyOrList {
    fn from(value: Document) -> Self {
        KeyOrList::Spec(value)
    }
}

impl From<Vec<KeySpec>> for KeyOrList {
    fn from(value: Vec<KeySpec>) -> Self {
        KeyOrList::List(value)
    }
}

impl From<Vec<&str>> for KeyOrList {
    fn from(value: Vec<&str>) -> Self {
        KeyOrList::List(value.into_iter().map(KeySpec::from).collect())
    }
}

impl From<Vec<String>> for KeyOrList {
    fn from(value: Vec<String>) -> Self {
        KeyOrList::List(value.into_iter().map(KeySpec::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyOrList {
    fn from(value: [&str; N]) -> Self {
        KeyOrList::List(value.into_iter().map(KeySpec::from).collect())
    }
}

/// A normalized sort (or projection) entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SortSpec {
    /// A field with its direction (`1`, or the caller's descending value).
    Field {
        /// The field name, with any leading `-` stripped.
        field: String,
        /// `1` for ascending/included, otherwise the descending value.
        direction: i32,
    },
    /// A structured specification that was passed through unchanged.
    Raw(Document),
}

impl SortSpec {
    /// Converts this entry into a specification document.
    pub fn into_document(self) -> Document {
        match self {
            SortSpec::Field { field, direction } => {
                let mut document = Document::new();
                document.insert(field, direction);
                document
            }
            SortSpec::Raw(document) => document,
        }
    }
}

/// Normalizes one key: a leading `-` yields `descending_value`, otherwise `1`.
/// Structured specifications pass through unchanged.
pub fn key_to_sort_spec(key: &KeySpec, descending_value: i32) -> SortSpec {
    match key {
        KeySpec::Spec(document) => SortSpec::Raw(document.clone()),
        KeySpec::Name(name) => match name.strip_prefix('-') {
            Some(field) => SortSpec::Field {
                field: field.to_string(),
                direction: descending_value,
            },
            None => SortSpec::Field {
                field: name.clone(),
                direction: 1,
            },
        },
    }
}

/// Normalizes a key, a list of keys, or a specification into an ordered sequence.
pub fn key_or_list_to_sort_specs(key_or_list: &KeyOrList, descending_value: i32) -> Vec<SortSpec> {
    match key_or_list {
        KeyOrList::Key(name) => vec![key_to_sort_spec(&KeySpec::Name(name.clone()), descending_value)],
        KeyOrList::Spec(document) => vec![SortSpec::Raw(document.clone())],
        KeyOrList::List(keys) => keys
            .iter()
            .map(|key| key_to_sort_spec(key, descending_value))
            .collect(),
    }
}

/// Folds a sequence of specs into one ordered document. Later entries for the
/// same field replace earlier ones.
pub fn merge_specs(specs: impl IntoIterator<Item = SortSpec>) -> Document {
    let mut merged = Document::new();

    for spec in specs {
        for (key, value) in spec.into_document() {
            merged.insert(key, value);
        }
    }

    merged
}

/// Coerces a loosely-typed skip/limit value into a count.
///
/// Integers and finite non-negative doubles are accepted directly; strings are
/// read up to their first non-digit (`"10"` and `"10abc"` both give `10`).
/// Negative, non-numeric and non-coercible input yields `None` and is treated as absent.
pub fn coerce_count(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(value) => u64::try_from(*value).ok(),
        Bson::Int64(value) => u64::try_from(*value).ok(),
        Bson::Double(value) if value.is_finite() && *value >= 0.0 => Some(value.trunc() as u64),
        Bson::String(value) => parse_leading_count(value),
        _ => None,
    }
}

fn parse_leading_count(value: &str) -> Option<u64> {
    let trimmed = value.trim_start();

    if trimmed.starts_with('-') {
        return None;
    }

    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());

    unsigned[..end].parse::<u64>().ok()
}

/// Parameters for a paginated find.
///
/// Deserializes from camelCase keys (`filter`, `skip`, `limit`, `sortKeyOrList`,
/// `sortOverride`, `projectionKeyOrList`) so it can be lifted straight from a request.
///
/// # Example
///
/// ```ignore
/// let params = QueryParameters::new()
///     .sort(["-firstName"])
///     .skip("10")
///     .limit(10);
///
/// assert_eq!(params.skip_count(), Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryParameters {
    /// Free-text filter, matched against the searchable fields.
    pub filter: Option<String>,
    /// Records to omit from the front of the ordered result.
    pub skip: Option<Bson>,
    /// Maximum number of records to return.
    pub limit: Option<Bson>,
    /// Sort key(s); a leading `-` marks descending order.
    pub sort_key_or_list: Option<KeyOrList>,
    /// Raw sort document that takes precedence over `sort_key_or_list`.
    pub sort_override: Option<Document>,
    /// Projection key(s); a leading `-` excludes the field. Omitted means all fields.
    pub projection_key_or_list: Option<KeyOrList>,
}

impl QueryParameters {
    /// Creates empty parameters: no filter, no sort, no skip/limit, all fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates parameters for a 1-indexed page of `per_page` records.
    ///
    /// Page 3 with 20 per page skips 40 records.
    pub fn page(page: u64, per_page: u64) -> Self {
        let skip = page.saturating_sub(1).saturating_mul(per_page);

        Self::new()
            .skip(i64::try_from(skip).unwrap_or(i64::MAX))
            .limit(i64::try_from(per_page).unwrap_or(i64::MAX))
    }

    /// Sets the free-text filter.
    pub fn filter(mut self, text: impl Into<String>) -> Self {
        self.filter = Some(text.into());
        self
    }

    /// Sets the number of records to skip. Accepts integers or numeric strings.
    pub fn skip(mut self, skip: impl Into<Bson>) -> Self {
        self.skip = Some(skip.into());
        self
    }

    /// Sets the maximum number of records to return. Accepts integers or numeric strings.
    pub fn limit(mut self, limit: impl Into<Bson>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Sets the sort key(s).
    pub fn sort(mut self, keys: impl Into<KeyOrList>) -> Self {
        self.sort_key_or_list = Some(keys.into());
        self
    }

    /// Sets a raw sort document that overrides the sort key(s).
    pub fn sort_override(mut self, sort: Document) -> Self {
        self.sort_override = Some(sort);
        self
    }

    /// Sets the projection key(s).
    pub fn projection(mut self, keys: impl Into<KeyOrList>) -> Self {
        self.projection_key_or_list = Some(keys.into());
        self
    }

    /// Returns the coerced skip, or `None` if absent or not coercible.
    pub fn skip_count(&self) -> Option<u64> {
        self.skip.as_ref().and_then(coerce_count)
    }

    /// Returns the coerced limit, or `None` if absent or not coercible.
    pub fn limit_count(&self) -> Option<u64> {
        self.limit.as_ref().and_then(coerce_count)
    }

    /// Resolves the effective sort document. The override wins over the key list.
    pub fn sort_document(&self) -> Option<Document> {
        if let Some(sort) = &self.sort_override {
            return Some(sort.clone());
        }

        self.sort_key_or_list
            .as_ref()
            .map(|keys| merge_specs(key_or_list_to_sort_specs(keys, DESCENDING)))
            .filter(|sort| !sort.is_empty())
    }

    /// Resolves the projection into a field-inclusion map.
    pub fn projection_document(&self) -> Option<Document> {
        self.projection_key_or_list
            .as_ref()
            .map(|keys| merge_specs(key_or_list_to_sort_specs(keys, EXCLUDED)))
            .filter(|projection| !projection.is_empty())
    }
}

/// A filter supplied to a find: free text or a structured predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// Free text, tokenized against the searchable fields.
    Text(String),
    /// A predicate in the driver's query shape, used as-is.
    Structured(Document),
}

impl QueryFilter {
    /// Resolves this filter into a predicate document.
    pub fn resolve<S: AsRef<str>>(&self, searchable_fields: &[S]) -> Document {
        match self {
            QueryFilter::Text(text) => build_tokenized_query(text, searchable_fields),
            QueryFilter::Structured(document) => document.clone(),
        }
    }

    /// Returns `true` for free text.
    pub fn is_text(&self) -> bool {
        matches!(self, QueryFilter::Text(_))
    }
}

impl From<&str> for QueryFilter {
    fn from(value: &str) -> Self {
        QueryFilter::Text(value.to_string())
    }
}

impl From<String> for QueryFilter {
    fn from(value: String) -> Self {
        QueryFilter::Text(value)
    }
}

impl From<Document> for QueryFilter {
    fn from(value: Document) -> Self {
        QueryFilter::Structured(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenize_requires_every_token_in_any_order() {
        let pattern = tokenize("smith jones");

        assert!(pattern.is_match("Jones.Smith@icloud.com"));
        assert!(pattern.is_match("smith and jones"));
        assert!(!pattern.is_match("smith only"));
        assert!(!pattern.is_match("jones only"));
    }

    #[test]
    fn test_tokenize_is_case_insensitive() {
        assert!(tokenize("SMITH").is_match("ali smith"));
        assert!(tokenize("smith").is_match("ALI SMITH"));
    }

    #[test]
    fn test_tokenize_empty_matches_anything() {
        let pattern = tokenize("   ");

        assert!(pattern.matches_all());
        assert!(pattern.is_match(""));
        assert!(pattern.is_match("anything at all"));
        assert_eq!(pattern.as_regex(), "^.*$");
    }

    #[test]
    fn test_tokenize_renders_lookahead_chain() {
        assert_eq!(tokenize("smith  jones").as_regex(), "^(?=.*smith)(?=.*jones).*$");
    }

    #[test]
    fn test_tokenize_escapes_metacharacters() {
        let pattern = tokenize("a+b (c");
        let regex = pattern.as_regex();

        assert_eq!(regex, r"^(?=.*a\+b)(?=.*\(c).*$");
        assert!(regex_lite::Regex::new(r"a\+b").is_ok());
        assert!(pattern.is_match("x (c a+b"));
        assert!(!pattern.is_match("aab c"));
    }

    #[test]
    fn test_build_tokenized_query_ors_every_field() {
        let query = build_tokenized_query("smith", &["firstName", "email"]);
        let clauses = query.get_array("$or").unwrap();

        assert_eq!(clauses.len(), 2);
        assert_eq!(
            clauses[0].as_document().unwrap(),
            &doc! { "firstName": { "$regex": "^(?=.*smith).*$", "$options": "is" } },
        );
        assert!(clauses[1].as_document().unwrap().contains_key("email"));
    }

    #[test]
    fn test_build_tokenized_query_without_fields_matches_nothing() {
        let fields: [&str; 0] = [];

        assert_eq!(build_tokenized_query("smith", &fields), match_nothing());
    }

    #[test]
    fn test_key_to_sort_spec_sign_convention() {
        assert_eq!(
            key_to_sort_spec(&"-name".into(), -1),
            SortSpec::Field { field: "name".to_string(), direction: -1 },
        );
        assert_eq!(
            key_to_sort_spec(&"name".into(), -1),
            SortSpec::Field { field: "name".to_string(), direction: 1 },
        );
        assert_eq!(
            key_to_sort_spec(&KeySpec::Spec(doc! { "age": -1 }), -1),
            SortSpec::Raw(doc! { "age": -1 }),
        );
    }

    #[test]
    fn test_key_or_list_to_sort_specs_normalizes_shapes() {
        assert_eq!(
            key_or_list_to_sort_specs(&"-age".into(), -1),
            vec![SortSpec::Field { field: "age".to_string(), direction: -1 }],
        );
        assert_eq!(
            key_or_list_to_sort_specs(&KeyOrList::Spec(doc! { "age": 1 }), -1),
            vec![SortSpec::Raw(doc! { "age": 1 })],
        );
        assert_eq!(
            merge_specs(key_or_list_to_sort_specs(&["lastName", "-firstName"].into(), -1)),
            doc! { "lastName": 1, "firstName": -1 },
        );
    }

    #[test]
    fn test_projection_uses_zero_for_excluded_keys() {
        let params = QueryParameters::new().projection(["email", "-password"]);

        assert_eq!(params.projection_document(), Some(doc! { "email": 1, "password": 0 }));
    }

    #[test]
    fn test_sort_override_wins() {
        let params = QueryParameters::new()
            .sort("firstName")
            .sort_override(doc! { "lastName": -1 });

        assert_eq!(params.sort_document(), Some(doc! { "lastName": -1 }));
    }

    #[test]
    fn test_coerce_count_is_lenient() {
        assert_eq!(coerce_count(&Bson::Int32(10)), Some(10));
        assert_eq!(coerce_count(&Bson::Int64(0)), Some(0));
        assert_eq!(coerce_count(&Bson::Double(7.9)), Some(7));
        assert_eq!(coerce_count(&Bson::String("10".into())), Some(10));
        assert_eq!(coerce_count(&Bson::String(" 12abc".into())), Some(12));
        assert_eq!(coerce_count(&Bson::String("abc".into())), None);
        assert_eq!(coerce_count(&Bson::String("-3".into())), None);
        assert_eq!(coerce_count(&Bson::Int32(-1)), None);
        assert_eq!(coerce_count(&Bson::Boolean(true)), None);
    }

    #[test]
    fn test_zero_is_an_explicit_count() {
        let params = QueryParameters::new().skip(0).limit(0);

        assert_eq!(params.skip_count(), Some(0));
        assert_eq!(params.limit_count(), Some(0));
    }

    #[test]
    fn test_page_computes_offset() {
        let params = QueryParameters::page(3, 20);

        assert_eq!(params.skip_count(), Some(40));
        assert_eq!(params.limit_count(), Some(20));
        assert_eq!(QueryParameters::page(0, 20).skip_count(), Some(0));
    }

    #[test]
    fn test_query_parameters_deserialize_from_request_shape() {
        let params: QueryParameters = serde_json::from_value(serde_json::json!({
            "filter": "smith",
            "skip": "10",
            "limit": 5,
            "sortKeyOrList": ["-lastName", "firstName"],
            "projectionKeyOrList": "email",
        }))
        .unwrap();

        assert_eq!(params.filter.as_deref(), Some("smith"));
        assert_eq!(params.skip_count(), Some(10));
        assert_eq!(params.limit_count(), Some(5));
        assert_eq!(params.sort_document(), Some(doc! { "lastName": -1, "firstName": 1 }));
        assert_eq!(params.projection_document(), Some(doc! { "email": 1 }));
    }
}
