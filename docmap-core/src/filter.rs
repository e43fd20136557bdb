//! Structured filter expressions and their translation into the driver query shape.
//!
//! [`Filter`] builds [`Expr`] trees from comparisons (`eq`, `ne`, `gt`, `gte`, `lt`,
//! `lte`, `any_of`), literal text matches (`starts_with`, `contains`), `exists`, and
//! the `and`/`or` combinators. [`Filter::raw`] embeds a predicate already in the
//! driver shape.
//!
//! Expressions are translated by [`FilterTranslator`] (a [`QueryVisitor`]) and can be
//! checked against an entity's declared fields with [`Predicate`].
//!
//! ```ignore
//! use docmap::filter::{Filter, Predicate};
//!
//! let predicate = Predicate::<User>::new(
//!     Filter::eq("lastName", "Smith").and(Filter::gt("age", 18)),
//! )?;
//! ```

use bson::{Bson, Document, doc};
use std::marker::PhantomData;

use crate::document::Entity;
use crate::error::{DocumentError, DocumentResult};
use crate::query::QueryFilter;

/// Field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field equals one of an array of values.
    AnyOf,
    /// Case-insensitive literal substring, or every element of an array.
    Contains,
    /// Case-insensitive literal prefix.
    StartsWith,
}

impl FieldOp {
    fn operator(self) -> Option<&'static str> {
        Some(match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::AnyOf => "$in",
            FieldOp::Contains | FieldOp::StartsWith => return None,
        })
    }
}

/// A filter expression over document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Field presence (`true`) or absence (`false`).
    Exists(String, bool),
    Field {
        /// Dotted paths are allowed.
        field: String,
        op: FieldOp,
        value: Bson,
    },
    /// A predicate already in the driver shape, passed through untouched.
    Raw(Document),
}

impl Expr {
    /// Joins with `other` under AND, extending an existing AND list.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Joins with `other` under OR, extending an existing OR list.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Returns every field path this expression compares, in visiting order.
    /// Raw predicates contribute nothing.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut Vec<&'a str>) {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => {
                exprs.iter().for_each(|expr| expr.collect_fields(fields));
            }
            Expr::Not(expr) => expr.collect_fields(fields),
            Expr::Exists(field, _) | Expr::Field { field, .. } => fields.push(field),
            Expr::Raw(_) => {}
        }
    }

    /// Translates this expression into the driver query shape.
    pub fn to_document(&self) -> DocumentResult<Document> {
        FilterTranslator.visit_expr(self)
    }
}

/// Constructors for filter expressions.
pub struct Filter;

impl Filter {
    fn compare(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Expr {
        Expr::Field {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Lte, value)
    }

    /// Matches when the field equals one of `values`.
    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        Self::compare(field, FieldOp::AnyOf, values)
    }

    /// Matches when the string field starts with `prefix`, ignoring case.
    pub fn starts_with(field: impl Into<String>, prefix: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::StartsWith, prefix)
    }

    /// Matches a literal substring of a string field, or every element of an array.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Contains, value)
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Wraps a predicate that is already in the driver shape.
    pub fn raw(document: Document) -> Expr {
        Expr::Raw(document)
    }
}

/// Walks an [`Expr`] tree, one callback per node kind.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(&mut self, field: &str, present: bool) -> Result<Self::Output, Self::Error>;
    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> Result<Self::Output, Self::Error>;
    fn visit_raw(&mut self, document: &Document) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, present) => self.visit_exists(field, *present),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
            Expr::Raw(document) => self.visit_raw(document),
        }
    }
}

/// Translates filter expressions into driver query documents.
///
/// Text operands are escaped, so they match literally.
pub struct FilterTranslator;

impl FilterTranslator {
    fn all(&mut self, exprs: &[Expr]) -> DocumentResult<Vec<Document>> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }

    fn literal(pattern_prefix: &str, text: &str) -> Document {
        doc! { "$regex": format!("{pattern_prefix}{}", regex_lite::escape(text)), "$options": "i" }
    }
}

impl QueryVisitor for FilterTranslator {
    type Output = Document;
    type Error = DocumentError;

    fn visit_and(&mut self, exprs: &[Expr]) -> DocumentResult<Document> {
        Ok(doc! { "$and": self.all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> DocumentResult<Document> {
        Ok(doc! { "$or": self.all(exprs)? })
    }

    // `$not` is only valid on a field, so a negated predicate becomes `$nor`.
    fn visit_not(&mut self, expr: &Expr) -> DocumentResult<Document> {
        Ok(doc! { "$nor": [ self.visit_expr(expr)? ] })
    }

    fn visit_exists(&mut self, field: &str, present: bool) -> DocumentResult<Document> {
        Ok(doc! { field: { "$exists": present } })
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> DocumentResult<Document> {
        let condition = match (op, value) {
            (FieldOp::Contains, Bson::String(text)) => Self::literal("", text),
            (FieldOp::Contains, Bson::Array(values)) => doc! { "$all": values.clone() },
            (FieldOp::StartsWith, Bson::String(text)) => Self::literal("^", text),
            (FieldOp::AnyOf, other) if !matches!(other, Bson::Array(_)) => {
                return Err(DocumentError::configuration(format!(
                    "any_of on {field} requires an array of values"
                )));
            }
            (FieldOp::Contains | FieldOp::StartsWith, _) => {
                return Err(DocumentError::configuration(format!(
                    "{op:?} on {field} requires a string value"
                )));
            }
            (op, value) => match op.operator() {
                Some(operator) => doc! { operator: value.clone() },
                None => return Err(DocumentError::configuration(format!("{op:?} has no operator"))),
            },
        };

        Ok(doc! { field: condition })
    }

    fn visit_raw(&mut self, document: &Document) -> DocumentResult<Document> {
        Ok(document.clone())
    }
}

/// A translated filter whose field paths are known to belong to `E`.
///
/// Construction fails with [`DocumentError::Configuration`] when the first segment
/// of any compared path is neither `_id` nor one of `E::schema()`.
pub struct Predicate<E> {
    document: Document,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        Self {
            document: self.document.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Predicate").field(&self.document).finish()
    }
}

impl<E: Entity> Predicate<E> {
    /// Validates and translates `expr`.
    pub fn new(expr: Expr) -> DocumentResult<Self> {
        let schema = E::schema();

        for path in expr.referenced_fields() {
            let root = path.split('.').next().unwrap_or(path);

            if root != "_id" && !schema.contains(&root) {
                return Err(DocumentError::configuration(format!(
                    "unknown field {path} for collection {}",
                    E::collection_name()
                )));
            }
        }

        Ok(Self {
            document: expr.to_document()?,
            _entity: PhantomData,
        })
    }

    /// Returns the translated predicate.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Consumes the predicate, returning the translated document.
    pub fn into_document(self) -> Document {
        self.document
    }
}

impl<E: Entity> From<Predicate<E>> for QueryFilter {
    fn from(value: Predicate<E>) -> Self {
        QueryFilter::Structured(value.into_document())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_translate_comparisons() {
        let expr = Filter::eq("status", "active").and(Filter::gt("age", 18));

        assert_eq!(
            expr.to_document().unwrap(),
            doc! { "$and": [ { "status": { "$eq": "active" } }, { "age": { "$gt": 18 } } ] },
        );
    }

    #[test]
    fn test_translate_escapes_string_operands() {
        assert_eq!(
            Filter::contains("email", "a.b+").to_document().unwrap(),
            doc! { "email": { "$regex": r"a\.b\+", "$options": "i" } },
        );
        assert_eq!(
            Filter::starts_with("name", "(x").to_document().unwrap(),
            doc! { "name": { "$regex": r"^\(x", "$options": "i" } },
        );
    }

    #[test]
    fn test_translate_not_uses_nor() {
        assert_eq!(
            Filter::exists("deletedAt").not().to_document().unwrap(),
            doc! { "$nor": [ { "deletedAt": { "$exists": true } } ] },
        );
    }

    #[test]
    fn test_translate_raw_passthrough() {
        let raw = doc! { "tags": { "$size": 2 } };

        assert_eq!(Filter::raw(raw.clone()).to_document().unwrap(), raw);
    }

    #[test]
    fn test_starts_with_rejects_non_string() {
        let err = Filter::starts_with("age", 3).to_document().unwrap_err();

        assert!(err.is_configuration());
    }

    #[test]
    fn test_referenced_fields_walks_tree() {
        let expr = Filter::or([
            Filter::eq("a", 1),
            Filter::and([Filter::exists("b.c"), Filter::raw(doc! { "z": 1 })]).not(),
        ]);

        assert_eq!(expr.referenced_fields(), vec!["a", "b.c"]);
    }

    #[test]
    fn test_any_of_translates_to_in() {
        assert_eq!(
            Filter::any_of("role", ["admin", "author"]).to_document().unwrap(),
            doc! { "role": { "$in": ["admin", "author"] } },
        );
        assert!(Filter::compare("role", FieldOp::AnyOf, "admin").to_document().unwrap_err().is_configuration());
    }
}
