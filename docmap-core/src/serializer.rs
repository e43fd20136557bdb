//! Strategy-driven field serialization.
//!
//! An entity is rendered in one of two [`SerializationStrategy`] variants: `Display`
//! for presentation and `Storage` for persistence. [`FieldSerializer`] walks a field
//! set on any [`FieldAccess`] target and recursively renders nested values with the
//! same strategy, each nested value choosing its own default field set.
//!
//! The display form leaves out unset values (`null`) and empty lists. The storage
//! form keeps both so that a stored record can be overwritten field by field.
//!
//! Nested values are rendered without cycle detection. A value graph that refers
//! back to itself (only possible through shared `Rc`/`Arc` structures) recurses
//! without bound.

use bson::{Bson, Document};

/// Which rendering of an entity to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SerializationStrategy {
    /// Presentation form: exclusions removed, calculated fields appended.
    #[default]
    Display,
    /// Persistence form: exclusions kept, calculated fields omitted.
    Storage,
}

/// A value that knows how to render itself under both strategies, using its own
/// default field set.
pub trait Render: Send + Sync {
    /// Renders the presentation form.
    fn render_display(&self) -> Document;

    /// Renders the persistence form.
    fn render_storage(&self) -> Document;

    /// Renders the form selected by `strategy`.
    fn render(&self, strategy: SerializationStrategy) -> Document {
        match strategy {
            SerializationStrategy::Display => self.render_display(),
            SerializationStrategy::Storage => self.render_storage(),
        }
    }
}

/// A field value as seen by the serializer.
pub enum FieldValue<'a> {
    /// A plain value, copied into the output as-is.
    Value(Bson),
    /// A nested entity that renders itself.
    Nested(&'a dyn Render),
    /// A list whose elements are rendered one by one.
    List(Vec<FieldValue<'a>>),
}

impl<'a> FieldValue<'a> {
    /// Wraps a plain value.
    pub fn value(value: impl Into<Bson>) -> Self {
        FieldValue::Value(value.into())
    }

    /// Wraps a nested entity.
    pub fn nested(value: &'a dyn Render) -> Self {
        FieldValue::Nested(value)
    }

    /// Wraps a list of nested entities.
    pub fn list<R: Render>(values: &'a [R]) -> Self {
        FieldValue::List(
            values
                .iter()
                .map(|value| FieldValue::Nested(value as &dyn Render))
                .collect(),
        )
    }

    fn is_blank(&self) -> bool {
        match self {
            FieldValue::Value(Bson::Null) => true,
            FieldValue::Value(Bson::Array(items)) => items.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    fn render(&self, strategy: SerializationStrategy) -> Bson {
        match self {
            FieldValue::Value(value) => value.clone(),
            FieldValue::Nested(nested) => Bson::Document(nested.render(strategy)),
            FieldValue::List(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| item.render(strategy))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldValue::Nested(_) => f.write_str("Nested(..)"),
            FieldValue::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

/// Name-based field lookup on a serialization target.
pub trait FieldAccess {
    /// Returns the value of `name`, or `None` when the target has no such field.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

/// Anything [`FieldSerializer`] can render.
///
/// Every entity is a target whose renderer is its own default rendering. Other
/// field holders opt in with an empty impl, or supply a renderer of their own.
pub trait SerializationTarget: FieldAccess {
    /// Returns the target's own renderer, used when no field set is supplied.
    fn renderer(&self) -> Option<&dyn Render> {
        None
    }
}

/// Renders a field set of a target under a strategy.
pub struct FieldSerializer;

impl FieldSerializer {
    /// Produces a document holding each requested field of `target`, in request order.
    ///
    /// - No field set: delegate to the target's renderer, or produce an empty document.
    /// - Duplicate names are rendered once, at their first position.
    /// - Fields the target does not have are omitted, as are blank values in the
    ///   display form.
    pub fn serialize(
        strategy: SerializationStrategy,
        target: &dyn SerializationTarget,
        fields: Option<&[String]>,
    ) -> Document {
        let Some(fields) = fields else {
            return target
                .renderer()
                .map(|renderer| renderer.render(strategy))
                .unwrap_or_default();
        };

        let mut output = Document::new();

        for name in fields {
            if output.contains_key(name) {
                continue;
            }

            let Some(value) = target.field(name) else {
                continue;
            };

            if strategy == SerializationStrategy::Display && value.is_blank() {
                continue;
            }

            output.insert(name.clone(), value.render(strategy));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    struct Swatch {
        name: &'static str,
        hex: &'static str,
    }

    impl Render for Swatch {
        fn render_display(&self) -> Document {
            doc! { "name": self.name }
        }

        fn render_storage(&self) -> Document {
            doc! { "name": self.name, "hex": self.hex }
        }
    }

    struct Palette {
        title: &'static str,
        primary: Swatch,
        swatches: Vec<Swatch>,
        tags: Vec<&'static str>,
    }

    impl FieldAccess for Palette {
        fn field(&self, name: &str) -> Option<FieldValue<'_>> {
            match name {
                "title" => Some(FieldValue::value(self.title)),
                "primary" => Some(FieldValue::nested(&self.primary)),
                "swatches" => Some(FieldValue::list(&self.swatches)),
                "tags" => Some(FieldValue::value(self.tags.clone())),
                "mixed" => Some(FieldValue::List(vec![
                    FieldValue::value(1),
                    FieldValue::nested(&self.primary),
                    FieldValue::List(vec![FieldValue::nested(&self.primary)]),
                ])),
                "empty" => Some(FieldValue::list::<Swatch>(&[])),
                "unset" => Some(FieldValue::value(None::<&str>)),
                _ => None,
            }
        }
    }

    impl SerializationTarget for Palette {}

    fn palette() -> Palette {
        Palette {
            title: "warm",
            primary: Swatch { name: "red", hex: "#f00" },
            swatches: vec![
                Swatch { name: "orange", hex: "#fa0" },
                Swatch { name: "yellow", hex: "#ff0" },
            ],
            tags: vec!["a", "b"],
        }
    }

    fn names(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_serialize_nested_uses_strategy() {
        let palette = palette();
        let fields = names(&["title", "primary", "swatches"]);

        assert_eq!(
            FieldSerializer::serialize(SerializationStrategy::Display, &palette, Some(&fields)),
            doc! {
                "title": "warm",
                "primary": { "name": "red" },
                "swatches": [ { "name": "orange" }, { "name": "yellow" } ],
            },
        );
        assert_eq!(
            FieldSerializer::serialize(SerializationStrategy::Storage, &palette, Some(&fields)),
            doc! {
                "title": "warm",
                "primary": { "name": "red", "hex": "#f00" },
                "swatches": [ { "name": "orange", "hex": "#fa0" }, { "name": "yellow", "hex": "#ff0" } ],
            },
        );
    }

    #[test]
    fn test_serialize_deduplicates_and_omits_missing() {
        let palette = palette();
        let fields = names(&["tags", "missing", "title", "tags"]);
        let output = FieldSerializer::serialize(SerializationStrategy::Display, &palette, Some(&fields));

        assert_eq!(output, doc! { "tags": ["a", "b"], "title": "warm" });
        assert_eq!(output.keys().collect::<Vec<_>>(), vec!["tags", "title"]);
    }

    #[test]
    fn test_serialize_mixed_lists() {
        let palette = palette();
        let fields = names(&["mixed"]);

        assert_eq!(
            FieldSerializer::serialize(SerializationStrategy::Display, &palette, Some(&fields)),
            doc! { "mixed": [ 1, { "name": "red" }, [ { "name": "red" } ] ] },
        );
    }

    #[test]
    fn test_serialize_without_fields_or_renderer_is_empty() {
        let palette = palette();

        assert_eq!(
            FieldSerializer::serialize(SerializationStrategy::Display, &palette, None),
            Document::new(),
        );
    }

    #[test]
    fn test_serialize_without_fields_delegates_to_renderer() {
        struct Wrapped(Swatch);

        impl FieldAccess for Wrapped {
            fn field(&self, _name: &str) -> Option<FieldValue<'_>> {
                None
            }
        }

        impl SerializationTarget for Wrapped {
            fn renderer(&self) -> Option<&dyn Render> {
                Some(&self.0)
            }
        }

        let wrapped = Wrapped(Swatch { name: "blue", hex: "#00f" });

        assert_eq!(
            FieldSerializer::serialize(SerializationStrategy::Storage, &wrapped, None),
            doc! { "name": "blue", "hex": "#00f" },
        );
    }

    #[test]
    fn test_display_drops_blank_values_storage_keeps_them() {
        let palette = palette();
        let fields = names(&["title", "empty", "unset"]);

        assert_eq!(
            FieldSerializer::serialize(SerializationStrategy::Display, &palette, Some(&fields)),
            doc! { "title": "warm" },
        );
        assert_eq!(
            FieldSerializer::serialize(SerializationStrategy::Storage, &palette, Some(&fields)),
            doc! { "title": "warm", "empty": [], "unset": null },
        );
    }
}
