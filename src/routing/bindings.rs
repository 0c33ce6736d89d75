//! Variable bindings and query-parameter synthesis.
//!
//! # Responsibilities
//! - Carry the values captured by template variables
//! - Map field-path components to their JSON names
//! - Render bindings as query parameters and merge them with the original query

use std::collections::BTreeMap;

use crate::service::TypeDescriptor;

/// A value captured for one template variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableBinding {
    pub field_path: Vec<String>,
    pub value: String,
}

/// Source field name → JSON name, collected from message type reflection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonNameMap(BTreeMap<String, String>);

impl JsonNameMap {
    /// Only names that differ from their JSON form (those containing `_`) are kept.
    pub fn from_types(types: &[TypeDescriptor]) -> Self {
        let mut names = BTreeMap::new();
        for field in types.iter().flat_map(|t| t.fields.iter()) {
            if field.name.contains('_') && !field.json_name.is_empty() {
                names.insert(field.name.clone(), field.json_name.clone());
            }
        }
        Self(names)
    }

    /// JSON name of `field`, or `field` itself when none is known.
    pub fn json_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.0.get(field).map(String::as_str).unwrap_or(field)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn json_path(&self, field_path: &[String]) -> String {
        field_path
            .iter()
            .map(|component| self.json_name(component))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// `a.b=1&c=2`, in binding order.
pub fn bindings_to_query_params(bindings: &[VariableBinding], names: &JsonNameMap) -> String {
    bindings
        .iter()
        .map(|b| format!("{}={}", names.json_path(&b.field_path), b.value))
        .collect::<Vec<_>>()
        .join("&")
}

/// Original query first, path-derived parameters after.
pub fn merge_query(original: Option<&str>, extracted: &str) -> Option<String> {
    match (original.filter(|q| !q.is_empty()), extracted.is_empty()) {
        (Some(orig), false) => Some(format!("{}&{}", orig, extracted)),
        (Some(orig), true) => Some(orig.to_string()),
        (None, false) => Some(extracted.to_string()),
        (None, true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::FieldDescriptor;

    fn binding(path: &str, value: &str) -> VariableBinding {
        VariableBinding {
            field_path: path.split('.').map(String::from).collect(),
            value: value.to_string(),
        }
    }

    fn names() -> JsonNameMap {
        JsonNameMap::from_types(&[TypeDescriptor {
            name: "Request".into(),
            fields: vec![
                FieldDescriptor { name: "foo_foo".into(), json_name: "fooFoo".into() },
                FieldDescriptor { name: "bar_bar".into(), json_name: "barBar".into() },
                FieldDescriptor { name: "book_id".into(), json_name: "bookId".into() },
                FieldDescriptor { name: "shelf".into(), json_name: "shelfJson".into() },
            ],
        }])
    }

    #[test]
    fn test_plain_bindings() {
        let out = bindings_to_query_params(
            &[binding("id", "42"), binding("foo.bar.baz", "value")],
            &JsonNameMap::default(),
        );
        assert_eq!(out, "id=42&foo.bar.baz=value");
    }

    #[test]
    fn test_json_name_mapping_per_component() {
        let out = bindings_to_query_params(
            &[binding("foo_foo.bar_bar", "value"), binding("book_shelf.book_id", "42")],
            &names(),
        );
        assert_eq!(out, "fooFoo.barBar=value&book_shelf.bookId=42");
    }

    #[test]
    fn test_names_without_underscore_are_untouched() {
        assert_eq!(names().json_name("shelf"), "shelf");
    }

    #[test]
    fn test_merge_query_order() {
        assert_eq!(
            merge_query(Some("lang=US&zone=us-west1"), "pet_id=31&number=565").as_deref(),
            Some("lang=US&zone=us-west1&pet_id=31&number=565")
        );
        assert_eq!(merge_query(Some(""), "a=1").as_deref(), Some("a=1"));
        assert_eq!(merge_query(Some("a=1"), "").as_deref(), Some("a=1"));
        assert_eq!(merge_query(None, ""), None);
    }
}
