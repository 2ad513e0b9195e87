//! Core data types of the semantic-schema compiler.
//!
//! This module defines the metadata attached to models ([`FieldMetadata`],
//! [`TypeMetadata`]), the kinds a field can take ([`FieldKind`],
//! [`ScalarType`]), and the introspected shape of a model ([`FieldShape`],
//! [`TypeDefinition`], [`SchemaTree`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic metadata attached to exactly one (type, field) pair.
///
/// All parts are optional. A field with no `id` still appears in the
/// structural schema; it is simply absent from the JSON-LD context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMetadata {
    /// Absolute IRI (`https://…`) or prefixed name (`cw:scf/Protocol`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Unit of measure for numeric values (e.g. `"eV"`, `"1/Å"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Human-readable description, copied into the property schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldMetadata {
    /// Metadata carrying only a semantic identifier.
    pub fn id(iri: impl Into<String>) -> Self {
        Self {
            id: Some(iri.into()),
            ..Self::default()
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Class-level semantic metadata for a whole type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeMetadata {
    /// The type's class IRI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Primitive JSON value kinds a field can hold.
///
/// Serialises as a lowercase string (e.g. `"integer"`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    /// Any JSON value. Renders as the empty schema `{}`.
    Any,
}

impl ScalarType {
    /// The JSON Schema `type` keyword for this scalar, or `None` for [`ScalarType::Any`].
    pub fn json_type(self) -> Option<&'static str> {
        match self {
            ScalarType::String => Some("string"),
            ScalarType::Integer => Some("integer"),
            ScalarType::Number => Some("number"),
            ScalarType::Boolean => Some("boolean"),
            ScalarType::Null => Some("null"),
            ScalarType::Any => None,
        }
    }

    /// Whether `value` is an instance of this scalar type.
    ///
    /// Integers are accepted where a number is expected, mirroring JSON Schema.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ScalarType::String => value.is_string(),
            ScalarType::Integer => value.is_i64() || value.is_u64(),
            ScalarType::Number => value.is_number(),
            ScalarType::Boolean => value.is_boolean(),
            ScalarType::Null => value.is_null(),
            ScalarType::Any => true,
        }
    }
}

/// Formats the scalar as its lowercase wire-format string (e.g. `"number"`).
impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.json_type().unwrap_or("any"))
    }
}

/// Parses a [`ScalarType`] from its lowercase wire-format string.
impl std::str::FromStr for ScalarType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ScalarType::String),
            "integer" => Ok(ScalarType::Integer),
            "number" => Ok(ScalarType::Number),
            "boolean" => Ok(ScalarType::Boolean),
            "null" => Ok(ScalarType::Null),
            "any" => Ok(ScalarType::Any),
            _ => Err(format!(
                "unknown scalar type {:?}; expected one of: \
                 string, integer, number, boolean, null, any",
                s
            )),
        }
    }
}

/// The declared kind of a field.
///
/// Serialises externally tagged in snake_case, e.g.
/// `{"scalar": "string"}`, `{"reference": "Code"}`,
/// `{"collection": {"scalar": "number"}}`,
/// `{"nullable": {"reference": "Code"}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Scalar(ScalarType),
    /// A closed set of literal JSON values.
    Enumeration(Vec<Value>),
    /// A reference to another named model type.
    Reference(String),
    Collection(Box<FieldKind>),
    Union(Vec<FieldKind>),
    Nullable(Box<FieldKind>),
}

impl FieldKind {
    pub fn string() -> Self {
        FieldKind::Scalar(ScalarType::String)
    }

    pub fn integer() -> Self {
        FieldKind::Scalar(ScalarType::Integer)
    }

    pub fn number() -> Self {
        FieldKind::Scalar(ScalarType::Number)
    }

    pub fn boolean() -> Self {
        FieldKind::Scalar(ScalarType::Boolean)
    }

    pub fn any() -> Self {
        FieldKind::Scalar(ScalarType::Any)
    }

    pub fn reference(type_name: impl Into<String>) -> Self {
        FieldKind::Reference(type_name.into())
    }

    pub fn list_of(inner: FieldKind) -> Self {
        FieldKind::Collection(Box::new(inner))
    }

    pub fn nullable(inner: FieldKind) -> Self {
        FieldKind::Nullable(Box::new(inner))
    }

    pub fn union(members: impl IntoIterator<Item = FieldKind>) -> Self {
        FieldKind::Union(members.into_iter().collect())
    }

    pub fn one_of(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        FieldKind::Enumeration(values.into_iter().map(Into::into).collect())
    }

    /// Whether `null` is an accepted value for this kind.
    pub fn is_nullable(&self) -> bool {
        match self {
            FieldKind::Scalar(s) => matches!(s, ScalarType::Null | ScalarType::Any),
            FieldKind::Enumeration(values) => values.iter().any(Value::is_null),
            FieldKind::Nullable(_) => true,
            FieldKind::Union(members) => members.iter().any(FieldKind::is_nullable),
            FieldKind::Reference(_) | FieldKind::Collection(_) => false,
        }
    }

    /// Names of every model type this kind refers to, in declaration order.
    /// A name appears once even if referenced several times.
    pub fn referenced_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FieldKind::Reference(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            FieldKind::Collection(inner) | FieldKind::Nullable(inner) => {
                inner.collect_references(out)
            }
            FieldKind::Union(members) => {
                for m in members {
                    m.collect_references(out);
                }
            }
            FieldKind::Scalar(_) | FieldKind::Enumeration(_) => {}
        }
    }
}

/// The introspected shape of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name: String,
    /// `true` when the field has no default and must be present in instances.
    pub required: bool,
    pub default: Option<Value>,
    /// Normalised kind. Nullability is expressed as a union with `null`.
    pub kind: FieldKind,
    pub description: Option<String>,
    pub unit: Option<String>,
}

/// The introspected shape of one model type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldShape>,
    /// Names of the required fields, in declaration order.
    pub required: Vec<String>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<FieldShape>) -> Self {
        let required = fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone())
            .collect();
        Self {
            name: name.into(),
            fields,
            required,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether any field of this type refers to `type_name`.
    pub fn references(&self, type_name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.kind.referenced_types().contains(&type_name))
    }
}

/// A deduplicated schema tree: one root definition plus every nested type
/// transitively reachable from it.
///
/// Definitions are shared via [`Arc`], so a type referenced from several
/// fields is built once and held by every referencing location.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaTree {
    pub root: Arc<TypeDefinition>,
    /// Nested definitions keyed by type name. Contains the root's own name
    /// only if the root is self-referential.
    pub nested: BTreeMap<String, Arc<TypeDefinition>>,
}

impl SchemaTree {
    pub fn root_name(&self) -> &str {
        &self.root.name
    }

    /// Look up a definition by name, including the root.
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        match self.nested.get(name) {
            Some(def) => Some(def.as_ref()),
            None if self.root.name == name => Some(self.root.as_ref()),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_roundtrip_from_str() {
        for s in ["string", "integer", "number", "boolean", "null", "any"] {
            let parsed: ScalarType = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("float".parse::<ScalarType>().is_err());
    }

    #[test]
    fn integer_is_a_number_but_not_vice_versa() {
        assert!(ScalarType::Number.accepts(&json!(3)));
        assert!(ScalarType::Integer.accepts(&json!(3)));
        assert!(!ScalarType::Integer.accepts(&json!(3.5)));
    }

    #[test]
    fn referenced_types_are_unique_and_ordered() {
        let kind = FieldKind::union([
            FieldKind::reference("B"),
            FieldKind::list_of(FieldKind::reference("A")),
            FieldKind::nullable(FieldKind::reference("B")),
        ]);
        assert_eq!(kind.referenced_types(), vec!["B", "A"]);
    }

    #[test]
    fn nullability() {
        assert!(FieldKind::nullable(FieldKind::string()).is_nullable());
        assert!(FieldKind::union([FieldKind::integer(), FieldKind::Scalar(ScalarType::Null)])
            .is_nullable());
        assert!(!FieldKind::list_of(FieldKind::any()).is_nullable());
    }

    #[test]
    fn field_kind_wire_format() {
        let kind: FieldKind =
            serde_json::from_value(json!({"nullable": {"reference": "Code"}})).unwrap();
        assert_eq!(kind, FieldKind::nullable(FieldKind::reference("Code")));

        let kind: FieldKind =
            serde_json::from_value(json!({"collection": {"scalar": "number"}})).unwrap();
        assert_eq!(kind, FieldKind::list_of(FieldKind::number()));
    }

    #[test]
    fn required_names_follow_field_order() {
        let field = |name: &str, required: bool| FieldShape {
            name: name.into(),
            required,
            default: None,
            kind: FieldKind::string(),
            description: None,
            unit: None,
        };
        let def = TypeDefinition::new("T", vec![field("b", true), field("a", false), field("c", true)]);
        assert_eq!(def.required, vec!["b", "c"]);
        assert!(def.field("a").is_some());
    }
}
