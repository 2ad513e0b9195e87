//! Document assembly: schema tree + context (+ instance) → [`SemanticDocument`].
//!
//! The assembled document is a JSON Schema (`$defs`, `properties`,
//! `required`, `title`, `type`) and a JSON-LD node (`@context`, `@type`) at
//! the same time. When instance data is supplied its field values are
//! checked against the root shape and flattened onto the top level, so the
//! same object also carries the concrete data.

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::context::ContextMap;
use crate::types::{FieldKind, FieldShape, SchemaTree, TypeDefinition};

/// Top-level keys owned by the document structure. A root field may not
/// use any of these names (see [`IntrospectError::ReservedFieldName`]).
///
/// [`IntrospectError::ReservedFieldName`]: crate::introspect::IntrospectError::ReservedFieldName
pub const RESERVED_KEYS: [&str; 7] = [
    "@context",
    "$defs",
    "properties",
    "required",
    "title",
    "type",
    "@type",
];

/// Errors raised when instance data does not fit the declared shape.
///
/// Paths are written `$.field[index].field`, rooted at the instance.
#[derive(Debug, Error, PartialEq)]
pub enum SerializationError {
    #[error("{path}: expected an object of type {type_name}, got {found}")]
    NotAnObject {
        path: String,
        type_name: String,
        found: &'static str,
    },

    #[error("{path}: unknown field {field:?}")]
    UnknownField { path: String, field: String },

    #[error("{path}: missing required field {field:?}")]
    MissingField { path: String, field: String },

    #[error("{path}: expected {expected}, got {found}")]
    ShapeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("type {0:?} has no definition in the schema tree")]
    MissingDefinition(String),

    #[error("default of {type_name}.{field} does not fit its kind: {source}")]
    InvalidDefault {
        type_name: String,
        field: String,
        #[source]
        source: Box<SerializationError>,
    },
}

/// A compiled document: structural schema, JSON-LD context and optional
/// instance values in one object.
///
/// Serialises in the order `@context`, `$defs`, `properties`, `required`,
/// `title`, `type`, `@type`, then the instance fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticDocument {
    #[serde(rename = "@context")]
    pub context: ContextMap,

    #[serde(rename = "$defs")]
    pub defs: Map<String, Value>,

    pub properties: Map<String, Value>,

    pub required: Vec<String>,

    pub title: String,

    /// Always `"object"`.
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(rename = "@type")]
    pub type_name: String,

    /// Flattened instance values. Empty when no instance was supplied.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl SemanticDocument {
    pub fn has_instance(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn to_string_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Assemble a [`SemanticDocument`] for `tree`.
///
/// Every declared default is checked against its field's kind first, since
/// it is written into the schema and may be copied into the instance.
///
/// `instance`, when given, must be a JSON object matching the root type. Its
/// values are checked recursively (nested objects against their `$defs`
/// entry) and absent optional fields are filled with their defaults. Nothing
/// is returned unless the whole instance fits.
pub fn assemble(
    tree: &SchemaTree,
    context: &ContextMap,
    type_name: &str,
    instance: Option<&Value>,
) -> Result<SemanticDocument, SerializationError> {
    check_defaults(tree, &tree.root)?;
    for def in tree.nested.values() {
        check_defaults(tree, def)?;
    }

    let defs = tree
        .nested
        .iter()
        .map(|(name, def)| (name.clone(), render_definition(def)))
        .collect();

    let data = match instance {
        Some(value) => check_object(tree, &tree.root, value, "$")?,
        None => Map::new(),
    };

    tracing::debug!(
        type_name,
        defs = tree.nested.len(),
        instance_fields = data.len(),
        "assembled document"
    );

    Ok(SemanticDocument {
        context: context.clone(),
        defs,
        properties: render_properties(&tree.root),
        required: tree.root.required.clone(),
        title: tree.root.name.clone(),
        schema_type: "object".to_string(),
        type_name: type_name.to_string(),
        data,
    })
}

// --- structural rendering ----------------------------------------------------

fn render_definition(def: &TypeDefinition) -> Value {
    json!({
        "properties": render_properties(def),
        "required": def.required,
        "title": def.name,
        "type": "object",
    })
}

fn render_properties(def: &TypeDefinition) -> Map<String, Value> {
    def.fields
        .iter()
        .map(|f| (f.name.clone(), property_fragment(f)))
        .collect()
}

fn property_fragment(field: &FieldShape) -> Value {
    let mut fragment = kind_fragment(&field.kind);
    if let Value::Object(map) = &mut fragment {
        if let Some(description) = &field.description {
            map.insert("description".into(), json!(description));
        }
        if let Some(unit) = &field.unit {
            map.insert("unit".into(), json!(unit));
        }
        if let Some(default) = &field.default {
            map.insert("default".into(), default.clone());
        }
    }
    fragment
}

/// The structural schema fragment for a field kind.
pub fn kind_fragment(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Scalar(s) => match s.json_type() {
            Some(t) => json!({ "type": t }),
            None => json!({}),
        },
        FieldKind::Enumeration(values) => json!({ "enum": values }),
        FieldKind::Reference(name) => json!({ "$ref": format!("#/$defs/{name}") }),
        FieldKind::Collection(inner) => json!({
            "type": "array",
            "items": kind_fragment(inner),
        }),
        FieldKind::Union(members) => json!({
            "anyOf": members.iter().map(kind_fragment).collect::<Vec<_>>(),
        }),
        FieldKind::Nullable(inner) => json!({
            "anyOf": [kind_fragment(inner), { "type": "null" }],
        }),
    }
}

// --- instance checking -------------------------------------------------------

fn check_defaults(tree: &SchemaTree, def: &TypeDefinition) -> Result<(), SerializationError> {
    for field in &def.fields {
        let Some(default) = &field.default else {
            continue;
        };
        let path = format!("$.{}", field.name);
        check_value(tree, &field.kind, default, &path).map_err(|e| {
            SerializationError::InvalidDefault {
                type_name: def.name.clone(),
                field: field.name.clone(),
                source: Box::new(e),
            }
        })?;
    }
    Ok(())
}

fn check_object(
    tree: &SchemaTree,
    def: &TypeDefinition,
    value: &Value,
    path: &str,
) -> Result<Map<String, Value>, SerializationError> {
    let Value::Object(obj) = value else {
        return Err(SerializationError::NotAnObject {
            path: path.to_string(),
            type_name: def.name.clone(),
            found: json_kind(value),
        });
    };

    if let Some(key) = obj.keys().find(|k| def.field(k).is_none()) {
        return Err(SerializationError::UnknownField {
            path: path.to_string(),
            field: key.clone(),
        });
    }

    let mut out = Map::new();
    for field in &def.fields {
        let checked = match (obj.get(&field.name), &field.default) {
            (Some(v), _) => check_value(tree, &field.kind, v, &format!("{path}.{}", field.name))?,
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return Err(SerializationError::MissingField {
                    path: path.to_string(),
                    field: field.name.clone(),
                })
            }
        };
        out.insert(field.name.clone(), checked);
    }
    Ok(out)
}

fn check_value(
    tree: &SchemaTree,
    kind: &FieldKind,
    value: &Value,
    path: &str,
) -> Result<Value, SerializationError> {
    match kind {
        FieldKind::Scalar(s) if s.accepts(value) => Ok(value.clone()),
        FieldKind::Enumeration(values) if values.contains(value) => Ok(value.clone()),
        FieldKind::Scalar(_) | FieldKind::Enumeration(_) => Err(mismatch(kind, value, path)),
        FieldKind::Reference(name) => {
            let def = tree
                .get(name)
                .ok_or_else(|| SerializationError::MissingDefinition(name.clone()))?;
            check_object(tree, def, value, path).map(Value::Object)
        }
        FieldKind::Collection(inner) => {
            let Value::Array(items) = value else {
                return Err(mismatch(kind, value, path));
            };
            items
                .iter()
                .enumerate()
                .map(|(i, item)| check_value(tree, inner, item, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        FieldKind::Union(members) => members
            .iter()
            .find_map(|m| check_value(tree, m, value, path).ok())
            .ok_or_else(|| mismatch(kind, value, path)),
        FieldKind::Nullable(_) if value.is_null() => Ok(Value::Null),
        FieldKind::Nullable(inner) => check_value(tree, inner, value, path),
    }
}

fn mismatch(kind: &FieldKind, value: &Value, path: &str) -> SerializationError {
    SerializationError::ShapeMismatch {
        path: path.to_string(),
        expected: describe(kind),
        found: json_kind(value),
    }
}

fn describe(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Scalar(s) => s.to_string(),
        FieldKind::Enumeration(values) => format!("one of {}", Value::Array(values.clone())),
        FieldKind::Reference(name) => format!("object {name}"),
        FieldKind::Collection(inner) => format!("array of {}", describe(inner)),
        FieldKind::Union(members) => members
            .iter()
            .map(describe)
            .collect::<Vec<_>>()
            .join(" | "),
        FieldKind::Nullable(inner) => format!("{} | null", describe(inner)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// --- tests -------------------------------------------------------------------
