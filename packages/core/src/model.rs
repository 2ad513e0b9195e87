//! Model definitions: the structured shape handed over by the authoring layer.
//!
//! A [`ModelDef`] is a named, ordered list of [`FieldDecl`]s. The compiler
//! never sees Rust types directly; anything that can describe itself as a
//! `ModelDef` (a builder call, a JSON file from an external type provider)
//! can be compiled. Lookup goes through the [`ModelSource`] trait, with
//! [`ModelCatalog`] as the in-memory implementation.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::FieldKind;

/// One declared field of a model.
///
/// A field is required exactly when it has no default. An explicit
/// `"default": null` is a default (of `null`), not the absence of one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
}

impl FieldDecl {
    /// A required field (no default).
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A named model type and its declared fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field declaration.
    pub fn field(mut self, decl: FieldDecl) -> Self {
        self.fields.push(decl);
        self
    }

    /// Append a required field.
    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(FieldDecl::new(name, kind))
    }

    /// Append an optional field with a default value.
    pub fn optional(
        self,
        name: impl Into<String>,
        kind: FieldKind,
        default: impl Into<Value>,
    ) -> Self {
        self.field(FieldDecl::new(name, kind).with_default(default))
    }
}

/// Anything that can resolve a type name to its model definition.
///
/// External type providers implement this to make their types available to
/// the introspector without special-casing.
pub trait ModelSource {
    fn model(&self, name: &str) -> Option<&ModelDef>;
}

/// In-memory collection of model definitions, keyed by type name.
///
/// Defining a model with a name that already exists replaces the earlier
/// definition.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, ModelDef>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_models(iter: impl IntoIterator<Item = ModelDef>) -> Self {
        let mut c = Self::new();
        for m in iter {
            c.define(m);
        }
        c
    }

    /// Parse a JSON array of model definitions.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let models: Vec<ModelDef> = serde_json::from_str(json)?;
        Ok(Self::from_models(models))
    }

    pub fn define(&mut self, model: ModelDef) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Sorted type names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModelSource for ModelCatalog {
    fn model(&self, name: &str) -> Option<&ModelDef> {
        self.get(name)
    }
}

impl<S: ModelSource + ?Sized> ModelSource for &S {
    fn model(&self, name: &str) -> Option<&ModelDef> {
        (**self).model(name)
    }
}

// Keeps an explicit `null` as `Some(Value::Null)`; a missing key still
// falls back to `None` through `#[serde(default)]`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
