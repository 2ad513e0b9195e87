//! JSON-LD context construction.
//!
//! The context mirrors the [`SchemaTree`]: the root scope maps the root's
//! fields to their identifiers, and every nested type with a class
//! identifier gets a scoped term `{"@id": …, "@context": {…}}` holding the
//! terms for its own fields. Two types can therefore both have a field
//! called `name` with different meanings, each resolved in its own scope.

use std::collections::{HashMap, HashSet};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::registry::Registry;
use crate::types::{SchemaTree, TypeDefinition};

/// Default `@vocab` base IRI.
pub const DEFAULT_VOCAB: &str = "https://w3id.org/cw/";

/// Default compact prefix bound to [`DEFAULT_VOCAB`].
pub const DEFAULT_PREFIX: &str = "cw";

/// Errors raised while building a context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("term {term:?} in the scope of {scope} maps to two different identifiers")]
    TermCollision { scope: String, term: String },

    #[error("type {0:?} is referenced but has no definition in the schema tree")]
    MissingDefinition(String),
}

/// Namespace settings for the root context scope.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `LDSCHEMA_VOCAB` | `https://w3id.org/cw/` | Base IRI written as `@vocab` |
/// | `LDSCHEMA_PREFIX` | `cw` | Short prefix bound to the base IRI |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    pub vocab: String,
    pub prefix: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            vocab: DEFAULT_VOCAB.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl ContextConfig {
    /// Populate config from environment variables, applying defaults where absent.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            vocab: non_empty_var("LDSCHEMA_VOCAB").unwrap_or(defaults.vocab),
            prefix: non_empty_var("LDSCHEMA_PREFIX").unwrap_or(defaults.prefix),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// The value a context term maps to.
///
/// Serialises as a plain IRI string, or as `{"@id": …, "@context": {…}}`
/// for scoped terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContextEntry {
    Iri(String),
    Scoped {
        #[serde(rename = "@id")]
        id: String,
        #[serde(rename = "@context")]
        context: ContextMap,
    },
}

impl ContextEntry {
    /// The identifier this term expands to.
    pub fn id(&self) -> &str {
        match self {
            ContextEntry::Iri(iri) => iri,
            ContextEntry::Scoped { id, .. } => id,
        }
    }

    /// The nested scope, for scoped terms.
    pub fn context(&self) -> Option<&ContextMap> {
        match self {
            ContextEntry::Iri(_) => None,
            ContextEntry::Scoped { context, .. } => Some(context),
        }
    }
}

/// One context scope: unique terms in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextMap {
    entries: Vec<(String, ContextEntry)>,
}

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `term`. An identical entry already present is kept as is; a
    /// different one is returned as the error.
    pub fn try_insert(
        &mut self,
        term: impl Into<String>,
        entry: ContextEntry,
    ) -> Result<(), ContextEntry> {
        let term = term.into();
        match self.get(&term) {
            Some(existing) if *existing == entry => Ok(()),
            Some(existing) => Err(existing.clone()),
            None => {
                self.entries.push((term, entry));
                Ok(())
            }
        }
    }

    pub fn get(&self, term: &str) -> Option<&ContextEntry> {
        self.entries
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, e)| e)
    }

    /// Identifier `term` maps to in this scope.
    pub fn id_of(&self, term: &str) -> Option<&str> {
        self.get(term).map(ContextEntry::id)
    }

    /// Nested scope of `term`, if it is a scoped term.
    pub fn scope(&self, term: &str) -> Option<&ContextMap> {
        self.get(term)?.context()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ContextMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (term, entry) in &self.entries {
            map.serialize_entry(term, entry)?;
        }
        map.end()
    }
}

/// Build the root context scope for `tree`.
///
/// Fields with no registered identifier are left out. Each nested type's
/// scope is built once and reused for every field that references it.
pub fn build_context(
    tree: &SchemaTree,
    registry: &Registry,
    config: &ContextConfig,
) -> Result<ContextMap, ContextError> {
    let root_name = tree.root_name();
    let mut root = ContextMap::new();
    insert(&mut root, root_name, "@vocab", ContextEntry::Iri(config.vocab.clone()))?;
    insert(&mut root, root_name, &config.prefix, ContextEntry::Iri(config.vocab.clone()))?;
    if let Some(class_id) = registry.type_id(root_name) {
        insert(&mut root, root_name, root_name, ContextEntry::Iri(class_id.to_string()))?;
    }

    let mut builder = Builder {
        tree,
        registry,
        scopes: HashMap::new(),
        active: vec![root_name.to_string()],
        unscoped: HashSet::new(),
    };
    builder.fill(&tree.root, &mut root)?;

    tracing::debug!(root = root_name, terms = root.len(), scopes = builder.scopes.len(), "built context");
    Ok(root)
}

struct Builder<'a> {
    tree: &'a SchemaTree,
    registry: &'a Registry,
    /// Finished nested scopes by type name.
    scopes: HashMap<String, ContextMap>,
    /// Types whose scope is currently being built.
    active: Vec<String>,
    /// Types without a class id already reported as dropping field terms.
    unscoped: HashSet<String>,
}

impl<'a> Builder<'a> {
    fn fill(&mut self, def: &TypeDefinition, scope: &mut ContextMap) -> Result<(), ContextError> {
        let registry = self.registry;
        for field in &def.fields {
            if let Some(id) = registry.field_id(&def.name, &field.name) {
                insert(scope, &def.name, &field.name, ContextEntry::Iri(id.to_string()))?;
            }

            for target in field.kind.referenced_types() {
                let Some(class_id) = registry.type_id(target) else {
                    self.note_unscoped(target);
                    continue;
                };
                // A type inside its own scope maps to its class only.
                let entry = if self.active.iter().any(|t| t == target) {
                    ContextEntry::Iri(class_id.to_string())
                } else {
                    let context = self.scope_for(target)?;
                    if context.is_empty() {
                        ContextEntry::Iri(class_id.to_string())
                    } else {
                        ContextEntry::Scoped {
                            id: class_id.to_string(),
                            context,
                        }
                    }
                };
                insert(scope, &def.name, target, entry)?;
            }
        }
        Ok(())
    }

    // Without a class id a type gets no nested scope, so identifiers
    // registered on its fields cannot appear in the context.
    fn note_unscoped(&mut self, type_name: &str) {
        if self.unscoped.contains(type_name) {
            return;
        }
        let (tree, registry) = (self.tree, self.registry);
        let Some(def) = tree.get(type_name) else {
            return;
        };
        let dropped: Vec<&str> = def
            .fields
            .iter()
            .filter(|f| registry.field_id(type_name, &f.name).is_some())
            .map(|f| f.name.as_str())
            .collect();
        if !dropped.is_empty() {
            tracing::warn!(
                type_name,
                fields = ?dropped,
                "type has no class id; its field identifiers are left out of the context"
            );
        }
        self.unscoped.insert(type_name.to_string());
    }

    fn scope_for(&mut self, type_name: &str) -> Result<ContextMap, ContextError> {
        if let Some(scope) = self.scopes.get(type_name) {
            return Ok(scope.clone());
        }
        let tree = self.tree;
        let def = tree
            .get(type_name)
            .ok_or_else(|| ContextError::MissingDefinition(type_name.to_string()))?;

        self.active.push(type_name.to_string());
        let mut scope = ContextMap::new();
        let filled = self.fill(def, &mut scope);
        self.active.pop();
        filled?;

        self.scopes.insert(type_name.to_string(), scope.clone());
        Ok(scope)
    }
}

fn insert(
    scope: &mut ContextMap,
    scope_name: &str,
    term: &str,
    entry: ContextEntry,
) -> Result<(), ContextError> {
    scope
        .try_insert(term, entry)
        .map_err(|_| ContextError::TermCollision {
            scope: scope_name.to_string(),
            term: term.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::introspect;
    use crate::model::{ModelCatalog, ModelDef};
    use crate::types::{FieldKind, FieldMetadata};
    use serde_json::json;

    fn two_named_types() -> (ModelCatalog, Registry) {
        let models = ModelCatalog::from_models([
            ModelDef::new("Root")
                .required("a", FieldKind::reference("A"))
                .required("b", FieldKind::list_of(FieldKind::reference("B"))),
            ModelDef::new("A").required("name", FieldKind::string()),
            ModelDef::new("B").required("name", FieldKind::string()),
        ]);
        let mut registry = Registry::new();
        registry.register_type("A", "cw:A").unwrap();
        registry.register_type("B", "cw:B").unwrap();
        registry.register("A", "name", FieldMetadata::id("cw:A/Name")).unwrap();
        registry.register("B", "name", FieldMetadata::id("cw:B/Name")).unwrap();
        (models, registry)
    }

    #[test]
    fn root_scope_starts_with_namespace() {
        let models = ModelCatalog::from_models([ModelDef::new("T")]);
        let registry = Registry::new();
        let tree = introspect(&models, &registry, "T").unwrap();
        let ctx = build_context(&tree, &registry, &ContextConfig::default()).unwrap();
        assert_eq!(
            serde_json::to_value(&ctx).unwrap(),
            json!({"@vocab": DEFAULT_VOCAB, "cw": DEFAULT_VOCAB})
        );
    }

    #[test]
    fn same_field_name_resolved_per_scope() {
        let (models, registry) = two_named_types();
        let tree = introspect(&models, &registry, "Root").unwrap();
        let ctx = build_context(&tree, &registry, &ContextConfig::default()).unwrap();

        assert_eq!(ctx.scope("A").unwrap().id_of("name"), Some("cw:A/Name"));
        assert_eq!(ctx.scope("B").unwrap().id_of("name"), Some("cw:B/Name"));
        assert_eq!(ctx.get("name"), None);
        assert_eq!(ctx.id_of("A"), Some("cw:A"));
    }

    #[test]
    fn unregistered_terms_are_absent() {
        let (models, registry) = two_named_types();
        let tree = introspect(&models, &registry, "Root").unwrap();
        let ctx = build_context(&tree, &registry, &ContextConfig::default()).unwrap();
        // Root fields "a" and "b" carry no identifier.
        assert_eq!(ctx.get("a"), None);
        assert_eq!(ctx.get("b"), None);
    }

    #[test]
    fn types_without_class_id_get_no_scope() {
        let (models, _) = two_named_types();
        let mut registry = Registry::new();
        registry.register("A", "name", FieldMetadata::id("cw:A/Name")).unwrap();
        let tree = introspect(&models, &registry, "Root").unwrap();
        let ctx = build_context(&tree, &registry, &ContextConfig::default()).unwrap();
        assert_eq!(ctx.get("A"), None);
        assert_eq!(ctx.terms().collect::<Vec<_>>(), vec!["@vocab", "cw"]);
    }

    #[test]
    fn dropped_field_identifiers_are_noted_once_per_type() {
        let models = ModelCatalog::from_models([
            ModelDef::new("Root")
                .required("first", FieldKind::reference("A"))
                .required("second", FieldKind::list_of(FieldKind::reference("A"))),
            ModelDef::new("A").required("name", FieldKind::string()),
        ]);
        let mut registry = Registry::new();
        registry.register("A", "name", FieldMetadata::id("cw:A/Name")).unwrap();
        let tree = introspect(&models, &registry, "Root").unwrap();

        let mut builder = Builder {
            tree: &tree,
            registry: &registry,
            scopes: HashMap::new(),
            active: vec!["Root".to_string()],
            unscoped: HashSet::new(),
        };
        let mut scope = ContextMap::new();
        builder.fill(&tree.root, &mut scope).unwrap();

        assert!(scope.is_empty());
        assert_eq!(builder.unscoped.len(), 1);
        assert!(builder.unscoped.contains("A"));
    }

    #[test]
    fn class_without_field_terms_is_a_plain_term() {
        let (models, _) = two_named_types();
        let mut registry = Registry::new();
        registry.register_type("A", "cw:A").unwrap();
        let tree = introspect(&models, &registry, "Root").unwrap();
        let ctx = build_context(&tree, &registry, &ContextConfig::default()).unwrap();
        assert_eq!(ctx.get("A"), Some(&ContextEntry::Iri("cw:A".into())));
    }

    #[test]
    fn root_class_id_is_mapped() {
        let (models, mut registry) = two_named_types();
        registry.register_type("Root", "cw:Root").unwrap();
        let tree = introspect(&models, &registry, "Root").unwrap();
        let ctx = build_context(&tree, &registry, &ContextConfig::default()).unwrap();
        assert_eq!(ctx.get("Root"), Some(&ContextEntry::Iri("cw:Root".into())));
    }

    #[test]
    fn field_and_type_term_collision() {
        let models = ModelCatalog::from_models([
            ModelDef::new("Root").required("Code", FieldKind::reference("Code")),
            ModelDef::new("Code").required("label", FieldKind::string()),
        ]);
        let mut registry = Registry::new();
        registry.register("Root", "Code", FieldMetadata::id("cw:root/code")).unwrap();
        registry.register_type("Code", "cw:Code").unwrap();
        let tree = introspect(&models, &registry, "Root").unwrap();
        assert_eq!(
            build_context(&tree, &registry, &ContextConfig::default()),
            Err(ContextError::TermCollision {
                scope: "Root".into(),
                term: "Code".into(),
            })
        );
    }

    #[test]
    fn self_referential_type_does_not_recurse() {
        let models = ModelCatalog::from_models([
            ModelDef::new("Tree").required("root", FieldKind::reference("TreeNode")),
            ModelDef::new("TreeNode")
                .required("label", FieldKind::string())
                .required("children", FieldKind::list_of(FieldKind::reference("TreeNode"))),
        ]);
        let mut registry = Registry::new();
        registry.register_type("TreeNode", "cw:TreeNode").unwrap();
        registry
            .register("TreeNode", "label", FieldMetadata::id("cw:TreeNode/Label"))
            .unwrap();
        let tree = introspect(&models, &registry, "Tree").unwrap();
        let ctx = build_context(&tree, &registry, &ContextConfig::default()).unwrap();

        let node_scope = ctx.scope("TreeNode").unwrap();
        assert_eq!(node_scope.id_of("label"), Some("cw:TreeNode/Label"));
        assert_eq!(
            node_scope.get("TreeNode"),
            Some(&ContextEntry::Iri("cw:TreeNode".into()))
        );
    }

    #[test]
    fn custom_namespace() {
        let models = ModelCatalog::from_models([ModelDef::new("T")]);
        let registry = Registry::new();
        let tree = introspect(&models, &registry, "T").unwrap();
        let config = ContextConfig {
            vocab: "https://example.org/ns#".into(),
            prefix: "ex".into(),
        };
        let ctx = build_context(&tree, &registry, &config).unwrap();
        assert_eq!(ctx.id_of("ex"), Some("https://example.org/ns#"));
        assert_eq!(ctx.id_of("@vocab"), Some("https://example.org/ns#"));
    }
}
