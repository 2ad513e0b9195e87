//! Schema introspection: model definitions → deduplicated [`SchemaTree`].
//!
//! The walk is depth-first over the root's declared fields. Each referenced
//! type is built the first time it is seen and reused afterwards, so a type
//! reachable along several paths yields exactly one [`TypeDefinition`].
//!
//! A type that refers back to a type still being built is a cycle. A cycle
//! is accepted when any edge along it passes through an indirection (a
//! nullable or collection position), where the reference can be emitted as
//! `$ref` without expanding the target again.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::assemble::RESERVED_KEYS;
use crate::model::{ModelDef, ModelSource};
use crate::registry::Registry;
use crate::types::{FieldKind, FieldShape, ScalarType, SchemaTree, TypeDefinition};

/// Errors raised while introspecting a model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntrospectError {
    #[error("cycle without indirection: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("root type {0:?} is not defined")]
    UnknownRoot(String),

    #[error("type {name:?} referenced from {referrer}.{field} is not defined")]
    UnknownType {
        name: String,
        referrer: String,
        field: String,
    },

    #[error("type {type_name:?} declares field {field:?} more than once")]
    DuplicateField { type_name: String, field: String },

    #[error(
        "root type {type_name:?} declares field {field:?}, which collides with a \
         reserved document key"
    )]
    ReservedFieldName { type_name: String, field: String },
}

/// Build the [`SchemaTree`] for `root`.
///
/// Field descriptions and units are copied from `registry`; identifiers are
/// left to the context builder.
pub fn introspect<M>(models: &M, registry: &Registry, root: &str) -> Result<SchemaTree, IntrospectError>
where
    M: ModelSource + ?Sized,
{
    let root_model = models
        .model(root)
        .ok_or_else(|| IntrospectError::UnknownRoot(root.to_string()))?;

    if let Some(decl) = root_model
        .fields
        .iter()
        .find(|f| RESERVED_KEYS.contains(&f.name.as_str()))
    {
        return Err(IntrospectError::ReservedFieldName {
            type_name: root.to_string(),
            field: decl.name.clone(),
        });
    }

    let mut walker = Walker {
        models,
        registry,
        built: BTreeMap::new(),
        stack: Vec::new(),
    };
    let root_def = walker.visit(root_model, false)?;

    let mut nested = walker.built;
    let self_referential = nested.values().any(|d| d.references(root));
    if !self_referential {
        nested.remove(root);
    }

    tracing::debug!(root, nested = nested.len(), self_referential, "introspected model");
    Ok(SchemaTree {
        root: root_def,
        nested,
    })
}

struct Walker<'a, M: ?Sized> {
    models: &'a M,
    registry: &'a Registry,
    /// Finished definitions, memoized by type name.
    built: BTreeMap<String, Arc<TypeDefinition>>,
    /// Types currently being built, outermost first, each paired with
    /// whether the edge leading into it was indirect.
    stack: Vec<(String, bool)>,
}

impl<'a, M: ModelSource + ?Sized> Walker<'a, M> {
    fn visit(
        &mut self,
        model: &'a ModelDef,
        entered_indirectly: bool,
    ) -> Result<Arc<TypeDefinition>, IntrospectError> {
        if let Some(def) = self.built.get(&model.name) {
            return Ok(Arc::clone(def));
        }

        self.stack.push((model.name.clone(), entered_indirectly));
        let mut seen: HashSet<&str> = HashSet::new();
        let mut fields = Vec::with_capacity(model.fields.len());

        for decl in &model.fields {
            if !seen.insert(decl.name.as_str()) {
                return Err(IntrospectError::DuplicateField {
                    type_name: model.name.clone(),
                    field: decl.name.clone(),
                });
            }

            self.walk_kind(&model.name, &decl.name, &decl.kind, false)?;

            let meta = self.registry.lookup_field(&model.name, &decl.name);
            fields.push(FieldShape {
                name: decl.name.clone(),
                required: decl.is_required(),
                default: decl.default.clone(),
                kind: normalize(&decl.kind),
                description: meta.and_then(|m| m.description.clone()),
                unit: meta.and_then(|m| m.unit.clone()),
            });
        }
        self.stack.pop();

        let def = Arc::new(TypeDefinition::new(model.name.clone(), fields));
        self.built.insert(model.name.clone(), Arc::clone(&def));
        tracing::trace!(type_name = %model.name, fields = def.fields.len(), "built type definition");
        Ok(def)
    }

    // `indirect` is true once the walk has passed through a nullable or
    // collection position.
    fn walk_kind(
        &mut self,
        owner: &str,
        field: &str,
        kind: &FieldKind,
        indirect: bool,
    ) -> Result<(), IntrospectError> {
        match kind {
            FieldKind::Scalar(_) | FieldKind::Enumeration(_) => Ok(()),
            FieldKind::Collection(inner) | FieldKind::Nullable(inner) => {
                self.walk_kind(owner, field, inner, true)
            }
            FieldKind::Union(members) => {
                let indirect = indirect || kind.is_nullable();
                for m in members {
                    self.walk_kind(owner, field, m, indirect)?;
                }
                Ok(())
            }
            FieldKind::Reference(target) => {
                if let Some(pos) = self.stack.iter().position(|(t, _)| t == target) {
                    // Edges into stack[pos + 1..] plus the closing edge.
                    let broken = indirect || self.stack[pos + 1..].iter().any(|(_, i)| *i);
                    if broken {
                        return Ok(());
                    }
                    let mut path: Vec<String> =
                        self.stack[pos..].iter().map(|(t, _)| t.clone()).collect();
                    path.push(target.clone());
                    return Err(IntrospectError::Cycle { path });
                }
                if self.built.contains_key(target) {
                    return Ok(());
                }
                let models = self.models;
                let model = models.model(target).ok_or_else(|| {
                    IntrospectError::UnknownType {
                        name: target.clone(),
                        referrer: owner.to_string(),
                        field: field.to_string(),
                    }
                })?;
                self.visit(model, indirect).map(|_| ())
            }
        }
    }
}

/// Rewrite `Nullable(k)` as a union of `k` and `null`, flattening nested
/// unions so a field is never "nullable twice".
fn normalize(kind: &FieldKind) -> FieldKind {
    match kind {
        FieldKind::Scalar(_) | FieldKind::Enumeration(_) | FieldKind::Reference(_) => kind.clone(),
        FieldKind::Collection(inner) => FieldKind::Collection(Box::new(normalize(inner))),
        FieldKind::Nullable(inner) => {
            let mut members = Vec::new();
            push_flat(&mut members, normalize(inner));
            push_flat(&mut members, FieldKind::Scalar(ScalarType::Null));
            FieldKind::Union(members)
        }
        FieldKind::Union(members) => {
            let mut out = Vec::new();
            for m in members {
                push_flat(&mut out, normalize(m));
            }
            FieldKind::Union(out)
        }
    }
}

fn push_flat(out: &mut Vec<FieldKind>, kind: FieldKind) {
    match kind {
        FieldKind::Union(members) => {
            for m in members {
                push_flat(out, m);
            }
        }
        other => {
            if !out.contains(&other) {
                out.push(other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelCatalog, ModelDef};
    use crate::types::FieldMetadata;

    fn catalog() -> ModelCatalog {
        ModelCatalog::from_models([
            ModelDef::new("Package")
                .required("name", FieldKind::string())
                .required("package_manager", FieldKind::reference("PackageManager"))
                .optional(
                    "build_manager",
                    FieldKind::nullable(FieldKind::reference("PackageManager")),
                    serde_json::Value::Null,
                ),
            ModelDef::new("PackageManager").required("name", FieldKind::string()),
        ])
    }

    #[test]
    fn shared_type_built_once() {
        let tree = introspect(&catalog(), &Registry::new(), "Package").unwrap();
        assert_eq!(tree.root_name(), "Package");
        assert_eq!(tree.nested.len(), 1);
        assert!(tree.nested.contains_key("PackageManager"));
        assert_eq!(tree.root.required, vec!["name", "package_manager"]);
    }

    #[test]
    fn nullable_is_a_union_with_null() {
        let tree = introspect(&catalog(), &Registry::new(), "Package").unwrap();
        let field = tree.root.field("build_manager").unwrap();
        assert_eq!(
            field.kind,
            FieldKind::Union(vec![
                FieldKind::reference("PackageManager"),
                FieldKind::Scalar(ScalarType::Null),
            ])
        );
        assert!(!field.required);
    }

    #[test]
    fn direct_self_reference_is_a_cycle() {
        let models = ModelCatalog::from_models([ModelDef::new("X").required("next", FieldKind::reference("X"))]);
        assert_eq!(
            introspect(&models, &Registry::new(), "X"),
            Err(IntrospectError::Cycle {
                path: vec!["X".into(), "X".into()]
            })
        );
    }

    #[test]
    fn indirect_cycle_through_two_types() {
        let models = ModelCatalog::from_models([
            ModelDef::new("A").required("b", FieldKind::reference("B")),
            ModelDef::new("B").required("a", FieldKind::reference("A")),
        ]);
        let err = introspect(&models, &Registry::new(), "A").unwrap_err();
        assert_eq!(
            err,
            IntrospectError::Cycle {
                path: vec!["A".into(), "B".into(), "A".into()]
            }
        );
    }

    #[test]
    fn indirection_anywhere_on_the_loop_breaks_the_cycle() {
        let models = ModelCatalog::from_models([
            ModelDef::new("A").optional(
                "b",
                FieldKind::nullable(FieldKind::reference("B")),
                serde_json::Value::Null,
            ),
            ModelDef::new("B").required("a", FieldKind::reference("A")),
        ]);

        let from_a = introspect(&models, &Registry::new(), "A").unwrap();
        assert!(from_a.nested.contains_key("B"));
        assert!(from_a.nested.contains_key("A"));

        let from_b = introspect(&models, &Registry::new(), "B").unwrap();
        assert!(from_b.nested.contains_key("A"));
        assert!(from_b.nested.contains_key("B"));
    }

    #[test]
    fn direct_edges_after_an_indirect_one_still_form_a_cycle() {
        // Root -> [A] is indirect but the loop A -> B -> A is not.
        let models = ModelCatalog::from_models([
            ModelDef::new("Root").required("items", FieldKind::list_of(FieldKind::reference("A"))),
            ModelDef::new("A").required("b", FieldKind::reference("B")),
            ModelDef::new("B").required("a", FieldKind::reference("A")),
        ]);
        assert_eq!(
            introspect(&models, &Registry::new(), "Root"),
            Err(IntrospectError::Cycle {
                path: vec!["A".into(), "B".into(), "A".into()]
            })
        );
    }

    #[test]
    fn optional_self_reference_is_allowed() {
        let models = ModelCatalog::from_models([ModelDef::new("Node")
            .required("value", FieldKind::integer())
            .optional("next", FieldKind::nullable(FieldKind::reference("Node")), serde_json::Value::Null)
            .required("children", FieldKind::list_of(FieldKind::reference("Node")))]);
        let tree = introspect(&models, &Registry::new(), "Node").unwrap();
        // Self-referential roots are listed among the nested definitions.
        assert!(tree.nested.contains_key("Node"));
        assert!(Arc::ptr_eq(&tree.root, &tree.nested["Node"]));
    }

    #[test]
    fn unknown_types_reported() {
        let models = ModelCatalog::from_models([ModelDef::new("A").required("b", FieldKind::reference("Missing"))]);
        assert_eq!(
            introspect(&models, &Registry::new(), "A"),
            Err(IntrospectError::UnknownType {
                name: "Missing".into(),
                referrer: "A".into(),
                field: "b".into(),
            })
        );
        assert_eq!(
            introspect(&models, &Registry::new(), "Nope"),
            Err(IntrospectError::UnknownRoot("Nope".into()))
        );
    }

    #[test]
    fn duplicate_fields_rejected() {
        let models = ModelCatalog::from_models([ModelDef::new("A")
            .required("x", FieldKind::string())
            .required("x", FieldKind::integer())]);
        assert!(matches!(
            introspect(&models, &Registry::new(), "A"),
            Err(IntrospectError::DuplicateField { .. })
        ));
    }

    #[test]
    fn reserved_names_rejected_on_root_only() {
        let models = ModelCatalog::from_models([
            ModelDef::new("Root").required("inner", FieldKind::reference("Inner")),
            ModelDef::new("Inner").required("type", FieldKind::string()),
            ModelDef::new("Bad").required("required", FieldKind::boolean()),
        ]);
        assert!(introspect(&models, &Registry::new(), "Root").is_ok());
        assert_eq!(
            introspect(&models, &Registry::new(), "Bad"),
            Err(IntrospectError::ReservedFieldName {
                type_name: "Bad".into(),
                field: "required".into(),
            })
        );
    }

    #[test]
    fn registry_annotations_copied() {
        let mut registry = Registry::new();
        registry
            .register(
                "PackageManager",
                "name",
                FieldMetadata::id("cw:PackageManager/Name").with_description("Manager name"),
            )
            .unwrap();
        let tree = introspect(&catalog(), &registry, "Package").unwrap();
        let field = tree.nested["PackageManager"].field("name").unwrap();
        assert_eq!(field.description.as_deref(), Some("Manager name"));
        assert_eq!(field.unit, None);
    }

    #[test]
    fn normalize_flattens_nested_nullables() {
        let kind = FieldKind::nullable(FieldKind::nullable(FieldKind::string()));
        assert_eq!(
            normalize(&kind),
            FieldKind::Union(vec![FieldKind::string(), FieldKind::Scalar(ScalarType::Null)])
        );
    }
}
