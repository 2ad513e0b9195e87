//! Semantic-schema compiler.
//!
//! This crate turns structured data models annotated with semantic
//! identifiers into documents that are at once a JSON Schema and a JSON-LD
//! node: `$defs`/`properties`/`required` describe the shape, `@context`
//! gives every field and nested type its meaning, and (optionally) concrete
//! instance values sit on the same top-level object.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Metadata and shape types: [`FieldMetadata`], [`FieldKind`], [`TypeDefinition`], [`SchemaTree`] |
//! | [`model`] | Model definitions handed over by the authoring layer: [`ModelDef`], [`ModelCatalog`] |
//! | [`registry`] | The two-state metadata [`Registry`] |
//! | [`introspect`] | Model → deduplicated [`SchemaTree`] via [`introspect()`] |
//! | [`context`] | Nested JSON-LD context via [`build_context`] |
//! | [`assemble`] | Schema + context + instance → [`SemanticDocument`] |
//! | [`export`] | The shared [`export()`] pipeline and the [`Exportable`] trait |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use ldschema::{export, ContextConfig, FieldKind, FieldMetadata, ModelCatalog, ModelDef, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register("ScfInputs", "protocol", FieldMetadata::id("cw:scf/Protocol"))?;
//!
//! let models = ModelCatalog::from_models([ModelDef::new("ScfInputs")
//!     .optional("protocol", FieldKind::one_of(["fast", "moderate", "precise"]), "moderate")]);
//!
//! let doc = export(
//!     &registry,
//!     &models,
//!     &ContextConfig::from_env(),
//!     "ScfInputs",
//!     Some(&serde_json::json!({"protocol": "fast"})),
//! )?;
//! println!("{}", doc.to_string_pretty()?);
//! ```

pub mod assemble;
pub mod context;
pub mod export;
pub mod introspect;
pub mod model;
pub mod registry;
pub mod types;

pub use assemble::{assemble, SemanticDocument, SerializationError, RESERVED_KEYS};
pub use context::{build_context, ContextConfig, ContextEntry, ContextError, ContextMap};
pub use export::{export, ExportError, Exportable};
pub use introspect::{introspect, IntrospectError};
pub use model::{FieldDecl, ModelCatalog, ModelDef, ModelSource};
pub use registry::{ConfigurationError, Registry, RegistryState};
pub use types::{
    FieldKind, FieldMetadata, FieldShape, ScalarType, SchemaTree, TypeDefinition, TypeMetadata,
};
