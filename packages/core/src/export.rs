//! The export pipeline: introspect → build context → assemble.
//!
//! [`export`] is the one entry point for turning a model (and optionally an
//! instance of it) into a [`SemanticDocument`]. The first call freezes the
//! registry. Every call works on its own tree, context and document, so
//! exports may run in parallel against the same frozen registry.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::assemble::{assemble, SemanticDocument, SerializationError};
use crate::context::{build_context, ContextConfig, ContextError};
use crate::introspect::{introspect, IntrospectError};
use crate::model::ModelSource;
use crate::registry::Registry;

/// Any failure of a single export call.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Introspect(#[from] IntrospectError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("failed to convert instance to JSON: {0}")]
    Instance(#[from] serde_json::Error),
}

/// Compile the model named `root` into a [`SemanticDocument`].
///
/// `instance`, when given, is checked against the model and flattened onto
/// the document. The call either returns a complete document or an error;
/// it never produces a partial result.
pub fn export<M>(
    registry: &Registry,
    models: &M,
    config: &ContextConfig,
    root: &str,
    instance: Option<&Value>,
) -> Result<SemanticDocument, ExportError>
where
    M: ModelSource + ?Sized,
{
    registry.freeze();

    let tree = introspect(models, registry, root)?;
    let context = build_context(&tree, registry, config)?;
    let document = assemble(&tree, &context, root, instance)?;

    tracing::info!(
        root,
        defs = document.defs.len(),
        with_instance = instance.is_some(),
        "exported semantic document"
    );
    Ok(document)
}

/// A Rust value that can be exported together with its own field values.
///
/// Implementors name the model definition that describes them; their
/// `Serialize` output is used as the instance data.
pub trait Exportable: Serialize {
    /// Name of the model definition for this type.
    const MODEL: &'static str;

    fn export_with<M>(
        &self,
        registry: &Registry,
        models: &M,
        config: &ContextConfig,
    ) -> Result<SemanticDocument, ExportError>
    where
        M: ModelSource + ?Sized,
    {
        let instance = serde_json::to_value(self)?;
        export(registry, models, config, Self::MODEL, Some(&instance))
    }
}
