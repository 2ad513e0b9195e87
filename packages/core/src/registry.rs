//! The metadata registry: semantic identifiers, units and descriptions
//! attached to model types and fields.
//!
//! The registry has two states. While **populating**, new registrations are
//! accepted. The first export [`freeze`](Registry::freeze)s it; from then on
//! only idempotent re-registrations succeed, and lookups may run
//! concurrently from any number of threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::{FieldMetadata, TypeMetadata};

/// Errors raised while populating the [`Registry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(
        "conflicting metadata for {type_name}.{field}: already registered as {existing:?}, \
         attempted {attempted:?}"
    )]
    ConflictingField {
        type_name: String,
        field: String,
        existing: FieldMetadata,
        attempted: FieldMetadata,
    },

    #[error(
        "conflicting class identifier for {type_name}: already registered as {existing:?}, \
         attempted {attempted:?}"
    )]
    ConflictingType {
        type_name: String,
        existing: String,
        attempted: String,
    },

    #[error("registry is frozen; cannot register new metadata for {0}")]
    Frozen(String),

    #[error(
        "identifier {0:?} is invalid; expected an absolute IRI (https://…) \
         or a prefixed name (prefix:local)"
    )]
    InvalidIdentifier(String),

    #[error("type and field names must not be empty")]
    EmptyName,
}

/// Lifecycle state of a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Populating,
    Frozen,
}

/// Table of semantic metadata, keyed by type name and (type, field).
///
/// Construct one explicitly, populate it while defining models, and pass it
/// by reference to [`export`](crate::export()).
#[derive(Debug, Default)]
pub struct Registry {
    fields: HashMap<String, HashMap<String, FieldMetadata>>,
    types: HashMap<String, TypeMetadata>,
    frozen: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach metadata to `type_name.field`.
    ///
    /// Registering identical metadata again is a no-op, so model definitions
    /// may be re-evaluated safely. Differing metadata fails with
    /// [`ConfigurationError::ConflictingField`].
    pub fn register(
        &mut self,
        type_name: &str,
        field: &str,
        metadata: FieldMetadata,
    ) -> Result<(), ConfigurationError> {
        if type_name.is_empty() || field.is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if let Some(id) = &metadata.id {
            validate_identifier(id)?;
        }

        if let Some(existing) = self.lookup_field(type_name, field) {
            if *existing == metadata {
                tracing::trace!(type_name, field, "idempotent field registration");
                return Ok(());
            }
            return Err(ConfigurationError::ConflictingField {
                type_name: type_name.to_string(),
                field: field.to_string(),
                existing: existing.clone(),
                attempted: metadata,
            });
        }

        if self.is_frozen() {
            return Err(ConfigurationError::Frozen(format!("{type_name}.{field}")));
        }

        tracing::debug!(type_name, field, id = ?metadata.id, "registered field metadata");
        self.fields
            .entry(type_name.to_string())
            .or_default()
            .insert(field.to_string(), metadata);
        Ok(())
    }

    /// Attach a class identifier to `type_name`.
    pub fn register_type(
        &mut self,
        type_name: &str,
        class_id: impl Into<String>,
    ) -> Result<(), ConfigurationError> {
        let class_id = class_id.into();
        if type_name.is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        validate_identifier(&class_id)?;

        if let Some(existing) = self.type_id(type_name) {
            if existing == class_id {
                return Ok(());
            }
            return Err(ConfigurationError::ConflictingType {
                type_name: type_name.to_string(),
                existing: existing.to_string(),
                attempted: class_id,
            });
        }

        if self.is_frozen() {
            return Err(ConfigurationError::Frozen(type_name.to_string()));
        }

        tracing::debug!(type_name, id = %class_id, "registered type metadata");
        self.types.insert(
            type_name.to_string(),
            TypeMetadata { id: Some(class_id) },
        );
        Ok(())
    }

    pub fn lookup_field(&self, type_name: &str, field: &str) -> Option<&FieldMetadata> {
        self.fields.get(type_name)?.get(field)
    }

    pub fn lookup_type(&self, type_name: &str) -> Option<&TypeMetadata> {
        self.types.get(type_name)
    }

    /// The semantic identifier of `type_name.field`, if one was registered.
    pub fn field_id(&self, type_name: &str, field: &str) -> Option<&str> {
        self.lookup_field(type_name, field)?.id.as_deref()
    }

    /// The class identifier of `type_name`, if one was registered.
    pub fn type_id(&self, type_name: &str) -> Option<&str> {
        self.lookup_type(type_name)?.id.as_deref()
    }

    /// Move the registry to the frozen state. Safe to call repeatedly.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            tracing::info!(
                types = self.types.len(),
                fields = self.fields.values().map(HashMap::len).sum::<usize>(),
                "metadata registry frozen"
            );
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RegistryState {
        if self.is_frozen() {
            RegistryState::Frozen
        } else {
            RegistryState::Populating
        }
    }
}

// --- helpers -----------------------------------------------------------------

fn validate_identifier(id: &str) -> Result<(), ConfigurationError> {
    if IRI_RE.is_match(id) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidIdentifier(id.to_string()))
    }
}

/// `scheme-or-prefix ":" non-empty-rest`, no whitespace or IRI-forbidden characters.
static IRI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[A-Za-z][A-Za-z0-9+.\-_]*:[^\s<>"{}|\\^`]+$"#).expect("invalid IRI regex")
});

// --- tests -------------------------------------------------------------------
