//! Shared fixtures for the ldschema conformance test suite.
//!
//! The fixture models describe a small relaxation workflow: its inputs
//! reference a crystal structure and a code, and the code's package reaches
//! the shared `PackageManager` type along two different fields. The models
//! are loaded from `fixtures/relax_models.json`, the same way an external
//! type provider would hand them over.

use std::sync::Once;

use ldschema::{FieldMetadata, ModelCatalog, Registry};
use serde_json::{json, Value};

const RELAX_MODELS: &str = include_str!("../fixtures/relax_models.json");

/// The relaxation workflow model definitions.
///
/// # Panics
///
/// Panics if the bundled fixture file is not a valid model array.
pub fn relax_models() -> ModelCatalog {
    ModelCatalog::from_json(RELAX_MODELS).expect("relax_models.json must parse")
}

/// A populating registry with identifiers, units and descriptions for the
/// relaxation workflow.
///
/// # Panics
///
/// Panics if any fixture registration is rejected.
pub fn relax_registry() -> Registry {
    let mut r = Registry::new();

    let types = [
        ("RelaxInputs", "cw:relax/RelaxInputs"),
        ("Structure", "https://w3id.org/cw/Structure"),
        ("Site", "cw:Site"),
        ("Code", "cw:Code"),
        ("Package", "cw:Package"),
        ("PackageManager", "cw:PackageManager"),
    ];
    for (type_name, id) in types {
        r.register_type(type_name, id).expect("fixture type registration");
    }

    let fields = [
        ("RelaxInputs", "protocol", FieldMetadata::id("cw:scf/Protocol")),
        ("RelaxInputs", "relax_type", FieldMetadata::id("cw:relax/RelaxType")),
        (
            "RelaxInputs",
            "kpoints_distance",
            FieldMetadata::id("cw:scf/KpointsDistance")
                .with_unit("1/Å")
                .with_description("Maximum distance between k-points in reciprocal space"),
        ),
        ("RelaxInputs", "max_iterations", FieldMetadata::id("cw:relax/MaxIterations")),
        ("Structure", "name", FieldMetadata::id("cw:Structure/Name")),
        (
            "Structure",
            "cell",
            FieldMetadata::id("cw:Structure/Cell").with_unit("Å"),
        ),
        ("Site", "symbol", FieldMetadata::id("cw:Site/Symbol")),
        ("Site", "position", FieldMetadata::id("cw:Site/Position").with_unit("Å")),
        ("Code", "label", FieldMetadata::id("cw:Code/Label")),
        ("Package", "name", FieldMetadata::id("cw:Package/Name")),
        ("Package", "version", FieldMetadata::id("cw:Package/Version")),
        ("PackageManager", "name", FieldMetadata::id("cw:PackageManager/Name")),
    ];
    for (type_name, field, meta) in fields {
        r.register(type_name, field, meta).expect("fixture field registration");
    }

    r
}

/// A valid `RelaxInputs` instance for silicon with Quantum ESPRESSO.
pub fn relax_instance() -> Value {
    json!({
        "structure": {
            "name": "Si2",
            "cell": [[0.0, 2.715, 2.715], [2.715, 0.0, 2.715], [2.715, 2.715, 0.0]],
            "sites": [
                {"symbol": "Si", "position": [0.0, 0.0, 0.0]},
                {"symbol": "Si", "position": [1.3575, 1.3575, 1.3575]}
            ]
        },
        "code": {
            "label": "pw-7.2@localhost",
            "package": {
                "name": "quantum-espresso",
                "version": "7.2",
                "package_manager": {"name": "conda", "channel": "conda-forge"},
                "build_manager": {"name": "spack"}
            }
        },
        "protocol": "fast"
    })
}

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `ldschema=debug`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "ldschema=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}
