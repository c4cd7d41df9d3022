pub mod builder;
pub mod config;
pub mod contracts;
pub mod convert;
pub mod error;
pub mod interpolation;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod validation;

pub use builder::{sync_locked_inputs, BuilderFormValues};
pub use config::Settings;
pub use contracts::register_builder_contracts;
pub use convert::{
    builder_to_manifest, builder_to_manifest_with, convert_to_builder_form_values,
    manifest_to_builder, ManifestOptions,
};
pub use error::{CompatibilityError, ConversionError, RefResolutionError, ResolveError};
pub use registry::{Context, Registry};
pub use resolver::{resolve, LocalResolver, ManifestResolver};
pub use validation::{validate_builder, validate_form_values, ValidationReport};
