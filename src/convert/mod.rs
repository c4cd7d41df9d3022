pub mod to_builder;
pub mod to_manifest;

pub use to_builder::{convert_to_builder_form_values, manifest_to_builder};
pub use to_manifest::{builder_to_manifest, builder_to_manifest_with, ManifestOptions};
