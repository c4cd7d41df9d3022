use thiserror::Error;

/// A manifest construct that the builder form cannot represent.
///
/// Component converters raise it so the caller can decide whether to degrade
/// the fragment to YAML or to abort the whole conversion. `stream_name` is
/// `None` for document-level problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_compatibility(.stream_name.as_deref(), .reason))]
pub struct CompatibilityError {
    pub stream_name: Option<String>,
    pub reason: String,
}

fn render_compatibility(stream_name: Option<&str>, reason: &str) -> String {
    match stream_name {
        Some(name) => format!("Stream {name}: {reason}"),
        None => reason.to_string(),
    }
}

impl CompatibilityError {
    pub const TAG: &'static str = "connectorBuilder.manifestCompatibility";

    pub fn new(stream_name: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn global(reason: impl Into<String>) -> Self {
        Self::new(None, reason)
    }

    pub fn tag(&self) -> &'static str {
        Self::TAG
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefResolutionError {
    #[error("$ref at {location} must be a string")]
    NonStringRef { location: String },
    #[error("$ref at {location} is not a valid pointer: {pointer}")]
    InvalidPointer { pointer: String, location: String },
    #[error("$ref at {location} points to missing path {pointer}")]
    Dangling { pointer: String, location: String },
    #[error("$ref at {location} must point to an object or array, {pointer} is a scalar")]
    NotAnObject { pointer: String, location: String },
    #[error("$ref at {location} points to array {pointer} and cannot carry sibling keys")]
    ArrayWithSiblings { pointer: String, location: String },
    #[error("circular $ref detected: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },
}

/// Failure at the manifest resolution boundary.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Reference(#[from] RefResolutionError),
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Compatibility(#[from] CompatibilityError),
    #[error("manifest resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("YAML encoding failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConversionError {
    pub fn compatibility(&self) -> Option<&CompatibilityError> {
        match self {
            ConversionError::Compatibility(err) => Some(err),
            _ => None,
        }
    }
}
