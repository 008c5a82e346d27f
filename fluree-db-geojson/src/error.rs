//! Error types for the GeoJSON feature store.

use thiserror::Error;

/// GeoJSON feature store errors.
#[derive(Error, Debug)]
pub enum GeoJsonError {
    /// Invalid or incomplete configuration (e.g., neither `file` nor `inline`).
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while opening or reading the source document.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed document, or a byte range that no longer parses as a feature.
    #[error("GeoJSON parse error: {0}")]
    Parse(String),

    /// The store is not in the `Ready` state.
    #[error("GeoJSON store is not loaded")]
    NotLoaded,
}

impl GeoJsonError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        GeoJsonError::Parse(message.into())
    }

    /// Create a parse error anchored at a byte offset of the source.
    pub fn parse_at(offset: u64, message: impl std::fmt::Display) -> Self {
        GeoJsonError::Parse(format!("{} at byte {}", message, offset))
    }

    /// Wrap a serde_json error, naming what was being parsed.
    pub(crate) fn json(what: &str, err: serde_json::Error) -> Self {
        GeoJsonError::Parse(format!("{}: {}", what, err))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, GeoJsonError::Config(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, GeoJsonError::Io(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, GeoJsonError::Parse(_))
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self, GeoJsonError::NotLoaded)
    }
}

/// Result type for GeoJSON store operations.
pub type Result<T> = std::result::Result<T, GeoJsonError>;
