//! GeoJSON datasource configuration.
//!
//! Recognized options:
//!
//! | key              | meaning                                               | default   |
//! |------------------|-------------------------------------------------------|-----------|
//! | `file`           | path of the GeoJSON document                          | -         |
//! | `inline`         | literal document text (takes precedence over `file`)  | -         |
//! | `base`           | directory prefix joined in front of `file`            | -         |
//! | `encoding`       | declared text encoding reported in the descriptor     | `utf-8`   |
//! | `cache_features` | parse everything at load (true) or index lazily       | `true`    |

use crate::error::{GeoJsonError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Default declared encoding.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Feature realization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// All features parsed and held in memory at load time.
    Cached,
    /// Only bounding boxes and byte locators held; bodies parsed per query.
    Lazy,
}

impl CacheMode {
    pub fn from_cache_features(cache_features: bool) -> Self {
        if cache_features {
            CacheMode::Cached
        } else {
            CacheMode::Lazy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Cached => "cached",
            CacheMode::Lazy => "lazy",
        }
    }
}

/// Where the document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoJsonSource {
    /// In-memory document text.
    Inline(Arc<str>),
    /// Filesystem path (already joined with `base`).
    File(PathBuf),
}

impl GeoJsonSource {
    /// Short label for log and error messages.
    pub fn describe(&self) -> String {
        match self {
            GeoJsonSource::Inline(text) => format!("in-memory string ({} bytes)", text.len()),
            GeoJsonSource::File(path) => format!("'{}'", path.display()),
        }
    }
}

/// Configuration for a GeoJSON feature store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoJsonConfig {
    /// Path of the document. Ignored when `inline` is set.
    pub file: Option<String>,

    /// Literal document text.
    pub inline: Option<String>,

    /// Directory prefix for `file`.
    pub base: Option<String>,

    /// Declared text encoding, reported in the layer descriptor.
    pub encoding: String,

    /// `true` selects [`CacheMode::Cached`], `false` selects [`CacheMode::Lazy`].
    pub cache_features: bool,
}

impl Default for GeoJsonConfig {
    fn default() -> Self {
        Self {
            file: None,
            inline: None,
            base: None,
            encoding: DEFAULT_ENCODING.to_string(),
            cache_features: true,
        }
    }
}

impl GeoJsonConfig {
    /// Config reading the document at `path`.
    pub fn file(path: impl Into<String>) -> Self {
        Self::default().with_file(path)
    }

    /// Config over an in-memory document.
    pub fn inline(text: impl Into<String>) -> Self {
        Self::default().with_inline(text)
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_inline(mut self, text: impl Into<String>) -> Self {
        self.inline = Some(text.into());
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_cache_features(mut self, cache_features: bool) -> Self {
        self.cache_features = cache_features;
        self
    }

    /// Build a config from datasource parameters (string key/value pairs).
    ///
    /// Unknown keys are ignored.
    pub fn from_params<I, K, V>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            let key = key.as_ref();
            let value: String = value.into();
            match key {
                "file" => config.file = Some(value),
                "inline" => config.inline = Some(value),
                "base" => config.base = Some(value),
                "encoding" => config.encoding = value,
                "cache_features" => config.cache_features = parse_bool(key, &value)?,
                other => tracing::debug!(key = other, "ignoring unknown GeoJSON parameter"),
            }
        }
        Ok(config)
    }

    /// Realization mode selected by `cache_features`.
    pub fn mode(&self) -> CacheMode {
        CacheMode::from_cache_features(self.cache_features)
    }

    /// Resolve the document source.
    ///
    /// `inline` wins; otherwise `file` is required and is joined onto `base`.
    pub fn source(&self) -> Result<GeoJsonSource> {
        if let Some(text) = &self.inline {
            return Ok(GeoJsonSource::Inline(Arc::from(text.as_str())));
        }
        let file = self
            .file
            .as_deref()
            .ok_or_else(|| GeoJsonError::Config("missing <file> parameter".into()))?;
        let path = match &self.base {
            Some(base) => PathBuf::from(base).join(file),
            None => PathBuf::from(file),
        };
        Ok(GeoJsonSource::File(path))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(GeoJsonError::Config(format!(
            "invalid boolean for '{}': '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeoJsonConfig::default();
        assert_eq!(config.encoding, "utf-8");
        assert!(config.cache_features);
        assert_eq!(config.mode(), CacheMode::Cached);
    }

    #[test]
    fn test_missing_source_is_config_error() {
        let err = GeoJsonConfig::default().source().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_inline_takes_precedence() {
        let config = GeoJsonConfig::file("a.geojson").with_inline("{}");
        assert!(matches!(config.source().unwrap(), GeoJsonSource::Inline(_)));
    }

    #[test]
    fn test_base_joined() {
        let config = GeoJsonConfig::file("points.geojson").with_base("/data/geo");
        assert_eq!(
            config.source().unwrap(),
            GeoJsonSource::File(PathBuf::from("/data/geo/points.geojson"))
        );
    }

    #[test]
    fn test_from_params() {
        let config = GeoJsonConfig::from_params([
            ("file", "roads.json"),
            ("cache_features", "false"),
            ("encoding", "latin1"),
            ("type", "geojson"),
        ])
        .unwrap();
        assert_eq!(config.file.as_deref(), Some("roads.json"));
        assert_eq!(config.mode(), CacheMode::Lazy);
        assert_eq!(config.encoding, "latin1");
    }

    #[test]
    fn test_from_params_rejects_bad_bool() {
        let err = GeoJsonConfig::from_params([("cache_features", "maybe")]).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: GeoJsonConfig =
            serde_json::from_str(r#"{"file": "x.geojson", "cache_features": false}"#).unwrap();
        assert_eq!(config.encoding, DEFAULT_ENCODING);
        assert_eq!(config.mode(), CacheMode::Lazy);
    }
}
