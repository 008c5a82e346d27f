//! Bounding-box indexed GeoJSON feature store for Fluree DB.
//!
//! Loads a GeoJSON `FeatureCollection` (inline text or a file) once, builds a
//! packed R-tree over feature envelopes, and answers bounding-box queries.
//! Two realization modes share the same index and query path:
//!
//! - **Cached** (`cache_features = true`): the document is fully parsed at
//!   load and features are served from memory.
//! - **Lazy** (`cache_features = false`): a streaming scan records only each
//!   feature's envelope and byte range; matching features are re-read and
//!   parsed per query, in ascending offset order.
//!
//! # Architecture
//!
//! ```text
//!                      GeoJsonConfig ──► GeoJsonSource (inline | file)
//!                                             │
//!              ┌──────────── Cached ──────────┴────────── Lazy ────────────┐
//!              ▼                                                           ▼
//!   parse_feature_collection                               extract_bounding_boxes
//!   (features + envelopes + schema)                        (envelope, offset, length)
//!              │                                                           │
//!              └──────────────► SpatialIndex::build (STR) ◄────────────────┘
//!                                         │
//!                                         ▼
//!                    FeatureStore::features(&Query) → FeatureSet
//!                                         │
//!                         Realizer: cached vector | ByteRangeStore + parse
//! ```
//!
//! # Modules
//!
//! - [`config`]: datasource configuration and source resolution
//! - [`envelope`]: bounding boxes and incremental extent accumulation
//! - [`feature`]: features, attribute values, schema and layer descriptor
//! - [`parse`]: full FeatureCollection and single-feature parsing
//! - [`extract`]: streaming bounding-box / byte-range extraction
//! - [`byte_range`]: random access to the backing document
//! - [`index`]: packed read-only spatial index
//! - [`store`]: the feature store
//! - [`error`]: error types

pub mod byte_range;
pub mod config;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod feature;
pub mod index;
pub mod parse;
pub mod store;

// Re-export key types
pub use byte_range::{ByteRangeStore, RangeReader};
pub use config::{CacheMode, GeoJsonConfig, GeoJsonSource, DEFAULT_ENCODING};
pub use envelope::{Envelope, Extent};
pub use error::{GeoJsonError, Result};
pub use extract::{extract_bounding_boxes, BoundingBoxExtractor, FeatureLocation};
pub use feature::{
    AttrValue, AttributeDescriptor, AttributeSchema, AttributeType, DatasourceGeometryType,
    Feature, LayerDescriptor,
};
pub use index::{IndexQueryStats, IndexStats, SpatialIndex, NODE_CAPACITY};
pub use parse::{parse_feature, parse_feature_collection, ParsedCollection, DEFAULT_START_ID};
pub use store::{
    FeatureHandle, FeatureSet, FeatureStore, LoadState, Query, DATASOURCE_NAME,
    GEOMETRY_TYPE_SAMPLE,
};
