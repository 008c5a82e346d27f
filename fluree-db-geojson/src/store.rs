//! Feature store: load orchestration, queries, and feature realization.
//!
//! A [`FeatureStore`] loads one GeoJSON document in either of two modes and
//! then answers bounding-box queries against a packed [`SpatialIndex`]:
//!
//! - **Cached**: the whole document is parsed up front; index handles point
//!   into the in-memory feature vector.
//! - **Lazy**: only envelopes and byte ranges are kept; each query re-reads
//!   and parses the matching byte ranges in ascending offset order.
//!
//! Both modes share one query path. They differ only in the realizer
//! that turns a [`FeatureHandle`] into a [`Feature`] and in the order it
//! wants handles visited.
//!
//! Two approximations are intentional: the attribute schema comes from the
//! first feature with a valid envelope only, and
//! [`FeatureStore::geometry_type`] looks at no more than
//! [`GEOMETRY_TYPE_SAMPLE`] features.

use crate::byte_range::{ByteRangeStore, RangeReader};
use crate::config::{CacheMode, GeoJsonConfig, GeoJsonSource};
use crate::envelope::{Envelope, Extent};
use crate::error::{GeoJsonError, Result};
use crate::extract::extract_bounding_boxes;
use crate::feature::{AttributeSchema, DatasourceGeometryType, Feature, LayerDescriptor};
use crate::index::{IndexStats, SpatialIndex};
use crate::parse::{parse_feature, parse_feature_collection, DEFAULT_START_ID};
use std::sync::Arc;
use std::time::Instant;

/// Datasource name reported in the layer descriptor.
pub const DATASOURCE_NAME: &str = "geojson";

/// Number of leading features sampled by [`FeatureStore::geometry_type`].
pub const GEOMETRY_TYPE_SAMPLE: usize = 5;

/// Load lifecycle of a [`FeatureStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    /// Terminal; every further operation fails with `NotLoaded`.
    Failed,
}

/// Index payload.
///
/// `ordinal` is the feature's position in the collection. In lazy mode
/// `offset`/`length` locate its JSON text; in cached mode they are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureHandle {
    pub ordinal: usize,
    pub offset: u64,
    pub length: u64,
}

impl FeatureHandle {
    pub fn cached(ordinal: usize) -> Self {
        Self {
            ordinal,
            offset: 0,
            length: 0,
        }
    }

    pub fn lazy(ordinal: usize, offset: u64, length: u64) -> Self {
        Self {
            ordinal,
            offset,
            length,
        }
    }
}

/// A bounding-box query with an advisory attribute projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub bbox: Envelope,
    pub property_names: Vec<String>,
}

impl Query {
    pub fn new(bbox: Envelope) -> Self {
        Self {
            bbox,
            property_names: Vec::new(),
        }
    }

    /// Add a projected attribute name (duplicates ignored).
    pub fn with_property_name(mut self, name: impl Into<String>) -> Self {
        self.add_property_name(name);
        self
    }

    pub fn add_property_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.property_names.contains(&name) {
            self.property_names.push(name);
        }
    }
}

// ============================================================================
// Realization
// ============================================================================

/// Turns index handles into features for the duration of one query.
trait Realizer: Send {
    /// Put candidate handles into visiting order.
    fn order(&self, handles: &mut [FeatureHandle]) {
        handles.sort_unstable_by_key(|h| h.ordinal);
    }

    fn realize(&mut self, handle: &FeatureHandle) -> Result<Arc<Feature>>;
}

/// Cached mode: features live in memory, handles index them directly.
struct CachedRealizer {
    features: Arc<[Arc<Feature>]>,
}

impl Realizer for CachedRealizer {
    fn realize(&mut self, handle: &FeatureHandle) -> Result<Arc<Feature>> {
        self.features
            .get(handle.ordinal)
            .cloned()
            .ok_or_else(|| GeoJsonError::parse(format!("no cached feature #{}", handle.ordinal)))
    }
}

/// Lazy mode: each handle's byte range is read through a per-query reader
/// and parsed.
struct LazyRealizer {
    reader: RangeReader,
    base_id: u64,
}

impl Realizer for LazyRealizer {
    fn order(&self, handles: &mut [FeatureHandle]) {
        handles.sort_unstable_by_key(|h| h.offset);
    }

    fn realize(&mut self, handle: &FeatureHandle) -> Result<Arc<Feature>> {
        let bytes = self.reader.read(handle.offset, handle.length)?;
        let feature = parse_feature(bytes, self.base_id + handle.ordinal as u64).map_err(|e| {
            GeoJsonError::parse(format!(
                "feature #{} (bytes {}..{}): {}",
                handle.ordinal,
                handle.offset,
                handle.offset + handle.length,
                e
            ))
        })?;
        Ok(Arc::new(feature))
    }
}

/// Where realized features come from.
#[derive(Debug)]
enum FeatureSource {
    Cached(Arc<[Arc<Feature>]>),
    Lazy { bytes: ByteRangeStore, base_id: u64 },
}

impl FeatureSource {
    /// Acquire a realizer. In lazy file mode this opens a fresh file handle.
    fn realizer(&self) -> Result<Box<dyn Realizer>> {
        match self {
            FeatureSource::Cached(features) => Ok(Box::new(CachedRealizer {
                features: Arc::clone(features),
            })),
            FeatureSource::Lazy { bytes, base_id } => Ok(Box::new(LazyRealizer {
                reader: bytes.open()?,
                base_id: *base_id,
            })),
        }
    }
}

// ============================================================================
// Query results
// ============================================================================

/// Ordered result of one query.
///
/// Owns the query's realization scope (the file handle in lazy file mode),
/// released when the set is dropped or after the first error. Yields at most
/// one error, then ends.
pub struct FeatureSet {
    handles: std::vec::IntoIter<FeatureHandle>,
    realizer: Option<Box<dyn Realizer>>,
    property_names: Vec<String>,
}

impl FeatureSet {
    fn empty(property_names: Vec<String>) -> Self {
        Self {
            handles: Vec::new().into_iter(),
            realizer: None,
            property_names,
        }
    }

    /// Requested attribute projection.
    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    /// Remaining candidates (an upper bound on features still to come).
    pub fn remaining(&self) -> usize {
        if self.realizer.is_some() {
            self.handles.len()
        } else {
            0
        }
    }

    /// Realize everything, stopping at the first error.
    pub fn collect_features(self) -> Result<Vec<Arc<Feature>>> {
        self.collect()
    }
}

impl Iterator for FeatureSet {
    type Item = Result<Arc<Feature>>;

    fn next(&mut self) -> Option<Self::Item> {
        let realizer = self.realizer.as_mut()?;
        let Some(handle) = self.handles.next() else {
            self.realizer = None;
            return None;
        };
        match realizer.realize(&handle) {
            Ok(feature) => Some(Ok(feature)),
            Err(e) => {
                self.realizer = None;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl std::fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureSet")
            .field("remaining", &self.remaining())
            .field("property_names", &self.property_names)
            .finish()
    }
}

// ============================================================================
// Store
// ============================================================================

/// Everything built by a successful load. Immutable afterwards.
#[derive(Debug)]
struct Loaded {
    mode: CacheMode,
    index: SpatialIndex<FeatureHandle>,
    extent: Envelope,
    descriptor: LayerDescriptor,
    feature_count: usize,
    /// First features in collection order, with or without geometry, for
    /// geometry-type sampling.
    leading: Vec<FeatureHandle>,
    source: FeatureSource,
}

/// Spatially indexed, read-only GeoJSON feature store.
#[derive(Debug)]
pub struct FeatureStore {
    config: GeoJsonConfig,
    state: LoadState,
    loaded: Option<Loaded>,
}

impl FeatureStore {
    /// Create an unloaded store.
    pub fn new(config: GeoJsonConfig) -> Self {
        Self {
            config,
            state: LoadState::Unloaded,
            loaded: None,
        }
    }

    /// Create and load.
    pub fn open(config: GeoJsonConfig) -> Result<Self> {
        let mut store = Self::new(config);
        store.load()?;
        Ok(store)
    }

    /// Load the configured document.
    ///
    /// A no-op on a ready store. A failed load is terminal: the store moves
    /// to [`LoadState::Failed`] and later calls return `NotLoaded`.
    pub fn load(&mut self) -> Result<()> {
        match self.state {
            LoadState::Ready => return Ok(()),
            LoadState::Failed | LoadState::Loading => return Err(GeoJsonError::NotLoaded),
            LoadState::Unloaded => {}
        }
        self.state = LoadState::Loading;
        let start = Instant::now();
        let mode = self.config.mode();

        let result = self.config.source().and_then(|source| {
            let loaded = match mode {
                CacheMode::Cached => load_cached(&source, &self.config.encoding),
                CacheMode::Lazy => load_lazy(&source, &self.config.encoding),
            };
            loaded.map(|loaded| (source, loaded))
        });

        match result {
            Ok((source, loaded)) => {
                tracing::info!(
                    source = %source.describe(),
                    mode = mode.as_str(),
                    features = loaded.feature_count,
                    indexed = loaded.index.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "GeoJSON store loaded"
                );
                self.loaded = Some(loaded);
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    mode = mode.as_str(),
                    error = %e,
                    "GeoJSON store failed to load"
                );
                self.state = LoadState::Failed;
                Err(e)
            }
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn config(&self) -> &GeoJsonConfig {
        &self.config
    }

    fn loaded(&self) -> Result<&Loaded> {
        match (&self.state, &self.loaded) {
            (LoadState::Ready, Some(loaded)) => Ok(loaded),
            _ => Err(GeoJsonError::NotLoaded),
        }
    }

    pub fn mode(&self) -> Result<CacheMode> {
        Ok(self.loaded()?.mode)
    }

    /// Dataset envelope; invalid when no feature has geometry.
    pub fn envelope(&self) -> Result<Envelope> {
        Ok(self.loaded()?.extent)
    }

    pub fn descriptor(&self) -> Result<&LayerDescriptor> {
        Ok(&self.loaded()?.descriptor)
    }

    pub fn schema(&self) -> Result<&AttributeSchema> {
        Ok(&self.loaded()?.descriptor.schema)
    }

    /// Number of indexed features (those with a valid envelope).
    pub fn len(&self) -> Result<usize> {
        Ok(self.loaded()?.index.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.loaded()?.index.is_empty())
    }

    /// Number of feature objects in the document, with or without geometry.
    pub fn feature_count(&self) -> Result<usize> {
        Ok(self.loaded()?.feature_count)
    }

    pub fn index_stats(&self) -> Result<IndexStats> {
        Ok(self.loaded()?.index.stats())
    }

    /// Run a query.
    ///
    /// A box that misses the dataset envelope returns an empty set without
    /// touching the index.
    pub fn features(&self, query: &Query) -> Result<FeatureSet> {
        let loaded = self.loaded()?;
        if !query.bbox.intersects(&loaded.extent) {
            tracing::trace!(bbox = ?query.bbox, "query misses dataset extent");
            return Ok(FeatureSet::empty(query.property_names.clone()));
        }

        let mut handles: Vec<FeatureHandle> =
            loaded.index.query(&query.bbox).into_iter().copied().collect();
        tracing::trace!(bbox = ?query.bbox, candidates = handles.len(), "GeoJSON query");
        if handles.is_empty() {
            return Ok(FeatureSet::empty(query.property_names.clone()));
        }

        let realizer = loaded.source.realizer()?;
        realizer.order(&mut handles);
        Ok(FeatureSet {
            handles: handles.into_iter(),
            realizer: Some(realizer),
            property_names: query.property_names.clone(),
        })
    }

    /// Shorthand for a query without projection.
    pub fn query(&self, bbox: Envelope) -> Result<FeatureSet> {
        self.features(&Query::new(bbox))
    }

    /// Features within `tolerance` of a point, projecting every schema
    /// attribute.
    pub fn features_at_point(&self, x: f64, y: f64, tolerance: f64) -> Result<FeatureSet> {
        let loaded = self.loaded()?;
        let mut query = Query::new(Envelope::from_point(x, y).padded(tolerance));
        for name in loaded.descriptor.schema.names() {
            query.add_property_name(name);
        }
        self.features(&query)
    }

    /// Best-effort geometry type from the first [`GEOMETRY_TYPE_SAMPLE`]
    /// features of the collection.
    ///
    /// Features without geometry still use up a sample slot. Returns
    /// `Collection` as soon as two different types are seen, and `None` when
    /// no sampled feature has geometry.
    pub fn geometry_type(&self) -> Result<Option<DatasourceGeometryType>> {
        let loaded = self.loaded()?;
        if loaded.leading.is_empty() {
            return Ok(None);
        }
        let mut realizer = loaded.source.realizer()?;
        let mut result = None;
        for handle in &loaded.leading {
            let feature = realizer.realize(handle)?;
            let Some(kind) = feature.geometry_type() else {
                continue;
            };
            match result {
                Some(seen) if seen != kind => return Ok(Some(DatasourceGeometryType::Collection)),
                _ => result = Some(kind),
            }
        }
        Ok(result)
    }
}

// ============================================================================
// Load paths
// ============================================================================

fn load_cached(source: &GeoJsonSource, encoding: &str) -> Result<Loaded> {
    let parsed = match source {
        GeoJsonSource::Inline(text) => parse_feature_collection(text.as_bytes(), DEFAULT_START_ID)?,
        GeoJsonSource::File(path) => {
            let bytes = std::fs::read(path)?;
            parse_feature_collection(&bytes, DEFAULT_START_ID)?
        }
    };

    let index = SpatialIndex::build(
        parsed
            .envelopes
            .iter()
            .enumerate()
            .map(|(ordinal, env)| (*env, FeatureHandle::cached(ordinal))),
    );
    let leading = leading_handles((0..parsed.features.len()).map(FeatureHandle::cached));

    let mut descriptor = LayerDescriptor::new(DATASOURCE_NAME, encoding);
    descriptor.schema = parsed.schema;
    let features: Arc<[Arc<Feature>]> = parsed.features.into_iter().map(Arc::new).collect();

    Ok(Loaded {
        mode: CacheMode::Cached,
        index,
        extent: parsed.extent.envelope(),
        descriptor,
        feature_count: features.len(),
        leading,
        source: FeatureSource::Cached(features),
    })
}

fn load_lazy(source: &GeoJsonSource, encoding: &str) -> Result<Loaded> {
    let bytes = match source {
        GeoJsonSource::Inline(text) => ByteRangeStore::memory(Arc::clone(text)),
        GeoJsonSource::File(path) => ByteRangeStore::file(path)?,
    };
    let locations = extract_bounding_boxes(bytes.scan_reader()?)?;

    let mut extent = Extent::new();
    let mut descriptor = LayerDescriptor::new(DATASOURCE_NAME, encoding);
    for loc in &locations {
        if extent.include(&loc.envelope) {
            // Schema from this feature only.
            let text = bytes.read_range(loc.offset, loc.length)?;
            let feature = parse_feature(&text, DEFAULT_START_ID + loc.ordinal as u64)?;
            descriptor.schema = AttributeSchema::from_feature(&feature);
            tracing::debug!(
                ordinal = loc.ordinal,
                attributes = descriptor.schema.len(),
                "attribute schema seeded"
            );
        }
    }

    let leading = leading_handles(
        locations
            .iter()
            .map(|loc| FeatureHandle::lazy(loc.ordinal, loc.offset, loc.length)),
    );
    let index = SpatialIndex::build(
        locations
            .iter()
            .map(|loc| (loc.envelope, FeatureHandle::lazy(loc.ordinal, loc.offset, loc.length))),
    );

    Ok(Loaded {
        mode: CacheMode::Lazy,
        index,
        extent: extent.envelope(),
        descriptor,
        feature_count: locations.len(),
        leading,
        source: FeatureSource::Lazy {
            bytes,
            base_id: DEFAULT_START_ID,
        },
    })
}

fn leading_handles(handles: impl Iterator<Item = FeatureHandle>) -> Vec<FeatureHandle> {
    handles.take(GEOMETRY_TYPE_SAMPLE).collect()
}
