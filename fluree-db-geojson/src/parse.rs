//! Full-structure GeoJSON parsing.
//!
//! Two entry points share one feature grammar:
//!
//! - [`parse_feature_collection`] walks a whole document (cached mode). The
//!   `features` array is consumed element by element through a serde seed,
//!   so each feature is realized, measured, and folded into the dataset
//!   extent as soon as it is read; no intermediate parse tree is kept.
//! - [`parse_feature`] parses the exact byte range of one feature object
//!   (lazy mode realization and schema seeding).
//!
//! Because both paths deserialize the same [`RawFeature`], a feature parsed
//! from its byte range is identical to the one produced at the same position
//! by a full-document parse.

use crate::envelope::{Envelope, Extent};
use crate::error::{GeoJsonError, Result};
use crate::feature::{AttrValue, AttributeSchema, Feature};
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Default id assigned to the first feature of a collection.
pub const DEFAULT_START_ID: u64 = 1;

// ============================================================================
// Raw GeoJSON grammar
// ============================================================================

/// A position: at least two numbers; extra ordinates are ignored.
#[derive(Debug, Clone, Copy)]
struct RawPosition(Coord<f64>);

impl<'de> Deserialize<'de> for RawPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PositionVisitor;

        impl<'de> Visitor<'de> for PositionVisitor {
            type Value = RawPosition;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a position array of at least two numbers")
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<RawPosition, A::Error> {
                let x: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let y: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(RawPosition(Coord { x, y }))
            }
        }

        deserializer.deserialize_seq(PositionVisitor)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Point {
        coordinates: RawPosition,
    },
    MultiPoint {
        coordinates: Vec<RawPosition>,
    },
    LineString {
        coordinates: Vec<RawPosition>,
    },
    MultiLineString {
        coordinates: Vec<Vec<RawPosition>>,
    },
    Polygon {
        coordinates: Vec<Vec<RawPosition>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<RawPosition>>>,
    },
    GeometryCollection {
        geometries: Vec<RawGeometry>,
    },
}

fn line(ring: Vec<RawPosition>) -> LineString<f64> {
    LineString::new(ring.into_iter().map(|p| p.0).collect())
}

fn polygon(rings: Vec<Vec<RawPosition>>) -> Polygon<f64> {
    let mut rings = rings.into_iter();
    let exterior = rings.next().map(line).unwrap_or_else(|| LineString::new(vec![]));
    Polygon::new(exterior, rings.map(line).collect())
}

impl RawGeometry {
    fn into_geometry(self) -> Geometry<f64> {
        match self {
            RawGeometry::Point { coordinates } => Geometry::Point(Point(coordinates.0)),
            RawGeometry::MultiPoint { coordinates } => Geometry::MultiPoint(MultiPoint::new(
                coordinates.into_iter().map(|p| Point(p.0)).collect(),
            )),
            RawGeometry::LineString { coordinates } => Geometry::LineString(line(coordinates)),
            RawGeometry::MultiLineString { coordinates } => Geometry::MultiLineString(
                MultiLineString::new(coordinates.into_iter().map(line).collect()),
            ),
            RawGeometry::Polygon { coordinates } => Geometry::Polygon(polygon(coordinates)),
            RawGeometry::MultiPolygon { coordinates } => Geometry::MultiPolygon(
                MultiPolygon::new(coordinates.into_iter().map(polygon).collect()),
            ),
            RawGeometry::GeometryCollection { geometries } => {
                Geometry::GeometryCollection(GeometryCollection::new_from(
                    geometries
                        .into_iter()
                        .map(RawGeometry::into_geometry)
                        .collect(),
                ))
            }
        }
    }
}

/// One GeoJSON feature object. `id`, `bbox` and foreign members are ignored.
#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
}

impl RawFeature {
    fn into_feature(self, id: u64) -> std::result::Result<Feature, String> {
        if let Some(kind) = &self.kind {
            if kind != "Feature" {
                return Err(format!("expected a Feature object, found type '{}'", kind));
            }
        }
        let attributes = self
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name, AttrValue::from_json(value)))
            .collect();
        let geometries = self
            .geometry
            .map(|g| vec![g.into_geometry()])
            .unwrap_or_default();
        Ok(Feature::with_parts(id, attributes, geometries))
    }
}

// ============================================================================
// Single feature
// ============================================================================

/// Parse the bytes of exactly one feature object into a feature with `id`.
pub fn parse_feature(bytes: &[u8], id: u64) -> Result<Feature> {
    let raw: RawFeature =
        serde_json::from_slice(bytes).map_err(|e| GeoJsonError::json("feature", e))?;
    raw.into_feature(id).map_err(GeoJsonError::Parse)
}

// ============================================================================
// Feature collection
// ============================================================================

/// Result of a full-document parse.
#[derive(Debug, Default)]
pub struct ParsedCollection {
    /// Features in collection order, ids strictly increasing.
    pub features: Vec<Feature>,
    /// Envelope of each feature (parallel to `features`; invalid when no geometry).
    pub envelopes: Vec<Envelope>,
    /// Union of every valid feature envelope.
    pub extent: Extent,
    /// Schema of the first feature with a valid envelope.
    pub schema: AttributeSchema,
}

impl ParsedCollection {
    fn push(&mut self, feature: Feature) {
        let envelope = feature.envelope();
        if self.extent.include(&envelope) {
            self.schema = AttributeSchema::from_feature(&feature);
        }
        self.envelopes.push(envelope);
        self.features.push(feature);
    }
}

/// Parse a whole FeatureCollection, numbering features from `start_id`.
pub fn parse_feature_collection(bytes: &[u8], start_id: u64) -> Result<ParsedCollection> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let collection = CollectionSeed { start_id }
        .deserialize(&mut de)
        .map_err(|e| GeoJsonError::json("feature collection", e))?;
    de.end()
        .map_err(|e| GeoJsonError::json("feature collection", e))?;
    Ok(collection)
}

struct CollectionSeed {
    start_id: u64,
}

impl<'de> DeserializeSeed<'de> for CollectionSeed {
    type Value = ParsedCollection;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<ParsedCollection, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for CollectionSeed {
    type Value = ParsedCollection;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a GeoJSON FeatureCollection object")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> std::result::Result<ParsedCollection, A::Error> {
        let mut collection = ParsedCollection::default();
        let mut next_id = self.start_id;
        let mut saw_features = false;

        while let Some(key) = map.next_key::<std::borrow::Cow<'de, str>>()? {
            match key.as_ref() {
                "type" => {
                    let kind: String = map.next_value()?;
                    if kind != "FeatureCollection" {
                        return Err(de::Error::custom(format!(
                            "expected a FeatureCollection, found type '{}'",
                            kind
                        )));
                    }
                }
                "features" => {
                    saw_features = true;
                    map.next_value_seed(FeaturesSeed {
                        collection: &mut collection,
                        next_id: &mut next_id,
                    })?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        if !saw_features {
            return Err(de::Error::missing_field("features"));
        }
        Ok(collection)
    }
}

/// Streams the `features` array into a [`ParsedCollection`].
struct FeaturesSeed<'a> {
    collection: &'a mut ParsedCollection,
    next_id: &'a mut u64,
}

impl<'de, 'a> DeserializeSeed<'de> for FeaturesSeed<'a> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a> Visitor<'de> for FeaturesSeed<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of GeoJSON features")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(raw) = seq.next_element::<RawFeature>()? {
            let feature = raw.into_feature(*self.next_id).map_err(de::Error::custom)?;
            *self.next_id += 1;
            self.collection.push(feature);
        }
        Ok(())
    }
}
