//! Realized features, attribute values, and the layer schema.

use crate::envelope::Envelope;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A feature attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

impl AttrValue {
    /// Convert a `properties` member value.
    ///
    /// Numbers that fit `i64` become `Integer`, other numbers `Double`.
    /// Nested arrays and objects are kept as their compact JSON text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Integer(i),
                None => AttrValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => AttrValue::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                AttrValue::String(nested.to_string())
            }
        }
    }

    /// Schema type of this value.
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttrValue::Integer(_) => AttributeType::Integer,
            AttrValue::Double(_) => AttributeType::Double,
            AttrValue::Bool(_) => AttributeType::Boolean,
            AttrValue::String(_) | AttrValue::Null => AttributeType::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => Ok(()),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Integer(i) => write!(f, "{}", i),
            AttrValue::Double(d) => write!(f, "{}", d),
            AttrValue::String(s) => f.write_str(s),
        }
    }
}

/// Declared attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Integer,
    Double,
    Boolean,
    String,
}

/// One `(name, type)` schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub attr_type: AttributeType,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// Ordered, name-unique attribute schema of a layer.
///
/// Seeded from a single feature (the first one with a valid envelope); it is
/// an indication of the collection's attributes, not their union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    descriptors: Vec<AttributeDescriptor>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a feature's attributes, in attribute order.
    pub fn from_feature(feature: &Feature) -> Self {
        let mut schema = Self::new();
        for (name, value) in feature.attributes() {
            schema.add(AttributeDescriptor::new(name, value.attribute_type()));
        }
        schema
    }

    /// Append a descriptor. Returns false (and keeps the first) on a duplicate name.
    pub fn add(&mut self, descriptor: AttributeDescriptor) -> bool {
        if self.get(&descriptor.name).is_some() {
            return false;
        }
        self.descriptors.push(descriptor);
        true
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn descriptors(&self) -> &[AttributeDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Layer metadata: datasource name, declared encoding, and attribute schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    pub encoding: String,
    pub schema: AttributeSchema,
}

impl LayerDescriptor {
    pub fn new(name: impl Into<String>, encoding: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encoding: encoding.into(),
            schema: AttributeSchema::new(),
        }
    }
}

/// Geometry classification of a datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasourceGeometryType {
    Point,
    LineString,
    Polygon,
    /// Mixed types, or geometry collections.
    Collection,
}

impl DatasourceGeometryType {
    /// Classify one geometry.
    pub fn from_geometry(geom: &Geometry<f64>) -> Self {
        match geom {
            Geometry::Point(_) | Geometry::MultiPoint(_) => DatasourceGeometryType::Point,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                DatasourceGeometryType::LineString
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => DatasourceGeometryType::Polygon,
            Geometry::GeometryCollection(_) => DatasourceGeometryType::Collection,
        }
    }

    /// Classify a feature's geometry list. `None` when it has no geometry.
    pub fn from_geometries(geoms: &[Geometry<f64>]) -> Option<Self> {
        match geoms {
            [] => None,
            [single] => Some(Self::from_geometry(single)),
            _ => Some(DatasourceGeometryType::Collection),
        }
    }
}

impl fmt::Display for DatasourceGeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasourceGeometryType::Point => "Point",
            DatasourceGeometryType::LineString => "LineString",
            DatasourceGeometryType::Polygon => "Polygon",
            DatasourceGeometryType::Collection => "Collection",
        };
        f.write_str(s)
    }
}

/// A realized feature: id, ordered attributes, and geometries.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: u64,
    attributes: Vec<(String, AttrValue)>,
    geometries: Vec<Geometry<f64>>,
}

impl Feature {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            attributes: Vec::new(),
            geometries: Vec::new(),
        }
    }

    pub fn with_parts(
        id: u64,
        attributes: Vec<(String, AttrValue)>,
        geometries: Vec<Geometry<f64>>,
    ) -> Self {
        Self {
            id,
            attributes,
            geometries,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn put(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn geometries(&self) -> &[Geometry<f64>] {
        &self.geometries
    }

    /// Bounds of all geometries; invalid when the feature has none.
    pub fn envelope(&self) -> Envelope {
        Envelope::from_geometries(&self.geometries)
    }

    pub fn geometry_type(&self) -> Option<DatasourceGeometryType> {
        DatasourceGeometryType::from_geometries(&self.geometries)
    }
}
