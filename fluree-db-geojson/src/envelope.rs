//! Axis-aligned bounding boxes.

use geo::CoordsIter;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box `{min_x, min_y, max_x, max_y}`.
///
/// Valid iff `min_x <= max_x && min_y <= max_y`. [`Envelope::invalid`] is the
/// empty box: it intersects nothing and is replaced by the first box it is
/// expanded to include.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Create a box from its corners. Arguments are not reordered.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The empty (invalid) box.
    pub fn invalid() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Degenerate box covering a single point.
    pub fn from_point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    /// Closed-interval intersection: shared edges and corners count.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if this box fully contains another box.
    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.max_x >= other.max_x
            && self.min_y <= other.min_y
            && self.max_y >= other.max_y
    }

    /// Grow to cover `other`. An invalid box becomes `other`.
    pub fn expand_to_include(&mut self, other: &Envelope) {
        if !self.is_valid() {
            *self = *other;
            return;
        }
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Grow to cover a point.
    pub fn expand_to_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow all four sides by `tolerance`.
    pub fn pad(&mut self, tolerance: f64) {
        self.min_x -= tolerance;
        self.min_y -= tolerance;
        self.max_x += tolerance;
        self.max_y += tolerance;
    }

    /// Copy grown by `tolerance` on all sides.
    pub fn padded(mut self, tolerance: f64) -> Self {
        self.pad(tolerance);
        self
    }

    /// Bounds of every coordinate of a geometry, interior rings included.
    ///
    /// Returns an invalid box for empty geometries.
    pub fn from_geometry(geom: &Geometry<f64>) -> Self {
        geom.coords_iter().fold(Self::invalid(), |mut env, c| {
            env.expand_to_point(c.x, c.y);
            env
        })
    }

    /// Bounds of a set of geometries.
    pub fn from_geometries<'a>(geoms: impl IntoIterator<Item = &'a Geometry<f64>>) -> Self {
        geoms.into_iter().fold(Self::invalid(), |mut env, g| {
            let next = Self::from_geometry(g);
            if next.is_valid() {
                env.expand_to_include(&next);
            }
            env
        })
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Incrementally accumulated dataset extent.
///
/// The first valid box seeds it; every later valid box expands it. Invalid
/// boxes are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Extent(Option<Envelope>);

impl Extent {
    pub fn new() -> Self {
        Self(None)
    }

    /// Fold one box into the extent. Returns true if this box seeded it.
    pub fn include(&mut self, env: &Envelope) -> bool {
        if !env.is_valid() {
            return false;
        }
        match &mut self.0 {
            Some(acc) => {
                acc.expand_to_include(env);
                false
            }
            None => {
                self.0 = Some(*env);
                true
            }
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.0.is_some()
    }

    /// The accumulated box, or [`Envelope::invalid`] if nothing was included.
    pub fn envelope(&self) -> Envelope {
        self.0.unwrap_or_else(Envelope::invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, LineString, Point, Polygon};

    #[test]
    fn test_closed_intersection() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0);
        assert!(a.intersects(&Envelope::new(1.0, 1.0, 2.0, 2.0)), "corner");
        assert!(a.intersects(&Envelope::new(1.0, 0.5, 2.0, 0.7)), "edge");
        assert!(!a.intersects(&Envelope::new(1.0001, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn test_invalid_intersects_nothing() {
        let empty = Envelope::invalid();
        assert!(!empty.is_valid());
        assert!(!empty.intersects(&Envelope::new(-1e300, -1e300, 1e300, 1e300)));
    }

    #[test]
    fn test_expand_invalid_takes_other() {
        let mut env = Envelope::invalid();
        env.expand_to_include(&Envelope::new(2.0, 3.0, 4.0, 5.0));
        assert_eq!(env, Envelope::new(2.0, 3.0, 4.0, 5.0));
    }

    #[test]
    fn test_pad() {
        let env = Envelope::from_point(10.0, 20.0).padded(0.5);
        assert_eq!(env, Envelope::new(9.5, 19.5, 10.5, 20.5));
    }

    #[test]
    fn test_polygon_bounds_include_interiors() {
        // A malformed hole poking outside the shell still counts.
        let poly = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![LineString::from(vec![
                (1.0, 1.0),
                (5.0, 1.0),
                (1.0, 2.0),
                (1.0, 1.0),
            ])],
        );
        let env = Envelope::from_geometry(&Geometry::Polygon(poly));
        assert_eq!(env, Envelope::new(0.0, 0.0, 5.0, 4.0));
    }

    #[test]
    fn test_from_geometries_skips_empty() {
        let geoms = vec![
            Geometry::LineString(LineString::new(vec![])),
            Geometry::Point(Point::from(coord! { x: 3.0, y: -1.0 })),
        ];
        assert_eq!(
            Envelope::from_geometries(&geoms),
            Envelope::new(3.0, -1.0, 3.0, -1.0)
        );
    }

    #[test]
    fn test_extent_seed_then_expand() {
        let mut extent = Extent::new();
        assert!(!extent.envelope().is_valid());
        assert!(!extent.include(&Envelope::invalid()));
        assert!(extent.include(&Envelope::new(0.0, 0.0, 1.0, 1.0)));
        assert!(!extent.include(&Envelope::new(5.0, -2.0, 6.0, 0.0)));
        assert_eq!(extent.envelope(), Envelope::new(0.0, -2.0, 6.0, 1.0));
    }
}
