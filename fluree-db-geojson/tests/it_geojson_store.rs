//! GeoJSON feature store integration tests
//!
//! File-backed loads in both modes, lifecycle failures, lazy-mode behavior
//! when the document changes under a loaded store, concurrent readers, and
//! brute-force equivalence of query results across modes.

use fluree_db_geojson::{
    CacheMode, DatasourceGeometryType, Envelope, FeatureStore, GeoJsonConfig, LoadState,
};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_temp(content: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

fn file_config(path: &Path, cache_features: bool) -> GeoJsonConfig {
    GeoJsonConfig::file(path.to_string_lossy()).with_cache_features(cache_features)
}

fn ids(store: &FeatureStore, bbox: Envelope) -> Vec<u64> {
    store
        .query(bbox)
        .unwrap()
        .collect_features()
        .unwrap()
        .iter()
        .map(|f| f.id())
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const THREE_SQUARES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"name": "a"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
    {"type": "Feature", "properties": {"name": "b"},
     "geometry": {"type": "Polygon", "coordinates": [[[5,5],[6,5],[6,6],[5,6],[5,5]]]}},
    {"type": "Feature", "properties": {"name": "c"},
     "geometry": {"type": "Polygon", "coordinates": [[[10,10],[11,10],[11,11],[10,11],[10,10]]]}}
  ]
}"#;

const THREE_POINTS: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","properties":{"n":1},"geometry":{"type":"Point","coordinates":[0.5,0.5]}},
  {"type":"Feature","properties":{"n":2},"geometry":{"type":"Point","coordinates":[5.5,5.5]}},
  {"type":"Feature","properties":{"n":3},"geometry":{"type":"Point","coordinates":[10.5,10.5]}}
]}"#;

// =============================================================================
// File-backed loads
// =============================================================================

#[test]
fn file_backed_query_both_modes() {
    init_tracing();
    let tmp = write_temp(THREE_SQUARES);
    for cache in [true, false] {
        let store = FeatureStore::open(file_config(tmp.path(), cache)).unwrap();
        assert_eq!(store.mode().unwrap(), CacheMode::from_cache_features(cache));
        assert_eq!(store.envelope().unwrap(), Envelope::new(0.0, 0.0, 11.0, 11.0));
        assert_eq!(
            ids(&store, Envelope::new(0.5, 0.5, 5.5, 5.5)),
            vec![1, 2],
            "cache_features = {}",
            cache
        );
        // Touching an edge counts.
        assert_eq!(ids(&store, Envelope::new(6.0, 6.0, 10.0, 10.0)), vec![2, 3]);
        assert_eq!(
            store.geometry_type().unwrap(),
            Some(DatasourceGeometryType::Polygon)
        );
    }
}

#[test]
fn escaped_member_names_agree_across_modes() {
    let doc = r#"{"type":"Feature\u0043ollection","feat\u0075res":[
  {"type":"Feature","properties":{"n":1},"geo\u006detry":{"type":"Point","coordinates":[1,1]}},
  {"type":"Feature","properties":{"n":2},"geometry":{"type":"Point","coordin\u0061tes":[-0.5e+1,2E0]}},
  {"type":"Feature","properties":{"n":"\ud83c\udf0d"},"geometry":null}
]}"#;
    let tmp = write_temp(doc);
    for cache in [true, false] {
        let store = FeatureStore::open(file_config(tmp.path(), cache)).unwrap();
        assert_eq!(store.feature_count().unwrap(), 3);
        assert_eq!(store.len().unwrap(), 2, "cache_features = {}", cache);
        assert_eq!(store.envelope().unwrap(), Envelope::new(-5.0, 1.0, 1.0, 2.0));
        assert_eq!(ids(&store, Envelope::new(-5.0, 0.0, 0.0, 5.0)), vec![2]);
        assert_eq!(ids(&store, Envelope::new(-10.0, -10.0, 10.0, 10.0)), vec![1, 2]);
    }
}

#[test]
fn point_features_infer_point_type() {
    let tmp = write_temp(THREE_POINTS);
    for cache in [true, false] {
        let store = FeatureStore::open(file_config(tmp.path(), cache)).unwrap();
        assert_eq!(
            store.geometry_type().unwrap(),
            Some(DatasourceGeometryType::Point)
        );
        assert_eq!(ids(&store, Envelope::new(0.5, 0.5, 5.5, 5.5)), vec![1, 2]);
    }
}

#[test]
fn base_directory_joined_from_params() {
    let tmp = write_temp(THREE_POINTS);
    let dir = tmp.path().parent().unwrap().to_string_lossy().into_owned();
    let name = tmp
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    let config = GeoJsonConfig::from_params([
        ("type", "geojson".to_string()),
        ("base", dir),
        ("file", name),
        ("cache_features", "no".to_string()),
    ])
    .unwrap();
    let store = FeatureStore::open(config).unwrap();
    assert_eq!(store.mode().unwrap(), CacheMode::Lazy);
    assert_eq!(store.len().unwrap(), 3);
}

#[test]
fn empty_collection_file() {
    let tmp = write_temp(r#"{"type":"FeatureCollection","features":[]}"#);
    for cache in [true, false] {
        let store = FeatureStore::open(file_config(tmp.path(), cache)).unwrap();
        assert!(!store.envelope().unwrap().is_valid());
        assert_eq!(store.feature_count().unwrap(), 0);
        assert!(ids(&store, Envelope::new(-180.0, -90.0, 180.0, 90.0)).is_empty());
    }
}

// =============================================================================
// Lifecycle failures
// =============================================================================

#[test]
fn truncated_file_fails_then_not_loaded() {
    let tmp = write_temp(&THREE_SQUARES[..THREE_SQUARES.len() - 20]);
    for cache in [true, false] {
        let mut store = FeatureStore::new(file_config(tmp.path(), cache));
        let err = store.load().unwrap_err();
        assert!(err.is_parse(), "expected parse error, got {}", err);
        assert_eq!(store.state(), LoadState::Failed);
        assert!(store.load().unwrap_err().is_not_loaded());
        assert!(store.schema().unwrap_err().is_not_loaded());
        assert!(store
            .features_at_point(0.0, 0.0, 1.0)
            .unwrap_err()
            .is_not_loaded());
    }
}

#[test]
fn missing_file_is_io_error() {
    for cache in [true, false] {
        let config = GeoJsonConfig::file("does-not-exist.geojson")
            .with_base("/nonexistent")
            .with_cache_features(cache);
        let mut store = FeatureStore::new(config);
        assert!(store.load().unwrap_err().is_io());
        assert_eq!(store.state(), LoadState::Failed);
    }
}

#[test]
fn lazy_realization_error_aborts_query_only() {
    let tmp = write_temp(THREE_POINTS);
    let store = FeatureStore::open(file_config(tmp.path(), false)).unwrap();

    // Same length, so other byte ranges stay valid.
    let mutated = THREE_POINTS.replacen(
        r#"{"type":"Feature","properties":{"n":2}"#,
        r#"{"type":"Xeature","properties":{"n":2}"#,
        1,
    );
    assert_ne!(mutated, THREE_POINTS);
    std::fs::write(tmp.path(), &mutated).unwrap();

    let mut set = store.query(Envelope::new(0.0, 0.0, 6.0, 6.0)).unwrap();
    assert_eq!(set.next().unwrap().unwrap().id(), 1);
    assert!(set.next().unwrap().unwrap_err().is_parse());
    assert!(set.next().is_none());

    assert_eq!(store.state(), LoadState::Ready);
    assert_eq!(ids(&store, Envelope::new(10.0, 10.0, 11.0, 11.0)), vec![3]);
}

#[test]
fn lazy_file_truncated_after_load_is_parse_error() {
    let tmp = write_temp(THREE_POINTS);
    let store = FeatureStore::open(file_config(tmp.path(), false)).unwrap();

    // Cut the document inside the third feature.
    let third = THREE_POINTS
        .find(r#"{"type":"Feature","properties":{"n":3}"#)
        .unwrap();
    tmp.as_file().set_len(third as u64 + 10).unwrap();

    let mut set = store.query(Envelope::new(0.0, 0.0, 11.0, 11.0)).unwrap();
    assert_eq!(set.next().unwrap().unwrap().id(), 1);
    assert_eq!(set.next().unwrap().unwrap().id(), 2);
    let err = set.next().unwrap().unwrap_err();
    assert!(err.is_parse(), "{}", err);
    assert!(set.next().is_none());

    assert_eq!(store.state(), LoadState::Ready);
    assert_eq!(ids(&store, Envelope::new(0.0, 0.0, 1.0, 1.0)), vec![1]);
}

// =============================================================================
// Concurrency and idempotence
// =============================================================================

#[test]
fn concurrent_lazy_queries() {
    let doc = grid_document(40);
    let tmp = write_temp(&doc);
    let store = FeatureStore::open(file_config(tmp.path(), false)).unwrap();
    let expected = ids(&store, Envelope::new(10.0, 10.0, 20.0, 20.0));
    assert_eq!(expected.len(), 11 * 11);

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| ids(&store, Envelope::new(10.0, 10.0, 20.0, 20.0))))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn reload_is_idempotent() {
    let doc = grid_document(25);
    let tmp = write_temp(&doc);
    for cache in [true, false] {
        let a = FeatureStore::open(file_config(tmp.path(), cache)).unwrap();
        let b = FeatureStore::open(file_config(tmp.path(), cache)).unwrap();
        assert_eq!(a.envelope().unwrap(), b.envelope().unwrap());
        assert_eq!(a.schema().unwrap(), b.schema().unwrap());
        let q = Envelope::new(3.5, 3.5, 12.0, 7.0);
        let fa = a.query(q).unwrap().collect_features().unwrap();
        let fb = b.query(q).unwrap().collect_features().unwrap();
        assert_eq!(fa, fb);
    }
}

/// `side * side` unit-spaced points with a couple of attributes each.
fn grid_document(side: usize) -> String {
    let features: Vec<String> = (0..side * side)
        .map(|i| {
            format!(
                r#"{{"type":"Feature","properties":{{"row":{},"col":{}}},"geometry":{{"type":"Point","coordinates":[{},{}]}}}}"#,
                i / side,
                i % side,
                i % side,
                i / side
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",\n")
    )
}

// =============================================================================
// Brute-force equivalence
// =============================================================================

mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A feature as `(x, y, w, h)`, or `None` for a null geometry.
    type Shape = Option<(f64, f64, f64, f64)>;

    fn shape() -> impl Strategy<Value = Shape> {
        prop_oneof![
            1 => Just(None),
            4 => (-50i32..50, -50i32..50, 0i32..5, 0i32..5)
                .prop_map(|(x, y, w, h)| Some((x as f64, y as f64, w as f64, h as f64))),
        ]
    }

    fn document(shapes: &[Shape]) -> String {
        let features: Vec<String> = shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let geometry = match shape {
                    None => "null".to_string(),
                    Some((x, y, w, h)) if *w == 0.0 && *h == 0.0 => {
                        format!(r#"{{"type":"Point","coordinates":[{},{}]}}"#, x, y)
                    }
                    Some((x, y, w, h)) => format!(
                        r#"{{"type":"LineString","coordinates":[[{},{}],[{},{}]]}}"#,
                        x,
                        y,
                        x + w,
                        y + h
                    ),
                };
                format!(
                    r#"{{"type":"Feature","properties":{{"i":{}}},"geometry":{}}}"#,
                    i, geometry
                )
            })
            .collect();
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Both modes return exactly the features a linear scan finds, in
        /// collection order.
        #[test]
        fn query_matches_linear_scan(
            shapes in prop::collection::vec(shape(), 0..300),
            (qx, qy, qw, qh) in (-60i32..60, -60i32..60, 0i32..40, 0i32..40),
        ) {
            let doc = document(&shapes);
            let tmp = write_temp(&doc);
            let bbox = Envelope::new(qx as f64, qy as f64, (qx + qw) as f64, (qy + qh) as f64);

            let expected: Vec<u64> = shapes
                .iter()
                .enumerate()
                .filter_map(|(i, shape)| {
                    let (x, y, w, h) = (*shape)?;
                    Envelope::new(x, y, x + w, y + h)
                        .intersects(&bbox)
                        .then_some(i as u64 + 1)
                })
                .collect();

            for cache in [true, false] {
                let store = FeatureStore::open(file_config(tmp.path(), cache)).unwrap();
                prop_assert_eq!(ids(&store, bbox), expected.clone());
                prop_assert_eq!(store.feature_count().unwrap(), shapes.len());
            }
        }
    }
}
