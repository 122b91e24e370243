//! Vector file layers end to end: shapefile on disk, adapter, spatial
//! index and fetch.
//!
//! Run with: `cargo test --test shapefile_scenario`

use std::collections::HashSet;
use std::sync::Arc;

use hgis::crs::{CrsEngine, CrsId};
use hgis::geometry::{AttributeValue, BoundingBox, FeatureHandle};
use hgis::layer::LayerId;
use hgis::source::{DataSource, FetchRequest, VectorFileAdapter};
use hgis::testing::{write_point_shapefile, PointRecord};
use tokio_util::sync::CancellationToken;

const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

fn three_points() -> Vec<PointRecord> {
    vec![
        PointRecord::new(127.0, 37.5, "Jongno", 1394),
        PointRecord::new(126.9, 37.6, "Eunpyeong", 1979),
        PointRecord::new(127.1, 37.4, "Gangnam", 1975),
    ]
}

async fn open_layer(dir: &tempfile::TempDir, layer: LayerId) -> VectorFileAdapter {
    let path = dir.path().join("districts.shp");
    write_point_shapefile(&path, &three_points(), Some(WGS84_PRJ)).unwrap();
    VectorFileAdapter::open(layer, path, CrsId::epsg(5186), Arc::new(CrsEngine::new()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_index_query_returns_exactly_the_covered_points() {
    let dir = tempfile::tempdir().unwrap();
    let layer = LayerId(7);
    let adapter = open_layer(&dir, layer).await;

    assert_eq!(adapter.native_crs(), &CrsId::epsg(4326));
    assert_eq!(adapter.feature_count(), 3);

    // Covers the first two points only.
    let bbox = BoundingBox::new(126.85, 37.45, 127.05, 37.65);
    let handles: HashSet<FeatureHandle> = adapter.index().query(&bbox).into_iter().collect();

    let names: HashSet<String> = handles
        .iter()
        .map(|h| {
            assert_eq!(h.layer, layer);
            match adapter.attribute(h.feature, "NAME").unwrap() {
                Some(AttributeValue::Text(name)) => name,
                other => panic!("unexpected NAME {:?}", other),
            }
        })
        .collect();
    assert_eq!(handles.len(), 2);
    assert_eq!(
        names,
        HashSet::from(["Jongno".to_string(), "Eunpyeong".to_string()])
    );
}

#[tokio::test]
async fn test_full_extent_query_returns_each_feature_once() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = open_layer(&dir, LayerId(1)).await;

    let extent = adapter.full_extent().unwrap();
    let handles = adapter.index().query(&extent);
    assert_eq!(handles.len(), 3);
    let unique: HashSet<_> = handles.iter().collect();
    assert_eq!(unique.len(), 3);

    let disjoint = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
    assert!(adapter.index().query(&disjoint).is_empty());
}

#[tokio::test]
async fn test_fetch_in_another_crs() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = open_layer(&dir, LayerId(1)).await;
    let engine = CrsEngine::new();

    // The same two-point window, expressed in Korea 2000 / Central Belt 2010.
    let window = engine
        .transform_bbox(
            &BoundingBox::new(126.85, 37.45, 127.05, 37.65),
            &CrsId::epsg(4326),
            &CrsId::epsg(5186),
        )
        .unwrap();
    let request = FetchRequest::new(window, CrsId::epsg(5186), 25_000.0, 800, 800);
    let payload = adapter
        .fetch(&request, &CancellationToken::new())
        .await
        .unwrap();

    let features = payload.features().unwrap();
    assert_eq!(features.len(), 2);
    // Features come back in their native CRS; the render engine reprojects.
    for feature in features {
        assert_eq!(feature.geometry.crs(), &CrsId::epsg(4326));
    }
}
