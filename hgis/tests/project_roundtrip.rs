//! Saving and reopening projects, including layers whose source has gone
//! away.
//!
//! Run with: `cargo test --test project_roundtrip`

use std::sync::Arc;

use hgis::crs::{CrsEngine, CrsId};
use hgis::geometry::BoundingBox;
use hgis::layer::{LayerStatus, NewLayer};
use hgis::project::{Project, ProjectStore};
use hgis::source::{RetryPolicy, SourceBinding, SourceFactory, SourceSettings, WmsConfig};
use hgis::status::StatusBoard;
use hgis::testing::{write_geotiff, write_point_shapefile, MockHttpClient, PointRecord};
use image::{Rgba, RgbaImage};

fn store() -> ProjectStore {
    let settings = SourceSettings {
        retry: RetryPolicy::NONE,
        ..Default::default()
    };
    // No scripted responses: every WMS request fails to connect.
    let factory = SourceFactory::with_http_client(
        Arc::new(CrsEngine::new()),
        settings,
        Arc::new(MockHttpClient::new()),
    );
    ProjectStore::new(Arc::new(factory))
}

fn write_fixtures(dir: &std::path::Path) {
    write_point_shapefile(
        &dir.join("stations.shp"),
        &[
            PointRecord::new(127.0, 37.5, "Seoul", 1900),
            PointRecord::new(129.0, 35.1, "Busan", 1905),
        ],
        None,
    )
    .unwrap();
    let image = RgbaImage::from_pixel(64, 64, Rgba([30, 120, 60, 255]));
    write_geotiff(&dir.join("landcover.tif"), &[image], (126.0, 38.0), 0.05, Some(4326)).unwrap();
}

#[tokio::test]
async fn test_save_and_reopen_with_unreachable_service() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let store = store();

    let mut project = Project::new(
        CrsId::epsg(4326),
        BoundingBox::new(125.0, 33.0, 130.0, 39.0),
        1000,
        1200,
    )
    .unwrap();
    project.path = Some(dir.path().join("korea.hgis"));

    let landcover = store
        .add_layer(
            &mut project,
            NewLayer::new(
                "Land cover",
                SourceBinding::RasterTile {
                    path: "landcover.tif".into(),
                },
                CrsId::epsg(4326),
            )
            .with_opacity(0.5),
        )
        .await
        .unwrap();
    let stations = store
        .add_layer(
            &mut project,
            NewLayer::new(
                "Stations",
                SourceBinding::VectorFile {
                    path: "stations.shp".into(),
                },
                CrsId::epsg(4326),
            ),
        )
        .await
        .unwrap();
    // The service is down while editing too, so it goes in unbound.
    let ortho = project.stack.add_layer(
        NewLayer::new(
            "Ortho",
            SourceBinding::Service(WmsConfig::new(
                "http://wms.invalid/service",
                "ortho",
                CrsId::epsg(3857),
            )),
            CrsId::epsg(3857),
        )
        .with_visibility(false),
    );
    project.stack.reorder(ortho, 1).unwrap();
    let expected_order = vec![stations, ortho, landcover];
    let order: Vec<_> = project.stack.layers().iter().map(|l| l.id).collect();
    assert_eq!(order, expected_order);

    let path = dir.path().join("korea.hgis");
    store.save_to(&mut project, &path).await.unwrap();

    let (reopened, warnings) = store.open(&path).await.unwrap();

    let order: Vec<_> = reopened.stack.layers().iter().map(|l| l.id).collect();
    assert_eq!(order, expected_order);
    assert_eq!(reopened.crs, CrsId::epsg(4326));
    let (a, b) = (project.viewport.extent(), reopened.viewport.extent());
    for (x, y) in [(a.min_x, b.min_x), (a.min_y, b.min_y), (a.max_x, b.max_x), (a.max_y, b.max_y)] {
        assert!((x - y).abs() < 1e-9, "extent changed: {} vs {}", a, b);
    }

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].layer, ortho);
    assert_eq!(warnings[0].name, "Ortho");

    assert!(reopened.stack.get(stations).unwrap().is_bound());
    assert!(reopened.stack.get(landcover).unwrap().is_bound());
    let ortho_layer = reopened.stack.get(ortho).unwrap();
    assert!(!ortho_layer.is_bound());
    assert!(!ortho_layer.visible);
    assert_eq!(reopened.stack.get(landcover).unwrap().opacity, 0.5);

    let status = reopened.status(&StatusBoard::new(), None);
    assert_eq!(status.crs, "EPSG:4326");
    let ortho_line = status.layers.iter().find(|l| l.id == ortho).unwrap();
    assert!(matches!(ortho_line.status, LayerStatus::Unbound(_)));
}

#[tokio::test]
async fn test_reopened_project_saves_identically() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let store = store();

    let mut project = Project::new(
        CrsId::epsg(5186),
        BoundingBox::new(180_000.0, 530_000.0, 220_000.0, 560_000.0),
        640,
        480,
    )
    .unwrap();
    project.stack.add_layer(NewLayer::new(
        "Gone",
        SourceBinding::VectorFile {
            path: "missing.shp".into(),
        },
        CrsId::epsg(5186),
    ));
    let first = dir.path().join("a.hgis");
    store.save_to(&mut project, &first).await.unwrap();

    let (mut reopened, warnings) = store.open(&first).await.unwrap();
    assert_eq!(warnings.len(), 1);
    let second = dir.path().join("b.hgis");
    store.save_to(&mut reopened, &second).await.unwrap();

    let a: serde_json::Value = serde_json::from_slice(&std::fs::read(&first).unwrap()).unwrap();
    let b: serde_json::Value = serde_json::from_slice(&std::fs::read(&second).unwrap()).unwrap();
    assert_eq!(a["layers"], b["layers"]);
    assert_eq!(a["crs"], b["crs"]);
}
