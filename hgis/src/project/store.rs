//! Opening and saving project files with live source bindings.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{load, save, Project, ProjectError, ProjectLoadWarning};
use crate::layer::{LayerId, NewLayer};
use crate::source::{SourceError, SourceFactory};

/// Reads and writes `.hgis` files and binds their layers through a
/// [`SourceFactory`].
#[derive(Clone)]
pub struct ProjectStore {
    factory: Arc<SourceFactory>,
}

impl ProjectStore {
    pub fn new(factory: Arc<SourceFactory>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &Arc<SourceFactory> {
        &self.factory
    }

    /// Open a project file and bind every layer.
    ///
    /// Layers whose source is missing or unreachable stay in the stack
    /// unbound, each with a warning.
    pub async fn open(
        &self,
        path: &Path,
    ) -> Result<(Project, Vec<ProjectLoadWarning>), ProjectError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProjectError::io(path, e))?;
        let (mut project, mut warnings) = load(&bytes)?;
        project.path = Some(path.to_path_buf());

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        warnings.extend(self.bind_all(&mut project, base).await);
        info!(
            path = %path.display(),
            layers = project.stack.len(),
            warnings = warnings.len(),
            "Project opened"
        );
        Ok((project, warnings))
    }

    /// Bind every unbound layer, resolving relative file paths against
    /// `base`. Binds run concurrently.
    pub async fn bind_all(&self, project: &mut Project, base: &Path) -> Vec<ProjectLoadWarning> {
        let pending: Vec<_> = project
            .stack
            .layers()
            .iter()
            .filter(|l| !l.is_bound())
            .map(|l| (l.id, l.name.clone(), l.binding.resolved(base), l.source_crs.clone()))
            .collect();

        let results = futures::future::join_all(pending.iter().map(|(id, _, binding, crs)| {
            self.factory.bind(*id, binding, crs)
        }))
        .await;

        let mut warnings = Vec::new();
        for ((id, name, binding, _), result) in pending.iter().zip(results) {
            match result {
                Ok(source) => {
                    // The layer was just listed, so it is still present.
                    let _ = project.stack.set_source(*id, Some(source));
                }
                Err(e) => {
                    warn!(layer = %id, source = %binding.describe(), error = %e, "Layer source not bound");
                    warnings.push(ProjectLoadWarning::new(*id, name, e.to_string()));
                }
            }
        }
        warnings
    }

    /// Bind `spec` and add it on top of the stack. Nothing is added if the
    /// source cannot be bound.
    pub async fn add_layer(
        &self,
        project: &mut Project,
        spec: NewLayer,
    ) -> Result<LayerId, SourceError> {
        let base = project
            .path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let binding = spec.binding.resolved(&base);
        let source_crs = spec.source_crs.clone();
        let id = project.stack.add_layer(spec);
        match self.factory.bind(id, &binding, &source_crs).await {
            Ok(source) => {
                project.stack.set_source(id, Some(source)).map_err(|e| {
                    SourceError::SourceUnavailable(e.to_string())
                })?;
                Ok(id)
            }
            Err(e) => {
                let _ = project.stack.remove_layer(id);
                Err(e)
            }
        }
    }

    /// Write the project to `path` and remember it as the project's path.
    /// The file is replaced atomically.
    pub async fn save_to(&self, project: &mut Project, path: &Path) -> Result<(), ProjectError> {
        let bytes = save(project)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProjectError::io(parent, e))?;
        }
        let tmp = path.with_extension("hgis.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| ProjectError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| ProjectError::io(path, e))?;
        project.path = Some(path.to_path_buf());
        info!(path = %path.display(), layers = project.stack.len(), "Project saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{CrsEngine, CrsId};
    use crate::geometry::BoundingBox;
    use crate::source::{RetryPolicy, SourceBinding, SourceSettings};
    use crate::testing::{write_point_shapefile, MockHttpClient, MockQueryClient, PointRecord};

    fn store() -> ProjectStore {
        let settings = SourceSettings {
            retry: RetryPolicy::NONE,
            ..Default::default()
        };
        let factory = SourceFactory::with_http_client(
            Arc::new(CrsEngine::new()),
            settings,
            Arc::new(MockHttpClient::new()),
        )
        .with_query_client(Arc::new(MockQueryClient::new()));
        ProjectStore::new(Arc::new(factory))
    }

    fn empty_project() -> Project {
        Project::new(
            CrsId::epsg(4326),
            BoundingBox::new(126.5, 37.0, 127.5, 38.0),
            400,
            400,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_layer_binds_relative_to_project() {
        let dir = tempfile::tempdir().unwrap();
        write_point_shapefile(
            &dir.path().join("poi.shp"),
            &[PointRecord::new(127.0, 37.5, "A", 2020)],
            None,
        )
        .unwrap();
        let store = store();
        let mut project = empty_project();
        project.path = Some(dir.path().join("map.hgis"));

        let id = store
            .add_layer(
                &mut project,
                NewLayer::new(
                    "POI",
                    SourceBinding::VectorFile {
                        path: "poi.shp".into(),
                    },
                    CrsId::epsg(4326),
                ),
            )
            .await
            .unwrap();
        let layer = project.stack.get(id).unwrap();
        assert!(layer.is_bound());
        // The relative path is what gets saved.
        assert_eq!(layer.binding.path().unwrap(), Path::new("poi.shp"));
    }

    #[tokio::test]
    async fn test_add_layer_with_missing_file_adds_nothing() {
        let store = store();
        let mut project = empty_project();
        let result = store
            .add_layer(
                &mut project,
                NewLayer::new(
                    "Ghost",
                    SourceBinding::VectorFile {
                        path: "/nonexistent/ghost.shp".into(),
                    },
                    CrsId::epsg(4326),
                ),
            )
            .await;
        assert!(result.is_err());
        assert!(project.stack.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_open() {
        let dir = tempfile::tempdir().unwrap();
        write_point_shapefile(
            &dir.path().join("poi.shp"),
            &[PointRecord::new(127.0, 37.5, "A", 2020)],
            None,
        )
        .unwrap();
        let store = store();
        let mut project = empty_project();
        project.path = Some(dir.path().join("map.hgis"));
        store
            .add_layer(
                &mut project,
                NewLayer::new(
                    "POI",
                    SourceBinding::VectorFile {
                        path: "poi.shp".into(),
                    },
                    CrsId::epsg(4326),
                ),
            )
            .await
            .unwrap();
        project.stack.add_layer(NewLayer::new(
            "Missing",
            SourceBinding::VectorFile {
                path: "gone.shp".into(),
            },
            CrsId::epsg(4326),
        ));

        let path = dir.path().join("out").join("map.hgis");
        store.save_to(&mut project, &path).await.unwrap();
        assert_eq!(project.path.as_deref(), Some(path.as_path()));
        assert!(!path.with_extension("hgis.tmp").exists());

        // Saved into out/, so the relative data paths no longer resolve.
        let (reopened, warnings) = store.open(&path).await.unwrap();
        assert_eq!(reopened.stack.len(), 2);
        assert_eq!(warnings.len(), 2);
        assert_eq!(reopened.name(), "map");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_io_error() {
        let err = store()
            .open(Path::new("/nonexistent/project.hgis"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::Io { .. }));
    }
}
