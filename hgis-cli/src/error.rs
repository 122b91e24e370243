//! CLI error handling.
//!
//! Every command returns [`CliError`]; `main` prints it with a hint where
//! one helps and exits with status 1.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process;

use hgis::config::ConfigFileError;
use hgis::crs::CrsError;
use hgis::layer::LayerError;
use hgis::project::ProjectError;
use hgis::render::RenderError;
use hgis::source::SourceError;
use hgis::viewport::ViewportError;

#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(io::Error),
    /// Configuration file could not be read
    Config(ConfigFileError),
    /// Tokio runtime could not be started
    Runtime(io::Error),
    /// Bad command-line value
    InvalidArgument(String),
    /// Project could not be opened, created or saved
    Project(ProjectError),
    /// Layer source could not be bound
    Source(SourceError),
    Layer(LayerError),
    Viewport(ViewportError),
    Crs(CrsError),
    Render(RenderError),
    /// Refused to replace an existing file
    FileExists(PathBuf),
    /// Failed to read standard input
    Input(io::Error),
}

impl CliError {
    /// Print the error and exit with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Crs(CrsError::Unsupported(_))
            | CliError::Project(ProjectError::UnknownCrs(_)) => {
                eprintln!();
                eprintln!("Run 'hgis crs' to list the supported reference systems.");
            }
            CliError::FileExists(_) => {
                eprintln!();
                eprintln!("Pass --force to overwrite it.");
            }
            CliError::Source(SourceError::SourceUnavailable(_)) => {
                eprintln!();
                eprintln!("Check that the path, URL or connection string is reachable,");
                eprintln!("or pass --no-bind to record the layer without checking it.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
            CliError::Project(e) => write!(f, "{}", e),
            CliError::Source(e) => write!(f, "Layer source error: {}", e),
            CliError::Layer(e) => write!(f, "{}", e),
            CliError::Viewport(e) => write!(f, "Invalid view: {}", e),
            CliError::Crs(e) => write!(f, "{}", e),
            CliError::Render(e) => write!(f, "Render failed: {}", e),
            CliError::FileExists(path) => write!(f, "'{}' already exists", path.display()),
            CliError::Input(e) => write!(f, "Failed to read input: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) | CliError::Runtime(e) | CliError::Input(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Project(e) => Some(e),
            CliError::Source(e) => Some(e),
            CliError::Layer(e) => Some(e),
            CliError::Viewport(e) => Some(e),
            CliError::Crs(e) => Some(e),
            CliError::Render(e) => Some(e),
            CliError::InvalidArgument(_) | CliError::FileExists(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ProjectError> for CliError {
    fn from(e: ProjectError) -> Self {
        CliError::Project(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        CliError::Source(e)
    }
}

impl From<LayerError> for CliError {
    fn from(e: LayerError) -> Self {
        CliError::Layer(e)
    }
}

impl From<ViewportError> for CliError {
    fn from(e: ViewportError) -> Self {
        CliError::Viewport(e)
    }
}

impl From<CrsError> for CliError {
    fn from(e: CrsError) -> Self {
        CliError::Crs(e)
    }
}

impl From<RenderError> for CliError {
    fn from(e: RenderError) -> Self {
        CliError::Render(e)
    }
}
