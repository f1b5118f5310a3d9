pub mod archive;
pub mod config;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod exporter;
pub mod format;
pub mod image;
pub mod logging;
pub mod manifest;
pub mod normalize;

pub use config::{ExportConfig, ReadinessPolicy};
pub use descriptor::{ApplicationDescriptor, ExportMode, ExportResult};
pub use error::{ExportError, Result};
pub use exporter::Exporter;
pub use format::{PackageFormat, PackageLayout};
pub use image::{DockerCliClient, ImageClient, RegistryAuth};
