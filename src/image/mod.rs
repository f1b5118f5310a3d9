use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub mod docker;
pub mod materializer;

pub use docker::DockerCliClient;
pub use materializer::{ImageMaterializer, ImageSource, ImageTarget};

#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Pull/save primitives of a container image store. Implementations are
/// trusted to be correct; the export pipeline only orchestrates them.
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn pull(&self, image: &str, auth: Option<&RegistryAuth>, timeout: Duration) -> Result<()>;
    /// Save the given local images into a single archive at `dest`
    async fn save(&self, dest: &Path, images: &[String]) -> Result<()>;
}
