use crate::constants::PULL_TIMEOUT_SECS;
use crate::error::{ExportError, Result};
use crate::image::{ImageClient, RegistryAuth};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One image to pull, with the credentials of whoever references it
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub owner: String,
    pub image: String,
    pub auth: Option<RegistryAuth>,
}

/// One archive to produce from a set of pulled images
#[derive(Debug, Clone)]
pub struct ImageTarget {
    pub label: String,
    pub dest: PathBuf,
    pub sources: Vec<ImageSource>,
}

impl ImageTarget {
    /// Sources without an image reference (e.g. source-built components)
    /// are dropped here so they never reach the client.
    pub fn new(label: impl Into<String>, dest: PathBuf, sources: Vec<ImageSource>) -> Self {
        Self {
            label: label.into(),
            dest,
            sources: sources
                .into_iter()
                .filter(|s| !s.image.trim().is_empty())
                .collect(),
        }
    }

    pub fn images(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.image.clone()).collect()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeStats {
    pub images_pulled: usize,
    pub archives_saved: usize,
}

/// Pulls referenced images and saves them into the working layout
pub struct ImageMaterializer {
    client: Arc<dyn ImageClient>,
    max_parallel: usize,
    pull_timeout: Duration,
}

impl ImageMaterializer {
    pub fn new(client: Arc<dyn ImageClient>, max_parallel: usize) -> Self {
        Self {
            client,
            max_parallel: max_parallel.max(1),
            pull_timeout: Duration::from_secs(PULL_TIMEOUT_SECS),
        }
    }

    pub async fn pull(&self, source: &ImageSource) -> Result<()> {
        let start = Instant::now();
        let pull = self
            .client
            .pull(&source.image, source.auth.as_ref(), self.pull_timeout);

        match tokio::time::timeout(self.pull_timeout, pull).await {
            Ok(result) => result.map_err(ExportError::pull(&source.image))?,
            Err(_) => {
                return Err(ExportError::pull(&source.image)(format!(
                    "timed out after {}s",
                    self.pull_timeout.as_secs()
                )))
            }
        }

        tracing::info!(
            owner = %source.owner,
            image = %source.image,
            duration_ms = start.elapsed().as_millis() as u64,
            "Pulled image"
        );
        Ok(())
    }

    /// Save `images` into one archive at `dest`. An empty list is a no-op
    /// and produces no file.
    pub async fn save(&self, dest: &Path, images: &[String]) -> Result<()> {
        if images.is_empty() {
            return Ok(());
        }
        let label = images.join(",");
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(ExportError::save(&label))?;
        }
        self.client
            .save(dest, images)
            .await
            .map_err(ExportError::save(&label))?;
        if !dest.is_file() {
            return Err(ExportError::save(&label)(format!(
                "archive {} was not produced",
                dest.display()
            )));
        }
        crate::log_image_saved!(dest.display(), images.len());
        Ok(())
    }

    /// Pull every distinct image concurrently, then save each target.
    /// The first failing pull aborts the rest.
    pub async fn materialize(&self, targets: &[ImageTarget]) -> Result<MaterializeStats> {
        let mut distinct: BTreeMap<&str, &ImageSource> = BTreeMap::new();
        for source in targets.iter().flat_map(|t| t.sources.iter()) {
            distinct.entry(source.image.as_str()).or_insert(source);
        }

        let images_pulled = distinct.len();
        stream::iter(distinct.into_values().map(|source| self.pull(source)))
            .buffer_unordered(self.max_parallel)
            .try_collect::<Vec<()>>()
            .await?;

        let mut archives_saved = 0;
        for target in targets {
            let images = target.images();
            if images.is_empty() {
                tracing::debug!(target = %target.label, "No images to save");
                continue;
            }
            self.save(&target.dest, &images).await?;
            archives_saved += 1;
        }

        Ok(MaterializeStats {
            images_pulled,
            archives_saved,
        })
    }
}
