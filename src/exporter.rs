use crate::archive;
use crate::config::ExportConfig;
use crate::constants::METADATA_FILE;
use crate::descriptor::{ApplicationDescriptor, ExportResult};
use crate::error::{ExportError, Result};
use crate::format::{LayoutContext, PackageFormat, PackageLayout};
use crate::image::{ImageClient, ImageMaterializer};
use crate::logging::ExportStats;
use crate::{log_stage_complete, log_stage_start};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Clear `dir` and recreate it empty
pub fn prepare_scratch(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(ExportError::preparation(format!(
            "clear scratch directory {}",
            dir.display()
        )))?;
    }
    fs::create_dir_all(dir).map_err(ExportError::preparation(format!(
        "create scratch directory {}",
        dir.display()
    )))
}

/// Drives one export from descriptor to published bundle
pub struct Exporter {
    descriptor: ApplicationDescriptor,
    format: PackageFormat,
    config: ExportConfig,
    layout: Box<dyn PackageLayout>,
    materializer: ImageMaterializer,
    stats: ExportStats,
}

impl Exporter {
    pub fn new(
        descriptor: ApplicationDescriptor,
        format: PackageFormat,
        config: ExportConfig,
        client: Arc<dyn ImageClient>,
    ) -> Self {
        let layout = format.layout(&config);
        let materializer = ImageMaterializer::new(client, config.max_parallel_pulls);
        Self {
            descriptor,
            format,
            config,
            layout,
            materializer,
            stats: ExportStats::new(),
        }
    }

    /// Replace the layout built from the format, e.g. to change the Helm
    /// readiness check.
    pub fn with_layout(mut self, layout: Box<dyn PackageLayout>) -> Self {
        self.format = layout.format();
        self.layout = layout;
        self
    }

    pub fn package_name(&self) -> String {
        self.format.package_name(&self.descriptor)
    }

    pub fn stats(&self) -> &ExportStats {
        &self.stats
    }

    pub async fn export(&mut self) -> Result<ExportResult> {
        let span = tracing::info_span!(
            "export",
            app = %self.descriptor.app_name,
            version = %self.descriptor.app_version,
            format = %self.format
        );
        let start = Instant::now();
        let result = self.run().instrument(span).await;
        self.stats.duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(done) => tracing::info!(
                package = %done.package_path.display(),
                sha256 = %done.sha256,
                images_pulled = self.stats.images_pulled,
                image_archives = self.stats.image_archives,
                units_packed = self.stats.units_packed,
                templates_written = self.stats.templates_written,
                bundle_bytes = self.stats.bundle_bytes,
                duration_ms = self.stats.duration_ms,
                "Export finished"
            ),
            Err(e) => tracing::error!(stage = e.stage(), error = %e, "Export failed"),
        }
        result
    }

    async fn run(&mut self) -> Result<ExportResult> {
        self.descriptor.validate()?;
        let package_name = self.package_name();
        self.config.validate(&package_name)?;
        let app = self.descriptor.app_name.clone();
        let scratch = self.config.scratch_dir.clone();

        let stage = Instant::now();
        log_stage_start!("preparation", app);
        prepare_scratch(&scratch)?;
        log_stage_complete!("preparation", app, stage.elapsed().as_millis() as u64);

        let ctx = LayoutContext {
            descriptor: &self.descriptor,
            scratch_dir: &scratch,
        };

        if self.layout.embeds_images(&self.descriptor) {
            let stage = Instant::now();
            log_stage_start!("materialization", app);
            let materialized = self.materializer.materialize(&self.layout.image_targets(&ctx)).await?;
            self.stats.images_pulled = materialized.images_pulled;
            self.stats.image_archives = materialized.archives_saved;
            log_stage_complete!("materialization", app, stage.elapsed().as_millis() as u64);
        } else {
            tracing::debug!(mode = ?self.descriptor.mode, "Images are not embedded");
        }

        let stage = Instant::now();
        log_stage_start!("layout", app);
        let report = self.layout.build(&ctx).await?;
        self.stats.units_packed = report.units_packed;
        self.stats.templates_written = report.templates_written;
        write_metadata(&scratch, &self.descriptor)?;
        log_stage_complete!("layout", app, stage.elapsed().as_millis() as u64);

        let stage = Instant::now();
        log_stage_start!("packaging", app);
        let bundle = archive::pack_bundle(&scratch, &self.config.output_root, &package_name)?;
        self.stats.bundle_bytes = bundle.size;
        log_stage_complete!("packaging", app, stage.elapsed().as_millis() as u64);

        if let Err(e) = fs::remove_dir_all(&scratch) {
            tracing::warn!(scratch = %scratch.display(), error = %e, "Failed to remove scratch directory");
        }

        Ok(ExportResult {
            package_path: bundle.path,
            package_name,
            sha256: bundle.sha256,
        })
    }
}

/// `metadata.json` at the scratch root, with credentials stripped for
/// offline packages
pub fn write_metadata(scratch: &Path, descriptor: &ApplicationDescriptor) -> Result<()> {
    let body = serde_json::to_vec_pretty(&descriptor.redacted())
        .map_err(ExportError::layout("render metadata.json"))?;
    fs::write(scratch.join(METADATA_FILE), body).map_err(ExportError::layout("write metadata.json"))
}
