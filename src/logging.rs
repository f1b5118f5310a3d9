use std::io;
/// Structured logging utilities for the export pipeline
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output
pub fn init_logging(json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("app_export=info"));

    let registry = Registry::default().with(env_filter);

    if json_output {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Counters accumulated over one export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub images_pulled: usize,
    pub image_archives: usize,
    pub units_packed: usize,
    pub templates_written: usize,
    pub bundle_bytes: u64,
    pub duration_ms: u64,
}

impl ExportStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[macro_export]
macro_rules! log_stage_start {
    ($stage:expr, $app:expr) => {
        tracing::info!(stage = $stage, app = %$app, "Stage started");
    };
}

#[macro_export]
macro_rules! log_stage_complete {
    ($stage:expr, $app:expr, $duration_ms:expr) => {
        tracing::info!(
            stage = $stage,
            app = %$app,
            duration_ms = $duration_ms,
            "Stage completed"
        );
    };
}

#[macro_export]
macro_rules! log_image_saved {
    ($dest:expr, $count:expr) => {
        tracing::info!(dest = %$dest, images = $count, "Saved image archive");
    };
}
