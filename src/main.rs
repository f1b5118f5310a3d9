use anyhow::{Context, Result};
use app_export::descriptor::{ApplicationDescriptor, ExportMode};
use app_export::image::DockerCliClient;
use app_export::logging::init_logging;
use app_export::{ExportConfig, Exporter, PackageFormat};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "app-export", version, about = "Export an application descriptor into a distributable package")]
struct Cli {
    /// Path to the application descriptor (JSON)
    #[arg(short, long)]
    descriptor: PathBuf,

    /// Package format: cpk or helm
    #[arg(short, long)]
    format: PackageFormat,

    /// Directory receiving the finished bundle
    #[arg(short, long, env = "APP_EXPORT_HOME")]
    output: Option<PathBuf>,

    /// Working directory, cleared before use
    #[arg(long, env = "APP_EXPORT_SCRATCH")]
    scratch: Option<PathBuf>,

    /// Override the descriptor's export mode
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ExportMode>,

    /// Maximum concurrent image pulls
    #[arg(long, env = "APP_EXPORT_MAX_PULLS")]
    max_pulls: Option<usize>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_mode(s: &str) -> std::result::Result<ExportMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "online" => Ok(ExportMode::Online),
        "offline" => Ok(ExportMode::Offline),
        other => Err(format!("unknown export mode '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs).map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let raw = fs::read_to_string(&cli.descriptor)
        .with_context(|| format!("reading descriptor {}", cli.descriptor.display()))?;
    let mut descriptor: ApplicationDescriptor =
        serde_json::from_str(&raw).context("parsing descriptor")?;
    if let Some(mode) = cli.mode {
        descriptor.mode = mode;
    }

    let mut config = ExportConfig::from_env(&descriptor)?;
    if let Some(output) = cli.output {
        config.output_root = output;
    }
    if let Some(scratch) = cli.scratch {
        config.scratch_dir = scratch;
    }
    if let Some(n) = cli.max_pulls {
        config.max_parallel_pulls = n;
    }

    let mut exporter = Exporter::new(descriptor, cli.format, config, Arc::new(DockerCliClient::new()));
    let result = exporter.export().await?;

    println!("{}", result.package_path.display());
    println!("sha256: {}", result.sha256);
    Ok(())
}
