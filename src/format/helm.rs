/// Helm chart layout: Chart.yaml, values.yaml and one template file per kind
use crate::config::ReadinessPolicy;
use crate::constants::{
    CHART_FILE, COMPONENT_IMAGES_ARCHIVE, IMAGE_HANDLE_SAVE, OPTION_IMAGE_HANDLE,
    OPTION_VALUES_SCAFFOLD, PLUGIN_IMAGES_ARCHIVE, VALUES_FILE, VALUES_SCAFFOLD_EXTERNAL,
};
use crate::descriptor::{ApplicationDescriptor, ExportMode};
use crate::error::{ExportError, Result};
use crate::format::{
    component_source, plugin_source, LayoutContext, LayoutReport, PackageFormat, PackageLayout,
};
use crate::image::ImageTarget;
use crate::normalize::{normalize_resource, NormalizedResource};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Decides whether a file produced outside the pipeline is ready
pub trait ReadinessCheck: Send + Sync {
    fn is_ready(&self, path: &Path) -> bool;
}

/// Ready once the file exists
pub struct FileExists;

impl ReadinessCheck for FileExists {
    fn is_ready(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Poll `check` until it reports ready, at most `policy.max_attempts`
/// times. Returns the attempt on which the file became ready.
pub async fn wait_until_ready(
    check: &dyn ReadinessCheck,
    path: &Path,
    policy: ReadinessPolicy,
) -> Result<u32> {
    let start = Instant::now();
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if check.is_ready(path) {
            return Ok(attempt);
        }
        if attempt < attempts {
            tokio::time::sleep(policy.interval()).await;
        }
    }
    Err(ExportError::Timeout {
        operation: format!("wait for {}", path.display()),
        attempts,
        waited_ms: start.elapsed().as_millis() as u64,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartYaml {
    pub api_version: String,
    pub app_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

impl ChartYaml {
    pub fn for_descriptor(descriptor: &ApplicationDescriptor) -> Self {
        Self {
            api_version: "v2".to_string(),
            app_version: descriptor.app_version.clone(),
            description: descriptor
                .annotations
                .get("version_info")
                .cloned()
                .unwrap_or_default(),
            name: descriptor.app_name.clone(),
            kind: "application".to_string(),
            version: descriptor.app_version.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BaseValues {
    app_name: String,
    app_version: String,
    images: BTreeMap<String, String>,
}

/// Append one YAML document to `path`, separating it from any document
/// already there with `---`.
pub fn append_document(path: &Path, yaml: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() > 0 {
        file.write_all(b"---\n")?;
    }
    file.write_all(yaml.as_bytes())?;
    if !yaml.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

pub struct HelmLayout {
    readiness: Arc<dyn ReadinessCheck>,
    policy: ReadinessPolicy,
}

impl HelmLayout {
    pub fn new(readiness: Arc<dyn ReadinessCheck>, policy: ReadinessPolicy) -> Self {
        Self { readiness, policy }
    }

    fn scaffolds_values(descriptor: &ApplicationDescriptor) -> bool {
        descriptor.option(OPTION_VALUES_SCAFFOLD) != Some(VALUES_SCAFFOLD_EXTERNAL)
    }

    fn write_chart(&self, chart_dir: &Path, descriptor: &ApplicationDescriptor) -> Result<()> {
        let chart = ChartYaml::for_descriptor(descriptor);
        let yaml = serde_yaml::to_string(&chart).map_err(ExportError::layout("render Chart.yaml"))?;
        fs::write(chart_dir.join(CHART_FILE), yaml).map_err(ExportError::layout("write Chart.yaml"))
    }

    fn write_base_values(&self, path: &Path, descriptor: &ApplicationDescriptor) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        let values = BaseValues {
            app_name: descriptor.app_name.clone(),
            app_version: descriptor.app_version.clone(),
            images: descriptor
                .components
                .iter()
                .filter(|c| !c.image.is_empty())
                .map(|c| (c.name.clone(), c.image.clone()))
                .collect(),
        };
        let yaml = serde_yaml::to_string(&values).map_err(ExportError::layout("render values.yaml"))?;
        fs::write(path, yaml).map_err(ExportError::layout("write values.yaml"))
    }

    fn write_templates(&self, chart_dir: &Path, resources: &[NormalizedResource]) -> Result<usize> {
        let templates = chart_dir.join("templates");
        fs::create_dir_all(&templates).map_err(ExportError::layout("create templates dir"))?;

        let mut files = BTreeMap::new();
        for resource in resources {
            let yaml = resource.to_yaml()?;
            let file = format!("{}.yaml", resource.kind);
            append_document(&templates.join(&file), &yaml)
                .map_err(ExportError::layout(format!("append templates/{file}")))?;
            *files.entry(file).or_insert(0usize) += 1;
        }
        for (file, documents) in &files {
            tracing::debug!(template = %file, documents, "Wrote template");
        }
        Ok(files.len())
    }
}

#[async_trait]
impl PackageLayout for HelmLayout {
    fn format(&self) -> PackageFormat {
        PackageFormat::Helm
    }

    fn embeds_images(&self, descriptor: &ApplicationDescriptor) -> bool {
        descriptor.mode == ExportMode::Offline
            || descriptor.option(OPTION_IMAGE_HANDLE) == Some(IMAGE_HANDLE_SAVE)
    }

    fn image_targets(&self, ctx: &LayoutContext<'_>) -> Vec<ImageTarget> {
        vec![
            ImageTarget::new(
                "components",
                ctx.scratch_dir.join(COMPONENT_IMAGES_ARCHIVE),
                ctx.descriptor.components.iter().map(component_source).collect(),
            ),
            ImageTarget::new(
                "plugins",
                ctx.scratch_dir.join(PLUGIN_IMAGES_ARCHIVE),
                ctx.descriptor.plugins.iter().map(plugin_source).collect(),
            ),
        ]
    }

    async fn build(&self, ctx: &LayoutContext<'_>) -> Result<LayoutReport> {
        let descriptor = ctx.descriptor;

        // Normalize everything up front so a bad manifest never leaves a
        // half-written chart behind.
        let resources = descriptor
            .k8s_resources
            .iter()
            .enumerate()
            .map(|(i, r)| normalize_resource(i, &r.content))
            .collect::<Result<Vec<_>>>()?;

        let chart_dir = ctx.scratch_dir.join(&descriptor.app_name);
        fs::create_dir_all(&chart_dir).map_err(ExportError::layout("create chart dir"))?;
        self.write_chart(&chart_dir, descriptor)?;

        let values = chart_dir.join(VALUES_FILE);
        if Self::scaffolds_values(descriptor) {
            self.write_base_values(&values, descriptor)?;
        }
        let attempt = wait_until_ready(self.readiness.as_ref(), &values, self.policy).await?;
        tracing::debug!(attempt, "values.yaml ready");

        let templates_written = self.write_templates(&chart_dir, &resources)?;
        Ok(LayoutReport {
            units_packed: 0,
            templates_written,
        })
    }
}
