/// Installer-package ("CPK") layout built from an ordered list of unit steps
use crate::archive;
use crate::constants::{CPK_ID_PREFIX, FILELIST_FILE, PLUGIN_IMAGES_ARCHIVE};
use crate::descriptor::{ApplicationDescriptor, Component};
use crate::error::{ExportError, Result};
use crate::format::{
    component_source, plugin_source, LayoutContext, LayoutReport, PackageFormat, PackageLayout,
};
use crate::image::ImageTarget;
use crate::manifest;
use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub mod schema;

pub use schema::{ImageJson, PackageJson};

/// `cpk.rbd.<component>_v<version>_<arch>`
pub fn unit_name(component: &Component, version: &str) -> String {
    format!(
        "{CPK_ID_PREFIX}.{}_v{}_{}",
        component.name, version, component.arch
    )
}

/// `cpk.rbd.<component>_<version>.tar`, saved under `files/image/`
pub fn image_archive_name(component: &Component, version: &str) -> String {
    format!("{CPK_ID_PREFIX}.{}_{}.tar", component.name, version)
}

pub fn image_archive_path(unit_dir: &Path, component: &Component, version: &str) -> PathBuf {
    unit_dir
        .join("files")
        .join("image")
        .join(image_archive_name(component, version))
}

/// Everything a step may read while writing one unit
pub struct UnitContext<'a> {
    pub descriptor: &'a ApplicationDescriptor,
    /// Component with `deploy_version` pinned to the application version
    pub component: &'a Component,
    pub unit_dir: &'a Path,
}

/// One write step applied to every unit directory
pub trait UnitStep: Send + Sync {
    fn name(&self) -> &'static str;
    fn write(&self, unit: &UnitContext<'_>) -> Result<()>;
}

/// `application.yml` stub identifying the unit
pub struct ApplicationStub;

#[derive(Serialize)]
struct ApplicationYml<'a> {
    id: String,
    name: &'a str,
    version: &'a str,
    architecture: &'a str,
}

impl UnitStep for ApplicationStub {
    fn name(&self) -> &'static str {
        "application.yml"
    }

    fn write(&self, unit: &UnitContext<'_>) -> Result<()> {
        let c = unit.component;
        let doc = ApplicationYml {
            id: format!("{CPK_ID_PREFIX}.{}", c.name),
            name: &c.name,
            version: &c.deploy_version,
            architecture: &c.arch,
        };
        let yaml = serde_yaml::to_string(&doc).map_err(ExportError::layout("render application.yml"))?;
        fs::write(unit.unit_dir.join("application.yml"), yaml)
            .map_err(ExportError::layout("write application.yml"))
    }
}

/// `files/image.json` plus the `filelist` describing everything under
/// `files/`, including a previously saved image archive.
pub struct FilesTree;

impl UnitStep for FilesTree {
    fn name(&self) -> &'static str {
        "files"
    }

    fn write(&self, unit: &UnitContext<'_>) -> Result<()> {
        let files_dir = unit.unit_dir.join("files");
        fs::create_dir_all(files_dir.join("image"))
            .map_err(ExportError::layout("create files/image"))?;

        let image_json = ImageJson::for_component(unit.component);
        let body = serde_json::to_vec(&image_json).map_err(ExportError::layout("render image.json"))?;
        fs::write(files_dir.join("image.json"), body)
            .map_err(ExportError::layout("write image.json"))?;

        let list = manifest::generate(&files_dir).map_err(ExportError::layout("generate filelist"))?;
        list.write_to(&unit.unit_dir.join(FILELIST_FILE))
            .map_err(ExportError::layout("write filelist"))?;
        tracing::debug!(
            component = %unit.component.name,
            entries = list.entries.len(),
            "Wrote filelist"
        );
        Ok(())
    }
}

/// Empty placeholder directory, e.g. `icons/`
pub struct PlaceholderDir(pub &'static str);

impl UnitStep for PlaceholderDir {
    fn name(&self) -> &'static str {
        self.0
    }

    fn write(&self, unit: &UnitContext<'_>) -> Result<()> {
        fs::create_dir_all(unit.unit_dir.join(self.0))
            .map_err(ExportError::layout(format!("create {} dir", self.0)))
    }
}

/// `package.json` mapping the component into the installer schema
pub struct PackageDescriptor;

impl UnitStep for PackageDescriptor {
    fn name(&self) -> &'static str {
        "package.json"
    }

    fn write(&self, unit: &UnitContext<'_>) -> Result<()> {
        let pkg = PackageJson::for_component(unit.component);
        let body = serde_json::to_vec(&pkg).map_err(ExportError::layout("render package.json"))?;
        fs::write(unit.unit_dir.join("package.json"), body)
            .map_err(ExportError::layout("write package.json"))
    }
}

/// `FilesTree` must run after any step that writes under `files/`
pub fn default_steps() -> Vec<Box<dyn UnitStep>> {
    vec![
        Box::new(ApplicationStub),
        Box::new(FilesTree),
        Box::new(PlaceholderDir("icons")),
        Box::new(PlaceholderDir("screenshots")),
        Box::new(PackageDescriptor),
    ]
}

pub struct CpkLayout {
    steps: Vec<Box<dyn UnitStep>>,
}

impl CpkLayout {
    pub fn new() -> Self {
        Self::with_steps(default_steps())
    }

    pub fn with_steps(steps: Vec<Box<dyn UnitStep>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    fn build_unit(&self, ctx: &LayoutContext<'_>, component: &Component) -> Result<PathBuf> {
        let version = &ctx.descriptor.app_version;
        let mut pinned = component.clone();
        pinned.deploy_version = version.clone();

        let name = unit_name(&pinned, version);
        let unit_dir = ctx.scratch_dir.join(&name);
        fs::create_dir_all(&unit_dir)
            .map_err(ExportError::layout(format!("create unit {name}")))?;

        let unit = UnitContext {
            descriptor: ctx.descriptor,
            component: &pinned,
            unit_dir: &unit_dir,
        };
        for step in &self.steps {
            step.write(&unit)?;
        }

        let dest = ctx.scratch_dir.join(format!("{name}.cpk"));
        archive::pack_unit(&unit_dir, &dest)
    }
}

impl Default for CpkLayout {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageLayout for CpkLayout {
    fn format(&self) -> PackageFormat {
        PackageFormat::Cpk
    }

    fn image_targets(&self, ctx: &LayoutContext<'_>) -> Vec<ImageTarget> {
        let version = &ctx.descriptor.app_version;
        let mut targets: Vec<ImageTarget> = ctx
            .descriptor
            .components
            .iter()
            .map(|c| {
                let unit_dir = ctx.scratch_dir.join(unit_name(c, version));
                ImageTarget::new(
                    c.name.clone(),
                    image_archive_path(&unit_dir, c, version),
                    vec![component_source(c)],
                )
            })
            .collect();

        targets.push(ImageTarget::new(
            "plugins",
            ctx.scratch_dir.join(PLUGIN_IMAGES_ARCHIVE),
            ctx.descriptor.plugins.iter().map(plugin_source).collect(),
        ));
        targets
    }

    async fn build(&self, ctx: &LayoutContext<'_>) -> Result<LayoutReport> {
        let mut report = LayoutReport::default();
        for component in &ctx.descriptor.components {
            let archive = self.build_unit(ctx, component)?;
            tracing::info!(
                component = %component.name,
                archive = %archive.display(),
                "Packed component unit"
            );
            report.units_packed += 1;
        }
        Ok(report)
    }
}
