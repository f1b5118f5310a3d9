use crate::config::ExportConfig;
use crate::descriptor::{ApplicationDescriptor, Component, ExportMode, Plugin};
use crate::error::Result;
use crate::image::{ImageSource, ImageTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub mod cpk;
pub mod helm;

pub use cpk::CpkLayout;
pub use helm::{FileExists, HelmLayout, ReadinessCheck};

/// Target package format. New formats are added here as variants, each
/// with its own `PackageLayout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// Installer package with one compressed unit per component
    Cpk,
    /// Helm chart bundle
    Helm,
}

impl PackageFormat {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Cpk => "cpk",
            Self::Helm => "helm",
        }
    }

    /// `<app>-<version>-<suffix>.tar.gz`
    pub fn package_name(&self, descriptor: &ApplicationDescriptor) -> String {
        format!(
            "{}-{}-{}.tar.gz",
            descriptor.app_name,
            descriptor.app_version,
            self.suffix()
        )
    }

    pub fn layout(&self, config: &ExportConfig) -> Box<dyn PackageLayout> {
        match self {
            Self::Cpk => Box::new(CpkLayout::new()),
            Self::Helm => Box::new(HelmLayout::new(Arc::new(FileExists), config.readiness)),
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for PackageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpk" => Ok(Self::Cpk),
            "helm" | "helm-chart" => Ok(Self::Helm),
            other => Err(format!("unknown package format '{other}'")),
        }
    }
}

/// Inputs shared by every layout step of one export
#[derive(Debug, Clone, Copy)]
pub struct LayoutContext<'a> {
    pub descriptor: &'a ApplicationDescriptor,
    pub scratch_dir: &'a Path,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutReport {
    pub units_packed: usize,
    pub templates_written: usize,
}

/// Builds one format's directory tree inside the scratch directory
#[async_trait]
pub trait PackageLayout: Send + Sync {
    fn format(&self) -> PackageFormat;

    /// Whether this export embeds saved image archives
    fn embeds_images(&self, descriptor: &ApplicationDescriptor) -> bool {
        descriptor.mode == ExportMode::Offline
    }

    /// Image archives that must exist before `build` runs
    fn image_targets(&self, ctx: &LayoutContext<'_>) -> Vec<ImageTarget>;

    async fn build(&self, ctx: &LayoutContext<'_>) -> Result<LayoutReport>;
}

pub(crate) fn component_source(component: &Component) -> ImageSource {
    ImageSource {
        owner: component.name.clone(),
        image: component.image.clone(),
        auth: component.image_info.auth(),
    }
}

pub(crate) fn plugin_source(plugin: &Plugin) -> ImageSource {
    ImageSource {
        owner: plugin.name.clone(),
        image: plugin.image.clone(),
        auth: plugin.image_info.auth(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_names() {
        let d = ApplicationDescriptor {
            app_name: "shop".to_string(),
            app_version: "2.1".to_string(),
            ..Default::default()
        };
        assert_eq!(PackageFormat::Cpk.package_name(&d), "shop-2.1-cpk.tar.gz");
        assert_eq!(PackageFormat::Helm.package_name(&d), "shop-2.1-helm.tar.gz");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("CPK".parse::<PackageFormat>(), Ok(PackageFormat::Cpk));
        assert_eq!("helm".parse::<PackageFormat>(), Ok(PackageFormat::Helm));
        assert!("zip".parse::<PackageFormat>().is_err());
    }
}
