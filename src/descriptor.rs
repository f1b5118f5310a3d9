/// Application descriptor model; maps are BTreeMap so serialization is byte-stable
use crate::error::{ExportError, Result};
use crate::image::RegistryAuth;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    #[default]
    Online,
    /// Embed saved image archives so installation needs no registry
    Offline,
}

/// Registry location and credentials for one image
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageInfo {
    pub hub_url: String,
    pub namespace: String,
    pub hub_user: String,
    pub hub_password: String,
}

impl ImageInfo {
    pub fn auth(&self) -> Option<RegistryAuth> {
        if self.hub_user.is_empty() && self.hub_password.is_empty() {
            return None;
        }
        Some(RegistryAuth {
            username: self.hub_user.clone(),
            password: self.hub_password.clone(),
        })
    }
}

impl fmt::Debug for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInfo")
            .field("hub_url", &self.hub_url)
            .field("namespace", &self.namespace)
            .field("hub_user", &self.hub_user)
            .field("hub_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    pub container_port: u16,
    pub protocol: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Health-check probe. `scheme` is `http`, `tcp` or `cmd`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub scheme: String,
    pub path: String,
    pub cmd: String,
    pub port: u16,
    pub initial_delay_seconds: u32,
    pub period_seconds: u32,
    pub failure_threshold: u32,
    pub timeout_seconds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

/// Scaling hints; `step_node` is the instance count to deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingRule {
    pub min_node: u32,
    pub max_node: u32,
    pub step_node: u32,
}

impl Default for ScalingRule {
    fn default() -> Self {
        Self {
            min_node: 1,
            max_node: 1,
            step_node: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    /// Stable cluster-facing name, used in every generated path
    pub name: String,
    pub display_name: String,
    pub arch: String,
    /// Image reference; empty for components built from source
    pub image: String,
    pub image_info: ImageInfo,
    pub deploy_version: String,
    pub cmd: String,
    /// CPU in millicores
    pub cpu: u32,
    /// Memory in MB
    pub memory: u32,
    pub ports: Vec<Port>,
    pub envs: Vec<EnvVar>,
    pub probes: Vec<Probe>,
    pub volumes: Vec<VolumeMount>,
    pub scaling: ScalingRule,
    pub labels: BTreeMap<String, String>,
}

impl Default for Component {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: String::new(),
            arch: "amd64".to_string(),
            image: String::new(),
            image_info: ImageInfo::default(),
            deploy_version: String::new(),
            cmd: String::new(),
            cpu: 0,
            memory: 0,
            ports: Vec::new(),
            envs: Vec::new(),
            probes: Vec::new(),
            volumes: Vec::new(),
            scaling: ScalingRule::default(),
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plugin {
    pub name: String,
    pub image: String,
    pub image_info: ImageInfo,
}

/// Raw cluster resource manifest. The content is schemaless YAML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct K8sResource {
    pub name: String,
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationDescriptor {
    pub app_name: String,
    pub app_version: String,
    pub mode: ExportMode,
    pub components: Vec<Component>,
    pub plugins: Vec<Plugin>,
    pub k8s_resources: Vec<K8sResource>,
    pub annotations: BTreeMap<String, String>,
    /// Format-specific options, e.g. `image_handle` for Helm
    pub options: BTreeMap<String, String>,
}

impl ApplicationDescriptor {
    /// Names, versions and architectures become directory and file names,
    /// so each must be a single safe path segment. Two components may not
    /// share a name and architecture, since they would share a unit.
    pub fn validate(&self) -> Result<()> {
        check_segment("application name", &self.app_name)?;
        check_segment("application version", &self.app_version)?;

        let mut units = BTreeSet::new();
        for (i, component) in self.components.iter().enumerate() {
            if component.name.trim().is_empty() {
                return Err(ExportError::InvalidDescriptor {
                    reason: format!("component #{i} has no name"),
                });
            }
            check_segment("component name", &component.name)?;
            check_segment("component architecture", &component.arch)?;
            if !units.insert((component.name.as_str(), component.arch.as_str())) {
                return Err(ExportError::InvalidDescriptor {
                    reason: format!(
                        "duplicate component '{}' for architecture '{}'",
                        component.name, component.arch
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Copy suitable for persisting inside the package. Offline packages
    /// never carry registry locations or credentials.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if self.mode == ExportMode::Offline {
            for component in &mut copy.components {
                component.image_info = ImageInfo::default();
            }
            for plugin in &mut copy.plugins {
                plugin.image_info = ImageInfo::default();
            }
        }
        copy
    }
}

fn check_segment(field: &str, value: &str) -> Result<()> {
    let reason = if value.trim().is_empty() {
        format!("{field} is empty")
    } else if value == "." || value == ".." {
        format!("{field} '{value}' is not a valid name")
    } else if value.contains('/') || value.contains('\\') {
        format!("{field} '{value}' contains a path separator")
    } else {
        return Ok(());
    };
    Err(ExportError::InvalidDescriptor { reason })
}

/// Location of the finished artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub package_path: PathBuf,
    pub package_name: String,
    /// SHA-256 of the final bundle bytes
    pub sha256: String,
}
