use crate::constants::{
    DEFAULT_MAX_PARALLEL_PULLS, DEFAULT_READINESS_INTERVAL_MS, DEFAULT_READINESS_MAX_ATTEMPTS,
};
use crate::descriptor::ApplicationDescriptor;
use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Bounded polling for a file produced by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl ReadinessPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_READINESS_INTERVAL_MS,
            max_attempts: DEFAULT_READINESS_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Working directory owned by one export; cleared at start
    pub scratch_dir: PathBuf,
    /// Where finished bundles are written
    pub output_root: PathBuf,
    pub max_parallel_pulls: usize,
    #[serde(default)]
    pub readiness: ReadinessPolicy,
}

impl ExportConfig {
    pub fn new(scratch_dir: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            output_root: output_root.into(),
            max_parallel_pulls: DEFAULT_MAX_PARALLEL_PULLS,
            readiness: ReadinessPolicy::default(),
        }
    }

    /// Resolve paths from `APP_EXPORT_HOME`, `APP_EXPORT_SCRATCH` and
    /// `APP_EXPORT_MAX_PULLS`, falling back to `$HOME/.app-export`.
    pub fn from_env(descriptor: &ApplicationDescriptor) -> Result<Self> {
        let output_root = match std::env::var("APP_EXPORT_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let home = std::env::var("HOME")
                    .map_err(ExportError::preparation("resolve HOME for output root"))?;
                PathBuf::from(home).join(".app-export")
            }
        };
        let scratch_dir = match std::env::var("APP_EXPORT_SCRATCH") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => output_root.join("scratch").join(format!(
                "{}-{}",
                descriptor.app_name, descriptor.app_version
            )),
        };

        let mut config = Self::new(scratch_dir, output_root);
        if let Ok(raw) = std::env::var("APP_EXPORT_MAX_PULLS") {
            config.max_parallel_pulls = raw
                .parse()
                .map_err(ExportError::preparation("parse APP_EXPORT_MAX_PULLS"))?;
        }
        Ok(config)
    }

    pub fn with_max_parallel_pulls(mut self, n: usize) -> Self {
        self.max_parallel_pulls = n;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Reject layouts where the bundle would be written inside the tree
    /// being archived.
    pub fn validate(&self, package_name: &str) -> Result<()> {
        if self.max_parallel_pulls == 0 {
            return Err(ExportError::Preparation {
                operation: "validate config".to_string(),
                reason: "max_parallel_pulls must be at least 1".to_string(),
            });
        }
        let artifact = self.output_root.join(package_name);
        if is_within(&artifact, &self.scratch_dir) || is_within(&self.scratch_dir, &artifact) {
            return Err(ExportError::Preparation {
                operation: "validate config".to_string(),
                reason: format!(
                    "artifact {} overlaps scratch directory {}",
                    artifact.display(),
                    self.scratch_dir.display()
                ),
            });
        }
        Ok(())
    }
}

fn is_within(path: &Path, root: &Path) -> bool {
    resolve(path).starts_with(resolve(root))
}

/// Absolute, `..`-free form of `path` with symlinks resolved on the longest
/// prefix that exists. Paths that do not exist yet are compared by that
/// resolved prefix plus their remaining components.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other),
        }
    }

    let mut existing = lexical.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}
