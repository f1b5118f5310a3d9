/// Cluster-identity normalization for raw resource manifests
use crate::error::{ExportError, Result};
use serde_yaml::{Mapping, Value};

/// Metadata fields assigned by the source cluster
pub const CLUSTER_IDENTITY_FIELDS: [&str; 4] =
    ["namespace", "resourceVersion", "uid", "creationTimestamp"];

/// A manifest stripped of cluster identity, ready to replay anywhere
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResource {
    /// Position in the descriptor's resource list
    pub index: usize,
    pub kind: String,
    pub document: Value,
}

impl NormalizedResource {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.document).map_err(|e| ExportError::Normalization {
            resource: self.index,
            reason: format!("serialize {}: {}", self.kind, e),
        })
    }
}

/// Parse one manifest and strip its cluster identity. `index` is the
/// position in the descriptor's resource list, for error reporting.
pub fn normalize_resource(index: usize, content: &str) -> Result<NormalizedResource> {
    let fail = |reason: String| ExportError::Normalization {
        resource: index,
        reason,
    };

    let mut document: Value =
        serde_yaml::from_str(content).map_err(|e| fail(format!("parse manifest: {e}")))?;

    let root = document
        .as_mapping_mut()
        .ok_or_else(|| fail("manifest is not a mapping".to_string()))?;

    let kind = match root.get("kind") {
        Some(Value::String(kind)) if !kind.trim().is_empty() => kind.clone(),
        _ => return Err(fail("manifest has no kind".to_string())),
    };
    if kind.contains('/') || kind.contains("..") {
        return Err(fail(format!("invalid kind '{kind}'")));
    }

    match root.get_mut("metadata") {
        Some(Value::Mapping(metadata)) => strip_identity(metadata),
        Some(Value::Null) | None => {}
        Some(_) => return Err(fail("metadata is not a mapping".to_string())),
    }

    Ok(NormalizedResource {
        index,
        kind,
        document,
    })
}

fn strip_identity(metadata: &mut Mapping) {
    metadata.retain(|key, _| {
        !matches!(key.as_str(), Some(field) if CLUSTER_IDENTITY_FIELDS.contains(&field))
    });
}
