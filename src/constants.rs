// Centralized constants for the export pipeline

/// Per-image pull timeout in seconds. Fixed so that sequential exports of
/// many components stay bounded.
pub const PULL_TIMEOUT_SECS: u64 = 30;

/// Default number of image pulls allowed in flight at once
pub const DEFAULT_MAX_PARALLEL_PULLS: usize = 4;

/// Default interval between values-file readiness checks in milliseconds
pub const DEFAULT_READINESS_INTERVAL_MS: u64 = 1000;

/// Default number of values-file readiness checks before giving up
pub const DEFAULT_READINESS_MAX_ATTEMPTS: u32 = 20;

/// Buffer size for streamed digests (64 KB)
pub const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

/// Prefix shared by installer package identifiers and unit names
pub const CPK_ID_PREFIX: &str = "cpk.rbd";

/// Permissions recorded in the filelist for files
pub const FILELIST_FILE_MODE: u32 = 0o666;

/// Permissions recorded in the filelist for directories
pub const FILELIST_DIR_MODE: u32 = 0o777;

pub const METADATA_FILE: &str = "metadata.json";
pub const FILELIST_FILE: &str = "filelist";
pub const VALUES_FILE: &str = "values.yaml";
pub const CHART_FILE: &str = "Chart.yaml";
pub const COMPONENT_IMAGES_ARCHIVE: &str = "component-images.tar";
pub const PLUGIN_IMAGES_ARCHIVE: &str = "plugin-images.tar";

/// Format option that switches Helm exports to embedded images
pub const OPTION_IMAGE_HANDLE: &str = "image_handle";
pub const IMAGE_HANDLE_SAVE: &str = "image_save";

/// Format option naming who writes the base values file
pub const OPTION_VALUES_SCAFFOLD: &str = "values_scaffold";
pub const VALUES_SCAFFOLD_EXTERNAL: &str = "external";
