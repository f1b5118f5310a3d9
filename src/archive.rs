/// Reproducible archival of unit subtrees and whole package bundles
use crate::error::{ExportError, Result};
use bzip2::write::BzEncoder;
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBundle {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// Append `dir` to `builder` under `root_name`, directories before their
/// contents, siblings sorted by name.
pub fn append_tree<W: Write>(builder: &mut Builder<W>, dir: &Path, root_name: &str) -> io::Result<()> {
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let name = if rel.as_os_str().is_empty() {
            PathBuf::from(root_name)
        } else {
            Path::new(root_name).join(rel)
        };

        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if entry.file_type().is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder.append_data(&mut header, &name, io::empty())?;
        } else if entry.file_type().is_file() {
            let file = File::open(entry.path())?;
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(file.metadata()?.len());
            builder.append_data(&mut header, &name, file)?;
        }
    }
    Ok(())
}

/// Compress one unit directory into a standalone bzip2 tar at `dest`, then
/// delete the directory. The archive's root entry is the directory's name.
/// An existing file at `dest` is an error and is left untouched.
pub fn pack_unit(unit_dir: &Path, dest: &Path) -> Result<PathBuf> {
    let root_name = unit_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ExportError::Packaging {
            operation: "pack unit".to_string(),
            reason: format!("{} has no directory name", unit_dir.display()),
        })?;
    let op = format!("pack unit {root_name}");

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(ExportError::packaging(format!("create {}", dest.display())))?;
    let encoder = BzEncoder::new(file, bzip2::Compression::best());
    let mut builder = Builder::new(encoder);
    append_tree(&mut builder, unit_dir, &root_name).map_err(ExportError::packaging(op.as_str()))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .and_then(|file| file.sync_all())
        .map_err(ExportError::packaging(op.as_str()))?;

    fs::remove_dir_all(unit_dir).map_err(ExportError::packaging(format!(
        "remove unit directory {root_name}"
    )))?;
    tracing::debug!(unit = %root_name, archive = %dest.display(), "Packed unit");
    Ok(dest.to_path_buf())
}

/// Compress the whole scratch directory into `<output_root>/<package_name>`.
///
/// The bundle is written to a hidden partial file and renamed into place,
/// so a failed archival never leaves a truncated artifact under the output
/// root. An existing file of the same name is replaced; anything else at
/// that path is an error.
pub fn pack_bundle(scratch_dir: &Path, output_root: &Path, package_name: &str) -> Result<PackedBundle> {
    let final_path = output_root.join(package_name);
    if final_path.exists() && !final_path.is_file() {
        return Err(ExportError::Packaging {
            operation: "pack bundle".to_string(),
            reason: format!("{} exists and is not a file", final_path.display()),
        });
    }
    fs::create_dir_all(output_root).map_err(ExportError::packaging("create output root"))?;

    let partial = output_root.join(format!(".{package_name}.partial"));
    let root_name = package_stem(package_name);
    let written = write_gzip_tar(scratch_dir, &partial, root_name);
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(ExportError::packaging("pack bundle")(e));
    }

    if final_path.is_file() {
        tracing::warn!(artifact = %final_path.display(), "Replacing existing artifact");
    }
    if let Err(e) = fs::rename(&partial, &final_path) {
        let _ = fs::remove_file(&partial);
        return Err(ExportError::packaging("publish bundle")(e));
    }

    let size = fs::metadata(&final_path)
        .map_err(ExportError::packaging("stat bundle"))?
        .len();
    let sha256 = sha256_file(&final_path).map_err(ExportError::packaging("digest bundle"))?;
    Ok(PackedBundle {
        path: final_path,
        size,
        sha256,
    })
}

fn write_gzip_tar(dir: &Path, dest: &Path, root_name: &str) -> io::Result<()> {
    let file = File::create(dest)?;
    let encoder = GzBuilder::new().mtime(0).write(file, Compression::default());
    let mut builder = Builder::new(encoder);
    append_tree(&mut builder, dir, root_name)?;
    builder.into_inner()?.finish()?.sync_all()
}

/// `app-1.0-cpk.tar.gz` -> `app-1.0-cpk`
pub fn package_stem(package_name: &str) -> &str {
    package_name
        .strip_suffix(".tar.gz")
        .or_else(|| package_name.strip_suffix(".tgz"))
        .unwrap_or(package_name)
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
