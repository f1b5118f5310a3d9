/// Filelist generation: `F,<path>,<size>,<mode>,<sha1>` and `D,<path>,<size>,<mode>` lines
use crate::constants::{DIGEST_BUFFER_SIZE, FILELIST_DIR_MODE, FILELIST_FILE_MODE};
use sha1::{Digest, Sha1};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileListEntry {
    File {
        path: String,
        size: u64,
        mode: u32,
        sha1: String,
    },
    Dir {
        path: String,
        size: u64,
        mode: u32,
    },
}

impl FileListEntry {
    pub fn path(&self) -> &str {
        match self {
            Self::File { path, .. } | Self::Dir { path, .. } => path,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::File { size, .. } | Self::Dir { size, .. } => *size,
        }
    }
}

impl fmt::Display for FileListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File {
                path,
                size,
                mode,
                sha1,
            } => write!(f, "F,{},{},{:04o},{}", path, size, mode, sha1),
            Self::Dir { path, size, mode } => write!(f, "D,{},{},{:04o}", path, size, mode),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    pub entries: Vec<FileListEntry>,
}

impl FileList {
    /// One entry per line, no trailing newline
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render())
    }
}

/// Streamed SHA-1 of a file; the file is never held in memory whole.
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; DIGEST_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Entry for one persisted file. Size comes from the filesystem, so the
/// file must be fully written and closed before this is called.
pub fn file_entry(root: &Path, path: &Path) -> io::Result<FileListEntry> {
    let size = fs::metadata(path)?.len();
    Ok(FileListEntry::File {
        path: manifest_path(root, path),
        size,
        mode: FILELIST_FILE_MODE,
        sha1: sha1_file(path)?,
    })
}

/// Walk `root` and list every file and directory beneath it. At each level
/// files come first, sorted by name, then each subdirectory's contents
/// followed by the subdirectory itself. A directory's size is the total size
/// of the files it contains.
pub fn generate(root: &Path) -> io::Result<FileList> {
    let mut entries = Vec::new();
    list_dir(root, root, &mut entries)?;
    Ok(FileList { entries })
}

fn list_dir(root: &Path, dir: &Path, entries: &mut Vec<FileListEntry>) -> io::Result<()> {
    let mut subdirs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            entries.push(file_entry(root, entry.path())?);
        } else if entry.file_type().is_dir() {
            subdirs.push(entry.into_path());
        }
    }

    for subdir in subdirs {
        let first = entries.len();
        list_dir(root, &subdir, entries)?;
        let size = entries[first..]
            .iter()
            .filter_map(|e| match e {
                FileListEntry::File { size, .. } => Some(*size),
                FileListEntry::Dir { .. } => None,
            })
            .sum();
        entries.push(FileListEntry::Dir {
            path: manifest_path(root, &subdir),
            size,
            mode: FILELIST_DIR_MODE,
        });
    }
    Ok(())
}

fn manifest_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", parts.join("/"))
}
