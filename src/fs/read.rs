use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// file type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    /// devices, fifos and sockets; never packed from the host
    Special,
}

impl FileType {
    /// detect file type from metadata
    pub fn from_metadata(meta: &Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_dir() {
            FileType::Directory
        } else if ft.is_file() {
            FileType::Regular
        } else {
            FileType::Special
        }
    }
}

/// metadata for a filesystem entry
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file_type: FileType,
    pub mode: u32,
    pub size: u64,
}

impl FileMetadata {
    /// read metadata from path (does not follow symlinks)
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path).with_path(path)?;
        Ok(Self::from_std_metadata(&meta))
    }

    /// like `from_path`, but an absent path yields None instead of an error
    pub fn probe(path: &Path) -> Result<Option<Self>> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some(Self::from_std_metadata(&meta))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_path(path),
        }
    }

    /// create from std::fs::Metadata
    pub fn from_std_metadata(meta: &Metadata) -> Self {
        Self {
            file_type: FileType::from_metadata(meta),
            mode: meta.mode(),
            size: meta.len(),
        }
    }

    /// permission bits only (including setuid/setgid/sticky)
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// read symlink target exactly as stored, bytes untouched
pub fn read_symlink_target(path: &Path) -> Result<PathBuf> {
    fs::read_link(path).with_path(path)
}

/// resolve the target of a symlink to an absolute path
///
/// relative targets are joined onto the link's own directory and normalized
/// lexically; the process working directory is never consulted.
pub fn absolute_link_target(link: &Path) -> Result<PathBuf> {
    let target = fs::read_link(link).with_path(link)?;
    let joined = if target.is_absolute() {
        target
    } else {
        let base = link.parent().unwrap_or_else(|| Path::new("/"));
        base.join(target)
    };
    Ok(normalize(&joined))
}

/// lexically clean a path: drop `.`, fold `..` into the parent
///
/// `..` at the root stays at the root, matching how the kernel walks paths.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !path.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => out.push(name),
            Component::Prefix(_) => {}
        }
    }
    out
}
