use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use goblin::elf::header::ELFMAG;
use goblin::elf::Elf;
use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::fs::{absolute_link_target, FileMetadata, FileType};
use crate::pathset::PathSet;

/// library directories searched for DT_NEEDED names, in priority order
pub const DEFAULT_LIB_DIRS: &[&str] = &["/usr/lib", "/lib"];

/// deepest symlink/library chain followed before giving up
pub const MAX_DEPTH: usize = 64;

/// computes the shared-library closure of executables
///
/// every visited file, including each symlink hop, is recorded in the
/// caller's `PathSet`. membership doubles as the visited guard, so cycles and
/// diamonds in the import graph are walked once.
#[derive(Debug, Clone)]
pub struct ElfResolver {
    lib_dirs: Vec<PathBuf>,
    max_depth: usize,
}

impl Default for ElfResolver {
    fn default() -> Self {
        Self::new(DEFAULT_LIB_DIRS)
    }
}

impl ElfResolver {
    pub fn new<I, P>(lib_dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            lib_dirs: lib_dirs.into_iter().map(Into::into).collect(),
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn lib_dirs(&self) -> &[PathBuf] {
        &self.lib_dirs
    }

    /// add `file` and everything it needs at runtime to `paths`
    ///
    /// a missing `file` is an error only when `required` is set. symlink
    /// targets and libraries are always required.
    pub fn resolve(&self, paths: &mut PathSet, file: &Path, required: bool) -> Result<()> {
        self.walk(paths, file, required, 0)
    }

    /// resolve each of `files` with the same `required` policy
    pub fn resolve_all<I, P>(&self, paths: &mut PathSet, files: I, required: bool) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for file in files {
            self.resolve(paths, file.as_ref(), required)?;
        }
        Ok(())
    }

    /// first library directory holding `name`
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        self.lib_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.exists())
    }

    fn walk(&self, paths: &mut PathSet, file: &Path, required: bool, depth: usize) -> Result<()> {
        if paths.contains(file) {
            return Ok(());
        }
        if depth > self.max_depth {
            return Err(Error::DependencyDepth {
                path: file.to_path_buf(),
                depth: self.max_depth,
            });
        }

        let meta = match FileMetadata::probe(file)? {
            Some(meta) => meta,
            None if required => return Err(Error::NotFound(file.to_path_buf())),
            None => {
                debug!("optional file {} not present, skipping", file.display());
                return Ok(());
            }
        };

        paths.insert(file);

        match meta.file_type {
            FileType::Symlink => {
                let target = absolute_link_target(file)?;
                debug!("{} -> {}", file.display(), target.display());
                self.walk(paths, &target, true, depth + 1)
            }
            FileType::Regular => {
                let Some(libs) = imported_libraries(file)? else {
                    return Ok(());
                };
                for lib in libs {
                    let found = self.find_library(&lib).ok_or_else(|| Error::LibraryNotFound {
                        library: lib.clone(),
                        needed_by: file.to_path_buf(),
                    })?;
                    self.walk(paths, &found, true, depth + 1)?;
                }
                Ok(())
            }
            FileType::Directory | FileType::Special => Ok(()),
        }
    }
}

/// DT_NEEDED entries of `path`, or None when it is not a parseable ELF file
pub fn imported_libraries(path: &Path) -> Result<Option<Vec<String>>> {
    let mut magic = [0u8; 4];
    {
        let mut file = File::open(path).with_path(path)?;
        match file.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).with_path(path),
        }
    }
    if &magic != ELFMAG {
        return Ok(None);
    }

    let bytes = fs::read(path).with_path(path)?;
    match Elf::parse(&bytes) {
        Ok(elf) => Ok(Some(elf.libraries.iter().map(|s| s.to_string()).collect())),
        Err(e) => {
            debug!(
                "{} has ELF magic but does not parse ({}), packing as data",
                path.display(),
                e
            );
            Ok(None)
        }
    }
}
