use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use cpio::newc::{Builder as NewcBuilder, ModeFileType};
use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::fs::{absolute_link_target, normalize, read_symlink_target, FileMetadata, FileType};
use crate::pathset::PathSet;
use crate::resolve::elf::MAX_DEPTH;

/// mode for directories the builder creates on its own
pub const DIR_MODE: u32 = 0o755;

/// permission bits recorded for symlink entries
pub const SYMLINK_MODE: u32 = 0o777;

/// assembles a newc cpio stream from host files
///
/// `dirs` and `files` accumulate absolute host paths; nothing is read from
/// disk until `add_file` or `finalize`. every emitted entry's parent
/// directory precedes it in the stream and no name appears twice, because the
/// kernel's unpacker neither creates missing directories nor tolerates
/// clashes.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    dirs: PathSet,
    files: PathSet,
    names: HashSet<String>,
    buf: Vec<u8>,
    next_ino: u32,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// directories to create even if no file lives in them
    pub fn dirs_mut(&mut self) -> &mut PathSet {
        &mut self.dirs
    }

    /// files packed at their own path on finalize
    pub fn files_mut(&mut self) -> &mut PathSet {
        &mut self.files
    }

    /// emit `dir` and every missing ancestor, outermost first
    pub fn add_dir(&mut self, dir: &Path) -> Result<()> {
        let dir = absolute(dir);
        let mut current = PathBuf::from("/");
        for component in dir.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            current.push(part);
            if self.dirs.is_materialized(&current) {
                continue;
            }
            self.emit_dir(&current)?;
            self.dirs.mark_materialized(current.clone());
        }
        Ok(())
    }

    /// pack host file `src` at archive path `dest`
    ///
    /// symlinks are stored as links and their target is packed at its own
    /// path as well. a source that was already packed is skipped.
    pub fn add_file(&mut self, src: &Path, dest: &Path) -> Result<()> {
        self.add_file_at(src, dest, 0)
    }

    fn add_file_at(&mut self, src: &Path, dest: &Path, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::DependencyDepth {
                path: src.to_path_buf(),
                depth: MAX_DEPTH,
            });
        }

        // a host path below a symlinked directory is packed where the link points
        let dest = if src == dest {
            self.resolve_ancestors(src, depth)?
        } else {
            absolute(dest)
        };
        if let Some(parent) = dest.parent() {
            self.add_dir(parent)?;
        }

        if self.files.is_materialized(src) {
            return Ok(());
        }

        let meta = FileMetadata::from_path(src)?;
        match meta.file_type {
            FileType::Symlink => {
                let target = read_symlink_target(src)?;
                self.emit_symlink(&dest, &target)?;
                self.files.mark_materialized(src);

                let resolved = absolute_link_target(src)?;
                debug!("symlink {} -> {}", src.display(), resolved.display());
                self.add_file_at(&resolved, &resolved, depth + 1)
            }
            FileType::Directory => {
                self.files.mark_materialized(src);
                self.add_dir(&dest)
            }
            FileType::Regular => {
                self.emit_file(src, &dest, &meta)?;
                self.files.mark_materialized(src);
                Ok(())
            }
            FileType::Special => Err(Error::UnsupportedFormat(format!(
                "cannot pack special file {}",
                src.display()
            ))),
        }
    }

    /// `path` with each symlinked ancestor replaced by the link's target
    ///
    /// every link passed through is packed as well, so the original name
    /// still resolves at boot. an ancestor already emitted as a directory is
    /// kept as one.
    fn resolve_ancestors(&mut self, path: &Path, depth: usize) -> Result<PathBuf> {
        let path = absolute(path);
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Ok(path);
        };

        let mut resolved = PathBuf::from("/");
        for component in parent.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            resolved.push(part);
            let mut hops = depth;
            while !self.dirs.is_materialized(&resolved) && is_symlink(&resolved)? {
                hops += 1;
                if hops > MAX_DEPTH {
                    return Err(Error::DependencyDepth {
                        path: path.clone(),
                        depth: MAX_DEPTH,
                    });
                }
                self.add_file_at(&resolved, &resolved, hops)?;
                let target = absolute_link_target(&resolved)?;
                resolved = self.resolve_ancestors(&target, hops)?;
            }
        }
        resolved.push(name);
        Ok(resolved)
    }

    /// write every pending directory and file, then the trailer
    pub fn finalize(mut self) -> Result<Vec<u8>> {
        for dir in self.dirs.pending() {
            self.add_dir(&dir)?;
        }
        for file in self.files.pending() {
            // symlink targets packed earlier in this loop are already done
            if !self.files.is_materialized(&file) {
                self.add_file(&file, &file)?;
            }
        }

        debug!("archive has {} entries", self.names.len());
        cpio::newc::trailer(&mut self.buf).with_path("TRAILER!!!")?;
        Ok(self.buf)
    }

    /// reserve an archive name, false if already taken
    fn claim(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    fn next_ino(&mut self) -> u32 {
        self.next_ino += 1;
        self.next_ino
    }

    fn emit_dir(&mut self, path: &Path) -> Result<()> {
        let name = entry_name(path)?;
        // add_dir skips emitted directories, so a taken name is a file or link
        if !self.claim(&name) {
            return Err(Error::UnsupportedFormat(format!(
                "{} is already in the archive as a non-directory",
                name
            )));
        }
        let ino = self.next_ino();
        NewcBuilder::new(&name)
            .ino(ino)
            .mode(DIR_MODE)
            .set_mode_file_type(ModeFileType::Directory)
            .nlink(2)
            .write(&mut self.buf, 0)
            .finish()
            .with_path(path)?;
        Ok(())
    }

    fn emit_symlink(&mut self, dest: &Path, target: &Path) -> Result<()> {
        let name = entry_name(dest)?;
        if !self.claim(&name) {
            debug!("{} already in archive, skipping symlink", name);
            return Ok(());
        }
        let payload = target.as_os_str().as_bytes();
        let size = u32::try_from(payload.len()).map_err(|_| Error::EntryTooLarge(dest.into()))?;
        let ino = self.next_ino();
        let mut writer = NewcBuilder::new(&name)
            .ino(ino)
            .mode(SYMLINK_MODE)
            .set_mode_file_type(ModeFileType::Symlink)
            .write(&mut self.buf, size);
        writer.write_all(payload).with_path(dest)?;
        writer.finish().with_path(dest)?;
        Ok(())
    }

    fn emit_file(&mut self, src: &Path, dest: &Path, meta: &FileMetadata) -> Result<()> {
        let name = entry_name(dest)?;
        if !self.claim(&name) {
            debug!("{} already in archive, skipping {}", name, src.display());
            return Ok(());
        }
        let size = u32::try_from(meta.size).map_err(|_| Error::EntryTooLarge(src.into()))?;
        let file = File::open(src).with_path(src)?;
        let ino = self.next_ino();
        let mut writer = NewcBuilder::new(&name)
            .ino(ino)
            .mode(meta.permissions())
            .set_mode_file_type(ModeFileType::Regular)
            .write(&mut self.buf, size);

        let copied = io::copy(&mut file.take(u64::from(size)), &mut writer).with_path(src)?;
        if copied != u64::from(size) {
            return Err(Error::Io {
                path: src.to_path_buf(),
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while packing"),
            });
        }
        writer.finish().with_path(src)?;
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    normalize(&Path::new("/").join(path))
}

fn is_symlink(path: &Path) -> Result<bool> {
    let meta = FileMetadata::probe(path)?;
    Ok(meta.is_some_and(|m| m.file_type == FileType::Symlink))
}

/// archive-root-relative name: `/usr/lib` -> `usr/lib`
fn entry_name(path: &Path) -> Result<String> {
    let path = absolute(path);
    let rel = path.strip_prefix("/").unwrap_or(&path);
    rel.to_str().map(str::to_string).ok_or_else(|| {
        Error::UnsupportedFormat(format!("path is not valid UTF-8: {}", path.display()))
    })
}
