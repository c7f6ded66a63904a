use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::ffi::OsStringExt;
use std::path::{Component, Path, PathBuf};

use cpio::NewcReader;
use flate2::read::GzDecoder;

use crate::error::{Error, IoResultExt, Result};
use crate::fs::{create_symlink, set_mode, write_file};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

/// kind of an unpacked entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// raw link payload, not necessarily UTF-8
    Symlink { target: PathBuf },
}

/// header of an unpacked entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub kind: EntryKind,
    /// permission bits only
    pub mode: u32,
    pub size: u64,
}

/// unpack a gzip-compressed cpio archive into `dest`
pub fn unpack_file(archive: &Path, dest: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(archive).with_path(archive)?;
    unpack(GzDecoder::new(file), dest, archive)
}

/// unpack an uncompressed cpio stream into `dest`, which must exist
///
/// entries are created exactly as the boot-time unpacker would: parents are
/// never created implicitly, a parent must be a directory entry rather than a
/// symlink and a name may only appear once, so a
/// structurally broken archive fails here. the stream is read to its end so
/// corruption after the trailer is caught too. `source` names the archive in
/// errors.
pub fn unpack<R: Read>(reader: R, dest: &Path, source: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut reader = reader;
    let mut entries = Vec::new();

    loop {
        let mut entry_reader = NewcReader::new(reader).with_path(source)?;
        if entry_reader.entry().is_trailer() {
            reader = entry_reader.finish().with_path(source)?;
            break;
        }

        let name = entry_reader.entry().name().to_string();
        let mode = entry_reader.entry().mode();
        let size = u64::from(entry_reader.entry().file_size());
        let path = dest.join(safe_relative(&name)?);
        // never create through a link, it may point outside `dest`
        let parent = path.parent().unwrap_or(dest);
        if !fs::symlink_metadata(parent).with_path(parent)?.is_dir() {
            return Err(Error::UnsupportedFormat(format!(
                "entry {} is not below a directory",
                name
            )));
        }
        if path.symlink_metadata().is_ok() {
            return Err(Error::UnsupportedFormat(format!("duplicate entry {}", name)));
        }

        let kind = match mode & S_IFMT {
            S_IFDIR => {
                fs::create_dir(&path).with_path(&path)?;
                set_mode(&path, mode)?;
                EntryKind::Directory
            }
            S_IFLNK => {
                let mut payload = Vec::new();
                entry_reader.read_to_end(&mut payload).with_path(&path)?;
                let target = PathBuf::from(OsString::from_vec(payload));
                create_symlink(&path, &target)?;
                EntryKind::Symlink { target }
            }
            S_IFREG => {
                let written = write_file(&path, &mut entry_reader, mode)?;
                if written != size {
                    return Err(Error::UnsupportedFormat(format!(
                        "entry {} truncated at {} of {} bytes",
                        name, written, size
                    )));
                }
                EntryKind::File
            }
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "entry {} has unsupported type {:o}",
                    name, other
                )))
            }
        };

        entries.push(ArchiveEntry {
            name,
            kind,
            mode: mode & 0o7777,
            size,
        });
        reader = entry_reader.finish().with_path(source)?;
    }

    // drain so the decoder checks the gzip trailer crc
    io::copy(&mut reader, &mut io::sink()).with_path(source)?;
    Ok(entries)
}

/// entry name as a path that cannot leave the extraction root
fn safe_relative(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::UnsupportedFormat(format!(
                    "unsafe entry name {:?}",
                    name
                )))
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(Error::UnsupportedFormat(format!("empty entry name {:?}", name)));
    }
    Ok(out)
}
