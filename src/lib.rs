//! mkinitfs - minimal initramfs generator
//!
//! computes the smallest complete set of files a device needs for early boot
//! and packs them into a compressed archive that is installed crash-safely.
//!
//! # Core concepts
//!
//! - **PathSet**: deduplicated host paths with a per-path "already packed" flag
//! - **Closure**: everything reachable from a root file through shared library
//!   imports, symlink targets or module dependencies
//! - **Archive**: a newc cpio stream where every parent directory precedes
//!   its children and no name appears twice, compressed with gzip
//! - **Commit**: stage, check free space, test-extract, copy next to the
//!   target, compare checksums, rename
//!
//! # Example usage
//!
//! ```no_run
//! use mkinitfs::{ArchiveBuilder, ArchiveWriter, ElfResolver, PathSet};
//! use std::path::Path;
//!
//! let mut files = PathSet::new();
//! ElfResolver::default()
//!     .resolve(&mut files, Path::new("/bin/busybox"), true)
//!     .unwrap();
//!
//! let mut archive = ArchiveBuilder::new();
//! archive.files_mut().extend(files.iter());
//! let cpio = archive.finalize().unwrap();
//!
//! ArchiveWriter::new(0o644)
//!     .write(&cpio, Path::new("/boot/initramfs"))
//!     .unwrap();
//! ```

mod config;
mod deviceinfo;
mod error;
mod hash;
mod pathset;

pub mod archive;
pub mod fs;
pub mod ops;
pub mod resolve;

#[cfg(test)]
mod testutil;

pub use archive::{ArchiveBuilder, ArchiveWriter, EntryKind};
pub use config::{Config, FdeConfig, DEFAULT_CONFIG_PATH};
pub use deviceinfo::DeviceInfo;
pub use error::{Error, IoResultExt, Result};
pub use hash::Checksum;
pub use pathset::PathSet;
pub use resolve::{ElfResolver, ModuleDb};
