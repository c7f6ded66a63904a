//! initramfs archives: newc cpio assembly, gzip compression and the
//! stage/verify/commit installation pipeline

pub mod builder;
pub mod extract;
pub mod writer;

pub use builder::{ArchiveBuilder, DIR_MODE, SYMLINK_MODE};
pub use extract::{unpack, unpack_file, ArchiveEntry, EntryKind};
pub use writer::{ArchiveWriter, Staged, Verified, COMPRESSION_LEVEL};
