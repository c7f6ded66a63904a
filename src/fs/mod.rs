pub mod read;
pub mod space;
pub mod workdir;
pub mod write;

pub use read::{absolute_link_target, normalize, read_symlink_target, FileMetadata, FileType};
pub use space::{ensure_space, usable_space, FixedSpace, SpaceProbe, Statvfs};
pub use workdir::WorkDir;
pub use write::{create_symlink, fsync_dir, set_mode, write_file};
