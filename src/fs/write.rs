use std::fs::{self, File, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;

use crate::error::{IoResultExt, Result};

/// create a symlink, replacing whatever is at `path`
pub fn create_symlink(path: &Path, target: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path).with_path(path)?;
    }
    // mode on symlinks is always 0777, nothing to apply
    symlink(target, path).with_path(path)
}

/// stream `reader` into a new file at `path`, then apply `mode`
pub fn write_file<R: Read>(path: &Path, reader: &mut R, mode: u32) -> Result<u64> {
    let written = {
        let mut file = File::create(path).with_path(path)?;
        let n = io::copy(reader, &mut file).with_path(path)?;
        file.flush().with_path(path)?;
        n
    };
    set_mode(path, mode)?;
    Ok(written)
}

/// set permission bits on an existing path
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode & 0o7777)).with_path(path)
}

/// sync a directory to disk
pub fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)?;
    Ok(())
}
