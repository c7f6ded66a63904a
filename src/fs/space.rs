use std::path::Path;

use nix::sys::statvfs::statvfs;

use crate::error::{Error, Result};

/// source of free-space figures for a destination directory
pub trait SpaceProbe {
    /// bytes available to unprivileged writers on the filesystem holding `dir`
    fn available(&self, dir: &Path) -> Result<u64>;
}

/// queries the kernel with statvfs(2)
#[derive(Debug, Clone, Copy, Default)]
pub struct Statvfs;

impl SpaceProbe for Statvfs {
    fn available(&self, dir: &Path) -> Result<u64> {
        let stat = statvfs(dir).map_err(|e| Error::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::from(e),
        })?;
        #[allow(clippy::unnecessary_cast)]
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }
}

/// reports a fixed amount of free space, whatever the directory
#[derive(Debug, Clone, Copy)]
pub struct FixedSpace(pub u64);

impl SpaceProbe for FixedSpace {
    fn available(&self, _dir: &Path) -> Result<u64> {
        Ok(self.0)
    }
}

/// share of available space withheld from any single write, in percent
pub const RESERVED_PERCENT: u64 = 10;

/// bytes a write may use once the reserve is held back
pub fn usable_space(available: u64) -> u64 {
    let reserved = (available as u128 * RESERVED_PERCENT as u128 / 100) as u64;
    available - reserved
}

/// fail with InsufficientSpace unless `needed` fits in what `dir` may use
pub fn ensure_space(probe: &dyn SpaceProbe, dir: &Path, needed: u64) -> Result<()> {
    let usable = usable_space(probe.available(dir)?);
    if needed > usable {
        return Err(Error::InsufficientSpace {
            dir: dir.to_path_buf(),
            needed,
            usable,
        });
    }
    Ok(())
}
