//! the build itself: collect files, pack both archives, install them

mod deploy;
mod hooks;
mod initfs;
mod kernel;
mod modules;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use crate::archive::ArchiveWriter;
use crate::config::Config;
use crate::deviceinfo::DeviceInfo;
use crate::error::{Error, Result};
use crate::fs::WorkDir;
use crate::resolve::ElfResolver;

pub use deploy::{boot_deploy, find_kernel};
pub use hooks::{hook_files, hook_scripts};
pub use initfs::{
    generate_initfs, generate_initfs_extra, osk_font_path, shared_objects, BuildContext,
    REQUIRED_DIRS,
};
pub use kernel::kernel_version;
pub use modules::{include_modules, REQUIRED_MODULES};

/// archive names the installer looks for
pub const INITFS_NAME: &str = "initramfs";
pub const INITFS_EXTRA_NAME: &str = "initramfs-extra";

/// options for a build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// where the installer puts boot files
    pub outdir: PathBuf,
    /// run the installer; when false the archives are written to `outdir`
    pub deploy: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from("/boot"),
            deploy: true,
        }
    }
}

/// build initramfs and initramfs-extra and install them
///
/// a device without deviceinfo is not set up yet; nothing is built.
pub fn run(config: &Config, options: &BuildOptions) -> Result<()> {
    if !config.deviceinfo.exists() {
        info!(
            "NOTE: deviceinfo ({}) not installed yet, not building the initramfs now",
            config.deviceinfo.display()
        );
        return Ok(());
    }
    let devinfo = DeviceInfo::load(&config.deviceinfo)?;

    let start = Instant::now();
    let kernel_version = kernel_version(&config.kernel_release_glob)?;
    let work = WorkDir::new("mkinitfs")?;

    info!("Generating for kernel version: {}", kernel_version);
    info!("Output directory: {}", options.outdir.display());

    let archive_dir: &Path = if options.deploy {
        work.path()
    } else {
        &options.outdir
    };
    let ctx = BuildContext {
        config,
        devinfo: &devinfo,
        kernel_version: &kernel_version,
        resolver: ElfResolver::new(&config.lib_dirs),
        writer: ArchiveWriter::new(config.archive_mode).with_tmp_root(work.path()),
    };

    generate_initfs(&ctx, &archive_dir.join(INITFS_NAME))?;
    generate_initfs_extra(&ctx, &archive_dir.join(INITFS_EXTRA_NAME))?;

    if options.deploy {
        boot_deploy(&config.installer, work.path(), &options.outdir)?;
    }

    info!("mkinitfs completed in: {:?}", start.elapsed());
    Ok(())
}

/// paths matching `pattern`, sorted; unreadable matches are errors
pub(crate) fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| {
        Error::UnsupportedFormat(format!("invalid glob pattern {:?}: {}", pattern, e))
    })?;
    paths
        .map(|entry| {
            entry.map_err(|e| Error::Io {
                path: e.path().to_path_buf(),
                source: e.into(),
            })
        })
        .collect()
}
