use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::deviceinfo::DeviceInfo;
use crate::error::{IoResultExt, Result};
use crate::ops::glob_paths;
use crate::pathset::PathSet;
use crate::resolve::{modules_in_dir, ModuleDb};

/// modules every initramfs carries
///
/// a bare name is looked up in modules.dep. an entry ending in `/` is a
/// directory glob below the module tree whose module files are all taken.
pub const REQUIRED_MODULES: &[&str] = &[
    "loop",
    "dm-crypt",
    "kernel/fs/overlayfs/",
    "kernel/crypto/",
    "kernel/arch/*/crypto/",
];

#[derive(Debug, PartialEq, Eq)]
enum ModuleEntry<'a> {
    Name(&'a str),
    Dir(&'a str),
    Unknown,
}

fn classify(entry: &str) -> ModuleEntry<'_> {
    match entry.rsplit_once('/') {
        None => ModuleEntry::Name(entry),
        Some((dir, "")) => ModuleEntry::Dir(dir),
        Some(_) => ModuleEntry::Unknown,
    }
}

/// add the kernel modules for `kernel_version` to `files`
///
/// a kernel without a module tree is fine; nothing is added. otherwise the
/// modules.* index files, `REQUIRED_MODULES`, the deviceinfo list and every
/// configured *.modules list are included with their dependencies.
pub fn include_modules(
    files: &mut PathSet,
    config: &Config,
    devinfo: &DeviceInfo,
    kernel_version: &str,
) -> Result<()> {
    let mod_dir = config.module_root.join(kernel_version);
    if !mod_dir.exists() {
        info!(
            "-- kernel module directory not found: {}, not including modules",
            mod_dir.display()
        );
        return Ok(());
    }

    // index files modprobe needs
    let pattern = format!("{}/modules.*", mod_dir.display());
    files.extend(glob_paths(&pattern)?);

    let db = ModuleDb::open(&mod_dir)?;

    for entry in REQUIRED_MODULES {
        include_entry(files, &db, entry)?;
    }

    for name in devinfo.initfs_modules() {
        db.resolve(files, name)?;
    }

    for list in glob_paths(&config.module_lists_glob)? {
        include_list(files, &db, &list)?;
    }
    Ok(())
}

fn include_entry(files: &mut PathSet, db: &ModuleDb, entry: &str) -> Result<()> {
    match classify(entry) {
        ModuleEntry::Name(name) => {
            db.resolve(files, name)?;
        }
        ModuleEntry::Dir(dir) => {
            let pattern = format!("{}/{}", db.dir().display(), dir);
            for dir in glob_paths(&pattern)? {
                modules_in_dir(files, &dir)?;
            }
        }
        ModuleEntry::Unknown => warn!("unknown module entry: {:?}", entry),
    }
    Ok(())
}

/// one module name per line; blank lines and `#` comments are skipped
fn include_list(files: &mut PathSet, db: &ModuleDb, list: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(list).with_path(list)?);
    for line in reader.lines() {
        let line = line.with_path(list)?;
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        db.resolve(files, name)?;
    }
    Ok(())
}
