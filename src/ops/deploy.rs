use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::error::{Error, IoResultExt, Result};
use crate::ops::glob_paths;

/// suffixes the installer appends to kernels it already processed
const DERIVED_KERNEL_SUFFIXES: &[&str] = &["-dtb", "-mtk"];

/// first `vmlinuz*` in `outdir` that the installer did not derive itself
pub fn find_kernel(outdir: &Path) -> Result<PathBuf> {
    let pattern = format!("{}/vmlinuz*", outdir.display());
    let kernels = glob_paths(&pattern)?;
    kernels
        .into_iter()
        .find(|k| {
            let name = k.to_string_lossy();
            !DERIVED_KERNEL_SUFFIXES.iter().any(|s| name.ends_with(s))
        })
        .ok_or_else(|| Error::Installer(format!("unable to find any kernels at {}", pattern)))
}

/// hand the archives in `work_dir` to the boot installer
///
/// the installer expects the kernel next to the initramfs, so it is copied
/// into `work_dir` as `vmlinuz` first.
pub fn boot_deploy(installer: &str, work_dir: &Path, outdir: &Path) -> Result<()> {
    info!("== Using {} to finalize/install files ==", installer);
    let kernel = find_kernel(outdir)?;
    let copy = work_dir.join("vmlinuz");
    fs::copy(&kernel, &copy).with_path(&kernel)?;

    let status = Command::new(installer)
        .arg("-i")
        .arg("initramfs")
        .arg("-k")
        .arg("vmlinuz")
        .arg("-d")
        .arg(work_dir)
        .arg("-o")
        .arg(outdir)
        .arg("initramfs-extra")
        .status()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::Installer(format!("{} command not found", installer)),
            _ => Error::Installer(format!("failed to run {}: {}", installer, e)),
        })?;

    if !status.success() {
        return Err(Error::Installer(format!("'{}' command failed: {}", installer, status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_find_kernel_skips_derived() {
        let out = tempdir().unwrap();
        fs::write(out.path().join("vmlinuz-dtb"), "").unwrap();
        fs::write(out.path().join("vmlinuz-lts"), "").unwrap();

        assert_eq!(find_kernel(out.path()).unwrap(), out.path().join("vmlinuz-lts"));
    }

    #[test]
    fn test_find_kernel_none() {
        let out = tempdir().unwrap();
        fs::write(out.path().join("vmlinuz-mtk"), "").unwrap();

        assert!(matches!(find_kernel(out.path()), Err(Error::Installer(_))));
    }

    #[test]
    fn test_missing_installer() {
        let out = tempdir().unwrap();
        let work = tempdir().unwrap();
        fs::write(out.path().join("vmlinuz"), "kernel").unwrap();

        let err =
            boot_deploy("mkinitfs-test-no-such-installer", work.path(), out.path()).unwrap_err();
        assert!(matches!(err, Error::Installer(_)));
        assert_eq!(fs::read(work.path().join("vmlinuz")).unwrap(), b"kernel");
    }

    #[test]
    fn test_installer_exit_status() {
        let out = tempdir().unwrap();
        let work = tempdir().unwrap();
        fs::write(out.path().join("vmlinuz"), "kernel").unwrap();

        // `true` ignores its arguments and succeeds
        boot_deploy("true", work.path(), out.path()).unwrap();
        assert!(matches!(
            boot_deploy("false", work.path(), out.path()),
            Err(Error::Installer(_))
        ));
    }
}
