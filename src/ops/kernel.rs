use std::fs;

use crate::error::{Error, IoResultExt, Result};
use crate::ops::glob_paths;

/// version of the one installed kernel, read from its kernel.release file
///
/// only a single kernel flavor is supported, so `pattern` must match exactly
/// one file.
pub fn kernel_version(pattern: &str) -> Result<String> {
    let files = glob_paths(pattern)?;
    let [release] = files.as_slice() else {
        return Err(Error::KernelRelease(format!(
            "only one kernel release/flavor is supported, found {} matching {}: {:?}",
            files.len(),
            pattern,
            files
        )));
    };

    let version = fs::read_to_string(release).with_path(release)?;
    let version = version.trim();
    if version.is_empty() {
        return Err(Error::KernelRelease(format!("{} is empty", release.display())));
    }
    Ok(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pattern(root: &std::path::Path) -> String {
        format!("{}/*/kernel.release", root.display())
    }

    #[test]
    fn test_single_release() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("postmarketos-rockchip")).unwrap();
        fs::write(
            root.path().join("postmarketos-rockchip/kernel.release"),
            "6.1.0-rc3\n",
        )
        .unwrap();

        assert_eq!(kernel_version(&pattern(root.path())).unwrap(), "6.1.0-rc3");
    }

    #[test]
    fn test_no_release() {
        let root = tempdir().unwrap();
        let err = kernel_version(&pattern(root.path())).unwrap_err();
        assert!(matches!(err, Error::KernelRelease(_)));
    }

    #[test]
    fn test_multiple_flavors() {
        let root = tempdir().unwrap();
        for flavor in ["lts", "edge"] {
            fs::create_dir(root.path().join(flavor)).unwrap();
            fs::write(root.path().join(flavor).join("kernel.release"), "6.1").unwrap();
        }
        let err = kernel_version(&pattern(root.path())).unwrap_err();
        assert!(matches!(err, Error::KernelRelease(_)));
    }

    #[test]
    fn test_empty_release() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("lts")).unwrap();
        fs::write(root.path().join("lts/kernel.release"), " \n").unwrap();
        assert!(kernel_version(&pattern(root.path())).is_err());
    }
}
