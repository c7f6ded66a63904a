use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::ops::glob_paths;

/// paths named by every hook file list in `dir`
///
/// each list holds one absolute path per line. a listed path that does not
/// exist fails the build. lists are read in file name order.
pub fn hook_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut lists: Vec<PathBuf> = fs::read_dir(dir)
        .with_path(dir)?
        .map(|entry| entry.map(|e| e.path()).with_path(dir))
        .collect::<Result<_>>()?;
    lists.sort();

    let mut files = Vec::new();
    for list in lists {
        if list.is_dir() {
            continue;
        }
        let reader = BufReader::new(File::open(&list).with_path(&list)?);
        for line in reader.lines() {
            let line = line.with_path(&list)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let path = PathBuf::from(line);
            if !path.exists() {
                return Err(Error::HookFileMissing { path, list });
            }
            files.push(path);
        }
        debug!("read hook list {}", list.display());
    }
    Ok(files)
}

/// hook scripts matching `pattern`, copied verbatim
pub fn hook_scripts(pattern: &str) -> Result<Vec<PathBuf>> {
    glob_paths(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hook_files() {
        let root = tempdir().unwrap();
        let lists = root.path().join("files");
        fs::create_dir(&lists).unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();
        fs::write(lists.join("10-first"), format!("{}\n\n", a.display())).unwrap();
        fs::write(lists.join("20-second"), format!("{}\n{}\n", b.display(), a.display())).unwrap();

        let files = hook_files(&lists).unwrap();
        assert_eq!(files, vec![a.clone(), b, a]);
    }

    #[test]
    fn test_missing_hook_file() {
        let root = tempdir().unwrap();
        let lists = root.path().join("files");
        fs::create_dir(&lists).unwrap();
        let gone = root.path().join("gone");
        fs::write(lists.join("fde"), format!("{}\n", gone.display())).unwrap();

        let err = hook_files(&lists).unwrap_err();
        match err {
            Error::HookFileMissing { path, list } => {
                assert_eq!(path, gone);
                assert_eq!(list, lists.join("fde"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_hook_scripts() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("20-b.sh"), "").unwrap();
        fs::write(root.path().join("10-a.sh"), "").unwrap();
        fs::write(root.path().join("README"), "").unwrap();

        let scripts = hook_scripts(&format!("{}/*.sh", root.path().display())).unwrap();
        assert_eq!(
            scripts,
            vec![root.path().join("10-a.sh"), root.path().join("20-b.sh")]
        );
    }
}
