use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::archive::extract::unpack_file;
use crate::error::{Error, IoResultExt, Result};
use crate::fs::{ensure_space, fsync_dir, set_mode, SpaceProbe, Statvfs, WorkDir};
use crate::hash::Checksum;

/// gzip level used for archives, the fastest setting
pub const COMPRESSION_LEVEL: u32 = 1;

/// compresses a finished cpio stream and installs it crash-safely
///
/// the target path only ever holds the previous archive or the complete new
/// one. everything up to the final rename happens in a private work
/// directory or a hidden temp file next to the target.
pub struct ArchiveWriter {
    mode: u32,
    level: Compression,
    probe: Box<dyn SpaceProbe>,
    tmp_root: PathBuf,
}

impl ArchiveWriter {
    /// writer installing archives with permission bits `mode`
    pub fn new(mode: u32) -> Self {
        Self {
            mode,
            level: Compression::new(COMPRESSION_LEVEL),
            probe: Box::new(Statvfs),
            tmp_root: std::env::temp_dir(),
        }
    }

    /// replace the statvfs free-space probe
    pub fn with_space_probe(mut self, probe: impl SpaceProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// stage under `dir` instead of the system temp dir
    pub fn with_tmp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_root = dir.into();
        self
    }

    /// compress `cpio` into a fresh staging directory and checksum it
    pub fn stage(&self, cpio: &[u8], target: &Path) -> Result<Staged> {
        let name = file_name(target)?;
        let work = WorkDir::new_in(&self.tmp_root, "mkinitfs-stage")?;
        let path = work.path().join(name);

        {
            let file = File::create(&path).with_path(&path)?;
            let mut encoder = GzEncoder::new(file, self.level);
            encoder.write_all(cpio).with_path(&path)?;
            let file = encoder.finish().with_path(&path)?;
            file.sync_all().with_path(&path)?;
        }

        let checksum = Checksum::of_file(&path)?;
        let size = fs::metadata(&path).with_path(&path)?.len();
        debug!(
            "staged {} ({} bytes, {} uncompressed) sha256 {}",
            path.display(),
            size,
            cpio.len(),
            checksum
        );

        Ok(Staged {
            work,
            path,
            target: target.to_path_buf(),
            checksum,
            size,
            mode: self.mode,
        })
    }

    /// run the whole pipeline: stage, space gate, verify, commit
    pub fn write(&self, cpio: &[u8], target: &Path) -> Result<Checksum> {
        let staged = self.stage(cpio, target)?;
        staged.reserve_space(self.probe.as_ref())?;
        let checksum = staged.verify()?.commit()?;
        info!("wrote {}", target.display());
        Ok(checksum)
    }
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("mode", &format_args!("{:o}", self.mode))
            .field("level", &self.level.level())
            .field("tmp_root", &self.tmp_root)
            .finish_non_exhaustive()
    }
}

/// compressed archive sitting in its staging directory
///
/// dropping it removes the staging directory.
#[derive(Debug)]
pub struct Staged {
    work: WorkDir,
    path: PathBuf,
    target: PathBuf,
    checksum: Checksum,
    size: u64,
    mode: u32,
}

impl Staged {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// digest taken right after compression
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// compressed size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// fail unless the target filesystem can take the archive and keep its reserve
    pub fn reserve_space(&self, probe: &dyn SpaceProbe) -> Result<()> {
        ensure_space(probe, target_dir(&self.target), self.size)
    }

    /// unpack the staged archive into a scratch directory
    pub fn verify(self) -> Result<Verified> {
        let dest = self.work.subdir("extract-test")?;
        let entries = unpack_file(&self.path, &dest).map_err(|e| Error::ExtractionVerification {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        debug!("extraction test unpacked {} entries", entries.len());

        // the unpacked tree is not needed past this point
        if let Err(e) = fs::remove_dir_all(&dest) {
            debug!("failed to clean {}: {}", dest.display(), e);
        }
        Ok(Verified { staged: self })
    }
}

/// staged archive that passed the extraction test
#[derive(Debug)]
pub struct Verified {
    staged: Staged,
}

impl Verified {
    pub fn staged(&self) -> &Staged {
        &self.staged
    }

    /// copy next to the target, compare checksums, then rename into place
    pub fn commit(self) -> Result<Checksum> {
        let staged = &self.staged;
        let dir = target_dir(&staged.target);
        let name = file_name(&staged.target)?;
        let tmp_path = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

        let (pending, mut dst) = PendingFile::create(&tmp_path)?;
        let mut src = File::open(&staged.path).with_path(&staged.path)?;
        io::copy(&mut src, &mut dst).with_path(&tmp_path)?;
        dst.sync_all().with_path(&tmp_path)?;
        drop(dst);

        let actual = Checksum::of_file(&tmp_path)?;
        if actual != staged.checksum {
            return Err(Error::ChecksumMismatch {
                path: tmp_path.clone(),
                expected: staged.checksum,
                actual,
            });
        }

        fs::rename(&tmp_path, &staged.target).with_path(&staged.target)?;
        pending.disarm();
        set_mode(&staged.target, staged.mode)?;
        fsync_dir(dir)?;
        Ok(actual)
    }
}

/// temp file in the destination directory, removed unless renamed away
struct PendingFile {
    path: PathBuf,
    armed: bool,
}

impl PendingFile {
    fn create(path: &Path) -> Result<(Self, File)> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_path(path)?;
        let guard = Self {
            path: path.to_path_buf(),
            armed: true,
        };
        Ok((guard, file))
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn target_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn file_name(target: &Path) -> Result<String> {
    target
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::UnsupportedFormat(format!("bad archive target {}", target.display())))
}
