use std::path::PathBuf;

use crate::Checksum;

/// error type for initramfs generation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required file does not exist: {0}")]
    NotFound(PathBuf),

    #[error("unable to locate library {library:?} needed by {needed_by}")]
    LibraryNotFound { library: String, needed_by: PathBuf },

    #[error("kernel modules.dep not found in {0}")]
    ModulesDepMissing(PathBuf),

    #[error("module {module:?} references a file missing from the module tree: {path}")]
    ModuleFileMissing { module: String, path: PathBuf },

    #[error("unable to find file {path} required by {list}")]
    HookFileMissing { path: PathBuf, list: PathBuf },

    #[error("invalid module name: {0:?}")]
    InvalidModuleName(String),

    #[error("parse error in {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("dependency chain deeper than {depth} levels at {path}")]
    DependencyDepth { path: PathBuf, depth: usize },

    #[error("file too large for a newc archive entry: {0}")]
    EntryTooLarge(PathBuf),

    #[error("not enough free space in {dir}: need {needed} bytes, usable {usable} bytes")]
    InsufficientSpace {
        dir: PathBuf,
        needed: u64,
        usable: u64,
    },

    #[error("checksum mismatch writing {path} (expected {expected}, got {actual})")]
    ChecksumMismatch {
        path: PathBuf,
        expected: Checksum,
        actual: Checksum,
    },

    #[error("archive {path} failed extraction test: {message}")]
    ExtractionVerification { path: PathBuf, message: String },

    #[error("kernel release: {0}")]
    KernelRelease(String),

    #[error("installer failed: {0}")]
    Installer(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

impl Error {
    /// true when the error means a path was absent, as opposed to unreadable
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
