use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::pathset::PathSet;

/// dependency database shipped in every /lib/modules/<version>
pub const MODULES_DEP: &str = "modules.dep";

/// extensions that mark a loadable module when scanning directories
const MODULE_EXTENSIONS: &[&str] = &["ko", "xz", "zst", "gz"];

/// one line of modules.dep: a module and everything it needs loaded first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub path: String,
    pub deps: Vec<String>,
}

impl ModuleRecord {
    /// the module's own path followed by its dependencies
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.deps.iter().map(String::as_str))
    }
}

/// strip every `.`-delimited suffix: `dw_wdt.ko.xz` -> `dw_wdt`
pub fn strip_exts(name: &str) -> &str {
    match name.find('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[-_]+").expect("static pattern"))
}

/// matches module file names regardless of `-`/`_` spelling
///
/// `dw-wdt`, `dw_wdt` and `kernel/drivers/watchdog/dw_wdt.ko.xz` all build
/// the same matcher.
#[derive(Debug, Clone)]
pub struct ModuleMatcher {
    name: String,
    re: Regex,
}

impl ModuleMatcher {
    pub fn new(name_or_path: &str) -> Result<Self> {
        let stem = strip_exts(base_name(name_or_path.trim()));
        if separators().replace_all(stem, "").is_empty() {
            return Err(Error::InvalidModuleName(name_or_path.to_string()));
        }

        let pieces: Vec<String> = separators().split(stem).map(regex::escape).collect();
        let pattern = format!("^{}$", pieces.join("[-_]+"));
        let re = Regex::new(&pattern)
            .map_err(|_| Error::InvalidModuleName(name_or_path.to_string()))?;

        Ok(Self {
            name: stem.to_string(),
            re,
        })
    }

    /// canonical stem the matcher was built from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// whether a modules.dep path names this module
    pub fn matches(&self, module_path: &str) -> bool {
        self.re.is_match(strip_exts(base_name(module_path)))
    }
}

/// parsed modules.dep for one kernel version
#[derive(Debug, Clone)]
pub struct ModuleDb {
    dir: PathBuf,
    records: Vec<ModuleRecord>,
}

impl ModuleDb {
    /// load `<module_dir>/modules.dep`
    pub fn open(module_dir: &Path) -> Result<Self> {
        let dep_path = module_dir.join(MODULES_DEP);
        let file = match File::open(&dep_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ModulesDepMissing(module_dir.to_path_buf()))
            }
            Err(e) => return Err(e).with_path(&dep_path),
        };
        Self::parse(module_dir, BufReader::new(file), &dep_path)
    }

    /// parse a modules.dep stream; `source` is only used in error messages
    pub fn parse<R: BufRead>(module_dir: &Path, reader: R, source: &Path) -> Result<Self> {
        let mut records = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| match e.kind() {
                ErrorKind::InvalidData => Error::Parse {
                    path: source.to_path_buf(),
                    line: line_no,
                    message: "not valid UTF-8".to_string(),
                },
                _ => Error::Io {
                    path: source.to_path_buf(),
                    source: e,
                },
            })?;

            let mut fields = line.split_whitespace();
            let Some(first) = fields.next() else {
                continue;
            };
            let path = first.strip_suffix(':').unwrap_or(first);
            if path.is_empty() || path.contains(':') {
                return Err(Error::Parse {
                    path: source.to_path_buf(),
                    line: line_no,
                    message: format!("invalid module path {:?}", first),
                });
            }

            let deps: Vec<String> = fields.map(str::to_string).collect();
            if let Some(bad) = deps.iter().find(|d| d.contains(':')) {
                return Err(Error::Parse {
                    path: source.to_path_buf(),
                    line: line_no,
                    message: format!("unexpected ':' in dependency {:?}", bad),
                });
            }

            records.push(ModuleRecord {
                path: path.to_string(),
                deps,
            });
        }

        Ok(Self {
            dir: module_dir.to_path_buf(),
            records,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }

    /// first record whose module file matches `name`
    pub fn lookup(&self, name: &str) -> Result<Option<&ModuleRecord>> {
        let matcher = ModuleMatcher::new(name)?;
        Ok(self.records.iter().find(|r| matcher.matches(&r.path)))
    }

    /// add the module file for `name` and all its dependencies to `paths`
    ///
    /// a name with no record is not an error: it may be built into the
    /// kernel. the returned list is empty in that case. a record pointing at
    /// a file that is not on disk fails the whole lookup and adds nothing.
    pub fn resolve(&self, paths: &mut PathSet, name: &str) -> Result<Vec<PathBuf>> {
        let Some(record) = self.lookup(name)? else {
            debug!("module {} not in {}, assuming built-in", name, MODULES_DEP);
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for rel in record.paths() {
            let full = self.dir.join(rel);
            if !full.exists() {
                return Err(Error::ModuleFileMissing {
                    module: name.to_string(),
                    path: full,
                });
            }
            found.push(full);
        }

        paths.extend(found.iter().cloned());
        Ok(found)
    }
}

/// resolve one module against `<module_dir>/modules.dep`
pub fn resolve_module(paths: &mut PathSet, name: &str, module_dir: &Path) -> Result<Vec<PathBuf>> {
    ModuleDb::open(module_dir)?.resolve(paths, name)
}

/// add every module file below `dir`
pub fn modules_in_dir(paths: &mut PathSet, dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::Io {
                path,
                source: e.into(),
            }
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let is_module = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext));
        if is_module {
            paths.insert(entry.path());
            count += 1;
        }
    }
    Ok(count)
}
