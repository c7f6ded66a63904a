use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, IoResultExt, Result};

/// fields of a device's deviceinfo file that the build looks at
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub append_dtb: String,
    pub arch: String,
    pub dtb: String,
    pub flash_kernel_on_update: String,
    pub generate_bootimg: String,
    pub initfs_compression: String,
    pub kernel_cmdline: String,
    pub mesa_driver: String,
    pub modules_initfs: String,
}

type Field = fn(&mut DeviceInfo) -> &mut String;

/// key (without the `deviceinfo_` prefix) -> field
const FIELDS: &[(&str, Field)] = &[
    ("append_dtb", |d| &mut d.append_dtb),
    ("arch", |d| &mut d.arch),
    ("dtb", |d| &mut d.dtb),
    ("flash_kernel_on_update", |d| &mut d.flash_kernel_on_update),
    ("generate_bootimg", |d| &mut d.generate_bootimg),
    ("initfs_compression", |d| &mut d.initfs_compression),
    ("kernel_cmdline", |d| &mut d.kernel_cmdline),
    ("mesa_driver", |d| &mut d.mesa_driver),
    ("modules_initfs", |d| &mut d.modules_initfs),
];

impl DeviceInfo {
    /// read and parse a deviceinfo file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        Self::parse(BufReader::new(file), path)
    }

    /// parse deviceinfo text; `source` is only used in errors
    ///
    /// keys this build does not use are skipped. a line that assigns to an
    /// empty key is rejected.
    pub fn parse<R: BufRead>(reader: R, source: &Path) -> Result<Self> {
        let mut info = Self::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_path(source)?;
            if line.starts_with('#') || !line.contains('=') {
                continue;
            }

            // trailing comments
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((name, value)) = line.split_once('=') else {
                return Err(Error::Parse {
                    path: source.to_path_buf(),
                    line: idx + 1,
                    message: format!("invalid format: {}", line),
                });
            };
            let value = value.replace('"', "");

            if name == "deviceinfo_format_version" {
                if value != "0" {
                    return Err(Error::UnsupportedFormat(format!(
                        "deviceinfo format version {:?} is not supported",
                        value
                    )));
                }
                continue;
            }

            let key = canonical_key(name);
            if key.is_empty() {
                return Err(Error::Parse {
                    path: source.to_path_buf(),
                    line: idx + 1,
                    message: format!("invalid key in: {}", line),
                });
            }
            if let Some((_, field)) = FIELDS.iter().find(|(k, _)| *k == key) {
                *field(&mut info) = value;
            }
        }
        Ok(info)
    }

    /// module names listed in modules_initfs
    pub fn initfs_modules(&self) -> impl Iterator<Item = &str> {
        self.modules_initfs.split_whitespace()
    }

    /// configured mesa driver, if any
    pub fn mesa_driver(&self) -> Option<&str> {
        Some(self.mesa_driver.trim()).filter(|d| !d.is_empty())
    }
}

/// `deviceinfo_modules_initfs__` -> `modules_initfs`
fn canonical_key(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty() && *part != "deviceinfo")
        .collect::<Vec<_>>()
        .join("_")
}
