use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

/// where the config file is looked up when none is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/postmarketos-mkinitfs/mkinitfs.toml";

/// host locations consulted while building, stored in mkinitfs.toml
///
/// every field is optional in the file; missing ones keep their default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// device configuration (flat key=value file)
    pub deviceinfo: PathBuf,
    /// directory of hook file lists, one path per line
    pub hook_files_dir: PathBuf,
    /// hook scripts copied verbatim
    pub hook_scripts_glob: String,
    /// extra module lists, one module name per line
    pub module_lists_glob: String,
    /// holds init.sh and init_functions.sh
    pub init_dir: PathBuf,
    /// holds *.ppm.gz splash images
    pub splash_dir: PathBuf,
    /// parent of the per-kernel-version module trees
    pub module_root: PathBuf,
    /// must match exactly one kernel.release file
    pub kernel_release_glob: String,
    /// searched in order for shared libraries
    pub lib_dirs: Vec<PathBuf>,
    /// boot installer run after the archives are built
    pub installer: String,
    /// permission bits of the installed archives
    pub archive_mode: u32,
    /// binaries and config packed into the initramfs with their libraries
    pub required_files: Vec<PathBuf>,
    /// recovery tools packed into initramfs-extra
    pub extra_binaries: Vec<PathBuf>,
    /// full disk encryption support for initramfs-extra
    pub fde: FdeConfig,
}

/// host files of the on-screen keyboard disk unlocker
///
/// support is only packed when `osk_sdl` exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FdeConfig {
    pub osk_sdl: PathBuf,
    /// names the keyboard font, which is packed too
    pub osk_conf: PathBuf,
    /// packed when present
    pub optional_files: Vec<PathBuf>,
    pub binaries: Vec<PathBuf>,
    /// every .so below these is packed
    pub plugin_dirs: Vec<PathBuf>,
    pub lib_globs: Vec<String>,
    /// packed when deviceinfo names a mesa driver
    pub mesa_libs: Vec<PathBuf>,
    /// holds `<driver>_dri.so`
    pub dri_dir: PathBuf,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// load config from file, or the defaults if there is no such file
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(e) if e.is_not_found() => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deviceinfo: "/etc/deviceinfo".into(),
            hook_files_dir: "/etc/postmarketos-mkinitfs/files".into(),
            hook_scripts_glob: "/etc/postmarketos-mkinitfs/hooks/*.sh".into(),
            module_lists_glob: "/etc/postmarketos-mkinitfs/modules/*.modules".into(),
            init_dir: "/usr/share/postmarketos-mkinitfs".into(),
            splash_dir: "/usr/share/postmarketos-splashes".into(),
            module_root: "/lib/modules".into(),
            kernel_release_glob: "/usr/share/kernel/*/kernel.release".into(),
            lib_dirs: vec!["/usr/lib".into(), "/lib".into()],
            installer: "boot-deploy".into(),
            archive_mode: 0o644,
            required_files: paths(&[
                "/bin/busybox",
                "/bin/sh",
                "/bin/busybox-extras",
                "/usr/sbin/telnetd",
                "/sbin/kpartx",
                "/etc/deviceinfo",
                "/sbin/modprobe",
            ]),
            extra_binaries: paths(&[
                "/lib/libz.so.1",
                "/sbin/dmsetup",
                "/sbin/e2fsck",
                "/usr/sbin/parted",
                "/usr/sbin/resize2fs",
                "/usr/sbin/resize.f2fs",
            ]),
            fde: FdeConfig::default(),
        }
    }
}

impl Default for FdeConfig {
    fn default() -> Self {
        Self {
            osk_sdl: "/usr/bin/osk-sdl".into(),
            osk_conf: "/etc/osk.conf".into(),
            optional_files: paths(&[
                "/etc/osk.conf",
                "/etc/ts.conf",
                "/etc/pointercal",
                "/etc/fb.modes",
                "/etc/directfbrc",
            ]),
            binaries: paths(&["/usr/bin/osk-sdl", "/sbin/cryptsetup", "/usr/lib/libGL.so.1"]),
            plugin_dirs: paths(&["/usr/lib/directfb-1.7-7", "/usr/lib/ts"]),
            lib_globs: vec!["/usr/lib/libts*".into()],
            mesa_libs: paths(&[
                "/usr/lib/libEGL.so.1",
                "/usr/lib/libGLESv2.so.2",
                "/usr/lib/libgbm.so.1",
                "/usr/lib/libudev.so.1",
            ]),
            dri_dir: "/usr/lib/xorg/modules/dri".into(),
        }
    }
}

fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}
