use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::archive::{ArchiveBuilder, ArchiveWriter};
use crate::config::{Config, FdeConfig};
use crate::deviceinfo::DeviceInfo;
use crate::error::{Error, IoResultExt, Result};
use crate::ops::glob_paths;
use crate::ops::hooks::{hook_files, hook_scripts};
use crate::ops::modules::include_modules;
use crate::pathset::PathSet;
use crate::resolve::ElfResolver;

/// directories the init script expects, even when empty
pub const REQUIRED_DIRS: &[&str] = &[
    "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/proc", "/sys", "/dev", "/tmp", "/lib", "/boot",
    "/sysroot", "/etc",
];

/// shared state of one build
pub struct BuildContext<'a> {
    pub config: &'a Config,
    pub devinfo: &'a DeviceInfo,
    pub kernel_version: &'a str,
    pub resolver: ElfResolver,
    pub writer: ArchiveWriter,
}

/// build and install the initramfs at `target`
pub fn generate_initfs(ctx: &BuildContext<'_>, target: &Path) -> Result<()> {
    info!("== Generating initramfs ==");
    let config = ctx.config;
    let mut archive = ArchiveBuilder::new();
    archive.dirs_mut().extend(REQUIRED_DIRS.iter().map(PathBuf::from));

    if config.hook_files_dir.exists() {
        info!("- Including hook files");
        let files = hook_files(&config.hook_files_dir)?;
        ctx.resolver.resolve_all(archive.files_mut(), files, true)?;
    }

    info!("- Including hook scripts");
    archive.files_mut().extend(hook_scripts(&config.hook_scripts_glob)?);

    info!("- Including required binaries");
    ctx.resolver.resolve_all(archive.files_mut(), &config.required_files, true)?;

    info!("- Including kernel modules");
    include_modules(archive.files_mut(), config, ctx.devinfo, ctx.kernel_version)?;

    archive.add_file(&config.init_dir.join("init.sh"), Path::new("/init"))?;

    info!("- Including splash images");
    let pattern = format!("{}/*.ppm.gz", config.splash_dir.display());
    for splash in glob_paths(&pattern)? {
        // expected at the archive root
        let Some(name) = splash.file_name() else {
            continue;
        };
        archive.add_file(&splash, &Path::new("/").join(name))?;
    }

    archive.add_file(
        &config.init_dir.join("init_functions.sh"),
        Path::new("/init_functions.sh"),
    )?;

    info!("- Writing and verifying initramfs archive");
    let cpio = archive.finalize()?;
    ctx.writer.write(&cpio, target)?;
    Ok(())
}

/// build and install initramfs-extra at `target`
pub fn generate_initfs_extra(ctx: &BuildContext<'_>, target: &Path) -> Result<()> {
    info!("== Generating initramfs extra ==");
    let mut archive = ArchiveBuilder::new();

    info!("- Including extra binaries");
    ctx.resolver.resolve_all(archive.files_mut(), &ctx.config.extra_binaries, true)?;

    let fde = &ctx.config.fde;
    if fde.osk_sdl.exists() {
        info!("- Including FDE support");
        fde_files(archive.files_mut(), &ctx.resolver, fde, ctx.devinfo)?;
    } else {
        info!("- *NOT* including FDE support");
    }

    info!("- Writing and verifying initramfs-extra archive");
    let cpio = archive.finalize()?;
    ctx.writer.write(&cpio, target)?;
    Ok(())
}

/// everything the on-screen keyboard unlocker needs at boot
fn fde_files(
    files: &mut PathSet,
    resolver: &ElfResolver,
    fde: &FdeConfig,
    devinfo: &DeviceInfo,
) -> Result<()> {
    // not every device ships all of these
    resolver.resolve_all(files, &fde.optional_files, false)?;
    resolver.resolve_all(files, &fde.binaries, true)?;

    files.insert(osk_font_path(&fde.osk_conf)?);

    for dir in &fde.plugin_dirs {
        resolver.resolve_all(files, shared_objects(dir)?, true)?;
    }
    for pattern in &fde.lib_globs {
        resolver.resolve_all(files, glob_paths(pattern)?, true)?;
    }

    if let Some(driver) = devinfo.mesa_driver() {
        let dri = fde.dri_dir.join(format!("{}_dri.so", driver));
        resolver.resolve_all(files, &fde.mesa_libs, true)?;
        resolver.resolve(files, &dri, true)?;
    }
    Ok(())
}

/// font named by the `keyboard-font = <path>` line of osk.conf; it must exist
pub fn osk_font_path(osk_conf: &Path) -> Result<PathBuf> {
    let reader = BufReader::new(File::open(osk_conf).with_path(osk_conf)?);
    let mut font = None;
    for line in reader.lines() {
        let line = line.with_path(osk_conf)?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() > 2 && fields[0] == "keyboard-font" {
            font = Some(PathBuf::from(fields[2]));
        }
    }

    match font {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(Error::NotFound(path)),
        None => Err(Error::Parse {
            path: osk_conf.to_path_buf(),
            line: 0,
            message: "no keyboard-font configured".into(),
        }),
    }
}

/// every `.so` file below `dir`; a missing `dir` yields nothing
pub fn shared_objects(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: e.into(),
        })?;
        if entry.path().extension().is_some_and(|ext| ext == "so") {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{unpack_file, ArchiveEntry};
    use crate::fs::FixedSpace;
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::{tempdir, TempDir};

    type Generate = fn(&BuildContext<'_>, &Path) -> Result<()>;

    /// a small host tree and a config pointing into it
    fn host() -> (TempDir, Config) {
        let root = tempdir().unwrap();
        let r = root.path();
        for dir in ["bin", "sbin", "lib", "etc", "init", "splash", "hooks"] {
            fs::create_dir_all(r.join(dir)).unwrap();
        }
        fs::write(r.join("bin/busybox"), "busybox").unwrap();
        symlink("busybox", r.join("bin/sh")).unwrap();
        fs::write(r.join("etc/deviceinfo"), "deviceinfo_arch=\"aarch64\"\n").unwrap();
        fs::write(r.join("init/init.sh"), "#!/bin/sh\n").unwrap();
        fs::write(r.join("init/init_functions.sh"), "mount_proc() { :; }\n").unwrap();
        fs::write(r.join("splash/splash-charging.ppm.gz"), "ppm").unwrap();
        fs::write(r.join("hooks/10-usb.sh"), "echo usb\n").unwrap();
        fs::write(r.join("sbin/e2fsck"), "e2fsck").unwrap();

        let config = Config {
            deviceinfo: r.join("etc/deviceinfo"),
            hook_files_dir: r.join("files"),
            hook_scripts_glob: format!("{}/hooks/*.sh", r.display()),
            module_lists_glob: format!("{}/modules/*.modules", r.display()),
            init_dir: r.join("init"),
            splash_dir: r.join("splash"),
            module_root: r.join("lib/modules"),
            lib_dirs: vec![r.join("lib")],
            required_files: vec![r.join("bin/sh"), r.join("etc/deviceinfo")],
            extra_binaries: vec![r.join("sbin/e2fsck")],
            fde: FdeConfig {
                osk_sdl: r.join("usr/bin/osk-sdl"),
                ..FdeConfig::default()
            },
            ..Config::default()
        };
        (root, config)
    }

    /// run `generate` and unpack what it installed
    fn build(
        config: &Config,
        devinfo: &DeviceInfo,
        generate: Generate,
    ) -> (TempDir, Vec<ArchiveEntry>) {
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let ctx = BuildContext {
            config,
            devinfo,
            kernel_version: "6.1.0",
            resolver: ElfResolver::new(&config.lib_dirs),
            writer: ArchiveWriter::new(0o644)
                .with_tmp_root(tmp.path())
                .with_space_probe(FixedSpace(u64::MAX)),
        };
        let target = out.path().join("archive");
        generate(&ctx, &target).unwrap();

        let dest = tempdir().unwrap();
        let entries = unpack_file(&target, dest.path()).unwrap();
        (dest, entries)
    }

    fn unpacked(dest: &TempDir, host: &Path) -> PathBuf {
        dest.path().join(host.strip_prefix("/").unwrap())
    }

    #[test]
    fn test_initfs_layout() {
        let (root, config) = host();
        let r = root.path();

        let (dest, _) = build(&config, &DeviceInfo::default(), generate_initfs);

        let init = dest.path().join("init");
        assert_eq!(fs::read(init).unwrap(), b"#!/bin/sh\n");
        assert!(dest.path().join("init_functions.sh").is_file());
        assert!(dest.path().join("splash-charging.ppm.gz").is_file());
        for dir in REQUIRED_DIRS {
            assert!(dest.path().join(&dir[1..]).is_dir(), "{dir} missing");
        }

        assert_eq!(
            fs::read_link(unpacked(&dest, &r.join("bin/sh"))).unwrap(),
            Path::new("busybox")
        );
        let busybox = unpacked(&dest, &r.join("bin/busybox"));
        assert_eq!(fs::read(busybox).unwrap(), b"busybox");
        assert!(unpacked(&dest, &r.join("etc/deviceinfo")).is_file());
        assert!(unpacked(&dest, &r.join("hooks/10-usb.sh")).is_file());
    }

    #[test]
    fn test_initfs_missing_required_file() {
        let (root, mut config) = host();
        config.required_files.push(root.path().join("sbin/kpartx"));
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let devinfo = DeviceInfo::default();
        let ctx = BuildContext {
            config: &config,
            devinfo: &devinfo,
            kernel_version: "6.1.0",
            resolver: ElfResolver::new(&config.lib_dirs),
            writer: ArchiveWriter::new(0o644).with_tmp_root(tmp.path()),
        };

        let target = out.path().join("initramfs");
        let err = generate_initfs(&ctx, &target).unwrap_err();
        assert!(matches!(err, Error::NotFound(p) if p == root.path().join("sbin/kpartx")));
        assert!(!target.exists());
    }

    #[test]
    fn test_initfs_extra_without_fde() {
        let (root, config) = host();

        let (dest, entries) = build(&config, &DeviceInfo::default(), generate_initfs_extra);

        let e2fsck = unpacked(&dest, &root.path().join("sbin/e2fsck"));
        assert_eq!(fs::read(e2fsck).unwrap(), b"e2fsck");
        assert!(entries.iter().all(|e| !e.name.contains("osk")));
    }

    #[test]
    fn test_initfs_extra_with_fde() {
        let (root, mut config) = host();
        let r = root.path();
        for dir in ["usr/bin", "directfb/gfx", "dri"] {
            fs::create_dir_all(r.join(dir)).unwrap();
        }
        fs::write(r.join("usr/bin/osk-sdl"), "osk").unwrap();
        fs::write(r.join("sbin/cryptsetup"), "cryptsetup").unwrap();
        fs::write(r.join("font.ttf"), "font").unwrap();
        fs::write(
            r.join("etc/osk.conf"),
            format!("keyboard-font = {}\n", r.join("font.ttf").display()),
        )
        .unwrap();
        fs::write(r.join("directfb/gfx/libdirectfb_fbdev.so"), "fbdev").unwrap();
        fs::write(r.join("lib/libts.so.0"), "ts").unwrap();
        fs::write(r.join("lib/libEGL.so.1"), "egl").unwrap();
        fs::write(r.join("dri/msm_dri.so"), "msm").unwrap();
        config.fde = FdeConfig {
            osk_sdl: r.join("usr/bin/osk-sdl"),
            osk_conf: r.join("etc/osk.conf"),
            optional_files: vec![r.join("etc/osk.conf"), r.join("etc/ts.conf")],
            binaries: vec![r.join("usr/bin/osk-sdl"), r.join("sbin/cryptsetup")],
            plugin_dirs: vec![r.join("directfb"), r.join("ts")],
            lib_globs: vec![format!("{}/lib/libts*", r.display())],
            mesa_libs: vec![r.join("lib/libEGL.so.1")],
            dri_dir: r.join("dri"),
        };
        let devinfo = DeviceInfo {
            mesa_driver: "msm".into(),
            ..DeviceInfo::default()
        };

        let (dest, _) = build(&config, &devinfo, generate_initfs_extra);

        for file in [
            "sbin/e2fsck",
            "usr/bin/osk-sdl",
            "sbin/cryptsetup",
            "etc/osk.conf",
            "font.ttf",
            "directfb/gfx/libdirectfb_fbdev.so",
            "lib/libts.so.0",
            "lib/libEGL.so.1",
            "dri/msm_dri.so",
        ] {
            assert!(unpacked(&dest, &r.join(file)).is_file(), "{file} missing");
        }
        assert!(!unpacked(&dest, &r.join("etc/ts.conf")).exists());
    }

    #[test]
    fn test_osk_font_path() {
        let root = tempdir().unwrap();
        let font = root.path().join("DejaVuSans.ttf");
        fs::write(&font, "").unwrap();
        let conf = root.path().join("osk.conf");
        fs::write(
            &conf,
            format!("keyboard-background = 0 0 0\nkeyboard-font = {}\n", font.display()),
        )
        .unwrap();

        assert_eq!(osk_font_path(&conf).unwrap(), font);
    }

    #[test]
    fn test_osk_font_missing() {
        let root = tempdir().unwrap();
        let conf = root.path().join("osk.conf");
        let font = root.path().join("gone.ttf");
        fs::write(&conf, format!("keyboard-font = {}\n", font.display())).unwrap();

        let err = osk_font_path(&conf).unwrap_err();
        assert!(matches!(err, Error::NotFound(p) if p == font));

        fs::write(&conf, "keyboard-font\n").unwrap();
        assert!(matches!(osk_font_path(&conf), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_shared_objects() {
        let root = tempdir().unwrap();
        let plugins = root.path().join("directfb/inputdrivers");
        fs::create_dir_all(&plugins).unwrap();
        fs::write(plugins.join("libdirectfb_linux_input.so"), "").unwrap();
        fs::write(plugins.join("libdirectfb_linux_input.la"), "").unwrap();
        fs::write(root.path().join("directfb/libdirect.so"), "").unwrap();

        let found = shared_objects(&root.path().join("directfb")).unwrap();
        assert_eq!(
            found,
            vec![
                plugins.join("libdirectfb_linux_input.so"),
                root.path().join("directfb/libdirect.so"),
            ]
        );
        assert!(shared_objects(&root.path().join("missing")).unwrap().is_empty());
    }
}
