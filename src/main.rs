//! mkinitfs - initramfs generator command line interface

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use mkinitfs::ops::{run, BuildOptions};
use mkinitfs::{Config, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "mkinitfs")]
#[command(about = "build initramfs and initramfs-extra for the installed kernel")]
#[command(version)]
struct Cli {
    /// directory to output initfs(-extra) and other boot files
    #[arg(short = 'd', long, default_value = "/boot")]
    outdir: PathBuf,

    /// config file with host locations
    #[arg(short, long, env = "MKINITFS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// write the archives to the output directory instead of running the installer
    #[arg(long)]
    no_deploy: bool,
}

fn install_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

fn main() -> ExitCode {
    install_tracing();
    let cli = Cli::parse();

    if let Err(e) = build(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn build(cli: Cli) -> mkinitfs::Result<()> {
    let config = Config::load_or_default(&cli.config)?;
    let options = BuildOptions {
        outdir: cli.outdir,
        deploy: !cli.no_deploy,
    };
    run(&config, &options)
}
