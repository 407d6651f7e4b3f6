//! CLI entry point: opens (or creates) the disk image and mounts it.
//!
//! Replaces the reference implementation's raw `argv` passthrough to
//! `fuse_main` with a `clap`-derived parser, the pattern several FUSE
//! crates in this ecosystem use for the same job.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Mount a rufs disk image as a FUSE filesystem.
#[derive(Parser, Debug)]
#[command(name = "rufs", version, about)]
struct Args {
    /// Path to the backing disk image. Created with `mkfs` if missing.
    #[arg(long, default_value = "./DISKFILE")]
    disk: PathBuf,

    /// Create a fresh disk image even if one already exists at `--disk`.
    #[arg(long)]
    mkfs: bool,

    /// Run in the foreground instead of daemonizing.
    #[arg(short, long)]
    foreground: bool,

    /// Increase log verbosity; may be repeated.
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory to mount the filesystem at.
    mountpoint: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    let fs = if args.mkfs || !args.disk.exists() {
        rufs::Rufs::mkfs(&args.disk)
    } else {
        rufs::Rufs::open(&args.disk)
    };
    let fs = match fs {
        Ok(fs) => fs,
        Err(e) => {
            log::error!("failed to open {}: {e}", args.disk.display());
            return ExitCode::FAILURE;
        }
    };

    let mut options = vec![fuser::MountOption::FSName("rufs".to_string())];
    if !args.foreground {
        options.push(fuser::MountOption::AutoUnmount);
    }

    log::info!("mounting {} at {}", args.disk.display(), args.mountpoint.display());
    match fuser::mount2(rufs::ops::RufsFs::new(fs), &args.mountpoint, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("mount failed: {e}");
            ExitCode::FAILURE
        }
    }
}
