//! Tiny FS CLI: mounts a Tiny FS diskfile at a mountpoint via FUSE.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fuser::MountOption;
use log::{error, info};
use uuid::Uuid;

use tinyfs::ops::Filesystem;

/// Mount a Tiny FS diskfile at MOUNTPOINT.
///
/// The backing diskfile is always `DISKFILE` in the current working
/// directory; it is created and formatted on first mount if it does not
/// already exist.
#[derive(Parser)]
#[command(name = "tinyfs", version)]
struct Cli {
	/// Directory to mount the filesystem on.
	mountpoint: PathBuf,

	/// Allow users other than the mount owner to access the filesystem.
	#[arg(long)]
	allow_other: bool,

	/// Mount the filesystem read-only.
	#[arg(long)]
	read_only: bool,

	/// Pass a raw FUSE mount option through (repeatable).
	#[arg(short = 'o', value_name = "OPTION")]
	mount_options: Vec<String>,
}

fn main() -> ExitCode {
	env_logger::init();
	let cli = Cli::parse();

	let session_id = Uuid::new_v4();
	info!("starting Tiny FS mount session {session_id}");

	let diskfile = match std::env::current_dir() {
		Ok(cwd) => cwd.join("DISKFILE"),
		Err(err) => {
			error!("cannot determine current directory: {err}");
			return ExitCode::FAILURE;
		}
	};

	let fs = match Filesystem::mount(&diskfile) {
		Ok(fs) => fs,
		Err(err) => {
			error!("failed to mount {}: {err}", diskfile.display());
			return ExitCode::FAILURE;
		}
	};

	let mut options = vec![MountOption::FSName("tinyfs".to_string())];
	if cli.allow_other {
		options.push(MountOption::AllowOther);
	}
	if cli.read_only {
		options.push(MountOption::RO);
	}
	options.extend(cli.mount_options.into_iter().map(MountOption::CUSTOM));

	info!("mounting {} on {}", diskfile.display(), cli.mountpoint.display());
	if let Err(err) = tinyfs::fuse_adapter::mount(fs, &cli.mountpoint, &options) {
		error!("mount failed: {err}");
		return ExitCode::FAILURE;
	}

	ExitCode::SUCCESS
}
