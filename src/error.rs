//! Error types shared across the Tiny FS engine.

use std::io;

use thiserror::Error;

/// The result type returned by every fallible engine operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-level error kinds, independent of any dispatch protocol.
#[derive(Debug, Error)]
pub enum Error {
	/// No entry exists at the requested path or name.
	#[error("no such file or directory")]
	NotFound,
	/// An entry already exists where one is being created.
	#[error("file exists")]
	Exists,
	/// A path component that should be a directory is not one.
	#[error("not a directory")]
	NotADirectory,
	/// An operation that requires a file found a directory instead.
	#[error("is a directory")]
	IsADirectory,
	/// `rmdir` was called on a directory containing more than `.` and `..`.
	#[error("directory not empty")]
	DirNotEmpty,
	/// A directory's direct and indirect blocks are all full of valid entries.
	#[error("directory full")]
	DirFull,
	/// A bitmap allocator has no free bit left.
	#[error("no space left on device")]
	NoSpace,
	/// A write would grow a file past the block map's maximum addressable size.
	#[error("file too large")]
	FileTooBig,
	/// A path component exceeds the dirent name capacity.
	#[error("file name too long")]
	NameTooLong,
	/// The superblock's magic number did not match at mount time.
	#[error("corrupt superblock")]
	CorruptSuperblock,
	/// The underlying block device failed.
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}

impl Error {
	/// Maps an engine error to the POSIX errno the dispatch boundary reports.
	pub fn to_errno(&self) -> i32 {
		match self {
			Error::NotFound => libc::ENOENT,
			Error::Exists => libc::EEXIST,
			Error::NotADirectory => libc::ENOTDIR,
			Error::IsADirectory => libc::EISDIR,
			Error::DirNotEmpty => libc::ENOTEMPTY,
			Error::DirFull | Error::NoSpace => libc::ENOSPC,
			Error::FileTooBig => libc::EFBIG,
			Error::NameTooLong => libc::ENAMETOOLONG,
			Error::CorruptSuperblock | Error::Io(_) => libc::EIO,
		}
	}
}
