//! FUSE dispatch glue: translates kernel inode-numbered calls onto the
//! path-based Filesystem Operations API. Out of scope per the
//! specification's own framing; kept as thin as the `fuser` trait allows.
//!
//! The kernel reserves inode 1 for the mount root, while mkfs always
//! allocates our own root at inode 0 (lowest-free policy). This adapter
//! keeps a path cache keyed by the kernel-visible inode number it hands out,
//! seeded with `{1: "/"}`, and never exposes our internal `u16` inode
//! numbers to the kernel directly.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
	FileAttr, FileType as FuseFileType, Filesystem as FuseFilesystem, ReplyAttr, ReplyCreate, ReplyData,
	ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use log::debug;

use crate::inode::{FileType, VStat};
use crate::ops::Filesystem;

/// Attribute TTL handed back to the kernel; the engine holds no open-file
/// state, so there is nothing stale to worry about beyond a very short cache.
const TTL: Duration = Duration::from_secs(1);

/// The kernel-visible inode number of the mount root.
const FUSE_ROOT_INO: u64 = 1;

/// Maps kernel inode numbers onto Tiny FS paths, assigning a fresh number
/// the first time a path is looked up.
pub struct FuseAdapter {
	fs: Filesystem,
	paths: HashMap<u64, PathBuf>,
	next_ino: u64,
}

impl FuseAdapter {
	pub fn new(fs: Filesystem) -> Self {
		let mut paths = HashMap::new();
		paths.insert(FUSE_ROOT_INO, PathBuf::from("/"));
		Self { fs, paths, next_ino: FUSE_ROOT_INO + 1 }
	}

	fn path_of(&self, ino: u64) -> Option<&Path> {
		self.paths.get(&ino).map(|p| p.as_path())
	}

	fn ino_for(&mut self, path: &Path) -> u64 {
		if let Some((&ino, _)) = self.paths.iter().find(|(_, p)| p.as_path() == path) {
			return ino;
		}
		let ino = self.next_ino;
		self.next_ino += 1;
		self.paths.insert(ino, path.to_path_buf());
		ino
	}

	fn child_path(parent: &Path, name: &OsStr) -> PathBuf {
		let mut path = parent.to_path_buf();
		path.push(name);
		path
	}
}

fn to_fuse_attr(ino: u64, vstat: &VStat, kind: FuseFileType) -> FileAttr {
	FileAttr {
		ino,
		size: vstat.size,
		blocks: vstat.size.div_ceil(vstat.blksize.max(1) as u64),
		atime: epoch_to_systemtime(vstat.atime),
		mtime: epoch_to_systemtime(vstat.mtime),
		ctime: epoch_to_systemtime(vstat.mtime),
		crtime: epoch_to_systemtime(vstat.mtime),
		kind,
		perm: (vstat.mode & 0o7777) as u16,
		nlink: vstat.nlink,
		uid: vstat.uid,
		gid: vstat.gid,
		rdev: 0,
		blksize: vstat.blksize,
		flags: 0,
	}
}

fn epoch_to_systemtime((secs, nanos): (i64, u32)) -> SystemTime {
	if secs >= 0 {
		UNIX_EPOCH + Duration::new(secs as u64, nanos)
	} else {
		UNIX_EPOCH - Duration::new((-secs) as u64, nanos)
	}
}

fn fuse_kind(file_type: FileType) -> FuseFileType {
	match file_type {
		FileType::Directory => FuseFileType::Directory,
		_ => FuseFileType::RegularFile,
	}
}

impl FuseFilesystem for FuseAdapter {
	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let Some(parent_path) = self.path_of(parent) else {
			return reply.error(libc::ENOENT);
		};
		let child = Self::child_path(parent_path, name);
		match self.fs.path_getattr(&child.to_string_lossy()) {
			Ok(vstat) => {
				let ino = self.ino_for(&child);
				let kind = fuse_kind(file_type_of(&vstat));
				reply.entry(&TTL, &to_fuse_attr(ino, &vstat, kind), 0);
			}
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
		let Some(path) = self.path_of(ino).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		match self.fs.path_getattr(&path.to_string_lossy()) {
			Ok(vstat) => {
				let kind = fuse_kind(file_type_of(&vstat));
				reply.attr(&TTL, &to_fuse_attr(ino, &vstat, kind));
			}
			Err(err) => reply.error(err.to_errno()),
		}
	}

	/// Tiny FS has no settable attributes (spec §6: `truncate`/`utimens` are
	/// no-ops). Ignores every field the kernel asks to change and replies
	/// with the inode's current attributes, rather than falling through to
	/// the trait's default `ENOSYS`.
	#[allow(clippy::too_many_arguments)]
	fn setattr(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_mode: Option<u32>,
		_uid: Option<u32>,
		_gid: Option<u32>,
		_size: Option<u64>,
		_atime: Option<TimeOrNow>,
		_mtime: Option<TimeOrNow>,
		_ctime: Option<SystemTime>,
		_fh: Option<u64>,
		_crtime: Option<SystemTime>,
		_chgtime: Option<SystemTime>,
		_bkuptime: Option<SystemTime>,
		_flags: Option<u32>,
		reply: ReplyAttr,
	) {
		let Some(path) = self.path_of(ino).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		match self.fs.path_getattr(&path.to_string_lossy()) {
			Ok(vstat) => {
				let kind = fuse_kind(file_type_of(&vstat));
				reply.attr(&TTL, &to_fuse_attr(ino, &vstat, kind));
			}
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
		reply.opened(0, 0);
	}

	fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		let Some(path) = self.path_of(ino).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		let entries = match self.fs.path_readdir(&path.to_string_lossy()) {
			Ok(entries) => entries,
			Err(err) => return reply.error(err.to_errno()),
		};
		for (i, (name, _child_ino)) in entries.into_iter().enumerate().skip(offset as usize) {
			let child_path = Self::child_path(&path, OsStr::new(&name));
			let child_fuse_ino = if name == "." {
				ino
			} else if name == ".." {
				self.path_of(ino).and_then(|p| p.parent()).map(|p| self.ino_for_immutable(p)).unwrap_or(ino)
			} else {
				self.ino_for(&child_path)
			};
			let kind = match self.fs.path_getattr(&child_path.to_string_lossy()) {
				Ok(vstat) => fuse_kind(file_type_of(&vstat)),
				Err(_) => FuseFileType::RegularFile,
			};
			if reply.add(child_fuse_ino, (i + 1) as i64, kind, &name) {
				break;
			}
		}
		reply.ok();
	}

	fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
		reply.ok();
	}

	fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
		let Some(parent_path) = self.path_of(parent).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		let child = Self::child_path(&parent_path, name);
		match self.fs.path_mkdir(&child.to_string_lossy()).and_then(|_| self.fs.path_getattr(&child.to_string_lossy())) {
			Ok(vstat) => {
				let ino = self.ino_for(&child);
				reply.entry(&TTL, &to_fuse_attr(ino, &vstat, FuseFileType::Directory), 0);
			}
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let Some(parent_path) = self.path_of(parent).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		let child = Self::child_path(&parent_path, name);
		match self.fs.path_rmdir(&child.to_string_lossy()) {
			Ok(()) => {
				self.forget_path(&child);
				reply.ok();
			}
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn create(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		_mode: u32,
		_umask: u32,
		_flags: i32,
		reply: ReplyCreate,
	) {
		let Some(parent_path) = self.path_of(parent).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		let child = Self::child_path(&parent_path, name);
		match self.fs.path_create(&child.to_string_lossy()).and_then(|_| self.fs.path_getattr(&child.to_string_lossy())) {
			Ok(vstat) => {
				let ino = self.ino_for(&child);
				reply.created(&TTL, &to_fuse_attr(ino, &vstat, FuseFileType::RegularFile), 0, 0, 0);
			}
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let Some(parent_path) = self.path_of(parent).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		let child = Self::child_path(&parent_path, name);
		match self.fs.path_unlink(&child.to_string_lossy()) {
			Ok(()) => {
				self.forget_path(&child);
				reply.ok();
			}
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
		let Some(path) = self.path_of(ino).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		match self.fs.path_open(&path.to_string_lossy()) {
			Ok(()) => reply.opened(0, 0),
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let Some(path) = self.path_of(ino).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		let mut buf = vec![0u8; size as usize];
		match self.fs.path_read(&path.to_string_lossy(), offset as u64, &mut buf) {
			Ok(n) => reply.data(&buf[..n]),
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		let Some(path) = self.path_of(ino).map(|p| p.to_path_buf()) else {
			return reply.error(libc::ENOENT);
		};
		match self.fs.path_write(&path.to_string_lossy(), offset as u64, data) {
			Ok(n) => reply.written(n as u32),
			Err(err) => reply.error(err.to_errno()),
		}
	}

	fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
		reply.ok();
	}

	fn release(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		_fh: u64,
		_flags: i32,
		_lock_owner: Option<u64>,
		_flush: bool,
		reply: ReplyEmpty,
	) {
		reply.ok();
	}

	fn destroy(&mut self) {
		debug!("unmounting");
	}
}

impl FuseAdapter {
	fn forget_path(&mut self, path: &Path) {
		self.paths.retain(|_, p| p != path);
	}

	fn ino_for_immutable(&self, path: &Path) -> u64 {
		self.paths
			.iter()
			.find(|(_, p)| p.as_path() == path)
			.map(|(&ino, _)| ino)
			.unwrap_or(FUSE_ROOT_INO)
	}
}

fn file_type_of(vstat: &VStat) -> FileType {
	if vstat.mode & 0o170000 == 0o040000 {
		FileType::Directory
	} else {
		FileType::File
	}
}

/// Mounts a [`Filesystem`] at `mountpoint` with the given FUSE mount
/// options, running until unmounted.
pub fn mount(fs: Filesystem, mountpoint: &Path, options: &[fuser::MountOption]) -> std::io::Result<()> {
	fuser::mount2(FuseAdapter::new(fs), mountpoint, options)
}
