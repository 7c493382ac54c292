//! Filesystem Operations: thin orchestration atop the superblock, bitmaps,
//! inode store, block map, directory engine, and path resolver.
//!
//! Methods here are named and shaped after the path-based dispatch contract
//! in the specification (`getattr`, `readdir`, `mkdir`, `rmdir`, `create`,
//! `unlink`, `read`, `write`, ...) so they can be exercised directly in tests
//! without a real FUSE mount. [`crate::fuse_adapter`] is the thin glue that
//! maps kernel inode numbers onto these path-based calls.

use std::path::Path;

use log::{debug, warn};

use crate::bitmap::Bitmap;
use crate::blockmap::{BlockMap, IndirectCache};
use crate::device::BlockDevice;
use crate::dir::DirEngine;
use crate::error::{Error, Result};
use crate::inode::{now_epoch, FileType, Inode, InodeStore, VStat};
use crate::layout::{self, BLOCK_SIZE, DIRECT_PTRS, INDIRECT_PTRS};
use crate::mkfs;
use crate::path::PathResolver;
use crate::superblock::Superblock;

/// The inode number mkfs always assigns to the root directory.
pub const ROOT_INO: u16 = 0;

/// A mounted Tiny FS filesystem: owns the backing device, the superblock,
/// and both bitmaps for the life of the mount session.
pub struct Filesystem {
	device: BlockDevice,
	sb: Superblock,
	inode_bitmap: Bitmap,
	data_bitmap: Bitmap,
}

impl Filesystem {
	/// Opens `path`, running mkfs against it first if it doesn't already
	/// exist, then loads the superblock and both bitmaps into memory.
	pub fn mount(path: &Path) -> Result<Self> {
		if !path.exists() {
			mkfs::format(path)?;
		}
		let mut device = BlockDevice::open(path)?;
		let sb = Superblock::from_bytes(&device.read_block(layout::SUPERBLOCK_BLOCK)?)?;
		let inode_bitmap = Bitmap::load(&mut device, sb.i_bitmap_blk, sb.max_inum as usize, 0)?;
		let data_bitmap = Bitmap::load(&mut device, sb.d_bitmap_blk, sb.max_dnum as usize, sb.d_start_blk)?;
		Ok(Self { device, sb, inode_bitmap, data_bitmap })
	}

	fn resolve(&mut self, path: &str) -> Result<u16> {
		PathResolver::resolve(&mut self.device, &self.sb, ROOT_INO, path)
	}

	/// Resolves `path` and returns the inode's embedded `vstat`.
	pub fn path_getattr(&mut self, path: &str) -> Result<VStat> {
		let ino = self.resolve(path)?;
		log_result("getattr", path, InodeStore::read(&mut self.device, &self.sb, ino).map(|i| i.vstat))
	}

	/// Resolves `path`; stateless, so success is the entire contract.
	pub fn path_open(&mut self, path: &str) -> Result<()> {
		log_result("open", path, self.resolve(path).map(|_| ()))
	}

	/// Lists `(name, ino)` pairs for every valid entry under directory `path`.
	pub fn path_readdir(&mut self, path: &str) -> Result<Vec<(String, u16)>> {
		let result = (|| {
			let ino = self.resolve(path)?;
			let inode = InodeStore::read(&mut self.device, &self.sb, ino)?;
			if inode.file_type != FileType::Directory {
				return Err(Error::NotADirectory);
			}
			let entries = DirEngine::list(&mut self.device, &inode)?;
			Ok(entries.into_iter().map(|d| (d.name_str().to_string(), d.ino)).collect())
		})();
		log_result("readdir", path, result)
	}

	/// Creates a new directory at `path`.
	pub fn path_mkdir(&mut self, path: &str) -> Result<()> {
		log_result("mkdir", path, self.make_node(path, FileType::Directory))
	}

	/// Creates a new regular file at `path`.
	pub fn path_create(&mut self, path: &str) -> Result<()> {
		log_result("create", path, self.make_node(path, FileType::File))
	}

	fn make_node(&mut self, path: &str, file_type: FileType) -> Result<()> {
		let (parent_path, name) = PathResolver::split(path)?;
		let parent_ino = self.resolve(&parent_path)?;
		let mut parent = InodeStore::read(&mut self.device, &self.sb, parent_ino)?;
		if parent.file_type != FileType::Directory {
			return Err(Error::NotADirectory);
		}
		if DirEngine::find(&mut self.device, &parent, name).is_ok() {
			return Err(Error::Exists);
		}

		let ino = self.inode_bitmap.allocate(&mut self.device)? as u16;
		let now = now_epoch();
		let (mode, link) = match file_type {
			FileType::Directory => (0o040755, 2),
			_ => (0o100644, 1),
		};
		let mut node = Inode {
			ino,
			valid: true,
			file_type,
			size: 0,
			link,
			direct_ptr: [0; DIRECT_PTRS],
			indirect_ptr: [0; INDIRECT_PTRS],
			vstat: VStat {
				mode,
				uid: unsafe { libc::getuid() },
				gid: unsafe { libc::getgid() },
				nlink: link,
				size: 0,
				blksize: BLOCK_SIZE as u32,
				atime: now,
				mtime: now,
			},
		};

		DirEngine::add(&mut self.device, &self.sb, &mut self.data_bitmap, &mut parent, ino, name)?;

		if file_type == FileType::Directory {
			DirEngine::add(&mut self.device, &self.sb, &mut self.data_bitmap, &mut node, ino, ".")?;
			DirEngine::add(&mut self.device, &self.sb, &mut self.data_bitmap, &mut node, parent_ino, "..")?;
			let mut parent = InodeStore::read(&mut self.device, &self.sb, parent_ino)?;
			parent.link += 1;
			parent.vstat.nlink += 1;
			InodeStore::write(&mut self.device, &self.sb, &parent)?;
		}

		InodeStore::write(&mut self.device, &self.sb, &node)?;
		Ok(())
	}

	/// Removes the empty directory at `path`.
	pub fn path_rmdir(&mut self, path: &str) -> Result<()> {
		log_result("rmdir", path, self.remove_node(path, FileType::Directory))
	}

	/// Removes the file at `path`.
	pub fn path_unlink(&mut self, path: &str) -> Result<()> {
		log_result("unlink", path, self.remove_node(path, FileType::File))
	}

	fn remove_node(&mut self, path: &str, expect: FileType) -> Result<()> {
		let ino = self.resolve(path)?;
		if ino == ROOT_INO {
			return Err(Error::Exists);
		}
		let node = InodeStore::read(&mut self.device, &self.sb, ino)?;
		if node.file_type != expect {
			return Err(if expect == FileType::Directory {
				Error::NotADirectory
			} else {
				Error::IsADirectory
			});
		}
		if expect == FileType::Directory {
			let entries = DirEngine::list(&mut self.device, &node)?;
			if entries.iter().any(|d| !matches!(d.name_str(), "." | "..")) {
				return Err(Error::DirNotEmpty);
			}
		}

		BlockMap::free_all(&mut self.device, &mut self.data_bitmap, &node)?;
		self.inode_bitmap.free(&mut self.device, ino as u64)?;

		let (parent_path, name) = PathResolver::split(path)?;
		let parent_ino = self.resolve(&parent_path)?;
		let mut parent = InodeStore::read(&mut self.device, &self.sb, parent_ino)?;
		DirEngine::remove(&mut self.device, &self.sb, &mut parent, name)?;

		if expect == FileType::Directory {
			let mut parent = InodeStore::read(&mut self.device, &self.sb, parent_ino)?;
			parent.link -= 1;
			parent.vstat.nlink -= 1;
			InodeStore::write(&mut self.device, &self.sb, &parent)?;
		}
		Ok(())
	}

	/// Reads up to `buf.len()` bytes from `path` starting at `offset`.
	/// Returns 0 at end-of-file.
	pub fn path_read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
		log_result("read", path, self.read_inner(path, offset, buf))
	}

	fn read_inner(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
		let ino = self.resolve(path)?;
		let inode = InodeStore::read(&mut self.device, &self.sb, ino)?;
		if inode.file_type == FileType::Directory {
			return Err(Error::IsADirectory);
		}
		if offset >= inode.vstat.size {
			return Ok(0);
		}
		let remaining_in_file = (inode.vstat.size - offset) as usize;
		let want = buf.len().min(remaining_in_file);

		let mut cache = IndirectCache::default();
		let mut copied = 0usize;
		let mut off_in_block = (offset % BLOCK_SIZE as u64) as usize;
		let mut lb = offset / BLOCK_SIZE as u64;
		while copied < want {
			let phys = match BlockMap::lookup(&mut self.device, &inode, lb, &mut cache)? {
				Some(p) => p,
				None => break,
			};
			let block = self.device.read_block(phys)?;
			let n = (BLOCK_SIZE - off_in_block).min(want - copied);
			buf[copied..copied + n].copy_from_slice(&block[off_in_block..off_in_block + n]);
			copied += n;
			lb += 1;
			off_in_block = 0;
		}
		Ok(copied)
	}

	/// Writes `data` to `path` starting at `offset`, allocating blocks on
	/// demand. Returns the number of bytes written.
	pub fn path_write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
		log_result("write", path, self.write_inner(path, offset, data))
	}

	fn write_inner(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
		let ino = self.resolve(path)?;
		let mut inode = InodeStore::read(&mut self.device, &self.sb, ino)?;
		if inode.file_type == FileType::Directory {
			return Err(Error::IsADirectory);
		}
		if offset + data.len() as u64 > layout::MAX_FILE_SIZE {
			return Err(Error::FileTooBig);
		}

		let mut cache = IndirectCache::default();
		let mut written = 0usize;
		let mut off_in_block = (offset % BLOCK_SIZE as u64) as usize;
		let mut lb = offset / BLOCK_SIZE as u64;
		while written < data.len() {
			let phys =
				BlockMap::lookup_or_allocate(&mut self.device, &mut self.data_bitmap, &mut inode, lb, &mut cache)?;
			let mut block = self.device.read_block(phys)?;
			let n = (BLOCK_SIZE - off_in_block).min(data.len() - written);
			block[off_in_block..off_in_block + n].copy_from_slice(&data[written..written + n]);
			self.device.write_block(phys, &block)?;
			written += n;
			lb += 1;
			off_in_block = 0;
		}

		let new_size = (offset + written as u64).max(inode.vstat.size);
		inode.size = new_size as u32;
		inode.vstat.size = new_size;
		inode.vstat.mtime = now_epoch();
		InodeStore::write(&mut self.device, &self.sb, &inode)?;
		Ok(written)
	}
}

fn log_result<T>(op: &str, path: &str, result: Result<T>) -> Result<T> {
	match &result {
		Ok(_) => debug!("{op}: {path}"),
		Err(err) => warn!("{op}: {path}: {err}"),
	}
	result
}

#[cfg(test)]
mod test {
	use tempfile::NamedTempFile;

	use super::*;

	fn mounted() -> (NamedTempFile, Filesystem) {
		let tmp = NamedTempFile::new().unwrap();
		std::fs::remove_file(tmp.path()).unwrap();
		let fs = Filesystem::mount(tmp.path()).unwrap();
		(tmp, fs)
	}

	#[test]
	fn mkfs_then_getattr_root() {
		let (_tmp, mut fs) = mounted();
		let vstat = fs.path_getattr("/").unwrap();
		assert!(vstat.nlink >= 2);
		assert_eq!(vstat.size, 2 * crate::dirent::DIRENT_SIZE as u64);
	}

	#[test]
	fn mkdir_then_readdir_and_getattr() {
		let (_tmp, mut fs) = mounted();
		fs.path_mkdir("/a").unwrap();
		let mut names: Vec<String> = fs.path_readdir("/").unwrap().into_iter().map(|(n, _)| n).collect();
		names.sort();
		assert_eq!(names, vec![".", "..", "a"]);
		let vstat = fs.path_getattr("/a").unwrap();
		assert_eq!(vstat.mode & 0o170000, 0o040000);
	}

	#[test]
	fn create_write_read_round_trips() {
		let (_tmp, mut fs) = mounted();
		fs.path_mkdir("/a").unwrap();
		fs.path_create("/a/b").unwrap();
		let n = fs.path_write("/a/b", 0, b"hello").unwrap();
		assert_eq!(n, 5);
		let mut buf = [0u8; 5];
		let r = fs.path_read("/a/b", 0, &mut buf).unwrap();
		assert_eq!(r, 5);
		assert_eq!(&buf, b"hello");
	}

	#[test]
	fn write_crossing_direct_block_boundary_reads_back_identical() {
		let (_tmp, mut fs) = mounted();
		fs.path_create("/f").unwrap();
		let data: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
		let n = fs.path_write("/f", 0, &data).unwrap();
		assert_eq!(n, data.len());
		let mut buf = vec![0u8; data.len()];
		let r = fs.path_read("/f", 0, &mut buf).unwrap();
		assert_eq!(r, data.len());
		assert_eq!(buf, data);
	}

	#[test]
	fn unlink_then_readdir_only_dots_and_bitmaps_restored() {
		let (_tmp, mut fs) = mounted();
		fs.path_mkdir("/d").unwrap();
		let inodes_before = fs.inode_bitmap.first_free();
		let data_before = fs.data_bitmap.first_free();
		fs.path_create("/d/x").unwrap();
		fs.path_unlink("/d/x").unwrap();
		let mut names: Vec<String> = fs.path_readdir("/d").unwrap().into_iter().map(|(n, _)| n).collect();
		names.sort();
		assert_eq!(names, vec![".", ".."]);
		assert_eq!(fs.inode_bitmap.first_free(), inodes_before);
		assert_eq!(fs.data_bitmap.first_free(), data_before);
	}

	#[test]
	fn rmdir_non_empty_fails() {
		let (_tmp, mut fs) = mounted();
		fs.path_mkdir("/d").unwrap();
		fs.path_create("/d/x").unwrap();
		assert!(matches!(fs.path_rmdir("/d"), Err(Error::DirNotEmpty)));
	}

	#[test]
	fn create_duplicate_fails_with_exists() {
		let (_tmp, mut fs) = mounted();
		fs.path_create("/x").unwrap();
		assert!(matches!(fs.path_create("/x"), Err(Error::Exists)));
	}

	#[test]
	fn read_past_eof_returns_zero() {
		let (_tmp, mut fs) = mounted();
		fs.path_create("/x").unwrap();
		fs.path_write("/x", 0, b"hi").unwrap();
		let mut buf = [0u8; 8];
		assert_eq!(fs.path_read("/x", 100, &mut buf).unwrap(), 0);
	}

	#[test]
	fn write_at_file_too_big_boundary() {
		let (_tmp, mut fs) = mounted();
		fs.path_create("/big").unwrap();
		let at_boundary = layout::MAX_FILE_SIZE;
		assert!(matches!(
			fs.path_write("/big", at_boundary, b"x"),
			Err(Error::FileTooBig)
		));
	}

	#[test]
	fn write_at_first_indirect_block_succeeds() {
		let (_tmp, mut fs) = mounted();
		fs.path_create("/big").unwrap();
		let offset = 16 * BLOCK_SIZE as u64;
		let n = fs.path_write("/big", offset, b"indirect").unwrap();
		assert_eq!(n, 8);
		let mut buf = [0u8; 8];
		assert_eq!(fs.path_read("/big", offset, &mut buf).unwrap(), 8);
		assert_eq!(&buf, b"indirect");
	}

	#[test]
	fn mkdir_increments_parent_nlink() {
		let (_tmp, mut fs) = mounted();
		let before = fs.path_getattr("/").unwrap().nlink;
		fs.path_mkdir("/a").unwrap();
		let after = fs.path_getattr("/").unwrap().nlink;
		assert_eq!(after, before + 1);
	}
}
