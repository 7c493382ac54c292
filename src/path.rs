//! Path resolver: walk a '/'-separated absolute path from the root inode to
//! its target inode number.

use crate::device::BlockDevice;
use crate::dir::DirEngine;
use crate::dirent::NAME_MAX;
use crate::error::{Error, Result};
use crate::inode::{FileType, InodeStore};
use crate::layout::MAX_PATH_LEN;
use crate::superblock::Superblock;

pub struct PathResolver;

impl PathResolver {
	/// Resolves an absolute path to its inode number, starting from
	/// `root_ino`. The path `"/"` resolves to `root_ino` without looking at
	/// any directory entry.
	pub fn resolve(device: &mut BlockDevice, sb: &Superblock, root_ino: u16, path: &str) -> Result<u16> {
		if path.len() > MAX_PATH_LEN {
			return Err(Error::NameTooLong);
		}
		let rest = path.strip_prefix('/').ok_or(Error::NotFound)?;
		if rest.is_empty() {
			return Ok(root_ino);
		}

		let mut current = root_ino;
		for component in rest.split('/') {
			if component.is_empty() {
				continue;
			}
			if component.len() > NAME_MAX {
				return Err(Error::NameTooLong);
			}
			let inode = InodeStore::read(device, sb, current)?;
			if inode.file_type != FileType::Directory {
				return Err(Error::NotADirectory);
			}
			let dirent = DirEngine::find(device, &inode, component)?;
			current = dirent.ino;
		}
		Ok(current)
	}

	/// Splits a path into its parent path and final component, e.g.
	/// `"/a/b"` -> `("/a", "b")`, `"/a"` -> `("/", "a")`. The root path has no
	/// parent and cannot be split.
	pub fn split(path: &str) -> Result<(String, &str)> {
		let trimmed = path.trim_end_matches('/');
		if trimmed.is_empty() {
			// Splitting "/" itself: there is no parent to attach a new entry to.
			return Err(Error::Exists);
		}
		let idx = trimmed.rfind('/').ok_or(Error::NotFound)?;
		let parent = if idx == 0 { "/".to_string() } else { trimmed[..idx].to_string() };
		let name = &trimmed[idx + 1..];
		Ok((parent, name))
	}
}

#[cfg(test)]
mod test {
	use tempfile::NamedTempFile;

	use super::*;
	use crate::bitmap::Bitmap;
	use crate::layout::{DATA_BITMAP_BLOCK, DIRECT_PTRS, INDIRECT_PTRS, MAX_DNUM};
	use crate::inode::{Inode, VStat};

	fn setup() -> (NamedTempFile, BlockDevice, Superblock, Bitmap, u16) {
		let tmp = NamedTempFile::new().unwrap();
		let mut device = BlockDevice::create(tmp.path(), 20000).unwrap();
		let sb = Superblock::new();
		device.write_block(crate::layout::SUPERBLOCK_BLOCK, &sb.to_bytes()).unwrap();
		let mut data_bitmap = Bitmap::format(&mut device, DATA_BITMAP_BLOCK, MAX_DNUM, sb.d_start_blk).unwrap();

		let mut root = Inode {
			ino: 0,
			valid: true,
			file_type: FileType::Directory,
			size: 0,
			link: 2,
			direct_ptr: [0; DIRECT_PTRS],
			indirect_ptr: [0; INDIRECT_PTRS],
			vstat: VStat {
				mode: 0o40755,
				uid: 0,
				gid: 0,
				nlink: 2,
				size: 0,
				blksize: 4096,
				atime: (0, 0),
				mtime: (0, 0),
			},
		};
		DirEngine::add(&mut device, &sb, &mut data_bitmap, &mut root, 0, ".").unwrap();
		DirEngine::add(&mut device, &sb, &mut data_bitmap, &mut root, 0, "..").unwrap();

		let mut child = Inode { ino: 1, link: 2, ..root };
		child.direct_ptr = [0; DIRECT_PTRS];
		child.indirect_ptr = [0; INDIRECT_PTRS];
		child.size = 0;
		child.vstat.size = 0;
		child.vstat.nlink = 2;
		DirEngine::add(&mut device, &sb, &mut data_bitmap, &mut child, 1, ".").unwrap();
		DirEngine::add(&mut device, &sb, &mut data_bitmap, &mut child, 0, "..").unwrap();
		InodeStore::write(&mut device, &sb, &child).unwrap();

		let mut root = InodeStore::read(&mut device, &sb, 0).unwrap();
		DirEngine::add(&mut device, &sb, &mut data_bitmap, &mut root, 1, "sub").unwrap();

		(tmp, device, sb, data_bitmap, 0)
	}

	#[test]
	fn root_resolves_without_lookup() {
		let (_tmp, mut device, sb, _bm, root) = setup();
		assert_eq!(PathResolver::resolve(&mut device, &sb, root, "/").unwrap(), root);
	}

	#[test]
	fn nested_path_resolves() {
		let (_tmp, mut device, sb, _bm, root) = setup();
		assert_eq!(PathResolver::resolve(&mut device, &sb, root, "/sub").unwrap(), 1);
	}

	#[test]
	fn missing_component_not_found() {
		let (_tmp, mut device, sb, _bm, root) = setup();
		assert!(matches!(
			PathResolver::resolve(&mut device, &sb, root, "/nope"),
			Err(Error::NotFound)
		));
	}

	#[test]
	fn component_too_long() {
		let (_tmp, mut device, sb, _bm, root) = setup();
		let long = format!("/{}", "x".repeat(NAME_MAX + 1));
		assert!(matches!(
			PathResolver::resolve(&mut device, &sb, root, &long),
			Err(Error::NameTooLong)
		));
	}

	#[test]
	fn split_nested_path() {
		let (parent, name) = PathResolver::split("/a/b").unwrap();
		assert_eq!(parent, "/a");
		assert_eq!(name, "b");
	}

	#[test]
	fn split_top_level_path() {
		let (parent, name) = PathResolver::split("/a").unwrap();
		assert_eq!(parent, "/");
		assert_eq!(name, "a");
	}
}
