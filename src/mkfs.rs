//! mkfs: initialize a fresh diskfile with superblock, zeroed bitmaps, and an
//! empty root directory.

use std::path::Path;

use log::info;

use crate::bitmap::Bitmap;
use crate::device::BlockDevice;
use crate::dir::DirEngine;
use crate::error::Result;
use crate::inode::{now_epoch, FileType, Inode, InodeStore, VStat};
use crate::layout::{
	BLOCK_SIZE, DATA_BITMAP_BLOCK, DIRECT_PTRS, DISK_SIZE, INDIRECT_PTRS, INODE_BITMAP_BLOCK,
	MAX_BLOCKS, MAX_DNUM, MAX_INUM, SUPERBLOCK_BLOCK,
};
use crate::superblock::Superblock;

/// Formats `path` as a fresh Tiny FS diskfile: writes the superblock, zeroes
/// both bitmaps, allocates the root inode (inode number 0, under the
/// lowest-free policy), and registers `.`/`..` inside it.
pub fn format(path: &Path) -> Result<()> {
	info!("formatting {} ({MAX_BLOCKS} blocks, {DISK_SIZE} bytes)", path.display());
	let mut device = BlockDevice::create(path, MAX_BLOCKS)?;

	let sb = Superblock::new();
	device.write_block(SUPERBLOCK_BLOCK, &sb.to_bytes())?;

	let mut inode_bitmap = Bitmap::format(&mut device, INODE_BITMAP_BLOCK, MAX_INUM, 0)?;
	let mut data_bitmap = Bitmap::format(&mut device, DATA_BITMAP_BLOCK, MAX_DNUM, sb.d_start_blk)?;

	let root_ino = inode_bitmap.allocate(&mut device)? as u16;
	debug_assert_eq!(root_ino, 0, "root inode must be the lowest-free slot");

	let now = now_epoch();
	let mut root = Inode {
		ino: root_ino,
		valid: true,
		file_type: FileType::Directory,
		size: 0,
		link: 2,
		direct_ptr: [0; DIRECT_PTRS],
		indirect_ptr: [0; INDIRECT_PTRS],
		vstat: VStat {
			mode: 0o040755,
			uid: unsafe { libc::getuid() },
			gid: unsafe { libc::getgid() },
			nlink: 2,
			size: 0,
			blksize: BLOCK_SIZE as u32,
			atime: now,
			mtime: now,
		},
	};

	DirEngine::add(&mut device, &sb, &mut data_bitmap, &mut root, root_ino, ".")?;
	DirEngine::add(&mut device, &sb, &mut data_bitmap, &mut root, root_ino, "..")?;

	InodeStore::write(&mut device, &sb, &root)?;
	info!("root directory ready (inode {root_ino})");
	Ok(())
}

#[cfg(test)]
mod test {
	use tempfile::NamedTempFile;

	use super::*;
	use crate::dir::DirEngine;

	#[test]
	fn fresh_diskfile_has_root_with_dot_entries() {
		let tmp = NamedTempFile::new().unwrap();
		format(tmp.path()).unwrap();

		let mut device = BlockDevice::open(tmp.path()).unwrap();
		let sb = Superblock::from_bytes(&device.read_block(SUPERBLOCK_BLOCK).unwrap()).unwrap();
		let root = InodeStore::read(&mut device, &sb, 0).unwrap();
		assert_eq!(root.file_type, FileType::Directory);
		assert!(root.vstat.nlink >= 2);
		assert_eq!(root.vstat.size, 2 * crate::dirent::DIRENT_SIZE as u64);

		let entries = DirEngine::list(&mut device, &root).unwrap();
		let names: Vec<&str> = entries.iter().map(|d| d.name_str()).collect();
		assert_eq!(names, vec![".", ".."]);
	}
}
