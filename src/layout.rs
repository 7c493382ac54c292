//! Compile-time on-disk layout constants.
//!
//! Everything here is derived from three free knobs (`BLOCK_SIZE`, `MAX_INUM`,
//! `MAX_DNUM`) plus the serialized record sizes in [`crate::inode`] and
//! [`crate::dirent`], so the layout cannot drift out of internal consistency
//! if a knob changes.

use crate::dirent::DIRENT_SIZE;
use crate::inode::INODE_SIZE;

/// Bytes per block; all device I/O is in units of this size.
pub const BLOCK_SIZE: usize = 4096;

/// Magic number stamped into the superblock at mkfs time ("TFS1" in ASCII).
pub const MAGIC_NUM: u32 = 0x5446_5331;

/// Maximum number of inodes the filesystem can hold.
pub const MAX_INUM: usize = 1024;

/// Maximum number of data blocks the filesystem can hold.
pub const MAX_DNUM: usize = 16384;

/// Number of direct block pointers in an inode.
pub const DIRECT_PTRS: usize = 16;
/// Number of indirect block pointers in an inode.
pub const INDIRECT_PTRS: usize = 8;

/// Block index of the superblock.
pub const SUPERBLOCK_BLOCK: u64 = 0;
/// Block index of the inode bitmap.
pub const INODE_BITMAP_BLOCK: u64 = 1;
/// Block index of the data bitmap.
pub const DATA_BITMAP_BLOCK: u64 = 2;
/// Block index where the inode region begins.
pub const INODE_REGION_BLOCK: u64 = 3;

/// Inode records packed per block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// Dirent records packed per block.
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;
/// Absolute block pointers packed into one indirect block.
pub const PTRS_PER_INDIRECT: usize = BLOCK_SIZE / 4;

/// Number of blocks occupied by the inode region.
pub const INODE_REGION_BLOCKS: u64 = div_ceil(MAX_INUM, INODES_PER_BLOCK) as u64;

/// Block index where the data region begins.
pub const DATA_REGION_BLOCK: u64 = INODE_REGION_BLOCK + INODE_REGION_BLOCKS;

/// Total number of blocks the backing diskfile must hold.
pub const MAX_BLOCKS: u64 = DATA_REGION_BLOCK + MAX_DNUM as u64;

/// Total size in bytes of the backing diskfile.
pub const DISK_SIZE: u64 = MAX_BLOCKS * BLOCK_SIZE as u64;

/// Maximum addressable file size through the two-level block map:
/// `16·BLOCK_SIZE + 8·BLOCK_SIZE·P`.
pub const MAX_FILE_SIZE: u64 = (DIRECT_PTRS as u64) * BLOCK_SIZE as u64
	+ (INDIRECT_PTRS as u64) * (PTRS_PER_INDIRECT as u64) * BLOCK_SIZE as u64;

/// Maximum length, in bytes, of a resolvable path (spec §4.6).
pub const MAX_PATH_LEN: usize = 4096;

const fn div_ceil(a: usize, b: usize) -> usize {
	a.div_ceil(b)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bitmaps_fit_in_one_block() {
		assert!(MAX_INUM <= BLOCK_SIZE * 8);
		assert!(MAX_DNUM <= BLOCK_SIZE * 8);
	}

	#[test]
	fn max_file_size_matches_two_level_map() {
		assert_eq!(MAX_FILE_SIZE, 16 * 4096 + 8 * 1024 * 4096);
	}

	#[test]
	fn data_region_follows_inode_region() {
		assert!(DATA_REGION_BLOCK > INODE_REGION_BLOCK);
		assert_eq!(MAX_BLOCKS, DATA_REGION_BLOCK + MAX_DNUM as u64);
	}
}
