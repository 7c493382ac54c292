//! Superblock: global layout constants persisted in block 0.

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};
use crate::layout::{self, BLOCK_SIZE, MAGIC_NUM};

/// On-disk size of the superblock record.
const SUPERBLOCK_SIZE: usize = 4 + 4 + 4 + 8 + 8 + 8 + 8;

/// In-memory copy of the on-disk superblock, held for the life of a mount.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
	pub magic_num: u32,
	pub max_inum: u32,
	pub max_dnum: u32,
	pub i_bitmap_blk: u64,
	pub d_bitmap_blk: u64,
	pub i_start_blk: u64,
	pub d_start_blk: u64,
}

impl Superblock {
	/// The superblock mkfs writes for a freshly formatted diskfile.
	pub fn new() -> Self {
		Self {
			magic_num: MAGIC_NUM,
			max_inum: layout::MAX_INUM as u32,
			max_dnum: layout::MAX_DNUM as u32,
			i_bitmap_blk: layout::INODE_BITMAP_BLOCK,
			d_bitmap_blk: layout::DATA_BITMAP_BLOCK,
			i_start_blk: layout::INODE_REGION_BLOCK,
			d_start_blk: layout::DATA_REGION_BLOCK,
		}
	}

	pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
		let mut buf = [0u8; BLOCK_SIZE];
		let mut w = Writer::new(&mut buf[..SUPERBLOCK_SIZE]);
		w.u32(self.magic_num);
		w.u32(self.max_inum);
		w.u32(self.max_dnum);
		w.u64(self.i_bitmap_blk);
		w.u64(self.d_bitmap_blk);
		w.u64(self.i_start_blk);
		w.u64(self.d_start_blk);
		buf
	}

	/// Parses a superblock from a freshly read block 0, rejecting a bad magic
	/// number with [`Error::CorruptSuperblock`].
	pub fn from_bytes(buf: &[u8; BLOCK_SIZE]) -> Result<Self> {
		let mut r = Reader::new(&buf[..SUPERBLOCK_SIZE]);
		let sb = Self {
			magic_num: r.u32(),
			max_inum: r.u32(),
			max_dnum: r.u32(),
			i_bitmap_blk: r.u64(),
			d_bitmap_blk: r.u64(),
			i_start_blk: r.u64(),
			d_start_blk: r.u64(),
		};
		if sb.magic_num != MAGIC_NUM {
			return Err(Error::CorruptSuperblock);
		}
		Ok(sb)
	}
}

impl Default for Superblock {
	fn default() -> Self {
		Self::new()
	}
}
