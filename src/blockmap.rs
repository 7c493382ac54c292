//! Block map: translate a file inode's logical byte offset into a physical
//! block number, allocating data and indirect blocks on demand as the file
//! grows.
//!
//! Logical block `lb < 16` is a direct pointer; `16 <= lb < 16 + 8·P` falls
//! in the indirect region, where `k = (lb - 16) / P` selects the indirect
//! block and `m = (lb - 16) % P` selects the pointer within it.

use crate::bitmap::Bitmap;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::inode::Inode;
use crate::layout::{BLOCK_SIZE, DIRECT_PTRS, INDIRECT_PTRS, PTRS_PER_INDIRECT};

fn max_logical_block() -> u64 {
	DIRECT_PTRS as u64 + INDIRECT_PTRS as u64 * PTRS_PER_INDIRECT as u64
}

/// Caches the most recently touched indirect block so consecutive logical
/// blocks within the same indirect range don't re-read it from the device.
#[derive(Default)]
pub struct IndirectCache {
	loaded: Option<(usize, [u8; BLOCK_SIZE])>,
}

impl IndirectCache {
	fn get(&mut self, device: &mut BlockDevice, k: usize, blk: u64) -> Result<&mut [u8; BLOCK_SIZE]> {
		let stale = !matches!(&self.loaded, Some((lk, _)) if *lk == k);
		if stale {
			self.loaded = Some((k, device.read_block(blk)?));
		}
		Ok(&mut self.loaded.as_mut().unwrap().1)
	}

	fn invalidate(&mut self) {
		self.loaded = None;
	}
}

pub struct BlockMap;

impl BlockMap {
	/// Physical block backing logical block `lb`, or `None` for a hole.
	pub fn lookup(
		device: &mut BlockDevice,
		inode: &Inode,
		lb: u64,
		cache: &mut IndirectCache,
	) -> Result<Option<u64>> {
		if lb >= max_logical_block() {
			return Err(Error::FileTooBig);
		}
		if lb < DIRECT_PTRS as u64 {
			let ptr = inode.direct_ptr[lb as usize];
			return Ok((ptr != 0).then_some(ptr as u64));
		}
		let rel = lb - DIRECT_PTRS as u64;
		let k = (rel / PTRS_PER_INDIRECT as u64) as usize;
		let m = (rel % PTRS_PER_INDIRECT as u64) as usize;
		let iptr = inode.indirect_ptr[k];
		if iptr == 0 {
			return Ok(None);
		}
		let iblock = cache.get(device, k, iptr as u64)?;
		let ptr = read_ptr(iblock, m);
		Ok((ptr != 0).then_some(ptr as u64))
	}

	/// Like [`BlockMap::lookup`] but allocates the direct slot, indirect
	/// block, and/or data block on demand, persisting every chain it
	/// touches. Fails with `FileTooBig` past the maximum addressable block.
	pub fn lookup_or_allocate(
		device: &mut BlockDevice,
		data_bitmap: &mut Bitmap,
		inode: &mut Inode,
		lb: u64,
		cache: &mut IndirectCache,
	) -> Result<u64> {
		if lb >= max_logical_block() {
			return Err(Error::FileTooBig);
		}
		if lb < DIRECT_PTRS as u64 {
			let idx = lb as usize;
			if inode.direct_ptr[idx] == 0 {
				let blk = data_bitmap.allocate(device)?;
				device.write_block(blk, &[0u8; BLOCK_SIZE])?;
				inode.direct_ptr[idx] = blk as u32;
			}
			return Ok(inode.direct_ptr[idx] as u64);
		}

		let rel = lb - DIRECT_PTRS as u64;
		let k = (rel / PTRS_PER_INDIRECT as u64) as usize;
		let m = (rel % PTRS_PER_INDIRECT as u64) as usize;

		if inode.indirect_ptr[k] == 0 {
			let iblk = data_bitmap.allocate(device)?;
			device.write_block(iblk, &[0u8; BLOCK_SIZE])?;
			inode.indirect_ptr[k] = iblk as u32;
			cache.invalidate();
		}

		let iblock = cache.get(device, k, inode.indirect_ptr[k] as u64)?;
		let mut ptr = read_ptr(iblock, m);
		if ptr == 0 {
			let blk = data_bitmap.allocate(device)?;
			device.write_block(blk, &[0u8; BLOCK_SIZE])?;
			ptr = blk as u32;
			let iblock = cache.get(device, k, inode.indirect_ptr[k] as u64)?;
			write_ptr(iblock, m, ptr);
			let snapshot = *iblock;
			device.write_block(inode.indirect_ptr[k] as u64, &snapshot)?;
		}
		Ok(ptr as u64)
	}

	/// Frees every data and indirect block `inode` references via the data
	/// bitmap. Does not touch the inode bitmap.
	pub fn free_all(device: &mut BlockDevice, data_bitmap: &mut Bitmap, inode: &Inode) -> Result<()> {
		for &ptr in &inode.direct_ptr {
			if ptr != 0 {
				data_bitmap.free(device, ptr as u64)?;
			}
		}
		for &iptr in &inode.indirect_ptr {
			if iptr == 0 {
				continue;
			}
			let iblock = device.read_block(iptr as u64)?;
			for m in 0..PTRS_PER_INDIRECT {
				let ptr = read_ptr(&iblock, m);
				if ptr != 0 {
					data_bitmap.free(device, ptr as u64)?;
				}
			}
			data_bitmap.free(device, iptr as u64)?;
		}
		Ok(())
	}
}

fn read_ptr(block: &[u8; BLOCK_SIZE], slot: usize) -> u32 {
	let off = slot * 4;
	u32::from_le_bytes(block[off..off + 4].try_into().unwrap())
}

fn write_ptr(block: &mut [u8; BLOCK_SIZE], slot: usize, value: u32) {
	let off = slot * 4;
	block[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod test {
	use tempfile::NamedTempFile;

	use super::*;
	use crate::inode::{FileType, VStat};
	use crate::superblock::Superblock;

	fn blank_inode() -> Inode {
		Inode {
			ino: 1,
			valid: true,
			file_type: FileType::File,
			size: 0,
			link: 1,
			direct_ptr: [0; DIRECT_PTRS],
			indirect_ptr: [0; INDIRECT_PTRS],
			vstat: VStat {
				mode: 0o100644,
				uid: 0,
				gid: 0,
				nlink: 1,
				size: 0,
				blksize: BLOCK_SIZE as u32,
				atime: (0, 0),
				mtime: (0, 0),
			},
		}
	}

	fn setup() -> (NamedTempFile, BlockDevice, Bitmap) {
		let tmp = NamedTempFile::new().unwrap();
		let mut device = BlockDevice::create(tmp.path(), 20000).unwrap();
		let sb = Superblock::new();
		let bitmap = Bitmap::format(&mut device, crate::layout::DATA_BITMAP_BLOCK, crate::layout::MAX_DNUM, sb.d_start_blk).unwrap();
		(tmp, device, bitmap)
	}

	#[test]
	fn direct_block_allocates_on_demand() {
		let (_tmp, mut device, mut bm) = setup();
		let mut inode = blank_inode();
		let mut cache = IndirectCache::default();
		assert!(BlockMap::lookup(&mut device, &inode, 0, &mut cache).unwrap().is_none());
		let blk = BlockMap::lookup_or_allocate(&mut device, &mut bm, &mut inode, 0, &mut cache).unwrap();
		assert_ne!(blk, 0);
		assert_eq!(BlockMap::lookup(&mut device, &inode, 0, &mut cache).unwrap(), Some(blk));
	}

	#[test]
	fn indirect_block_allocates_chain() {
		let (_tmp, mut device, mut bm) = setup();
		let mut inode = blank_inode();
		let mut cache = IndirectCache::default();
		let lb = DIRECT_PTRS as u64; // first indirect-region logical block
		let blk = BlockMap::lookup_or_allocate(&mut device, &mut bm, &mut inode, lb, &mut cache).unwrap();
		assert_ne!(inode.indirect_ptr[0], 0);
		assert_eq!(BlockMap::lookup(&mut device, &inode, lb, &mut cache).unwrap(), Some(blk));
	}

	#[test]
	fn beyond_max_block_fails() {
		let (_tmp, mut device, mut bm) = setup();
		let mut inode = blank_inode();
		let mut cache = IndirectCache::default();
		let past = max_logical_block();
		assert!(matches!(
			BlockMap::lookup_or_allocate(&mut device, &mut bm, &mut inode, past, &mut cache),
			Err(Error::FileTooBig)
		));
	}

	#[test]
	fn free_all_releases_every_referenced_block() {
		let (_tmp, mut device, mut bm) = setup();
		let mut inode = blank_inode();
		let mut cache = IndirectCache::default();
		let direct = BlockMap::lookup_or_allocate(&mut device, &mut bm, &mut inode, 0, &mut cache).unwrap();
		let indirect_data = BlockMap::lookup_or_allocate(&mut device, &mut bm, &mut inode, DIRECT_PTRS as u64, &mut cache).unwrap();
		assert!(bm.is_allocated(direct));
		assert!(bm.is_allocated(indirect_data));
		BlockMap::free_all(&mut device, &mut bm, &inode).unwrap();
		assert!(!bm.is_allocated(direct));
		assert!(!bm.is_allocated(indirect_data));
		assert!(!bm.is_allocated(inode.indirect_ptr[0] as u64));
	}
}
