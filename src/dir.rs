//! Directory engine: insert/find/remove entries in an inode's data blocks.
//!
//! A directory's content is the concatenation of valid dirents across its
//! data blocks, in no particular order. All three operations share the same
//! traversal skeleton: direct pointers 0..15, then indirect pointers 0..7
//! (each indirect block expanding into up to `PTRS_PER_INDIRECT` children).

use crate::bitmap::Bitmap;
use crate::device::BlockDevice;
use crate::dirent::{Dirent, DIRENT_SIZE};
use crate::error::{Error, Result};
use crate::inode::{Inode, InodeStore};
use crate::layout::{BLOCK_SIZE, DIRECT_PTRS, DIRENTS_PER_BLOCK, INDIRECT_PTRS, PTRS_PER_INDIRECT};
use crate::superblock::Superblock;

pub struct DirEngine;

impl DirEngine {
	/// Finds `name` among `inode`'s entries. Does not allocate.
	pub fn find(device: &mut BlockDevice, inode: &Inode, name: &str) -> Result<Dirent> {
		for &ptr in &inode.direct_ptr {
			if ptr == 0 {
				continue;
			}
			if let Some(d) = Self::find_in_block(device, ptr as u64, name)? {
				return Ok(d);
			}
		}
		for &iptr in &inode.indirect_ptr {
			if iptr == 0 {
				continue;
			}
			let iblock = device.read_block(iptr as u64)?;
			for m in 0..PTRS_PER_INDIRECT {
				let ptr = read_ptr(&iblock, m);
				if ptr == 0 {
					continue;
				}
				if let Some(d) = Self::find_in_block(device, ptr as u64, name)? {
					return Ok(d);
				}
			}
		}
		Err(Error::NotFound)
	}

	fn find_in_block(device: &mut BlockDevice, blk: u64, name: &str) -> Result<Option<Dirent>> {
		let block = device.read_block(blk)?;
		for slot in 0..DIRENTS_PER_BLOCK {
			let off = slot * DIRENT_SIZE;
			let d = Dirent::from_bytes(&block[off..off + DIRENT_SIZE]);
			if d.valid && d.name_str() == name {
				return Ok(Some(d));
			}
		}
		Ok(None)
	}

	/// All valid entries across `inode`'s blocks, in traversal order (direct
	/// then indirect). Used by `readdir` and by the non-empty-directory check
	/// in `rmdir`.
	pub fn list(device: &mut BlockDevice, inode: &Inode) -> Result<Vec<Dirent>> {
		let mut out = Vec::new();
		for &ptr in &inode.direct_ptr {
			if ptr != 0 {
				Self::collect_block(device, ptr as u64, &mut out)?;
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
					Self::collect_block(device, ptr as u64, &mut out)?;
				}
			}
		}
		Ok(out)
	}

	fn collect_block(device: &mut BlockDevice, blk: u64, out: &mut Vec<Dirent>) -> Result<()> {
		let block = device.read_block(blk)?;
		for slot in 0..DIRENTS_PER_BLOCK {
			let off = slot * DIRENT_SIZE;
			let d = Dirent::from_bytes(&block[off..off + DIRENT_SIZE]);
			if d.valid {
				out.push(d);
			}
		}
		Ok(())
	}

	/// Inserts `(child_ino, name)` into `inode`, persisting the directory
	/// inode on success. Fails with `Exists` if the name is already present,
	/// `DirFull` if every direct and indirect block is occupied.
	pub fn add(
		device: &mut BlockDevice,
		sb: &Superblock,
		data_bitmap: &mut Bitmap,
		inode: &mut Inode,
		child_ino: u16,
		name: &str,
	) -> Result<()> {
		if Self::find(device, inode, name).is_ok() {
			return Err(Error::Exists);
		}
		let entry = Dirent::new(child_ino, name)?;

		for slot in 0..DIRECT_PTRS {
			if Self::try_add_direct(device, data_bitmap, &mut inode.direct_ptr[slot], &entry)? {
				inode.size += DIRENT_SIZE as u32;
				inode.vstat.size = inode.size as u64;
				InodeStore::write(device, sb, inode)?;
				return Ok(());
			}
		}
		for slot in 0..INDIRECT_PTRS {
			if Self::try_add_indirect(device, data_bitmap, &mut inode.indirect_ptr[slot], &entry)? {
				inode.size += DIRENT_SIZE as u32;
				inode.vstat.size = inode.size as u64;
				InodeStore::write(device, sb, inode)?;
				return Ok(());
			}
		}
		Err(Error::DirFull)
	}

	/// Tries to place `entry` in the block referenced by `*ptr`, allocating a
	/// fresh block if `*ptr` is a hole. Returns whether the entry was placed.
	fn try_add_direct(
		device: &mut BlockDevice,
		data_bitmap: &mut Bitmap,
		ptr: &mut u32,
		entry: &Dirent,
	) -> Result<bool> {
		if *ptr == 0 {
			let blk = data_bitmap.allocate(device)?;
			let mut block = [0u8; BLOCK_SIZE];
			block[..DIRENT_SIZE].copy_from_slice(&entry.to_bytes());
			device.write_block(blk, &block)?;
			*ptr = blk as u32;
			return Ok(true);
		}
		Self::try_place_in_existing(device, *ptr as u64, entry)
	}

	fn try_add_indirect(
		device: &mut BlockDevice,
		data_bitmap: &mut Bitmap,
		iptr: &mut u32,
		entry: &Dirent,
	) -> Result<bool> {
		if *iptr == 0 {
			let data_blk = data_bitmap.allocate(device)?;
			let mut block = [0u8; BLOCK_SIZE];
			block[..DIRENT_SIZE].copy_from_slice(&entry.to_bytes());
			device.write_block(data_blk, &block)?;

			let new_iptr = data_bitmap.allocate(device)?;
			let mut iblock = [0u8; BLOCK_SIZE];
			write_ptr(&mut iblock, 0, data_blk as u32);
			device.write_block(new_iptr, &iblock)?;

			*iptr = new_iptr as u32;
			return Ok(true);
		}
		let mut iblock = device.read_block(*iptr as u64)?;
		for m in 0..PTRS_PER_INDIRECT {
			let ptr = read_ptr(&iblock, m);
			if ptr == 0 {
				let data_blk = data_bitmap.allocate(device)?;
				let mut block = [0u8; BLOCK_SIZE];
				block[..DIRENT_SIZE].copy_from_slice(&entry.to_bytes());
				device.write_block(data_blk, &block)?;
				write_ptr(&mut iblock, m, data_blk as u32);
				device.write_block(*iptr as u64, &iblock)?;
				return Ok(true);
			}
			if Self::try_place_in_existing(device, ptr as u64, entry)? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	fn try_place_in_existing(device: &mut BlockDevice, blk: u64, entry: &Dirent) -> Result<bool> {
		let mut block = device.read_block(blk)?;
		for slot in 0..DIRENTS_PER_BLOCK {
			let off = slot * DIRENT_SIZE;
			let d = Dirent::from_bytes(&block[off..off + DIRENT_SIZE]);
			if !d.valid {
				block[off..off + DIRENT_SIZE].copy_from_slice(&entry.to_bytes());
				device.write_block(blk, &block)?;
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Removes the entry named `name` from `inode`, persisting the directory
	/// inode on success. Does not shrink or reclaim now-empty directory
	/// blocks (a deliberate simplification; see the design notes).
	pub fn remove(
		device: &mut BlockDevice,
		sb: &Superblock,
		inode: &mut Inode,
		name: &str,
	) -> Result<()> {
		for &ptr in &inode.direct_ptr.clone() {
			if ptr == 0 {
				continue;
			}
			if Self::try_remove_in_block(device, ptr as u64, name)? {
				return Self::finish_remove(device, sb, inode);
			}
		}
		for &iptr in &inode.indirect_ptr.clone() {
			if iptr == 0 {
				continue;
			}
			let iblock = device.read_block(iptr as u64)?;
			for m in 0..PTRS_PER_INDIRECT {
				let ptr = read_ptr(&iblock, m);
				if ptr == 0 {
					continue;
				}
				if Self::try_remove_in_block(device, ptr as u64, name)? {
					return Self::finish_remove(device, sb, inode);
				}
			}
		}
		Err(Error::NotFound)
	}

	fn finish_remove(device: &mut BlockDevice, sb: &Superblock, inode: &mut Inode) -> Result<()> {
		inode.size -= DIRENT_SIZE as u32;
		inode.vstat.size = inode.size as u64;
		InodeStore::write(device, sb, inode)
	}

	fn try_remove_in_block(device: &mut BlockDevice, blk: u64, name: &str) -> Result<bool> {
		let mut block = device.read_block(blk)?;
		for slot in 0..DIRENTS_PER_BLOCK {
			let off = slot * DIRENT_SIZE;
			let mut d = Dirent::from_bytes(&block[off..off + DIRENT_SIZE]);
			if d.valid && d.name_str() == name {
				d.valid = false;
				block[off..off + DIRENT_SIZE].copy_from_slice(&d.to_bytes());
				device.write_block(blk, &block)?;
				return Ok(true);
			}
		}
		Ok(false)
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
