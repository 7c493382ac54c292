//! Fixed-size block device: a single backing file, addressed in whole-block
//! reads and writes. Out of scope per the specification's own framing (the
//! `open`/`close`/`read_block`/`write_block` abstraction is an external
//! collaborator) — kept minimal so the engine compiles and runs end to end.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;
use crate::layout::BLOCK_SIZE;

/// A fixed-size, block-addressed random-access file.
pub struct BlockDevice {
	file: File,
}

impl BlockDevice {
	/// Creates a backing file of exactly `num_blocks` blocks, truncating
	/// whatever previously existed at `path`.
	pub fn create(path: &Path, num_blocks: u64) -> Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;
		file.set_len(num_blocks * BLOCK_SIZE as u64)?;
		Ok(Self { file })
	}

	/// Opens an existing backing file without touching its content.
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		Ok(Self { file })
	}

	/// Reads block `blk` into a freshly allocated buffer.
	pub fn read_block(&mut self, blk: u64) -> Result<[u8; BLOCK_SIZE]> {
		let mut buf = [0u8; BLOCK_SIZE];
		self.file.seek(SeekFrom::Start(blk * BLOCK_SIZE as u64))?;
		self.file.read_exact(&mut buf)?;
		Ok(buf)
	}

	/// Writes `buf` to block `blk`.
	pub fn write_block(&mut self, blk: u64, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
		self.file.seek(SeekFrom::Start(blk * BLOCK_SIZE as u64))?;
		self.file.write_all(buf)?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use tempfile::NamedTempFile;

	use super::*;

	#[test]
	fn write_then_read_round_trips() {
		let tmp = NamedTempFile::new().unwrap();
		let mut dev = BlockDevice::create(tmp.path(), 4).unwrap();
		let mut block = [0u8; BLOCK_SIZE];
		block[0] = 0xab;
		block[BLOCK_SIZE - 1] = 0xcd;
		dev.write_block(2, &block).unwrap();
		let back = dev.read_block(2).unwrap();
		assert_eq!(back, block);
	}

	#[test]
	fn fresh_blocks_are_zeroed() {
		let tmp = NamedTempFile::new().unwrap();
		let mut dev = BlockDevice::create(tmp.path(), 2).unwrap();
		assert_eq!(dev.read_block(1).unwrap(), [0u8; BLOCK_SIZE]);
	}
}
