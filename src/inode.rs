//! Inode record and the inode store: read/write inode records at
//! inode-number granularity.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::codec::{Reader, Writer};
use crate::device::BlockDevice;
use crate::error::Result;
use crate::layout::{self, BLOCK_SIZE, DIRECT_PTRS, INDIRECT_PTRS};
use crate::superblock::Superblock;

/// Reserved file-type discriminants (spec §3: FILE=0, DIRECTORY=1, HARDLINK=2, SYMLINK=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
	File = 0,
	Directory = 1,
	HardLink = 2,
	SymLink = 3,
}

impl FileType {
	fn to_u8(self) -> u8 {
		self as u8
	}

	fn from_u8(v: u8) -> Self {
		match v {
			0 => FileType::File,
			1 => FileType::Directory,
			2 => FileType::HardLink,
			_ => FileType::SymLink,
		}
	}
}

/// Embedded POSIX `stat` fields, mirrored on every `getattr`.
#[derive(Debug, Clone, Copy)]
pub struct VStat {
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub nlink: u32,
	pub size: u64,
	pub blksize: u32,
	pub atime: (i64, u32),
	pub mtime: (i64, u32),
}

impl VStat {
	pub const SIZE: usize = 4 + 4 + 4 + 4 + 8 + 4 + (8 + 4) + (8 + 4);

	fn write(&self, w: &mut Writer) {
		w.u32(self.mode);
		w.u32(self.uid);
		w.u32(self.gid);
		w.u32(self.nlink);
		w.u64(self.size);
		w.u32(self.blksize);
		w.i64(self.atime.0);
		w.u32(self.atime.1);
		w.i64(self.mtime.0);
		w.u32(self.mtime.1);
	}

	fn read(r: &mut Reader) -> Self {
		Self {
			mode: r.u32(),
			uid: r.u32(),
			gid: r.u32(),
			nlink: r.u32(),
			size: r.u64(),
			blksize: r.u32(),
			atime: (r.i64(), r.u32()),
			mtime: (r.i64(), r.u32()),
		}
	}
}

/// Returns the current time as `(seconds, nanoseconds)` since the Unix epoch.
pub fn now_epoch() -> (i64, u32) {
	let d = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::ZERO);
	(d.as_secs() as i64, d.subsec_nanos())
}

/// On-disk size of one inode record.
pub const INODE_SIZE: usize =
	2 + 1 + 1 + 4 + 4 + DIRECT_PTRS * 4 + INDIRECT_PTRS * 4 + VStat::SIZE;

/// A filesystem object: a file, directory, or (reserved, unimplemented) link.
#[derive(Debug, Clone, Copy)]
pub struct Inode {
	pub ino: u16,
	pub valid: bool,
	pub file_type: FileType,
	pub size: u32,
	pub link: u32,
	pub direct_ptr: [u32; DIRECT_PTRS],
	pub indirect_ptr: [u32; INDIRECT_PTRS],
	pub vstat: VStat,
}

impl Inode {
	pub fn to_bytes(&self) -> [u8; INODE_SIZE] {
		let mut buf = [0u8; INODE_SIZE];
		let mut w = Writer::new(&mut buf);
		w.u16(self.ino);
		w.u8(self.valid as u8);
		w.u8(self.file_type.to_u8());
		w.u32(self.size);
		w.u32(self.link);
		for &p in &self.direct_ptr {
			w.u32(p);
		}
		for &p in &self.indirect_ptr {
			w.u32(p);
		}
		self.vstat.write(&mut w);
		buf
	}

	pub fn from_bytes(buf: &[u8]) -> Self {
		let mut r = Reader::new(buf);
		let ino = r.u16();
		let valid = r.u8() != 0;
		let file_type = FileType::from_u8(r.u8());
		let size = r.u32();
		let link = r.u32();
		let mut direct_ptr = [0u32; DIRECT_PTRS];
		for p in &mut direct_ptr {
			*p = r.u32();
		}
		let mut indirect_ptr = [0u32; INDIRECT_PTRS];
		for p in &mut indirect_ptr {
			*p = r.u32();
		}
		let vstat = VStat::read(&mut r);
		Self {
			ino,
			valid,
			file_type,
			size,
			link,
			direct_ptr,
			indirect_ptr,
			vstat,
		}
	}
}

/// Reads and writes inode records at inode-number granularity. Does not
/// consult the bitmap; callers are responsible for bitmap consistency.
pub struct InodeStore;

impl InodeStore {
	pub fn read(device: &mut BlockDevice, sb: &Superblock, ino: u16) -> Result<Inode> {
		let per_block = layout::INODES_PER_BLOCK;
		let blk = sb.i_start_blk + (ino as u64) / per_block as u64;
		let offset = (ino as usize % per_block) * INODE_SIZE;
		let block = device.read_block(blk)?;
		Ok(Inode::from_bytes(&block[offset..offset + INODE_SIZE]))
	}

	pub fn write(device: &mut BlockDevice, sb: &Superblock, inode: &Inode) -> Result<()> {
		let per_block = layout::INODES_PER_BLOCK;
		let blk = sb.i_start_blk + (inode.ino as u64) / per_block as u64;
		let offset = (inode.ino as usize % per_block) * INODE_SIZE;
		let mut block = device.read_block(blk)?;
		block[offset..offset + INODE_SIZE].copy_from_slice(&inode.to_bytes());
		device.write_block(blk, &block)?;
		Ok(())
	}
}

const _: () = assert!(INODE_SIZE <= BLOCK_SIZE);
