//! Directory entry (`dirent`) record: `(ino, valid, len, name)`.

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};

/// Maximum byte length of a single path component / dirent name.
pub const NAME_MAX: usize = 28;

/// On-disk size of one dirent record: 2 (ino) + 1 (valid) + 1 (len) + NAME_MAX.
pub const DIRENT_SIZE: usize = 2 + 1 + 1 + NAME_MAX;

/// One slot in a directory's data blocks.
#[derive(Debug, Clone, Copy)]
pub struct Dirent {
	pub ino: u16,
	pub valid: bool,
	pub len: u8,
	pub name: [u8; NAME_MAX],
}

impl Dirent {
	/// Builds a valid dirent for `name`, which must fit in [`NAME_MAX`] bytes.
	pub fn new(ino: u16, name: &str) -> Result<Self> {
		if name.len() > NAME_MAX {
			return Err(Error::NameTooLong);
		}
		let mut buf = [0u8; NAME_MAX];
		buf[..name.len()].copy_from_slice(name.as_bytes());
		Ok(Self {
			ino,
			valid: true,
			len: name.len() as u8,
			name: buf,
		})
	}

	/// The dirent's name as a `&str`; empty if the bytes aren't valid UTF-8.
	pub fn name_str(&self) -> &str {
		std::str::from_utf8(&self.name[..self.len as usize]).unwrap_or("")
	}

	pub fn to_bytes(&self) -> [u8; DIRENT_SIZE] {
		let mut buf = [0u8; DIRENT_SIZE];
		let mut w = Writer::new(&mut buf);
		w.u16(self.ino);
		w.u8(self.valid as u8);
		w.u8(self.len);
		w.bytes(&self.name);
		buf
	}

	pub fn from_bytes(buf: &[u8]) -> Self {
		let mut r = Reader::new(buf);
		let ino = r.u16();
		let valid = r.u8() != 0;
		let len = r.u8();
		let mut name = [0u8; NAME_MAX];
		name.copy_from_slice(r.bytes(NAME_MAX));
		Self { ino, valid, len, name }
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip() {
		let d = Dirent::new(7, "hello").unwrap();
		let back = Dirent::from_bytes(&d.to_bytes());
		assert_eq!(back.ino, 7);
		assert!(back.valid);
		assert_eq!(back.name_str(), "hello");
	}

	#[test]
	fn name_too_long() {
		let name: String = "x".repeat(NAME_MAX + 1);
		assert!(matches!(Dirent::new(1, &name), Err(Error::NameTooLong)));
	}

	#[test]
	fn name_at_capacity_fits() {
		let name: String = "x".repeat(NAME_MAX);
		let d = Dirent::new(1, &name).unwrap();
		assert_eq!(d.name_str(), name);
	}
}
