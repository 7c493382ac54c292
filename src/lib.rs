//! Tiny FS: a user-space filesystem storing a hierarchical file tree in a
//! single fixed-size backing diskfile, exposed through FUSE.
//!
//! The engine is split into a path-based core ([`ops::Filesystem`]) that is
//! fully testable without a kernel mount, and a thin [`fuse_adapter`] that
//! maps kernel inode numbers onto it.

pub mod bitmap;
pub mod blockmap;
pub mod codec;
pub mod device;
pub mod dir;
pub mod dirent;
pub mod error;
pub mod fuse_adapter;
pub mod inode;
pub mod layout;
pub mod mkfs;
pub mod ops;
pub mod path;
pub mod superblock;
