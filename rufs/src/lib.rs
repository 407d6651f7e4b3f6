//! `rufs` is a block-backed filesystem exposed through FUSE: a superblock
//! and two bitmaps persisted at fixed block offsets, a fixed-size inode
//! table, directories built from packed dirent records inside a normal
//! inode's data blocks, and a path resolver that walks the directory tree
//! one `dir_find` at a time.

pub mod block;
pub mod dirent;
pub mod error;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod ops;

pub use error::{Error, Result};
pub use fs::Rufs;
