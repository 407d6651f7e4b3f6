//! Fixed-size block read/write over the backing disk image.
//!
//! This is the minimal concrete stand-in for the external block-device
//! primitives (`bio_read`/`bio_write`, `dev_init`/`dev_open`/`dev_close`):
//! a thin wrapper over `std::fs::File` doing positioned, block-granular
//! I/O. It carries no caching, write ordering, or journaling.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::Result;
use crate::layout::BLOCK_SIZE;

pub struct BlockDevice {
    file: File,
}

impl BlockDevice {
    /// Opens an existing disk image for read/write.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Creates a fresh disk image of `total_blocks * BLOCK_SIZE` bytes,
    /// truncating whatever was there before.
    pub fn create(path: &Path, total_blocks: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total_blocks as u64 * BLOCK_SIZE as u64)?;
        Ok(Self { file })
    }

    pub fn read_block(&self, blkno: u32) -> Result<[u8; BLOCK_SIZE]> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.file.read_exact_at(&mut buf, blkno as u64 * BLOCK_SIZE as u64)?;
        Ok(buf)
    }

    pub fn write_block(&self, blkno: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.file.write_all_at(buf, blkno as u64 * BLOCK_SIZE as u64)?;
        Ok(())
    }
}
