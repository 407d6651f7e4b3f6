//! The in-memory inode record and its fixed-size on-disk serialization.

use crate::layout::BLOCK_SIZE;

/// Number of direct data-block pointers embedded in an inode.
pub const DIRECT_PTRS: usize = 16;

/// Fixed size, in bytes, of one on-disk inode record.
pub const INODE_SIZE: usize = 128;

pub const MAX_INODES_IN_DISK_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

static_assertions::const_assert!(INODE_SIZE * MAX_INODES_IN_DISK_BLOCK == BLOCK_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Dir,
    Reg,
}

/// Minimal embedded `stat(2)` fields; enough for `getattr` to answer
/// truthfully without carrying a full platform `struct stat`.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Inode {
    pub ino: u16,
    pub valid: bool,
    pub itype: FileType,
    pub link: u32,
    pub size: u64,
    /// `None` means unused. Block 0 is reserved for the superblock and can
    /// never be a legal data block, so a `0` sentinel on disk is always
    /// unambiguous — but in memory this is an explicit `Option`, not a
    /// magic number a caller could misread as "points at block 0".
    pub direct_ptr: [Option<u32>; DIRECT_PTRS],
    /// Single level of indirection. Always `None` in this implementation;
    /// large-file indirect blocks are out of scope, but the slot is kept
    /// so the on-disk inode size and layout don't need to change if that
    /// scope ever grows.
    pub indirect_ptr: Option<u32>,
    pub stat: Stat,
}

impl Inode {
    pub fn new_dir(ino: u16, first_block: u32, mode: u32) -> Self {
        let mut direct_ptr = [None; DIRECT_PTRS];
        direct_ptr[0] = Some(first_block);
        Self {
            ino,
            valid: true,
            itype: FileType::Dir,
            link: 2,
            size: 2 * crate::dirent::DIRENT_SIZE as u64,
            direct_ptr,
            indirect_ptr: None,
            stat: Stat {
                mode: libc::S_IFDIR | mode,
                uid: 0,
                gid: 0,
                atime: 0,
                mtime: 0,
                ctime: 0,
            },
        }
    }

    pub fn new_reg(ino: u16, mode: u32) -> Self {
        Self {
            ino,
            valid: true,
            itype: FileType::Reg,
            link: 1,
            size: 0,
            direct_ptr: [None; DIRECT_PTRS],
            indirect_ptr: None,
            stat: Stat {
                mode: libc::S_IFREG | mode,
                uid: 0,
                gid: 0,
                atime: 0,
                mtime: 0,
                ctime: 0,
            },
        }
    }

    pub fn to_bytes(self) -> [u8; INODE_SIZE] {
        let mut buf = [0u8; INODE_SIZE];
        buf[0..2].copy_from_slice(&self.ino.to_le_bytes());
        buf[2] = self.valid as u8;
        buf[3] = match self.itype {
            FileType::Dir => 0,
            FileType::Reg => 1,
        };
        buf[4..8].copy_from_slice(&self.link.to_le_bytes());
        buf[8..16].copy_from_slice(&self.size.to_le_bytes());
        let mut off = 16;
        for ptr in self.direct_ptr {
            buf[off..off + 4].copy_from_slice(&ptr.unwrap_or(0).to_le_bytes());
            off += 4;
        }
        buf[off..off + 4].copy_from_slice(&self.indirect_ptr.unwrap_or(0).to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.stat.mode.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.stat.uid.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.stat.gid.to_le_bytes());
        off += 4;
        buf[off..off + 8].copy_from_slice(&self.stat.atime.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.stat.mtime.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.stat.ctime.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; INODE_SIZE]) -> Self {
        let ino = u16::from_le_bytes(buf[0..2].try_into().unwrap());
        let valid = buf[2] != 0;
        let itype = if buf[3] == 0 { FileType::Dir } else { FileType::Reg };
        let link = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let size = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let mut direct_ptr = [None; DIRECT_PTRS];
        let mut off = 16;
        for slot in direct_ptr.iter_mut() {
            let raw = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            *slot = (raw != 0).then_some(raw);
            off += 4;
        }
        let raw_indirect = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let indirect_ptr = (raw_indirect != 0).then_some(raw_indirect);
        off += 4;
        let mode = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let uid = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let gid = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let atime = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let mtime = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let ctime = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        Self {
            ino,
            valid,
            itype,
            link,
            size,
            direct_ptr,
            indirect_ptr,
            stat: Stat {
                mode,
                uid,
                gid,
                atime,
                mtime,
                ctime,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_round_trips_through_bytes() {
        let mut inode = Inode::new_dir(0, 3, 0o755);
        inode.direct_ptr[1] = Some(7);
        let bytes = inode.to_bytes();
        let back = Inode::from_bytes(&bytes);
        assert_eq!(back.ino, inode.ino);
        assert_eq!(back.direct_ptr, inode.direct_ptr);
        assert_eq!(back.stat.mode, inode.stat.mode);
        assert_eq!(back.link, 2);
    }

    #[test]
    fn zero_is_not_a_legal_direct_pointer() {
        let inode = Inode::new_reg(5, 0o644);
        assert!(inode.direct_ptr.iter().all(Option::is_none));
    }
}
