//! FS-CORE proper: superblock/bitmap lifecycle, inode I/O, the directory
//! service, and the path resolver, all gathered behind one handle.
//!
//! `Rufs` replaces the reference implementation's process-wide globals
//! (`superblock`, `inode_bitmap`, `disk_bitmap`) with an explicitly
//! constructed handle, per this workspace's redesign notes: `Rufs::mkfs`
//! and `Rufs::open` are the two ways to get one, and every operation takes
//! `&mut self` instead of touching file-scope statics.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bitset::Bitset;

use crate::block::BlockDevice;
use crate::dirent::{DirEntry, DIRENT_SIZE, MAX_DIRENTS_IN_DISK_BLOCK};
use crate::error::{Error, Result};
use crate::inode::{FileType, Inode, DIRECT_PTRS, INODE_SIZE, MAX_INODES_IN_DISK_BLOCK};
use crate::layout::{SuperBlock, BLOCK_SIZE, MAX_DNUM, MAX_INUM};

pub struct Rufs {
    device: BlockDevice,
    sb: SuperBlock,
    inode_bitmap: Bitset,
    data_bitmap: Bitset,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn pad_bitmap_block(bitmap: &Bitset) -> [u8; BLOCK_SIZE] {
    let mut buf = [0u8; BLOCK_SIZE];
    let bytes = bitmap.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

/// Splits `/a/b/c` into parent path `/a/b` and leaf name `c`, the way
/// `dirname(3)`/`basename(3)` would, for the entry points that create
/// something at a path (`mkdir`, `create`).
fn split_parent_leaf(path: &str) -> Result<(String, String)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::AlreadyExists); // "/" always exists as root
    }
    match trimmed.rfind('/') {
        Some(0) => Ok(("/".to_string(), trimmed[1..].to_string())),
        Some(idx) => Ok((trimmed[..idx].to_string(), trimmed[idx + 1..].to_string())),
        None => Ok(("/".to_string(), trimmed.to_string())),
    }
}

impl Rufs {
    /// Writes a fresh layout to `path`: superblock at block 0, both
    /// bitmaps, a (sparse) inode table, and a root directory inode with
    /// `.`/`..` both pointing at itself.
    pub fn mkfs(path: &Path) -> Result<Self> {
        let sb = SuperBlock::new(MAX_INUM, MAX_DNUM);
        let total_blocks = sb.data_start_blk + MAX_DNUM;
        log::info!(
            "mkfs: {total_blocks} blocks ({max_inum} inodes, {max_dnum} data blocks), data starts at block {data_start}",
            max_inum = MAX_INUM,
            max_dnum = MAX_DNUM,
            data_start = sb.data_start_blk
        );
        let device = BlockDevice::create(path, total_blocks)?;
        device.write_block(0, &sb.to_bytes())?;

        let mut inode_bitmap = Bitset::new(sb.max_inum as usize);
        let mut data_bitmap = Bitset::new(sb.max_dnum as usize);
        inode_bitmap.set(0);
        data_bitmap.set(0);
        device.write_block(sb.inode_bitmap_blk, &pad_bitmap_block(&inode_bitmap))?;
        device.write_block(sb.data_bitmap_blk, &pad_bitmap_block(&data_bitmap))?;

        let mut fs = Self {
            device,
            sb,
            inode_bitmap,
            data_bitmap,
        };

        let root_blk = sb.data_start_blk;
        let mut root_block = [0u8; BLOCK_SIZE];
        root_block[0..DIRENT_SIZE].copy_from_slice(&DirEntry::from_ino_name(0, ".").to_bytes());
        root_block[DIRENT_SIZE..2 * DIRENT_SIZE]
            .copy_from_slice(&DirEntry::from_ino_name(0, "..").to_bytes());
        fs.device.write_block(root_blk, &root_block)?;

        let root_inode = Inode::new_dir(0, root_blk, 0o755);
        fs.writei(&root_inode)?;
        Ok(fs)
    }

    /// Loads an already-`mkfs`'d image.
    pub fn open(path: &Path) -> Result<Self> {
        let device = BlockDevice::open(path)?;
        let sb = SuperBlock::from_bytes(&device.read_block(0)?);
        let inode_bitmap = Bitset::from_bytes(&device.read_block(sb.inode_bitmap_blk)?, sb.max_inum as usize);
        let data_bitmap = Bitset::from_bytes(&device.read_block(sb.data_bitmap_blk)?, sb.max_dnum as usize);
        log::info!("rufs: loaded image, {} inodes, {} data blocks", sb.max_inum, sb.max_dnum);
        Ok(Self {
            device,
            sb,
            inode_bitmap,
            data_bitmap,
        })
    }

    fn persist_inode_bitmap(&self) -> Result<()> {
        self.device.write_block(self.sb.inode_bitmap_blk, &pad_bitmap_block(&self.inode_bitmap))
    }

    fn persist_data_bitmap(&self) -> Result<()> {
        self.device.write_block(self.sb.data_bitmap_blk, &pad_bitmap_block(&self.data_bitmap))
    }

    fn alloc_inode(&mut self) -> Result<u16> {
        let idx = self.inode_bitmap.first_free().ok_or(Error::NoSpace)?;
        self.inode_bitmap.set(idx);
        self.persist_inode_bitmap()?;
        Ok(idx as u16)
    }

    /// Allocates a data block, returning its absolute block index
    /// (`data_start_blk + idx`), so callers never deal in bitmap-relative
    /// indices directly.
    fn alloc_data_block(&mut self) -> Result<u32> {
        let idx = self.data_bitmap.first_free().ok_or(Error::NoSpace)?;
        self.data_bitmap.set(idx);
        self.persist_data_bitmap()?;
        Ok(self.sb.data_start_blk + idx as u32)
    }

    pub fn readi(&self, ino: u16) -> Result<Inode> {
        let block_idx = self.sb.inode_start_blk + (ino as u32 * INODE_SIZE as u32) / BLOCK_SIZE as u32;
        let within = ino as usize % MAX_INODES_IN_DISK_BLOCK;
        let block = self.device.read_block(block_idx)?;
        let off = within * INODE_SIZE;
        let bytes: [u8; INODE_SIZE] = block[off..off + INODE_SIZE].try_into().unwrap();
        Ok(Inode::from_bytes(&bytes))
    }

    pub fn writei(&mut self, inode: &Inode) -> Result<()> {
        let block_idx = self.sb.inode_start_blk + (inode.ino as u32 * INODE_SIZE as u32) / BLOCK_SIZE as u32;
        let within = inode.ino as usize % MAX_INODES_IN_DISK_BLOCK;
        let mut block = self.device.read_block(block_idx)?;
        let off = within * INODE_SIZE;
        block[off..off + INODE_SIZE].copy_from_slice(&(*inode).to_bytes());
        self.device.write_block(block_idx, &block)
    }

    /// Looks up `name` inside directory `dir_ino`. Stops at the first
    /// unallocated direct pointer slot, since `dir_add` only ever fills
    /// the lowest-index free slot, so a `None` marks the end of the
    /// directory's allocated blocks.
    pub fn dir_find(&self, dir_ino: u16, name: &str) -> Result<DirEntry> {
        let dir = self.readi(dir_ino)?;
        for ptr in dir.direct_ptr {
            let Some(blk) = ptr else { break };
            let block = self.device.read_block(blk)?;
            for i in 0..MAX_DIRENTS_IN_DISK_BLOCK {
                let off = i * DIRENT_SIZE;
                let bytes: [u8; DIRENT_SIZE] = block[off..off + DIRENT_SIZE].try_into().unwrap();
                let entry = DirEntry::from_bytes(&bytes);
                if entry.valid && entry.name() == name {
                    return Ok(entry);
                }
            }
        }
        Err(Error::NotFound)
    }

    /// Adds `name -> child_ino` to directory `dir_ino`.
    ///
    /// Walks the direct-pointer array in index order, allocating a fresh
    /// data block the first time it hits an unused slot; within each
    /// block, fills the first invalidated (or never-used) entry. Matches
    /// the reference implementation's non-compacting removal design: this
    /// never needs to reclaim a `valid=0` slot from a prior remove because
    /// removal isn't implemented, but the scan already treats any
    /// `!valid` entry as free, so that invariant holds if it ever is.
    pub fn dir_add(&mut self, dir_ino: u16, child_ino: u16, name: &str) -> Result<()> {
        if self.dir_find(dir_ino, name).is_ok() {
            return Err(Error::AlreadyExists);
        }
        let mut dir = self.readi(dir_ino)?;
        for slot in 0..DIRECT_PTRS {
            let blk = match dir.direct_ptr[slot] {
                Some(b) => b,
                None => {
                    let new_blk = self.alloc_data_block()?;
                    self.device.write_block(new_blk, &[0u8; BLOCK_SIZE])?;
                    dir.direct_ptr[slot] = Some(new_blk);
                    log::debug!("dir_add: allocated block {new_blk} for inode {dir_ino}");
                    new_blk
                }
            };
            let mut block = self.device.read_block(blk)?;
            for i in 0..MAX_DIRENTS_IN_DISK_BLOCK {
                let off = i * DIRENT_SIZE;
                let bytes: [u8; DIRENT_SIZE] = block[off..off + DIRENT_SIZE].try_into().unwrap();
                if !DirEntry::from_bytes(&bytes).valid {
                    let entry = DirEntry::from_ino_name(child_ino, name);
                    block[off..off + DIRENT_SIZE].copy_from_slice(&entry.to_bytes());
                    self.device.write_block(blk, &block)?;
                    dir.size += DIRENT_SIZE as u64;
                    dir.stat.mtime = now_secs();
                    self.writei(&dir)?;
                    return Ok(());
                }
            }
        }
        Err(Error::NoSpace)
    }

    /// Resolves `path` to its inode, walking from the root.
    ///
    /// The reference implementation initializes the walking dirent's
    /// `ino` to 0 and never updates it after each `dir_find`, so every
    /// multi-segment path resolves against the root's children only. This
    /// updates the running inode number from every `dir_find` result, as
    /// the design notes require.
    pub fn resolve(&self, path: &str) -> Result<Inode> {
        if path == "/" {
            return self.readi(0);
        }
        let mut cur_ino: u16 = 0;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let entry = self.dir_find(cur_ino, segment)?;
            cur_ino = entry.ino;
        }
        self.readi(cur_ino)
    }

    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<Inode> {
        let (parent_path, leaf) = split_parent_leaf(path)?;
        let parent = self.resolve(&parent_path)?;
        let ino = self.alloc_inode()?;
        let blk = self.alloc_data_block()?;
        let mut block = [0u8; BLOCK_SIZE];
        block[0..DIRENT_SIZE].copy_from_slice(&DirEntry::from_ino_name(ino, ".").to_bytes());
        block[DIRENT_SIZE..2 * DIRENT_SIZE]
            .copy_from_slice(&DirEntry::from_ino_name(parent.ino, "..").to_bytes());
        self.device.write_block(blk, &block)?;
        let mut inode = Inode::new_dir(ino, blk, mode);
        inode.stat.mtime = now_secs();
        inode.stat.ctime = inode.stat.mtime;
        self.writei(&inode)?;
        self.dir_add(parent.ino, ino, &leaf)?;
        Ok(inode)
    }

    pub fn create(&mut self, path: &str, mode: u32) -> Result<Inode> {
        let (parent_path, leaf) = split_parent_leaf(path)?;
        let parent = self.resolve(&parent_path)?;
        let ino = self.alloc_inode()?;
        let mut inode = Inode::new_reg(ino, mode);
        inode.stat.mtime = now_secs();
        inode.stat.ctime = inode.stat.mtime;
        self.writei(&inode)?;
        self.dir_add(parent.ino, ino, &leaf)?;
        Ok(inode)
    }

    /// Every `valid` entry across a directory's allocated blocks, in
    /// direct-pointer and in-block scan order.
    pub fn read_dir_entries(&self, dir_ino: u16) -> Result<Vec<DirEntry>> {
        let dir = self.readi(dir_ino)?;
        if dir.itype != FileType::Dir {
            return Err(Error::NotFound);
        }
        let mut out = Vec::new();
        for ptr in dir.direct_ptr {
            let Some(blk) = ptr else { break };
            let block = self.device.read_block(blk)?;
            for i in 0..MAX_DIRENTS_IN_DISK_BLOCK {
                let off = i * DIRENT_SIZE;
                let bytes: [u8; DIRENT_SIZE] = block[off..off + DIRENT_SIZE].try_into().unwrap();
                let entry = DirEntry::from_bytes(&bytes);
                if entry.valid {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fresh() -> Rufs {
        // `mkfs` opens its own fd before `tmp` is dropped; on Unix,
        // unlinking a still-open file is fine, so no leak and no need to
        // keep the guard alive past this call.
        let tmp = NamedTempFile::new().unwrap();
        Rufs::mkfs(tmp.path()).unwrap()
    }

    #[test]
    fn mkfs_root_is_a_directory_with_two_links() {
        let fs = fresh();
        let root = fs.readi(0).unwrap();
        assert_eq!(root.itype, FileType::Dir);
        assert_eq!(root.link, 2);
        assert_eq!(root.ino, 0);
    }

    #[test]
    fn mkdir_nests_and_readdir_lists_in_order() {
        let mut fs = fresh();
        fs.mkdir("/a", 0o755).unwrap();
        fs.mkdir("/a/b", 0o755).unwrap();
        let b = fs.resolve("/a/b").unwrap();
        assert_eq!(b.itype, FileType::Dir);
        assert_eq!(b.stat.mode & 0o777, 0o755);

        let entries = fs.read_dir_entries(fs.resolve("/a").unwrap().ino).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec![".", "..", "b"]);
    }

    #[test]
    fn create_makes_an_empty_regular_file() {
        let mut fs = fresh();
        fs.mkdir("/a", 0o755).unwrap();
        fs.create("/a/f", 0o644).unwrap();
        let f = fs.resolve("/a/f").unwrap();
        assert_eq!(f.itype, FileType::Reg);
        assert_eq!(f.size, 0);
        assert_eq!(f.link, 1);
        assert_eq!(f.stat.mode & 0o777, 0o644);
    }

    #[test]
    fn dir_add_rejects_duplicate_names() {
        let mut fs = fresh();
        fs.create("/f", 0o644).unwrap();
        let err = fs.create("/f", 0o644).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
    }

    #[test]
    fn resolve_multi_segment_path_does_not_collapse_to_root() {
        let mut fs = fresh();
        fs.mkdir("/a", 0o755).unwrap();
        fs.mkdir("/a/b", 0o755).unwrap();
        fs.mkdir("/a/b/c", 0o755).unwrap();
        let c = fs.resolve("/a/b/c").unwrap();
        assert_ne!(c.ino, 0);
        let dotdot = fs.dir_find(c.ino, "..").unwrap();
        let b = fs.resolve("/a/b").unwrap();
        assert_eq!(dotdot.ino, b.ino);
    }
}
