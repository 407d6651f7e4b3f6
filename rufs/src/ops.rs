//! FUSE host bindings: adapts `fuser`'s inode-numbered low-level API onto
//! the path-based filesystem operations facade FS-CORE actually exposes.
//!
//! `fuser::Filesystem` methods identify everything by a 64-bit inode
//! number, the way the Linux VFS does; FS-CORE's facade (`Rufs::mkdir`,
//! `Rufs::create`, `Rufs::resolve`) identifies things by path, mirroring
//! the reference implementation's path-based `fuse_operations` callbacks.
//! [`RufsFs`] bridges the two: a FUSE inode is always `rufs_ino + 1` (FUSE
//! reserves inode 1 for the mount root; FS-CORE's root is inode 0), and
//! the handful of operations that need a full path reconstruct it on
//! demand by walking `..` entries up to the root — there is no separate
//! path cache to keep consistent with the on-disk tree.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType as FuserFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, Request, TimeOrNow,
};

use crate::error::Error;
use crate::fs::Rufs;
use crate::inode::{FileType, Inode};

const TTL: Duration = Duration::from_secs(1);
const FUSE_ROOT_INO: u64 = 1;

fn fuse_ino(rufs_ino: u16) -> u64 {
    rufs_ino as u64 + 1
}

fn rufs_ino(fuse_ino: u64) -> u16 {
    (fuse_ino - 1) as u16
}

fn secs_to_systemtime(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH
    }
}

fn to_file_attr(inode: &Inode) -> FileAttr {
    let kind = match inode.itype {
        FileType::Dir => FuserFileType::Directory,
        FileType::Reg => FuserFileType::RegularFile,
    };
    FileAttr {
        ino: fuse_ino(inode.ino),
        size: inode.size,
        blocks: inode.size.div_ceil(crate::layout::BLOCK_SIZE as u64),
        atime: secs_to_systemtime(inode.stat.atime),
        mtime: secs_to_systemtime(inode.stat.mtime),
        ctime: secs_to_systemtime(inode.stat.ctime),
        crtime: secs_to_systemtime(inode.stat.ctime),
        kind,
        perm: (inode.stat.mode & 0o7777) as u16,
        nlink: inode.link,
        uid: inode.stat.uid,
        gid: inode.stat.gid,
        rdev: 0,
        blksize: crate::layout::BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// The `fuser::Filesystem` adapter. Owns the one [`Rufs`] handle for the
/// mounted image; every FUSE callback takes the process-wide `&mut self`
/// FUSE already serializes calls through, matching FS-CORE's
/// single-threaded-per-operation concurrency model.
pub struct RufsFs {
    fs: Rufs,
}

impl RufsFs {
    pub fn new(fs: Rufs) -> Self {
        Self { fs }
    }

    /// Reconstructs the absolute path of `ino` by walking `..` up to the
    /// root, reading each ancestor's directory to find the child's name.
    /// Needed only by operations whose FS-CORE counterpart is expressed in
    /// terms of a path (`mkdir`, `create`); lookups and attribute reads
    /// never need it since they already have the target's inode number.
    fn path_for(&self, fuse_ino_val: u64) -> Result<String, Error> {
        if fuse_ino_val == FUSE_ROOT_INO {
            return Ok("/".to_string());
        }
        let ino = rufs_ino(fuse_ino_val);
        let dotdot = self.fs.dir_find(ino, "..")?;
        let parent_path = self.path_for(fuse_ino(dotdot.ino))?;
        let entries = self.fs.read_dir_entries(dotdot.ino)?;
        let name = entries
            .iter()
            .find(|e| e.ino == ino && e.name() != "." && e.name() != "..")
            .map(|e| e.name().to_string())
            .ok_or(Error::NotFound)?;
        Ok(if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        })
    }
}

impl Filesystem for RufsFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut fuser::KernelConfig) -> Result<(), libc::c_int> {
        log::info!("rufs: mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        log::info!("rufs: unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.fs.dir_find(rufs_ino(parent), name).and_then(|e| self.fs.readi(e.ino)) {
            Ok(inode) => reply.entry(&TTL, &to_file_attr(&inode), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.fs.readi(rufs_ino(ino)) {
            Ok(inode) => reply.attr(&TTL, &to_file_attr(&inode)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.readi(rufs_ino(ino)) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = match self.fs.read_dir_entries(rufs_ino(ino)) {
            Ok(e) => e,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        for (i, entry) in entries.iter().enumerate().skip(offset as usize) {
            let child = match self.fs.readi(entry.ino) {
                Ok(c) => c,
                Err(e) => {
                    reply.error(e.to_errno());
                    return;
                }
            };
            let kind = match child.itype {
                FileType::Dir => FuserFileType::Directory,
                FileType::Reg => FuserFileType::RegularFile,
            };
            let full = reply.add(fuse_ino(entry.ino), (i + 1) as i64, kind, entry.name());
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let parent_path = match self.path_for(parent) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        let full_path = if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        };
        match self.fs.mkdir(&full_path, mode & 0o7777) {
            Ok(inode) => reply.entry(&TTL, &to_file_attr(&inode), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let parent_path = match self.path_for(parent) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        let full_path = if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        };
        match self.fs.create(&full_path, mode & 0o7777) {
            Ok(inode) => reply.created(&TTL, &to_file_attr(&inode), 0, 0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.readi(rufs_ino(ino)) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    /// Updates timestamps (and, trivially, size) in the embedded stat.
    /// There is no real data-block resizing here: `truncate` is a stub in
    /// the reference implementation too (it always returns success without
    /// touching any block), so a size change here only adjusts the
    /// metadata field, matching that behavior rather than "fixing" it.
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let id = rufs_ino(ino);
        let mut inode = match self.fs.readi(id) {
            Ok(i) => i,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        if let Some(size) = size {
            inode.size = size;
        }
        if let Some(uid) = uid {
            inode.stat.uid = uid;
        }
        if let Some(gid) = gid {
            inode.stat.gid = gid;
        }
        let now = || {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        };
        if let Some(t) = atime {
            inode.stat.atime = match t {
                TimeOrNow::SpecificTime(t) => t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0),
                TimeOrNow::Now => now(),
            };
        }
        if let Some(t) = mtime {
            inode.stat.mtime = match t {
                TimeOrNow::SpecificTime(t) => t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0),
                TimeOrNow::Now => now(),
            };
        }
        match self.fs.writei(&inode) {
            Ok(()) => reply.attr(&TTL, &to_file_attr(&inode)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    // Stubs, matching the reference implementation's unimplemented
    // operations (`read`, `write`, `rmdir`, `unlink`): explicit
    // not-implemented rather than a guessed behavior.
    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        reply.error(libc::ENOSYS);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::ENOSYS);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::ENOSYS);
    }
}
