//! Directory entries: fixed-size name -> inode records packed into a
//! directory inode's data blocks.

use crate::layout::BLOCK_SIZE;

pub const NAME_MAX: usize = 28;
pub const DIRENT_SIZE: usize = 1 + 2 + 1 + NAME_MAX;
pub const MAX_DIRENTS_IN_DISK_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

static_assertions::const_assert!(DIRENT_SIZE * MAX_DIRENTS_IN_DISK_BLOCK <= BLOCK_SIZE);

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub valid: bool,
    pub ino: u16,
    pub name: String,
}

impl DirEntry {
    pub fn from_ino_name(ino: u16, name: &str) -> Self {
        assert!(name.len() <= NAME_MAX, "directory entry name too long: {name}");
        Self {
            valid: true,
            ino,
            name: name.to_string(),
        }
    }

    pub fn empty() -> Self {
        Self {
            valid: false,
            ino: 0,
            name: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn to_bytes(&self) -> [u8; DIRENT_SIZE] {
        let mut buf = [0u8; DIRENT_SIZE];
        buf[0] = self.valid as u8;
        buf[1..3].copy_from_slice(&self.ino.to_le_bytes());
        let name_bytes = self.name.as_bytes();
        buf[3] = name_bytes.len() as u8;
        buf[4..4 + name_bytes.len()].copy_from_slice(name_bytes);
        buf
    }

    pub fn from_bytes(buf: &[u8; DIRENT_SIZE]) -> Self {
        let valid = buf[0] != 0;
        let ino = u16::from_le_bytes(buf[1..3].try_into().unwrap());
        let name_len = buf[3] as usize;
        let name = String::from_utf8_lossy(&buf[4..4 + name_len]).into_owned();
        Self { valid, ino, name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirent_round_trips() {
        let e = DirEntry::from_ino_name(9, "readme.txt");
        let bytes = e.to_bytes();
        let back = DirEntry::from_bytes(&bytes);
        assert!(back.valid);
        assert_eq!(back.ino, 9);
        assert_eq!(back.name(), "readme.txt");
    }

    #[test]
    fn empty_entry_is_invalid() {
        let e = DirEntry::empty();
        assert!(!e.valid);
    }
}
