//! Black-box scenarios against the public `rufs` API, driven against a
//! throwaway disk image. No FUSE mount involved — that needs a kernel
//! module and root/fuse3, which a test run shouldn't assume.

use rand::Rng;
use rufs::Rufs;
use tempfile::NamedTempFile;

fn fresh_fs() -> Rufs {
    let tmp = NamedTempFile::new().expect("create temp disk image");
    Rufs::mkfs(tmp.path()).expect("mkfs on temp disk image")
}

#[test]
fn scenario_mkfs_root_attributes() {
    let fs = fresh_fs();
    let root = fs.readi(0).expect("read root inode");
    assert_eq!(root.ino, 0);
    assert_eq!(root.link, 2);
    assert_eq!(root.stat.mode & libc::S_IFDIR, libc::S_IFDIR);
}

#[test]
fn scenario_nested_mkdir_and_readdir_ordering() {
    let mut fs = fresh_fs();
    fs.mkdir("/a", 0o755).unwrap();
    fs.mkdir("/a/b", 0o755).unwrap();

    let b = fs.resolve("/a/b").unwrap();
    assert_eq!(b.stat.mode & 0o777, 0o755);

    let a = fs.resolve("/a").unwrap();
    let names: Vec<String> = fs
        .read_dir_entries(a.ino)
        .unwrap()
        .into_iter()
        .map(|e| e.name().to_string())
        .collect();
    assert_eq!(names, vec![".", "..", "b"]);
}

#[test]
fn scenario_create_regular_file() {
    let mut fs = fresh_fs();
    fs.mkdir("/a", 0o755).unwrap();
    fs.create("/a/f", 0o644).unwrap();

    let f = fs.resolve("/a/f").unwrap();
    assert_eq!(f.stat.mode & libc::S_IFREG, libc::S_IFREG);
    assert_eq!(f.stat.mode & 0o777, 0o644);
    assert_eq!(f.size, 0);
    assert_eq!(f.link, 1);
}

/// Creates a batch of files with random (but distinct, alphanumeric) names
/// under one directory and checks every one of them resolves back to a
/// regular file with the mode it was created with.
#[test]
fn scenario_random_batch_of_files_all_resolve() {
    let mut fs = fresh_fs();
    fs.mkdir("/batch", 0o755).unwrap();

    let mut rng = rand::thread_rng();
    let mut names = Vec::new();
    while names.len() < 20 {
        let len: usize = rng.gen_range(3..12);
        let name: String = (0..len)
            .map(|_| (b'a' + rng.gen_range(0u8..26)) as char)
            .collect();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    for name in &names {
        fs.create(&format!("/batch/{name}"), 0o640).unwrap();
    }

    for name in &names {
        let f = fs.resolve(&format!("/batch/{name}")).unwrap();
        assert_eq!(f.stat.mode & 0o777, 0o640);
        assert_eq!(f.size, 0);
    }

    let listed: Vec<String> = fs
        .read_dir_entries(fs.resolve("/batch").unwrap().ino)
        .unwrap()
        .into_iter()
        .map(|e| e.name().to_string())
        .collect();
    for name in &names {
        assert!(listed.contains(name));
    }
}

#[test]
fn reopening_an_image_preserves_the_tree() {
    let tmp = NamedTempFile::new().unwrap();
    {
        let mut fs = Rufs::mkfs(tmp.path()).unwrap();
        fs.mkdir("/keep", 0o755).unwrap();
    }
    let fs = Rufs::open(tmp.path()).unwrap();
    let kept = fs.resolve("/keep").unwrap();
    assert_eq!(kept.stat.mode & libc::S_IFDIR, libc::S_IFDIR);
}
