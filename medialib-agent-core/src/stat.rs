//! Per-file stat snapshot used for classification, hashing, and cache freshness
//! checks. `inode_key` is the `"<device>:<inode>"` pair, stable across renames on
//! the same filesystem but not across filesystems or copies.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: f64,
    pub ctime: f64,
    pub inode_key: String,
}

pub fn stat(path: &Path) -> std::io::Result<FileStat> {
    let meta = std::fs::symlink_metadata(path)?;
    let meta = if meta.file_type().is_symlink() {
        std::fs::metadata(path)?
    } else {
        meta
    };
    Ok(FileStat {
        size: meta.len(),
        mtime: meta.mtime() as f64 + meta.mtime_nsec() as f64 / 1e9,
        ctime: meta.ctime() as f64 + meta.ctime_nsec() as f64 / 1e9,
        inode_key: format!("{}:{}", meta.dev(), meta.ino()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_key_is_stable_across_rename() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("a.txt");
        std::fs::write(&original, b"hi").unwrap();
        let before = stat(&original).unwrap();

        let renamed = dir.path().join("b.txt");
        std::fs::rename(&original, &renamed).unwrap();
        let after = stat(&renamed).unwrap();

        assert_eq!(before.inode_key, after.inode_key);
    }

    #[test]
    fn different_files_get_different_inode_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"hi").unwrap();
        std::fs::write(&b, b"there").unwrap();

        assert_ne!(stat(&a).unwrap().inode_key, stat(&b).unwrap().inode_key);
    }
}
