//! Deterministic lexicographic depth-first walk of a configured root, with cursor
//! resume and symlink-cycle guarding. Phase-agnostic: the Orchestrator supplies the
//! per-phase filter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::stat::{self, FileStat};

#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub path: PathBuf,
    pub stat: FileStat,
}

/// Walks `root`, yielding `(path, stat)` pairs in lexicographic DFS order. Entries
/// whose path is lexicographically `<= resume_after` are skipped, implementing
/// cursor resume. Symlinks are followed only when `follow_symlinks` is set, and a
/// per-traversal visited-inode set prevents cycles either way.
pub fn walk_root<'a>(
    root: &'a Path,
    resume_after: Option<&str>,
    follow_symlinks: bool,
) -> impl Iterator<Item = ScanEntry> + 'a {
    let mut visited: HashSet<String> = HashSet::new();
    let resume_after = resume_after.map(|s| s.to_string());

    WalkDir::new(root)
        .follow_links(follow_symlinks)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read directory entry during scan");
                    return None;
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let path = entry.path();
            let path_str = path.to_string_lossy().to_string();
            if let Some(cursor) = &resume_after {
                if path_str.as_str() <= cursor.as_str() {
                    return None;
                }
            }
            let file_stat = match stat::stat(path) {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to stat entry during scan");
                    return None;
                }
            };
            if !visited.insert(file_stat.inode_key.clone()) {
                return None;
            }
            Some(ScanEntry {
                path: path.to_path_buf(),
                stat: file_stat,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tree(dir: &Path) {
        std::fs::write(dir.join("b.txt"), b"b").unwrap();
        std::fs::write(dir.join("a.mkv"), b"a").unwrap();
        std::fs::create_dir(dir.join("sub")).unwrap();
        std::fs::write(dir.join("sub").join("c.jpg"), b"c").unwrap();
    }

    #[test]
    fn yields_files_in_lexicographic_dfs_order() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());

        let paths: Vec<String> = walk_root(dir.path(), None, false)
            .map(|e| e.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(paths, vec!["a.mkv", "b.txt", "c.jpg"]);
    }

    #[test]
    fn resume_skips_entries_up_to_and_including_cursor() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let cursor = dir.path().join("a.mkv").to_string_lossy().to_string();

        let names: Vec<String> = walk_root(dir.path(), Some(&cursor), false)
            .map(|e| e.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["b.txt", "c.jpg"]);
    }

    #[test]
    fn directories_are_not_yielded_as_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());

        let count = walk_root(dir.path(), None, false).count();
        assert_eq!(count, 3);
    }
}
