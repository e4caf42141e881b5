//! Discovery of new files in the watched folder.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::stream::FileStream;
use crate::weight::ContainerKind;

/// Finds files in a folder which have not been seen before.
///
/// Only the top level of `folder` is scanned: sub-folders and their content
/// are never candidates. A `Scanner` owns its seen-set, so exactly one task
/// may scan at a time; the watch loop takes ownership once started.
#[derive(Debug)]
pub(crate) struct Scanner {
    folder: PathBuf,
    prefix: String,
    exclusions: HashSet<String>,
    seen: HashSet<String>,
}

struct Candidate {
    name: String,
    path: PathBuf,
    kind: ContainerKind,
}

impl Scanner {
    pub fn new(folder: PathBuf, prefix: String, exclusions: HashSet<String>) -> Self {
        Scanner {
            folder,
            prefix,
            exclusions,
            seen: HashSet::new(),
        }
    }

    pub fn folder(&self) -> &Path {
        self.folder.as_path()
    }

    /// Returns streams for every newly found file, heaviest first.
    ///
    /// Every new file is marked seen, including those that failed to open, so
    /// no file is ever picked up twice. An empty batch means nothing changed.
    pub async fn scan(&mut self) -> io::Result<Vec<FileStream>> {
        let mut candidates = Vec::new();

        let mut entries = fs::read_dir(&self.folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    log::trace!("Skipping non UTF-8 file name {:?}", name);
                    continue;
                }
            };

            if !self.is_candidate(&name) {
                continue;
            }

            let path = entry.path();
            if is_dir(&entry, &path).await {
                continue;
            }

            let kind = ContainerKind::classify(&name[self.prefix.len()..]);
            candidates.push(Candidate { name, path, kind });
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Name order first, so files of equal weight keep a stable order
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        candidates.sort_by(|a, b| a.kind.read_order(b.kind));

        let mut streams = Vec::with_capacity(candidates.len());
        for Candidate { name, path, kind } in candidates {
            self.seen.insert(name.clone());

            let stream = FileStream::open(name, path, kind).await;
            log::debug!("Discovered log file {} ({:?})", stream.name(), stream.kind());
            streams.push(stream);
        }

        Ok(streams)
    }

    fn is_candidate(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && !self.exclusions.contains(name)
            && !self.seen.contains(name)
    }
}

/// Directories are never candidates; neither are symlinks resolving to one.
/// A dangling symlink counts as a file, and fails to open later.
async fn is_dir(entry: &fs::DirEntry, path: &Path) -> bool {
    match entry.file_type().await {
        Ok(file_type) if file_type.is_dir() => true,
        Ok(file_type) if file_type.is_symlink() => fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false),
        Ok(_) => false,
        // Let the open attempt report it
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scanner(folder: &Path, prefix: &str, exclusions: &[&str]) -> Scanner {
        Scanner::new(
            folder.to_path_buf(),
            prefix.to_string(),
            exclusions.iter().map(|e| e.to_string()).collect(),
        )
    }

    fn names(streams: &[FileStream]) -> Vec<&str> {
        streams.iter().map(|s| s.name()).collect()
    }

    #[tokio::test]
    async fn test_scan_orders_batch() {
        let dir = tempdir().unwrap();
        for name in &["p-o2", "p-main", "p-i2", "p-o1", "p-i1", "p-sidecar"] {
            std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }

        let mut scanner = scanner(dir.path(), "p-", &[]);
        let streams = scanner.scan().await.unwrap();

        assert_eq!(
            names(&streams),
            vec!["p-i1", "p-i2", "p-main", "p-sidecar", "p-o1", "p-o2"]
        );
    }

    #[tokio::test]
    async fn test_scan_filters() {
        let dir = tempdir().unwrap();
        for name in &["p-i1", "p-main", "p-excluded", "q-i1", "main"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("p-subdir")).unwrap();
        std::fs::write(dir.path().join("p-subdir").join("p-nested"), b"x").unwrap();

        let mut scanner = scanner(dir.path(), "p-", &["p-excluded"]);
        let streams = scanner.scan().await.unwrap();

        assert_eq!(names(&streams), vec!["p-i1", "p-main"]);
    }

    #[tokio::test]
    async fn test_scan_only_new_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("p-main"), b"x").unwrap();

        let mut scanner = scanner(dir.path(), "p-", &[]);
        assert_eq!(scanner.scan().await.unwrap().len(), 1);
        assert!(scanner.scan().await.unwrap().is_empty());

        std::fs::write(dir.path().join("p-o1"), b"x").unwrap();
        std::fs::write(dir.path().join("p-i1"), b"x").unwrap();
        let streams = scanner.scan().await.unwrap();
        assert_eq!(names(&streams), vec!["p-i1", "p-o1"]);
        assert!(scanner.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_empty_prefix() {
        let dir = tempdir().unwrap();
        for name in &["o1", "main", "i1"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let mut scanner = scanner(dir.path(), "", &[]);
        let streams = scanner.scan().await.unwrap();
        assert_eq!(names(&streams), vec!["i1", "main", "o1"]);
    }

    #[tokio::test]
    async fn test_scan_missing_folder() {
        let dir = tempdir().unwrap();
        let mut scanner = scanner(&dir.path().join("missing"), "p-", &[]);
        assert!(scanner.scan().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_dangling_symlink_marked_seen() {
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("p-i1")).unwrap();

        let mut scanner = scanner(dir.path(), "p-", &[]);
        let streams = scanner.scan().await.unwrap();
        assert_eq!(names(&streams), vec!["p-i1"]);
        assert!(streams[0].is_failed());

        // Never retried
        assert!(scanner.scan().await.unwrap().is_empty());
    }
}
