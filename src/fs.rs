//! Filesystem abstraction (§4.B). Every mutation the planner/executor make
//! goes through the [`Filesystem`] trait; [`RealFs`] backs production use
//! and [`MemFs`] backs the unit test suite for the scanner, conflict
//! detector, planner, and executor.

use crate::error::DotlinkError;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub kind: EntryKind,
    pub len: u64,
}

/// Cooperative cancellation token, checked between filesystem calls in
/// loops (the scanner, the executor). A single flag is sufficient at this
/// system's scale; see DESIGN.md for why this isn't threaded into every
/// individual trait method.
#[derive(Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), DotlinkError> {
        if self.is_cancelled() {
            Err(DotlinkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Uniform interface over a real filesystem and an in-memory one.
pub trait Filesystem: Send + Sync {
    /// Metadata following symlinks.
    fn stat(&self, path: &Utf8Path) -> std::io::Result<Option<Metadata>>;
    /// Metadata not following the final symlink component.
    fn lstat(&self, path: &Utf8Path) -> std::io::Result<Option<Metadata>>;
    /// Immediate children, sorted lexicographically, names only.
    fn read_dir(&self, path: &Utf8Path) -> std::io::Result<Vec<String>>;
    fn read_link(&self, path: &Utf8Path) -> std::io::Result<Option<Utf8PathBuf>>;
    fn create_dir(&self, path: &Utf8Path) -> std::io::Result<()>;
    fn create_symlink(&self, link: &Utf8Path, pointing_to: &Utf8Path) -> std::io::Result<()>;
    fn remove_file(&self, path: &Utf8Path) -> std::io::Result<()>;
    /// Removes an empty directory; errors if non-empty.
    fn remove_dir(&self, path: &Utf8Path) -> std::io::Result<()>;
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()>;
    fn exists(&self, path: &Utf8Path) -> bool {
        matches!(self.lstat(path), Ok(Some(_)))
    }
    fn read_file(&self, path: &Utf8Path) -> std::io::Result<Vec<u8>>;
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> std::io::Result<()>;
}

/// The OS-backed implementation.
pub struct RealFs;

impl Filesystem for RealFs {
    fn stat(&self, path: &Utf8Path) -> std::io::Result<Option<Metadata>> {
        match std::fs::metadata(path) {
            Ok(m) => Ok(Some(to_metadata(&m))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn lstat(&self, path: &Utf8Path) -> std::io::Result<Option<Metadata>> {
        match std::fs::symlink_metadata(path) {
            Ok(m) => Ok(Some(to_metadata(&m))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_dir(&self, path: &Utf8Path) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(s) = name.to_str() {
                names.push(s.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_link(&self, path: &Utf8Path) -> std::io::Result<Option<Utf8PathBuf>> {
        match std::fs::read_link(path) {
            Ok(p) => Ok(Some(
                Utf8PathBuf::from_path_buf(p).unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned())),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_dir(&self, path: &Utf8Path) -> std::io::Result<()> {
        std::fs::create_dir(path)
    }

    fn create_symlink(&self, link: &Utf8Path, pointing_to: &Utf8Path) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(pointing_to, link)
        }
        #[cfg(windows)]
        {
            if pointing_to.is_dir() {
                std::os::windows::fs::symlink_dir(pointing_to, link)
            } else {
                std::os::windows::fs::symlink_file(pointing_to, link)
            }
        }
    }

    fn remove_file(&self, path: &Utf8Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Utf8Path) -> std::io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()> {
        std::fs::rename(from, to)
    }

    fn read_file(&self, path: &Utf8Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> std::io::Result<()> {
        std::fs::write(path, contents)
    }
}

fn to_metadata(m: &std::fs::Metadata) -> Metadata {
    let kind = if m.is_symlink() {
        EntryKind::Symlink
    } else if m.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    Metadata {
        kind,
        len: m.len(),
    }
}

#[derive(Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink(Utf8PathBuf),
}

/// An in-memory filesystem for deterministic, fast unit tests. Paths are
/// stored absolute and lexically clean; directories are implicit in the
/// key prefix structure but tracked with explicit `Dir` entries so that
/// `read_dir`/`remove_dir` behave like a real filesystem.
#[derive(Clone)]
pub struct MemFs {
    nodes: Arc<Mutex<BTreeMap<Utf8PathBuf, Node>>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(Utf8PathBuf::from("/"), Node::Dir);
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
        }
    }

    /// Test convenience: pre-create a directory and its ancestors.
    pub fn mkdir_p(&self, path: &Utf8Path) {
        let mut cur = Utf8PathBuf::from("/");
        for comp in path.components().skip(1) {
            cur.push(comp.as_str());
            self.nodes
                .lock()
                .unwrap()
                .entry(cur.clone())
                .or_insert(Node::Dir);
        }
    }

    /// Test convenience: write a file, creating parent directories.
    pub fn put_file(&self, path: &Utf8Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            self.mkdir_p(parent);
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::File(contents.to_vec()));
    }

    /// Test convenience: create a symlink directly (bypassing parent checks).
    pub fn put_symlink(&self, path: &Utf8Path, target: &Utf8Path) {
        if let Some(parent) = path.parent() {
            self.mkdir_p(parent);
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::Symlink(target.to_path_buf()));
    }

    fn parent_must_be_dir(&self, path: &Utf8Path) -> std::io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("parent {parent} is not a directory"),
            )),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("parent {parent} does not exist"),
            )),
        }
    }
}

impl Filesystem for MemFs {
    fn stat(&self, path: &Utf8Path) -> std::io::Result<Option<Metadata>> {
        let resolved = self.lstat(path)?;
        match resolved {
            Some(Metadata {
                kind: EntryKind::Symlink,
                ..
            }) => {
                let target = self.read_link(path)?.expect("symlink has a target");
                // Follow one level; dangling symlinks resolve to None.
                self.stat(&target)
            }
            other => Ok(other),
        }
    }

    fn lstat(&self, path: &Utf8Path) -> std::io::Result<Option<Metadata>> {
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes.get(path).map(|n| match n {
            Node::File(contents) => Metadata {
                kind: EntryKind::File,
                len: contents.len() as u64,
            },
            Node::Dir => Metadata {
                kind: EntryKind::Directory,
                len: 0,
            },
            Node::Symlink(_) => Metadata {
                kind: EntryKind::Symlink,
                len: 0,
            },
        }))
    }

    fn read_dir(&self, path: &Utf8Path) -> std::io::Result<Vec<String>> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("{path} is not a directory"),
                ))
            }
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{path} does not exist"),
                ))
            }
        }
        let mut names = Vec::new();
        for candidate in nodes.keys() {
            if candidate == path {
                continue;
            }
            if let Ok(rel) = candidate.strip_prefix(path) {
                if rel.components().count() == 1 {
                    names.push(rel.as_str().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_link(&self, path: &Utf8Path) -> std::io::Result<Option<Utf8PathBuf>> {
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes.get(path).and_then(|n| match n {
            Node::Symlink(target) => Some(target.clone()),
            _ => None,
        }))
    }

    fn create_dir(&self, path: &Utf8Path) -> std::io::Result<()> {
        self.parent_must_be_dir(path)?;
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{path} already exists"),
            ));
        }
        nodes.insert(path.to_path_buf(), Node::Dir);
        Ok(())
    }

    fn create_symlink(&self, link: &Utf8Path, pointing_to: &Utf8Path) -> std::io::Result<()> {
        self.parent_must_be_dir(link)?;
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(link) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{link} already exists"),
            ));
        }
        nodes.insert(link.to_path_buf(), Node::Symlink(pointing_to.to_path_buf()));
        Ok(())
    }

    fn remove_file(&self, path: &Utf8Path) -> std::io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("{path} is a directory"),
                ))
            }
            Some(_) => {
                nodes.remove(path);
                Ok(())
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{path} does not exist"),
            )),
        }
    }

    fn remove_dir(&self, path: &Utf8Path) -> std::io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("{path} is not a directory"),
                ))
            }
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{path} does not exist"),
                ))
            }
        }
        let has_children = nodes
            .keys()
            .any(|k| k != path && k.strip_prefix(path).is_ok());
        if has_children {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{path} is not empty"),
            ));
        }
        nodes.remove(path);
        Ok(())
    }

    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()> {
        self.parent_must_be_dir(to)?;
        let mut nodes = self.nodes.lock().unwrap();
        let Some(node) = nodes.remove(from) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{from} does not exist"),
            ));
        };
        nodes.insert(to.to_path_buf(), node);
        Ok(())
    }

    fn read_file(&self, path: &Utf8Path) -> std::io::Result<Vec<u8>> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::File(contents)) => Ok(contents.clone()),
            Some(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{path} is not a file"),
            )),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{path} does not exist"),
            )),
        }
    }

    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> std::io::Result<()> {
        self.parent_must_be_dir(path)?;
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::File(contents.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_fs_create_dir_requires_existing_parent() {
        let fs = MemFs::new();
        let err = fs.create_dir(Utf8Path::new("/a/b")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn mem_fs_symlink_round_trip() {
        let fs = MemFs::new();
        fs.put_file(Utf8Path::new("/pkg/vimrc"), b"set nocompatible");
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.create_symlink(Utf8Path::new("/home/.vimrc"), Utf8Path::new("/pkg/vimrc"))
            .unwrap();
        let target = fs.read_link(Utf8Path::new("/home/.vimrc")).unwrap();
        assert_eq!(target, Some(Utf8PathBuf::from("/pkg/vimrc")));
        let meta = fs.lstat(Utf8Path::new("/home/.vimrc")).unwrap().unwrap();
        assert_eq!(meta.kind, EntryKind::Symlink);
        let followed = fs.stat(Utf8Path::new("/home/.vimrc")).unwrap().unwrap();
        assert_eq!(followed.kind, EntryKind::File);
    }

    #[test]
    fn mem_fs_dangling_symlink_stats_to_none() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.create_symlink(Utf8Path::new("/home/.vimrc"), Utf8Path::new("/pkg/vimrc"))
            .unwrap();
        assert!(fs.stat(Utf8Path::new("/home/.vimrc")).unwrap().is_none());
        assert!(fs.lstat(Utf8Path::new("/home/.vimrc")).unwrap().is_some());
    }

    #[test]
    fn mem_fs_remove_dir_requires_empty() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/a/b"));
        let err = fs.remove_dir(Utf8Path::new("/a")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
        fs.remove_dir(Utf8Path::new("/a/b")).unwrap();
        fs.remove_dir(Utf8Path::new("/a")).unwrap();
    }

    #[test]
    fn mem_fs_read_dir_lists_only_immediate_children() {
        let fs = MemFs::new();
        fs.put_file(Utf8Path::new("/a/b/c.txt"), b"x");
        fs.put_file(Utf8Path::new("/a/d.txt"), b"y");
        let mut names = fs.read_dir(Utf8Path::new("/a")).unwrap();
        names.sort();
        assert_eq!(names, vec!["b".to_string(), "d.txt".to_string()]);
    }

    #[test]
    fn cancellation_reports_once_cancelled() {
        let token = Cancellation::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(DotlinkError::Cancelled)));
    }
}
