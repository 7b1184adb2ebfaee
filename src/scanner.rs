//! Package scanner (§4.D): walks a package tree into a deterministic,
//! depth-first stream of entries, applying the ignore engine and dotfile
//! name translation as it goes.

use crate::error::DotlinkError;
use crate::fs::{Cancellation, EntryKind, Filesystem};
use crate::ignore::IgnoreEngine;
use crate::path::{translate, PackagePath};
use camino::Utf8PathBuf;
use sha2::{Digest, Sha256};

/// A single scanned filesystem entry, already translated to its
/// target-relative name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub package: String,
    /// Path relative to the package root, pre-translation.
    pub pkg_rel: Utf8PathBuf,
    /// Path relative to the target root, post-translation.
    pub target_rel: Utf8PathBuf,
    pub kind: EntryKind,
    pub content_hash: Option<String>,
    /// Set when the file exceeded the hashing size threshold; such files
    /// are always treated as changed during a diff.
    pub large_unhashed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWarning {
    pub package: String,
    pub path: Utf8PathBuf,
    pub message: String,
}

pub struct ScanOutcome {
    pub entries: Vec<ScanEntry>,
    pub warnings: Vec<ScanWarning>,
}

pub struct Scanner<'a> {
    fs: &'a dyn Filesystem,
    ignore: &'a IgnoreEngine,
    translate_dotfiles: bool,
    dotfile_prefix: String,
    hash_size_threshold: u64,
}

/// Files larger than this are recorded as "large, not hashed" by default.
pub const DEFAULT_HASH_SIZE_THRESHOLD: u64 = 8 * 1024 * 1024;

impl<'a> Scanner<'a> {
    pub fn new(
        fs: &'a dyn Filesystem,
        ignore: &'a IgnoreEngine,
        translate_dotfiles: bool,
        dotfile_prefix: impl Into<String>,
    ) -> Self {
        Self {
            fs,
            ignore,
            translate_dotfiles,
            dotfile_prefix: dotfile_prefix.into(),
            hash_size_threshold: DEFAULT_HASH_SIZE_THRESHOLD,
        }
    }

    pub fn with_hash_size_threshold(mut self, threshold: u64) -> Self {
        self.hash_size_threshold = threshold;
        self
    }

    /// Scan a single package rooted at `pkg_root`. A missing package root
    /// is fatal; an unreadable descendant only produces a warning and the
    /// scan continues (§4.D failure semantics).
    pub fn scan_package(
        &self,
        pkg_root: &PackagePath,
        package: &str,
        cancel: &Cancellation,
    ) -> Result<ScanOutcome, DotlinkError> {
        if !self.fs.exists(pkg_root.as_path()) {
            return Err(DotlinkError::NotFound(format!(
                "package root does not exist: {pkg_root}"
            )));
        }
        let mut entries = Vec::new();
        let mut warnings = Vec::new();
        self.walk(pkg_root, pkg_root, package, &mut entries, &mut warnings, cancel)?;
        Ok(ScanOutcome { entries, warnings })
    }

    fn walk(
        &self,
        pkg_root: &PackagePath,
        dir: &PackagePath,
        package: &str,
        entries: &mut Vec<ScanEntry>,
        warnings: &mut Vec<ScanWarning>,
        cancel: &Cancellation,
    ) -> Result<(), DotlinkError> {
        cancel.check()?;
        let mut names = match self.fs.read_dir(dir.as_path()) {
            Ok(names) => names,
            Err(e) => {
                warnings.push(ScanWarning {
                    package: package.to_string(),
                    path: dir.as_path().to_path_buf(),
                    message: format!("cannot read directory: {e}"),
                });
                return Ok(());
            }
        };
        names.sort();

        for name in names {
            cancel.check()?;
            let child = dir.join(&name)?;
            let pkg_rel = child
                .strip_root(pkg_root)
                .ok_or_else(|| DotlinkError::Internal(format!("{child} is not under {pkg_root}")))?;

            if self.ignore.is_ignored(pkg_rel.as_str()) {
                continue;
            }

            let meta = match self.fs.lstat(child.as_path()) {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(e) => {
                    warnings.push(ScanWarning {
                        package: package.to_string(),
                        path: child.as_path().to_path_buf(),
                        message: format!("cannot stat entry: {e}"),
                    });
                    continue;
                }
            };

            let target_rel = if self.translate_dotfiles {
                translate(&pkg_rel, &self.dotfile_prefix)
                    .map_err(|e| DotlinkError::Validation(format!("{pkg_rel}: {e}")))?
            } else {
                pkg_rel.clone()
            };

            match meta.kind {
                EntryKind::Directory => {
                    entries.push(ScanEntry {
                        package: package.to_string(),
                        pkg_rel: pkg_rel.clone(),
                        target_rel,
                        kind: EntryKind::Directory,
                        content_hash: None,
                        large_unhashed: false,
                    });
                    self.walk(pkg_root, &child, package, entries, warnings, cancel)?;
                }
                EntryKind::Symlink => {
                    entries.push(ScanEntry {
                        package: package.to_string(),
                        pkg_rel,
                        target_rel,
                        kind: EntryKind::Symlink,
                        content_hash: None,
                        large_unhashed: false,
                    });
                }
                EntryKind::File => {
                    let (content_hash, large_unhashed) = if meta.len <= self.hash_size_threshold {
                        match self.fs.read_file(child.as_path()) {
                            Ok(bytes) => (Some(hash_bytes(&bytes)), false),
                            Err(e) => {
                                warnings.push(ScanWarning {
                                    package: package.to_string(),
                                    path: child.as_path().to_path_buf(),
                                    message: format!("cannot read file to hash: {e}"),
                                });
                                (None, true)
                            }
                        }
                    } else {
                        (None, true)
                    };
                    entries.push(ScanEntry {
                        package: package.to_string(),
                        pkg_rel,
                        target_rel,
                        kind: EntryKind::File,
                        content_hash,
                        large_unhashed,
                    });
                }
            }
        }
        Ok(())
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
