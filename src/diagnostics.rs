//! Diagnostics (§4.I): audits the live filesystem against the manifest
//! for broken links, drifted links, and symlinks inside the target tree
//! that point into a package but were never recorded.

use crate::error::DotlinkError;
use crate::fs::{Cancellation, EntryKind, Filesystem};
use crate::manifest::{ManagedEntryKind, Manifest};
use crate::path::{PackagePath, TargetPath};
use camino::Utf8PathBuf;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Manifest-only: no live directory walk at all.
    Off,
    /// Walk only the directories that already contain a managed link.
    Scoped,
    /// Walk the whole target subtree up to `max_depth`.
    Deep,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub mode: ScanMode,
    pub max_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Scoped,
            max_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    Broken,
    Drift,
    Orphan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub kind: FindingKind,
    pub path: Utf8PathBuf,
    pub message: String,
    pub suggestion: String,
    pub severity: FindingSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Health {
    Ok,
    Warnings,
    Errors,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub health: Health,
}

pub struct Diagnostics<'a> {
    fs: &'a dyn Filesystem,
    target_root: TargetPath,
    package_root: PackagePath,
}

impl<'a> Diagnostics<'a> {
    pub fn new(fs: &'a dyn Filesystem, target_root: TargetPath, package_root: PackagePath) -> Self {
        Self {
            fs,
            target_root,
            package_root,
        }
    }

    pub fn run(&self, manifest: &Manifest, scan: ScanConfig, cancel: &Cancellation) -> Result<Report, DotlinkError> {
        let mut findings = Vec::new();
        let managed = manifest.all_paths();
        let mut managed_targets: HashSet<Utf8PathBuf> = HashSet::new();

        for entry in &managed {
            cancel.check()?;
            managed_targets.insert(entry.target.as_path().to_path_buf());
            let ManagedEntryKind::Link(source) = &entry.kind else {
                continue;
            };
            match self.fs.read_link(entry.target.as_path()) {
                Ok(Some(actual)) if actual.as_path() == source.as_path() => {
                    if !self.fs.exists(source.as_path()) {
                        findings.push(Finding {
                            kind: FindingKind::Broken,
                            path: entry.target.as_path().to_path_buf(),
                            message: format!("{} points to a source that no longer exists", entry.target),
                            suggestion: format!("run `dotlink remanage {}`", entry.package),
                            severity: FindingSeverity::Error,
                        });
                    }
                }
                Ok(Some(_actual)) => {
                    findings.push(Finding {
                        kind: FindingKind::Drift,
                        path: entry.target.as_path().to_path_buf(),
                        message: format!("{} no longer points where the manifest expects", entry.target),
                        suggestion: format!("run `dotlink remanage {}` to restore it", entry.package),
                        severity: FindingSeverity::Error,
                    });
                }
                Ok(None) => {
                    findings.push(Finding {
                        kind: FindingKind::Broken,
                        path: entry.target.as_path().to_path_buf(),
                        message: format!("{} is recorded as managed but no longer exists", entry.target),
                        suggestion: format!("run `dotlink remanage {}` to recreate it", entry.package),
                        severity: FindingSeverity::Error,
                    });
                }
                Err(_) => {}
            }
        }

        if scan.mode != ScanMode::Off {
            self.scan_for_orphans(&managed_targets, scan, &mut findings, cancel)?;
        }

        let health = if findings.iter().any(|f| f.severity == FindingSeverity::Error) {
            Health::Errors
        } else if !findings.is_empty() {
            Health::Warnings
        } else {
            Health::Ok
        };

        Ok(Report { findings, health })
    }

    fn scan_for_orphans(
        &self,
        managed: &HashSet<Utf8PathBuf>,
        scan: ScanConfig,
        findings: &mut Vec<Finding>,
        cancel: &Cancellation,
    ) -> Result<(), DotlinkError> {
        let roots: Vec<Utf8PathBuf> = match scan.mode {
            ScanMode::Off => return Ok(()),
            ScanMode::Scoped => {
                let mut dirs: HashSet<Utf8PathBuf> = HashSet::new();
                for path in managed {
                    if let Some(parent) = path.parent() {
                        dirs.insert(parent.to_path_buf());
                    }
                }
                dirs.into_iter().collect()
            }
            ScanMode::Deep => vec![self.target_root.as_path().to_path_buf()],
        };

        for root in roots {
            self.walk_for_orphans(&root, managed, scan.max_depth, 0, findings, cancel)?;
        }
        Ok(())
    }

    fn walk_for_orphans(
        &self,
        dir: &Utf8PathBuf,
        managed: &HashSet<Utf8PathBuf>,
        max_depth: usize,
        depth: usize,
        findings: &mut Vec<Finding>,
        cancel: &Cancellation,
    ) -> Result<(), DotlinkError> {
        cancel.check()?;
        if depth > max_depth {
            return Ok(());
        }
        let Ok(names) = self.fs.read_dir(dir) else {
            return Ok(());
        };
        for name in names {
            let child = dir.join(&name);
            if managed.contains(&child) {
                continue;
            }
            match self.fs.lstat(&child) {
                Ok(Some(meta)) if meta.kind == EntryKind::Symlink => {
                    if let Ok(Some(target)) = self.fs.read_link(&child) {
                        if target.as_str().starts_with(self.package_root.as_str()) {
                            findings.push(Finding {
                                kind: FindingKind::Orphan,
                                path: child.clone(),
                                message: format!("{child} links into a package but isn't recorded in the manifest"),
                                suggestion: "run `dotlink adopt` or manage the owning package".to_string(),
                                severity: FindingSeverity::Warning,
                            });
                        }
                    }
                }
                Ok(Some(meta)) if meta.kind == EntryKind::Directory => {
                    self.walk_for_orphans(&child, managed, max_depth, depth + 1, findings, cancel)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::path::TypedPath;
    use camino::Utf8Path;

    fn t(p: &str) -> TargetPath {
        TypedPath::new(p).unwrap()
    }
    fn pkg(p: &str) -> PackagePath {
        TypedPath::new(p).unwrap()
    }

    fn manifest_with_link(target: &str, source: &str, package: &str) -> Manifest {
        use crate::plan::{Operation, Plan, PlanKind, PlannedOperation};
        let mut manifest = Manifest::new();
        manifest.apply_plan(&Plan::new(
            PlanKind::Manage,
            vec![package.to_string()],
            vec![PlannedOperation {
                package: package.to_string(),
                operation: Operation::LinkCreate {
                    link: t(target),
                    pointing_to: pkg(source),
                },
            }],
            vec![],
        ));
        manifest
    }

    #[test]
    fn detects_a_broken_link_whose_source_vanished() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.put_symlink(Utf8Path::new("/home/.vimrc"), Utf8Path::new("/pkgs/vim/dot-vimrc"));
        let manifest = manifest_with_link("/home/.vimrc", "/pkgs/vim/dot-vimrc", "vim");

        let diagnostics = Diagnostics::new(&fs, t("/home"), pkg("/pkgs"));
        let report = diagnostics
            .run(&manifest, ScanConfig { mode: ScanMode::Off, max_depth: 0 }, &Cancellation::new())
            .unwrap();
        assert_eq!(report.health, Health::Errors);
        assert!(report.findings.iter().any(|f| f.kind == FindingKind::Broken));
    }

    #[test]
    fn clean_state_reports_ok_health() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.put_file(Utf8Path::new("/pkgs/vim/dot-vimrc"), b"x");
        fs.put_symlink(Utf8Path::new("/home/.vimrc"), Utf8Path::new("/pkgs/vim/dot-vimrc"));
        let manifest = manifest_with_link("/home/.vimrc", "/pkgs/vim/dot-vimrc", "vim");

        let diagnostics = Diagnostics::new(&fs, t("/home"), pkg("/pkgs"));
        let report = diagnostics
            .run(&manifest, ScanConfig { mode: ScanMode::Off, max_depth: 0 }, &Cancellation::new())
            .unwrap();
        assert_eq!(report.health, Health::Ok);
    }

    #[test]
    fn scoped_scan_finds_an_unrecorded_link_into_a_package() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.put_file(Utf8Path::new("/pkgs/vim/dot-vimrc"), b"x");
        fs.put_symlink(Utf8Path::new("/home/.vimrc"), Utf8Path::new("/pkgs/vim/dot-vimrc"));
        fs.put_file(Utf8Path::new("/pkgs/tmux/dot-tmux.conf"), b"y");
        fs.put_symlink(Utf8Path::new("/home/.tmux.conf"), Utf8Path::new("/pkgs/tmux/dot-tmux.conf"));
        let manifest = manifest_with_link("/home/.vimrc", "/pkgs/vim/dot-vimrc", "vim");

        let diagnostics = Diagnostics::new(&fs, t("/home"), pkg("/pkgs"));
        let report = diagnostics
            .run(
                &manifest,
                ScanConfig { mode: ScanMode::Scoped, max_depth: 4 },
                &Cancellation::new(),
            )
            .unwrap();
        assert!(report.findings.iter().any(|f| f.kind == FindingKind::Orphan));
    }
}
