//! Planner (§4.F): turns scanned package entries into an ordered [`Plan`],
//! folding a package's directories into a single link where nothing else
//! claims them and unfolding them into real directories with per-file
//! links the moment something does.

use crate::conflict::{Conflict, ConflictKind, Resolution, Severity};
use crate::fs::{EntryKind, Filesystem};
use crate::manifest::{ManagedEntryKind, ManagedPath};
use crate::path::{untranslate, PackagePath, TargetPath, TypedPath};
use crate::plan::{Operation, Plan, PlanKind, PlannedOperation};
use crate::scanner::ScanEntry;
use camino::Utf8PathBuf;
use std::collections::{HashMap, HashSet};

/// What to do when a planned link collides with something already at the
/// target path. Chosen by the caller from CLI flags and the config's
/// `overwrite`/`backup`/`backup-suffix`/`backup-dir` defaults.
#[derive(Debug, Clone)]
pub struct ConflictPolicy {
    pub on_target_exists: Resolution,
    pub on_link_elsewhere: Resolution,
    pub backup_suffix: String,
    pub backup_dir: Option<Utf8PathBuf>,
}

impl ConflictPolicy {
    pub fn strict() -> Self {
        Self {
            on_target_exists: Resolution::Abort,
            on_link_elsewhere: Resolution::Abort,
            backup_suffix: ".bak".to_string(),
            backup_dir: None,
        }
    }

    pub fn force_with_backup() -> Self {
        Self {
            on_target_exists: Resolution::Backup,
            on_link_elsewhere: Resolution::Backup,
            backup_suffix: ".bak".to_string(),
            backup_dir: None,
        }
    }
}

#[derive(Clone)]
enum DirState {
    /// A real directory exists (or will exist) at this target path.
    Real,
    /// A single symlink stands in for this whole directory, owned by
    /// `package`, pointing at `pkg_rel` within that package's tree.
    Folded { package: String, pkg_rel: Utf8PathBuf },
    /// Something unresolvable occupies this path; children are skipped.
    Blocked,
}

pub struct Planner<'a> {
    fs: &'a dyn Filesystem,
    target_root: TargetPath,
}

impl<'a> Planner<'a> {
    pub fn new(fs: &'a dyn Filesystem, target_root: TargetPath) -> Self {
        Self { fs, target_root }
    }

    /// Build the plan that brings the target tree in line with the given
    /// packages' current content.
    pub fn plan_manage(
        &self,
        mut entries_by_package: Vec<(String, PackagePath, Vec<ScanEntry>)>,
        policy: ConflictPolicy,
        no_fold: &HashSet<String>,
    ) -> Plan {
        entries_by_package.sort_by(|a, b| a.0.cmp(&b.0));

        let owners = compute_owners(&entries_by_package);
        let mut dir_states: HashMap<Utf8PathBuf, DirState> = HashMap::new();
        let mut operations = Vec::new();
        let mut conflicts = Vec::new();
        let packages: Vec<String> = entries_by_package.iter().map(|(n, _, _)| n.clone()).collect();

        for (package, pkg_root, entries) in &entries_by_package {
            let mut folded_prefix: Option<Utf8PathBuf> = None;
            for entry in entries {
                if let Some(prefix) = &folded_prefix {
                    if is_under(&entry.target_rel, prefix) {
                        continue;
                    }
                    folded_prefix = None;
                }

                match entry.kind {
                    EntryKind::Directory => {
                        self.plan_directory(
                            package,
                            pkg_root,
                            entry,
                            &owners,
                            no_fold,
                            &entries_by_package,
                            &mut dir_states,
                            &mut operations,
                            &mut conflicts,
                            &mut folded_prefix,
                        );
                    }
                    EntryKind::File | EntryKind::Symlink => {
                        self.plan_leaf(package, pkg_root, entry, policy.clone(), &mut operations, &mut conflicts);
                    }
                }
            }
        }

        Plan::new(PlanKind::Manage, packages, operations, conflicts)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_directory(
        &self,
        package: &str,
        pkg_root: &PackagePath,
        entry: &ScanEntry,
        owners: &HashMap<Utf8PathBuf, HashSet<String>>,
        no_fold: &HashSet<String>,
        entries_by_package: &[(String, PackagePath, Vec<ScanEntry>)],
        dir_states: &mut HashMap<Utf8PathBuf, DirState>,
        operations: &mut Vec<PlannedOperation>,
        conflicts: &mut Vec<Conflict>,
        folded_prefix: &mut Option<Utf8PathBuf>,
    ) {
        let d = entry.target_rel.clone();
        if let Some(state) = dir_states.get(&d).cloned() {
            match state {
                DirState::Real => {}
                DirState::Blocked => {
                    *folded_prefix = Some(d);
                }
                DirState::Folded {
                    package: owner,
                    pkg_rel,
                } => {
                    self.unfold(&owner, &pkg_rel, &d, entries_by_package, dir_states, operations);
                    dir_states.insert(d, DirState::Real);
                }
            }
            return;
        }

        let Ok(target_path) = self.target_root.join(&d) else {
            conflicts.push(Conflict::new(
                ConflictKind::TargetExists,
                package,
                d.clone(),
                Resolution::Abort,
            ));
            dir_states.insert(d.clone(), DirState::Blocked);
            *folded_prefix = Some(d);
            return;
        };

        match self.fs.lstat(target_path.as_path()) {
            Ok(None) => {
                let sole_owner = owners.get(&d).map(|s| s.len() == 1).unwrap_or(true);
                if sole_owner && !no_fold.contains(package) {
                    let pointing_to = pkg_root
                        .join(&entry.pkg_rel)
                        .unwrap_or_else(|_| pkg_root.clone());
                    operations.push(PlannedOperation {
                        package: package.to_string(),
                        operation: Operation::LinkCreate {
                            link: target_path,
                            pointing_to,
                        },
                    });
                    dir_states.insert(
                        d.clone(),
                        DirState::Folded {
                            package: package.to_string(),
                            pkg_rel: entry.pkg_rel.clone(),
                        },
                    );
                    *folded_prefix = Some(d);
                } else {
                    operations.push(PlannedOperation {
                        package: package.to_string(),
                        operation: Operation::DirCreate { path: target_path },
                    });
                    dir_states.insert(d, DirState::Real);
                }
            }
            Ok(Some(meta)) if meta.kind == EntryKind::Directory => {
                dir_states.insert(d, DirState::Real);
            }
            Ok(Some(meta)) if meta.kind == EntryKind::Symlink => {
                let wanted = pkg_root.join(&entry.pkg_rel).ok();
                let existing = self.fs.read_link(target_path.as_path()).ok().flatten();
                match (existing, wanted) {
                    (Some(existing), Some(wanted)) if existing.as_path() == wanted.as_path() => {
                        dir_states.insert(
                            d.clone(),
                            DirState::Folded {
                                package: package.to_string(),
                                pkg_rel: entry.pkg_rel.clone(),
                            },
                        );
                        *folded_prefix = Some(d);
                    }
                    _ => {
                        conflicts.push(Conflict::new(
                            ConflictKind::LinkPointsElsewhere,
                            package,
                            target_path.as_path().to_path_buf(),
                            Resolution::Abort,
                        ));
                        dir_states.insert(d.clone(), DirState::Blocked);
                        *folded_prefix = Some(d);
                    }
                }
            }
            Ok(Some(_file_meta)) => {
                conflicts.push(Conflict::new(
                    ConflictKind::TargetIsDirectory,
                    package,
                    target_path.as_path().to_path_buf(),
                    Resolution::Abort,
                ));
                dir_states.insert(d.clone(), DirState::Blocked);
                *folded_prefix = Some(d);
            }
            Err(_) => {
                conflicts.push(Conflict::new(
                    ConflictKind::PermissionDenied,
                    package,
                    target_path.as_path().to_path_buf(),
                    Resolution::Abort,
                ));
                dir_states.insert(d.clone(), DirState::Blocked);
                *folded_prefix = Some(d);
            }
        }
    }

    /// Replace a single directory link owned by `owner` with a real
    /// directory plus one link per file the owning package places inside
    /// it. Nested directories are not re-folded: once unfolded, everything
    /// below becomes a real directory (a conservative, always-legal
    /// choice).
    fn unfold(
        &self,
        owner: &str,
        owner_pkg_rel: &Utf8PathBuf,
        dir: &Utf8PathBuf,
        entries_by_package: &[(String, PackagePath, Vec<ScanEntry>)],
        dir_states: &mut HashMap<Utf8PathBuf, DirState>,
        operations: &mut Vec<PlannedOperation>,
    ) {
        let Ok(dir_target_path) = self.target_root.join(dir) else {
            return;
        };
        operations.retain(|po| {
            !matches!(&po.operation, Operation::LinkCreate { link, .. } if link == &dir_target_path)
        });
        operations.push(PlannedOperation {
            package: owner.to_string(),
            operation: Operation::DirCreate {
                path: dir_target_path,
            },
        });

        let Some((_, owner_root, owner_entries)) =
            entries_by_package.iter().find(|(name, _, _)| name == owner)
        else {
            return;
        };
        let prefix = format!("{owner_pkg_rel}/");
        for child in owner_entries {
            if child.pkg_rel.as_str() == owner_pkg_rel.as_str()
                || !child.pkg_rel.as_str().starts_with(&prefix)
            {
                continue;
            }
            let Ok(target_path) = self.target_root.join(&child.target_rel) else {
                continue;
            };
            match child.kind {
                EntryKind::Directory => {
                    dir_states.insert(child.target_rel.clone(), DirState::Real);
                    operations.push(PlannedOperation {
                        package: owner.to_string(),
                        operation: Operation::DirCreate { path: target_path },
                    });
                }
                EntryKind::File | EntryKind::Symlink => {
                    let Ok(pointing_to) = owner_root.join(&child.pkg_rel) else {
                        continue;
                    };
                    operations.push(PlannedOperation {
                        package: owner.to_string(),
                        operation: Operation::LinkCreate {
                            link: target_path,
                            pointing_to,
                        },
                    });
                }
            }
        }
    }

    fn plan_leaf(
        &self,
        package: &str,
        pkg_root: &PackagePath,
        entry: &ScanEntry,
        policy: ConflictPolicy,
        operations: &mut Vec<PlannedOperation>,
        conflicts: &mut Vec<Conflict>,
    ) {
        let Ok(target_path) = self.target_root.join(&entry.target_rel) else {
            conflicts.push(Conflict::new(
                ConflictKind::TargetExists,
                package,
                entry.target_rel.clone(),
                Resolution::Abort,
            ));
            return;
        };
        let Ok(pointing_to) = pkg_root.join(&entry.pkg_rel) else {
            conflicts.push(Conflict::new(
                ConflictKind::TargetExists,
                package,
                entry.target_rel.clone(),
                Resolution::Abort,
            ));
            return;
        };

        match self.fs.lstat(target_path.as_path()) {
            Ok(None) => operations.push(PlannedOperation {
                package: package.to_string(),
                operation: Operation::LinkCreate {
                    link: target_path,
                    pointing_to,
                },
            }),
            Ok(Some(meta)) if meta.kind == EntryKind::Symlink => {
                let existing = self.fs.read_link(target_path.as_path()).ok().flatten();
                match existing {
                    Some(existing) if existing.as_path() == pointing_to.as_path() => {}
                    _ => {
                        let resolution = policy.on_link_elsewhere;
                        conflicts.push(Conflict::new(
                            ConflictKind::LinkPointsElsewhere,
                            package,
                            target_path.as_path().to_path_buf(),
                            resolution,
                        ));
                        if matches!(resolution, Resolution::Overwrite | Resolution::Backup) {
                            operations.push(PlannedOperation {
                                package: package.to_string(),
                                operation: Operation::LinkCreate {
                                    link: target_path,
                                    pointing_to,
                                },
                            });
                        }
                    }
                }
            }
            Ok(Some(meta)) => {
                let kind = if meta.kind == EntryKind::Directory {
                    ConflictKind::TargetIsDirectory
                } else {
                    ConflictKind::TargetExists
                };
                let resolution = if kind == ConflictKind::TargetIsDirectory {
                    Resolution::Abort
                } else {
                    policy.on_target_exists
                };
                conflicts.push(Conflict::new(
                    kind,
                    package,
                    target_path.as_path().to_path_buf(),
                    resolution,
                ));
                if matches!(resolution, Resolution::Overwrite | Resolution::Backup) {
                    let backup = backup_path(&target_path, &policy.backup_suffix, policy.backup_dir.as_ref());
                    operations.push(PlannedOperation {
                        package: package.to_string(),
                        operation: Operation::FileBackup {
                            path: target_path.clone(),
                            backup,
                        },
                    });
                    operations.push(PlannedOperation {
                        package: package.to_string(),
                        operation: Operation::LinkCreate {
                            link: target_path,
                            pointing_to,
                        },
                    });
                }
            }
            Err(_) => {
                conflicts.push(Conflict::new(
                    ConflictKind::PermissionDenied,
                    package,
                    target_path.as_path().to_path_buf(),
                    Resolution::Abort,
                ));
            }
        }
    }

    /// Remove previously-recorded managed paths, deepest first so files
    /// are gone before the directories that contained them.
    pub fn plan_unmanage(&self, paths: &[ManagedPath]) -> Plan {
        let mut sorted: Vec<&ManagedPath> = paths.iter().collect();
        sorted.sort_by(|a, b| depth(&b.target).cmp(&depth(&a.target)));
        let mut packages: Vec<String> = paths.iter().map(|p| p.package.clone()).collect();
        packages.sort();
        packages.dedup();

        let operations = sorted
            .into_iter()
            .map(|p| PlannedOperation {
                package: p.package.clone(),
                operation: match &p.kind {
                    ManagedEntryKind::Link(source) => Operation::LinkDelete {
                        link: p.target.clone(),
                        previous_target: source.clone(),
                    },
                    ManagedEntryKind::Dir => Operation::DirDelete {
                        path: p.target.clone(),
                    },
                },
            })
            .collect();

        Plan::new(PlanKind::Unmanage, packages, operations, vec![])
    }

    /// Re-derive the desired state from current package content, then
    /// prepend removals for anything `previous` recorded that the
    /// packages no longer produce at all. Targets that still exist with
    /// identical content never appear in either half: `plan_manage`
    /// already treats an on-disk link that already points where it
    /// should as a no-op, so there is nothing to collapse explicitly.
    pub fn plan_remanage(
        &self,
        entries_by_package: Vec<(String, PackagePath, Vec<ScanEntry>)>,
        previous: &[ManagedPath],
        policy: ConflictPolicy,
        no_fold: &HashSet<String>,
    ) -> Plan {
        let desired: HashSet<Utf8PathBuf> = entries_by_package
            .iter()
            .flat_map(|(_, _, entries)| entries.iter().map(|e| e.target_rel.clone()))
            .collect();

        let mut stale: Vec<&ManagedPath> = previous
            .iter()
            .filter(|p| {
                let rel = p
                    .target
                    .strip_root(&self.target_root)
                    .unwrap_or_else(|| p.target.as_path().to_path_buf());
                !desired.contains(&rel)
            })
            .collect();
        stale.sort_by(|a, b| depth(&b.target).cmp(&depth(&a.target)));

        let mut operations: Vec<PlannedOperation> = stale
            .into_iter()
            .map(|p| PlannedOperation {
                package: p.package.clone(),
                operation: match &p.kind {
                    ManagedEntryKind::Link(source) => Operation::LinkDelete {
                        link: p.target.clone(),
                        previous_target: source.clone(),
                    },
                    ManagedEntryKind::Dir => Operation::DirDelete {
                        path: p.target.clone(),
                    },
                },
            })
            .collect();

        // Files above the hash threshold can never be confirmed unchanged
        // by content, so they must never be silently treated as a no-op
        // just because a correctly-pointing link already exists (§4.F:
        // "large, not hashed" files are always changed for diff purposes).
        let mut forced_changed: Vec<(String, TargetPath, PackagePath)> = Vec::new();
        for (package, pkg_root, entries) in &entries_by_package {
            for entry in entries {
                if !entry.large_unhashed {
                    continue;
                }
                if let (Ok(target), Ok(pointing_to)) =
                    (self.target_root.join(&entry.target_rel), pkg_root.join(&entry.pkg_rel))
                {
                    forced_changed.push((package.clone(), target, pointing_to));
                }
            }
        }
        forced_changed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let forward = self.plan_manage(entries_by_package, policy, no_fold);
        let packages = forward.packages.clone();
        let conflicts = forward.conflicts.clone();
        let already_planned: HashSet<String> = forward
            .operations
            .iter()
            .map(|po| po.operation.target().to_string())
            .collect();

        for (package, target, pointing_to) in forced_changed {
            if already_planned.contains(target.as_str()) {
                continue;
            }
            operations.push(PlannedOperation {
                package: package.clone(),
                operation: Operation::LinkDelete {
                    link: target.clone(),
                    previous_target: pointing_to.clone(),
                },
            });
            operations.push(PlannedOperation {
                package,
                operation: Operation::LinkCreate {
                    link: target,
                    pointing_to,
                },
            });
        }
        operations.extend(forward.operations);

        Plan::new(PlanKind::Remanage, packages, operations, conflicts)
    }

    /// Move real, currently-unmanaged target files into a package's
    /// source tree and replace them with a link back to the same path.
    pub fn plan_adopt(
        &self,
        package: &str,
        pkg_root: &PackagePath,
        targets: &[TargetPath],
        dotfile_prefix: &str,
    ) -> Plan {
        let mut operations = Vec::new();
        let mut conflicts = Vec::new();

        for target in targets {
            if !self.fs.exists(target.as_path()) {
                conflicts.push(Conflict::new(
                    ConflictKind::AdoptSourceMissing,
                    package,
                    target.as_path().to_path_buf(),
                    Resolution::Abort,
                ));
                continue;
            }
            let Some(target_rel) = target.strip_root(&self.target_root) else {
                conflicts.push(Conflict::new(
                    ConflictKind::AdoptSourceMissing,
                    package,
                    target.as_path().to_path_buf(),
                    Resolution::Abort,
                ));
                continue;
            };
            let Ok(pkg_rel) = untranslate(&target_rel, dotfile_prefix) else {
                conflicts.push(Conflict::new(
                    ConflictKind::AdoptSourceMissing,
                    package,
                    target.as_path().to_path_buf(),
                    Resolution::Abort,
                ));
                continue;
            };
            let Ok(dest) = pkg_root.join(&pkg_rel) else {
                continue;
            };
            operations.push(PlannedOperation {
                package: package.to_string(),
                operation: Operation::FileMove {
                    from: target.clone(),
                    to: dest.clone(),
                },
            });
            operations.push(PlannedOperation {
                package: package.to_string(),
                operation: Operation::LinkCreate {
                    link: target.clone(),
                    pointing_to: dest,
                },
            });
        }

        Plan::new(PlanKind::Adopt, vec![package.to_string()], operations, conflicts)
    }
}

fn compute_owners(
    entries_by_package: &[(String, PackagePath, Vec<ScanEntry>)],
) -> HashMap<Utf8PathBuf, HashSet<String>> {
    let mut owners: HashMap<Utf8PathBuf, HashSet<String>> = HashMap::new();
    for (package, _, entries) in entries_by_package {
        for entry in entries {
            let mut cur = entry.target_rel.clone();
            while let Some(parent) = cur.parent() {
                if parent.as_str().is_empty() {
                    break;
                }
                owners
                    .entry(parent.to_path_buf())
                    .or_default()
                    .insert(package.clone());
                cur = parent.to_path_buf();
            }
            if entry.kind == EntryKind::Directory {
                owners
                    .entry(entry.target_rel.clone())
                    .or_default()
                    .insert(package.clone());
            }
        }
    }
    owners
}

fn is_under(path: &Utf8PathBuf, prefix: &Utf8PathBuf) -> bool {
    path.as_str() == prefix.as_str() || path.as_str().starts_with(&format!("{prefix}/"))
}

fn depth(path: &TargetPath) -> usize {
    path.as_str().matches('/').count()
}

/// Build the backup sibling of `path` using the configured suffix and,
/// if set, a separate backup directory (§8 scenario 4: `~/.vimrc` with
/// `backupSuffix=".bak"` backs up to `~/.vimrc.bak`).
fn backup_path(path: &TargetPath, suffix: &str, backup_dir: Option<&Utf8PathBuf>) -> TargetPath {
    let backup_str = match backup_dir {
        Some(dir) => {
            let file_name = path.file_name().unwrap_or("backup");
            format!("{dir}/{file_name}{suffix}")
        }
        None => format!("{path}{suffix}"),
    };
    TypedPath::new(backup_str).unwrap_or_else(|_| path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::ignore::IgnoreEngine;
    use crate::scanner::Scanner;
    use crate::fs::Cancellation;

    fn scan(fs: &MemFs, root: &PackagePath, package: &str) -> Vec<ScanEntry> {
        let ignore = IgnoreEngine::new(true, &[], &[]);
        let scanner = Scanner::new(fs, &ignore, true, "dot-");
        scanner
            .scan_package(root, package, &Cancellation::new())
            .unwrap()
            .entries
    }

    #[test]
    fn folds_a_sole_owning_package_directory() {
        let fs = MemFs::new();
        let pkg_root = PackagePath::new("/pkgs/nvim").unwrap();
        fs.put_file(&pkg_root.as_path().join("dot-config/init.lua"), b"x");
        let entries = scan(&fs, &pkg_root, "nvim");
        let target_root = TargetPath::new("/home").unwrap();
        let planner = Planner::new(&fs, target_root);
        let plan = planner.plan_manage(
            vec![("nvim".to_string(), pkg_root, entries)],
            ConflictPolicy::strict(),
            &HashSet::new(),
        );
        assert_eq!(plan.operations.len(), 1);
        assert!(matches!(
            plan.operations[0].operation,
            Operation::LinkCreate { .. }
        ));
    }

    #[test]
    fn unfolds_when_two_packages_share_a_directory() {
        let fs = MemFs::new();
        let nvim_root = PackagePath::new("/pkgs/nvim").unwrap();
        fs.put_file(&nvim_root.as_path().join("dot-config/nvim/init.lua"), b"a");
        let tmux_root = PackagePath::new("/pkgs/tmux").unwrap();
        fs.put_file(&tmux_root.as_path().join("dot-config/tmux.conf"), b"b");

        let nvim_entries = scan(&fs, &nvim_root, "nvim");
        let tmux_entries = scan(&fs, &tmux_root, "tmux");

        let target_root = TargetPath::new("/home").unwrap();
        let planner = Planner::new(&fs, target_root);
        let plan = planner.plan_manage(
            vec![
                ("nvim".to_string(), nvim_root, nvim_entries),
                ("tmux".to_string(), tmux_root, tmux_entries),
            ],
            ConflictPolicy::strict(),
            &HashSet::new(),
        );

        let dir_creates = plan
            .operations
            .iter()
            .filter(|po| matches!(po.operation, Operation::DirCreate { .. }))
            .count();
        assert!(dir_creates >= 1, "shared directory must be unfolded into a real dir");
    }

    #[test]
    fn idempotent_when_link_already_correct() {
        let fs = MemFs::new();
        let pkg_root = PackagePath::new("/pkgs/zsh").unwrap();
        fs.put_file(&pkg_root.as_path().join("dot-zshrc"), b"x");
        let entries = scan(&fs, &pkg_root, "zsh");
        fs.mkdir_p(camino::Utf8Path::new("/home"));
        fs.create_symlink(
            camino::Utf8Path::new("/home/.zshrc"),
            camino::Utf8Path::new("/pkgs/zsh/dot-zshrc"),
        )
        .unwrap();

        let target_root = TargetPath::new("/home").unwrap();
        let planner = Planner::new(&fs, target_root);
        let plan = planner.plan_manage(
            vec![("zsh".to_string(), pkg_root, entries)],
            ConflictPolicy::strict(),
            &HashSet::new(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn target_exists_with_strict_policy_is_a_blocking_conflict() {
        let fs = MemFs::new();
        let pkg_root = PackagePath::new("/pkgs/zsh").unwrap();
        fs.put_file(&pkg_root.as_path().join("dot-zshrc"), b"new");
        let entries = scan(&fs, &pkg_root, "zsh");
        fs.put_file(camino::Utf8Path::new("/home/.zshrc"), b"existing, unmanaged");

        let target_root = TargetPath::new("/home").unwrap();
        let planner = Planner::new(&fs, target_root);
        let plan = planner.plan_manage(
            vec![("zsh".to_string(), pkg_root, entries)],
            ConflictPolicy::strict(),
            &HashSet::new(),
        );
        assert!(plan.has_blocking_conflicts());
    }

    #[test]
    fn unmanage_orders_deepest_paths_first() {
        let fs = MemFs::new();
        let target_root = TargetPath::new("/home").unwrap();
        let planner = Planner::new(&fs, target_root);
        let paths = vec![
            ManagedPath {
                package: "nvim".into(),
                target: TargetPath::new("/home/.config").unwrap(),
                kind: ManagedEntryKind::Dir,
            },
            ManagedPath {
                package: "nvim".into(),
                target: TargetPath::new("/home/.config/nvim").unwrap(),
                kind: ManagedEntryKind::Link(PackagePath::new("/pkgs/nvim/dot-config/nvim").unwrap()),
            },
        ];
        let plan = planner.plan_unmanage(&paths);
        assert!(matches!(
            plan.operations[0].operation,
            Operation::LinkDelete { .. }
        ));
        assert!(matches!(
            plan.operations[1].operation,
            Operation::DirDelete { .. }
        ));
    }

    #[test]
    fn remanage_removes_stale_targets_the_package_no_longer_produces() {
        let fs = MemFs::new();
        let pkg_root = PackagePath::new("/pkgs/zsh").unwrap();
        fs.put_file(&pkg_root.as_path().join("dot-zshrc"), b"x");
        let entries = scan(&fs, &pkg_root, "zsh");

        let target_root = TargetPath::new("/home").unwrap();
        let planner = Planner::new(&fs, target_root);
        let previous = vec![ManagedPath {
            package: "zsh".into(),
            target: TargetPath::new("/home/.zprofile").unwrap(),
            kind: ManagedEntryKind::Link(PackagePath::new("/pkgs/zsh/dot-zprofile").unwrap()),
        }];
        let plan = planner.plan_remanage(
            vec![("zsh".to_string(), pkg_root, entries)],
            &previous,
            ConflictPolicy::strict(),
            &HashSet::new(),
        );
        assert!(plan.operations.iter().any(|po| matches!(
            &po.operation,
            Operation::LinkDelete { link, .. } if link.as_str() == "/home/.zprofile"
        )));
    }
}
