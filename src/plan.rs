//! Plan and operation model (§3, §4.F). A [`Plan`] is an ordered,
//! content-addressed list of filesystem [`Operation`]s, each attributed to
//! the package that produced it, alongside the conflicts that were found
//! while building it.

use crate::conflict::Conflict;
use crate::path::{PackagePath, TargetPath};
use sha2::{Digest, Sha256};

/// A single filesystem mutation the executor can apply or invert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    DirCreate {
        path: TargetPath,
    },
    LinkCreate {
        link: TargetPath,
        pointing_to: PackagePath,
    },
    /// `previous_target` is the source the link pointed to before removal,
    /// always known (from the scan or the manifest) since this is always
    /// generated for a link that already existed.
    LinkDelete {
        link: TargetPath,
        previous_target: PackagePath,
    },
    DirDelete {
        path: TargetPath,
    },
    FileMove {
        from: TargetPath,
        to: TargetPath,
    },
    FileBackup {
        path: TargetPath,
        backup: TargetPath,
    },
}

impl Operation {
    /// The path this operation primarily acts on, used for ordering and
    /// reporting.
    pub fn target(&self) -> &TargetPath {
        match self {
            Operation::DirCreate { path } => path,
            Operation::LinkCreate { link, .. } => link,
            Operation::LinkDelete { link, .. } => link,
            Operation::DirDelete { path } => path,
            Operation::FileMove { to, .. } => to,
            Operation::FileBackup { backup, .. } => backup,
        }
    }

    /// The parent directory that must already exist before this operation
    /// can run, if any. Used by the planner's topological sort.
    pub fn requires_parent(&self) -> Option<TargetPath> {
        match self {
            Operation::DirCreate { path } => path.parent(),
            Operation::LinkCreate { link, .. } => link.parent(),
            Operation::FileMove { to, .. } => to.parent(),
            Operation::FileBackup { backup, .. } => backup.parent(),
            Operation::LinkDelete { .. } | Operation::DirDelete { .. } => None,
        }
    }

    /// The operation that undoes this one, used by the executor's rollback
    /// journal. Every variant has a well-defined inverse because
    /// `LinkDelete` always carries the source it's undoing back to.
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::DirCreate { path } => Operation::DirDelete { path: path.clone() },
            Operation::LinkCreate { link, pointing_to } => Operation::LinkDelete {
                link: link.clone(),
                previous_target: pointing_to.clone(),
            },
            Operation::LinkDelete {
                link,
                previous_target,
            } => Operation::LinkCreate {
                link: link.clone(),
                pointing_to: previous_target.clone(),
            },
            Operation::DirDelete { path } => Operation::DirCreate { path: path.clone() },
            Operation::FileMove { from, to } => Operation::FileMove {
                from: to.clone(),
                to: from.clone(),
            },
            Operation::FileBackup { path, backup } => Operation::FileMove {
                from: backup.clone(),
                to: path.clone(),
            },
        }
    }

    fn canonical(&self) -> String {
        match self {
            Operation::DirCreate { path } => format!("dir-create {path}"),
            Operation::LinkCreate { link, pointing_to } => {
                format!("link-create {link} -> {pointing_to}")
            }
            Operation::LinkDelete {
                link,
                previous_target,
            } => format!("link-delete {link} (was -> {previous_target})"),
            Operation::DirDelete { path } => format!("dir-delete {path}"),
            Operation::FileMove { from, to } => format!("file-move {from} -> {to}"),
            Operation::FileBackup { path, backup } => format!("file-backup {path} -> {backup}"),
        }
    }
}

/// An [`Operation`] together with the package that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOperation {
    pub package: String,
    pub operation: Operation,
}

/// Which public API call produced this plan, kept for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Manage,
    Unmanage,
    Remanage,
    Adopt,
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanKind::Manage => "manage",
            PlanKind::Unmanage => "unmanage",
            PlanKind::Remanage => "remanage",
            PlanKind::Adopt => "adopt",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub kind: PlanKind,
    pub packages: Vec<String>,
    pub operations: Vec<PlannedOperation>,
    pub conflicts: Vec<Conflict>,
    digest: String,
}

impl Plan {
    pub fn new(
        kind: PlanKind,
        packages: Vec<String>,
        operations: Vec<PlannedOperation>,
        conflicts: Vec<Conflict>,
    ) -> Self {
        let digest = compute_digest(kind, &packages, &operations);
        Self {
            kind,
            packages,
            operations,
            conflicts,
            digest,
        }
    }

    /// A stable content hash over the plan's kind, packages, and ordered
    /// operations. Two plans built from identical inputs always produce
    /// the same digest; this is the basis for the plan-determinism
    /// property.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn has_blocking_conflicts(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.severity == crate::conflict::Severity::Error)
    }
}

fn compute_digest(kind: PlanKind, packages: &[String], operations: &[PlannedOperation]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.to_string().as_bytes());
    for package in packages {
        hasher.update(b"\0pkg:");
        hasher.update(package.as_bytes());
    }
    for planned in operations {
        hasher.update(b"\0op:");
        hasher.update(planned.package.as_bytes());
        hasher.update(b":");
        hasher.update(planned.operation.canonical().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::TypedPath;

    fn t(p: &str) -> TargetPath {
        TypedPath::new(p).unwrap()
    }
    fn pkg(p: &str) -> PackagePath {
        TypedPath::new(p).unwrap()
    }

    #[test]
    fn link_create_and_link_delete_are_mutual_inverses() {
        let create = Operation::LinkCreate {
            link: t("/home/.vimrc"),
            pointing_to: pkg("/pkgs/vim/dot-vimrc"),
        };
        let delete = create.inverse();
        assert_eq!(delete.inverse(), create);
    }

    #[test]
    fn dir_create_and_dir_delete_are_mutual_inverses() {
        let create = Operation::DirCreate { path: t("/home/.config") };
        assert_eq!(create.inverse().inverse(), create);
    }

    #[test]
    fn file_backup_inverts_to_a_restoring_move() {
        let backup = Operation::FileBackup {
            path: t("/home/.vimrc"),
            backup: t("/home/.vimrc.dotlink-backup"),
        };
        assert_eq!(
            backup.inverse(),
            Operation::FileMove {
                from: t("/home/.vimrc.dotlink-backup"),
                to: t("/home/.vimrc"),
            }
        );
    }

    #[test]
    fn plan_digest_is_deterministic_for_identical_input() {
        let ops = vec![PlannedOperation {
            package: "vim".into(),
            operation: Operation::LinkCreate {
                link: t("/home/.vimrc"),
                pointing_to: pkg("/pkgs/vim/dot-vimrc"),
            },
        }];
        let a = Plan::new(PlanKind::Manage, vec!["vim".into()], ops.clone(), vec![]);
        let b = Plan::new(PlanKind::Manage, vec!["vim".into()], ops, vec![]);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn plan_digest_changes_with_operations() {
        let a = Plan::new(
            PlanKind::Manage,
            vec!["vim".into()],
            vec![PlannedOperation {
                package: "vim".into(),
                operation: Operation::DirCreate { path: t("/home/.config") },
            }],
            vec![],
        );
        let b = Plan::new(
            PlanKind::Manage,
            vec!["vim".into()],
            vec![PlannedOperation {
                package: "vim".into(),
                operation: Operation::DirCreate { path: t("/home/.other") },
            }],
            vec![],
        );
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn requires_parent_points_at_the_link_s_directory() {
        let op = Operation::LinkCreate {
            link: t("/home/.config/nvim"),
            pointing_to: pkg("/pkgs/vim/dot-config/nvim"),
        };
        assert_eq!(op.requires_parent(), Some(t("/home/.config")));
    }
}
