//! Conflict classification (§4.E). A [`Conflict`] is a data value, never a
//! panic: the planner attaches one to every operation whose target state
//! doesn't match what's expected, and the executor or CLI decides what to
//! do about it via [`Resolution`].

use camino::Utf8PathBuf;

/// Severity tier used to classify conflicts independently of the coarser
/// two-tier [`crate::error::Severity`] the CLI uses for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// How a conflict was (or should be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No automatic resolution; the operation must not proceed.
    Abort,
    /// Replace whatever occupies the target path.
    Overwrite,
    /// Move the existing target aside before linking.
    Backup,
    /// Leave the target untouched and drop the operation.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A non-symlink file or directory already occupies the target path.
    TargetExists,
    /// The target path is a directory that cannot be replaced by a link
    /// without recursing (handled instead by folding/unfolding).
    TargetIsDirectory,
    /// A symlink already exists at the target but points somewhere else.
    LinkPointsElsewhere,
    /// The filesystem refused the operation for permission reasons.
    PermissionDenied,
    /// A managed-looking symlink's source no longer exists.
    OrphanedLink,
    /// Two packages both claim the same target path.
    PackageNameCollision,
    /// `adopt` was asked to import a target path that isn't actually
    /// present on disk.
    AdoptSourceMissing,
}

impl ConflictKind {
    pub fn default_severity(self) -> Severity {
        match self {
            ConflictKind::TargetExists => Severity::Error,
            ConflictKind::TargetIsDirectory => Severity::Error,
            ConflictKind::LinkPointsElsewhere => Severity::Error,
            ConflictKind::PermissionDenied => Severity::Error,
            ConflictKind::OrphanedLink => Severity::Warning,
            ConflictKind::PackageNameCollision => Severity::Error,
            ConflictKind::AdoptSourceMissing => Severity::Error,
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictKind::TargetExists => "target already exists",
            ConflictKind::TargetIsDirectory => "target is a directory",
            ConflictKind::LinkPointsElsewhere => "existing link points elsewhere",
            ConflictKind::PermissionDenied => "permission denied",
            ConflictKind::OrphanedLink => "link source no longer exists",
            ConflictKind::PackageNameCollision => "package name collision",
            ConflictKind::AdoptSourceMissing => "adopt source is missing",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub package: String,
    pub path: Utf8PathBuf,
    pub severity: Severity,
    pub resolution: Resolution,
    pub message: String,
}

impl Conflict {
    pub fn new(
        kind: ConflictKind,
        package: impl Into<String>,
        path: impl Into<Utf8PathBuf>,
        resolution: Resolution,
    ) -> Self {
        let path = path.into();
        let message = format!("{kind} at {path}");
        Self {
            kind,
            package: package.into(),
            path,
            severity: kind.default_severity(),
            resolution,
            message,
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.package, self.message)
    }
}

/// The worst severity across a set of conflicts, or `None` if empty.
pub fn worst(conflicts: &[Conflict]) -> Option<Severity> {
    conflicts.iter().map(|c| c.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_puts_error_above_warning_above_info() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn default_severity_matches_classification_table() {
        assert_eq!(ConflictKind::TargetExists.default_severity(), Severity::Error);
        assert_eq!(
            ConflictKind::LinkPointsElsewhere.default_severity(),
            Severity::Error
        );
        assert_eq!(ConflictKind::OrphanedLink.default_severity(), Severity::Warning);
    }

    #[test]
    fn worst_picks_the_highest_severity_present() {
        let conflicts = vec![
            Conflict::new(ConflictKind::OrphanedLink, "vim", "/home/.vimrc", Resolution::Skip),
            Conflict::new(
                ConflictKind::TargetExists,
                "vim",
                "/home/.vimrc",
                Resolution::Abort,
            ),
        ];
        assert_eq!(worst(&conflicts), Some(Severity::Error));
    }

    #[test]
    fn worst_of_empty_is_none() {
        assert_eq!(worst(&[]), None);
    }

    #[test]
    fn display_includes_package_and_kind() {
        let c = Conflict::new(
            ConflictKind::PermissionDenied,
            "zsh",
            "/home/.zshrc",
            Resolution::Abort,
        );
        let rendered = c.to_string();
        assert!(rendered.contains("zsh"));
        assert!(rendered.contains("permission denied"));
    }
}
