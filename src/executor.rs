//! Two-phase transactional executor (§4.G). Phase 1 validates a plan's
//! preconditions against live filesystem state; phase 2 applies operations
//! in order, journaling each success so a mid-plan failure can be rolled
//! back by replaying inverses in reverse.

use crate::error::DotlinkError;
use crate::fs::{Cancellation, Filesystem};
use crate::plan::{Operation, Plan};
use std::collections::HashSet;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub applied: usize,
}

pub struct Executor<'a> {
    fs: &'a dyn Filesystem,
    /// Whether a failed operation rolls back everything journaled so far
    /// (`operations.atomic`, default true). When false, a failure is
    /// reported but whatever already applied is left in place.
    atomic: bool,
}

impl<'a> Executor<'a> {
    pub fn new(fs: &'a dyn Filesystem, atomic: bool) -> Self {
        Self { fs, atomic }
    }

    /// Confirm every operation's parent directory already exists or will
    /// have been created by an earlier `DirCreate` in the same plan.
    pub fn validate(&self, plan: &Plan) -> Result<(), DotlinkError> {
        let mut created: HashSet<String> = HashSet::new();
        for planned in &plan.operations {
            if let Some(parent) = planned.operation.requires_parent() {
                if !self.fs.exists(parent.as_path()) && !created.contains(parent.as_str()) {
                    return Err(DotlinkError::Validation(format!(
                        "missing parent directory for {}: {parent}",
                        planned.operation.target()
                    )));
                }
            }
            if let Operation::DirCreate { path } = &planned.operation {
                created.insert(path.to_string());
            }
        }
        Ok(())
    }

    /// Apply every operation, rolling back everything journaled so far on
    /// the first failure. The returned error always carries the original
    /// cause; rollback residue is appended rather than replacing it.
    pub fn apply(&self, plan: &Plan, cancel: &Cancellation) -> Result<ExecutionReport, DotlinkError> {
        let mut journal: Vec<Operation> = Vec::new();

        for planned in &plan.operations {
            if let Err(e) = cancel.check() {
                let residue = self.rollback_if_atomic(&journal);
                return Err(self.wrap_rollback(e, residue));
            }
            match self.apply_one(&planned.operation) {
                Ok(()) => {
                    info!(package = %planned.package, op = ?planned.operation, "applied operation");
                    journal.push(planned.operation.clone());
                }
                Err(e) => {
                    error!(package = %planned.package, op = ?planned.operation, error = %e, "operation failed");
                    let residue = self.rollback_if_atomic(&journal);
                    return Err(self.wrap_rollback(e, residue));
                }
            }
        }

        Ok(ExecutionReport { applied: journal.len() })
    }

    fn wrap_rollback(&self, cause: DotlinkError, residue: Vec<String>) -> DotlinkError {
        if residue.is_empty() {
            cause
        } else {
            DotlinkError::Internal(format!("{cause}; rollback residue: {}", residue.join("; ")))
        }
    }

    /// Roll back the journal unless running non-atomically, in which case
    /// whatever already applied is left as-is and reported as residue.
    fn rollback_if_atomic(&self, journal: &[Operation]) -> Vec<String> {
        if !self.atomic {
            return journal
                .iter()
                .map(|op| format!("left applied (non-atomic run): {op:?}"))
                .collect();
        }
        self.rollback(journal)
    }

    /// Undo every journaled operation in reverse. A `DirCreate`'s inverse
    /// only runs if the directory is still empty; a non-empty directory is
    /// left in place and recorded as residue rather than forced away.
    fn rollback(&self, journal: &[Operation]) -> Vec<String> {
        let mut residue = Vec::new();
        for op in journal.iter().rev() {
            let inverse = op.inverse();
            if let Operation::DirDelete { path } = &inverse {
                match self.fs.read_dir(path.as_path()) {
                    Ok(names) if names.is_empty() => {
                        if let Err(e) = self.fs.remove_dir(path.as_path()) {
                            residue.push(format!("failed to remove {path} during rollback: {e}"));
                        }
                    }
                    Ok(_) => {
                        warn!(%path, "left non-empty directory in place during rollback");
                        residue.push(format!("left non-empty directory in place: {path}"));
                    }
                    Err(e) => {
                        residue.push(format!("could not inspect {path} during rollback: {e}"));
                    }
                }
                continue;
            }
            if let Err(e) = self.apply_one(&inverse) {
                residue.push(format!("rollback of {op:?} failed: {e}"));
            }
        }
        residue
    }

    fn apply_one(&self, op: &Operation) -> Result<(), DotlinkError> {
        match op {
            Operation::DirCreate { path } => self
                .fs
                .create_dir(path.as_path())
                .map_err(|e| DotlinkError::io(path.as_path(), e)),
            Operation::LinkCreate { link, pointing_to } => self
                .fs
                .create_symlink(link.as_path(), pointing_to.as_path())
                .map_err(|e| DotlinkError::io(link.as_path(), e)),
            Operation::LinkDelete { link, .. } => self
                .fs
                .remove_file(link.as_path())
                .map_err(|e| DotlinkError::io(link.as_path(), e)),
            Operation::DirDelete { path } => self
                .fs
                .remove_dir(path.as_path())
                .map_err(|e| DotlinkError::io(path.as_path(), e)),
            Operation::FileMove { from, to } => self
                .fs
                .rename(from.as_path(), to.as_path())
                .map_err(|e| DotlinkError::io(to.as_path(), e)),
            Operation::FileBackup { path, backup } => self
                .fs
                .rename(path.as_path(), backup.as_path())
                .map_err(|e| DotlinkError::io(backup.as_path(), e)),
        }
    }
}
