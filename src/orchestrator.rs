//! Orchestrator (§4.J): thin composition binding the scanner, planner,
//! executor, manifest store, and diagnostics into the public operations a
//! CLI or library caller invokes. No algorithm lives here; this module
//! only sequences calls into 4.D–4.I.

use crate::config::{DotlinkConfig, LinkStrategy, PackageSpec};
use crate::diagnostics::{Diagnostics, Report, ScanConfig};
use crate::error::DotlinkError;
use crate::executor::Executor;
use crate::fs::{Cancellation, Filesystem};
use crate::ignore::IgnoreEngine;
use crate::manifest::Manifest;
use crate::path::{PackagePath, TargetPath};
use crate::plan::Plan;
use crate::planner::{ConflictPolicy, Planner};
use crate::scanner::{ScanEntry, Scanner};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Per-call bundle of resolved config, filesystem handle, and derived
/// roots. Constructed once per CLI invocation; carries no long-lived
/// mutable state beyond the cooperative cancellation flag.
pub struct Context {
    pub config: DotlinkConfig,
    pub fs: Box<dyn Filesystem>,
    pub package_root: PackagePath,
    pub target_root: TargetPath,
    pub manifest_path: Utf8PathBuf,
    pub policy: ConflictPolicy,
    pub cancel: Cancellation,
}

impl Context {
    pub fn new(
        config: DotlinkConfig,
        fs: Box<dyn Filesystem>,
        overwrite: bool,
        backup: bool,
    ) -> Result<Self, DotlinkError> {
        let cwd = Utf8PathBuf::from_path_buf(
            std::env::current_dir().map_err(|e| DotlinkError::io(Utf8PathBuf::from("."), e))?,
        )
        .map_err(|_| DotlinkError::Validation("current directory is not valid UTF-8".into()))?;

        let target_root_path = expand_path(&config.target_dir, &cwd)?;
        let package_root = PackagePath::new(expand_path(&config.package_dir, &cwd)?)?;
        let target_root = TargetPath::new(target_root_path.clone())?;
        let manifest_path = if config.manifest_path.is_absolute() {
            config.manifest_path.clone()
        } else {
            target_root_path.join(&config.manifest_path)
        };
        let mut policy = config.conflict_policy(overwrite, backup);
        if let Some(dir) = &config.backup_dir {
            policy.backup_dir = Some(expand_path(dir, &cwd)?);
        }

        Ok(Self {
            config,
            fs,
            package_root,
            target_root,
            manifest_path,
            policy,
            cancel: Cancellation::new(),
        })
    }

    fn ignore_engine(&self) -> IgnoreEngine {
        IgnoreEngine::new(
            self.config.use_default_ignores,
            &self.config.ignore_patterns,
            &self.config.ignore_overrides,
        )
    }

    fn no_fold(&self) -> HashSet<String> {
        if !self.config.symlink_folding {
            return self.config.packages.iter().map(|p| p.name.clone()).collect();
        }
        self.config
            .packages
            .iter()
            .filter(|p| p.strategy == LinkStrategy::Unfold)
            .map(|p| p.name.clone())
            .collect()
    }

    fn find_package(&self, name: &str) -> Result<&PackageSpec, DotlinkError> {
        self.config
            .packages
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| DotlinkError::NotFound(format!("no package named {name}")))
    }

    fn selected_packages(&self, names: &[String]) -> Result<Vec<&PackageSpec>, DotlinkError> {
        if names.is_empty() {
            Ok(self.config.packages.iter().collect())
        } else {
            names.iter().map(|n| self.find_package(n)).collect()
        }
    }

    fn scan_packages(&self, names: &[String]) -> Result<Vec<(String, PackagePath, Vec<ScanEntry>)>, DotlinkError> {
        let ignore = self.ignore_engine();
        let scanner = Scanner::new(
            self.fs.as_ref(),
            &ignore,
            self.config.translate_dotfiles,
            self.config.dotfile_prefix.clone(),
        );
        let specs = self.selected_packages(names)?;
        let mut out = Vec::new();
        for spec in specs {
            let pkg_root = self.package_root.join(&spec.source)?;
            let outcome = scanner.scan_package(&pkg_root, &spec.name, &self.cancel)?;
            for warning in &outcome.warnings {
                tracing::debug!(
                    package = %warning.package,
                    path = %warning.path,
                    message = %warning.message,
                    "scan warning"
                );
            }
            out.push((spec.name.clone(), pkg_root, outcome.entries));
        }
        Ok(out)
    }
}

fn expand_path(path: &Utf8PathBuf, base: &Utf8Path) -> Result<Utf8PathBuf, DotlinkError> {
    let s = path.as_str();
    if let Some(rest) = s.strip_prefix("~/") {
        Ok(Utf8PathBuf::from(home_dir()?).join(rest))
    } else if s == "~" {
        Ok(Utf8PathBuf::from(home_dir()?))
    } else if path.is_absolute() {
        Ok(path.clone())
    } else {
        Ok(base.join(path))
    }
}

fn home_dir() -> Result<String, DotlinkError> {
    std::env::var("HOME").map_err(|_| DotlinkError::Validation("HOME environment variable not set".into()))
}

#[derive(Debug, Clone)]
pub struct ManageReport {
    pub plan: Plan,
    pub executed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UnmanageOptions {
    pub dry_run: bool,
    pub purge_all: bool,
}

#[derive(Debug, Clone)]
pub struct AdoptReport {
    pub plan: Plan,
}

#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    pub source: Utf8PathBuf,
    pub strategy: LinkStrategy,
    pub managed_link_count: usize,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub packages: Vec<PackageInfo>,
    pub manifest_path: Utf8PathBuf,
}

pub fn plan_manage(ctx: &Context, packages: &[String]) -> Result<Plan, DotlinkError> {
    let entries = ctx.scan_packages(packages)?;
    let planner = Planner::new(ctx.fs.as_ref(), ctx.target_root.clone());
    Ok(planner.plan_manage(entries, ctx.policy.clone(), &ctx.no_fold()))
}

/// Absolute target path -> content hash, built from a scan so it can be
/// folded into the manifest alongside the plan that used it.
fn hashes_from_entries(entries: &[(String, PackagePath, Vec<ScanEntry>)], ctx: &Context) -> HashMap<String, String> {
    let mut hashes = HashMap::new();
    for (_, _, scan_entries) in entries {
        for entry in scan_entries {
            if let Some(hash) = &entry.content_hash {
                if let Ok(target) = ctx.target_root.join(&entry.target_rel) {
                    hashes.insert(target.to_string(), hash.clone());
                }
            }
        }
    }
    hashes
}

/// Bring the target tree in line with the given packages (all configured
/// packages if empty). Aborts without touching the filesystem if the
/// plan carries a blocking conflict.
pub fn manage(ctx: &Context, packages: &[String], dry_run: bool) -> Result<ManageReport, DotlinkError> {
    let entries = ctx.scan_packages(packages)?;
    let hashes = hashes_from_entries(&entries, ctx);
    let planner = Planner::new(ctx.fs.as_ref(), ctx.target_root.clone());
    let plan = planner.plan_manage(entries, ctx.policy.clone(), &ctx.no_fold());
    if plan.has_blocking_conflicts() {
        return Err(DotlinkError::Conflict(plan.conflicts.clone()));
    }
    if dry_run || plan.is_empty() {
        return Ok(ManageReport { plan, executed: false });
    }

    let executor = Executor::new(ctx.fs.as_ref(), ctx.config.atomic);
    executor.validate(&plan)?;
    executor.apply(&plan, &ctx.cancel)?;

    let mut manifest = Manifest::load(&ctx.manifest_path, ctx.fs.as_ref())?;
    manifest.apply_plan(&plan, &hashes);
    manifest.save(&ctx.manifest_path, ctx.fs.as_ref())?;
    info!(packages = ?plan.packages, "managed");
    Ok(ManageReport { plan, executed: true })
}

pub fn unmanage(ctx: &Context, opts: UnmanageOptions, packages: &[String]) -> Result<ManageReport, DotlinkError> {
    let manifest = Manifest::load(&ctx.manifest_path, ctx.fs.as_ref())?;
    let targets = if opts.purge_all || packages.is_empty() {
        manifest.all_paths()
    } else {
        packages.iter().flat_map(|p| manifest.paths_for_package(p)).collect()
    };

    let planner = Planner::new(ctx.fs.as_ref(), ctx.target_root.clone());
    let plan = planner.plan_unmanage(&targets);
    if opts.dry_run || plan.is_empty() {
        return Ok(ManageReport { plan, executed: false });
    }

    let executor = Executor::new(ctx.fs.as_ref(), ctx.config.atomic);
    executor.validate(&plan)?;
    executor.apply(&plan, &ctx.cancel)?;

    let mut manifest = manifest;
    manifest.apply_plan(&plan, &HashMap::new());
    manifest.save(&ctx.manifest_path, ctx.fs.as_ref())?;
    info!(packages = ?plan.packages, "unmanaged");
    Ok(ManageReport { plan, executed: true })
}

/// Re-derive each package's plan from its current content and remove
/// whatever the manifest previously recorded that the package no longer
/// produces.
pub fn remanage(ctx: &Context, packages: &[String], dry_run: bool) -> Result<ManageReport, DotlinkError> {
    let entries = ctx.scan_packages(packages)?;
    let hashes = hashes_from_entries(&entries, ctx);
    let manifest = Manifest::load(&ctx.manifest_path, ctx.fs.as_ref())?;
    let previous = if packages.is_empty() {
        manifest.all_paths()
    } else {
        packages.iter().flat_map(|p| manifest.paths_for_package(p)).collect()
    };

    let planner = Planner::new(ctx.fs.as_ref(), ctx.target_root.clone());
    let plan = planner.plan_remanage(entries, &previous, ctx.policy.clone(), &ctx.no_fold());
    if plan.has_blocking_conflicts() {
        return Err(DotlinkError::Conflict(plan.conflicts.clone()));
    }
    if dry_run || plan.is_empty() {
        return Ok(ManageReport { plan, executed: false });
    }

    let executor = Executor::new(ctx.fs.as_ref(), ctx.config.atomic);
    executor.validate(&plan)?;
    executor.apply(&plan, &ctx.cancel)?;

    let mut manifest = manifest;
    manifest.apply_plan(&plan, &hashes);
    manifest.save(&ctx.manifest_path, ctx.fs.as_ref())?;
    info!(packages = ?plan.packages, "remanaged");
    Ok(ManageReport { plan, executed: true })
}

/// Move existing, currently-unmanaged target files into a package's
/// source tree and replace them with a link back to the same path.
pub fn adopt(ctx: &Context, package: &str, files: &[Utf8PathBuf]) -> Result<AdoptReport, DotlinkError> {
    let spec = ctx.find_package(package)?;
    let pkg_root = ctx.package_root.join(&spec.source)?;
    let targets: Vec<TargetPath> = files
        .iter()
        .map(|f| TargetPath::new(f.clone()))
        .collect::<Result<_, _>>()?;

    let planner = Planner::new(ctx.fs.as_ref(), ctx.target_root.clone());
    let plan = planner.plan_adopt(package, &pkg_root, &targets, &ctx.config.dotfile_prefix);
    if plan.has_blocking_conflicts() {
        return Err(DotlinkError::Conflict(plan.conflicts.clone()));
    }

    let executor = Executor::new(ctx.fs.as_ref(), ctx.config.atomic);
    executor.validate(&plan)?;
    executor.apply(&plan, &ctx.cancel)?;
    info!(package, "adopted");
    Ok(AdoptReport { plan })
}

pub fn status(ctx: &Context, packages: &[String]) -> Result<Status, DotlinkError> {
    let manifest = Manifest::load(&ctx.manifest_path, ctx.fs.as_ref())?;
    let specs = ctx.selected_packages(packages)?;
    let packages = specs
        .into_iter()
        .map(|spec| PackageInfo {
            name: spec.name.clone(),
            source: spec.source.clone(),
            strategy: spec.strategy,
            managed_link_count: manifest.paths_for_package(&spec.name).len(),
        })
        .collect();
    Ok(Status {
        packages,
        manifest_path: ctx.manifest_path.clone(),
    })
}

pub fn list(ctx: &Context) -> Result<Vec<PackageInfo>, DotlinkError> {
    Ok(status(ctx, &[])?.packages)
}

pub fn doctor(ctx: &Context, scan: ScanConfig) -> Result<Report, DotlinkError> {
    let manifest = Manifest::load(&ctx.manifest_path, ctx.fs.as_ref())?;
    let diagnostics = Diagnostics::new(ctx.fs.as_ref(), ctx.target_root.clone(), ctx.package_root.clone());
    diagnostics.run(&manifest, scan, &ctx.cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    fn test_config() -> DotlinkConfig {
        DotlinkConfig {
            package_dir: Utf8PathBuf::from("/pkgs"),
            target_dir: Utf8PathBuf::from("/home"),
            manifest_path: Utf8PathBuf::from(".dotlink/manifest.json"),
            packages: vec![PackageSpec {
                name: "vim".to_string(),
                source: Utf8PathBuf::from("vim"),
                strategy: LinkStrategy::Fold,
            }],
            ..DotlinkConfig::default()
        }
    }

    fn test_context(fs: MemFs) -> Context {
        Context::new(test_config(), Box::new(fs), false, false).unwrap()
    }

    #[test]
    fn manage_creates_a_link_and_records_it_in_the_manifest() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.put_file(Utf8Path::new("/pkgs/vim/dot-vimrc"), b"set nocompatible");
        let ctx = test_context(fs);

        let report = manage(&ctx, &[], false).unwrap();
        assert!(report.executed);
        assert_eq!(
            ctx.fs.read_link(Utf8Path::new("/home/.vimrc")).unwrap(),
            Some(Utf8PathBuf::from("/pkgs/vim/dot-vimrc"))
        );

        let manifest = Manifest::load(&ctx.manifest_path, ctx.fs.as_ref()).unwrap();
        assert_eq!(manifest.paths_for_package("vim").len(), 1);
    }

    #[test]
    fn a_second_manage_is_a_no_op() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.put_file(Utf8Path::new("/pkgs/vim/dot-vimrc"), b"set nocompatible");
        let ctx = test_context(fs);

        manage(&ctx, &[], false).unwrap();
        let second = manage(&ctx, &[], false).unwrap();
        assert!(second.plan.is_empty());
        assert!(!second.executed);
    }

    #[test]
    fn manage_then_unmanage_removes_the_link_and_the_manifest_entry() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.put_file(Utf8Path::new("/pkgs/vim/dot-vimrc"), b"x");
        let ctx = test_context(fs);

        manage(&ctx, &[], false).unwrap();
        unmanage(&ctx, UnmanageOptions::default(), &[]).unwrap();

        assert!(!ctx.fs.exists(Utf8Path::new("/home/.vimrc")));
        let manifest = Manifest::load(&ctx.manifest_path, ctx.fs.as_ref()).unwrap();
        assert!(manifest.all_paths().is_empty());
    }

    #[test]
    fn manage_reports_a_conflict_instead_of_touching_the_filesystem() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home"));
        fs.put_file(Utf8Path::new("/pkgs/vim/dot-vimrc"), b"new");
        fs.put_file(Utf8Path::new("/home/.vimrc"), b"pre-existing, unmanaged");
        let ctx = test_context(fs);

        let err = manage(&ctx, &[], false).unwrap_err();
        assert!(matches!(err, DotlinkError::Conflict(_)));
        assert!(!ctx.fs.exists(Utf8Path::new("/home/.dotlink/manifest.json")));
    }
}
