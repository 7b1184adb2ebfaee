//! Terminal rendering. Pure formatting over the library's result types;
//! holds no business logic of its own.

use crate::conflict::{Conflict, Severity as ConflictSeverity};
use crate::diagnostics::{FindingKind, FindingSeverity, Health, Report};
use crate::orchestrator::{PackageInfo, Status};
use crate::plan::{Operation, Plan};
use colored::Colorize;
use pluralizer::pluralize;
use std::collections::BTreeMap;

fn marker(op: &Operation) -> colored::ColoredString {
    match op {
        Operation::LinkCreate { .. } | Operation::DirCreate { .. } => "[+]".green().bold(),
        Operation::LinkDelete { .. } | Operation::DirDelete { .. } => "[-]".red().bold(),
        Operation::FileMove { .. } | Operation::FileBackup { .. } => "[~]".yellow().bold(),
    }
}

fn describe(op: &Operation) -> String {
    match op {
        Operation::DirCreate { path } => format!("{path}/"),
        Operation::LinkCreate { link, pointing_to } => format!("{link} → {pointing_to}"),
        Operation::LinkDelete { link, previous_target } => format!("{link} (was → {previous_target})"),
        Operation::DirDelete { path } => format!("{path}/"),
        Operation::FileMove { from, to } => format!("{from} → {to}"),
        Operation::FileBackup { path, backup } => format!("{path} → {backup}"),
    }
}

/// Print a plan grouped by the package that produced each operation,
/// followed by any conflicts and a one-line summary.
pub fn render_plan(plan: &Plan, dry_run: bool) {
    if dry_run {
        println!("\n{} {}", plan.kind.to_string().bold(), "[DRY RUN]".yellow().bold());
    } else {
        println!("\n{}", plan.kind.to_string().bold());
    }

    let mut by_package: BTreeMap<&str, Vec<&Operation>> = BTreeMap::new();
    for planned in &plan.operations {
        by_package.entry(&planned.package).or_default().push(&planned.operation);
    }

    for (package, ops) in &by_package {
        println!("\n{}", package.bold());
        for op in ops {
            println!("  {} {}", marker(op), describe(op));
        }
    }

    if !plan.conflicts.is_empty() {
        render_conflicts(&plan.conflicts);
    }

    if plan.is_empty() && plan.conflicts.is_empty() {
        println!("\n{} nothing to do", "✓".green().bold());
        return;
    }

    println!(
        "\n{} {}",
        "Summary:".bold(),
        pluralize("operation", plan.operations.len() as isize, true)
    );
}

pub fn render_conflicts(conflicts: &[Conflict]) {
    println!("\n{}", "Conflicts:".bold());
    for conflict in conflicts {
        let marker = match conflict.severity {
            ConflictSeverity::Error => "[!]".red().bold(),
            ConflictSeverity::Warning => "[!]".yellow().bold(),
            ConflictSeverity::Info => "[i]".dimmed(),
        };
        println!("  {} {}: {}", marker, conflict.package, conflict.message);
    }
}

pub fn render_diagnostics(report: &Report) {
    let health_line = match report.health {
        Health::Ok => format!("{} healthy", "✓".green().bold()),
        Health::Warnings => format!("{} warnings present", "!".yellow().bold()),
        Health::Errors => format!("{} errors present", "✗".red().bold()),
    };
    println!("\n{health_line}");

    for finding in &report.findings {
        let marker = match finding.severity {
            FindingSeverity::Error => "[!]".red().bold(),
            FindingSeverity::Warning => "[!]".yellow().bold(),
        };
        let kind = match finding.kind {
            FindingKind::Broken => "broken",
            FindingKind::Drift => "drift",
            FindingKind::Orphan => "orphan",
        };
        println!("  {} ({kind}) {}: {}", marker, finding.path, finding.message);
        println!("      {}", finding.suggestion.dimmed());
    }

    if report.findings.is_empty() {
        println!("  {}", "no findings".dimmed());
    }
}

pub fn render_status(status: &Status) {
    println!("\n{}", "Packages:".bold());
    for package in &status.packages {
        render_package_info(package);
    }
    println!("\n{:<10} {}", "Manifest:".bold(), status.manifest_path);
}

fn render_package_info(package: &PackageInfo) {
    println!(
        "  {} {} → {} ({})",
        package.name.bold(),
        package.source,
        pluralize("link", package.managed_link_count as isize, true),
        format!("{:?}", package.strategy).to_lowercase(),
    );
}
