//! Configuration loader (§4.K): `dotlink.kdl` describes where packages
//! live, where they link to, and a few global defaults, parsed with the
//! same KDL document model the CLI config has always used.

use crate::conflict::Resolution;
use crate::diagnostics::ScanMode;
use crate::planner::ConflictPolicy;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use kdl::{KdlDocument, KdlNode};
use std::fs;

/// Whether a package's directories may be collapsed into a single link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    /// Fold directories into one link wherever nothing else claims them
    /// (the default, Stow-like behavior).
    Fold,
    /// Always materialize a real directory and link every file inside it
    /// individually (Dotter-like behavior).
    Unfold,
}

/// How a planned link's source path is written. Only `Absolute` is
/// implemented today; `Relative` is accepted as a recognized key but
/// rejected at parse time rather than silently treated as absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkMode {
    Absolute,
    Relative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub source: Utf8PathBuf,
    pub strategy: LinkStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotlinkConfig {
    pub package_dir: Utf8PathBuf,
    pub target_dir: Utf8PathBuf,
    pub manifest_path: Utf8PathBuf,
    pub dotfile_prefix: String,
    pub translate_dotfiles: bool,
    pub use_default_ignores: bool,
    pub ignore_patterns: Vec<String>,
    pub ignore_overrides: Vec<String>,
    pub packages: Vec<PackageSpec>,
    pub symlink_mode: SymlinkMode,
    pub symlink_folding: bool,
    pub overwrite: bool,
    pub backup: bool,
    pub backup_suffix: String,
    pub backup_dir: Option<Utf8PathBuf>,
    pub atomic: bool,
    pub doctor_scan_mode: ScanMode,
    pub doctor_max_depth: usize,
}

impl Default for DotlinkConfig {
    fn default() -> Self {
        Self {
            package_dir: Utf8PathBuf::from("."),
            target_dir: Utf8PathBuf::from("~"),
            manifest_path: Utf8PathBuf::from(".dotlink/manifest.json"),
            dotfile_prefix: "dot-".to_string(),
            translate_dotfiles: true,
            use_default_ignores: true,
            ignore_patterns: Vec::new(),
            ignore_overrides: Vec::new(),
            packages: Vec::new(),
            symlink_mode: SymlinkMode::Absolute,
            symlink_folding: true,
            overwrite: false,
            backup: false,
            backup_suffix: ".bak".to_string(),
            backup_dir: None,
            atomic: true,
            doctor_scan_mode: ScanMode::Scoped,
            doctor_max_depth: 4,
        }
    }
}

impl DotlinkConfig {
    /// Parse a KDL configuration file.
    pub fn from_file(path: &Utf8PathBuf) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read config file: {path}"))?;
        Self::from_str(&content)
    }

    /// Parse KDL configuration from a string.
    pub fn from_str(content: &str) -> Result<Self> {
        let doc: KdlDocument = content.parse().context("failed to parse KDL document")?;
        let mut config = DotlinkConfig::default();

        for node in doc.nodes() {
            match node.name().value() {
                "defaults" => Self::apply_defaults(node, &mut config)?,
                "package" | "LinkFolder" | "LinkFilesRecursive" => {
                    config.packages.push(Self::parse_package(node)?);
                }
                other => anyhow::bail!("unknown top-level node: {other}"),
            }
        }

        Ok(config)
    }

    fn apply_defaults(node: &KdlNode, config: &mut DotlinkConfig) -> Result<()> {
        let Some(children) = node.children() else {
            return Ok(());
        };
        for child in children.nodes() {
            let string_value = || {
                child
                    .entries()
                    .first()
                    .and_then(|e| e.value().as_string())
                    .map(str::to_string)
            };
            let bool_value = || child.entries().first().and_then(|e| e.value().as_bool());
            let int_value = || child.entries().first().and_then(|e| e.value().as_integer());

            match child.name().value() {
                "package-dir" => {
                    if let Some(v) = string_value() {
                        config.package_dir = Utf8PathBuf::from(v);
                    }
                }
                "target-dir" => {
                    if let Some(v) = string_value() {
                        config.target_dir = Utf8PathBuf::from(v);
                    }
                }
                "manifest-path" => {
                    if let Some(v) = string_value() {
                        config.manifest_path = Utf8PathBuf::from(v);
                    }
                }
                "dotfile-prefix" => {
                    if let Some(v) = string_value() {
                        config.dotfile_prefix = v;
                    }
                }
                "translate-dotfiles" => {
                    if let Some(v) = bool_value() {
                        config.translate_dotfiles = v;
                    }
                }
                "symlink-mode" => {
                    if let Some(v) = string_value() {
                        config.symlink_mode = match v.as_str() {
                            "absolute" => SymlinkMode::Absolute,
                            "relative" => {
                                anyhow::bail!(
                                    "symlink-mode \"relative\" is not yet supported; use \"absolute\""
                                )
                            }
                            other => anyhow::bail!("unknown symlink-mode: {other}"),
                        };
                    }
                }
                "symlink-folding" => {
                    if let Some(v) = bool_value() {
                        config.symlink_folding = v;
                    }
                }
                "overwrite" => {
                    if let Some(v) = bool_value() {
                        config.overwrite = v;
                    }
                }
                "backup" => {
                    if let Some(v) = bool_value() {
                        config.backup = v;
                    }
                }
                "backup-suffix" => {
                    if let Some(v) = string_value() {
                        config.backup_suffix = v;
                    }
                }
                "backup-dir" => {
                    if let Some(v) = string_value() {
                        config.backup_dir = Some(Utf8PathBuf::from(v));
                    }
                }
                "atomic" => {
                    if let Some(v) = bool_value() {
                        config.atomic = v;
                    }
                }
                "doctor-scan-mode" => {
                    if let Some(v) = string_value() {
                        config.doctor_scan_mode = match v.as_str() {
                            "off" => ScanMode::Off,
                            "scoped" => ScanMode::Scoped,
                            "deep" => ScanMode::Deep,
                            other => anyhow::bail!("unknown doctor-scan-mode: {other}"),
                        };
                    }
                }
                "doctor-max-depth" => {
                    if let Some(v) = int_value() {
                        if v < 0 {
                            anyhow::bail!("doctor-max-depth cannot be negative: {v}");
                        }
                        config.doctor_max_depth = v as usize;
                    }
                }
                "ignore" => Self::apply_ignore(child, config),
                other => anyhow::bail!("unknown defaults node: {other}"),
            }
        }
        Ok(())
    }

    fn apply_ignore(node: &KdlNode, config: &mut DotlinkConfig) {
        if let Some(use_defaults) = node
            .entries()
            .iter()
            .find(|e| e.name().map(|n| n.value()) == Some("defaults"))
            .and_then(|e| e.value().as_bool())
        {
            config.use_default_ignores = use_defaults;
        }
        let Some(children) = node.children() else {
            return;
        };
        for entry_node in children.nodes() {
            let Some(pattern) = entry_node.entries().first().and_then(|e| e.value().as_string()) else {
                continue;
            };
            match entry_node.name().value() {
                "pattern" => config.ignore_patterns.push(pattern.to_string()),
                "allow" => config.ignore_overrides.push(pattern.to_string()),
                _ => {}
            }
        }
    }

    fn parse_package(node: &KdlNode) -> Result<PackageSpec> {
        let strategy = match node.name().value() {
            "LinkFolder" => LinkStrategy::Fold,
            "LinkFilesRecursive" => LinkStrategy::Unfold,
            "package" => Self::strategy_property(node)?,
            other => anyhow::bail!("unknown package node: {other}"),
        };

        let source = node
            .entries()
            .iter()
            .find(|e| e.name().is_none())
            .and_then(|e| e.value().as_string())
            .with_context(|| format!("missing source path for {} node", node.name().value()))?
            .to_string();

        let name = node
            .entries()
            .iter()
            .find(|e| e.name().map(|n| n.value()) == Some("name"))
            .and_then(|e| e.value().as_string())
            .map(str::to_string)
            .unwrap_or_else(|| {
                Utf8PathBuf::from(&source)
                    .file_name()
                    .unwrap_or(&source)
                    .to_string()
            });

        Ok(PackageSpec {
            name,
            source: Utf8PathBuf::from(source),
            strategy,
        })
    }

    fn strategy_property(node: &KdlNode) -> Result<LinkStrategy> {
        let strategy = node
            .entries()
            .iter()
            .find(|e| e.name().map(|n| n.value()) == Some("strategy"))
            .and_then(|e| e.value().as_string());
        Ok(match strategy {
            Some("unfold") => LinkStrategy::Unfold,
            Some("fold") | None => LinkStrategy::Fold,
            Some(other) => anyhow::bail!("unknown strategy: {other}"),
        })
    }

    /// Build the policy that drives conflict resolution. `overwrite`/
    /// `backup` are the CLI flags for the current invocation; they widen
    /// whatever the config file's own `overwrite`/`backup` defaults allow
    /// but never narrow them.
    pub fn conflict_policy(&self, overwrite: bool, backup: bool) -> ConflictPolicy {
        let resolution = if self.backup || backup {
            Resolution::Backup
        } else if self.overwrite || overwrite {
            Resolution::Overwrite
        } else {
            Resolution::Abort
        };
        ConflictPolicy {
            on_target_exists: resolution,
            on_link_elsewhere: resolution,
            backup_suffix: self.backup_suffix.clone(),
            backup_dir: self.backup_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_package_node() {
        let config = DotlinkConfig::from_str(r#"package "nvim""#).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].name, "nvim");
        assert_eq!(config.packages[0].strategy, LinkStrategy::Fold);
    }

    #[test]
    fn parses_unfold_strategy() {
        let config = DotlinkConfig::from_str(r#"package "nvim" strategy="unfold""#).unwrap();
        assert_eq!(config.packages[0].strategy, LinkStrategy::Unfold);
    }

    #[test]
    fn parses_legacy_link_folder_alias() {
        let config = DotlinkConfig::from_str(r#"LinkFolder "nvim""#).unwrap();
        assert_eq!(config.packages[0].strategy, LinkStrategy::Fold);
    }

    #[test]
    fn parses_legacy_link_files_recursive_alias() {
        let config = DotlinkConfig::from_str(r#"LinkFilesRecursive "zsh/.zshrc""#).unwrap();
        assert_eq!(config.packages[0].strategy, LinkStrategy::Unfold);
    }

    #[test]
    fn explicit_name_overrides_derived_name() {
        let config = DotlinkConfig::from_str(r#"package "config/nvim" name="editor""#).unwrap();
        assert_eq!(config.packages[0].name, "editor");
    }

    #[test]
    fn parses_defaults_block() {
        let config = DotlinkConfig::from_str(
            r#"
            defaults {
                package-dir "./packages"
                target-dir "~"
                dotfile-prefix "dot-"
                ignore defaults=#true {
                    pattern "*.bak"
                    allow "*.bak.keep"
                }
            }
            package "nvim"
            "#,
        )
        .unwrap();
        assert_eq!(config.package_dir, Utf8PathBuf::from("./packages"));
        assert_eq!(config.ignore_patterns, vec!["*.bak".to_string()]);
        assert_eq!(config.ignore_overrides, vec!["*.bak.keep".to_string()]);
        assert_eq!(config.packages.len(), 1);
    }

    #[test]
    fn parses_symlink_and_backup_and_doctor_options() {
        let config = DotlinkConfig::from_str(
            r#"
            defaults {
                symlink-mode "absolute"
                symlink-folding #false
                overwrite #false
                backup #true
                backup-suffix ".bak"
                backup-dir "~/.dotlink/backups"
                atomic #false
                doctor-scan-mode "deep"
                doctor-max-depth 10
            }
            "#,
        )
        .unwrap();
        assert_eq!(config.symlink_mode, SymlinkMode::Absolute);
        assert!(!config.symlink_folding);
        assert!(config.backup);
        assert_eq!(config.backup_suffix, ".bak");
        assert_eq!(config.backup_dir, Some(Utf8PathBuf::from("~/.dotlink/backups")));
        assert!(!config.atomic);
        assert_eq!(config.doctor_scan_mode, ScanMode::Deep);
        assert_eq!(config.doctor_max_depth, 10);
    }

    #[test]
    fn relative_symlink_mode_is_rejected_not_silently_ignored() {
        let err = DotlinkConfig::from_str(r#"defaults { symlink-mode "relative" }"#).unwrap_err();
        assert!(err.to_string().contains("not yet supported"));
    }

    #[test]
    fn missing_source_is_an_error() {
        assert!(DotlinkConfig::from_str(r#"package"#).is_err());
    }

    #[test]
    fn unknown_top_level_node_is_an_error() {
        assert!(DotlinkConfig::from_str(r#"bogus "x""#).is_err());
    }

    #[test]
    fn conflict_policy_prefers_backup_over_overwrite() {
        let mut config = DotlinkConfig::default();
        config.overwrite = true;
        config.backup = true;
        let policy = config.conflict_policy(false, false);
        assert_eq!(policy.on_target_exists, Resolution::Backup);
    }

    #[test]
    fn conflict_policy_defaults_to_abort() {
        let config = DotlinkConfig::default();
        let policy = config.conflict_policy(false, false);
        assert_eq!(policy.on_target_exists, Resolution::Abort);
    }
}
