use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use colored::control::set_override;
use dotlink::config::DotlinkConfig;
use dotlink::diagnostics::{ScanConfig, ScanMode};
use dotlink::error::{DotlinkError, Severity};
use dotlink::fs::RealFs;
use dotlink::orchestrator::{self, Context, UnmanageOptions};
use dotlink::render;
use std::env;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dotlink")]
#[command(version, about = "A transactional dotfiles linker with conflict detection and rollback", long_about = None)]
struct Cli {
    /// Path to the config file (defaults to ./dotlink.kdl)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<Utf8PathBuf>,

    /// Override where the manifest is read from and written to
    #[arg(long, global = true, value_name = "DIR")]
    manifest_dir: Option<Utf8PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create symlinks for the given packages (all configured packages if none given)
    #[command(visible_aliases = ["link", "install", "i"])]
    Manage {
        packages: Vec<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        overwrite: bool,
        #[arg(long)]
        backup: bool,
    },

    /// Remove previously managed links
    #[command(visible_aliases = ["unlink", "uninstall", "remove", "rm"])]
    Unmanage {
        packages: Vec<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        purge_all: bool,
    },

    /// Re-derive each package's plan and remove anything it no longer produces
    Remanage {
        packages: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Move existing files into a package and replace them with a link
    Adopt {
        package: String,
        files: Vec<Utf8PathBuf>,
    },

    /// Show managed package status
    Status { packages: Vec<String> },

    /// List configured packages
    List,

    /// Audit the target tree for broken, drifted, or orphaned links
    #[command(visible_alias = "detect")]
    Doctor {
        /// Falls back to the config's `doctor-scan-mode` when omitted.
        #[arg(long, value_enum)]
        scan_mode: Option<ScanModeArg>,
        /// Falls back to the config's `doctor-max-depth` when omitted.
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ScanModeArg {
    Off,
    Scoped,
    Deep,
}

impl From<ScanModeArg> for ScanMode {
    fn from(value: ScanModeArg) -> Self {
        match value {
            ScanModeArg::Off => ScanMode::Off,
            ScanModeArg::Scoped => ScanMode::Scoped,
            ScanModeArg::Deep => ScanMode::Deep,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    dotlink::logging::init(cli.verbose);
    if cli.no_color {
        set_override(false);
    }

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            let code = match err.severity() {
                Severity::Warning => 1,
                Severity::Error => 2,
            };
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<u8, DotlinkError> {
    let config_path = resolve_config_path(cli.config)?;
    let mut config = DotlinkConfig::from_file(&config_path)
        .map_err(|e| DotlinkError::Validation(format!("{config_path}: {e}")))?;
    if let Some(manifest_dir) = &cli.manifest_dir {
        config.manifest_path = manifest_dir.join("manifest.json");
    }

    let (overwrite, backup) = match &cli.command {
        Commands::Manage { overwrite, backup, .. } => (*overwrite, *backup),
        _ => (false, false),
    };
    let ctx = Context::new(config, Box::new(RealFs), overwrite, backup)?;

    match cli.command {
        Commands::Manage { packages, dry_run, .. } => {
            let report = orchestrator::manage(&ctx, &packages, dry_run)?;
            render::render_plan(&report.plan, dry_run);
        }
        Commands::Unmanage {
            packages,
            dry_run,
            purge_all,
        } => {
            let opts = UnmanageOptions { dry_run, purge_all };
            let report = orchestrator::unmanage(&ctx, opts, &packages)?;
            render::render_plan(&report.plan, dry_run);
        }
        Commands::Remanage { packages, dry_run } => {
            let report = orchestrator::remanage(&ctx, &packages, dry_run)?;
            render::render_plan(&report.plan, dry_run);
        }
        Commands::Adopt { package, files } => {
            let report = orchestrator::adopt(&ctx, &package, &files)?;
            render::render_plan(&report.plan, false);
        }
        Commands::Status { packages } => {
            let status = orchestrator::status(&ctx, &packages)?;
            render::render_status(&status);
        }
        Commands::List => {
            let packages = orchestrator::list(&ctx)?;
            for package in packages {
                println!("{} ({})", package.name, package.source);
            }
        }
        Commands::Doctor { scan_mode, max_depth } => {
            let scan = ScanConfig {
                mode: scan_mode.map(ScanMode::from).unwrap_or(ctx.config.doctor_scan_mode),
                max_depth: max_depth.unwrap_or(ctx.config.doctor_max_depth),
            };
            let report = orchestrator::doctor(&ctx, scan)?;
            render::render_diagnostics(&report);
            let code = match report.health {
                dotlink::diagnostics::Health::Ok => 0,
                dotlink::diagnostics::Health::Warnings => 1,
                dotlink::diagnostics::Health::Errors => 2,
            };
            return Ok(code);
        }
    }

    Ok(0)
}

fn resolve_config_path(config: Option<Utf8PathBuf>) -> Result<Utf8PathBuf, DotlinkError> {
    if let Some(config) = config {
        return Ok(config);
    }
    let cwd = Utf8PathBuf::from_path_buf(env::current_dir().map_err(|e| DotlinkError::io(Utf8PathBuf::from("."), e))?)
        .map_err(|_| DotlinkError::Validation("current directory is not valid UTF-8".to_string()))?;
    Ok(cwd.join("dotlink.kdl"))
}
