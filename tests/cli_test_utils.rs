//! Shared helpers for the CLI integration tests. Each test builds its own
//! temporary package/target tree with `tempfile` rather than checking in a
//! fixture directory, so tests can't drift out of sync with what they set up.

use std::path::Path;
use std::process::{Command, Output};

pub fn dotlink_binary() -> &'static str {
    env!("CARGO_BIN_EXE_dotlink")
}

pub fn run_dotlink(cwd: &Path, args: &[&str]) -> Output {
    Command::new(dotlink_binary())
        .args(args)
        .arg("--no-color")
        .current_dir(cwd)
        .output()
        .expect("failed to run dotlink binary")
}

pub fn is_symlink_to(link: &Path, expected_target: &Path) -> bool {
    match std::fs::read_link(link) {
        Ok(actual) => {
            let resolved = if actual.is_absolute() {
                actual
            } else {
                link.parent().unwrap_or(Path::new(".")).join(actual)
            };
            match (resolved.canonicalize(), expected_target.canonicalize()) {
                (Ok(a), Ok(b)) => a == b,
                _ => resolved == expected_target,
            }
        }
        Err(_) => false,
    }
}
