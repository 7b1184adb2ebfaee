//! Ignore engine (§4.C): per-segment glob matching with `**`, a built-in
//! default set, user patterns, and an override list that re-includes.

/// A single compiled glob pattern, matched per path segment with support
/// for a `**` segment that matches zero or more segments.
#[derive(Debug, Clone)]
struct Glob {
    raw: String,
    segments: Vec<String>,
}

impl Glob {
    fn compile(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            segments: pattern.split('/').map(|s| s.to_string()).collect(),
        }
    }

    fn matches(&self, path_segments: &[&str]) -> bool {
        match_segments(&self.segments, path_segments)
    }
}

fn match_segments(pattern: &[String], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(seg) if seg == "**" => {
            if pattern.len() == 1 {
                return true;
            }
            // Try consuming zero or more path segments before the rest of
            // the pattern.
            for skip in 0..=path.len() {
                if match_segments(&pattern[1..], &path[skip..]) {
                    return true;
                }
            }
            false
        }
        Some(seg) => match path.first() {
            Some(name) if glob_segment_matches(seg, name) => {
                match_segments(&pattern[1..], &path[1..])
            }
            _ => false,
        },
    }
}

/// `*` and `?` within a single segment; no path separators.
fn glob_segment_matches(pattern: &str, name: &str) -> bool {
    fn inner(p: &[u8], n: &[u8]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                // Try matching zero chars, then one more, etc.
                inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..]))
            }
            (Some(b'?'), Some(_)) => inner(&p[1..], &n[1..]),
            (Some(pc), Some(nc)) if pc == nc => inner(&p[1..], &n[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}

pub const DEFAULT_PATTERNS: &[&str] = &[
    ".git",
    ".git/**",
    ".hg",
    ".hg/**",
    ".svn",
    ".svn/**",
    "*.swp",
    "*.swo",
    "*~",
    ".DS_Store",
    "Thumbs.db",
    "**/.git",
    "**/.DS_Store",
    "**/*.swp",
    "**/target",
    "**/node_modules",
];

/// Compiled ignore engine: default patterns + user patterns, with an
/// override list that beats an ignore match. Matching is pure and
/// order-stable so that repeated calls with the same path always agree.
pub struct IgnoreEngine {
    ignore: Vec<Glob>,
    overrides: Vec<Glob>,
}

impl IgnoreEngine {
    pub fn new(use_defaults: bool, patterns: &[String], overrides: &[String]) -> Self {
        let mut ignore = Vec::new();
        if use_defaults {
            ignore.extend(DEFAULT_PATTERNS.iter().map(|p| Glob::compile(p)));
        }
        ignore.extend(patterns.iter().map(|p| Glob::compile(p)));
        let overrides = overrides.iter().map(|p| Glob::compile(p)).collect();
        Self { ignore, overrides }
    }

    /// `rel_path` is package-relative, `/`-separated, no leading slash.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
        if self.overrides.iter().any(|g| g.matches(&segments)) {
            return false;
        }
        self.ignore.iter().any(|g| g.matches(&segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> IgnoreEngine {
        IgnoreEngine::new(true, &[], &[])
    }

    #[test]
    fn ignores_vcs_metadata_by_default() {
        let e = engine();
        assert!(e.is_ignored(".git"));
        assert!(e.is_ignored(".git/HEAD"));
    }

    #[test]
    fn ignores_editor_swap_files() {
        let e = engine();
        assert!(e.is_ignored("foo.swp"));
        assert!(e.is_ignored("sub/dir/foo.swp"));
    }

    #[test]
    fn does_not_ignore_ordinary_files() {
        let e = engine();
        assert!(!e.is_ignored("dot-vimrc"));
        assert!(!e.is_ignored("nvim/init.lua"));
    }

    #[test]
    fn user_pattern_extends_defaults() {
        let e = IgnoreEngine::new(true, &["*.bak".to_string()], &[]);
        assert!(e.is_ignored("foo.bak"));
        assert!(e.is_ignored(".git"));
    }

    #[test]
    fn override_beats_ignore() {
        let e = IgnoreEngine::new(
            true,
            &[],
            &["**/.git/keep-this".to_string()],
        );
        assert!(e.is_ignored(".git/HEAD"));
        assert!(!e.is_ignored(".git/keep-this"));
    }

    #[test]
    fn double_star_matches_nested_directories() {
        let e = IgnoreEngine::new(false, &["**/node_modules".to_string()], &[]);
        assert!(e.is_ignored("node_modules"));
        assert!(e.is_ignored("a/b/node_modules"));
        assert!(!e.is_ignored("node_modules_backup"));
    }

    #[test]
    fn disabling_defaults_allows_vcs_metadata() {
        let e = IgnoreEngine::new(false, &[], &[]);
        assert!(!e.is_ignored(".git"));
    }
}
