//! Glob matching for the generator's ignore list.
//!
//! Patterns are gitignore-flavoured globs relative to the input directory:
//! `*` stays within one path segment, `**` crosses segments, a leading `!`
//! re-includes, and patterns without a slash match the basename.

use gix::{bstr::ByteSlice, glob::wildmatch};

/// A compiled ignore pattern.
#[derive(Debug, Clone)]
struct Pattern {
    text: String,
    negative: bool,
    basename_only: bool,
}

/// Matches input-relative paths against an ordered pattern list.
///
/// Last matching pattern wins, as in `.gitignore`.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
}

impl IgnoreMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(AsRef::as_ref)
            .map(str::trim)
            .filter(|p| !p.is_empty() && !p.starts_with('#'))
            .map(|p| {
                let (negative, p) = p.strip_prefix('!').map_or((false, p), |rest| (true, rest));
                let rooted = p.starts_with('/');
                let text = p.trim_start_matches('/').trim_end_matches('/').to_string();
                Pattern {
                    basename_only: !rooted && !text.contains('/'),
                    text,
                    negative,
                }
            })
            .collect();
        Self { patterns }
    }

    /// Check whether `path` (relative, `/`-separated) is ignored.
    ///
    /// A directory pattern such as `drafts` also ignores everything below it.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./").trim_start_matches('/');
        let mut ignored = false;

        for pattern in &self.patterns {
            let hit = if pattern.basename_only {
                path.split('/').any(|segment| glob(&pattern.text, segment))
            } else {
                glob(&pattern.text, path) || ancestors(path).any(|dir| glob(&pattern.text, dir))
            };
            if hit {
                ignored = !pattern.negative;
            }
        }
        ignored
    }
}

fn glob(pattern: &str, path: &str) -> bool {
    wildmatch(
        pattern.as_bytes().as_bstr(),
        path.as_bytes().as_bstr(),
        wildmatch::Mode::NO_MATCH_SLASH_LITERAL,
    )
}

/// `a/b/c` → `a`, `a/b`
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_star_extension() {
        let m = IgnoreMatcher::new(&["_includes/**/*.jsx"]);
        assert!(m.matches("_includes/Counter.jsx"));
        assert!(m.matches("_includes/components/deep/Counter.jsx"));
        assert!(!m.matches("index.jsx"));
        assert!(!m.matches("_includes/layout.html"));
    }

    #[test]
    fn test_basename_pattern() {
        let m = IgnoreMatcher::new(&["*.log"]);
        assert!(m.matches("debug.log"));
        assert!(m.matches("logs/nested/debug.log"));
        assert!(!m.matches("debug.txt"));
    }

    #[test]
    fn test_directory_pattern_covers_children() {
        let m = IgnoreMatcher::new(&["node_modules", "/_site/"]);
        assert!(m.matches("node_modules/react/index.js"));
        assert!(m.matches("_site/index.html"));
        assert!(!m.matches("pages/_site.md"));
    }

    #[test]
    fn test_negation_last_match_wins() {
        let m = IgnoreMatcher::new(&["drafts/**", "!drafts/keep.md"]);
        assert!(m.matches("drafts/wip.md"));
        assert!(!m.matches("drafts/keep.md"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let m = IgnoreMatcher::new(&["posts/*.md"]);
        assert!(m.matches("posts/a.md"));
        assert!(!m.matches("posts/2024/a.md"));
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let m = IgnoreMatcher::new(&["# comment", "  ", ""]);
        assert!(m.patterns.is_empty());
        assert!(!m.matches("anything"));
    }
}
