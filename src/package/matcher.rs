//! Wildcard matching for include and match rules.
//!
//! Matching is case-insensitive. Include patterns are matched against paths
//! relative to a search base; match patterns are matched against file and
//! directory names only.

use glob::{MatchOptions, Pattern};
use std::path::Path;

use super::IncludeError;

/// Characters that make a path a wildcard pattern.
const WILDCARDS: [char; 3] = ['*', '?', '['];

/// Whether `text` contains wildcard characters.
pub fn has_wildcard(text: &str) -> bool {
    text.contains(WILDCARDS)
}

fn options(literal_separator: bool) -> MatchOptions {
    MatchOptions {
        case_sensitive: false,
        require_literal_separator: literal_separator,
        require_literal_leading_dot: false,
    }
}

fn compile(pattern: &str) -> Result<Pattern, IncludeError> {
    Pattern::new(pattern).map_err(|e| IncludeError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.msg.to_string(),
    })
}

/// Path with `/` separators, for matching and archive names.
pub fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// A single include glob, split into a literal base and a wildcard remainder.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    base: String,
    pattern: Pattern,
    match_base: bool,
    recursive: bool,
    depth: Option<usize>,
}

impl GlobPattern {
    /// Compile an include pattern (already using `/` separators).
    ///
    /// A pattern without a separator matches file names at any depth unless
    /// `no_recurse` is set. With `no_recurse`, `**` behaves like `*`.
    pub fn new(text: &str, no_recurse: bool) -> Result<Self, IncludeError> {
        let segments: Vec<&str> = text.split('/').collect();
        let last = segments.len().saturating_sub(1);
        let split = segments.iter().position(|s| has_wildcard(s)).unwrap_or(last).min(last);
        let base = segments[..split].join("/");
        let rest: Vec<&str> = segments[split..].to_vec();

        let mut remainder = rest.join("/");
        if no_recurse {
            remainder = remainder.replace("**", "*");
        }
        let match_base = !text.contains('/') && !no_recurse;
        let recursive = !no_recurse && remainder.contains("**");
        let depth = if match_base || recursive { None } else { Some(rest.len().max(1)) };

        Ok(Self { base, pattern: compile(&remainder)?, match_base, recursive, depth })
    }

    /// Literal directory prefix before the first wildcard segment.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Maximum walk depth below the base, `None` for unlimited.
    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    /// Whether a file at `relative` (relative to the base) matches.
    ///
    /// A single `*` never crosses a directory separator; only a `**`
    /// segment spans directories.
    pub fn matches(&self, relative: &Path) -> bool {
        if self.match_base {
            return relative
                .file_name()
                .is_some_and(|n| self.pattern.matches_with(&n.to_string_lossy(), options(true)));
        }
        self.pattern.matches_with(&slash_path(relative), options(true))
    }
}

/// A `|`-separated list of name wildcards where `-` marks a negation.
#[derive(Debug, Clone, Default)]
pub struct WildcardSet {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl WildcardSet {
    /// Parse `a|b|-c`. Empty entries are ignored.
    pub fn parse(text: &str) -> Result<Self, IncludeError> {
        let mut set = Self::default();
        for part in text.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            match part.strip_prefix('-') {
                Some(negated) => set.exclude.push(compile(negated)?),
                None => set.include.push(compile(part)?),
            }
        }
        Ok(set)
    }

    /// Whether the set has no patterns at all.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Whether `name` matches a positive pattern (or there are none) and no
    /// negated pattern.
    pub fn matches(&self, name: &str) -> bool {
        let included = self.include.is_empty()
            || self.include.iter().any(|p| p.matches_with(name, options(true)));
        included && !self.exclude.iter().any(|p| p.matches_with(name, options(true)))
    }

    /// Whether `name` matches any positive pattern.
    pub fn matches_any(&self, name: &str) -> bool {
        self.include.iter().any(|p| p.matches_with(name, options(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_wildcard() {
        assert!(has_wildcard("Scripts/*.pex"));
        assert!(has_wildcard("file?.txt"));
        assert!(!has_wildcard("Scripts/Quest.pex"));
    }

    #[test]
    fn test_glob_splits_literal_base() {
        let glob = GlobPattern::new("Scripts/Source/*.psc", false).unwrap();
        assert_eq!(glob.base(), "Scripts/Source");
        assert_eq!(glob.depth(), Some(1));
        assert!(glob.matches(Path::new("Quest.PSC")));
        assert!(!glob.matches(Path::new("User/Quest.psc")));
    }

    #[test]
    fn test_glob_match_base_without_separator() {
        let glob = GlobPattern::new("*.pex", false).unwrap();
        assert_eq!(glob.depth(), None);
        assert!(glob.matches(Path::new("Scripts/deep/Quest.pex")));
    }

    #[test]
    fn test_glob_no_recurse_stays_shallow() {
        let glob = GlobPattern::new("*.pex", true).unwrap();
        assert_eq!(glob.depth(), Some(1));
        assert!(glob.matches(Path::new("Quest.pex")));

        let glob = GlobPattern::new("Scripts/**/*.pex", true).unwrap();
        assert!(!glob.matches(Path::new("a/b/Quest.pex")));
    }

    #[test]
    fn test_glob_globstar() {
        let glob = GlobPattern::new("Scripts/**/*.pex", false).unwrap();
        assert_eq!(glob.base(), "Scripts");
        assert!(glob.matches(Path::new("a/b/Quest.pex")));
    }

    #[test]
    fn test_globstar_keeps_single_star_in_one_directory() {
        let glob = GlobPattern::new("**/Textures/*.dds", false).unwrap();
        assert_eq!(glob.depth(), None);
        assert!(glob.matches(Path::new("x/Textures/a.dds")));
        assert!(!glob.matches(Path::new("x/Textures/sub/deep/a.dds")));
    }

    #[test]
    fn test_literal_pattern_keeps_last_segment() {
        let glob = GlobPattern::new("Quest.pex", false).unwrap();
        assert_eq!(glob.base(), "");
        assert_eq!(glob.depth(), None);
        assert!(glob.matches(Path::new("Scripts/deep/quest.PEX")));

        let glob = GlobPattern::new("Scripts/Quest.pex", false).unwrap();
        assert_eq!(glob.base(), "Scripts");
        assert_eq!(glob.depth(), Some(1));
        assert!(glob.matches(Path::new("Quest.pex")));
        assert!(!glob.matches(Path::new("deep/Quest.pex")));
    }

    #[test]
    fn test_wildcard_set_negation() {
        let set = WildcardSet::parse("*.psc|*.pex|-Test*").unwrap();
        assert!(set.matches("Quest.psc"));
        assert!(set.matches("QUEST.PEX"));
        assert!(!set.matches("TestQuest.psc"));
        assert!(!set.matches("readme.txt"));
    }

    #[test]
    fn test_wildcard_set_only_negations() {
        let set = WildcardSet::parse("-*.bak").unwrap();
        assert!(set.matches("Quest.pex"));
        assert!(!set.matches("Quest.bak"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(WildcardSet::parse("[abc"), Err(IncludeError::InvalidPattern { .. })));
    }
}
