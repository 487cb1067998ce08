//! Include resolution: expanding `<Include>` and `<Match>` rules into files.
//!
//! [`IncludeResolver`] is a forward-only iterator. Rules are expanded one at a
//! time as the caller pulls entries, and the first error ends the sequence.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::matcher::{has_wildcard, GlobPattern, WildcardSet};
use super::IncludeError;
use crate::descriptor::schema::parse_bool;
use crate::descriptor::Element;
use crate::game::ARTIFACT_EXTENSION;
use crate::paths::{has_extension, normalize_lexically, starts_with_ignore_case, strip_prefix_ignore_case};

/// Folder that compiled scripts live under inside a package.
pub const SCRIPTS_FOLDER: &str = "Scripts";

/// How a rule selects files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// `<Include>`: a relative path, absolute path, or glob
    Include,
    /// `<Match>`: name wildcards searched under a directory
    Match {
        /// Search directory (`In`), relative to the root
        in_dir: String,
        /// `|`-separated names to skip (`Exclude`)
        exclude: String,
    },
}

/// One inclusion rule of a package or zip file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRule {
    /// Include or match
    pub kind: RuleKind,
    /// Element text: the path or pattern
    pub text: String,
    /// Do not descend into subdirectories
    pub no_recurse: bool,
    /// Destination prefix (`Path`)
    pub path: String,
    /// Discard the source directory structure (`RewriteToPath`)
    pub rewrite: bool,
}

impl IncludeRule {
    /// Build from an `<Include>` or `<Match>` element; other elements yield
    /// `None`.
    pub fn from_element(el: &Element) -> Option<Self> {
        let kind = match el.name.as_str() {
            "Include" => RuleKind::Include,
            "Match" => RuleKind::Match {
                in_dir: el.attr("In").unwrap_or(".").trim().to_string(),
                exclude: el.attr("Exclude").unwrap_or_default().trim().to_string(),
            },
            _ => return None,
        };
        Some(Self {
            kind,
            text: el.text.trim().to_string(),
            no_recurse: el.attr("NoRecurse").is_some_and(parse_bool),
            path: el.attr("Path").unwrap_or_default().trim().to_string(),
            rewrite: el.attr("RewriteToPath").is_some_and(parse_bool),
        })
    }

    /// An `<Include>` rule with no destination prefix.
    pub fn include(text: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Include,
            text: text.into(),
            no_recurse: false,
            path: String::new(),
            rewrite: false,
        }
    }

    /// A `<Match>` rule searching `in_dir`.
    pub fn matching(pattern: impl Into<String>, in_dir: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Match { in_dir: in_dir.into(), exclude: String::new() },
            text: pattern.into(),
            no_recurse: false,
            path: String::new(),
            rewrite: false,
        }
    }

    /// Set the destination prefix.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the rewrite flag.
    pub fn with_rewrite(mut self, rewrite: bool) -> Self {
        self.rewrite = rewrite;
        self
    }

    /// Set the no-recurse flag.
    pub fn with_no_recurse(mut self, no_recurse: bool) -> Self {
        self.no_recurse = no_recurse;
        self
    }

    /// Set the exclusion list of a match rule.
    pub fn with_exclude(mut self, names: impl Into<String>) -> Self {
        if let RuleKind::Match { exclude, .. } = &mut self.kind {
            *exclude = names.into();
        }
        self
    }
}

/// A resolved file and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeEntry {
    /// Absolute source file
    pub source: PathBuf,
    /// Source path relative to the include root, or to the searched
    /// directory when the file lies outside the root
    pub relative: PathBuf,
    /// Whether the source lies inside the include root
    pub inside_root: bool,
    /// Destination prefix
    pub prefix: String,
    /// Discard the relative directory structure
    pub rewrite: bool,
}

impl IncludeEntry {
    fn file_name(&self) -> PathBuf {
        self.source.file_name().map(PathBuf::from).unwrap_or_default()
    }

    /// Destination inside a package: `prefix/file` when rewriting, otherwise
    /// `prefix/relative`.
    pub fn destination(&self) -> PathBuf {
        let tail = if self.rewrite { self.file_name() } else { self.relative.clone() };
        normalize_lexically(&Path::new(&self.prefix).join(tail))
    }

    /// Location in the package staging tree.
    ///
    /// Compiled scripts that are not already under a `Scripts` folder are
    /// moved under one unless the entry is rewritten.
    pub fn staging_path(&self) -> PathBuf {
        let under_scripts = starts_with_ignore_case(&self.relative, Path::new(SCRIPTS_FOLDER));
        if has_extension(&self.source, ARTIFACT_EXTENSION) && !self.rewrite && !under_scripts {
            Path::new(SCRIPTS_FOLDER).join(&self.relative)
        } else {
            self.destination()
        }
    }

    /// Entry name inside a zip file.
    ///
    /// Without a prefix, the path relative to the root (or the bare file name
    /// for files outside it). With a prefix, `prefix/file`.
    pub fn archive_name(&self) -> String {
        let name = match self.prefix.as_str() {
            "" if self.inside_root => self.relative.clone(),
            "" | "." => self.file_name(),
            prefix => Path::new(prefix).join(self.file_name()),
        };
        super::matcher::slash_path(&normalize_lexically(&name))
    }
}

type EntryIter = Box<dyn Iterator<Item = Result<IncludeEntry, IncludeError>>>;

/// Lazily expands include rules against a root directory.
pub struct IncludeResolver {
    root: PathBuf,
    rules: std::vec::IntoIter<IncludeRule>,
    zip_mode: bool,
    current: Option<EntryIter>,
    done: bool,
}

impl std::fmt::Debug for IncludeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeResolver")
            .field("root", &self.root)
            .field("zip_mode", &self.zip_mode)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl IncludeResolver {
    /// Resolve `rules` against `root`. In zip mode absolute paths outside the
    /// root are allowed and rewriting is not.
    pub fn new(root: impl Into<PathBuf>, rules: Vec<IncludeRule>, zip_mode: bool) -> Self {
        Self {
            root: normalize_lexically(&root.into()),
            rules: rules.into_iter(),
            zip_mode,
            current: None,
            done: false,
        }
    }

    fn expand(&self, rule: IncludeRule) -> Result<EntryIter, IncludeError> {
        if self.zip_mode && rule.rewrite {
            return Err(IncludeError::RewriteInZip);
        }
        if rule.rewrite && rule.path.is_empty() {
            return Err(IncludeError::RewriteWithoutPath);
        }
        match rule.kind.clone() {
            RuleKind::Include => self.expand_include(rule),
            RuleKind::Match { in_dir, exclude } => self.expand_match(rule, &in_dir, &exclude),
        }
    }

    fn expand_include(&self, rule: IncludeRule) -> Result<EntryIter, IncludeError> {
        let mut text = rule.text.trim().to_string();
        if text.is_empty() {
            return Err(IncludeError::EmptyPath);
        }
        if !self.zip_mode && text.starts_with("..") {
            return Err(IncludeError::ParentTraversal(text));
        }
        if text == "." || text.starts_with("./") || text.starts_with(".\\") {
            text = format!("{}{}", self.root.to_string_lossy(), &text[1..]);
        }
        text = text.replace('\\', "/");

        if has_wildcard(&text) {
            if !self.zip_mode && text.starts_with('/') && !self.is_inside_root(Path::new(&text)) {
                text = format!("**{}", text);
            }
            return self.expand_glob(rule, &text);
        }

        let path = Path::new(&text);
        let target = if path.is_absolute() {
            let target = normalize_lexically(path);
            if !self.zip_mode && !self.is_inside_root(&target) {
                return Err(IncludeError::OutsideRoot(target));
            }
            target
        } else {
            normalize_lexically(&self.root.join(path))
        };

        if target.is_file() {
            let entry = self.entry(target.clone(), target.parent().unwrap_or(&target), &rule);
            Ok(Box::new(std::iter::once(Ok(entry))))
        } else if target.is_dir() {
            Ok(self.walk(target, None, rule, |_| true))
        } else if path.is_absolute() {
            Ok(Box::new(std::iter::empty()))
        } else {
            // No exact hit: match the name case-insensitively, and at any
            // depth when it has no directory part.
            self.expand_glob(rule, &text)
        }
    }

    fn expand_glob(&self, rule: IncludeRule, text: &str) -> Result<EntryIter, IncludeError> {
        let glob = GlobPattern::new(text, rule.no_recurse)?;
        let base = if Path::new(glob.base()).is_absolute() {
            normalize_lexically(Path::new(glob.base()))
        } else {
            normalize_lexically(&self.root.join(glob.base()))
        };
        if !self.zip_mode && !self.is_inside_root(&base) {
            return Err(IncludeError::OutsideRoot(base));
        }
        if !base.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }
        let depth = glob.depth();
        let walk_base = base.clone();
        Ok(self.walk(base, depth, rule, move |path| {
            path.strip_prefix(&walk_base).map(|rel| glob.matches(rel)).unwrap_or(false)
        }))
    }

    fn expand_match(
        &self,
        rule: IncludeRule,
        in_dir: &str,
        exclude: &str,
    ) -> Result<EntryIter, IncludeError> {
        let normalized = in_dir.replace('\\', "/");
        let in_path = Path::new(&normalized);
        let search = if in_path.is_absolute() {
            let search = normalize_lexically(in_path);
            if !self.zip_mode && !self.is_inside_root(&search) {
                return Err(IncludeError::OutsideRoot(search));
            }
            search
        } else {
            normalize_lexically(&self.root.join(in_path))
        };
        if !search.is_dir() {
            return Err(IncludeError::MatchRootMissing(search));
        }

        let pattern = rule.text.trim();
        if pattern.is_empty() {
            return Err(IncludeError::EmptyPath);
        }
        if pattern.starts_with('.') {
            return Err(IncludeError::InvalidMatchPattern(pattern.to_string()));
        }
        let names = WildcardSet::parse(pattern)?;
        let excluded = WildcardSet::parse(exclude)?;

        let depth = rule.no_recurse.then_some(1);
        let root = self.root.clone();
        let prefix = rule.path.clone();
        let rewrite = rule.rewrite;
        let walk_root = search.clone();

        let iter = WalkDir::new(&search)
            .follow_links(true)
            .sort_by_file_name()
            .max_depth(depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(move |e| {
                e.depth() == 0 || !excluded.matches_any(&e.file_name().to_string_lossy())
            })
            .filter_map(move |item| match item {
                Ok(e) if e.file_type().is_file() => {
                    let name = e.file_name().to_string_lossy().into_owned();
                    names.matches(&name).then(|| {
                        Ok(make_entry(&root, &walk_root, e.into_path(), &prefix, rewrite))
                    })
                }
                Ok(_) => None,
                Err(err) => Some(Err(IncludeError::Walk(err.to_string()))),
            });
        Ok(Box::new(iter))
    }

    fn walk<F>(&self, base: PathBuf, depth: Option<usize>, rule: IncludeRule, accept: F) -> EntryIter
    where
        F: Fn(&Path) -> bool + 'static,
    {
        let root = self.root.clone();
        let walk_root = base.clone();
        let max_depth = match (depth, rule.no_recurse) {
            (Some(d), _) => d,
            (None, true) => 1,
            (None, false) => usize::MAX,
        };
        let iter = WalkDir::new(&base)
            .follow_links(true)
            .sort_by_file_name()
            .max_depth(max_depth)
            .into_iter()
            .filter_map(move |item| match item {
                Ok(e) if e.file_type().is_file() && accept(e.path()) => Some(Ok(make_entry(
                    &root,
                    &walk_root,
                    e.into_path(),
                    &rule.path,
                    rule.rewrite,
                ))),
                Ok(_) => None,
                Err(err) => Some(Err(IncludeError::Walk(err.to_string()))),
            });
        Box::new(iter)
    }

    fn entry(&self, source: PathBuf, base: &Path, rule: &IncludeRule) -> IncludeEntry {
        make_entry(&self.root, base, source, &rule.path, rule.rewrite)
    }

    fn is_inside_root(&self, path: &Path) -> bool {
        starts_with_ignore_case(&normalize_lexically(path), &self.root)
    }
}

fn make_entry(root: &Path, base: &Path, source: PathBuf, prefix: &str, rewrite: bool) -> IncludeEntry {
    let (relative, inside_root) = match strip_prefix_ignore_case(&source, root) {
        Some(rel) => (rel.to_path_buf(), true),
        None => {
            let rel = strip_prefix_ignore_case(&source, base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.file_name().map(PathBuf::from).unwrap_or_default());
            (rel, false)
        }
    };
    IncludeEntry { source, relative, inside_root, prefix: prefix.to_string(), rewrite }
}

impl Iterator for IncludeResolver {
    type Item = Result<IncludeEntry, IncludeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    Some(entry) => return Some(entry),
                    None => self.current = None,
                }
            }
            let Some(rule) = self.rules.next() else {
                self.done = true;
                return None;
            };
            match self.expand(rule) {
                Ok(iter) => self.current = Some(iter),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for IncludeResolver {}
