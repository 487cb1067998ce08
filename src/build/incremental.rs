//! Incremental build support.
//!
//! Decides which scripts need compiling by comparing each source file's
//! modification time with the compile time recorded in its artifact header.
//!
//! # How It Works
//!
//! 1. Find the artifact belonging to each script (exact path, then base name)
//! 2. Read the artifact header fresh from disk
//! 3. Mark the script stale when `source mtime >= compile time`
//! 4. Union with the scripts whose artifacts are missing
//! 5. Order deepest paths first
//!
//! An artifact with an unrecognized magic never marks its script stale. A
//! truncated or unreadable header does.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::build::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::game::ARTIFACT_EXTENSION;
use crate::header::read_header;
use crate::paths::{has_extension, separator_count};
use crate::project::ScriptUnit;

/// Outcome of comparing one source with its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Source changed at or after the recorded compile time
    Stale,
    /// Artifact is newer than the source
    UpToDate,
    /// Artifact header has an unknown magic; its age cannot be known
    UnknownFormat,
}

/// Seconds since the epoch of a file's modification time.
pub fn modified_secs(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// Compare `source` against the header of `artifact`.
pub fn check_staleness(source: &Path, artifact: &Path) -> Staleness {
    let header = match read_header(artifact) {
        Ok(header) => header,
        Err(e) if e.is_unknown_format() => return Staleness::UnknownFormat,
        Err(_) => return Staleness::Stale,
    };
    match modified_secs(source) {
        Some(mtime) if mtime < header.compile_time => Staleness::UpToDate,
        _ => Staleness::Stale,
    }
}

/// Every compiled artifact under `output`, in file-name order.
pub fn collect_artifacts(output: &Path) -> Vec<PathBuf> {
    if !output.is_dir() {
        return Vec::new();
    }
    WalkDir::new(output)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), ARTIFACT_EXTENSION))
        .map(|e| e.into_path())
        .collect()
}

/// Sort scripts deepest first: by separator count, then by path length,
/// both descending. Stable for equal keys.
pub fn sort_by_depth(scripts: &mut [ScriptUnit]) {
    scripts.sort_by(|a, b| {
        let key = |s: &ScriptUnit| {
            let path = s.source.to_string_lossy();
            (separator_count(&s.source), path.len())
        };
        key(b).cmp(&key(a))
    });
}

fn stem_key(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_lowercase())
}

/// Select the scripts to compile.
///
/// With `incremental` off every script is compiled. Otherwise only stale
/// scripts and scripts listed in `missing` are. The result is deduplicated
/// and ordered by [`sort_by_depth`].
pub fn plan_compilation(
    scripts: &[ScriptUnit],
    artifacts: &[PathBuf],
    missing: &[ScriptUnit],
    incremental: bool,
    reporter: &dyn ProgressReporter,
) -> Vec<ScriptUnit> {
    let mut selected: Vec<ScriptUnit> = if incremental {
        let exact: HashSet<&Path> = artifacts.iter().map(PathBuf::as_path).collect();
        let mut by_stem: HashMap<String, &Path> = HashMap::new();
        for artifact in artifacts {
            if let Some(stem) = stem_key(artifact) {
                by_stem.entry(stem).or_insert(artifact);
            }
        }

        let mut stale = Vec::new();
        for script in scripts {
            let artifact = if exact.contains(script.artifact.as_path()) {
                Some(script.artifact.as_path())
            } else {
                stem_key(&script.source).and_then(|k| by_stem.get(&k).copied())
            };
            let Some(artifact) = artifact else { continue };

            match check_staleness(&script.source, artifact) {
                Staleness::Stale => stale.push(script.clone()),
                Staleness::UpToDate => {}
                Staleness::UnknownFormat => reporter.report(ProgressEvent::warning(
                    Stage::Compile,
                    format!(
                        "Unrecognized artifact format: \"{}\"; treating as up to date",
                        artifact.display()
                    ),
                )),
            }
        }
        stale.extend(missing.iter().cloned());
        stale
    } else {
        scripts.to_vec()
    };

    let mut seen = HashSet::new();
    selected.retain(|s| seen.insert(s.source.clone()));
    sort_by_depth(&mut selected);
    selected
}
