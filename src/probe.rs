//! Local-state probing: which time keys still need fetching
//!
//! Presence of an artifact on disk is the resume checkpoint; there is no
//! separate manifest. Probing never touches the network.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::Result;
use crate::time_key::TimeKey;

/// Local state of one time key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Presence {
    /// No artifact yet
    Missing,
    /// Artifact(s) found at these paths
    Present(Vec<PathBuf>),
}

impl Presence {
    /// Whether anything was found
    pub fn is_present(&self) -> bool {
        matches!(self, Presence::Present(_))
    }

    /// Paths of the artifacts found (empty when missing)
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Presence::Missing => &[],
            Presence::Present(paths) => paths,
        }
    }
}

/// Single-artifact probe: present iff `path` exists
pub fn probe_path(path: &Path) -> Presence {
    if path.exists() {
        Presence::Present(vec![path.to_path_buf()])
    } else {
        Presence::Missing
    }
}

/// Pattern probe for keys that map to a family of artifacts
///
/// Lists `dir` (non-recursively) and returns every regular file whose name matches
/// `pattern`, sorted by name. A missing directory means nothing is present.
pub fn probe_matching(dir: &Path, pattern: &Regex) -> Result<Presence> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Presence::Missing),
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if pattern.is_match(&name.to_string_lossy()) {
            paths.push(entry.path());
        }
    }

    if paths.is_empty() {
        Ok(Presence::Missing)
    } else {
        paths.sort();
        Ok(Presence::Present(paths))
    }
}

/// Keep only the keys whose artifacts are missing, in input order
///
/// When anything is pending, `root` is created (idempotently) so later stages
/// can write into it. A failure to create it is fatal for the run.
pub fn pending_keys<P>(keys: Vec<TimeKey>, mut probe: P, root: &Path) -> Result<Vec<TimeKey>>
where
    P: FnMut(&TimeKey) -> Result<Presence>,
{
    let total = keys.len();
    let mut pending = Vec::with_capacity(total);
    for key in keys {
        match probe(&key)? {
            Presence::Missing => pending.push(key),
            Presence::Present(paths) => {
                tracing::info!(key = %key, artifacts = paths.len(), "Already present locally");
            }
        }
    }

    if !pending.is_empty() {
        std::fs::create_dir_all(root)?;
    }

    tracing::debug!(
        candidates = total,
        pending = pending.len(),
        root = %root.display(),
        "Local state probed"
    );
    Ok(pending)
}
