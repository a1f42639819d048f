use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fpwrap_domain::{ApplicationId, WrapperName};

/// The recognition marker every generated wrapper carries in its header.
/// Foreign files in the bin directory never contain it, so the orphan
/// reconciler and the cleanup engine only ever touch our own files.
pub const WRAPPER_MARKER: &str = "Generated by fpwrap";

/// How much of a candidate file the probe will read.
const PROBE_LIMIT: u64 = 4096;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrapperProbe {
    pub name: Option<WrapperName>,
    pub id: ApplicationId,
}

/// Checks whether `path` is one of our wrappers and extracts the embedded id.
///
/// Reads at most the first 4 KiB. Requires both the marker comment and a
/// well-formed `ID="…"` assignment; anything else — directories, binaries,
/// unrelated scripts — yields `None`.
pub fn probe_wrapper(path: &Path) -> Option<WrapperProbe> {
    let mut file = File::open(path).ok()?;
    let mut head = Vec::with_capacity(PROBE_LIMIT as usize);
    file.by_ref()
        .take(PROBE_LIMIT)
        .read_to_end(&mut head)
        .ok()?;
    let head = String::from_utf8_lossy(&head);

    if !head.contains(WRAPPER_MARKER) {
        return None;
    }
    let id = extract_assignment(&head, "ID")?;
    let id = ApplicationId::parse(&id).ok()?;
    let name = extract_assignment(&head, "NAME").and_then(|n| WrapperName::parse(&n));
    Some(WrapperProbe { name, id })
}

fn extract_assignment(head: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=\"");
    for line in head.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(&needle) {
            if let Some(end) = rest.find('"') {
                return Some(rest[..end].to_string());
            }
        }
    }
    None
}

/// Every wrapper of ours in `bin_dir`, sorted by file name. Symlinks and
/// foreign files are skipped; a missing directory is an empty result.
pub fn scan_bin_dir(bin_dir: &Path) -> Result<Vec<(PathBuf, WrapperProbe)>> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(bin_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", bin_dir.display()))
        }
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if !file_type.is_file() {
            continue;
        }
        if let Some(probe) = probe_wrapper(&path) {
            found.push((path, probe));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}
