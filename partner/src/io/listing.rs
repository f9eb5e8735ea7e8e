//! Top-level directory listing fed into each prompt.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

/// Entries beyond this count are summarized instead of listed.
pub const MAX_LISTED_ENTRIES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Read the direct children of `root`, directories first, then by name.
pub fn list_entries(root: &Path) -> Result<Vec<ListingEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read directory {}", root.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", root.display()))?;
        let meta = entry
            .metadata()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
        });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Render the listing as prompt text. Failures are rendered, not returned, so
/// a listing problem never blocks a turn.
pub fn describe(root: &Path) -> String {
    let entries = match list_entries(root) {
        Ok(entries) => entries,
        Err(err) => {
            let detail = format!("{err:#}");
            warn!(root = %root.display(), error = %detail, "directory listing failed");
            return format!("Error listing files: {detail}");
        }
    };
    if entries.is_empty() {
        return "(empty directory)".to_string();
    }

    let mut lines: Vec<String> = entries
        .iter()
        .take(MAX_LISTED_ENTRIES)
        .map(|entry| {
            if entry.is_dir {
                format!("{}/", entry.name)
            } else {
                format!("{} ({} bytes)", entry.name, entry.size)
            }
        })
        .collect();
    if entries.len() > MAX_LISTED_ENTRIES {
        lines.push(format!(
            "... and {} more entries",
            entries.len() - MAX_LISTED_ENTRIES
        ));
    }
    lines.join("\n")
}
