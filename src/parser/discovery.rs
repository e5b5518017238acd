use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const SAVEGAME_SUFFIX: &str = ".xml.gz";

/// Compressed savegames directly inside `dir`, most recently modified first
pub fn find_savegame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read savegame directory: {:?}", dir))?;

    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list: {:?}", dir))?;
        let path = entry.path();
        let is_savegame = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(SAVEGAME_SUFFIX));
        if !is_savegame || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, path));
    }

    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

pub fn most_recent_savegame(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(find_savegame_files(dir)?.into_iter().next())
}
