use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use crate::cli::Cli;
use crate::stats::ModuleStatsIndex;

pub const DB_FILENAME: &str = "x4_savegame.db";

/// Resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub catalogs_dir: Option<PathBuf>,
    pub tui: bool,
    pub verbosity: u8,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let db_path = match &cli.db {
            Some(path) => path.clone(),
            None => default_db_path()?,
        };

        Ok(Self {
            db_path,
            catalogs_dir: cli.catalogs.clone(),
            tui: cli.tui,
            verbosity: cli.verbose,
        })
    }

    pub fn stats_index(&self) -> ModuleStatsIndex {
        ModuleStatsIndex::with_default_candidates(self.catalogs_dir.clone())
    }
}

/// `<platform data dir>/x4_savegame.db`
pub fn default_db_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "x4-savegame-to-sqlite")
        .context("Could not determine data directory")?;
    Ok(dirs.data_dir().join(DB_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_explicit_paths_win() {
        let cli = Cli::try_parse_from([
            "x4-savegame-to-sqlite",
            "--db",
            "/tmp/x4.db",
            "--catalogs",
            "/opt/catalogs",
            "-vv",
            "list",
        ])
        .unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.db_path, PathBuf::from("/tmp/x4.db"));
        assert_eq!(settings.catalogs_dir, Some(PathBuf::from("/opt/catalogs")));
        assert_eq!(settings.verbosity, 2);
        assert!(!settings.tui);
    }

    #[test]
    fn test_default_db_file_name() {
        if let Ok(path) = default_db_path() {
            assert!(path.ends_with(DB_FILENAME));
        }
    }
}
