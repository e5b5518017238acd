use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "x4-savegame-to-sqlite")]
#[command(version, about = "Stream X4 savegames into a SQLite database")]
pub struct Cli {
    /// SQLite database path (default: platform data directory)
    #[arg(long, global = true, env = "X4_SAVEGAME_DB")]
    pub db: Option<PathBuf>,

    /// Directory of extracted macro definition files
    #[arg(long, global = true, env = "X4_CATALOGS_DIR")]
    pub catalogs: Option<PathBuf>,

    /// Show the terminal dashboard while parsing
    #[arg(long, global = true)]
    pub tui: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse savegame files one after another
    Parse {
        /// Gzip-compressed savegames (*.xml.gz)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Parse the most recently modified savegame in a directory
    Latest {
        #[arg(env = "X4_SAVEGAME_DIR")]
        dir: PathBuf,
    },

    /// List stored savegames
    List,

    /// Print a stored savegame as JSON
    Show {
        /// Savegame file name, e.g. quicksave.xml.gz
        filename: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requires_files() {
        assert!(Cli::try_parse_from(["x4-savegame-to-sqlite", "parse"]).is_err());

        let cli = Cli::try_parse_from([
            "x4-savegame-to-sqlite",
            "parse",
            "a.xml.gz",
            "b.xml.gz",
            "--tui",
        ])
        .unwrap();
        assert!(cli.tui);
        match cli.command {
            Commands::Parse { files } => assert_eq!(files.len(), 2),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_show_takes_filename() {
        let cli =
            Cli::try_parse_from(["x4-savegame-to-sqlite", "show", "quicksave.xml.gz"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Show { filename } if filename == "quicksave.xml.gz"
        ));
    }
}
