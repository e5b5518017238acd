pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod parser;
pub mod schema;
pub mod stats;
pub mod ui;
pub mod writer;

pub use cli::{Cli, Commands};
pub use error::{IngestError, Stage};
pub use parser::{ParseOutcome, ParseSummary, SavegameParser};
pub use stats::ModuleStatsIndex;
pub use ui::{Phase, SilentUi, Ui, UiApp};
pub use writer::{SavegameStore, SqliteStore, StoreError};
