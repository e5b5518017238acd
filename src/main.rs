use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Instant;
use x4_savegame_to_sqlite::{
    cli::{Cli, Commands},
    config::Settings,
    error::IngestError,
    logging::init_logging,
    parser::{most_recent_savegame, ParseOutcome, SavegameParser},
    ui::{format_bytes, SilentUi, UiApp},
    writer::SqliteStore,
};

type QueueResults = Vec<(PathBuf, Result<ParseOutcome, IngestError>)>;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let settings = Settings::from_cli(&cli)?;
    let parsing = matches!(cli.command, Commands::Parse { .. } | Commands::Latest { .. });
    init_logging(settings.verbosity, settings.tui && parsing)?;

    match cli.command {
        Commands::Parse { files } => run_parse(&settings, files),

        Commands::Latest { dir } => {
            let path = most_recent_savegame(&dir)?
                .with_context(|| format!("No *.xml.gz savegames found in {:?}", dir))?;
            run_parse(&settings, vec![path])
        }

        Commands::List => {
            let store = SqliteStore::open(&settings.db_path)?;
            let savegames = store.list_savegames()?;
            if savegames.is_empty() {
                println!("No savegames stored in {:?}", settings.db_path);
                return Ok(());
            }
            println!("Stored savegames:\n");
            for row in savegames {
                println!(
                    "  {:<32} {:<20} {:>14} credits  {:>10}  parsed {}",
                    row.filename,
                    row.player_name.as_deref().unwrap_or("-"),
                    row.player_money.unwrap_or_default(),
                    format_bytes(row.file_size.unwrap_or_default().max(0) as u64),
                    row.parsed_at.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }

        Commands::Show { filename } => {
            let store = SqliteStore::open(&settings.db_path)?;
            let row = store
                .savegame_by_filename(&filename)?
                .with_context(|| format!("Savegame not found: {}", filename))?;
            let data = store
                .savegame_data(row.id)?
                .with_context(|| format!("Savegame vanished while reading: {}", filename))?;
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
    }
}

fn run_parse(settings: &Settings, files: Vec<PathBuf>) -> Result<()> {
    let start = Instant::now();
    let store = SqliteStore::open(&settings.db_path)?;
    let mut parser = SavegameParser::new(store, settings.stats_index());

    let results = if settings.tui {
        let mut ui = UiApp::new()?;
        let results = parser.parse_queue(&files, &mut ui);
        ui.finish(&summary_line(&results, start))?;
        results
    } else {
        parser.parse_queue(&files, &mut SilentUi)
    };

    for (path, result) in &results {
        match result {
            Ok(outcome) => println!(
                "✓ {}: {} ships, {} stations, {} blueprints (player {}, {} credits)",
                outcome.filename,
                outcome.summary.ships,
                outcome.summary.stations,
                outcome.summary.blueprints,
                outcome.summary.player_name,
                outcome.summary.player_money
            ),
            Err(err) => println!("✗ {:?}: {} [stage: {}]", path, err, err.stage()),
        }
    }
    println!("\n{} -> {:?}", summary_line(&results, start), settings.db_path);

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        bail!("{} of {} savegames failed to parse", failed, files.len());
    }
    Ok(())
}

fn summary_line(results: &QueueResults, start: Instant) -> String {
    let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
    format!(
        "Parsed {} of {} savegames in {:.1}s",
        ok,
        results.len(),
        start.elapsed().as_secs_f64()
    )
}
