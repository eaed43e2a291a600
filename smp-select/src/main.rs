//! smp-select - pick the next track to play
//!
//! `next` prints the catalog track most similar to a reference track that is
//! not excluded, not the same recording, and not played recently. `import`
//! loads catalog tracks (with embeddings) from a JSON file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use smp_common::config::{
    resolve_database_path, resolve_root_folder, SelectionOverrides, TomlConfig, ROOT_FOLDER_ENV,
};
use smp_common::{time, Track, TrackId};
use smp_select::{NextTrackService, RankedTrack, ReferenceInput, SelectionOutcome};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for smp-select
#[derive(Parser, Debug)]
#[command(name = "smp-select")]
#[command(about = "Similarity-based next-track selection")]
#[command(version)]
struct Args {
    /// TOML config file (default: platform config dir, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, global = true, env = "SMP_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Database file (default: <root_folder>/smartplayer.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select the next track
    Next(NextArgs),
    /// Import catalog tracks from a JSON array
    Import {
        /// File containing `[{"id": ..., "path": ..., "embedding": [...]}, ...]`
        file: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
#[command(group(
    clap::ArgGroup::new("reference")
        .required(true)
        .args(["id", "path", "vector"])
))]
struct NextArgs {
    /// Reference track id
    #[arg(long)]
    id: Option<String>,

    /// Reference track path (as stored in the catalog)
    #[arg(long)]
    path: Option<String>,

    /// Reference embedding as a JSON array
    #[arg(long)]
    vector: Option<String>,

    /// File name the title heuristic compares against
    /// (default: file name of --path without `.mp3`)
    #[arg(long)]
    source_filename: Option<String>,

    /// Track id to exclude (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Recency window in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Near-duplicate cosine distance threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Title heuristic: substring or normalized
    #[arg(long)]
    title_match: Option<String>,

    /// Print the ranked shortlist instead of a single track
    #[arg(long)]
    shortlist: bool,

    /// Shortlist length
    #[arg(long)]
    limit: Option<usize>,

    /// Record a play of the selected track
    #[arg(long)]
    record: bool,

    /// Print the full selection report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = match &args.config {
        Some(path) => Some(TomlConfig::load(path).context("Failed to load config file")?),
        None => TomlConfig::load_default().context("Failed to load config file")?,
    };

    let level = toml_config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());

    // Logs go to stderr; stdout carries results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("smp_select={level},smp_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting smp-select v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder =
        resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, toml_config.as_ref());
    let db_path =
        resolve_database_path(args.database.as_deref(), toml_config.as_ref(), &root_folder);
    info!("Database path: {}", db_path.display());

    let overrides = toml_config
        .as_ref()
        .map(|c| c.selection.clone())
        .unwrap_or_default();

    let service = NextTrackService::open(&db_path, &overrides)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match args.command {
        Command::Next(next) => run_next(service, next).await,
        Command::Import { file } => run_import(&service, &file).await,
    }
}

async fn run_next(mut service: NextTrackService, args: NextArgs) -> Result<()> {
    let cli_overrides = SelectionOverrides {
        recency_window_secs: args.window_secs,
        near_duplicate_threshold: args.threshold,
        shortlist_size: args.limit,
        title_match: args.title_match.clone(),
    };
    service
        .settings_mut()
        .apply_overrides(&cli_overrides)
        .context("Invalid selection option")?;

    let reference = if let Some(id) = args.id {
        ReferenceInput::Id(TrackId::new(id))
    } else if let Some(path) = args.path {
        ReferenceInput::Path(path)
    } else if let Some(vector) = args.vector {
        let embedding: Vec<f32> =
            serde_json::from_str(&vector).context("--vector must be a JSON array of numbers")?;
        ReferenceInput::Vector(embedding)
    } else {
        anyhow::bail!("One of --id, --path or --vector is required");
    };

    let mut query = match service.query_for(reference).await {
        Ok(query) => query,
        Err(outcome) => return Err(outcome).context("Cannot resolve reference"),
    };
    if let Some(filename) = args.source_filename {
        query = query.with_source_filename(filename);
    }
    for id in args.exclude {
        query = query.exclude(id);
    }

    let report = service
        .evaluate(query, time::now())
        .await
        .context("Selection failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let limit = if args.shortlist {
        service.settings().shortlist_size
    } else {
        1
    };

    let picks = match report.into_shortlist(limit) {
        Ok(picks) => picks,
        Err(outcome @ SelectionOutcome::NoEligibleTrack { .. }) => {
            info!("{}", outcome);
            if !args.json {
                println!("No suitable match found.");
            }
            return Ok(());
        }
        Err(outcome) => return Err(outcome).context("Selection failed"),
    };

    if !args.json {
        for pick in &picks {
            println!("{}", describe(&service, pick).await?);
        }
    }

    if args.record {
        if let Some(best) = picks.first() {
            service
                .record_play(&best.track, time::now())
                .await
                .context("Failed to record play")?;
            info!("Recorded play of {}", best.track.path);
        }
    }

    Ok(())
}

async fn run_import(service: &NextTrackService, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let tracks: Vec<Track> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let count = service
        .import_tracks(&tracks)
        .await
        .context("Import failed")?;
    println!("Imported {} tracks", count);
    Ok(())
}

/// `path (cosine distance: 0.1234, last played: ...)`
async fn describe(service: &NextTrackService, pick: &RankedTrack) -> Result<String> {
    let last_played = service
        .last_played(&pick.track)
        .await
        .context("Failed to read play history")?
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    Ok(format!(
        "{} (cosine distance: {:.4}, last played: {})",
        pick.track.path,
        pick.distance(),
        last_played
    ))
}
