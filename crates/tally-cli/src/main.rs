use clap::{Parser, Subcommand};
use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};
use tally::{
    Engine,
    prelude::{Document, EngineConfig, QueryExpr, QueryResult, Value},
};
use thiserror::Error as ThisError;

// Every CLI run lives in one throwaway in-memory aggregation.
const AGGREGATION: &str = "cli";

///
/// Cli
///

#[derive(Debug, Parser)]
#[command(name = "tally", version = tally::VERSION, about = "Run Tally aggregations over JSON-lines events")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest events, apply retractions, and print one JSON row per bucket.
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Query expression as JSON, e.g. {"verb":"BrokenDownBy",...}.
    #[arg(long)]
    query: PathBuf,

    /// Events to ingest, one JSON object per line.
    #[arg(long)]
    events: PathBuf,

    /// Events to retract after ingestion, one JSON object per line.
    #[arg(long)]
    retract: Option<PathBuf>,

    /// Engine config as TOML.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print only root buckets under this index prefix (a JSON array).
    #[arg(long)]
    index: Option<String>,
}

///
/// CliError
///

#[derive(Debug, ThisError)]
enum CliError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("{path}: invalid query: {source}")]
    Query {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("--index must be a JSON array of values: {0}")]
    Index(serde_json::Error),

    #[error("{path}:{line}: {source}")]
    Event {
        path: PathBuf,
        line: usize,
        source: tally::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error(transparent)]
    Tally(#[from] tally::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => run(&args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tally: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &RunArgs) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_toml_str(&read(path)?).map_err(tally::Error::from)?,
        None => EngineConfig::default(),
    };
    let query: QueryExpr =
        serde_json::from_str(&read(&args.query)?).map_err(|source| CliError::Query {
            path: args.query.clone(),
            source,
        })?;
    let prefix = args
        .index
        .as_deref()
        .map(serde_json::from_str::<Vec<Value>>)
        .transpose()
        .map_err(CliError::Index)?;

    let agg = Engine::in_memory()
        .with_config(config)
        .aggregation(AGGREGATION, &query)?;

    for doc in read_events(&args.events)? {
        agg.ingest(&doc);
    }
    agg.commit()?;

    if let Some(path) = &args.retract {
        for doc in read_events(path)? {
            agg.uningest(&doc);
        }
        agg.commit()?;
    }

    let rows = match &prefix {
        Some(values) => agg.lookup_index(values)?,
        None => agg.results()?,
    };
    print_rows(rows)
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// Blank lines are skipped; line numbers in errors are 1-based.
fn read_events(path: &Path) -> Result<Vec<Document>, CliError> {
    read(path)?
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            Document::from_json_str(line).map_err(|err| CliError::Event {
                path: path.to_path_buf(),
                line: i + 1,
                source: err.into(),
            })
        })
        .collect()
}

fn print_rows(rows: impl Iterator<Item = QueryResult>) -> Result<(), CliError> {
    let mut out = BufWriter::new(io::stdout().lock());
    for row in rows {
        serde_json::to_writer(&mut out, &row).map_err(io::Error::from)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    Ok(())
}
