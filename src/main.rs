use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::error;
use longi::{IngestConfig, LongitudinalDataset, MetricStore, snapshot};

#[derive(Debug, Parser)]
#[command(name = "longi")]
#[command(about = "Assemble per-session behavioral CSV exports into a longitudinal dataset")]
struct Cli {
    /// Dataset name (ignored when restoring a snapshot).
    #[arg(long, default_value = "longitudinal")]
    name: String,

    /// JSON file overriding the default file layout.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from a saved snapshot instead of an empty dataset.
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Summary export, or a directory of them. Repeatable.
    #[arg(long)]
    summary: Vec<PathBuf>,

    /// By-round export, or a directory of them. Repeatable.
    #[arg(long = "by-round")]
    by_round: Vec<PathBuf>,

    /// Fixed row order for queries, e.g. `3,1,2`.
    #[arg(long, value_delimiter = ',')]
    animal_order: Vec<i64>,

    /// Save the dataset here after ingestion.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Allow `--save` to replace an existing snapshot.
    #[arg(long)]
    overwrite: bool,

    /// Metric to query.
    #[arg(long, requires = "experiment")]
    metric: Option<String>,

    #[arg(long)]
    experiment: Option<String>,

    /// Day columns for summary queries, e.g. `1,2,3`.
    #[arg(long, value_delimiter = ',')]
    days: Vec<i64>,

    /// Day to query for by-round metrics.
    #[arg(long)]
    day: Option<i64>,

    /// Write the queried matrix to this CSV file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the plottable metrics.
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut dataset = match &cli.restore {
        Some(path) => snapshot::load(path)?,
        None => {
            let config = match &cli.config {
                Some(path) => IngestConfig::from_json_file(path)?,
                None => IngestConfig::default(),
            };
            LongitudinalDataset::with_config(&cli.name, config)
        }
    };
    if !cli.animal_order.is_empty() {
        dataset.set_animal_order(Some(cli.animal_order.clone()));
    }

    // A file that cannot be read is reported and skipped; the rest still load.
    for path in expand_csv_paths(&cli.summary)? {
        if let Err(err) = dataset.ingest_summary(&path) {
            error!("skipping {}: {err}", path.display());
        }
    }
    for path in expand_csv_paths(&cli.by_round)? {
        if let Err(err) = dataset.ingest_by_round(&path) {
            error!("skipping {}: {err}", path.display());
        }
    }

    if let Some(path) = &cli.save {
        if !snapshot::save(&dataset, path, cli.overwrite)? {
            eprintln!("snapshot not saved: {} exists (pass --overwrite)", path.display());
        }
    }

    if cli.list {
        for name in dataset.plottable_metrics() {
            println!("{name}");
        }
    }

    if let (Some(metric), Some(experiment)) = (&cli.metric, &cli.experiment) {
        run_query(&dataset, &cli, metric, experiment)?;
    }

    Ok(())
}

fn run_query(dataset: &LongitudinalDataset, cli: &Cli, metric: &str, experiment: &str) -> Result<()> {
    let by_round = matches!(dataset.metric(metric), Some(MetricStore::ByRound(_)));
    let out: Box<dyn io::Write> = match &cli.out {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    if by_round {
        let Some(day) = cli.day else {
            bail!("'{metric}' is a by-round metric; pass --day");
        };
        dataset.query_rounds(metric, experiment, day)?.write_csv(out)?;
    } else {
        let days = (!cli.days.is_empty()).then_some(cli.days.as_slice());
        dataset.query(metric, experiment, days)?.write_csv(out)?;
    }
    Ok(())
}

/// Files are taken as given; directories contribute their `.csv` entries in
/// name order.
fn expand_csv_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("listing {}", input.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_csv(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}
