use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use crate::export::{export_table, write_table, ExportMetadata, OutputFormat};
use crate::item_query::FailurePolicy;
use crate::job::{AppendJobSpec, ItemSelector, QueryJobSpec, StatsSelector};
use crate::memory_session::MemorySession;
use crate::session::EngineSession;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List items in a scene
    Items {
        /// Scene snapshot (JSON)
        scene: PathBuf,

        /// Group to search in (defaults to the scene root)
        #[arg(long)]
        parent: Option<String>,

        /// Exact item name
        #[arg(long)]
        name: Option<String>,

        /// Item kind, e.g. PointSet, Region, Spots, Surfaces
        #[arg(long)]
        kind: Option<String>,

        /// Descend into groups
        #[arg(long)]
        recursive: bool,

        /// Fail instead of skipping items that cannot be converted
        #[arg(long)]
        strict: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Filter the measurements of one item
    Stats {
        /// Scene snapshot (JSON)
        scene: PathBuf,

        /// Item name (searched recursively)
        #[arg(long)]
        item: String,

        /// Item kind
        #[arg(long)]
        kind: Option<String>,

        /// Statistic name or pattern (repeatable)
        #[arg(long = "stat")]
        stats: Vec<String>,

        /// Object id (repeatable)
        #[arg(long = "id")]
        ids: Vec<i64>,

        /// Channel, counting from 1 (repeatable)
        #[arg(long = "channel")]
        channels: Vec<u32>,

        /// Timepoint, counting from 0 (repeatable)
        #[arg(long = "time")]
        timepoints: Vec<u32>,

        /// List statistic names with value summaries instead of filtering
        #[arg(long)]
        list: bool,

        /// Output file (defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },

    /// Run a query job file
    Query {
        #[arg(long)]
        job: PathBuf,
    },

    /// Run a write-back job file
    Append {
        #[arg(long)]
        job: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Items { scene, parent, name, kind, recursive, strict, json } => {
            let selector = ItemSelector { parent, name, kind, recursive, position: 1 };
            let policy = if strict { FailurePolicy::Strict } else { FailurePolicy::BestEffort };
            list_items(scene, selector, policy, json)?;
        }
        Commands::Stats { scene, item, kind, stats, ids, channels, timepoints, list, out, format } => {
            let selector = ItemSelector { kind, ..ItemSelector::by_name(item) };
            let filter = StatsSelector { names: stats, ids, channels, timepoints, categories: Vec::new() };
            if list {
                list_statistics(scene, selector)?;
            } else {
                query_statistics(scene, selector, filter, out, format)?;
            }
        }
        Commands::Query { job } => {
            let spec = QueryJobSpec::from_file(&job).map_err(anyhow::Error::msg)?;
            spec.validate().map_err(anyhow::Error::msg)?;
            let table = spec.execute()?;
            if spec.output_path.is_none() {
                write_table(&table, spec.format, std::io::stdout().lock())?;
            }
        }
        Commands::Append { job } => {
            let spec = AppendJobSpec::from_file(&job).map_err(anyhow::Error::msg)?;
            spec.validate().map_err(anyhow::Error::msg)?;
            let written = spec.execute()?;
            println!(
                "Wrote {} '{}' records to {:?}",
                written,
                spec.statistic_name,
                spec.effective_output_path()
            );
        }
    }
    Ok(())
}

fn list_items(scene: PathBuf, selector: ItemSelector, policy: FailurePolicy, json: bool) -> Result<()> {
    selector.validate().map_err(anyhow::Error::msg)?;
    let session = MemorySession::from_file(&scene)
        .with_context(|| format!("Failed to open scene {:?}", scene))?;
    let found = selector.query(&session, policy)?.find(&session)?;

    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &found)?;
        writeln!(stdout)?;
    } else {
        for item in &found {
            let kind = item.kind().map(|k| k.display_name()).unwrap_or("?");
            let hidden = if item.visible { "" } else { " (hidden)" };
            writeln!(stdout, "{}\t{}\t{}{}", item.handle, kind, item.name, hidden)?;
        }
    }
    session.close();
    Ok(())
}

fn list_statistics(scene: PathBuf, selector: ItemSelector) -> Result<()> {
    let session = MemorySession::from_file(&scene)
        .with_context(|| format!("Failed to open scene {:?}", scene))?;
    let item = selector.resolve(&session, FailurePolicy::BestEffort)?;
    let table = session.measurements(item.target())?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}: {} records, factors [{}]", item.name, table.len(), table.factor_names().join(", "))?;
    for name in table.distinct_names() {
        let summary = table.summary(name);
        writeln!(
            stdout,
            "  {:<40} n={:<6} min={:<10.4} mean={:<10.4} max={:.4}",
            name, summary.count, summary.min, summary.mean, summary.max
        )?;
    }
    session.close();
    Ok(())
}

fn query_statistics(
    scene: PathBuf,
    selector: ItemSelector,
    filter: StatsSelector,
    out: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    selector.validate().map_err(anyhow::Error::msg)?;
    filter.validate().map_err(anyhow::Error::msg)?;

    let session = MemorySession::from_file(&scene)
        .with_context(|| format!("Failed to open scene {:?}", scene))?;
    let item = selector.resolve(&session, FailurePolicy::BestEffort)?;
    let table = filter.query().evaluate_item(&session, item.target())?;
    session.close();

    match out {
        Some(path) => {
            export_table(&table, format, &path)?;
            ExportMetadata::new(&scene, &item.name, format, &table)?
                .save(&ExportMetadata::sidecar_path(&path))?;
            println!("Wrote {} rows to {:?}", table.len(), path);
        }
        None => write_table(&table, format, std::io::stdout().lock())?,
    }
    Ok(())
}
