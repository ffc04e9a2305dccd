//! Writing result tables to CSV or JSON, with a metadata sidecar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SceneResult;
use crate::stats_query::ResultTable;

/// Output format of an exported table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Write `table` as CSV: one header line, empty fields for missing cells.
pub fn write_csv<W: Write>(table: &ResultTable, writer: W) -> SceneResult<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(table.columns())?;
    for row in table.rows() {
        let record: Vec<String> = table
            .columns()
            .iter()
            .map(|column| row.get(column).map(|cell| cell.to_string()).unwrap_or_default())
            .collect();
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

/// Write `table` as pretty JSON (`{"columns": [...], "rows": [...]}`).
pub fn write_json<W: Write>(table: &ResultTable, writer: W) -> SceneResult<()> {
    serde_json::to_writer_pretty(writer, table)?;
    Ok(())
}

pub fn write_table<W: Write>(table: &ResultTable, format: OutputFormat, writer: W) -> SceneResult<()> {
    match format {
        OutputFormat::Csv => write_csv(table, writer),
        OutputFormat::Json => write_json(table, writer),
    }
}

/// Write `table` to a file.
pub fn export_table(table: &ResultTable, format: OutputFormat, path: &Path) -> SceneResult<()> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_table(table, format, file)?;
    log::info!("Exported {} rows to {:?}", table.len(), path);
    Ok(())
}

/// Provenance of an exported table.
/// Written as `<output>.meta.json` next to the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// Scene snapshot the table was read from.
    pub scene_path: PathBuf,

    /// SHA-256 of the scene snapshot file.
    pub scene_hash: String,

    /// Name of the item whose measurements were queried.
    pub item_name: String,

    pub format: OutputFormat,

    pub row_count: usize,

    pub column_count: usize,

    /// Timestamp of the export (ISO 8601).
    pub exported_at: DateTime<Utc>,

    pub scenestats_version: String,
}

impl ExportMetadata {
    pub fn new(
        scene_path: &Path,
        item_name: impl Into<String>,
        format: OutputFormat,
        table: &ResultTable,
    ) -> SceneResult<Self> {
        Ok(Self {
            scene_path: scene_path.to_path_buf(),
            scene_hash: Self::hash_file(scene_path)?,
            item_name: item_name.into(),
            format,
            row_count: table.len(),
            column_count: table.columns().len(),
            exported_at: Utc::now(),
            scenestats_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Compute SHA-256 hash of file content.
    pub fn hash_file(path: &Path) -> SceneResult<String> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Sidecar path for an export written to `output`.
    pub fn sidecar_path(output: &Path) -> PathBuf {
        let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".meta.json");
        output.with_file_name(name)
    }

    pub fn save(&self, path: &Path) -> SceneResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
