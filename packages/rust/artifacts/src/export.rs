//! Tabular export: spreadsheet, records-oriented JSON and CSV sinks.
//!
//! Files are named `{entity}_{run_tag}.{ext}` under one output directory.
//! Each sink is written to a hidden temp file and renamed into place, so a
//! failure never leaves a half-written file behind.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use gregory_shared::{Cell, Entity, GregoryError, Result, Tabular};

/// Excel rejects longer cell strings.
const XLSX_MAX_STRING_CHARS: usize = 32_767;

/// One of the three sink formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Xlsx,
    Json,
    Csv,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [Self::Xlsx, Self::Json, Self::Csv];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Metadata for a single written sink file.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub entity: Entity,
    pub format: ExportFormat,
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Writes normalized tables to the sink formats.
#[derive(Debug, Clone)]
pub struct TabularExporter {
    output_dir: PathBuf,
    run_tag: String,
}

impl TabularExporter {
    pub fn new(output_dir: impl Into<PathBuf>, run_tag: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_tag: run_tag.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Deterministic sink path for `entity` in `format`.
    pub fn file_path(&self, entity: Entity, format: ExportFormat) -> PathBuf {
        self.output_dir
            .join(format!("{entity}_{}.{}", self.run_tag, format.extension()))
    }

    /// Every path this exporter would write for `entity`.
    pub fn planned_paths(&self, entity: Entity) -> Vec<PathBuf> {
        ExportFormat::ALL
            .iter()
            .map(|f| self.file_path(entity, *f))
            .collect()
    }

    /// Export `rows` to all three sinks.
    ///
    /// Rows are ordered by id in the output; `rows` itself is left untouched.
    #[instrument(skip_all, fields(entity = %entity, rows = rows.len(), run_tag = %self.run_tag))]
    pub fn export<R: Tabular>(&self, rows: &[R], entity: Entity) -> Result<Vec<ExportedFile>> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| GregoryError::export(&self.output_dir, e))?;

        let mut ordered: Vec<&R> = rows.iter().collect();
        ordered.sort_by_key(|r| r.id());

        let columns = R::columns();
        let table: Vec<Vec<Cell>> = ordered.iter().map(|r| r.cells()).collect();

        let mut written = Vec::with_capacity(ExportFormat::ALL.len());
        for format in ExportFormat::ALL {
            let path = self.file_path(entity, format);
            let bytes = match format {
                ExportFormat::Xlsx => render_xlsx(entity, columns, &table),
                ExportFormat::Json => render_json(columns, &table),
                ExportFormat::Csv => render_csv(columns, &table),
            }
            .map_err(|cause| GregoryError::export(&path, cause))?;

            let file = write_atomic(&path, &bytes).map_err(|e| GregoryError::export(&path, e))?;
            debug!(path = %path.display(), size = file.size_bytes, "wrote export");

            written.push(ExportedFile {
                entity,
                format,
                path,
                sha256: file.sha256,
                size_bytes: file.size_bytes,
            });
        }

        info!(files = written.len(), "export complete");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

fn render_xlsx(entity: Entity, columns: &[&str], table: &[Vec<Cell>]) -> std::result::Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(entity.as_str()).map_err(|e| e.to_string())?;

    for (col, name) in columns.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *name)
            .map_err(|e| e.to_string())?;
    }

    for (i, cells) in table.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            let written = match cell {
                Cell::Int(n) => sheet.write_number(row, col, *n as f64),
                Cell::Bool(b) => sheet.write_boolean(row, col, *b),
                Cell::Null => continue,
                Cell::Text(_) | Cell::Date(_) => {
                    let text = cell.display();
                    sheet.write_string(row, col, truncate_chars(&text, XLSX_MAX_STRING_CHARS))
                }
            };
            written.map_err(|e| e.to_string())?;
        }
    }

    workbook.save_to_buffer().map_err(|e| e.to_string())
}

/// Records orientation: one object per row, keys in column order.
fn render_json(columns: &[&str], table: &[Vec<Cell>]) -> std::result::Result<Vec<u8>, String> {
    let records: Vec<Value> = table
        .iter()
        .map(|cells| {
            let object: Map<String, Value> = columns
                .iter()
                .zip(cells)
                .map(|(name, cell)| ((*name).to_string(), cell.to_json()))
                .collect();
            Value::Object(object)
        })
        .collect();

    serde_json::to_vec(&records).map_err(|e| e.to_string())
}

fn render_csv(columns: &[&str], table: &[Vec<Cell>]) -> std::result::Result<Vec<u8>, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).map_err(|e| e.to_string())?;
    for cells in table {
        writer
            .write_record(cells.iter().map(Cell::display))
            .map_err(|e| e.to_string())?;
    }
    writer.into_inner().map_err(|e| e.to_string())
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Atomic writes
// ---------------------------------------------------------------------------

pub(crate) struct WrittenFile {
    pub sha256: String,
    pub size_bytes: usize,
}

/// Write to `.{name}.tmp` beside `path`, then rename over it.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<WrittenFile> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes)?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);

    Ok(WrittenFile {
        sha256: format!("{:x}", hasher.finalize()),
        size_bytes: bytes.len(),
    })
}
