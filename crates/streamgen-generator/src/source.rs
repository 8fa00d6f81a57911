//! Row sources for master entity types.
//!
//! A [`RowSource`] is a lazy, non-restartable sequence of rows. Generated
//! sources may be unbounded; inline and CSV sources end with their input.

use crate::error::SourceError;
use crate::generators::generate_value;
use rand::rngs::StdRng;
use rand::Rng;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use streamgen_core::{yaml_to_value, FieldSpec, Row, SourceSpec, Value};

/// A lazy sequence of rows.
pub trait RowSource: Iterator<Item = Result<Row, SourceError>> + Send {
    /// Short description for log lines.
    fn describe(&self) -> String;
}

/// Open the source a master spec declares.
pub fn open_source(spec: &SourceSpec, rng: StdRng) -> Result<Box<dyn RowSource>, SourceError> {
    let source: Box<dyn RowSource> = match spec {
        SourceSpec::Csv {
            file,
            delimiter,
            has_headers,
        } => Box::new(CsvRows::open(file, *delimiter, *has_headers)?),
        SourceSpec::Generator { count, fields } => {
            Box::new(GeneratedRows::new(fields.clone(), Some(*count), rng))
        }
        SourceSpec::Inline { rows } => Box::new(InlineRows::new(rows.clone())),
    };
    Ok(source)
}

/// Produce one row from field generators.
pub fn generate_row<R: Rng + ?Sized>(fields: &[FieldSpec], rng: &mut R, index: u64) -> Row {
    fields
        .iter()
        .map(|field| (field.name.clone(), generate_value(&field.generator, rng, index)))
        .collect()
}

// ============================================================================
// Generated
// ============================================================================

/// Rows synthesized from field generators.
pub struct GeneratedRows {
    fields: Vec<FieldSpec>,
    rng: StdRng,
    index: u64,
    limit: Option<u64>,
}

impl GeneratedRows {
    /// `limit: None` makes the source unbounded.
    pub fn new(fields: Vec<FieldSpec>, limit: Option<u64>, rng: StdRng) -> Self {
        Self {
            fields,
            rng,
            index: 0,
            limit,
        }
    }
}

impl Iterator for GeneratedRows {
    type Item = Result<Row, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return None;
        }
        let row = generate_row(&self.fields, &mut self.rng, self.index);
        self.index += 1;
        Some(Ok(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.limit {
            Some(limit) => {
                let remaining = usize::try_from(limit.saturating_sub(self.index)).unwrap_or(usize::MAX);
                (remaining, Some(remaining))
            }
            None => (usize::MAX, None),
        }
    }
}

impl RowSource for GeneratedRows {
    fn describe(&self) -> String {
        match self.limit {
            Some(limit) => format!("generator ({limit} rows)"),
            None => "generator (unbounded)".to_string(),
        }
    }
}

// ============================================================================
// Inline
// ============================================================================

/// Rows written inline in the config document.
pub struct InlineRows {
    rows: std::vec::IntoIter<BTreeMap<String, YamlValue>>,
    total: usize,
}

impl InlineRows {
    pub fn new(rows: Vec<BTreeMap<String, YamlValue>>) -> Self {
        Self {
            total: rows.len(),
            rows: rows.into_iter(),
        }
    }
}

impl Iterator for InlineRows {
    type Item = Result<Row, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(Ok(row
            .iter()
            .map(|(name, value)| (name.clone(), yaml_to_value(value)))
            .collect()))
    }
}

impl RowSource for InlineRows {
    fn describe(&self) -> String {
        format!("inline ({} rows)", self.total)
    }
}

// ============================================================================
// CSV
// ============================================================================

/// Rows read lazily from a CSV file.
///
/// Column names come from the header line, or are `column_0`, `column_1`,
/// ... when the file has none. Cell values are typed by inference.
pub struct CsvRows {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    record: csv::StringRecord,
    position: u64,
}

impl CsvRows {
    pub fn open(path: &Path, delimiter: char, has_headers: bool) -> Result<Self, SourceError> {
        let open_error = |source: csv::Error| SourceError::Open {
            path: path.to_path_buf(),
            source,
        };

        let delimiter = u8::try_from(delimiter).unwrap_or(b',');
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .delimiter(delimiter)
            .from_path(path)
            .map_err(open_error)?;

        let headers = if has_headers {
            reader
                .headers()
                .map_err(open_error)?
                .iter()
                .map(|h| h.trim().to_string())
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            record: csv::StringRecord::new(),
            position: 0,
        })
    }

    fn column_name(&self, i: usize) -> String {
        self.headers
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("column_{i}"))
    }
}

impl Iterator for CsvRows {
    type Item = Result<Row, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                self.position += 1;
                let row = self
                    .record
                    .iter()
                    .enumerate()
                    .map(|(i, cell)| (self.column_name(i), infer_csv_value(cell)))
                    .collect();
                Some(Ok(row))
            }
            Ok(false) => None,
            Err(source) => Some(Err(SourceError::Csv {
                path: self.path.clone(),
                record: self.position + 1,
                source,
            })),
        }
    }
}

impl RowSource for CsvRows {
    fn describe(&self) -> String {
        format!("csv {}", self.path.display())
    }
}

/// Infer a typed value from a CSV cell: empty is null, then integer,
/// finite float, boolean, and string otherwise.
pub fn infer_csv_value(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Int64(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        if f.is_finite() {
            return Value::Float64(f);
        }
    }
    match cell {
        "true" | "TRUE" | "True" => Value::Bool(true),
        "false" | "FALSE" | "False" => Value::Bool(false),
        _ => Value::string(cell),
    }
}
