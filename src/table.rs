// src/table.rs
//! Columnar plumbing shared by every pipeline stage: row-group streaming
//! over in-memory Parquet, an all-strings view of record batches, and
//! part-file serialization.
//!
//! The transform stages deliberately carry every column as a nullable
//! string. The pipeline's inputs are text-shaped (idx rows, dates, CIKs,
//! filenames) and the conversion jobs promise losslessness, so text is
//! the one representation that survives every hop unchanged.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::utils::error::TableError;

/// Maps a `--compression` flag value onto a Parquet codec.
pub fn parse_compression(name: &str) -> Result<Compression, TableError> {
    match name.to_ascii_lowercase().as_str() {
        "snappy" => Ok(Compression::SNAPPY),
        "zstd" => Ok(Compression::ZSTD(ZstdLevel::default())),
        "none" | "uncompressed" => Ok(Compression::UNCOMPRESSED),
        other => Err(TableError::Schema(format!(
            "unsupported compression '{other}' (use snappy, zstd or none)"
        ))),
    }
}

/// Output part naming: `part-000000.parquet`, `success-part-000003.parquet`.
pub fn part_file_name(kind: Option<&str>, part: usize) -> String {
    match kind {
        Some(kind) => format!("{kind}-part-{part:06}.parquet"),
        None => format!("part-{part:06}.parquet"),
    }
}

/// Row-group-at-a-time access to one Parquet object held in memory,
/// so huge files never need to be decoded wholesale.
pub struct RowGroups {
    bytes: Bytes,
    num_row_groups: usize,
}

impl RowGroups {
    pub fn new(bytes: Bytes) -> Result<Self, TableError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())?;
        let num_row_groups = builder.metadata().num_row_groups();
        Ok(Self {
            bytes,
            num_row_groups,
        })
    }

    pub fn len(&self) -> usize {
        self.num_row_groups
    }

    pub fn is_empty(&self) -> bool {
        self.num_row_groups == 0
    }

    /// Decodes a single row group into one record batch.
    pub fn read(&self, row_group: usize) -> Result<RecordBatch, TableError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(self.bytes.clone())?;
        let schema = builder.schema().clone();
        let reader = builder.with_row_groups(vec![row_group]).build()?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }

    /// Decodes the whole file into one record batch.
    pub fn read_all(&self) -> Result<RecordBatch, TableError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(self.bytes.clone())?;
        let schema = builder.schema().clone();
        let reader = builder.build()?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }
}

/// A row-major, all-strings table. The working representation between
/// reading a batch and writing a part.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl StringTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Casts every column of a record batch to text.
    pub fn from_batch(batch: &RecordBatch) -> Result<Self, TableError> {
        let schema = batch.schema();
        let columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();

        let mut string_cols: Vec<StringArray> = Vec::with_capacity(batch.num_columns());
        for (i, col) in batch.columns().iter().enumerate() {
            let casted = cast(col, &DataType::Utf8)?;
            let arr = casted
                .as_any()
                .downcast_ref::<StringArray>()
                .cloned()
                .ok_or_else(|| TableError::Cast(columns[i].clone()))?;
            string_cols.push(arr);
        }

        let mut rows = Vec::with_capacity(batch.num_rows());
        for r in 0..batch.num_rows() {
            let mut row = Vec::with_capacity(string_cols.len());
            for col in &string_cols {
                if col.is_null(r) {
                    row.push(None);
                } else {
                    row.push(Some(col.value(r).to_string()));
                }
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.rows[row][col].as_deref()
    }

    pub fn row(&self, row: usize) -> &[Option<String>] {
        &self.rows[row]
    }

    pub fn push_row(&mut self, row: Vec<Option<String>>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Appends another table, aligning columns by name. Columns missing on
    /// either side are filled with nulls (union semantics, like frame
    /// concatenation in the upstream tooling this replaces).
    pub fn concat_union(&mut self, other: StringTable) {
        let mut mapping = Vec::with_capacity(other.columns.len());
        for name in &other.columns {
            let idx = match self.index_of(name) {
                Some(idx) => idx,
                None => {
                    self.columns.push(name.clone());
                    for row in &mut self.rows {
                        row.push(None);
                    }
                    self.columns.len() - 1
                }
            };
            mapping.push(idx);
        }
        let width = self.columns.len();
        for src in other.rows {
            let mut row = vec![None; width];
            for (from, value) in src.into_iter().enumerate() {
                row[mapping[from]] = value;
            }
            self.rows.push(row);
        }
    }

    /// All-nullable-Utf8 Arrow schema for this table.
    pub fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns
                .iter()
                .map(|name| Field::new(name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ))
    }

    pub fn to_batch(&self) -> Result<RecordBatch, TableError> {
        let schema = self.schema();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());
        for c in 0..self.columns.len() {
            let values: StringArray = self
                .rows
                .iter()
                .map(|row| row[c].as_deref())
                .collect();
            arrays.push(Arc::new(values));
        }
        Ok(RecordBatch::try_new(schema, arrays)?)
    }
}

/// Serializes one record batch as a complete Parquet file.
pub fn write_parquet_bytes(
    batch: &RecordBatch,
    compression: Compression,
) -> Result<Bytes, TableError> {
    let props = WriterProperties::builder()
        .set_compression(compression)
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(Bytes::from(buf))
}

/// Incremental Parquet writer used when many inputs are appended into one
/// output object. Schema is fixed by the first batch.
pub struct PartCombiner {
    writer: ArrowWriter<Vec<u8>>,
    schema: SchemaRef,
    rows: usize,
}

impl PartCombiner {
    pub fn new(schema: SchemaRef, compression: Compression) -> Result<Self, TableError> {
        let props = WriterProperties::builder()
            .set_compression(compression)
            .build();
        let writer = ArrowWriter::try_new(Vec::new(), schema.clone(), Some(props))?;
        Ok(Self {
            writer,
            schema,
            rows: 0,
        })
    }

    pub fn append(&mut self, batch: &RecordBatch) -> Result<(), TableError> {
        if batch.schema() != self.schema {
            return Err(TableError::Schema(format!(
                "part schema differs from the first part ({} vs {} fields)",
                batch.schema().fields().len(),
                self.schema.fields().len()
            )));
        }
        self.writer.write(batch)?;
        self.rows += batch.num_rows();
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> Result<Bytes, TableError> {
        let buf = self.writer.into_inner()?;
        Ok(Bytes::from(buf))
    }
}

/// Reads a tab- or comma-delimited text table with every field as a
/// nullable string; the first record is the header.
pub fn read_delimited(data: &[u8], delimiter: u8) -> Result<StringTable, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(data);
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut table = StringTable::new(columns);
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|v| Some(v.to_string()))
            .collect::<Vec<_>>();
        table.push_row(row);
    }
    Ok(table)
}

/// Serializes a string table as CSV; nulls become empty fields.
pub fn write_csv_bytes(table: &StringTable) -> Result<Bytes, TableError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for r in 0..table.num_rows() {
        writer.write_record(table.row(r).iter().map(|v| v.as_deref().unwrap_or("")))?;
    }
    let buf = writer
        .into_inner()
        .map_err(|e| TableError::Schema(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Lowercases a column name and replaces spaces, matching the naming of
/// scrape output parts ("Form Type" -> "form_type").
pub fn snake_case_column(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}
