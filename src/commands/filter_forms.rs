// src/commands/filter_forms.rs
//! Streams a filing-metadata table and keeps only the requested form
//! types, writing the survivors as parquet parts.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use clap::{Args, ValueEnum};

use crate::storage::StorePath;
use crate::table::{
    part_file_name, parse_compression, read_delimited, write_parquet_bytes, RowGroups,
    StringTable,
};
use crate::utils::error::{AppError, TableError};

const FORM_TYPE_COLUMN: &str = "Form Type";
const DATE_FILED_COLUMN: &str = "Date Filed";

// Built-in presets (extend anytime)
const FORM_PRESETS: [(&str, &[&str]); 3] = [
    ("10k", &["10-K", "10-K/A"]),
    ("8k", &["8-K", "8-K/A"]),
    ("10q", &["10-Q", "10-Q/A"]),
];

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Parquet,
    Csv,
}

#[derive(Args, Debug, Clone)]
pub struct FilterFormsArgs {
    /// Input .parquet or .csv file (local, gs:// or s3://)
    #[arg(long)]
    pub input: String,

    #[arg(long, value_enum, default_value_t = InputFormat::Parquet)]
    pub input_format: InputFormat,

    /// Output folder/prefix; parts land under a per-preset subfolder
    #[arg(long)]
    pub out_base: String,

    /// Preset (10k, 8k, 10q) OR custom comma list like "10-K,10-K/A"
    #[arg(long)]
    pub forms: String,

    /// Parquet compression for output parts
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Rows per chunk for CSV input
    #[arg(long, default_value_t = 250_000)]
    pub csv_chunksize: usize,

    /// Test mode: stop after N batches/rowgroups (0 = all)
    #[arg(long, default_value_t = 0)]
    pub max_batches: usize,
}

/// Accepts a preset name or a custom comma-separated list; returns the
/// normalized set of allowed form types.
pub fn parse_forms_arg(forms: &str) -> Result<HashSet<String>, AppError> {
    let raw = forms.trim();
    if raw.is_empty() {
        return Err(AppError::Config(
            "--forms is required (e.g., --forms 10k OR --forms '10-K,10-K/A').".to_string(),
        ));
    }

    let lower = raw.to_ascii_lowercase();
    if let Some((_, preset)) = FORM_PRESETS.iter().find(|(k, _)| *k == lower) {
        return Ok(preset.iter().map(|f| f.to_string()).collect());
    }

    let set: HashSet<String> = raw
        .split(',')
        .map(|p| p.trim().to_ascii_uppercase())
        .filter(|p| !p.is_empty())
        .collect();
    if set.is_empty() {
        return Err(AppError::Config(
            "Invalid --forms. Use a preset (10k, 8k, 10q) or a comma-separated list like '10-K,10-K/A'.".to_string(),
        ));
    }
    Ok(set)
}

/// Output subfolder name, e.g. `company_index_10k_parts`; custom lists go
/// under `company_index_custom_parts`.
pub fn forms_output_subdir(forms: &str) -> String {
    let raw = forms.trim().to_ascii_lowercase();
    if FORM_PRESETS.iter().any(|(k, _)| *k == raw) {
        format!("company_index_{raw}_parts")
    } else {
        "company_index_custom_parts".to_string()
    }
}

fn parse_date_filed(value: &str) -> Option<NaiveDate> {
    let s = value.trim();
    for fmt in ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    None
}

/// Keeps rows whose form type is allowed, drops rows with unparseable
/// filing dates, normalizes the stored date and appends a Year column.
pub fn clean_and_filter_forms(
    table: &StringTable,
    allowed: &HashSet<String>,
    source: &str,
) -> Result<StringTable, TableError> {
    let form_col = table.index_of(FORM_TYPE_COLUMN).ok_or_else(|| {
        TableError::MissingColumn(FORM_TYPE_COLUMN.to_string(), source.to_string())
    })?;
    let date_col = table.index_of(DATE_FILED_COLUMN).ok_or_else(|| {
        TableError::MissingColumn(DATE_FILED_COLUMN.to_string(), source.to_string())
    })?;

    let mut columns = table.columns().to_vec();
    columns.push("Year".to_string());
    let mut out = StringTable::new(columns);

    for r in 0..table.num_rows() {
        let form = match table.value(r, form_col) {
            Some(form) => form.trim().to_ascii_uppercase(),
            None => continue,
        };
        if !allowed.contains(&form) {
            continue;
        }

        let date = match table.value(r, date_col).and_then(parse_date_filed) {
            Some(date) => date,
            None => continue,
        };

        let mut row = table.row(r).to_vec();
        row[form_col] = Some(form);
        row[date_col] = Some(date.format("%Y-%m-%d").to_string());
        row.push(Some(date.year().to_string()));
        out.push_row(row);
    }
    Ok(out)
}

pub async fn run(args: FilterFormsArgs) -> Result<(), AppError> {
    let allowed = parse_forms_arg(&args.forms)?;
    let subdir = forms_output_subdir(&args.forms);
    let compression = parse_compression(&args.compression)?;

    let input = StorePath::parse(&args.input)?;
    let out_dir = StorePath::parse(&args.out_base)?.child(&subdir);

    let mut allowed_sorted: Vec<&String> = allowed.iter().collect();
    allowed_sorted.sort();
    tracing::info!("Filtering Form Type in: {:?}", allowed_sorted);
    tracing::info!("Writing output under: {}/", out_dir.uri());

    let mut part = 0usize;
    let mut total_in = 0usize;
    let mut total_out = 0usize;

    let next_part = |out_df: StringTable, part: &mut usize| {
        if out_df.is_empty() {
            return None;
        }
        let target = out_dir.child(&part_file_name(None, *part));
        *part += 1;
        Some((target, out_df))
    };

    match args.input_format {
        InputFormat::Csv => {
            let table = read_delimited(&input.get_bytes().await?, b',')
                .map_err(AppError::Table)?;
            let chunk_size = args.csv_chunksize.max(1);
            let mut batch_no = 0usize;

            let mut start = 0usize;
            while start < table.num_rows() {
                if args.max_batches != 0 && batch_no >= args.max_batches {
                    break;
                }
                let end = (start + chunk_size).min(table.num_rows());

                let mut chunk = StringTable::new(table.columns().to_vec());
                for r in start..end {
                    chunk.push_row(table.row(r).to_vec());
                }
                total_in += chunk.num_rows();

                let out_df = clean_and_filter_forms(&chunk, &allowed, &input.uri())?;
                total_out += out_df.num_rows();
                tracing::info!(
                    "[BATCH {:04}] in={} out(filtered)={}",
                    batch_no + 1,
                    chunk.num_rows(),
                    out_df.num_rows()
                );

                if let Some((target, out_df)) = next_part(out_df, &mut part) {
                    let bytes = write_parquet_bytes(&out_df.to_batch()?, compression)?;
                    target.put_bytes(bytes).await?;
                    tracing::info!("[OK] wrote {} -> {}", out_df.num_rows(), target.uri());
                }

                batch_no += 1;
                start = end;
            }
        }
        InputFormat::Parquet => {
            let groups = RowGroups::new(input.get_bytes().await?)?;
            for rg in 0..groups.len() {
                if args.max_batches != 0 && rg >= args.max_batches {
                    break;
                }
                let chunk = StringTable::from_batch(&groups.read(rg)?)?;
                total_in += chunk.num_rows();

                let out_df = clean_and_filter_forms(&chunk, &allowed, &input.uri())?;
                total_out += out_df.num_rows();
                tracing::info!(
                    "[ROWGROUP {:04}/{}] in={} out(filtered)={}",
                    rg + 1,
                    groups.len(),
                    chunk.num_rows(),
                    out_df.num_rows()
                );

                if let Some((target, out_df)) = next_part(out_df, &mut part) {
                    let bytes = write_parquet_bytes(&out_df.to_batch()?, compression)?;
                    target.put_bytes(bytes).await?;
                    tracing::info!("[OK] wrote {} -> {}", out_df.num_rows(), target.uri());
                }
            }
        }
    }

    tracing::info!("[DONE] total input rows:  {}", total_in);
    tracing::info!("[DONE] total output rows: {}", total_out);
    tracing::info!("[DONE] parts written:     {}", part);
    Ok(())
}
