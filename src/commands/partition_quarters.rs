// src/commands/partition_quarters.rs
//! Merges scraped parquet parts into per-(year, quarter) files, tracking
//! processed inputs in a manifest so re-runs are incremental.
//!
//! Safe against partial writes (temp-then-move) but NOT against two
//! concurrent instances; a local lock file guards the single-machine case.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Args;

use crate::edgar::idx::pad_cik;
use crate::manifest::{Manifest, ManifestEntry};
use crate::storage::lock::LockFile;
use crate::storage::StorePath;
use crate::table::{write_parquet_bytes, RowGroups, StringTable};
use crate::utils::error::AppError;
use parquet::basic::Compression;

const REQUIRED_COLUMNS: [&str; 6] = [
    "year",
    "quarter",
    "cik",
    "form_type",
    "date_filed",
    "filename",
];

#[derive(Args, Debug, Clone)]
pub struct PartitionQuartersArgs {
    /// Prefix containing incoming parquet parts (local, gs:// or s3://)
    #[arg(long)]
    pub input_prefix: String,

    /// Base output folder, e.g. gs://bucket/edgar_10k_html/quarter
    #[arg(long)]
    pub out_base: String,

    /// Manifest object (JSONL) tracking processed inputs
    #[arg(long)]
    pub manifest: String,

    /// How many input parquet files to process per batch
    #[arg(long, default_value_t = 250)]
    pub batch_files: usize,

    /// If >0, run forever: sleep this many seconds between passes
    #[arg(long, default_value_t = 0)]
    pub sleep_seconds: u64,

    /// Local lock path preventing concurrent runs on this machine
    #[arg(long, default_value = "/tmp/quarter_index.lock")]
    pub lock_path: String,
}

/// Accepts 1..4, "q1".."q4", "qtr1".."qtr4" or "quarter 1"; anything else
/// is unknown and the row is dropped.
pub fn normalize_quarter(value: &str) -> Option<&'static str> {
    let mut s = value.trim().to_ascii_lowercase();
    s.retain(|c| !c.is_whitespace());
    let s = s.strip_prefix("quarter").unwrap_or(&s);
    let s = s.strip_prefix("qtr").unwrap_or(s);
    let s = s.strip_prefix('q').unwrap_or(s);
    match s {
        "1" => Some("q1"),
        "2" => Some("q2"),
        "3" => Some("q3"),
        "4" => Some("q4"),
        _ => None,
    }
}

fn parse_year(value: &str) -> Option<i32> {
    let s = value.trim();
    if let Ok(y) = s.parse::<i32>() {
        return Some(y);
    }
    // tolerate float-shaped years from spreadsheet round-trips
    s.parse::<f64>().ok().map(|f| f as i32)
}

/// pk = cik|form_type|date_filed|filename, with the CIK zero-padded.
fn primary_key(cik: &str, form_type: &str, date_filed: &str, filename: &str) -> String {
    format!("{}|{form_type}|{date_filed}|{filename}", pad_cik(cik))
}

/// Reads a batch of input files and groups their rows by (year, quarter),
/// with `primary_key` and `indexed_at` columns added. Files missing a
/// required column are skipped with a warning.
async fn process_batch(
    batch: &[StorePath],
) -> Result<BTreeMap<(i32, &'static str), StringTable>, AppError> {
    let mut grouped: BTreeMap<(i32, &'static str), StringTable> = BTreeMap::new();

    for src in batch {
        let groups = RowGroups::new(src.get_bytes().await?)?;
        let table = StringTable::from_batch(&groups.read_all()?)?;

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| table.index_of(c).is_none())
            .collect();
        if !missing.is_empty() {
            tracing::warn!("Skipping {} missing columns: {:?}", src.uri(), missing);
            continue;
        }

        let idx: Vec<usize> = REQUIRED_COLUMNS
            .iter()
            .filter_map(|c| table.index_of(c))
            .collect();
        let &[year_col, quarter_col, cik_col, form_col, date_col, file_col] =
            idx.as_slice()
        else {
            continue;
        };

        let indexed_at = chrono::Utc::now().to_rfc3339();
        let mut out_columns = table.columns().to_vec();
        out_columns.push("primary_key".to_string());
        out_columns.push("indexed_at".to_string());

        for r in 0..table.num_rows() {
            let Some(quarter) =
                table.value(r, quarter_col).and_then(normalize_quarter)
            else {
                continue;
            };
            let Some(year) = table.value(r, year_col).and_then(parse_year) else {
                continue;
            };

            let pk = primary_key(
                table.value(r, cik_col).unwrap_or(""),
                table.value(r, form_col).unwrap_or(""),
                table.value(r, date_col).unwrap_or(""),
                table.value(r, file_col).unwrap_or(""),
            );

            let mut row = table.row(r).to_vec();
            row.push(Some(pk));
            row.push(Some(indexed_at.clone()));

            grouped
                .entry((year, quarter))
                .or_insert_with(|| StringTable::new(out_columns.clone()))
                .push_row(row);
        }
    }

    Ok(grouped)
}

/// `<out-base>/year=YYYY/q1.parquet`
fn quarter_output(out_base: &StorePath, year: i32, quarter: &str) -> StorePath {
    out_base.child(&format!("year={year}/{quarter}.parquet"))
}

/// For each (year, quarter): read any existing quarter file, append the
/// new rows and overwrite through a temp object.
async fn merge_into_quarter_files(
    out_base: &StorePath,
    grouped: BTreeMap<(i32, &'static str), StringTable>,
) -> Result<(), AppError> {
    for ((year, quarter), new_rows) in grouped {
        let target = quarter_output(out_base, year, quarter);
        let new_count = new_rows.num_rows();

        let merged = if target.exists().await? {
            let existing = RowGroups::new(target.get_bytes().await?)?;
            let mut merged = StringTable::from_batch(&existing.read_all()?)?;
            merged.concat_union(new_rows);
            merged
        } else {
            new_rows
        };

        let bytes = write_parquet_bytes(&merged.to_batch()?, Compression::ZSTD(Default::default()))?;
        target.replace_bytes(bytes).await?;
        tracing::info!(
            "[OK] Wrote {} new rows into {} (total now {})",
            new_count,
            target.uri(),
            merged.num_rows()
        );
    }
    Ok(())
}

pub async fn run(args: PartitionQuartersArgs) -> Result<(), AppError> {
    let _lock = LockFile::acquire(&args.lock_path)?;

    let input = StorePath::parse(&args.input_prefix)?;
    let out_base = StorePath::parse(&args.out_base)?;
    let manifest = Manifest::new(StorePath::parse(&args.manifest)?);
    let batch_size = args.batch_files.max(1);

    loop {
        let processed = manifest.processed().await;
        let all_files = input.list_with_suffix(".parquet").await?;
        let new_files: Vec<StorePath> = all_files
            .iter()
            .filter(|f| !processed.contains(&f.uri()))
            .cloned()
            .collect();

        tracing::info!(
            "Total files: {} | New files: {}",
            all_files.len(),
            new_files.len()
        );

        if new_files.is_empty() {
            if args.sleep_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(args.sleep_seconds)).await;
                continue;
            }
            break;
        }

        for (batch_no, batch) in new_files.chunks(batch_size).enumerate() {
            tracing::info!(
                "Processing batch {} with {} files...",
                batch_no + 1,
                batch.len()
            );

            let grouped = process_batch(batch).await?;
            merge_into_quarter_files(&out_base, grouped).await?;

            // record the batch as processed; manifest loss is logged, not fatal
            let entries: Vec<ManifestEntry> =
                batch.iter().map(|f| ManifestEntry::now(f.uri())).collect();
            if let Err(e) = manifest.append(&entries).await {
                tracing::warn!("Failed to append manifest: {}", e);
            }
        }

        if args.sleep_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(args.sleep_seconds)).await;
        } else {
            break;
        }
    }

    tracing::info!("[DONE] Quarter indexing complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_labels_normalize() {
        assert_eq!(normalize_quarter("1"), Some("q1"));
        assert_eq!(normalize_quarter("Q2"), Some("q2"));
        assert_eq!(normalize_quarter("QTR3"), Some("q3"));
        assert_eq!(normalize_quarter("Quarter 4"), Some("q4"));
        assert_eq!(normalize_quarter("5"), None);
        assert_eq!(normalize_quarter(""), None);
    }

    #[test]
    fn primary_key_pads_cik() {
        assert_eq!(
            primary_key("320193", "10-K", "2020-10-30", "edgar/data/a.txt"),
            "0000320193|10-K|2020-10-30|edgar/data/a.txt"
        );
    }

    #[test]
    fn year_parsing_tolerates_floats() {
        assert_eq!(parse_year("2020"), Some(2020));
        assert_eq!(parse_year("2020.0"), Some(2020));
        assert_eq!(parse_year("n/a"), None);
    }
}
