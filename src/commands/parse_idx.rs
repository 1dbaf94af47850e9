// src/commands/parse_idx.rs
//! Parses downloaded company.idx files into one structured table.

use clap::{Args, ValueEnum};
use parquet::basic::Compression;

use crate::edgar::idx::{parse_idx_text, year_quarter_from_name, IDX_COLUMNS};
use crate::storage::StorePath;
use crate::table::{write_csv_bytes, write_parquet_bytes, StringTable};
use crate::utils::error::AppError;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Parquet,
    Csv,
}

#[derive(Args, Debug, Clone)]
pub struct ParseIdxArgs {
    /// Folder/prefix containing *.idx files (local, gs:// or s3://)
    #[arg(long)]
    pub input: String,

    /// Output object path (local, gs:// or s3://)
    #[arg(long)]
    pub output: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Parquet)]
    pub format: OutputFormat,

    /// If the output already exists, exit without doing work
    #[arg(long)]
    pub skip_if_exists: bool,
}

fn idx_output_columns() -> Vec<String> {
    IDX_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(
            ["Year", "Quarter", "SourceFile"]
                .iter()
                .map(|c| c.to_string()),
        )
        .collect()
}

pub async fn run(args: ParseIdxArgs) -> Result<(), AppError> {
    let input = StorePath::parse(&args.input)?;
    let output = StorePath::parse(&args.output)?;

    if args.skip_if_exists && output.exists().await? {
        tracing::info!("[SKIP] Output already exists: {}", output.uri());
        return Ok(());
    }

    let sources = input.list_with_suffix(".idx").await?;
    tracing::info!("Reading {} idx files from {}", sources.len(), input.uri());

    let mut table = StringTable::new(idx_output_columns());
    let mut parsed_files = 0usize;

    for (n, src) in sources.iter().enumerate() {
        let bytes = match src.get_bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", src.uri(), e);
                continue;
            }
        };

        // idx files are latin-1-ish text; decode tolerantly
        let text = String::from_utf8_lossy(&bytes);
        let source_name = src.name().to_string();
        let (year, quarter) = year_quarter_from_name(&source_name);

        for record in parse_idx_text(&text) {
            table.push_row(vec![
                Some(record.company_name),
                Some(record.form_type),
                Some(record.cik),
                Some(record.date_filed),
                Some(record.filename),
                year.map(|y| y.to_string()),
                quarter.clone(),
                Some(source_name.clone()),
            ]);
        }
        parsed_files += 1;
        if (n + 1) % 25 == 0 {
            tracing::info!("Parsed {} idx files...", n + 1);
        }
    }

    if table.is_empty() {
        tracing::warn!("No rows parsed. Check input path/prefix.");
        return Ok(());
    }

    tracing::info!("Parsed rows: {} from {} files", table.num_rows(), parsed_files);

    let payload = match args.format {
        OutputFormat::Parquet => {
            write_parquet_bytes(&table.to_batch()?, Compression::SNAPPY)?
        }
        OutputFormat::Csv => write_csv_bytes(&table)?,
    };
    output.put_bytes(payload).await?;
    tracing::info!("[OK] Wrote {:?} to {}", args.format, output.uri());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const SAMPLE_IDX: &str = "\
Company Name                                                  Form Type   CIK         Date Filed  File Name
---------------------------------------------------------------------------------------------------------------
APPLE INC                                                     10-K        320193      2020-10-30  edgar/data/320193/0000320193-20-000096.txt
";

    #[tokio::test]
    async fn parses_prefix_into_table() {
        let dir = tempfile::tempdir().unwrap();
        let base = StorePath::parse(dir.path().to_str().unwrap()).unwrap();
        base.child("2020_QTR4_company.idx")
            .put_bytes(Bytes::from_static(SAMPLE_IDX.as_bytes()))
            .await
            .unwrap();

        let out = dir.path().join("company_index.parquet");
        run(ParseIdxArgs {
            input: dir.path().to_str().unwrap().to_string(),
            output: out.to_str().unwrap().to_string(),
            format: OutputFormat::Parquet,
            skip_if_exists: false,
        })
        .await
        .unwrap();

        let bytes = StorePath::parse(out.to_str().unwrap())
            .unwrap()
            .get_bytes()
            .await
            .unwrap();
        let groups = crate::table::RowGroups::new(bytes).unwrap();
        let table = StringTable::from_batch(&groups.read_all().unwrap()).unwrap();
        assert_eq!(table.num_rows(), 1);
        let year_col = table.index_of("Year").unwrap();
        let qtr_col = table.index_of("Quarter").unwrap();
        assert_eq!(table.value(0, year_col), Some("2020"));
        assert_eq!(table.value(0, qtr_col), Some("QTR4"));
    }
}
