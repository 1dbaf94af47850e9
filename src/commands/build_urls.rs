// src/commands/build_urls.rs
//! Derives SEC index-page URLs from master-index Filename paths.

use clap::Args;

use crate::edgar::urls::build_sec_index_url;
use crate::storage::StorePath;
use crate::table::{
    part_file_name, parse_compression, write_parquet_bytes, RowGroups, StringTable,
};
use crate::utils::error::{AppError, TableError};

use super::parquet_sources;

#[derive(Args, Debug, Clone)]
pub struct BuildUrlsArgs {
    /// Input parquet file OR folder/prefix of parts (local, gs:// or s3://)
    #[arg(long)]
    pub input: String,

    /// Column containing the master.idx filename path
    #[arg(long, default_value = "Filename")]
    pub filename_col: String,

    /// Output folder/prefix for urlbuilt-part-*.parquet
    #[arg(long)]
    pub out_prefix: String,

    /// Parquet compression
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Test mode: process only first N parquet files (0 = all)
    #[arg(long, default_value_t = 0)]
    pub max_files: usize,

    /// Test mode: process only first N rowgroups per file (0 = all)
    #[arg(long, default_value_t = 0)]
    pub max_rowgroups: usize,
}

/// Adds `sec_index_url` and `urlbuilt_at` columns; rows whose Filename
/// does not carry an accession number are dropped.
fn add_index_urls(
    table: &StringTable,
    filename_col: &str,
    source: &str,
) -> Result<StringTable, TableError> {
    let col = table.index_of(filename_col).ok_or_else(|| {
        TableError::MissingColumn(filename_col.to_string(), source.to_string())
    })?;

    let stamp = chrono::Utc::now().to_rfc3339();
    let mut columns = table.columns().to_vec();
    columns.push("sec_index_url".to_string());
    columns.push("urlbuilt_at".to_string());
    let mut out = StringTable::new(columns);

    for r in 0..table.num_rows() {
        let url = table.value(r, col).and_then(build_sec_index_url);
        let Some(url) = url else {
            continue;
        };
        let mut row = table.row(r).to_vec();
        row.push(Some(url));
        row.push(Some(stamp.clone()));
        out.push_row(row);
    }
    Ok(out)
}

pub async fn run(args: BuildUrlsArgs) -> Result<(), AppError> {
    let compression = parse_compression(&args.compression)?;
    let input = StorePath::parse(&args.input)?;
    let out_prefix = StorePath::parse(&args.out_prefix)?;

    let mut sources = parquet_sources(&input).await?;
    if args.max_files != 0 {
        sources.truncate(args.max_files);
    }
    tracing::info!("URL build input sources: {}", sources.len());

    let mut part = 0usize;
    let mut total_in = 0usize;
    let mut total_out = 0usize;

    for src in &sources {
        let groups = RowGroups::new(src.get_bytes().await?)?;
        for rg in 0..groups.len() {
            if args.max_rowgroups != 0 && rg >= args.max_rowgroups {
                break;
            }
            let table = StringTable::from_batch(&groups.read(rg)?)?;
            let in_rows = table.num_rows();
            total_in += in_rows;

            let out_df = add_index_urls(&table, &args.filename_col, &src.uri())?;
            let out_rows = out_df.num_rows();
            total_out += out_rows;

            if out_rows > 0 {
                let target =
                    out_prefix.child(&part_file_name(Some("urlbuilt"), part));
                let bytes = write_parquet_bytes(&out_df.to_batch()?, compression)?;
                target.put_bytes(bytes).await?;
                tracing::info!("[OK] wrote {} -> {}", out_rows, target.uri());
                part += 1;
            }

            tracing::info!(
                "{} rowgroup {}/{} | in={} out={}",
                src.uri(),
                rg + 1,
                groups.len(),
                in_rows,
                out_rows
            );
        }
    }

    tracing::info!("[DONE] total input rows:  {}", total_in);
    tracing::info!("[DONE] total output rows: {}", total_out);
    tracing::info!("[DONE] parts written:     {}", part);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_added_and_invalid_rows_dropped() {
        let mut table = StringTable::new(vec!["Filename".into()]);
        table.push_row(vec![Some(
            "edgar/data/320187/0000320187-25-000060.txt".into(),
        )]);
        table.push_row(vec![Some("garbage/path".into())]);
        table.push_row(vec![None]);

        let out = add_index_urls(&table, "Filename", "test").unwrap();
        assert_eq!(out.num_rows(), 1);
        let url_col = out.index_of("sec_index_url").unwrap();
        assert_eq!(
            out.value(0, url_col),
            Some(
                "https://www.sec.gov/Archives/edgar/data/320187/000032018725000060/0000320187-25-000060-index.html"
            )
        );
        assert!(out.index_of("urlbuilt_at").is_some());
    }

    #[test]
    fn missing_filename_column_errors() {
        let table = StringTable::new(vec!["Other".into()]);
        assert!(add_index_urls(&table, "Filename", "test").is_err());
    }
}
