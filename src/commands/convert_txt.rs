// src/commands/convert_txt.rs
//! Converts SEC Financial Statement Data Set quarter folders from
//! tab-delimited .txt to parquet, without transforming data. Every column
//! is carried as text so the conversion is lossless by construction.

use clap::Args;
use parquet::basic::Compression;

use crate::storage::StorePath;
use crate::table::{read_delimited, write_parquet_bytes};
use crate::utils::error::AppError;

use super::{pick_quarter_dirs, split_list};

pub const FILES_DEFAULT: &str = "sub,num,tag,pre";

#[derive(Args, Debug, Clone)]
pub struct ConvertTxtArgs {
    /// Input root containing quarter folders like 2020q1 (local, gs:// or s3://)
    #[arg(long)]
    pub input: String,

    /// Output root for quarter folders of parquet files
    #[arg(long)]
    pub output: String,

    /// Comma-separated dataset basenames to convert
    #[arg(long, default_value = FILES_DEFAULT)]
    pub files: String,

    /// Overwrite existing parquet files (default is to skip them)
    #[arg(long)]
    pub overwrite: bool,

    /// Comma-separated quarter folder names to include only
    #[arg(long, default_value = "")]
    pub only_quarters: String,

    /// Comma-separated quarter folder names to skip
    #[arg(long, default_value = "")]
    pub skip_quarters: String,

    /// Print what would happen without converting or writing
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: ConvertTxtArgs) -> Result<(), AppError> {
    let input = StorePath::parse(&args.input)?;
    let output = StorePath::parse(&args.output)?;
    let files = split_list(&args.files);
    let only = split_list(&args.only_quarters);
    let skip = split_list(&args.skip_quarters);

    let quarters = pick_quarter_dirs(&input, &only, &skip).await?;
    tracing::info!("Input root:  {}", input.uri());
    tracing::info!("Output root: {}", output.uri());
    tracing::info!("Found {} quarter folders to process.", quarters.len());

    let mut converted = 0usize;
    let mut skipped = 0usize;

    for qdir in &quarters {
        let quarter = qdir.name().to_string();
        tracing::info!("[QUARTER] {}", quarter);

        for table_name in &files {
            let txt_path = qdir.child(&format!("{table_name}.txt"));
            let parquet_path = output.child(&format!("{quarter}/{table_name}.parquet"));

            if !txt_path.exists().await? {
                tracing::warn!("MISSING: {} (skipping)", txt_path.uri());
                continue;
            }

            if !args.overwrite && parquet_path.exists().await? {
                tracing::info!("SKIP (exists): {}", parquet_path.uri());
                skipped += 1;
                continue;
            }

            if args.dry_run {
                let action = if args.overwrite {
                    "OVERWRITE"
                } else {
                    "WRITE_IF_MISSING"
                };
                tracing::info!(
                    "DRY RUN: {} {} -> {}",
                    action,
                    txt_path.uri(),
                    parquet_path.uri()
                );
                continue;
            }

            let table = read_delimited(&txt_path.get_bytes().await?, b'\t')?;
            let bytes = write_parquet_bytes(&table.to_batch()?, Compression::SNAPPY)?;
            parquet_path.put_bytes(bytes).await?;
            tracing::info!(
                "Converted: {} -> {} | rows={} cols={}",
                txt_path.uri(),
                parquet_path.uri(),
                table.num_rows(),
                table.columns().len()
            );
            converted += 1;
        }
    }

    tracing::info!("[DONE] converted={} skipped={}", converted, skipped);
    Ok(())
}
