// src/commands/combine_parts.rs
//! Concatenates many parquet part files into one object.

use clap::Args;

use crate::storage::StorePath;
use crate::table::{parse_compression, PartCombiner, RowGroups};
use crate::utils::error::AppError;

#[derive(Args, Debug, Clone)]
pub struct CombinePartsArgs {
    /// Folder/prefix containing part-*.parquet (local, gs:// or s3://)
    #[arg(long)]
    pub input_prefix: String,

    /// Output parquet object
    #[arg(long)]
    pub output: String,

    /// Parquet compression
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Log progress every N files
    #[arg(long, default_value_t = 25)]
    pub progress_every: usize,
}

pub async fn run(args: CombinePartsArgs) -> Result<(), AppError> {
    let compression = parse_compression(&args.compression)?;
    let input = StorePath::parse(&args.input_prefix)?;
    let output = StorePath::parse(&args.output)?;

    let files = input.list_with_suffix(".parquet").await?;
    if files.is_empty() {
        return Err(AppError::Config(format!(
            "No parquet files found under {}",
            input.uri()
        )));
    }
    tracing::info!("Found {} parquet part files", files.len());

    let mut combiner: Option<PartCombiner> = None;
    let progress_every = args.progress_every.max(1);

    for (i, file) in files.iter().enumerate() {
        let groups = RowGroups::new(file.get_bytes().await?)?;
        for rg in 0..groups.len() {
            let batch = groups.read(rg)?;
            if combiner.is_none() {
                combiner = Some(PartCombiner::new(batch.schema(), compression)?);
            }
            if let Some(writer) = combiner.as_mut() {
                writer.append(&batch)?;
            }
        }

        if (i + 1) % progress_every == 0 || i + 1 == files.len() {
            let rows = combiner.as_ref().map(PartCombiner::rows).unwrap_or(0);
            tracing::info!(
                "appended {}/{} files | rows so far: {}",
                i + 1,
                files.len(),
                rows
            );
        }
    }

    let combiner = combiner.ok_or_else(|| {
        AppError::Processing("All input parts were empty".to_string())
    })?;
    let total_rows = combiner.rows();
    output.put_bytes(combiner.finish()?).await?;

    tracing::info!("[OK] Wrote combined parquet -> {}", output.uri());
    tracing::info!("[OK] Total rows: {}", total_rows);
    Ok(())
}
