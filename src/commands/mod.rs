// src/commands/mod.rs
pub mod build_urls;
pub mod combine_parts;
pub mod convert_txt;
pub mod download_idx;
pub mod fetch_html;
pub mod fetch_index_links;
pub mod filter_forms;
pub mod parse_idx;
pub mod partition_quarters;
pub mod verify_txt;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::storage::StorePath;
use crate::utils::AppError;

/// Batch ETL tooling for SEC EDGAR filing metadata and documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download quarterly company.idx files from the EDGAR full index
    DownloadIdx(download_idx::DownloadIdxArgs),
    /// Parse company.idx files into one structured table
    ParseIdx(parse_idx::ParseIdxArgs),
    /// Filter a filing-metadata table by form type, writing parquet parts
    FilterForms(filter_forms::FilterFormsArgs),
    /// Derive SEC index-page URLs from index Filename paths
    BuildUrls(build_urls::BuildUrlsArgs),
    /// Fetch index pages and extract the primary filing link per row
    FetchIndexLinks(fetch_index_links::FetchIndexLinksArgs),
    /// Scrape filing documents with checkpointed resume (the slow one)
    FetchHtml(fetch_html::FetchHtmlArgs),
    /// Concatenate parquet parts into a single file
    CombineParts(combine_parts::CombinePartsArgs),
    /// Merge scraped parts into per-(year, quarter) files via a manifest
    PartitionQuarters(partition_quarters::PartitionQuartersArgs),
    /// Convert financial-statement .txt dumps to parquet, losslessly
    ConvertTxt(convert_txt::ConvertTxtArgs),
    /// Verify .txt dumps against their parquet conversions
    VerifyTxt(verify_txt::VerifyTxtArgs),
}

pub async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    match cli.command {
        Command::DownloadIdx(args) => download_idx::run(args).await?,
        Command::ParseIdx(args) => parse_idx::run(args).await?,
        Command::FilterForms(args) => filter_forms::run(args).await?,
        Command::BuildUrls(args) => build_urls::run(args).await?,
        Command::FetchIndexLinks(args) => fetch_index_links::run(args).await?,
        Command::FetchHtml(args) => fetch_html::run(args).await?,
        Command::CombineParts(args) => combine_parts::run(args).await?,
        Command::PartitionQuarters(args) => partition_quarters::run(args).await?,
        Command::ConvertTxt(args) => convert_txt::run(args).await?,
        Command::VerifyTxt(args) => {
            let failures = verify_txt::run(args).await?;
            if failures > 0 {
                return Ok(ExitCode::from(2));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// A `--input` that names a `.parquet` object is used as-is; anything else
/// is treated as a prefix and listed.
pub(crate) async fn parquet_sources(input: &StorePath) -> Result<Vec<StorePath>, AppError> {
    if input.uri().to_ascii_lowercase().ends_with(".parquet") {
        Ok(vec![input.clone()])
    } else {
        Ok(input.list_with_suffix(".parquet").await?)
    }
}

static QUARTER_NAME_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"(?i)^\d{4}q[1-4]$").expect("Failed to compile QUARTER_NAME_RE")
    });

/// Matches statement-dump quarter folder names like `2020q1`.
pub fn is_quarter_name(name: &str) -> bool {
    QUARTER_NAME_RE.is_match(name)
}

/// Splits a comma-separated CLI list, dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Quarter folders under `root`, honoring include/exclude filters. If no
/// child looks like a quarter, the root itself is tried, then all
/// children (some users store as year/quarter).
pub async fn pick_quarter_dirs(
    root: &StorePath,
    only: &[String],
    skip: &[String],
) -> Result<Vec<StorePath>, AppError> {
    let candidates = root.list_dirs().await?;
    let mut quarters: Vec<StorePath> = candidates
        .iter()
        .filter(|p| is_quarter_name(p.name()))
        .cloned()
        .collect();

    if quarters.is_empty() {
        if is_quarter_name(root.name()) {
            quarters = vec![root.clone()];
        } else {
            quarters = candidates;
        }
    }

    if !only.is_empty() {
        let allowed: Vec<String> = only.iter().map(|q| q.to_ascii_lowercase()).collect();
        quarters.retain(|p| allowed.contains(&p.name().to_ascii_lowercase()));
    }
    if !skip.is_empty() {
        let blocked: Vec<String> = skip.iter().map(|q| q.to_ascii_lowercase()).collect();
        quarters.retain(|p| !blocked.contains(&p.name().to_ascii_lowercase()));
    }

    Ok(quarters)
}
