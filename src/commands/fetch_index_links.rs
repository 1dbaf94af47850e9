// src/commands/fetch_index_links.rs
//! Fetches SEC index pages and extracts the primary filing link per row,
//! writing successes and failures to separate part files.

use std::time::Duration;

use clap::Args;

use crate::edgar::client::EdgarFetcher;
use crate::edgar::html::filing_link_from_index;
use crate::storage::StorePath;
use crate::table::{
    part_file_name, parse_compression, write_parquet_bytes, RowGroups, StringTable,
};
use crate::utils::error::{AppError, TableError};

use super::parquet_sources;

const INDEX_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Args, Debug, Clone)]
pub struct FetchIndexLinksArgs {
    /// Input urlbuilt parquet file OR folder/prefix of parts
    #[arg(long)]
    pub input: String,

    /// Column containing the SEC index HTML URL
    #[arg(long, default_value = "sec_index_url")]
    pub url_col: String,

    /// Output folder/prefix for success/errors parts
    #[arg(long)]
    pub out_prefix: String,

    /// SEC compliant user agent, e.g. "Name email@domain.com"
    #[arg(long)]
    pub user_agent: String,

    /// Form type prefix preferred in the document table's type column
    #[arg(long, default_value = "8-K")]
    pub form_type: String,

    /// SEC-friendly delay per request, in seconds
    #[arg(long, default_value_t = 2.0)]
    pub sleep_seconds: f64,

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

fn result_columns(success: bool) -> Vec<String> {
    let middle = if success { "filing_link" } else { "error" };
    vec![
        "index_url".to_string(),
        middle.to_string(),
        "status_code".to_string(),
        "fetched_at".to_string(),
        "index_html".to_string(),
    ]
}

pub async fn run(args: FetchIndexLinksArgs) -> Result<(), AppError> {
    let compression = parse_compression(&args.compression)?;
    let input = StorePath::parse(&args.input)?;
    let out_prefix = StorePath::parse(&args.out_prefix)?;
    let client = EdgarFetcher::new(&args.user_agent)?;
    let sleep = Duration::from_secs_f64(args.sleep_seconds);

    let mut sources = parquet_sources(&input).await?;
    if args.max_files != 0 {
        sources.truncate(args.max_files);
    }
    tracing::info!("HTML fetch input sources: {}", sources.len());

    let mut success_part = 0usize;
    let mut error_part = 0usize;
    let mut total_in = 0usize;
    let mut total_success = 0usize;
    let mut total_errors = 0usize;

    for src in &sources {
        let groups = RowGroups::new(src.get_bytes().await?)?;
        for rg in 0..groups.len() {
            if args.max_rowgroups != 0 && rg >= args.max_rowgroups {
                break;
            }
            let table = StringTable::from_batch(&groups.read(rg)?)?;
            let url_col = table.index_of(&args.url_col).ok_or_else(|| {
                TableError::MissingColumn(args.url_col.clone(), src.uri())
            })?;

            total_in += table.num_rows();
            let mut successes = StringTable::new(result_columns(true));
            let mut errors = StringTable::new(result_columns(false));

            for r in 0..table.num_rows() {
                let fetched_at = chrono::Utc::now().to_rfc3339();
                let index_url = table.value(r, url_col).unwrap_or("").trim().to_string();

                if index_url.is_empty() {
                    errors.push_row(vec![
                        Some(index_url),
                        Some("missing_index_url".to_string()),
                        None,
                        Some(fetched_at),
                        None,
                    ]);
                    continue;
                }

                tokio::time::sleep(sleep).await;
                match client.get_page(&index_url, INDEX_TIMEOUT).await {
                    Ok((status, html)) if status.is_success() => {
                        match filing_link_from_index(&html, &args.form_type) {
                            Ok(link) => successes.push_row(vec![
                                Some(index_url),
                                Some(link),
                                Some(status.as_u16().to_string()),
                                Some(fetched_at),
                                Some(html),
                            ]),
                            Err(e) => errors.push_row(vec![
                                Some(index_url),
                                Some(e.to_string()),
                                Some(status.as_u16().to_string()),
                                Some(fetched_at),
                                Some(html),
                            ]),
                        }
                    }
                    Ok((status, html)) => errors.push_row(vec![
                        Some(index_url),
                        Some(format!("HTTP {}", status.as_u16())),
                        Some(status.as_u16().to_string()),
                        Some(fetched_at),
                        if html.is_empty() { None } else { Some(html) },
                    ]),
                    Err(e) => errors.push_row(vec![
                        Some(index_url),
                        Some(e.to_string()),
                        None,
                        Some(fetched_at),
                        None,
                    ]),
                }
            }

            total_success += successes.num_rows();
            total_errors += errors.num_rows();

            if !successes.is_empty() {
                let target =
                    out_prefix.child(&part_file_name(Some("success"), success_part));
                let bytes = write_parquet_bytes(&successes.to_batch()?, compression)?;
                target.put_bytes(bytes).await?;
                tracing::info!(
                    "[OK] wrote success {} -> {}",
                    successes.num_rows(),
                    target.uri()
                );
                success_part += 1;
            }
            if !errors.is_empty() {
                let target =
                    out_prefix.child(&part_file_name(Some("errors"), error_part));
                let bytes = write_parquet_bytes(&errors.to_batch()?, compression)?;
                target.put_bytes(bytes).await?;
                tracing::info!(
                    "[OK] wrote errors  {} -> {}",
                    errors.num_rows(),
                    target.uri()
                );
                error_part += 1;
            }

            tracing::info!(
                "{} rowgroup {}/{} | in={} success={} errors={}",
                src.uri(),
                rg + 1,
                groups.len(),
                table.num_rows(),
                successes.num_rows(),
                errors.num_rows()
            );
        }
    }

    tracing::info!("[DONE] total input rows:      {}", total_in);
    tracing::info!("[DONE] total success rows:    {}", total_success);
    tracing::info!("[DONE] total error rows:      {}", total_errors);
    tracing::info!("[DONE] success parts written: {}", success_part);
    tracing::info!("[DONE] error parts written:   {}", error_part);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_error_schemas_share_shape() {
        let s = result_columns(true);
        let e = result_columns(false);
        assert_eq!(s.len(), e.len());
        assert_eq!(s[1], "filing_link");
        assert_eq!(e[1], "error");
    }
}
