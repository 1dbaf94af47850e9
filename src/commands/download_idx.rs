// src/commands/download_idx.rs
//! Downloads quarterly `company.idx` files from the EDGAR full index.

use std::time::Duration;

use bytes::Bytes;
use clap::Args;

use crate::edgar::client::EdgarFetcher;
use crate::edgar::urls::company_idx_url;
use crate::storage::StorePath;
use crate::utils::error::AppError;

const ALL_QUARTERS: [&str; 4] = ["QTR1", "QTR2", "QTR3", "QTR4"];
const IDX_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Args, Debug, Clone)]
pub struct DownloadIdxArgs {
    /// Explicit year list, e.g. "2019,2021,2024" (overrides start/end)
    #[arg(long, default_value = "")]
    pub years: String,

    /// Start year (YYYY), inclusive
    #[arg(long)]
    pub start_year: Option<i32>,

    /// End year (YYYY), inclusive
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Which quarters to download: "all" or "QTR1,QTR3"
    #[arg(long, default_value = "all")]
    pub quarters: String,

    /// SEC compliant user agent, e.g. "Name email@domain.com"
    #[arg(long)]
    pub user_agent: String,

    /// Seconds to sleep between downloads
    #[arg(long, default_value_t = 1.0)]
    pub sleep: f64,

    /// Destination folder/prefix (local, gs:// or s3://)
    #[arg(long)]
    pub out: String,
}

pub fn parse_quarters(quarters: &str) -> Result<Vec<String>, AppError> {
    let q = quarters.trim();
    if q.is_empty() || q.eq_ignore_ascii_case("all") || q == "*" {
        return Ok(ALL_QUARTERS.iter().map(|s| s.to_string()).collect());
    }

    let mut seen = Vec::new();
    for item in q.replace(',', " ").split_whitespace() {
        let item = item.to_ascii_uppercase();
        if !ALL_QUARTERS.contains(&item.as_str()) {
            return Err(AppError::Config(format!(
                "Invalid quarter: {item}. Use QTR1,QTR2,QTR3,QTR4 or all."
            )));
        }
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    Ok(seen)
}

pub fn parse_years(
    years: &str,
    start_year: Option<i32>,
    end_year: Option<i32>,
) -> Result<Vec<i32>, AppError> {
    if !years.trim().is_empty() {
        let mut out = Vec::new();
        for item in years.replace(',', " ").split_whitespace() {
            let year: i32 = item.parse().map_err(|_| {
                AppError::Config(format!("Invalid year: {item}"))
            })?;
            if !out.contains(&year) {
                out.push(year);
            }
        }
        return Ok(out);
    }

    let (start, end) = match (start_year, end_year) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(AppError::Config(
                "Provide either --years OR both --start-year and --end-year.".to_string(),
            ))
        }
    };
    if start > end {
        return Err(AppError::Config(
            "--start-year must be <= --end-year".to_string(),
        ));
    }
    Ok((start..=end).collect())
}

pub async fn run(args: DownloadIdxArgs) -> Result<(), AppError> {
    let years = parse_years(&args.years, args.start_year, args.end_year)?;
    let quarters = parse_quarters(&args.quarters)?;
    let dest = StorePath::parse(&args.out)?;
    let client = EdgarFetcher::new(&args.user_agent)?;
    let sleep = Duration::from_secs_f64(args.sleep);

    tracing::info!("Years selected: {:?}", years);
    tracing::info!("Quarters selected: {:?}", quarters);
    tracing::info!("Destination: {}", dest.uri());

    for year in &years {
        for quarter in &quarters {
            let filename = format!("{year}_{quarter}_company.idx");
            let target = dest.child(&filename);
            let url = company_idx_url(*year, quarter);

            // Skip if the destination already has it. A failed existence
            // check is not fatal: attempt the download anyway.
            match target.exists().await {
                Ok(true) => {
                    tracing::info!("[SKIP] Already exists: {}", filename);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Existence check failed for {}. Will attempt download. Error: {}",
                        filename,
                        e
                    );
                }
            }

            tracing::info!("[GET ] {}", url);
            match client.get_page(&url, IDX_TIMEOUT).await {
                Ok((status, body)) if status.is_success() => {
                    match target.put_bytes(Bytes::from(body)).await {
                        Ok(()) => tracing::info!("[OK  ] {} -> {}", filename, target.uri()),
                        Err(e) => tracing::warn!("[FAIL] store {}: {}", filename, e),
                    }
                }
                Ok((status, _)) => {
                    tracing::warn!("[FAIL] {} -> HTTP {}", url, status);
                }
                Err(e) => {
                    tracing::warn!("[FAIL] {}. Error: {}", url, e);
                }
            }

            tokio::time::sleep(sleep).await;
        }
    }

    tracing::info!("All requested files have been attempted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarters_accept_presets_and_lists() {
        assert_eq!(parse_quarters("all").unwrap().len(), 4);
        assert_eq!(
            parse_quarters("qtr1, QTR3").unwrap(),
            vec!["QTR1".to_string(), "QTR3".to_string()]
        );
        assert!(parse_quarters("QTR5").is_err());
    }

    #[test]
    fn years_accept_list_or_range() {
        assert_eq!(
            parse_years("2019,2021,2019", None, None).unwrap(),
            vec![2019, 2021]
        );
        assert_eq!(
            parse_years("", Some(2020), Some(2022)).unwrap(),
            vec![2020, 2021, 2022]
        );
        assert!(parse_years("", Some(2022), Some(2020)).is_err());
        assert!(parse_years("", Some(2020), None).is_err());
        assert!(parse_years("twenty", None, None).is_err());
    }
}
