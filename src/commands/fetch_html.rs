// src/commands/fetch_html.rs
//! Checkpointed, rate-limited scraping of filing documents.
//!
//! The slow job of the pipeline: one HTTP round-trip (or three, for
//! accession-folder rows) per filing, a mandated sleep after every row,
//! and runs that span days. Everything here is built around surviving
//! interruption: output leaves in numbered immutable parts, and a small
//! checkpoint object records the scan position so a restart continues
//! where the previous run stopped without re-emitting or skipping rows.

use std::collections::HashSet;
use std::time::Duration;

use clap::Args;
use parquet::basic::Compression;

use crate::checkpoint::{self, Checkpoint};
use crate::edgar::client::{EdgarFetcher, FetchFilings, FetchOutcome};
use crate::edgar::html::clean_filing_html;
use crate::storage::StorePath;
use crate::table::{
    part_file_name, snake_case_column, write_parquet_bytes, RowGroups, StringTable,
};
use crate::utils::error::{AppError, TableError};

use super::parquet_sources;

const FORM_TYPE_COLUMN: &str = "Form Type";
const FILENAME_COLUMN: &str = "Filename";

#[derive(Args, Debug, Clone)]
pub struct FetchHtmlArgs {
    /// Input parquet file or prefix of parts, containing at least
    /// Filename and Form Type columns (local, gs:// or s3://)
    #[arg(long)]
    pub input: String,

    /// Output folder/prefix for parquet parts (local, gs:// or s3://)
    #[arg(long)]
    pub output_prefix: String,

    /// SEC compliant user agent, e.g. "Name email@domain.com"
    #[arg(long)]
    pub user_agent: String,

    /// Comma-separated form types to scrape
    #[arg(long, default_value = "10-K,10-K/A")]
    pub forms: String,

    /// Seconds to sleep after every filing (success or failure)
    #[arg(long, default_value_t = 1.5)]
    pub delay: f64,

    /// Fetch attempts per filing
    #[arg(long, default_value_t = 2)]
    pub retry_limit: u32,

    /// Seconds to sleep between attempts for one filing
    #[arg(long, default_value_t = 2.0)]
    pub retry_pause: f64,

    /// Flush an output part every N successful filings
    #[arg(long, default_value_t = 200)]
    pub checkpoint_every: usize,

    /// Test mode: process only the first N row groups (0 = all)
    #[arg(long, default_value_t = 0)]
    pub max_rowgroups: usize,

    /// Test mode: stop after N filings total (0 = all)
    #[arg(long, default_value_t = 0)]
    pub max_filings: u64,

    /// Skip writing a part if it already exists
    #[arg(long)]
    pub skip_if_exists: bool,

    /// Checkpoint JSON path (local, gs:// or s3://).
    /// Default: <output-prefix>/_checkpoint.json
    #[arg(long)]
    pub checkpoint_path: Option<String>,

    /// Save the checkpoint every N processed rows (success or fail)
    #[arg(long, default_value_t = 50)]
    pub checkpoint_save_every: usize,
}

/// One scraped (or failed) filing, carrying the input row through.
struct FetchRecord {
    status: String,
    filing_url: Option<String>,
    filing_text: Option<String>,
    cleaned_text: Option<String>,
    row: Vec<Option<String>>,
}

/// Mutable run state: the checkpoint counters, the unflushed buffer, and
/// the output schema pinned by the first row group.
struct ScrapeRun {
    out_prefix: StorePath,
    ckpt_path: StorePath,
    skip_if_exists: bool,
    state: Checkpoint,
    buffer: Vec<FetchRecord>,
    input_columns: Option<Vec<String>>,
    processed_since_save: usize,
}

impl ScrapeRun {
    /// Pins the input schema on first sight; later row groups must match.
    fn ensure_columns(&mut self, table: &StringTable) -> Result<(), TableError> {
        match &self.input_columns {
            None => {
                self.input_columns = Some(table.columns().to_vec());
                Ok(())
            }
            Some(existing) if existing.as_slice() == table.columns() => Ok(()),
            Some(existing) => Err(TableError::Schema(format!(
                "input parts disagree on columns ({} vs {})",
                existing.join(","),
                table.columns().join(",")
            ))),
        }
    }

    /// Saves the checkpoint pointing at the next row to process.
    async fn persist(&mut self, rowgroup: usize, row_in_rowgroup: usize) {
        self.state.rowgroup = rowgroup;
        self.state.row_in_rowgroup = row_in_rowgroup;
        checkpoint::save(&self.ckpt_path, &self.state).await;
    }

    /// Writes the buffered records as the next numbered part, then saves
    /// the checkpoint so the flushed rows are never re-attempted. The part
    /// counter advances even when `--skip-if-exists` short-circuits.
    async fn flush(
        &mut self,
        next_rowgroup: usize,
        next_row: usize,
    ) -> Result<(), AppError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let out = self
            .out_prefix
            .child(&part_file_name(None, self.state.out_part));

        if self.skip_if_exists && out.exists().await? {
            tracing::info!("[SKIP] exists: {}", out.uri());
        } else {
            let batch = self.to_table()?.to_batch()?;
            let bytes = write_parquet_bytes(&batch, Compression::SNAPPY)?;
            out.put_bytes(bytes).await?;
            tracing::info!("[OK] wrote {} rows -> {}", self.buffer.len(), out.uri());
        }

        self.buffer.clear();
        self.state.out_part += 1;
        self.state.ok_in_part = 0;
        self.persist(next_rowgroup, next_row).await;
        Ok(())
    }

    fn to_table(&self) -> Result<StringTable, TableError> {
        let input_columns = self
            .input_columns
            .as_ref()
            .ok_or_else(|| TableError::Schema("no input schema seen".to_string()))?;

        let mut columns = vec![
            "status".to_string(),
            "filing_url".to_string(),
            "filing_text".to_string(),
            "cleaned_text".to_string(),
        ];
        columns.extend(input_columns.iter().map(|c| snake_case_column(c)));

        let mut table = StringTable::new(columns);
        for rec in &self.buffer {
            let mut row = vec![
                Some(rec.status.clone()),
                rec.filing_url.clone(),
                rec.filing_text.clone(),
                rec.cleaned_text.clone(),
            ];
            row.extend(rec.row.iter().cloned());
            table.push_row(row);
        }
        Ok(table)
    }
}

fn parse_form_list(forms: &str) -> Result<HashSet<String>, AppError> {
    let set: HashSet<String> = forms
        .split(',')
        .map(|f| f.trim().to_ascii_uppercase())
        .filter(|f| !f.is_empty())
        .collect();
    if set.is_empty() {
        return Err(AppError::Config(
            "--forms must name at least one form type".to_string(),
        ));
    }
    Ok(set)
}

/// Rows of this row group whose form type is in the allowed set, plus the
/// index of the Filename column. Both identifying columns are required;
/// their absence is a caller error.
fn select_candidates(
    table: &StringTable,
    allowed: &HashSet<String>,
    source: &str,
) -> Result<(Vec<usize>, usize), TableError> {
    let form_col = table.index_of(FORM_TYPE_COLUMN).ok_or_else(|| {
        TableError::MissingColumn(FORM_TYPE_COLUMN.to_string(), source.to_string())
    })?;
    let filename_col = table.index_of(FILENAME_COLUMN).ok_or_else(|| {
        TableError::MissingColumn(FILENAME_COLUMN.to_string(), source.to_string())
    })?;

    let mut out = Vec::new();
    for r in 0..table.num_rows() {
        if let Some(form) = table.value(r, form_col) {
            if allowed.contains(&form.trim().to_ascii_uppercase()) {
                out.push(r);
            }
        }
    }
    Ok((out, filename_col))
}

pub async fn run(args: FetchHtmlArgs) -> Result<(), AppError> {
    let fetcher = EdgarFetcher::new(&args.user_agent)?;
    run_with_fetcher(args, &fetcher).await
}

/// The scrape loop proper, generic over the fetcher so tests can drive it
/// with a deterministic stub.
pub async fn run_with_fetcher<F: FetchFilings>(
    args: FetchHtmlArgs,
    fetcher: &F,
) -> Result<(), AppError> {
    let allowed = parse_form_list(&args.forms)?;
    let input = StorePath::parse(&args.input)?;
    let out_prefix = StorePath::parse(&args.output_prefix)?;
    let ckpt_path = match &args.checkpoint_path {
        Some(p) => StorePath::parse(p)?,
        None => out_prefix.child("_checkpoint.json"),
    };

    let sources = parquet_sources(&input).await?;
    if sources.is_empty() {
        return Err(AppError::Config(format!(
            "No parquet inputs under {}",
            input.uri()
        )));
    }

    let start = checkpoint::load(&ckpt_path).await;
    tracing::info!("input={} sources={}", input.uri(), sources.len());
    tracing::info!(
        "delay={}s retry_limit={} checkpoint_every={}",
        args.delay,
        args.retry_limit,
        args.checkpoint_every
    );
    tracing::info!("checkpoint={}", ckpt_path.uri());
    match &start {
        Some(c) => tracing::info!(
            "[RESUME] rowgroup={} row_in_rowgroup={} out_part={} total_seen={} total_ok={}",
            c.rowgroup,
            c.row_in_rowgroup,
            c.out_part,
            c.total_seen,
            c.total_ok
        ),
        None => tracing::info!("[RESUME] no checkpoint found, starting fresh"),
    }

    let start = start.unwrap_or_default();
    let mut run = ScrapeRun {
        out_prefix,
        ckpt_path,
        skip_if_exists: args.skip_if_exists,
        state: start.clone(),
        buffer: Vec::new(),
        input_columns: None,
        processed_since_save: 0,
    };

    let delay = Duration::from_secs_f64(args.delay);
    let retry_pause = Duration::from_secs_f64(args.retry_pause);

    let mut rg_index = 0usize;
    for src in &sources {
        let groups = RowGroups::new(src.get_bytes().await?)?;
        for local_rg in 0..groups.len() {
            let rg = rg_index;
            rg_index += 1;

            if rg < start.rowgroup {
                continue; // already fully processed in an earlier run
            }
            if args.max_rowgroups != 0 && rg >= args.max_rowgroups {
                run.flush(rg, 0).await?;
                run.persist(rg, 0).await;
                tracing::info!(
                    "[DONE] max rowgroups reached | seen={} ok={} parts_written={}",
                    run.state.total_seen,
                    run.state.total_ok,
                    run.state.out_part
                );
                return Ok(());
            }

            let batch = groups.read(local_rg)?;
            let table = StringTable::from_batch(&batch)?;
            run.ensure_columns(&table)?;
            let (candidates, filename_col) =
                select_candidates(&table, &allowed, &src.uri())?;

            if candidates.is_empty() {
                tracing::info!("[ROWGROUP {}] empty after filter", rg + 1);
                run.persist(rg + 1, 0).await;
                continue;
            }
            tracing::info!("[ROWGROUP {}] candidates={}", rg + 1, candidates.len());

            // resume inside the first revisited row group only
            let begin = if rg == start.rowgroup {
                start.row_in_rowgroup.min(candidates.len())
            } else {
                0
            };

            for i in begin..candidates.len() {
                if args.max_filings != 0 && run.state.total_seen >= args.max_filings {
                    run.flush(rg, i).await?;
                    run.persist(rg, i).await;
                    tracing::info!(
                        "[DONE] max filings reached | seen={} ok={}",
                        run.state.total_seen,
                        run.state.total_ok
                    );
                    return Ok(());
                }

                run.state.total_seen += 1;
                run.processed_since_save += 1;

                let row = candidates[i];
                let filename = table.value(row, filename_col).unwrap_or("").to_string();

                let mut outcome = FetchOutcome {
                    url: None,
                    content: None,
                    status: "No fetch attempted".to_string(),
                };
                for attempt in 0..args.retry_limit {
                    outcome = fetcher.fetch(&filename).await;
                    if outcome.is_success() {
                        break;
                    }
                    tracing::warn!(
                        "attempt {}/{} failed for {}: {}",
                        attempt + 1,
                        args.retry_limit,
                        filename,
                        outcome.status
                    );
                    tokio::time::sleep(retry_pause).await;
                }

                match outcome.content {
                    Some(content) => {
                        let cleaned = clean_filing_html(&content);
                        run.state.total_ok += 1;
                        run.state.ok_in_part += 1;
                        run.buffer.push(FetchRecord {
                            status: outcome.status,
                            filing_url: outcome.url,
                            filing_text: Some(content),
                            cleaned_text: Some(cleaned),
                            row: table.row(row).to_vec(),
                        });
                        // flush cadence counts successes only
                        if run.state.ok_in_part >= args.checkpoint_every {
                            run.flush(rg, i + 1).await?;
                        }
                    }
                    None => {
                        // failures are preserved as evidence, not dropped
                        run.buffer.push(FetchRecord {
                            status: outcome.status,
                            filing_url: outcome.url,
                            filing_text: None,
                            cleaned_text: None,
                            row: table.row(row).to_vec(),
                        });
                    }
                }

                if run.processed_since_save >= args.checkpoint_save_every {
                    run.persist(rg, i + 1).await;
                    run.processed_since_save = 0;
                }

                tokio::time::sleep(delay).await;
            }

            run.persist(rg + 1, 0).await;
            tracing::info!(
                "rowgroup done | seen={} ok={} buffered={}",
                run.state.total_seen,
                run.state.total_ok,
                run.buffer.len()
            );
        }
    }

    run.flush(rg_index, 0).await?;
    run.persist(rg_index, 0).await;

    tracing::info!("[DONE] seen={}", run.state.total_seen);
    tracing::info!("[DONE] ok={}", run.state.total_ok);
    tracing::info!("[DONE] parts_written={}", run.state.out_part);
    tracing::info!("[DONE] checkpoint={}", run.ckpt_path.uri());
    Ok(())
}
