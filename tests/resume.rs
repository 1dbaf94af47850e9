// tests/resume.rs
//! End-to-end properties of the checkpointed scrape loop, driven by a
//! deterministic stub fetcher: resume-after-interruption equivalence,
//! retry accounting, and part-size bounds.

use std::collections::HashSet;
use std::sync::Mutex;

use bytes::Bytes;
use parquet::arrow::ArrowWriter;

use edgar_pipeline::checkpoint;
use edgar_pipeline::commands::fetch_html::{run_with_fetcher, FetchHtmlArgs};
use edgar_pipeline::edgar::client::{FetchFilings, FetchOutcome};
use edgar_pipeline::edgar::urls::direct_document_url;
use edgar_pipeline::storage::StorePath;
use edgar_pipeline::table::{RowGroups, StringTable};

/// Succeeds for every filename except the ones in `fail`, recording each
/// call.
struct StubFetcher {
    fail: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    fn new(fail: &[&str]) -> Self {
        Self {
            fail: fail.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls_for(&self, filename: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == filename)
            .count()
    }
}

impl FetchFilings for StubFetcher {
    async fn fetch(&self, filename: &str) -> FetchOutcome {
        self.calls.lock().unwrap().push(filename.to_string());
        let url = direct_document_url(filename);
        if self.fail.contains(filename) {
            FetchOutcome {
                url: Some(url),
                content: None,
                status: "Filing fetch failed: HTTP error: 404 Not Found".to_string(),
            }
        } else {
            FetchOutcome {
                url: Some(url),
                content: Some(format!("<html><body>doc {filename}</body></html>")),
                status: "Success (direct)".to_string(),
            }
        }
    }
}

/// Writes a two-row-group input parquet: row group 0 holds the first
/// three rows, row group 1 the rest.
async fn write_input(dir: &std::path::Path, rows: &[(&str, &str)]) -> String {
    let mut table = StringTable::new(vec!["Form Type".into(), "Filename".into()]);
    for (form, filename) in rows {
        table.push_row(vec![Some(form.to_string()), Some(filename.to_string())]);
    }
    let batch = table.to_batch().unwrap();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
    let split = 3.min(batch.num_rows());
    writer.write(&batch.slice(0, split)).unwrap();
    writer.flush().unwrap(); // force a row-group boundary
    if batch.num_rows() > split {
        writer
            .write(&batch.slice(split, batch.num_rows() - split))
            .unwrap();
    }
    writer.close().unwrap();

    let path = dir.join("input.parquet");
    let store = StorePath::parse(path.to_str().unwrap()).unwrap();
    store.put_bytes(Bytes::from(buf)).await.unwrap();
    path.to_str().unwrap().to_string()
}

fn args(input: &str, out: &std::path::Path) -> FetchHtmlArgs {
    FetchHtmlArgs {
        input: input.to_string(),
        output_prefix: out.to_str().unwrap().to_string(),
        user_agent: "Test Suite test@example.com".to_string(),
        forms: "10-K,10-K/A".to_string(),
        delay: 0.0,
        retry_limit: 2,
        retry_pause: 0.0,
        checkpoint_every: 2,
        max_rowgroups: 0,
        max_filings: 0,
        skip_if_exists: false,
        checkpoint_path: None,
        checkpoint_save_every: 1000,
    }
}

/// (status, filing_url, filename) for every row across all written parts,
/// sorted so runs can be compared as multisets.
async fn collect_results(out: &std::path::Path) -> Vec<(String, String, String)> {
    let base = StorePath::parse(out.to_str().unwrap()).unwrap();
    let mut results = Vec::new();
    for part in base.list_with_suffix(".parquet").await.unwrap() {
        let groups = RowGroups::new(part.get_bytes().await.unwrap()).unwrap();
        let table = StringTable::from_batch(&groups.read_all().unwrap()).unwrap();
        let status = table.index_of("status").unwrap();
        let url = table.index_of("filing_url").unwrap();
        let filename = table.index_of("filename").unwrap();
        for r in 0..table.num_rows() {
            results.push((
                table.value(r, status).unwrap_or("").to_string(),
                table.value(r, url).unwrap_or("").to_string(),
                table.value(r, filename).unwrap_or("").to_string(),
            ));
        }
    }
    results.sort();
    results
}

const ROWS: [(&str, &str); 5] = [
    ("10-K", "edgar/data/1/0000000001-20-000001.txt"),
    ("10-K", "edgar/data/2/0000000002-20-000002.txt"),
    ("8-K", "edgar/data/3/0000000003-20-000003.txt"),
    ("10-K/A", "edgar/data/4/0000000004-20-000004.txt"),
    ("10-K", "edgar/data/5/0000000005-20-000005.txt"),
];

#[tokio::test]
async fn interrupted_then_resumed_equals_uninterrupted() {
    // Baseline: one uninterrupted run.
    let base_dir = tempfile::tempdir().unwrap();
    let input = write_input(base_dir.path(), &ROWS).await;
    let base_out = base_dir.path().join("out");
    let fetcher = StubFetcher::new(&["edgar/data/2/0000000002-20-000002.txt"]);
    run_with_fetcher(args(&input, &base_out), &fetcher).await.unwrap();
    let baseline = collect_results(&base_out).await;
    assert_eq!(baseline.len(), 4); // the 8-K row is filtered out

    // Interrupted run: stop after three processed rows (a flush has
    // happened by then), then resume from the checkpoint.
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &ROWS).await;
    let out = dir.path().join("out");

    let fetcher = StubFetcher::new(&["edgar/data/2/0000000002-20-000002.txt"]);
    let mut first = args(&input, &out);
    first.max_filings = 3;
    run_with_fetcher(first, &fetcher).await.unwrap();

    let fetcher2 = StubFetcher::new(&["edgar/data/2/0000000002-20-000002.txt"]);
    run_with_fetcher(args(&input, &out), &fetcher2).await.unwrap();

    let resumed = collect_results(&out).await;
    assert_eq!(resumed, baseline); // no duplicates, no omissions

    // The second run must not have re-fetched rows the first run flushed.
    assert_eq!(fetcher2.calls_for("edgar/data/1/0000000001-20-000001.txt"), 0);
}

#[tokio::test]
async fn failing_row_is_attempted_exactly_retry_limit_times() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [("10-K", "edgar/data/9/0000000009-20-000009.txt")];
    let input = write_input(dir.path(), &rows).await;
    let out = dir.path().join("out");

    let fetcher = StubFetcher::new(&["edgar/data/9/0000000009-20-000009.txt"]);
    let mut a = args(&input, &out);
    a.retry_limit = 3;
    run_with_fetcher(a, &fetcher).await.unwrap();

    assert_eq!(fetcher.calls_for("edgar/data/9/0000000009-20-000009.txt"), 3);

    // the failure is preserved as evidence in the output
    let results = collect_results(&out).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].0.starts_with("Filing fetch failed"));
}

#[tokio::test]
async fn parts_never_exceed_flush_threshold_in_successes() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &ROWS).await;
    let out = dir.path().join("out");

    let fetcher = StubFetcher::new(&[]);
    run_with_fetcher(args(&input, &out), &fetcher).await.unwrap();

    let base = StorePath::parse(out.to_str().unwrap()).unwrap();
    let parts = base.list_with_suffix(".parquet").await.unwrap();
    assert!(!parts.is_empty());
    for part in parts {
        let groups = RowGroups::new(part.get_bytes().await.unwrap()).unwrap();
        let table = StringTable::from_batch(&groups.read_all().unwrap()).unwrap();
        let status = table.index_of("status").unwrap();
        let successes = (0..table.num_rows())
            .filter(|&r| {
                table
                    .value(r, status)
                    .map(|s| s.starts_with("Success"))
                    .unwrap_or(false)
            })
            .count();
        assert!(successes <= 2, "part holds {successes} successes");
    }
}

#[tokio::test]
async fn direct_layout_scenario_lands_in_output() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [("10-K", "edgar/data/320193/0000320193-20-000096.txt")];
    let input = write_input(dir.path(), &rows).await;
    let out = dir.path().join("out");

    let fetcher = StubFetcher::new(&[]);
    run_with_fetcher(args(&input, &out), &fetcher).await.unwrap();

    let results = collect_results(&out).await;
    assert_eq!(results.len(), 1);
    let (status, url, filename) = &results[0];
    assert_eq!(status, "Success (direct)");
    assert_eq!(
        url,
        "https://www.sec.gov/Archives/edgar/data/320193/0000320193-20-000096.txt"
    );
    assert_eq!(filename, "edgar/data/320193/0000320193-20-000096.txt");
}

#[tokio::test]
async fn completed_run_leaves_a_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &ROWS).await;
    let out = dir.path().join("out");

    let fetcher = StubFetcher::new(&[]);
    run_with_fetcher(args(&input, &out), &fetcher).await.unwrap();

    let ckpt_path = StorePath::parse(out.to_str().unwrap())
        .unwrap()
        .child("_checkpoint.json");
    let state = checkpoint::load(&ckpt_path).await.expect("checkpoint written");
    assert_eq!(state.total_seen, 4);
    assert_eq!(state.total_ok, 4);
    assert_eq!(state.rowgroup, 2); // both row groups done
}
