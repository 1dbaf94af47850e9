// src/commands/verify_txt.rs
//! Verifies that txt-to-parquet conversion lost nothing: column names and
//! order, then shapes, then (optionally) a content hash.

use clap::Args;
use sha2::{Digest, Sha256};

use crate::storage::StorePath;
use crate::table::{read_delimited, RowGroups, StringTable};
use crate::utils::error::AppError;

use super::convert_txt::FILES_DEFAULT;
use super::{pick_quarter_dirs, split_list};

#[derive(Args, Debug, Clone)]
pub struct VerifyTxtArgs {
    /// Root containing quarter folders with .txt files
    #[arg(long)]
    pub txt_root: String,

    /// Root containing quarter folders with .parquet files
    #[arg(long)]
    pub parquet_root: String,

    /// Comma-separated tables to verify
    #[arg(long, default_value = FILES_DEFAULT)]
    pub files: String,

    /// Comma-separated quarters to verify (e.g. 2020q1,2020q2)
    #[arg(long, default_value = "")]
    pub only_quarters: String,

    /// Comma-separated quarters to skip
    #[arg(long, default_value = "")]
    pub skip_quarters: String,

    /// Also compare content hashes (slow for big tables)
    #[arg(long)]
    pub strict_hash: bool,
}

/// Content hash over column names and row values, stable across storage
/// format. Nulls and empty strings hash differently on purpose.
fn hash_table(table: &StringTable) -> String {
    let mut hasher = Sha256::new();
    hasher.update(table.columns().join("|").as_bytes());
    for r in 0..table.num_rows() {
        for value in table.row(r) {
            match value {
                Some(v) => {
                    hasher.update([1u8]);
                    hasher.update(v.as_bytes());
                }
                None => hasher.update([0u8]),
            }
            hasher.update([0xff]);
        }
    }
    hex::encode(hasher.finalize())
}

struct CheckResult {
    table: String,
    ok: bool,
    reason: String,
    txt_shape: Option<(usize, usize)>,
    pq_shape: Option<(usize, usize)>,
}

impl CheckResult {
    fn fail(table: &str, reason: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            ok: false,
            reason: reason.into(),
            txt_shape: None,
            pq_shape: None,
        }
    }
}

async fn verify_one_table(
    txt_path: &StorePath,
    pq_path: &StorePath,
    table_name: &str,
    strict_hash: bool,
) -> Result<CheckResult, AppError> {
    if !txt_path.exists().await? {
        return Ok(CheckResult::fail(
            table_name,
            format!("Missing TXT: {}", txt_path.uri()),
        ));
    }
    if !pq_path.exists().await? {
        return Ok(CheckResult::fail(
            table_name,
            format!("Missing Parquet: {}", pq_path.uri()),
        ));
    }

    let txt = read_delimited(&txt_path.get_bytes().await?, b'\t')?;
    let groups = RowGroups::new(pq_path.get_bytes().await?)?;
    let pq = StringTable::from_batch(&groups.read_all()?)?;

    let txt_shape = (txt.num_rows(), txt.columns().len());
    let pq_shape = (pq.num_rows(), pq.columns().len());
    let mut result = CheckResult {
        table: table_name.to_string(),
        ok: false,
        reason: String::new(),
        txt_shape: Some(txt_shape),
        pq_shape: Some(pq_shape),
    };

    if txt.columns() != pq.columns() {
        result.reason = "Column mismatch (names/order)".to_string();
        return Ok(result);
    }
    if txt_shape != pq_shape {
        result.reason = "Shape mismatch (rows/cols)".to_string();
        return Ok(result);
    }
    if strict_hash && hash_table(&txt) != hash_table(&pq) {
        result.reason = "Content hash mismatch".to_string();
        return Ok(result);
    }

    result.ok = true;
    result.reason = "OK".to_string();
    Ok(result)
}

/// Returns the number of failed checks; the caller maps that to the exit
/// code.
pub async fn run(args: VerifyTxtArgs) -> Result<usize, AppError> {
    let txt_root = StorePath::parse(&args.txt_root)?;
    let parquet_root = StorePath::parse(&args.parquet_root)?;
    let files = split_list(&args.files);
    let only = split_list(&args.only_quarters);
    let skip = split_list(&args.skip_quarters);

    let quarters = pick_quarter_dirs(&txt_root, &only, &skip).await?;
    tracing::info!("TXT root:     {}", txt_root.uri());
    tracing::info!("Parquet root: {}", parquet_root.uri());
    tracing::info!("Quarters to verify: {}", quarters.len());
    tracing::info!("Tables: {:?} | Strict hash: {}", files, args.strict_hash);

    let mut failures = 0usize;

    for qdir in &quarters {
        let quarter = qdir.name().to_string();
        tracing::info!("[VERIFY] {}", quarter);

        for table_name in &files {
            let txt_path = qdir.child(&format!("{table_name}.txt"));
            let pq_path = parquet_root.child(&format!("{quarter}/{table_name}.parquet"));

            let res =
                verify_one_table(&txt_path, &pq_path, table_name, args.strict_hash)
                    .await?;

            if res.ok {
                let (rows, cols) = res.txt_shape.unwrap_or((0, 0));
                tracing::info!("PASS {}: {} | rows={} cols={}", res.table, res.reason, rows, cols);
            } else {
                failures += 1;
                tracing::warn!("FAIL {}: {}", res.table, res.reason);
                if let Some((rows, cols)) = res.txt_shape {
                    tracing::warn!("   TXT: rows={} cols={}", rows, cols);
                }
                if let Some((rows, cols)) = res.pq_shape {
                    tracing::warn!("   PQ : rows={} cols={}", rows, cols);
                }
            }
        }
    }

    if failures == 0 {
        tracing::info!("ALL CHECKS PASSED");
    } else {
        tracing::warn!("FAILURES: {}", failures);
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::write_parquet_bytes;
    use bytes::Bytes;
    use parquet::basic::Compression;

    const TXT: &[u8] = b"adsh\tcik\n0001-20\t320193\n";

    async fn seed(dir: &tempfile::TempDir, pq_payload: &StringTable) {
        let base = StorePath::parse(dir.path().to_str().unwrap()).unwrap();
        base.child("2020q1/sub.txt")
            .put_bytes(Bytes::from_static(TXT))
            .await
            .unwrap();
        let bytes =
            write_parquet_bytes(&pq_payload.to_batch().unwrap(), Compression::SNAPPY)
                .unwrap();
        base.child("pq/2020q1/sub.parquet")
            .put_bytes(bytes)
            .await
            .unwrap();
    }

    fn args_for(dir: &tempfile::TempDir, strict: bool) -> VerifyTxtArgs {
        VerifyTxtArgs {
            txt_root: dir.path().to_str().unwrap().to_string(),
            parquet_root: dir.path().join("pq").to_str().unwrap().to_string(),
            files: "sub".to_string(),
            only_quarters: String::new(),
            skip_quarters: String::new(),
            strict_hash: strict,
        }
    }

    #[tokio::test]
    async fn matching_conversion_passes() {
        let dir = tempfile::tempdir().unwrap();
        let good = read_delimited(TXT, b'\t').unwrap();
        seed(&dir, &good).await;
        assert_eq!(run(args_for(&dir, true)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shape_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = read_delimited(TXT, b'\t').unwrap();
        bad.push_row(vec![Some("extra".into()), Some("1".into())]);
        seed(&dir, &bad).await;
        assert_eq!(run(args_for(&dir, false)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn content_mismatch_caught_only_by_strict_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut tweaked = StringTable::new(vec!["adsh".into(), "cik".into()]);
        tweaked.push_row(vec![Some("0001-20".into()), Some("999999".into())]);
        seed(&dir, &tweaked).await;

        assert_eq!(run(args_for(&dir, false)).await.unwrap(), 0);
        assert_eq!(run(args_for(&dir, true)).await.unwrap(), 1);
    }
}
