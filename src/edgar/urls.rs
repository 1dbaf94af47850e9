// src/edgar/urls.rs
//! Deterministic URL derivations for EDGAR archive paths.

use once_cell::sync::Lazy;
use regex::Regex;

pub const SEC_BASE: &str = "https://www.sec.gov";
pub const ARCHIVES_BASE: &str = "https://www.sec.gov/Archives";
pub const FULL_INDEX_BASE: &str = "https://www.sec.gov/Archives/edgar/full-index";

const IXVIEWER_PREFIX: &str = "https://www.sec.gov/ix?doc=";

// Accession number with dashes as it appears in master/company index
// Filename paths: edgar/data/320187/0000320187-25-000060.txt
static ACCESSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"edgar/data/(?P<cik>\d+)/(?P<accession>\d{10}-\d{2}-\d{6})")
        .expect("Failed to compile ACCESSION_RE")
});

/// True when the index Filename already points at a retrievable document.
pub fn is_direct_document(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".txt") || lower.ends_with(".htm") || lower.ends_with(".html")
}

/// Direct-document layout: the archive root plus the Filename itself.
/// `edgar/data/861439/000091205794000263.txt` ->
/// `https://www.sec.gov/Archives/edgar/data/861439/000091205794000263.txt`
pub fn direct_document_url(filename: &str) -> String {
    format!("{ARCHIVES_BASE}/{}", filename.trim_start_matches('/'))
}

/// Accession-folder layout: Filename includes the accession folder, e.g.
/// `edgar/data/320193/000032019318000145/a10-k20189292018.htm`. The
/// filing itself must be discovered through the folder's index page.
pub fn accession_index_url(filename: &str) -> Option<String> {
    let parts: Vec<&str> = filename.split('/').collect();
    if parts.len() < 4 {
        return None;
    }
    let cik = parts[2];
    let accession_nodash = parts[3];
    Some(format!(
        "{ARCHIVES_BASE}/edgar/data/{cik}/{accession_nodash}/index.html"
    ))
}

/// Converts a master-index Filename into the filing's index page URL.
/// `edgar/data/320187/0000320187-25-000060.txt` ->
/// `https://www.sec.gov/Archives/edgar/data/320187/000032018725000060/0000320187-25-000060-index.html`
pub fn build_sec_index_url(filename: &str) -> Option<String> {
    let caps = ACCESSION_RE.captures(filename)?;
    let cik = &caps["cik"];
    let accession = &caps["accession"];
    let nodash = accession.replace('-', "");
    Some(format!(
        "{ARCHIVES_BASE}/edgar/data/{cik}/{nodash}/{accession}-index.html"
    ))
}

/// Inline-XBRL viewer links wrap the real document; unwrap them.
pub fn fix_ixviewer_url(url: &str) -> String {
    match url.strip_prefix(IXVIEWER_PREFIX) {
        Some(doc) => format!("{SEC_BASE}{doc}"),
        None => url.to_string(),
    }
}

/// Quarterly company index location, e.g.
/// `https://www.sec.gov/Archives/edgar/full-index/2020/QTR1/company.idx`
pub fn company_idx_url(year: i32, quarter: &str) -> String {
    format!("{FULL_INDEX_BASE}/{year}/{quarter}/company.idx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_layout() {
        assert!(is_direct_document("edgar/data/861439/000091205794000263.txt"));
        assert_eq!(
            direct_document_url("edgar/data/320193/0000320193-20-000096.txt"),
            "https://www.sec.gov/Archives/edgar/data/320193/0000320193-20-000096.txt"
        );
    }

    #[test]
    fn accession_layout() {
        assert!(!is_direct_document("edgar/data/320193/000032019318000145"));
        assert_eq!(
            accession_index_url("edgar/data/320193/000032019318000145/extra").as_deref(),
            Some(
                "https://www.sec.gov/Archives/edgar/data/320193/000032019318000145/index.html"
            )
        );
        assert_eq!(accession_index_url("too/short"), None);
    }

    #[test]
    fn master_index_url_from_filename() {
        assert_eq!(
            build_sec_index_url("edgar/data/320187/0000320187-25-000060.txt").as_deref(),
            Some(
                "https://www.sec.gov/Archives/edgar/data/320187/000032018725000060/0000320187-25-000060-index.html"
            )
        );
        assert_eq!(build_sec_index_url("no/accession/here.txt"), None);
    }

    #[test]
    fn ixviewer_unwrap() {
        assert_eq!(
            fix_ixviewer_url("https://www.sec.gov/ix?doc=/Archives/edgar/data/1/a.htm"),
            "https://www.sec.gov/Archives/edgar/data/1/a.htm"
        );
        assert_eq!(fix_ixviewer_url("https://example.com/x"), "https://example.com/x");
    }

    #[test]
    fn quarterly_index_url() {
        assert_eq!(
            company_idx_url(2020, "QTR1"),
            "https://www.sec.gov/Archives/edgar/full-index/2020/QTR1/company.idx"
        );
    }
}
