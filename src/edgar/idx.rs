// src/edgar/idx.rs
//! Parsing of EDGAR full-index `company.idx` files.
//!
//! The files are fixed-ish width text, but column offsets drift across
//! years, so rows are matched with a tolerant regex instead: the company
//! name may contain single spaces, fields are separated by runs of two or
//! more spaces, and the right-hand tokens (form type, CIK, date, filename)
//! have stable shapes.

use once_cell::sync::Lazy;
use regex::Regex;

pub const IDX_COLUMNS: [&str; 5] = [
    "Company Name",
    "Form Type",
    "CIK",
    "Date Filed",
    "Filename",
];

static ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<company_name>.+?)\s{2,}(?P<form_type>\S+)\s+(?P<cik>\d+)\s+(?P<date_filed>\d{4}-\d{2}-\d{2})\s+(?P<filename>.+)$",
    )
    .expect("Failed to compile ROW_RE")
});

static IDX_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<year>\d{4})_(?P<qtr>QTR[1-4])_company\.idx$")
        .expect("Failed to compile IDX_NAME_RE")
});

/// One parsed filing row from a company.idx file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxRecord {
    pub company_name: String,
    pub form_type: String,
    pub cik: String,
    pub date_filed: String,
    pub filename: String,
}

/// Parses the body of one idx file, skipping the preamble, the header row
/// and the dashed separator. Unparseable lines are dropped silently; the
/// preamble makes them unavoidable.
pub fn parse_idx_text(text: &str) -> Vec<IdxRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() {
            continue;
        }
        if trimmed.starts_with("-----") {
            continue;
        }
        if trimmed.to_ascii_lowercase().starts_with("company name") {
            continue;
        }
        if let Some(caps) = ROW_RE.captures(trimmed) {
            records.push(IdxRecord {
                company_name: caps["company_name"].trim().to_string(),
                form_type: caps["form_type"].trim().to_string(),
                cik: normalize_cik(&caps["cik"]),
                date_filed: caps["date_filed"].trim().to_string(),
                filename: caps["filename"].trim().to_string(),
            });
        }
    }
    records
}

/// `2019_QTR3_company.idx` -> `(Some(2019), Some("QTR3"))`.
pub fn year_quarter_from_name(name: &str) -> (Option<i32>, Option<String>) {
    match IDX_NAME_RE.captures(name) {
        Some(caps) => {
            let year = caps["year"].parse::<i32>().ok();
            let qtr = caps["qtr"].to_ascii_uppercase();
            (year, Some(qtr))
        }
        None => (None, None),
    }
}

/// CIKs occasionally arrive as floats from spreadsheet round-trips; keep
/// them as digit strings.
pub fn normalize_cik(cik: &str) -> String {
    let s = cik.trim();
    s.strip_suffix(".0").unwrap_or(s).to_string()
}

/// Zero-pads a numeric CIK to the canonical 10 digits; non-numeric input
/// is passed through untouched.
pub fn pad_cik(cik: &str) -> String {
    let s = cik.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        format!("{s:0>10}")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Company Name                                                  Form Type   CIK         Date Filed  File Name
---------------------------------------------------------------------------------------------------------------
APPLE INC                                                     10-K        320193      2020-10-30  edgar/data/320193/0000320193-20-000096.txt
1st FRANKLIN FINANCIAL CORP                                   10-Q        38723       2020-11-12  edgar/data/38723/0000038723-20-000059.txt
";

    #[test]
    fn parses_rows_and_skips_preamble() {
        let records = parse_idx_text(SAMPLE);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].company_name, "APPLE INC");
        assert_eq!(records[0].form_type, "10-K");
        assert_eq!(records[0].cik, "320193");
        assert_eq!(records[0].date_filed, "2020-10-30");
        assert_eq!(
            records[0].filename,
            "edgar/data/320193/0000320193-20-000096.txt"
        );
        // company names with single spaces survive
        assert_eq!(records[1].company_name, "1st FRANKLIN FINANCIAL CORP");
    }

    #[test]
    fn source_name_yields_year_and_quarter() {
        assert_eq!(
            year_quarter_from_name("2019_QTR3_company.idx"),
            (Some(2019), Some("QTR3".to_string()))
        );
        assert_eq!(year_quarter_from_name("notes.txt"), (None, None));
    }

    #[test]
    fn cik_normalization() {
        assert_eq!(normalize_cik("320193.0"), "320193");
        assert_eq!(pad_cik("320193"), "0000320193");
        assert_eq!(pad_cik("not-a-cik"), "not-a-cik");
    }
}
