// src/edgar/html.rs
//! Scraping of EDGAR index pages and normalization of filing HTML.

use ego_tree::NodeRef;
use once_cell::sync::Lazy;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use super::urls::{fix_ixviewer_url, SEC_BASE};

static TABLE_FILE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table.tableFile").expect("Failed to compile TABLE_FILE_SELECTOR")
});

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));

static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Failed to compile CELL_SELECTOR"));

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("Failed to compile LINK_SELECTOR"));

static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("Failed to compile BODY_SELECTOR"));

// Elements whose text is never filing content.
const NON_CONTENT_TAGS: [&str; 7] = [
    "script", "style", "header", "footer", "nav", "noscript", "meta",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IndexParseError {
    #[error("No document table found")]
    NoDocumentTable,

    #[error("No primary .htm/.html link found")]
    NoPrimaryLink,
}

fn absolute_sec_url(href: &str) -> Option<String> {
    let base = Url::parse(SEC_BASE).ok()?;
    let joined = base.join(href).ok()?;
    Some(fix_ixviewer_url(joined.as_str()))
}

/// Picks the primary document out of an accession folder's index page:
/// the first `.htm`/`.html` link in the document table that is not itself
/// an index page.
pub fn primary_document_link(index_html: &str) -> Result<String, IndexParseError> {
    let document = Html::parse_document(index_html);
    let table = document
        .select(&TABLE_FILE_SELECTOR)
        .next()
        .ok_or(IndexParseError::NoDocumentTable)?;

    for link in table.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let lower = href.to_ascii_lowercase();
        let is_document = lower.ends_with(".htm") || lower.ends_with(".html");
        if is_document && !lower.contains("index") {
            if let Some(url) = absolute_sec_url(href) {
                return Ok(url);
            }
        }
    }
    Err(IndexParseError::NoPrimaryLink)
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Selects the filing document from an index page's document table,
/// preferring the complete submission text file, then the first row whose
/// type column starts with `form_prefix` (e.g. "8-K").
pub fn filing_link_from_index(
    index_html: &str,
    form_prefix: &str,
) -> Result<String, IndexParseError> {
    let document = Html::parse_document(index_html);
    let table = document
        .select(&TABLE_FILE_SELECTOR)
        .next()
        .ok_or(IndexParseError::NoDocumentTable)?;

    let form_prefix = form_prefix.to_ascii_uppercase();
    let mut best_typed_link: Option<String> = None;

    for row in table.select(&ROW_SELECTOR) {
        let cells: Vec<ElementRef> = row.select(&CELL_SELECTOR).collect();
        if cells.is_empty() {
            continue;
        }

        let description = cells
            .get(1)
            .map(|c| cell_text(c).to_ascii_uppercase())
            .unwrap_or_default();
        let href = cells
            .get(2)
            .and_then(|c| c.select(&LINK_SELECTOR).next())
            .and_then(|a| a.value().attr("href"));
        let doc_type = cells
            .get(3)
            .map(|c| cell_text(c).to_ascii_uppercase())
            .unwrap_or_default();

        let Some(href) = href else {
            continue;
        };
        let Some(full_url) = absolute_sec_url(href) else {
            continue;
        };

        if description.contains("COMPLETE SUBMISSION TEXT FILE")
            && href.to_ascii_lowercase().ends_with(".txt")
        {
            return Ok(full_url);
        }

        if doc_type.starts_with(&form_prefix) && best_typed_link.is_none() {
            best_typed_link = Some(full_url);
        }
    }

    best_typed_link.ok_or(IndexParseError::NoPrimaryLink)
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            out.push_str(text);
            out.push('\n');
            return;
        }
        Node::Element(element) => {
            if NON_CONTENT_TAGS.contains(&element.name()) {
                return;
            }
        }
        _ => {}
    }
    for child in node.children() {
        collect_text(child, out);
    }
}

/// Converts raw filing HTML into readable plain text: non-content elements
/// are dropped, lines are trimmed and blank lines collapsed.
pub fn clean_filing_html(html_text: &str) -> String {
    let document = Html::parse_document(html_text);

    let mut raw = String::new();
    match document.select(&BODY_SELECTOR).next() {
        Some(body) => collect_text(*body, &mut raw),
        None => collect_text(document.tree.root(), &mut raw),
    }

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_PAGE: &str = r#"
        <html><body>
        <table class="tableFile">
          <tr><th>Seq</th><th>Description</th><th>Document</th><th>Type</th></tr>
          <tr>
            <td>1</td><td>Annual report</td>
            <td><a href="/Archives/edgar/data/320193/000032019318000145/a10-k-index.html">index</a></td>
            <td>10-K</td>
          </tr>
          <tr>
            <td>2</td><td>Annual report</td>
            <td><a href="/Archives/edgar/data/320193/000032019318000145/a10-k20189292018.htm">doc</a></td>
            <td>10-K</td>
          </tr>
        </table>
        </body></html>"#;

    #[test]
    fn primary_link_skips_index_pages() {
        let url = primary_document_link(INDEX_PAGE).unwrap();
        assert_eq!(
            url,
            "https://www.sec.gov/Archives/edgar/data/320193/000032019318000145/a10-k20189292018.htm"
        );
    }

    #[test]
    fn missing_table_is_reported() {
        assert_eq!(
            primary_document_link("<html><body>nothing</body></html>"),
            Err(IndexParseError::NoDocumentTable)
        );
    }

    #[test]
    fn complete_submission_file_wins() {
        let page = r#"
            <table class="tableFile">
              <tr>
                <td>1</td><td>8-K body</td>
                <td><a href="/Archives/edgar/data/1/000000000100/body.htm">doc</a></td>
                <td>8-K</td>
              </tr>
              <tr>
                <td>2</td><td>Complete submission text file</td>
                <td><a href="/Archives/edgar/data/1/000000000100/full.txt">txt</a></td>
                <td></td>
              </tr>
            </table>"#;
        assert_eq!(
            filing_link_from_index(page, "8-K").unwrap(),
            "https://www.sec.gov/Archives/edgar/data/1/000000000100/full.txt"
        );
    }

    #[test]
    fn typed_row_is_fallback() {
        let page = r#"
            <table class="tableFile">
              <tr>
                <td>1</td><td>Press release</td>
                <td><a href="/Archives/edgar/data/1/000000000100/press.htm">doc</a></td>
                <td>8-K</td>
              </tr>
            </table>"#;
        assert_eq!(
            filing_link_from_index(page, "8-K").unwrap(),
            "https://www.sec.gov/Archives/edgar/data/1/000000000100/press.htm"
        );
    }

    #[test]
    fn cleaning_strips_non_content_and_blanks() {
        let html = r#"
            <html><head><style>p { color: red }</style></head>
            <body>
              <script>var x = 1;</script>
              <p>First   line</p>

              <div>Second line</div>
            </body></html>"#;
        let text = clean_filing_html(html);
        assert!(text.contains("First   line"));
        assert!(text.contains("Second line"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color"));
        assert!(!text.contains("\n\n"));
    }
}
