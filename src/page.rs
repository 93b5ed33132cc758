//! Turning one fetched page into a `Report`: heading, table, records.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::assemble::{Assembler, ColumnLayout};
use crate::error::{CovcrawlError, Result};
use crate::fetch::Fetch;
use crate::html::{self, Document};
use crate::model::Report;

/// Pre-compiled regex for the page heading, `<h1>com.acme</h1>`.
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<h1>(.*?)</h1>").unwrap());

/// The text of the page's single `<h1>`.
pub fn parse_title(body: &str) -> Result<String> {
    let mut titles = TITLE_RE.captures_iter(body);
    let first = titles.next().ok_or(CovcrawlError::TitleNotFound)?;
    let extra = titles.count();
    if extra > 0 {
        return Err(CovcrawlError::MultipleTitlesFound(extra + 1));
    }
    let raw = first.get(1).map_or("", |m| m.as_str());
    Ok(quick_xml::escape::unescape(raw)
        .unwrap_or(Cow::Borrowed(raw))
        .into_owned())
}

/// Parse a page's raw bytes into a `Report`.
pub fn parse_report(body: &[u8], layout: &ColumnLayout) -> Result<Report> {
    let text = String::from_utf8_lossy(body);
    let mut report = Report::new(parse_title(&text)?);

    let doc = Document::parse(body)?;
    let table = html::extract_table(&doc)?;

    let mut assembler = Assembler::new(layout);
    html::walk_rows(table, |cell, column_count| assembler.push(cell, column_count))?;
    report.records = assembler.finish()?;

    Ok(report)
}

/// Fetch `url` and parse it into a `Report`.
pub fn fetch_report(fetcher: &dyn Fetch, url: &str, layout: &ColumnLayout) -> Result<Report> {
    let body = fetcher.fetch(url)?;
    parse_report(&body, layout)
}
