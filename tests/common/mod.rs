#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use covcrawl::error::{CovcrawlError, Result};
use covcrawl::fetch::Fetch;
use rusqlite::Connection;
use tempfile::TempDir;

/// Create a fresh temporary database, returning the connection, dir handle, and db path.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn setup_db() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = covcrawl::db::open(&db_path).unwrap();
    covcrawl::db::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

/// Directory of the on-disk fixture report.
pub fn fixture_site() -> String {
    format!("{}/tests/fixtures/site", env!("CARGO_MANIFEST_DIR"))
}

/// Serves pages from memory and remembers every URL asked for.
#[derive(Default)]
pub struct PageMap {
    pages: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl PageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Fetch for PageMap {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.borrow_mut().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| CovcrawlError::Fetch {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            })
    }
}

/// One body row of a report table: element, link, complexity, missed lines, lines.
pub struct Row<'a> {
    pub element: &'a str,
    pub href: Option<&'a str>,
    pub complexity: u64,
    pub missed_lines: u64,
    pub lines: u64,
}

pub fn row<'a>(element: &'a str, href: &'a str, complexity: u64, missed_lines: u64, lines: u64) -> Row<'a> {
    Row {
        element,
        href: Some(href),
        complexity,
        missed_lines,
        lines,
    }
}

/// A minimal 13-column JaCoCo-style page.
pub fn page(title: &str, rows: &[Row<'_>]) -> String {
    let mut html = format!(
        "<html><body><h1>{}</h1><table class=\"coverage\"><thead><tr>",
        title
    );
    for _ in 0..13 {
        html.push_str("<td>h</td>");
    }
    html.push_str("</tr></thead><tbody>");
    for r in rows {
        let element = match r.href {
            Some(href) => format!("<a href=\"{}\">{}</a>", href, r.element),
            None => r.element.to_string(),
        };
        html.push_str(&format!(
            "<tr><td>{}</td><td></td><td>50%</td><td></td><td>50%</td>\
             <td>0</td><td>{}</td><td>{}</td><td>{}</td><td>0</td><td>1</td><td>0</td><td>1</td></tr>",
            element, r.complexity, r.missed_lines, r.lines
        ));
    }
    html.push_str("</tbody></table></body></html>");
    html
}
