//! Command handler functions for the covcrawl CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::crawl::{self, CrawlOptions};
use crate::fetch::Fetch;
use crate::model::Report;
use crate::{db, project, query};

/// Inputs to `cmd_crawl`.
pub struct CrawlArgs<'a> {
    /// Report root: a directory, a base URL, or the root `index.html`.
    pub location: &'a str,
    /// Snapshot name. Defaults to the project's report name, then the root
    /// page title.
    pub name: Option<&'a str>,
    /// Ant build descriptor used to name the snapshot.
    pub project: Option<&'a Path>,
    pub options: CrawlOptions,
    /// Also write the crawled tree here as JSON.
    pub json: Option<&'a Path>,
    pub overwrite: bool,
}

fn resolve_snapshot_name(conn: &Connection, name: Option<&str>) -> Result<String> {
    match name {
        Some(n) => Ok(n.to_string()),
        None => db::latest_snapshot_name(conn)?
            .ok_or_else(|| anyhow::anyhow!("No snapshots found in database. Run `covcrawl crawl` first.")),
    }
}

fn write_json(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn cmd_crawl(conn: &mut Connection, fetcher: &dyn Fetch, args: CrawlArgs<'_>) -> Result<String> {
    let project_name = match args.project {
        Some(path) => {
            let project = project::parse_file(path)
                .with_context(|| format!("Failed to read build descriptor {}", path.display()))?;
            Some(project.report_name().to_string())
        }
        None => None,
    };

    let (root, summary) = crawl::crawl_location(fetcher, args.location, args.options)
        .with_context(|| format!("Failed to read report root at {}", args.location))?;

    let name = args
        .name
        .map(str::to_string)
        .or(project_name)
        .unwrap_or_else(|| root.title.clone());
    let snapshot_id = db::insert_snapshot(
        conn,
        &name,
        args.location,
        &root,
        summary.failure_count(),
        args.overwrite,
    )?;

    let mut out = String::new();
    writeln!(
        out,
        "Crawled {} → snapshot '{}' (id {})",
        args.location, name, snapshot_id
    )
    .unwrap();
    writeln!(out, "Pages:      {}", root.page_count()).unwrap();
    writeln!(out, "Failures:   {}", summary.failure_count()).unwrap();
    if summary.skipped > 0 {
        writeln!(out, "Skipped:    {} (links back to an ancestor page)", summary.skipped).unwrap();
    }
    if !summary.is_complete() {
        writeln!(
            out,
            "Stopped early; {} queued pages were not visited.",
            summary.abandoned
        )
        .unwrap();
    }
    for failure in &summary.failures {
        writeln!(out, "  ✗ {}: {}", failure.url, failure.error).unwrap();
    }

    if let Some(path) = args.json {
        write_json(path, &root)?;
        writeln!(out, "Wrote {}", path.display()).unwrap();
    }
    Ok(out)
}

pub fn cmd_complexity(conn: &Connection, snapshot: Option<&str>, threshold: u64) -> Result<String> {
    let name = resolve_snapshot_name(conn, snapshot)?;
    let report = db::load_snapshot(conn, &name)?;
    let found = query::find_high_complexity(&report, threshold);

    if found.is_empty() {
        return Ok(format!(
            "No methods with complexity above {} in '{}'.\n",
            threshold, name
        ));
    }

    let mut out = String::new();
    writeln!(out, "{:<50} {:>6}  LINK", "METHOD", "CXTY").unwrap();
    writeln!(out, "{}", "-".repeat(88)).unwrap();
    for record in &found {
        writeln!(
            out,
            "{:<50} {:>6}  {}",
            record.element,
            record.counts.complexity,
            record.href.as_deref().unwrap_or("")
        )
        .unwrap();
    }
    writeln!(out, "({} methods)", found.len()).unwrap();
    Ok(out)
}

pub fn cmd_low_coverage(conn: &Connection, snapshot: Option<&str>, threshold: f64) -> Result<String> {
    let name = resolve_snapshot_name(conn, snapshot)?;
    let report = db::load_snapshot(conn, &name)?;
    let found = query::find_low_coverage_classes(&report, threshold);

    if found.is_empty() {
        return Ok(format!(
            "No classes below {:.1}% line coverage in '{}'.\n",
            threshold * 100.0,
            name
        ));
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<50} {:>8} {:>8} {:>8}",
        "CLASS", "LINES", "MISSED", "RATE"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(77)).unwrap();
    for record in &found {
        writeln!(
            out,
            "{:<50} {:>8} {:>8} {:>7.1}%",
            record.element,
            record.counts.lines,
            record.counts.missed_lines,
            record.line_coverage().unwrap_or(0.0) * 100.0
        )
        .unwrap();
    }
    writeln!(out, "({} classes)", found.len()).unwrap();
    Ok(out)
}

pub fn cmd_snapshots(conn: &Connection) -> Result<String> {
    let snapshots = db::list_snapshots(conn)?;
    if snapshots.is_empty() {
        return Ok("No snapshots in database.\n".to_string());
    }
    let mut out = String::new();
    writeln!(
        out,
        "{:<30} {:>6} {:>9}  CREATED",
        "NAME", "PAGES", "FAILURES"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(80)).unwrap();
    for s in &snapshots {
        writeln!(
            out,
            "{:<30} {:>6} {:>9}  {}",
            s.name, s.pages, s.failures, s.created_at
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_export(conn: &Connection, snapshot: Option<&str>, output: &Path) -> Result<String> {
    let name = resolve_snapshot_name(conn, snapshot)?;
    let report = db::load_snapshot(conn, &name)?;
    write_json(output, &report)?;
    Ok(format!(
        "Wrote snapshot '{}' ({} pages) to {}\n",
        name,
        report.page_count(),
        output.display()
    ))
}

pub fn cmd_delete(conn: &mut Connection, name: &str) -> Result<String> {
    db::delete_snapshot(conn, name)?;
    Ok(format!("Deleted snapshot '{}'\n", name))
}
