use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;

use crate::error::{CovcrawlError, Result};
use crate::model::{Record, Report, REPORT_DATE_FORMAT};

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open (or create) the snapshot database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized DB.
/// A database written by a different schema version is rejected.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    match version {
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION => {}
        Some(v) if v > SCHEMA_VERSION => {
            return Err(CovcrawlError::Other(format!(
                "Database schema version {} is newer than this binary supports ({}). \
                 Please upgrade covcrawl.",
                v, SCHEMA_VERSION
            )));
        }
        Some(v) => {
            return Err(CovcrawlError::Other(format!(
                "Database schema version {} is older than {} and cannot be upgraded. \
                 Delete the database and crawl again.",
                v, SCHEMA_VERSION
            )));
        }
    }
    Ok(())
}

/// Stored crawl metadata.
#[derive(Debug)]
pub struct SnapshotInfo {
    pub name: String,
    pub source_url: String,
    pub created_at: String,
    pub pages: u64,
    pub failures: u64,
}

/// Store a crawled report tree under `name`. Returns the snapshot id.
///
/// Fails if the name is taken, unless `overwrite` is set, in which case the
/// old snapshot is replaced.
pub fn insert_snapshot(
    conn: &mut Connection,
    name: &str,
    source_url: &str,
    report: &Report,
    failures: usize,
    overwrite: bool,
) -> Result<i64> {
    let tx = conn.transaction()?;

    if overwrite {
        tx.execute("DELETE FROM snapshot WHERE name = ?1", params![name])?;
    }

    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO snapshot (name, source_url, created_at, pages, failures) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            source_url,
            now,
            report.page_count() as i64,
            failures as i64
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CovcrawlError::Other(format!(
                "Snapshot '{}' already exists. Use --name to choose a different name, \
                 or --overwrite to replace it.",
                name
            ))
        }
        other => CovcrawlError::Sqlite(other),
    })?;
    let snapshot_id = tx.last_insert_rowid();

    insert_page(&tx, snapshot_id, None, report)?;

    tx.commit()?;
    Ok(snapshot_id)
}

fn insert_page(
    tx: &Transaction,
    snapshot_id: i64,
    parent_record_id: Option<i64>,
    report: &Report,
) -> Result<()> {
    tx.execute(
        "INSERT INTO page (snapshot_id, parent_record_id, title, generated_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            snapshot_id,
            parent_record_id,
            report.title,
            report.generated_at.format(REPORT_DATE_FORMAT).to_string(),
        ],
    )?;
    let page_id = tx.last_insert_rowid();

    for (position, record) in report.records.iter().enumerate() {
        let record_id = {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO record (page_id, position, element, href, instruction_coverage, \
                 branch_coverage, missed_branches, complexity, missed_lines, lines, \
                 missed_methods, methods, missed_classes, classes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            stmt.execute(params![
                page_id,
                position as i64,
                record.element,
                record.href,
                record.instruction_coverage,
                record.branch_coverage,
                record.missed_branches,
                record.complexity,
                record.missed_lines,
                record.lines,
                record.missed_methods,
                record.methods,
                record.missed_classes,
                record.classes,
            ])?;
            tx.last_insert_rowid()
        };

        if let Some(child) = record.child.as_deref() {
            insert_page(tx, snapshot_id, Some(record_id), child)?;
        }
    }
    Ok(())
}

fn snapshot_id(conn: &Connection, name: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM snapshot WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .map_err(|_| CovcrawlError::SnapshotNotFound(name.to_string()))
}

/// Rebuild the report tree stored under `name`. Derived counters are
/// recomputed from the stored raw strings.
pub fn load_snapshot(conn: &Connection, name: &str) -> Result<Report> {
    let id = snapshot_id(conn, name)?;
    let root_page: i64 = conn
        .query_row(
            "SELECT id FROM page WHERE snapshot_id = ?1 AND parent_record_id IS NULL",
            params![id],
            |row| row.get(0),
        )
        .map_err(|_| CovcrawlError::Other(format!("Snapshot '{}' has no root page", name)))?;
    load_page(conn, root_page)
}

fn load_page(conn: &Connection, page_id: i64) -> Result<Report> {
    let (title, generated_at): (String, String) = conn.query_row(
        "SELECT title, generated_at FROM page WHERE id = ?1",
        params![page_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let generated_at = NaiveDateTime::parse_from_str(&generated_at, REPORT_DATE_FORMAT)
        .map_err(|e| CovcrawlError::Parse(format!("bad page date {:?}: {}", generated_at, e)))?;

    let mut stmt = conn.prepare_cached(
        "SELECT id, element, href, instruction_coverage, branch_coverage, missed_branches, \
         complexity, missed_lines, lines, missed_methods, methods, missed_classes, classes \
         FROM record WHERE page_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![page_id], |row| {
        let record = Record {
            element: row.get(1)?,
            href: row.get(2)?,
            instruction_coverage: row.get(3)?,
            branch_coverage: row.get(4)?,
            missed_branches: row.get(5)?,
            complexity: row.get(6)?,
            missed_lines: row.get(7)?,
            lines: row.get(8)?,
            missed_methods: row.get(9)?,
            methods: row.get(10)?,
            missed_classes: row.get(11)?,
            classes: row.get(12)?,
            ..Default::default()
        };
        Ok((row.get::<_, i64>(0)?, record))
    })?;
    let mut stored = Vec::new();
    for row in rows {
        stored.push(row?);
    }
    drop(stmt);

    let mut records = Vec::with_capacity(stored.len());
    for (record_id, mut record) in stored {
        // Failures were already reported when the page was first crawled.
        let _ = record.convert_counts();
        let child_page: Option<i64> = conn
            .query_row(
                "SELECT id FROM page WHERE parent_record_id = ?1",
                params![record_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(child_page) = child_page {
            record.child = Some(Box::new(load_page(conn, child_page)?));
        }
        records.push(record);
    }

    Ok(Report {
        title,
        generated_at,
        records,
    })
}

/// All stored snapshots, oldest first.
pub fn list_snapshots(conn: &Connection) -> Result<Vec<SnapshotInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, source_url, created_at, pages, failures FROM snapshot \
         ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SnapshotInfo {
            name: row.get(0)?,
            source_url: row.get(1)?,
            created_at: row.get(2)?,
            pages: row.get(3)?,
            failures: row.get(4)?,
        })
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Return the name of the most recently created snapshot, if any.
pub fn latest_snapshot_name(conn: &Connection) -> Result<Option<String>> {
    let name = conn
        .query_row(
            "SELECT name FROM snapshot ORDER BY created_at DESC, id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name)
}

/// Delete a snapshot. Its pages and records go with it via ON DELETE CASCADE.
pub fn delete_snapshot(conn: &mut Connection, name: &str) -> Result<()> {
    let tx = conn.transaction()?;
    let id = snapshot_id(&tx, name)?;
    tx.execute("DELETE FROM snapshot WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(())
}
