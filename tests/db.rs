mod common;

use covcrawl::cli;
use covcrawl::crawl::{self, CrawlOptions};
use covcrawl::db;
use covcrawl::error::CovcrawlError;
use covcrawl::fetch::FileFetcher;
use covcrawl::model::Report;
use covcrawl::query;

fn crawl_fixture() -> (Report, usize) {
    let (root, summary) =
        crawl::crawl_location(&FileFetcher, &common::fixture_site(), CrawlOptions::default())
            .unwrap();
    (root, summary.failure_count())
}

fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn test_snapshot_round_trip() {
    let (mut conn, _dir, _path) = common::setup_db();
    let (root, failures) = crawl_fixture();

    db::insert_snapshot(&mut conn, "nightly", "target/site/jacoco", &root, failures, false)
        .unwrap();
    let loaded = db::load_snapshot(&conn, "nightly").unwrap();

    assert_eq!(
        serde_json::to_value(&loaded).unwrap(),
        serde_json::to_value(&root).unwrap()
    );
    assert_eq!(loaded.page_count(), 4);

    // Derived counts are rebuilt on load.
    let foo = &loaded.records[0].child.as_ref().unwrap().records[0];
    assert_eq!(foo.counts.lines, 23);
    assert_eq!(foo.counts.missed_lines, 6);
    assert_eq!(
        query::find_high_complexity(&loaded, 10).len(),
        query::find_high_complexity(&root, 10).len()
    );
}

#[test]
fn test_list_and_latest_snapshots() {
    let (mut conn, _dir, _path) = common::setup_db();
    assert!(db::latest_snapshot_name(&conn).unwrap().is_none());

    let (root, failures) = crawl_fixture();
    db::insert_snapshot(&mut conn, "monday", "site", &root, failures, false).unwrap();
    db::insert_snapshot(&mut conn, "tuesday", "site", &root, failures, false).unwrap();

    let snapshots = db::list_snapshots(&conn).unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].name, "monday");
    assert_eq!(snapshots[0].pages, 4);
    assert_eq!(snapshots[0].failures, 1);
    assert_eq!(snapshots[0].source_url, "site");
    assert_eq!(db::latest_snapshot_name(&conn).unwrap().as_deref(), Some("tuesday"));
}

#[test]
fn test_duplicate_snapshot_name() {
    let (mut conn, _dir, _path) = common::setup_db();
    let (root, failures) = crawl_fixture();

    db::insert_snapshot(&mut conn, "nightly", "site", &root, failures, false).unwrap();
    let err = db::insert_snapshot(&mut conn, "nightly", "site", &root, failures, false)
        .unwrap_err();
    assert!(format!("{err}").contains("already exists"), "{err}");
    // The failed insert left nothing behind.
    assert_eq!(count(&conn, "page"), 4);
}

#[test]
fn test_overwrite_snapshot() {
    let (mut conn, _dir, _path) = common::setup_db();
    let (root, failures) = crawl_fixture();
    db::insert_snapshot(&mut conn, "nightly", "site", &root, failures, false).unwrap();

    let mut smaller = Report::new("acme-core".to_string());
    smaller.records.push(root.records[1].clone());
    db::insert_snapshot(&mut conn, "nightly", "elsewhere", &smaller, 0, true).unwrap();

    let snapshots = db::list_snapshots(&conn).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].source_url, "elsewhere");
    assert_eq!(count(&conn, "page"), 1);
    assert_eq!(count(&conn, "record"), 1);
}

#[test]
fn test_delete_snapshot_cascades() {
    let (mut conn, _dir, _path) = common::setup_db();
    let (root, failures) = crawl_fixture();
    db::insert_snapshot(&mut conn, "nightly", "site", &root, failures, false).unwrap();
    assert!(count(&conn, "record") > 0);

    db::delete_snapshot(&mut conn, "nightly").unwrap();
    assert_eq!(count(&conn, "snapshot"), 0);
    assert_eq!(count(&conn, "page"), 0);
    assert_eq!(count(&conn, "record"), 0);

    let err = db::delete_snapshot(&mut conn, "nightly").unwrap_err();
    assert!(matches!(err, CovcrawlError::SnapshotNotFound(ref n) if n == "nightly"));
}

#[test]
fn test_load_missing_snapshot() {
    let (conn, _dir, _path) = common::setup_db();
    let err = db::load_snapshot(&conn, "nope").unwrap_err();
    assert!(matches!(err, CovcrawlError::SnapshotNotFound(_)));
}

#[test]
fn test_reopen_database() {
    let (mut conn, _dir, path) = common::setup_db();
    let (root, failures) = crawl_fixture();
    db::insert_snapshot(&mut conn, "nightly", "site", &root, failures, false).unwrap();
    drop(conn);

    let conn = db::open(&path).unwrap();
    db::init_schema(&conn).unwrap();
    let version: u32 = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, db::SCHEMA_VERSION);
    assert_eq!(db::load_snapshot(&conn, "nightly").unwrap().page_count(), 4);
}

#[test]
fn test_newer_schema_is_rejected() {
    let (conn, _dir, _path) = common::setup_db();
    conn.execute("UPDATE schema_version SET version = ?1", [db::SCHEMA_VERSION + 1])
        .unwrap();
    let err = db::init_schema(&conn).unwrap_err();
    assert!(format!("{err}").contains("newer"), "{err}");
}

#[test]
fn test_older_schema_is_rejected() {
    let (conn, _dir, _path) = common::setup_db();
    conn.execute("UPDATE schema_version SET version = ?1", [db::SCHEMA_VERSION - 1])
        .unwrap();
    let err = db::init_schema(&conn).unwrap_err();
    assert!(format!("{err}").contains("older"), "{err}");
}

#[test]
fn test_export_snapshot_json() {
    let (mut conn, dir, _path) = common::setup_db();
    let (root, failures) = crawl_fixture();
    db::insert_snapshot(&mut conn, "nightly", "site", &root, failures, false).unwrap();

    let out_path = dir.path().join("nightly.json");
    let out = cli::cmd_export(&conn, None, &out_path).unwrap();
    assert!(out.contains("'nightly' (4 pages)"), "{out}");

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(json["report_title"], "acme-core");
    let acme = &json["report_content"][0];
    assert_eq!(acme["element"], "com.acme");
    assert_eq!(acme["number_of_class"], "2");
    assert_eq!(acme["sub_report"]["report_title"], "com.acme");
    // Unvisited pages have no sub_report.
    assert!(json["report_content"][1].get("sub_report").is_none());
    // Method rows: anchors kept, class columns empty.
    let method = &acme["sub_report"]["report_content"][0]["sub_report"]["report_content"][0];
    assert_eq!(method["href"], "Foo.java.html#L12");
    assert_eq!(method["number_of_class"], "");
}
