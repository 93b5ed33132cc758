//! Questions asked of a crawled report tree.
//!
//! Depth in the tree is recognized from link shapes rather than counted:
//! a record linking into `Foo.java.html#L42` is a method, and a record whose
//! child page lists such methods is a class.

use std::collections::VecDeque;

use crate::model::{Record, Report};

/// Method-level records (linking into a per-line source listing) whose
/// complexity is strictly above `threshold`, in breadth-first order.
pub fn find_high_complexity(root: &Report, threshold: u64) -> Vec<&Record> {
    let mut found = Vec::new();
    let mut queue: VecDeque<&Record> = root.records.iter().collect();

    while let Some(record) = queue.pop_front() {
        if record.is_source_anchor() && record.counts.complexity > threshold {
            found.push(record);
        }
        if let Some(child) = record.child.as_deref() {
            queue.extend(child.records.iter());
        }
    }
    found
}

/// Whether `record` is a class: its child page is non-empty and the first
/// row of that page links into a per-line source listing.
#[must_use]
pub fn is_class_level(record: &Record) -> bool {
    record
        .child
        .as_deref()
        .and_then(|child| child.records.first())
        .is_some_and(Record::is_source_anchor)
}

/// Class-level records whose line coverage is strictly below `threshold`
/// (a ratio in `0.0..=1.0`), in breadth-first order.
///
/// Classes are not descended into. Classes with no lines are skipped.
pub fn find_low_coverage_classes(root: &Report, threshold: f64) -> Vec<&Record> {
    let mut found = Vec::new();
    let mut queue: VecDeque<&Record> = root.records.iter().collect();

    while let Some(record) = queue.pop_front() {
        let Some(child) = record.child.as_deref() else {
            continue;
        };
        if is_class_level(record) {
            if record.line_coverage().is_some_and(|coverage| coverage < threshold) {
                found.push(record);
            }
        } else {
            queue.extend(child.records.iter());
        }
    }
    found
}
