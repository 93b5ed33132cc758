//! In-memory representation of a crawled coverage report tree. Pages become
//! `Report`s, table rows become `Record`s, and a record that links to a
//! deeper page owns that page's `Report` once the crawler has fetched it.

use chrono::{Local, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::error::CovcrawlError;
use crate::html::Cell;

/// Format of `report_date` in serialized output and in the snapshot store.
pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Link fragment identifying a per-line source listing (the leaves of the
/// hierarchy: methods pointing into `Foo.java.html#L42`).
pub const SOURCE_ANCHOR: &str = ".java.html#";

/// One parsed coverage page.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(rename = "report_title")]
    pub title: String,
    #[serde(rename = "report_date", serialize_with = "serialize_date")]
    pub generated_at: NaiveDateTime,
    #[serde(rename = "report_content")]
    pub records: Vec<Record>,
}

impl Report {
    /// A report stamped with the current local time.
    pub fn new(title: String) -> Self {
        Self {
            title,
            generated_at: Local::now().naive_local(),
            records: Vec::new(),
        }
    }

    /// Number of pages in this tree, including this one.
    #[must_use]
    pub fn page_count(&self) -> usize {
        1 + self
            .records
            .iter()
            .filter_map(|r| r.child.as_deref())
            .map(Report::page_count)
            .sum::<usize>()
    }
}

fn serialize_date<S: Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&date.format(REPORT_DATE_FORMAT))
}

fn serialize_href<S: Serializer>(href: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(href.as_deref().unwrap_or(""))
}

/// A named field of a coverage row. Which column feeds which field is
/// decided by `assemble::ColumnLayout`, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Element label plus its drill-down link.
    Element,
    InstructionCoverage,
    BranchCoverage,
    MissedBranches,
    Complexity,
    MissedLines,
    Lines,
    MissedMethods,
    Methods,
    MissedClasses,
    Classes,
}

impl Field {
    /// The eight count fields that carry a derived integer.
    pub const COUNTS: [Field; 8] = [
        Field::MissedBranches,
        Field::Complexity,
        Field::MissedLines,
        Field::Lines,
        Field::MissedMethods,
        Field::Methods,
        Field::MissedClasses,
        Field::Classes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Element => "element",
            Field::InstructionCoverage => "instruction_coverage",
            Field::BranchCoverage => "branch_coverage",
            Field::MissedBranches => "missed_branches",
            Field::Complexity => "complexity",
            Field::MissedLines => "missed_lines",
            Field::Lines => "lines",
            Field::MissedMethods => "missed_methods",
            Field::Methods => "methods",
            Field::MissedClasses => "missed_classes",
            Field::Classes => "classes",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer counterparts of a record's count strings. A field whose string
/// did not parse stays at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub missed_branches: u64,
    pub complexity: u64,
    pub missed_lines: u64,
    pub lines: u64,
    pub missed_methods: u64,
    pub methods: u64,
    pub missed_classes: u64,
    pub classes: u64,
}

impl Counts {
    fn set(&mut self, field: Field, value: u64) {
        match field {
            Field::MissedBranches => self.missed_branches = value,
            Field::Complexity => self.complexity = value,
            Field::MissedLines => self.missed_lines = value,
            Field::Lines => self.lines = value,
            Field::MissedMethods => self.missed_methods = value,
            Field::Methods => self.methods = value,
            Field::MissedClasses => self.missed_classes = value,
            Field::Classes => self.classes = value,
            Field::Element | Field::InstructionCoverage | Field::BranchCoverage => {}
        }
    }
}

/// One row of a coverage table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record {
    pub element: String,
    #[serde(serialize_with = "serialize_href")]
    pub href: Option<String>,
    #[serde(rename = "instruct_coverage")]
    pub instruction_coverage: String,
    pub branch_coverage: String,
    #[serde(rename = "missed_branch")]
    pub missed_branches: String,
    pub complexity: String,
    #[serde(rename = "missed_method")]
    pub missed_methods: String,
    #[serde(rename = "number_of_method")]
    pub methods: String,
    #[serde(rename = "missed_line")]
    pub missed_lines: String,
    #[serde(rename = "number_of_line")]
    pub lines: String,
    #[serde(rename = "missed_class")]
    pub missed_classes: String,
    #[serde(rename = "number_of_class")]
    pub classes: String,
    #[serde(skip)]
    pub counts: Counts,
    #[serde(rename = "sub_report", skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<Report>>,
}

impl Record {
    /// Store a cell's content in `field`. Only `Field::Element` keeps the link.
    pub fn set_field(&mut self, field: Field, cell: Cell) {
        if field == Field::Element {
            self.element = cell.text;
            self.href = cell.href;
        } else if let Some(slot) = self.text_slot_mut(field) {
            *slot = cell.text;
        }
    }

    /// Raw display text of a field as it appeared on the page.
    pub fn raw(&self, field: Field) -> &str {
        match field {
            Field::Element => &self.element,
            Field::InstructionCoverage => &self.instruction_coverage,
            Field::BranchCoverage => &self.branch_coverage,
            Field::MissedBranches => &self.missed_branches,
            Field::Complexity => &self.complexity,
            Field::MissedLines => &self.missed_lines,
            Field::Lines => &self.lines,
            Field::MissedMethods => &self.missed_methods,
            Field::Methods => &self.methods,
            Field::MissedClasses => &self.missed_classes,
            Field::Classes => &self.classes,
        }
    }

    fn text_slot_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Element => None,
            Field::InstructionCoverage => Some(&mut self.instruction_coverage),
            Field::BranchCoverage => Some(&mut self.branch_coverage),
            Field::MissedBranches => Some(&mut self.missed_branches),
            Field::Complexity => Some(&mut self.complexity),
            Field::MissedLines => Some(&mut self.missed_lines),
            Field::Lines => Some(&mut self.lines),
            Field::MissedMethods => Some(&mut self.missed_methods),
            Field::Methods => Some(&mut self.methods),
            Field::MissedClasses => Some(&mut self.missed_classes),
            Field::Classes => Some(&mut self.classes),
        }
    }

    /// Recompute `counts` from the raw strings.
    ///
    /// Never fails: each field that does not parse is left at zero and
    /// reported back as a `NumericConversion` error. Fields that are empty
    /// (the column is absent from this page's layout) are skipped silently.
    pub fn convert_counts(&mut self) -> Vec<CovcrawlError> {
        let mut counts = Counts::default();
        let mut failures = Vec::new();
        for field in Field::COUNTS {
            let raw = self.raw(field);
            if raw.trim().is_empty() {
                continue;
            }
            match parse_count(raw) {
                Some(value) => counts.set(field, value),
                None => failures.push(CovcrawlError::NumericConversion {
                    field: field.as_str(),
                    value: raw.to_string(),
                }),
            }
        }
        self.counts = counts;
        failures
    }

    /// Whether the crawler should follow this record's link: present and not
    /// an in-page anchor.
    #[must_use]
    pub fn is_navigable(&self) -> bool {
        matches!(self.href.as_deref(), Some(href) if !href.is_empty() && !href.contains('#'))
    }

    /// Whether this record links into a per-line source listing.
    #[must_use]
    pub fn is_source_anchor(&self) -> bool {
        self.href
            .as_deref()
            .is_some_and(|href| href.contains(SOURCE_ANCHOR))
    }

    /// `1 - missed/total` over lines, or `None` when the line total is zero.
    #[must_use]
    pub fn line_coverage(&self) -> Option<f64> {
        if self.counts.lines == 0 {
            None
        } else {
            Some(1.0 - self.counts.missed_lines as f64 / self.counts.lines as f64)
        }
    }
}

/// Parse a count as displayed by JaCoCo, which may group digits with commas.
fn parse_count(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.contains(',') {
        trimmed.replace(',', "").parse().ok()
    } else {
        trimmed.parse().ok()
    }
}
