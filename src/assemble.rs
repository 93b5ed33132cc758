//! Groups the flat cell stream of a coverage table into `Record`s.
//!
//! The mapping from column position to record field lives in a
//! `ColumnLayout`, so another report family only needs a different layout.

use crate::error::{CovcrawlError, Result};
use crate::html::Cell;
use crate::model::{Field, Record};

/// Column position → record field, for one report family. Positions with no
/// field (JaCoCo's bar-chart columns) are read and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<Option<Field>>,
}

impl ColumnLayout {
    pub fn new(mapping: impl IntoIterator<Item = (usize, Field)>) -> Self {
        let mut columns: Vec<Option<Field>> = Vec::new();
        for (index, field) in mapping {
            if columns.len() <= index {
                columns.resize(index + 1, None);
            }
            columns[index] = Some(field);
        }
        Self { columns }
    }

    /// The JaCoCo HTML report table:
    ///
    /// | 0       | 1   | 2     | 3   | 4     | 5        | 6    | 7      | 8     | 9      | 10      | 11     | 12      |
    /// |---------|-----|-------|-----|-------|----------|------|--------|-------|--------|---------|--------|---------|
    /// | Element | bar | Cov.  | bar | Cov.  | Missed   | Cxty | Missed | Lines | Missed | Methods | Missed | Classes |
    ///
    /// Class pages stop after column 10; the remaining fields stay empty.
    pub fn jacoco() -> Self {
        Self::new([
            (0, Field::Element),
            (2, Field::InstructionCoverage),
            (4, Field::BranchCoverage),
            (5, Field::MissedBranches),
            (6, Field::Complexity),
            (7, Field::MissedLines),
            (8, Field::Lines),
            (9, Field::MissedMethods),
            (10, Field::Methods),
            (11, Field::MissedClasses),
            (12, Field::Classes),
        ])
    }

    pub fn field_at(&self, column: usize) -> Option<Field> {
        self.columns.get(column).copied().flatten()
    }
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self::jacoco()
    }
}

/// Incremental record builder fed one cell at a time by `html::walk_rows`.
pub struct Assembler<'a> {
    layout: &'a ColumnLayout,
    records: Vec<Record>,
    current: Record,
    column: usize,
    column_count: usize,
}

impl<'a> Assembler<'a> {
    pub fn new(layout: &'a ColumnLayout) -> Self {
        Self {
            layout,
            records: Vec::new(),
            current: Record::default(),
            column: 0,
            column_count: 0,
        }
    }

    /// Feed the next cell. Column 0 starts a record; the cell that brings the
    /// cursor to `column_count` closes it and converts its counts.
    pub fn push(&mut self, cell: Cell, column_count: usize) -> Result<()> {
        if column_count == 0 {
            return Err(CovcrawlError::NoHeaderFound);
        }
        if self.column >= column_count {
            return Err(CovcrawlError::RowLengthMismatch {
                row: self.records.len(),
                expected: column_count,
                found: self.column + 1,
            });
        }
        self.column_count = column_count;

        if self.column == 0 {
            self.current = Record::default();
        }
        if let Some(field) = self.layout.field_at(self.column) {
            self.current.set_field(field, cell);
        }
        self.column += 1;

        if self.column == column_count {
            self.close_record();
        }
        Ok(())
    }

    /// Feed a cell in its `text=...;href=...;` encoding.
    pub fn push_encoded(&mut self, payload: &str, column_count: usize) -> Result<()> {
        let cell: Cell = payload.parse()?;
        self.push(cell, column_count)
    }

    fn close_record(&mut self) {
        let mut record = std::mem::take(&mut self.current);
        for failure in record.convert_counts() {
            tracing::debug!(
                row = self.records.len(),
                element = %record.element,
                error = %failure,
                "count left at zero"
            );
        }
        self.records.push(record);
        self.column = 0;
    }

    /// The assembled records, in table order. Fails if the stream stopped in
    /// the middle of a row.
    pub fn finish(self) -> Result<Vec<Record>> {
        if self.column != 0 {
            return Err(CovcrawlError::RowLengthMismatch {
                row: self.records.len(),
                expected: self.column_count,
                found: self.column,
            });
        }
        Ok(self.records)
    }
}

/// Assemble a complete cell stream.
pub fn assemble<I>(cells: I, column_count: usize, layout: &ColumnLayout) -> Result<Vec<Record>>
where
    I: IntoIterator<Item = Cell>,
{
    let mut assembler = Assembler::new(layout);
    for cell in cells {
        assembler.push(cell, column_count)?;
    }
    assembler.finish()
}

/// Assemble a stream of encoded cell payloads.
pub fn assemble_encoded<'p, I>(
    payloads: I,
    column_count: usize,
    layout: &ColumnLayout,
) -> Result<Vec<Record>>
where
    I: IntoIterator<Item = &'p str>,
{
    let mut assembler = Assembler::new(layout);
    for payload in payloads {
        assembler.push_encoded(payload, column_count)?;
    }
    assembler.finish()
}
