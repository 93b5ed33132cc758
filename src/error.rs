use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovcrawlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("XML parse error at position {position}: {source}")]
    Xml {
        source: quick_xml::Error,
        position: usize,
    },

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Title not found")]
    TitleNotFound,

    #[error("Multiple titles found ({0})")]
    MultipleTitlesFound(usize),

    #[error("Elements nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("Coverage table not found")]
    TableNotFound,

    #[error("No header found in coverage table")]
    NoHeaderFound,

    #[error("Malformed cell payload: {0:?}")]
    MalformedCell(String),

    #[error("Row {row} has {found} cells, expected {expected}")]
    RowLengthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Cannot convert {field} value {value:?} to an integer")]
    NumericConversion { field: &'static str, value: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl CovcrawlError {
    /// Errors that make a single page unusable. The crawler counts these and
    /// moves on instead of aborting.
    #[must_use]
    pub fn is_page_structural(&self) -> bool {
        matches!(
            self,
            CovcrawlError::TitleNotFound
                | CovcrawlError::MultipleTitlesFound(_)
                | CovcrawlError::NestingTooDeep(_)
                | CovcrawlError::TableNotFound
                | CovcrawlError::NoHeaderFound
                | CovcrawlError::MalformedCell(_)
                | CovcrawlError::RowLengthMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CovcrawlError>;
