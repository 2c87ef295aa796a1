use thiserror::Error;

/// Main error type for the crawler.
/// Groups the pipeline failures first, then errors bubbled up from dependencies and helper modules.
#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("{0}")]
    WithContextError(String),

    // Pipeline errors
    #[error("Retrieve '{url}' failed: {cause}")]
    Retrieval { url: String, cause: String },

    #[error("Unrecognized format for '{0}'")]
    UnrecognizedFormat(String),

    #[error("Structure declares {expected} columns but data has {actual}")]
    StructureMismatch { expected: usize, actual: usize },

    #[error("Table '{table}' row count mismatch: built {expected}, stored {actual}")]
    RowIntegrity {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid selector for table '{table}': {message}")]
    Selector { table: String, message: String },

    #[error("Invalid job file '{file}': {message}")]
    JobFormat { file: String, message: String },

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    GlobError(#[from] glob::GlobError),

    // Third-party library errors
    #[error("{0}")]
    DuckDBError(#[from] duckdb::Error),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    RarError(#[from] unrar::error::UnrarError),

    #[error("{0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),
}

pub type Result<T> = std::result::Result<T, CrawlerError>;

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for std::result::Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| CrawlerError::WithContextError(format!("{}: {}", message, e)))
    }
}
