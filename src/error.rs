//! Error types for the sheetstream library

use thiserror::Error;

/// Result type alias for sheetstream operations
pub type Result<T> = std::result::Result<T, SheetError>;

/// Coarse classification of a [`SheetError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File or archive member could not be read
    Io,
    /// Bad magic, wrong substream version/type or a malformed record
    Format,
    /// Encrypted workbooks and other features the decoders refuse
    UnsupportedFeature,
    /// A required package member is absent
    PartMissing,
    /// Bad sheet index or unreachable seek target
    OutOfRange,
}

/// Main error type for all decoding operations
#[derive(Error, Debug)]
pub enum SheetError {
    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The package could not be opened as a zip archive
    #[error("Failed to open archive '{path}': {status}")]
    ZipNotReadable { path: String, status: String },

    /// Malformed structure or record
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// XML pull parser failure inside a package part
    #[error("Malformed XML in '{part}': {source}")]
    Xml {
        part: String,
        #[source]
        source: quick_xml::Error,
    },

    /// Feature not supported
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// A package member the decoder needs is not in the archive
    #[error("Part '{part}' not found in package")]
    PartMissing { part: String },

    /// Invalid sheet index
    #[error("Sheet index {index} out of bounds. Available: {available} sheets")]
    SheetNotFound { index: usize, available: usize },

    /// Seek past the last row
    #[error("Position {position} not found")]
    SeekOutOfRange { position: usize },
}

impl SheetError {
    /// Map the error onto its taxonomy bucket
    pub fn kind(&self) -> ErrorKind {
        match self {
            SheetError::IoError(_) | SheetError::ZipNotReadable { .. } => ErrorKind::Io,
            SheetError::InvalidFormat(_) | SheetError::Xml { .. } => ErrorKind::Format,
            SheetError::NotSupported(_) => ErrorKind::UnsupportedFeature,
            SheetError::PartMissing { .. } => ErrorKind::PartMissing,
            SheetError::SheetNotFound { .. } | SheetError::SeekOutOfRange { .. } => {
                ErrorKind::OutOfRange
            }
        }
    }

    pub(crate) fn xml(part: &str, source: impl Into<quick_xml::Error>) -> Self {
        SheetError::Xml {
            part: part.to_string(),
            source: source.into(),
        }
    }
}
