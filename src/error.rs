//! Error handling for the sort pipeline.

use std::io;
use thiserror::Error;

/// Errors raised while sniffing, keying, or sorting an interval file.
#[derive(Error, Debug)]
pub enum SortError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("file has fewer than 3 columns: {line}")]
    TooFewColumns { line: String },

    #[error("unknown file format: {line}")]
    UnknownFormat { line: String },

    #[error("unknown chromosome: {chrom} (known: {known})")]
    UnknownChromosome { chrom: String, known: String },

    #[error("invalid integer in column {column}: {line}")]
    InvalidInteger { column: usize, line: String },

    #[error("missing column {column}: {line}")]
    MissingColumn { column: usize, line: String },

    #[error("{path}:{lineno}: unparseable line: {line}")]
    FileParse {
        path: String,
        lineno: usize,
        line: String,
    },

    #[error("sort worker failed: {message}")]
    WorkerFailed { message: String },
}

impl SortError {
    /// Exit code reported to the shell for this error.
    pub fn exit_code(&self) -> i32 {
        crate::EXIT_FAILURE
    }

    pub fn unknown_chromosome(chrom: &[u8], known: impl IntoIterator<Item = String>) -> Self {
        SortError::UnknownChromosome {
            chrom: String::from_utf8_lossy(chrom).into_owned(),
            known: known.into_iter().collect::<Vec<_>>().join(", "),
        }
    }

    pub fn invalid_integer(column: usize, line: &[u8]) -> Self {
        SortError::InvalidInteger {
            column,
            line: display_line(line),
        }
    }

    pub fn missing_column(column: usize, line: &[u8]) -> Self {
        SortError::MissingColumn {
            column,
            line: display_line(line),
        }
    }

    pub fn worker_failed(message: &str) -> Self {
        SortError::WorkerFailed {
            message: message.to_string(),
        }
    }
}

/// Render a raw line for an error message, without its trailing newline.
pub(crate) fn display_line(line: &[u8]) -> String {
    let end = line
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&line[..end]).into_owned()
}

/// Result type for sort operations.
pub type SortResult<T> = Result<T, SortError>;
