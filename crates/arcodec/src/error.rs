use std::io;
use std::path::PathBuf;

use crate::format::FormatName;

/// Direction a codec was asked to work in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Decode,
    Encode,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode => f.write_str("decode"),
            Self::Encode => f.write_str("encode"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no registered format matches the stream")]
    NoMatch,

    #[error("unknown format '{name}'")]
    UnknownFormat { name: String },

    #[error("cannot {operation} '{format}': {reason}")]
    UnsupportedOperation {
        format: FormatName,
        operation: Operation,
        reason: &'static str,
    },

    #[error("malformed '{format}' stream: {source}")]
    Format { format: FormatName, source: io::Error },

    #[error("zip-slip attack detected: entry '{entry}' resolves to '{resolved}'")]
    PathEscape { entry: String, resolved: PathBuf },

    #[error("symlink target escapes base directory: '{target}' -> '{resolved}'")]
    SymlinkEscape { target: PathBuf, resolved: PathBuf },

    #[error("invalid {field}: {reason}")]
    Configuration { field: &'static str, reason: String },

    #[error("entry path contains null byte")]
    InvalidPath,

    #[error("strip_components({count}) removed all path components from '{original}'")]
    NoComponentsRemaining { original: PathBuf, count: usize },

    #[error("failed to extract '{path}': {source}")]
    Extraction { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Coarse classification of [`Error`] for callers that branch per entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NoMatch,
    NotFound,
    Unsupported,
    Format,
    PathEscape,
    Configuration,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMatch => ErrorKind::NoMatch,
            Self::UnknownFormat { .. } => ErrorKind::NotFound,
            Self::UnsupportedOperation { .. } => ErrorKind::Unsupported,
            Self::Format { .. } => ErrorKind::Format,
            Self::PathEscape { .. }
            | Self::SymlinkEscape { .. }
            | Self::InvalidPath
            | Self::NoComponentsRemaining { .. } => ErrorKind::PathEscape,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Extraction { .. } | Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn format(format: &FormatName, source: impl Into<io::Error>) -> Self {
        Self::Format {
            format: format.clone(),
            source: source.into(),
        }
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
