//! Error taxonomy for a single savegame parse

use std::fmt;
use std::io;
use thiserror::Error;

use crate::writer::StoreError;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Read,
    Decompress,
    Tokenize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Open => write!(f, "open"),
            Stage::Read => write!(f, "read"),
            Stage::Decompress => write!(f, "decompress"),
            Stage::Tokenize => write!(f, "tokenize"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

/// Terminal failure of one savegame parse.
///
/// Batches flushed before the failure stay committed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{file}: cannot read savegame ({stage}): {source}")]
    SourceIo {
        file: String,
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("{file}: corrupt gzip stream: {source}")]
    Decompression {
        file: String,
        #[source]
        source: io::Error,
    },

    #[error("{file}: malformed document at byte {position}: {message}")]
    MalformedDocument {
        file: String,
        position: u64,
        message: String,
    },

    #[error("{file}: persistence failed while {operation}: {source}")]
    Persistence {
        file: String,
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    pub fn stage(&self) -> Stage {
        match self {
            IngestError::SourceIo { stage, .. } => *stage,
            IngestError::Decompression { .. } => Stage::Decompress,
            IngestError::MalformedDocument { .. } => Stage::Tokenize,
            IngestError::Persistence { .. } => Stage::Persist,
        }
    }

    /// Name of the savegame file the error belongs to
    pub fn file(&self) -> &str {
        match self {
            IngestError::SourceIo { file, .. }
            | IngestError::Decompression { file, .. }
            | IngestError::MalformedDocument { file, .. }
            | IngestError::Persistence { file, .. } => file,
        }
    }
}
