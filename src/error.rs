use std::io;
use std::sync::Arc;
use thiserror::Error;

use crate::schema::QualitySchema;

/// Position in the decoded byte stream where a failure was observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoContext {
    pub byte_pos: u64,
    pub line_num: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("expected header '@' at start of record")]
    MissingHeader,
    #[error("found FASTA header '>' where FASTQ '@' expected")]
    FastaHeaderDetected,
    #[error("missing '+' separator line")]
    MissingPlus,
    #[error("unexpected EOF inside record")]
    UnexpectedEof,
    #[error("quality length ({qual}) does not match sequence length ({seq})")]
    LengthMismatch { seq: usize, qual: usize },
    #[error("empty sequence")]
    EmptySequence,
    #[error("record identifier is not valid UTF-8")]
    InvalidIdentifier,
}

/// A quality byte that the selected schema does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "quality byte {byte} ({:?}) at position {position} outside {schema} range [{lower}, {upper}]",
    as_char(.byte)
)]
pub struct SchemaViolation {
    pub schema: QualitySchema,
    pub byte: u8,
    pub position: usize,
    pub lower: u8,
    pub upper: u8,
}

fn as_char(b: &u8) -> char {
    char::from(*b)
}

#[derive(Debug, Clone, Error)]
pub enum FastqError {
    #[error("I/O error at {ctx:?}: {source}")]
    Io {
        #[source]
        source: Arc<io::Error>,
        ctx: IoContext,
    },
    #[error("format error at {ctx:?}: {source}")]
    Format {
        #[source]
        source: FormatError,
        ctx: IoContext,
    },
    #[error("decompression failed in block {block}: {source}")]
    Decompression {
        block: u64,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("schema violation: {0}")]
    Schema(#[from] SchemaViolation),
    #[error("index {index} out of range for batch of {len} records")]
    Index { index: usize, len: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported input: {0}")]
    Unsupported(&'static str),
    /// Clean end of stream. Not a failure; see [`FastqError::is_eof`].
    #[error("EOF: no more records")]
    Eof,
}

impl FastqError {
    pub(crate) fn io_err(source: io::Error, ctx: IoContext) -> Self {
        Self::Io {
            source: Arc::new(source),
            ctx,
        }
    }
    pub(crate) fn fmt_err(source: FormatError, ctx: IoContext) -> Self {
        Self::Format { source, ctx }
    }
    pub(crate) fn decompression(block: u64, source: io::Error) -> Self {
        Self::Decompression {
            block,
            source: Arc::new(source),
        }
    }

    /// True for the end-of-stream sentinel, false for every genuine failure.
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Attach a stream position to I/O errors raised below the tokenizer,
    /// which does not know where in the decoded stream it is.
    pub(crate) fn located(self, at: IoContext) -> Self {
        match self {
            Self::Io { source, .. } => Self::Io { source, ctx: at },
            other => other,
        }
    }
}
