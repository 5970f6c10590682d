use crate::error::FastqError;
use crate::schema::QualitySchema;

/// Decompression workers used for gzip input when none is requested.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Records per batch for [`crate::FastqParser::batches`] when the caller has no preference.
pub const DEFAULT_BATCH_SIZE: usize = 100;

pub(crate) const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// How sequence/quality lines are laid out in FASTQ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineMode {
    /// Sequence and quality occupy exactly one line each.
    Single,
    /// Sequence/quality may span multiple lines (general FASTQ).
    #[default]
    Multi,
}

#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub schema: QualitySchema,
    /// Decompression workers; only used for gzip input. Must be at least 1.
    pub parallelism: usize,
    pub line_mode: LineMode,
    /// Bytes requested from the source per refill of the tokenizer buffer.
    pub buffer_size: usize,
    /// Blocks allowed in flight between the gzip splitter and the consumer.
    /// `None` picks `4 * parallelism`.
    pub queue_depth: Option<usize>,
    /// Validate every quality string against `schema` as records are read,
    /// turning a bad byte into a parser-level failure instead of a lazy one.
    pub check_quality: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            schema: QualitySchema::Generic,
            parallelism: DEFAULT_PARALLELISM,
            line_mode: LineMode::Multi,
            buffer_size: DEFAULT_BUFFER_SIZE,
            queue_depth: None,
            check_quality: false,
        }
    }
}

impl ParserOptions {
    pub fn with_schema(mut self, schema: QualitySchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_line_mode(mut self, line_mode: LineMode) -> Self {
        self.line_mode = line_mode;
        self
    }

    pub fn with_check_quality(mut self, check_quality: bool) -> Self {
        self.check_quality = check_quality;
        self
    }

    pub(crate) fn effective_queue_depth(&self) -> usize {
        self.queue_depth
            .unwrap_or(self.parallelism.saturating_mul(4))
            .max(1)
    }

    pub(crate) fn validate(&self) -> Result<(), FastqError> {
        if self.parallelism == 0 {
            return Err(FastqError::InvalidArgument(
                "parallelism must be at least 1".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(FastqError::InvalidArgument(
                "buffer_size must be at least 1".into(),
            ));
        }
        if self.queue_depth == Some(0) {
            return Err(FastqError::InvalidArgument(
                "queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
