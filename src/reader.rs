use crate::batch::Batch;
use crate::error::{FastqError, IoContext};
use crate::policy::ParserOptions;
use crate::record::{FastqRecord, RefRecord, SeqRecord};
use crate::schema::QualitySchema;
use crate::source::{ByteSource, PlainSource};
use crate::tokenizer::Tokenizer;
use crate::util::{buffered_looks_like_gzip, has_gz_extension, looks_like_gzip, open_file};

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum Source {
    Path(PathBuf),
    Reader,
}

/// Where the parser stands; `Error` is terminal.
#[derive(Debug, Clone)]
pub enum ParserState {
    Ready,
    Exhausted,
    Error(FastqError),
}

/// Pull-based FASTQ parser over plain or gzip input.
///
/// One parser serves one consumer. Dropping it stops and joins any
/// decompression threads before the input is released.
pub struct FastqParser {
    src: Source,
    tokenizer: Tokenizer,
    opts: ParserOptions,
    state: ParserState,
    records_read: u64,
}

impl FastqParser {
    /// Open `path` with the given schema and gzip parallelism.
    pub fn create<P: AsRef<Path>>(
        path: P,
        schema: QualitySchema,
        parallelism: usize,
    ) -> Result<Self, FastqError> {
        Self::from_path(
            path,
            ParserOptions::default()
                .with_schema(schema)
                .with_parallelism(parallelism),
        )
    }

    /// Open from a file path. Auto-detect `.gz` by extension or magic bytes.
    pub fn from_path<P: AsRef<Path>>(path: P, opts: ParserOptions) -> Result<Self, FastqError> {
        opts.validate()?;
        let path = path.as_ref();
        let f = open_file(path).map_err(|e| FastqError::io_err(e, IoContext::default()))?;

        let is_gz = has_gz_extension(path)
            || looks_like_gzip(&f).map_err(|e| FastqError::io_err(e, IoContext::default()))?;
        log::debug!(
            "opening {} ({}, schema {})",
            path.display(),
            if is_gz { "gzip" } else { "plain" },
            opts.schema
        );

        let source: Box<dyn ByteSource> = if is_gz {
            gzip_source(f, &opts)?
        } else {
            #[cfg(feature = "mmap")]
            {
                let mmap = crate::source::MmapSource::new(&f, opts.buffer_size)
                    .map_err(|e| FastqError::io_err(e, IoContext::default()))?;
                Box::new(mmap)
            }
            #[cfg(not(feature = "mmap"))]
            {
                Box::new(PlainSource::new(f, opts.buffer_size))
            }
        };

        Ok(Self::with_source(Source::Path(path.to_path_buf()), source, opts))
    }

    /// Wrap an arbitrary reader (stdin, sockets, in-memory data).
    /// Gzip is detected from the first bytes.
    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        opts: ParserOptions,
    ) -> Result<Self, FastqError> {
        opts.validate()?;
        let mut reader = BufReader::with_capacity(opts.buffer_size, reader);
        let is_gz = buffered_looks_like_gzip(&mut reader)
            .map_err(|e| FastqError::io_err(e, IoContext::default()))?;
        let source: Box<dyn ByteSource> = if is_gz {
            gzip_source(reader, &opts)?
        } else {
            Box::new(PlainSource::new(reader, opts.buffer_size))
        };
        Ok(Self::with_source(Source::Reader, source, opts))
    }

    /// Drive the parser from a custom byte source.
    pub fn with_source(src: Source, source: Box<dyn ByteSource>, opts: ParserOptions) -> Self {
        Self {
            src,
            tokenizer: Tokenizer::new(source, opts.line_mode, opts.buffer_size.saturating_mul(2)),
            opts,
            state: ParserState::Ready,
            records_read: 0,
        }
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn source(&self) -> &Source {
        &self.src
    }

    pub fn schema(&self) -> QualitySchema {
        self.opts.schema
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Stream position just past the last record returned.
    pub fn position(&self) -> IoContext {
        self.tokenizer.position()
    }

    /// Best-effort hint that another record can be read.
    ///
    /// May block while input is read ahead. A read failure here moves the
    /// parser into `Error` and is reported by the next call that returns data.
    pub fn has_more(&mut self) -> bool {
        if !matches!(self.state, ParserState::Ready) {
            return false;
        }
        match self.tokenizer.peek() {
            Ok(more) => more,
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    /// Next record as an owned copy. Clean end of input is [`FastqError::Eof`].
    pub fn next_record(&mut self) -> Result<FastqRecord, FastqError> {
        self.next_ref_as_record().map(|r| r.to_owned_record())
    }

    /// Next record borrowed from the input buffer, valid until the parser advances.
    pub fn next_ref_as_record(&mut self) -> Result<RefRecord<'_>, FastqError> {
        self.advance()?;
        let schema = self.opts.schema;
        match self.tokenizer.current(schema) {
            Some(record) => Ok(record),
            None => Err(FastqError::Eof),
        }
    }

    /// Up to `max_records` owned records. An empty batch means end of input.
    pub fn next_batch(&mut self, max_records: usize) -> Result<Batch, FastqError> {
        if max_records == 0 {
            return Err(FastqError::InvalidArgument(
                "max_records must be at least 1".into(),
            ));
        }
        let mut batch = Batch::with_capacity(max_records);
        while !batch.is_full() {
            match self.next_record() {
                Ok(record) => batch.push(record),
                Err(FastqError::Eof) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(batch)
    }

    /// Iterate over non-empty batches of `batch_size` records.
    pub fn batches(&mut self, batch_size: usize) -> Batches<'_> {
        Batches {
            parser: self,
            batch_size,
            done: false,
        }
    }

    fn advance(&mut self) -> Result<(), FastqError> {
        match &self.state {
            ParserState::Ready => {}
            ParserState::Exhausted => return Err(FastqError::Eof),
            ParserState::Error(err) => return Err(err.clone()),
        }
        match self.tokenizer.advance() {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("end of input after {} records", self.records_read);
                self.state = ParserState::Exhausted;
                return Err(FastqError::Eof);
            }
            Err(err) => return Err(self.fail(err)),
        }
        if self.opts.check_quality {
            let checked = match self.tokenizer.current(self.opts.schema) {
                Some(record) => self.opts.schema.validate(record.quality()),
                None => Ok(()),
            };
            if let Err(violation) = checked {
                return Err(self.fail(violation.into()));
            }
        }
        self.records_read += 1;
        Ok(())
    }

    fn fail(&mut self, err: FastqError) -> FastqError {
        log::warn!("parser stopped after {} records: {err}", self.records_read);
        self.state = ParserState::Error(err.clone());
        err
    }
}

impl Iterator for FastqParser {
    type Item = Result<FastqRecord, FastqError>;

    /// Ends at clean end of input; errors are yielded once, then iteration stops.
    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, ParserState::Error(_)) {
            return None;
        }
        match self.next_record() {
            Ok(record) => Some(Ok(record)),
            Err(FastqError::Eof) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Batches from [`FastqParser::batches`].
pub struct Batches<'a> {
    parser: &'a mut FastqParser,
    batch_size: usize,
    done: bool,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch, FastqError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.parser.next_batch(self.batch_size) {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => Some(Ok(batch)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(feature = "gzip")]
fn gzip_source<R: Read + Send + 'static>(
    compressed: R,
    opts: &ParserOptions,
) -> Result<Box<dyn ByteSource>, FastqError> {
    let source = crate::source::GzipSource::new(
        compressed,
        opts.parallelism,
        opts.effective_queue_depth(),
        opts.buffer_size,
    )?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "gzip"))]
fn gzip_source<R: Read + Send + 'static>(
    _compressed: R,
    _opts: &ParserOptions,
) -> Result<Box<dyn ByteSource>, FastqError> {
    Err(FastqError::Unsupported("gzip input requires the `gzip` feature"))
}
