//! High-throughput streaming FASTQ parser.
//!
//! - Plain and `.gz` input (auto-detect); gzip is decompressed by a pool of
//!   worker threads and re-serialized in original byte order.
//! - Owned records ([`FastqRecord`]), zero-copy records borrowed from the input
//!   buffer ([`RefRecord`]) and batches ([`Batch`]).
//! - Quality schemas (Sanger, Solexa, Illumina 1.3/1.5/1.8, generic) decoded to
//!   Phred scores lazily, on request.
//! - Hard stop on malformed input: the first failure is terminal and replayed
//!   on every later call. Clean end of input is [`FastqError::Eof`].
//! - Optional `mmap` for plain files; `zlib` feature for the system zlib backend.
//!
//! ```no_run
//! use fqstream::{FastqParser, QualitySchema, SeqRecord};
//!
//! let mut parser = FastqParser::create("reads.fastq.gz", QualitySchema::Sanger, 4)?;
//! loop {
//!     match parser.next_record() {
//!         Ok(rec) => println!("{} {}", rec.id(), rec.len()),
//!         Err(e) if e.is_eof() => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! # Ok::<(), fqstream::FastqError>(())
//! ```

pub mod batch;
pub mod error;
#[cfg(feature = "gzip")]
mod pipeline;
pub mod policy;
pub mod reader;
pub mod record;
pub mod schema;
pub mod source;
mod tokenizer;
mod util;

pub use crate::batch::{Batch, RecordBatch};
pub use crate::error::{FastqError, FormatError, IoContext, SchemaViolation};
pub use crate::policy::{DEFAULT_BATCH_SIZE, DEFAULT_PARALLELISM, LineMode, ParserOptions};
pub use crate::reader::{Batches, FastqParser, ParserState, Source};
pub use crate::record::{FastqRecord, RefRecord, SeqRecord};
pub use crate::schema::QualitySchema;
pub use crate::source::ByteSource;
