//! FASTQ record boundaries over a refillable byte buffer.
//!
//! A record is scanned from `pos` without consuming anything; only a complete
//! record moves `pos`. When the buffer ends mid-record the consumed prefix is
//! dropped, the next chunk is appended and the scan restarts at the record
//! start. Fields are kept as ranges into the buffer, which stay valid until the
//! next refill.

use crate::error::{FastqError, FormatError, IoContext};
use crate::policy::LineMode;
use crate::record::RefRecord;
use crate::schema::QualitySchema;
use crate::source::ByteSource;

use memchr::memchr;
use std::borrow::Cow;
use std::ops::Range;

struct Line {
    /// Line content without `\n` / `\r\n`.
    content: Range<usize>,
    /// Offset just past the terminator.
    next: usize,
}

enum Scan {
    Record { end: usize, lines: u64 },
    /// The buffer ends inside a record and more input may follow.
    Incomplete,
    End,
}

pub(crate) struct Tokenizer {
    source: Box<dyn ByteSource>,
    buf: Vec<u8>,
    pos: usize,
    /// Stream offset of `buf[0]`.
    base: u64,
    /// Lines consumed before `pos`.
    line: u64,
    eof: bool,
    line_mode: LineMode,
    has_record: bool,
    id: Range<usize>,
    seq_parts: Vec<Range<usize>>,
    qual_parts: Vec<Range<usize>>,
}

impl Tokenizer {
    pub(crate) fn new(source: Box<dyn ByteSource>, line_mode: LineMode, capacity: usize) -> Self {
        Self {
            source,
            buf: Vec::with_capacity(capacity),
            pos: 0,
            base: 0,
            line: 0,
            eof: false,
            line_mode,
            has_record: false,
            id: 0..0,
            seq_parts: Vec::with_capacity(4),
            qual_parts: Vec::with_capacity(4),
        }
    }

    /// Move to the next record. `Ok(false)` is clean end of input.
    pub(crate) fn advance(&mut self) -> Result<bool, FastqError> {
        self.has_record = false;
        loop {
            match self.scan()? {
                Scan::Record { end, lines } => {
                    self.pos = end;
                    self.line += lines;
                    self.has_record = true;
                    return Ok(true);
                }
                Scan::End => return Ok(false),
                Scan::Incomplete => self.refill()?,
            }
        }
    }

    /// Whether any non-whitespace input remains, reading ahead if needed.
    pub(crate) fn peek(&mut self) -> Result<bool, FastqError> {
        loop {
            if self.buf[self.pos..].iter().any(|b| !b.is_ascii_whitespace()) {
                return Ok(true);
            }
            if self.eof {
                return Ok(false);
            }
            self.refill()?;
        }
    }

    /// The record found by the last successful [`Tokenizer::advance`].
    pub(crate) fn current(&self, schema: QualitySchema) -> Option<RefRecord<'_>> {
        if !self.has_record {
            return None;
        }
        Some(RefRecord {
            id: std::str::from_utf8(&self.buf[self.id.clone()]).unwrap_or_default(),
            seq: self.join(&self.seq_parts),
            qual: self.join(&self.qual_parts),
            schema,
        })
    }

    /// Position just past the last consumed record.
    pub(crate) fn position(&self) -> IoContext {
        IoContext {
            byte_pos: self.base + self.pos as u64,
            line_num: self.line,
        }
    }

    fn join(&self, parts: &[Range<usize>]) -> Cow<'_, [u8]> {
        match parts {
            [one] => Cow::Borrowed(&self.buf[one.clone()]),
            _ => {
                let len = parts.iter().map(|r| r.len()).sum();
                let mut joined = Vec::with_capacity(len);
                for r in parts {
                    joined.extend_from_slice(&self.buf[r.clone()]);
                }
                Cow::Owned(joined)
            }
        }
    }

    fn refill(&mut self) -> Result<(), FastqError> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.base += self.pos as u64;
            self.pos = 0;
        }
        self.has_record = false;
        let n = self
            .source
            .read_chunk(&mut self.buf)
            .map_err(|e| e.located(self.position()))?;
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn line_at(&self, start: usize) -> Option<Line> {
        let rest = &self.buf[start..];
        let (end, next) = match memchr(b'\n', rest) {
            Some(i) => (start + i, start + i + 1),
            None if self.eof && !rest.is_empty() => (self.buf.len(), self.buf.len()),
            None => return None,
        };
        let end = if end > start && self.buf[end - 1] == b'\r' {
            end - 1
        } else {
            end
        };
        Some(Line {
            content: start..end,
            next,
        })
    }

    /// Line at `*at`, advancing the cursor past it.
    fn take_line(&self, at: &mut usize, lines: &mut u64) -> Option<Line> {
        let line = self.line_at(*at)?;
        *at = line.next;
        *lines += 1;
        Some(line)
    }

    #[inline]
    fn starts_with(&self, line: &Line, byte: u8) -> bool {
        !line.content.is_empty() && self.buf[line.content.start] == byte
    }

    fn error_at(&self, kind: FormatError, offset: usize, lines: u64) -> FastqError {
        FastqError::fmt_err(
            kind,
            IoContext {
                byte_pos: self.base + offset as u64,
                line_num: self.line + lines,
            },
        )
    }

    /// Out of lines mid-record: wait for more input, or fail at end of input.
    fn truncated(&self, at: usize, lines: u64) -> Result<Scan, FastqError> {
        if self.eof {
            Err(self.error_at(FormatError::UnexpectedEof, at, lines + 1))
        } else {
            Ok(Scan::Incomplete)
        }
    }

    fn scan(&mut self) -> Result<Scan, FastqError> {
        self.seq_parts.clear();
        self.qual_parts.clear();
        let mut at = self.pos;
        let mut lines = 0u64;

        // Header, after any blank lines between records.
        let header = loop {
            let Some(line) = self.take_line(&mut at, &mut lines) else {
                return Ok(if self.eof { Scan::End } else { Scan::Incomplete });
            };
            // Whitespace-only lines count as blank, matching `peek`.
            if !self.buf[line.content.clone()].iter().all(u8::is_ascii_whitespace) {
                break line;
            }
        };
        let head = header.content.start;
        match self.buf[head] {
            b'@' => {}
            b'>' => return Err(self.error_at(FormatError::FastaHeaderDetected, head, lines)),
            _ => return Err(self.error_at(FormatError::MissingHeader, head, lines)),
        }
        let name = &self.buf[head + 1..header.content.end];
        let id_len = name
            .iter()
            .position(|b| b.is_ascii_whitespace())
            .unwrap_or(name.len());
        if std::str::from_utf8(&name[..id_len]).is_err() {
            return Err(self.error_at(FormatError::InvalidIdentifier, head, lines));
        }
        self.id = head + 1..head + 1 + id_len;

        // Sequence, then separator.
        let seq_len = match self.line_mode {
            LineMode::Single => {
                let Some(seq) = self.take_line(&mut at, &mut lines) else {
                    return self.truncated(at, lines);
                };
                if seq.content.is_empty() || self.starts_with(&seq, b'+') {
                    return Err(self.error_at(FormatError::EmptySequence, seq.content.start, lines));
                }
                let Some(plus) = self.take_line(&mut at, &mut lines) else {
                    return self.truncated(at, lines);
                };
                if !self.starts_with(&plus, b'+') {
                    return Err(self.error_at(FormatError::MissingPlus, plus.content.start, lines));
                }
                let len = seq.content.len();
                self.seq_parts.push(seq.content);
                len
            }
            LineMode::Multi => {
                let mut len = 0;
                loop {
                    let Some(line) = self.take_line(&mut at, &mut lines) else {
                        return self.truncated(at, lines);
                    };
                    if self.starts_with(&line, b'+') {
                        break;
                    }
                    if self.starts_with(&line, b'@') {
                        return Err(self.error_at(FormatError::MissingPlus, line.content.start, lines));
                    }
                    if !line.content.is_empty() {
                        len += line.content.len();
                        self.seq_parts.push(line.content);
                    }
                }
                if len == 0 {
                    return Err(self.error_at(FormatError::EmptySequence, head, lines));
                }
                len
            }
        };

        // Quality, until it covers the sequence.
        let mut qual_len = 0;
        let mut qual_start = at;
        match self.line_mode {
            LineMode::Single => {
                let Some(qual) = self.take_line(&mut at, &mut lines) else {
                    return self.truncated(at, lines);
                };
                qual_start = qual.content.start;
                qual_len = qual.content.len();
                self.qual_parts.push(qual.content);
            }
            LineMode::Multi => {
                while qual_len < seq_len {
                    let Some(qual) = self.take_line(&mut at, &mut lines) else {
                        return self.truncated(at, lines);
                    };
                    if !qual.content.is_empty() {
                        qual_start = qual.content.start;
                        qual_len += qual.content.len();
                        self.qual_parts.push(qual.content);
                    }
                }
            }
        }
        if qual_len != seq_len {
            return Err(self.error_at(
                FormatError::LengthMismatch {
                    seq: seq_len,
                    qual: qual_len,
                },
                qual_start,
                lines,
            ));
        }

        Ok(Scan::Record { end: at, lines })
    }
}
