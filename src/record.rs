use crate::error::{FastqError, FormatError, IoContext};
use crate::schema::QualitySchema;
use std::borrow::Cow;

/// Read access shared by owned and borrowed records.
pub trait SeqRecord {
    /// Identifier without the leading `@`, cut at the first whitespace.
    fn id(&self) -> &str;
    fn sequence(&self) -> &[u8];
    /// Raw quality characters, one per base.
    fn quality(&self) -> &[u8];
    fn schema(&self) -> QualitySchema;

    /// Number of bases.
    #[inline]
    fn len(&self) -> usize {
        self.sequence().len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.sequence().is_empty()
    }

    /// Decode the quality string with the record's schema. Computed on every call.
    fn phred_scores(&self) -> Result<Vec<i16>, FastqError> {
        self.schema().decode(self.quality())
    }
}

/// A record that owns its bytes and outlives the parser that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    id: String,
    seq: Vec<u8>,
    qual: Vec<u8>,
    schema: QualitySchema,
}

impl FastqRecord {
    /// Build a record, enforcing `seq.len() == qual.len()`.
    pub fn new(
        id: impl Into<String>,
        seq: impl Into<Vec<u8>>,
        qual: impl Into<Vec<u8>>,
        schema: QualitySchema,
    ) -> Result<Self, FastqError> {
        let (seq, qual) = (seq.into(), qual.into());
        if seq.len() != qual.len() {
            return Err(FastqError::fmt_err(
                FormatError::LengthMismatch {
                    seq: seq.len(),
                    qual: qual.len(),
                },
                IoContext::default(),
            ));
        }
        Ok(Self {
            id: id.into(),
            seq,
            qual,
            schema,
        })
    }

    /// Split into `(id, sequence, quality)`.
    pub fn into_parts(self) -> (String, Vec<u8>, Vec<u8>) {
        (self.id, self.seq, self.qual)
    }
}

impl SeqRecord for FastqRecord {
    #[inline]
    fn id(&self) -> &str {
        &self.id
    }
    #[inline]
    fn sequence(&self) -> &[u8] {
        &self.seq
    }
    #[inline]
    fn quality(&self) -> &[u8] {
        &self.qual
    }
    #[inline]
    fn schema(&self) -> QualitySchema {
        self.schema
    }
}

/// A record borrowed from the parser's input buffer.
///
/// The borrow ends at the parser's next advancing call, so the compiler rejects
/// any use after the buffer may have been refilled. Wrapped sequence or quality
/// lines are joined into an owned copy; single-line fields are never copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord<'a> {
    pub(crate) id: &'a str,
    pub(crate) seq: Cow<'a, [u8]>,
    pub(crate) qual: Cow<'a, [u8]>,
    pub(crate) schema: QualitySchema,
}

impl RefRecord<'_> {
    /// Copy into a record that no longer borrows the parser.
    pub fn to_owned_record(&self) -> FastqRecord {
        FastqRecord {
            id: self.id.to_owned(),
            seq: self.seq.to_vec(),
            qual: self.qual.to_vec(),
            schema: self.schema,
        }
    }

    /// True when no field had to be copied out of the input buffer.
    pub fn is_zero_copy(&self) -> bool {
        matches!(
            (&self.seq, &self.qual),
            (Cow::Borrowed(_), Cow::Borrowed(_))
        )
    }
}

impl SeqRecord for RefRecord<'_> {
    #[inline]
    fn id(&self) -> &str {
        self.id
    }
    #[inline]
    fn sequence(&self) -> &[u8] {
        &self.seq
    }
    #[inline]
    fn quality(&self) -> &[u8] {
        &self.qual
    }
    #[inline]
    fn schema(&self) -> QualitySchema {
        self.schema
    }
}

impl From<RefRecord<'_>> for FastqRecord {
    fn from(r: RefRecord<'_>) -> Self {
        FastqRecord {
            id: r.id.to_owned(),
            seq: r.seq.into_owned(),
            qual: r.qual.into_owned(),
            schema: r.schema,
        }
    }
}
