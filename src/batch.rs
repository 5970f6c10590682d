use crate::error::FastqError;
use crate::record::{FastqRecord, SeqRecord};

/// Ordered group of records returned together.
pub trait RecordBatch {
    type Record: SeqRecord;

    fn num_records(&self) -> usize;
    /// Bounds-checked access; out of range is an error, never a default record.
    fn get_record(&self, index: usize) -> Result<&Self::Record, FastqError>;
    fn iter(&self) -> std::slice::Iter<'_, Self::Record>;
}

/// Owned records in stream order, independent of the parser once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<FastqRecord>,
    capacity: usize,
}

/// Upper bound on records reserved before any are read.
const MAX_PREALLOC: usize = 1024;

impl Batch {
    /// `capacity` is the logical limit; storage grows as records arrive.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity.min(MAX_PREALLOC)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, record: FastqRecord) {
        debug_assert!(self.records.len() < self.capacity);
        self.records.push(record);
    }

    #[inline]
    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records requested when the batch was filled.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn get_record(&self, index: usize) -> Result<&FastqRecord, FastqError> {
        self.records.get(index).ok_or(FastqError::Index {
            index,
            len: self.records.len(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FastqRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<FastqRecord> {
        self.records
    }
}

impl RecordBatch for Batch {
    type Record = FastqRecord;

    fn num_records(&self) -> usize {
        Batch::num_records(self)
    }
    fn get_record(&self, index: usize) -> Result<&FastqRecord, FastqError> {
        Batch::get_record(self, index)
    }
    fn iter(&self) -> std::slice::Iter<'_, FastqRecord> {
        Batch::iter(self)
    }
}

impl IntoIterator for Batch {
    type Item = FastqRecord;
    type IntoIter = std::vec::IntoIter<FastqRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a FastqRecord;
    type IntoIter = std::slice::Iter<'a, FastqRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
