//! Raw byte supply for the tokenizer: plain streams, memory maps and gzip.

use crate::error::{FastqError, IoContext};
#[cfg(feature = "gzip")]
use crate::pipeline::DecompressionPipeline;

use std::io::{self, Read};

/// Supplies the decoded FASTQ byte stream in chunks.
pub trait ByteSource: Send {
    /// Append the next chunk to `dst` and return its length; `0` means end of input.
    fn read_chunk(&mut self, dst: &mut Vec<u8>) -> Result<usize, FastqError>;
}

/// Uncompressed bytes from any reader.
pub struct PlainSource<R> {
    inner: R,
    chunk_size: usize,
    offset: u64,
}

impl<R: Read + Send> PlainSource<R> {
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
            offset: 0,
        }
    }
}

impl<R: Read + Send> ByteSource for PlainSource<R> {
    fn read_chunk(&mut self, dst: &mut Vec<u8>) -> Result<usize, FastqError> {
        let start = dst.len();
        dst.resize(start + self.chunk_size, 0);
        let n = loop {
            match self.inner.read(&mut dst[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    dst.truncate(start);
                    return Err(FastqError::io_err(
                        e,
                        IoContext {
                            byte_pos: self.offset,
                            line_num: 0,
                        },
                    ));
                }
            }
        };
        dst.truncate(start + n);
        self.offset += n as u64;
        Ok(n)
    }
}

/// Plain file served from a read-only memory map.
#[cfg(feature = "mmap")]
pub struct MmapSource {
    map: memmap2::Mmap,
    pos: usize,
    chunk_size: usize,
}

#[cfg(feature = "mmap")]
impl MmapSource {
    pub fn new(file: &std::fs::File, chunk_size: usize) -> io::Result<Self> {
        // SAFETY: the map is read-only; concurrent truncation of the file by
        // another process is outside what this reader defends against.
        let map = unsafe { memmap2::Mmap::map(file) }?;
        Ok(Self {
            map,
            pos: 0,
            chunk_size: chunk_size.max(1),
        })
    }
}

#[cfg(feature = "mmap")]
impl ByteSource for MmapSource {
    fn read_chunk(&mut self, dst: &mut Vec<u8>) -> Result<usize, FastqError> {
        let end = (self.pos + self.chunk_size).min(self.map.len());
        let chunk = &self.map[self.pos..end];
        dst.extend_from_slice(chunk);
        self.pos = end;
        Ok(chunk.len())
    }
}

/// Gzip input decompressed by the parallel pipeline.
#[cfg(feature = "gzip")]
pub struct GzipSource {
    pipeline: DecompressionPipeline,
}

#[cfg(feature = "gzip")]
impl GzipSource {
    pub fn new<R>(
        compressed: R,
        parallelism: usize,
        queue_depth: usize,
        chunk_size: usize,
    ) -> Result<Self, FastqError>
    where
        R: Read + Send + 'static,
    {
        let pipeline =
            DecompressionPipeline::spawn(compressed, parallelism, queue_depth, chunk_size)
                .map_err(|e| FastqError::io_err(e, IoContext::default()))?;
        Ok(Self { pipeline })
    }
}

#[cfg(feature = "gzip")]
impl ByteSource for GzipSource {
    fn read_chunk(&mut self, dst: &mut Vec<u8>) -> Result<usize, FastqError> {
        match self.pipeline.next_chunk()? {
            Some(chunk) => {
                let n = chunk.len();
                if dst.is_empty() {
                    *dst = chunk;
                } else {
                    dst.extend_from_slice(&chunk);
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }
}
