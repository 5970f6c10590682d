//! Parallel gzip decompression with in-order delivery.
//!
//! One splitter thread cuts the compressed stream into gzip members and tags
//! each with a sequence number. Members carrying the BGZF `BC` subfield
//! declare their own length, so they are handed to a pool of workers and
//! inflated independently. The first member without that subfield switches
//! the splitter to streaming decompression of the remaining input; its output
//! is still numbered and flows through the same ordered channel.
//!
//! The consumer holds a reorder map keyed by sequence number and only releases
//! the next expected block. A credit channel of `queue_depth` slots bounds the
//! number of blocks between the splitter and the consumer: the splitter takes
//! a credit before numbering a block and the consumer returns it once the
//! block has been released, so producers suspend instead of growing memory.

use crate::error::{FastqError, IoContext};

use crossbeam_channel::{Receiver, Sender, bounded};
use flate2::read::{GzDecoder, MultiGzDecoder};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufReader, Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const FLG_FEXTRA: u8 = 0x04;
/// Fixed gzip header plus the two-byte XLEN field.
const HEADER_WITH_XLEN: usize = 12;
/// CRC32 + ISIZE.
const TRAILER_LEN: usize = 8;
const INPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// A compressed BGZF member waiting for a worker.
struct Block {
    seq: u64,
    member: Vec<u8>,
}

struct Decoded {
    seq: u64,
    data: Result<Vec<u8>, FastqError>,
}

enum Member {
    /// Complete BGZF block, independently decompressible.
    Bgzf(Vec<u8>),
    /// Header bytes of a member whose length is unknown until inflated.
    Opaque(Vec<u8>),
}

/// Consumer-side receivers; dropping them disconnects every producer.
struct Channels {
    results: Receiver<Decoded>,
    credits: Receiver<()>,
}

pub(crate) struct DecompressionPipeline {
    channels: Option<Channels>,
    pending: BTreeMap<u64, Result<Vec<u8>, FastqError>>,
    next_seq: u64,
    reserved: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    finished: bool,
}

impl DecompressionPipeline {
    /// Start the splitter and `parallelism` workers over `input`.
    ///
    /// `chunk_size` bounds the blocks produced by the streaming fallback.
    pub(crate) fn spawn<R>(
        input: R,
        parallelism: usize,
        queue_depth: usize,
        chunk_size: usize,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let parallelism = parallelism.max(1);
        let (credit_tx, credit_rx) = bounded::<()>(queue_depth);
        let (result_tx, result_rx) = bounded::<Decoded>(queue_depth);
        let (job_tx, job_rx) = bounded::<Block>(parallelism);

        let mut pipeline = Self {
            channels: Some(Channels {
                results: result_rx,
                credits: credit_rx,
            }),
            pending: BTreeMap::new(),
            next_seq: 0,
            reserved: Arc::new(AtomicU64::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::with_capacity(parallelism + 1),
            finished: false,
        };

        for worker in 0..parallelism {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let stop = Arc::clone(&pipeline.stop);
            let spawned = thread::Builder::new()
                .name(format!("fqstream-inflate-{worker}"))
                .spawn(move || inflate_worker(jobs, results, stop));
            match spawned {
                Ok(handle) => pipeline.handles.push(handle),
                Err(err) => {
                    // Close the job queue so dropping `pipeline` can join the started workers.
                    drop(job_tx);
                    return Err(err);
                }
            }
        }
        drop(job_rx);

        let splitter = Splitter {
            input: BufReader::with_capacity(INPUT_BUFFER_SIZE, Tagged(input)),
            jobs: job_tx,
            emitter: Emitter {
                results: result_tx,
                credits: credit_tx,
                reserved: Arc::clone(&pipeline.reserved),
            },
            stop: Arc::clone(&pipeline.stop),
            chunk_size: chunk_size.max(1),
        };
        let handle = thread::Builder::new()
            .name("fqstream-split".into())
            .spawn(move || splitter.run())?;
        pipeline.handles.push(handle);

        log::debug!(
            "started gzip pipeline: {parallelism} workers, queue depth {queue_depth}"
        );
        Ok(pipeline)
    }

    /// Next decompressed chunk in original stream order, `None` at end of input.
    pub(crate) fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FastqError> {
        if self.finished {
            return Ok(None);
        }
        let Some(channels) = self.channels.as_ref() else {
            return Ok(None);
        };
        loop {
            if let Some(data) = self.pending.remove(&self.next_seq) {
                self.next_seq += 1;
                // The splitter paid this credit before numbering the block.
                let _ = channels.credits.recv();
                match data {
                    Ok(bytes) if bytes.is_empty() => continue,
                    Ok(bytes) => return Ok(Some(bytes)),
                    Err(err) => {
                        self.finished = true;
                        self.stop.store(true, Ordering::Release);
                        return Err(err);
                    }
                }
            }
            match channels.results.recv() {
                Ok(Decoded { seq, data }) => {
                    self.pending.insert(seq, data);
                }
                Err(_) => {
                    self.finished = true;
                    let reserved = self.reserved.load(Ordering::Acquire);
                    if self.next_seq < reserved {
                        return Err(FastqError::decompression(
                            self.next_seq,
                            io::Error::other("block lost: decompression worker exited early"),
                        ));
                    }
                    log::debug!("gzip pipeline drained after {} blocks", self.next_seq);
                    return Ok(None);
                }
            }
        }
    }
}

impl Drop for DecompressionPipeline {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Disconnecting wakes producers blocked on a full channel.
        self.channels.take();
        self.pending.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("gzip decompression thread panicked");
            }
        }
    }
}

/// Numbers outgoing blocks and pays a credit for each.
struct Emitter {
    results: Sender<Decoded>,
    credits: Sender<()>,
    reserved: Arc<AtomicU64>,
}

impl Emitter {
    fn reserve(&self) -> Option<u64> {
        self.credits.send(()).ok()?;
        Some(self.reserved.fetch_add(1, Ordering::AcqRel))
    }

    fn deliver(&self, data: Vec<u8>) -> bool {
        match self.reserve() {
            Some(seq) => self
                .results
                .send(Decoded {
                    seq,
                    data: Ok(data),
                })
                .is_ok(),
            None => false,
        }
    }

    fn fail(&self, err: io::Error) {
        if let Some(seq) = self.reserve() {
            let _ = self.results.send(Decoded {
                seq,
                data: Err(classify(seq, err)),
            });
        }
    }
}

/// Failure of the compressed input itself, as opposed to bad compressed data.
#[derive(Debug)]
struct SourceError(io::Error);

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Marks read errors from the wrapped input so they survive the decoders.
struct Tagged<R>(R);

impl<R: Read> Read for Tagged<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| match e.kind() {
            io::ErrorKind::Interrupted => e,
            kind => io::Error::new(kind, SourceError(e)),
        })
    }
}

/// Input failures become `Io`; everything else is a decompression failure of block `seq`.
fn classify(seq: u64, err: io::Error) -> FastqError {
    if !err.get_ref().is_some_and(|e| e.is::<SourceError>()) {
        return FastqError::decompression(seq, err);
    }
    let kind = err.kind();
    match err.into_inner().map(|e| e.downcast::<SourceError>()) {
        Some(Ok(tagged)) => FastqError::io_err(tagged.0, IoContext::default()),
        Some(Err(other)) => FastqError::decompression(seq, io::Error::new(kind, other)),
        None => FastqError::decompression(seq, io::Error::from(kind)),
    }
}

struct Splitter<R: Read> {
    input: BufReader<Tagged<R>>,
    jobs: Sender<Block>,
    emitter: Emitter,
    stop: Arc<AtomicBool>,
    chunk_size: usize,
}

impl<R: Read> Splitter<R> {
    fn run(mut self) {
        while !self.stop.load(Ordering::Acquire) {
            match self.read_member() {
                Ok(Some(Member::Bgzf(member))) => {
                    let Some(seq) = self.emitter.reserve() else {
                        break;
                    };
                    if self.jobs.send(Block { seq, member }).is_err() {
                        break;
                    }
                }
                Ok(Some(Member::Opaque(prefix))) => {
                    self.stream_rest(prefix);
                    break;
                }
                Ok(None) => break,
                Err(err) => {
                    self.emitter.fail(err);
                    break;
                }
            }
        }
    }

    fn read_member(&mut self) -> io::Result<Option<Member>> {
        let mut header = [0u8; HEADER_WITH_XLEN];
        let n = read_full(&mut self.input, &mut header)?;
        if n == 0 {
            return Ok(None);
        }
        if n >= 2 && header[..2] != GZIP_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid gzip magic: [{:#04x}, {:#04x}]", header[0], header[1]),
            ));
        }
        if n < HEADER_WITH_XLEN || header[3] & FLG_FEXTRA == 0 {
            return Ok(Some(Member::Opaque(header[..n].to_vec())));
        }

        let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
        let mut extra = vec![0u8; xlen];
        self.input.read_exact(&mut extra)?;

        let Some(block_size) = bgzf_block_size(&extra) else {
            let mut prefix = header.to_vec();
            prefix.extend_from_slice(&extra);
            return Ok(Some(Member::Opaque(prefix)));
        };

        let consumed = HEADER_WITH_XLEN + xlen;
        if block_size < consumed + TRAILER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid BGZF block size {block_size} (header is {consumed} bytes)"),
            ));
        }
        let mut member = Vec::with_capacity(block_size);
        member.extend_from_slice(&header);
        member.extend_from_slice(&extra);
        member.resize(block_size, 0);
        self.input.read_exact(&mut member[consumed..])?;
        Ok(Some(Member::Bgzf(member)))
    }

    /// Inflate everything left on this thread, emitting `chunk_size` blocks.
    fn stream_rest(&mut self, prefix: Vec<u8>) {
        log::debug!("gzip member without BGZF size; decompressing remainder as a stream");
        let mut decoder = MultiGzDecoder::new(Cursor::new(prefix).chain(&mut self.input));
        while !self.stop.load(Ordering::Acquire) {
            let mut chunk = vec![0u8; self.chunk_size];
            let n = match read_full(&mut decoder, &mut chunk) {
                Ok(n) => n,
                Err(err) => {
                    self.emitter.fail(err);
                    return;
                }
            };
            if n == 0 {
                return;
            }
            chunk.truncate(n);
            if !self.emitter.deliver(chunk) || n < self.chunk_size {
                return;
            }
        }
    }
}

fn inflate_worker(jobs: Receiver<Block>, results: Sender<Decoded>, stop: Arc<AtomicBool>) {
    for Block { seq, member } in jobs.iter() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let data = inflate_member(&member).map_err(|e| FastqError::decompression(seq, e));
        if results.send(Decoded { seq, data }).is_err() {
            break;
        }
    }
}

fn inflate_member(member: &[u8]) -> io::Result<Vec<u8>> {
    // ISIZE trailer is only a capacity hint; the decoder verifies it.
    let hint = member
        .len()
        .checked_sub(4)
        .map(|at| u32::from_le_bytes([member[at], member[at + 1], member[at + 2], member[at + 3]]))
        .unwrap_or(0);
    let mut out = Vec::with_capacity(hint as usize);
    GzDecoder::new(member).read_to_end(&mut out)?;
    Ok(out)
}

/// Total member length from the BGZF `BC` extra subfield (BSIZE + 1).
fn bgzf_block_size(extra: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        if extra[pos] == b'B' && extra[pos + 1] == b'C' && slen == 2 && pos + 6 <= extra.len() {
            let bsize = u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]) as usize;
            return Some(bsize + 1);
        }
        pos += 4 + slen;
    }
    None
}

/// Read until `buf` is full or the reader is exhausted.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
