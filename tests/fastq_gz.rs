#![cfg(feature = "gzip")]

use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use fqstream::{FastqError, FastqParser, FastqRecord, ParserOptions, ParserState, QualitySchema, SeqRecord};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use tempfile::tempdir;

fn fastq_text(n: usize) -> Vec<u8> {
    let bases = b"ACGT";
    let mut out = Vec::new();
    for i in 0..n {
        let len = 20 + i % 37;
        let seq: Vec<u8> = (0..len).map(|j| bases[(i * 7 + j) % 4]).collect();
        let qual: Vec<u8> = (0..len).map(|j| b'!' + ((i + j) % 41) as u8).collect();
        writeln!(out, "@read_{i} lane=1").unwrap();
        out.extend_from_slice(&seq);
        out.extend_from_slice(b"\n+\n");
        out.extend_from_slice(&qual);
        out.push(b'\n');
    }
    out
}

/// One BGZF member: gzip header with a `BC` subfield carrying BSIZE - 1.
fn bgzf_block(data: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(data).unwrap();
    let deflated = enc.finish().unwrap();
    let mut crc = flate2::Crc::new();
    crc.update(data);

    let bsize = 18 + deflated.len() + 8;
    let mut out = Vec::with_capacity(bsize);
    out.extend_from_slice(&[0x1f, 0x8b, 8, 4, 0, 0, 0, 0, 0, 0xff, 6, 0, b'B', b'C', 2, 0]);
    out.extend_from_slice(&u16::try_from(bsize - 1).unwrap().to_le_bytes());
    out.extend_from_slice(&deflated);
    out.extend_from_slice(&crc.sum().to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out
}

/// BGZF with blocks cut at fixed byte offsets, so records straddle blocks.
fn bgzf(data: &[u8], block_len: usize) -> Vec<Vec<u8>> {
    let mut blocks: Vec<Vec<u8>> = data.chunks(block_len).map(bgzf_block).collect();
    blocks.push(bgzf_block(b""));
    blocks
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Serves `data`, then fails every read.
struct FailingReader(Cursor<Vec<u8>>);

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf)? {
            0 => Err(io::Error::other("device unplugged")),
            n => Ok(n),
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) {
    File::create(path).unwrap().write_all(bytes).unwrap();
}

fn read_all(path: &Path, parallelism: usize) -> Vec<FastqRecord> {
    FastqParser::create(path, QualitySchema::Sanger, parallelism)
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

#[test]
fn parse_gz_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.fastq.gz");
    {
        let f = File::create(&path).unwrap();
        let mut enc = GzEncoder::new(f, Compression::fast());
        writeln!(enc, "@x").unwrap();
        writeln!(enc, "ACGT").unwrap();
        writeln!(enc, "+").unwrap();
        writeln!(enc, "!!!!").unwrap();
        enc.finish().unwrap();
    }

    let mut fq = FastqParser::create(&path, QualitySchema::Sanger, 4).expect("open gz");
    let rec = fq.next_record().unwrap();
    assert_eq!(rec.id(), "x");
    assert_eq!(rec.sequence(), b"ACGT");
    assert_eq!(rec.phred_scores().unwrap(), vec![0; 4]);
    assert!(fq.next_record().unwrap_err().is_eof());
}

#[test]
fn bgzf_output_is_identical_across_thread_counts() {
    let text = fastq_text(3000);
    let dir = tempdir().unwrap();
    let plain = dir.path().join("reads.fastq");
    let packed = dir.path().join("reads.fastq.gz");
    write_file(&plain, &text);
    write_file(&packed, &bgzf(&text, 1000).concat());

    let expected = read_all(&plain, 1);
    assert_eq!(expected.len(), 3000);
    for parallelism in [1, 2, 8] {
        assert_eq!(read_all(&packed, parallelism), expected, "parallelism {parallelism}");
    }
}

#[test]
fn single_stream_gzip_matches_across_thread_counts() {
    let text = fastq_text(2000);
    let dir = tempdir().unwrap();
    let path = dir.path().join("reads.fq.gz");
    write_file(&path, &gzip(&text));

    let one = read_all(&path, 1);
    assert_eq!(one.len(), 2000);
    assert_eq!(read_all(&path, 8), one);
}

#[test]
fn multi_member_gzip() {
    let text = fastq_text(500);
    let (head, tail) = text.split_at(text.len() / 3);
    let mut bytes = gzip(head);
    bytes.extend_from_slice(&gzip(tail));

    let dir = tempdir().unwrap();
    let path = dir.path().join("members.fastq.gz");
    write_file(&path, &bytes);
    assert_eq!(read_all(&path, 4).len(), 500);
}

#[test]
fn small_queue_applies_backpressure_without_reordering() {
    let text = fastq_text(1500);
    let packed = bgzf(&text, 300).concat();
    let opts = ParserOptions {
        parallelism: 6,
        queue_depth: Some(1),
        buffer_size: 64,
        ..ParserOptions::default()
    };
    let fq = FastqParser::from_reader(Cursor::new(packed), opts).unwrap();
    let ids: Vec<String> = fq.map(|r| r.unwrap().id().to_owned()).collect();
    let expected: Vec<String> = (0..1500).map(|i| format!("read_{i}")).collect();
    assert_eq!(ids, expected);
}

#[test]
fn corrupt_block_stops_the_parser() {
    let text = fastq_text(1000);
    let mut blocks = bgzf(&text, 2000);
    let total = blocks.len();
    // Break the CRC32 of block 5.
    let crc_at = blocks[5].len() - 8;
    blocks[5][crc_at] ^= 0xff;

    let mut fq =
        FastqParser::from_reader(Cursor::new(blocks.concat()), ParserOptions::default()).unwrap();
    let mut good = 0;
    let err = loop {
        match fq.next_record() {
            Ok(rec) => {
                assert_eq!(rec.sequence().len(), rec.quality().len());
                good += 1;
            }
            Err(err) => break err,
        }
    };
    assert!(total > 6);
    assert!(good < 1000);
    match &err {
        FastqError::Decompression { block: 5, .. } => {}
        other => panic!("expected decompression error in block 5, got {other:?}"),
    }
    assert!(matches!(fq.state(), ParserState::Error(_)));
    assert_eq!(fq.next_batch(10).unwrap_err().to_string(), err.to_string());
}

#[test]
fn not_gzip_despite_extension() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("liar.fastq.gz");
    write_file(&path, b"@r\nA\n+\nI\n");
    let mut fq = FastqParser::create(&path, QualitySchema::Generic, 2).unwrap();
    assert!(matches!(
        fq.next_record(),
        Err(FastqError::Decompression { block: 0, .. })
    ));
}

#[test]
fn empty_gz_file_has_no_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.fastq.gz");
    write_file(&path, b"");
    let mut fq = FastqParser::create(&path, QualitySchema::Generic, 2).unwrap();
    assert!(!fq.has_more());
    assert_eq!(fq.next_batch(4).unwrap().num_records(), 0);
}

#[test]
fn dropping_mid_stream_joins_workers() {
    let text = fastq_text(4000);
    let packed = bgzf(&text, 500).concat();
    for _ in 0..10 {
        let opts = ParserOptions {
            parallelism: 4,
            queue_depth: Some(2),
            ..ParserOptions::default()
        };
        let mut fq = FastqParser::from_reader(Cursor::new(packed.clone()), opts).unwrap();
        assert_eq!(fq.next_record().unwrap().id(), "read_0");
        drop(fq);
    }
}

#[test]
fn batches_over_gzip() {
    let text = fastq_text(250);
    let packed = bgzf(&text, 700).concat();
    let mut fq = FastqParser::from_reader(Cursor::new(packed), ParserOptions::default()).unwrap();
    let sizes: Vec<usize> = fq.batches(100).map(|b| b.unwrap().num_records()).collect();
    assert_eq!(sizes, [100, 100, 50]);
    assert_eq!(fq.records_read(), 250);
}

#[test]
fn input_read_failure_is_io_error_not_decompression() {
    let text = fastq_text(2000);
    let single = gzip(&text);
    let blocked = bgzf(&text, 1000).concat();
    for packed in [single, blocked] {
        let cut = packed[..packed.len() / 2].to_vec();
        let mut fq =
            FastqParser::from_reader(FailingReader(Cursor::new(cut)), ParserOptions::default())
                .unwrap();
        let err = loop {
            match fq.next_record() {
                Ok(rec) => assert_eq!(rec.sequence().len(), rec.quality().len()),
                Err(err) => break err,
            }
        };
        match &err {
            FastqError::Io { source, .. } => assert_eq!(source.to_string(), "device unplugged"),
            other => panic!("expected I/O error, got {other:?}"),
        }
        assert!(matches!(fq.state(), ParserState::Error(_)));
        assert!(!fq.has_more());
        assert_eq!(fq.next_record().unwrap_err().to_string(), err.to_string());
    }
}
