use std::fs::File;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

pub fn looks_like_gzip<R: Read + Seek>(mut r: R) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    let pos = r.stream_position()?;
    let n = r.read(&mut magic)?;
    r.seek(SeekFrom::Start(pos))?;
    Ok(n >= 2 && magic == GZIP_MAGIC)
}

/// Peek the first bytes of a buffered stream without consuming them.
pub fn buffered_looks_like_gzip<R: BufRead>(r: &mut R) -> io::Result<bool> {
    let head = r.fill_buf()?;
    Ok(head.len() >= 2 && head[..2] == GZIP_MAGIC)
}

pub fn has_gz_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

pub fn open_file(path: &Path) -> io::Result<File> {
    std::fs::File::open(path)
}
