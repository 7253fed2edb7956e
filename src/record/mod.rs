//! TFRecord container reading and writing.
//!
//! Each frame is
//!
//! ```text
//! u64   length (little endian)
//! u32   masked crc32c of the length bytes
//! [u8]  payload
//! u32   masked crc32c of the payload
//! ```

pub mod example;

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

pub use example::{Example, Feature};

const MASK_DELTA: u32 = 0xa282_ead8;
const CASTAGNOLI: u32 = 0x82f6_3b78;

/// One frame's payload and the byte offset where the frame starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: u64,
    pub data: Vec<u8>,
}

pub struct RecordReader<R> {
    inner: R,
    offset: u64,
    done: bool,
}

impl RecordReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            done: false,
        }
    }

    /// Next payload, `None` at a clean end of stream.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let start = self.offset;

        let mut header = [0u8; 12];
        match self.fill(&mut header)? {
            0 => return Ok(None),
            n if n < header.len() => return Err(self.truncated(start, "length header")),
            _ => {}
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[..8]);
        let len_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if masked_crc32c(&len_bytes) != len_crc {
            return Err(Error::Record {
                offset: start,
                reason: "length checksum mismatch".to_string(),
            });
        }

        let len = u64::from_le_bytes(len_bytes);
        let mut data = Vec::new();
        let result = (&mut self.inner).take(len).read_to_end(&mut data);
        let read = result.map_err(|e| self.io_error(start, e))?;
        self.offset += read as u64;
        if (read as u64) < len {
            return Err(self.truncated(start, "payload"));
        }

        let mut footer = [0u8; 4];
        if self.fill(&mut footer)? < footer.len() {
            return Err(self.truncated(start, "payload checksum"));
        }
        if masked_crc32c(&data) != u32::from_le_bytes(footer) {
            return Err(Error::Record {
                offset: start,
                reason: "payload checksum mismatch".to_string(),
            });
        }

        Ok(Some(Record {
            offset: start,
            data,
        }))
    }

    /// Read until `buf` is full or the stream ends; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.io_error(self.offset, e)),
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    fn truncated(&self, offset: u64, part: &str) -> Error {
        Error::Record {
            offset,
            reason: format!("file ends inside the {}", part),
        }
    }

    fn io_error(&self, offset: u64, e: std::io::Error) -> Error {
        Error::Record {
            offset,
            reason: e.to_string(),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub struct RecordWriter<W: Write> {
    inner: W,
}

impl RecordWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record(&mut self, data: &[u8]) -> std::io::Result<()> {
        let len = (data.len() as u64).to_le_bytes();
        self.inner.write_all(&len)?;
        self.inner.write_all(&masked_crc32c(&len).to_le_bytes())?;
        self.inner.write_all(data)?;
        self.inner.write_all(&masked_crc32c(data).to_le_bytes())
    }

    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Number of records in a TFRecord file. Every frame is checksum-verified.
pub fn count<P: AsRef<Path>>(path: P) -> Result<usize> {
    let mut n = 0;
    for record in RecordReader::open(path)? {
        record?;
        n += 1;
    }
    Ok(n)
}

pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (CASTAGNOLI & mask);
        }
    }
    !crc
}

pub fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}
