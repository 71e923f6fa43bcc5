//! Seekable, endianness-aware byte reader shared by the ".shp", ".shx" and
//! ".dbf" parsers.
//!
//! Shapefiles mix big-endian and little-endian integers in the same header, so
//! every read names its byte order explicitly.

use std::fs;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source ended in the middle of a structure.
    #[error("Unexpected end of file at byte {offset}: needed {wanted} more bytes")]
    Truncated { offset: u64, wanted: usize },
}

pub type Result<T> = std::result::Result<T, ReadError>;

/// Owns a byte source and tracks the cursor position.
///
/// Dropping the reader drops the source, which closes the underlying file.
#[derive(Debug)]
pub struct ByteReader<R> {
    source: R,
    pos: u64,
    len: u64,
}

/// Opens a file for reading, buffered.
pub fn open(path: &Path) -> Result<ByteReader<BufReader<fs::File>>> {
    let f = fs::File::open(path)?;
    ByteReader::new(BufReader::new(f))
}

impl<R: Read + Seek> ByteReader<R> {
    /// Wraps `source`, measuring its length. The cursor is left at byte 0.
    pub fn new(mut source: R) -> Result<ByteReader<R>> {
        let len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        Ok(ByteReader {
            source: source,
            pos: 0,
            len: len,
        })
    }

    /// Total length of the source in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.len
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    /// Moves the cursor to an absolute offset. Seeking past the end is
    /// allowed; the next read reports `Truncated`.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset != self.pos {
            self.source.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        let target = self.pos + n;
        self.seek(target)
    }

    /// Fills `buf` completely or fails with `Truncated`.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        if (buf.len() as u64) > self.remaining() {
            return Err(ReadError::Truncated {
                offset: self.pos,
                wanted: buf.len(),
            });
        }
        self.source.read_exact(buf).map_err(|err| self.map_eof(err, buf.len()))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub fn read_fixed(&mut self, n: usize) -> Result<Box<[u8]>> {
        let mut buf = vec![ 0u8; n ];
        self.read_into(&mut buf)?;
        Ok(buf.into_boxed_slice())
    }

    /// Returns the next byte without consuming it, or `None` at end of file.
    pub fn peek_u8(&mut self) -> Result<Option<u8>> {
        if self.eof() {
            return Ok(None);
        }
        let b = self.read_u8()?;
        let back = self.pos - 1;
        self.seek_unchecked(back)?;
        Ok(Some(b))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.check(1)?;
        let v = self.source.read_u8().map_err(|err| self.map_eof(err, 1))?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.check(2)?;
        let v = self.source.read_u16::<LittleEndian>().map_err(|err| self.map_eof(err, 2))?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        self.check(2)?;
        let v = self.source.read_i16::<LittleEndian>().map_err(|err| self.map_eof(err, 2))?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16_be(&mut self) -> Result<i16> {
        self.check(2)?;
        let v = self.source.read_i16::<BigEndian>().map_err(|err| self.map_eof(err, 2))?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.check(4)?;
        let v = self.source.read_u32::<LittleEndian>().map_err(|err| self.map_eof(err, 4))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.check(4)?;
        let v = self.source.read_i32::<LittleEndian>().map_err(|err| self.map_eof(err, 4))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        self.check(4)?;
        let v = self.source.read_i32::<BigEndian>().map_err(|err| self.map_eof(err, 4))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f64_le(&mut self) -> Result<f64> {
        self.check(8)?;
        let v = self.source.read_f64::<LittleEndian>().map_err(|err| self.map_eof(err, 8))?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_f64_be(&mut self) -> Result<f64> {
        self.check(8)?;
        let v = self.source.read_f64::<BigEndian>().map_err(|err| self.map_eof(err, 8))?;
        self.pos += 8;
        Ok(v)
    }

    /// Releases the source. Equivalent to dropping the reader.
    pub fn close(self) {}

    pub fn into_inner(self) -> R {
        self.source
    }

    fn check(&self, wanted: usize) -> Result<()> {
        if (wanted as u64) > self.remaining() {
            Err(ReadError::Truncated {
                offset: self.pos,
                wanted: wanted,
            })
        } else {
            Ok(())
        }
    }

    fn seek_unchecked(&mut self, offset: u64) -> Result<()> {
        self.source.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    // The length is measured once; a file that shrinks under us still reports
    // a truncation rather than a bare I/O error.
    fn map_eof(&self, err: io::Error, wanted: usize) -> ReadError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ReadError::Truncated {
                offset: self.pos,
                wanted: wanted,
            }
        } else {
            ReadError::Io(err)
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;
    use super::{ByteReader, ReadError};

    fn reader(bytes: &[u8]) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes.to_vec())).unwrap()
    }

    #[test]
    fn mixed_endianness() {
        let mut r = reader(&[ 0, 0, 0x27, 0x0a, 0xe8, 0x03, 0, 0 ]);
        assert_eq!(9994, r.read_i32_be().unwrap());
        assert_eq!(1000, r.read_i32_le().unwrap());
        assert!(r.eof());
    }

    #[test]
    fn read_f64_le_exact() {
        let bytes = 10.5f64.to_bits().to_le_bytes();
        let mut r = reader(&bytes);
        assert_eq!(10.5, r.read_f64_le().unwrap());
        assert_eq!(8, r.tell());
    }

    #[test]
    fn truncated_read_reports_offset() {
        let mut r = reader(&[ 1, 2, 3 ]);
        r.read_u8().unwrap();
        match r.read_i32_le() {
            Err(ReadError::Truncated { offset, wanted }) => {
                assert_eq!(1, offset);
                assert_eq!(4, wanted);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
        // a failed read does not move the cursor
        assert_eq!(1, r.tell());
    }

    #[test]
    fn read_fixed_past_end_is_truncated() {
        let mut r = reader(&[ 1, 2, 3 ]);
        assert!(matches!(r.read_fixed(4), Err(ReadError::Truncated { offset: 0, wanted: 4 })));
        assert_eq!(&[ 1, 2, 3 ][..], &*r.read_fixed(3).unwrap());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut r = reader(&[ 0x1a ]);
        assert_eq!(Some(0x1a), r.peek_u8().unwrap());
        assert_eq!(0, r.tell());
        assert_eq!(0x1a, r.read_u8().unwrap());
        assert_eq!(None, r.peek_u8().unwrap());
    }

    #[test]
    fn seek_and_tell() {
        let mut r = reader(&[ 0, 1, 2, 3, 4, 5 ]);
        r.seek(4).unwrap();
        assert_eq!(4, r.tell());
        assert_eq!(4, r.read_u8().unwrap());
        r.skip(1).unwrap();
        assert!(r.eof());
        assert_eq!(6, r.len());
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let path = std::path::Path::new("/nonexistent/dir/file.shp");
        assert!(matches!(super::open(path), Err(ReadError::Io(_))));
    }
}
