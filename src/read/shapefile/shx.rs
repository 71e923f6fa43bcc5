/// Reads the ".shx" index that accompanies a ".shp" file: one fixed-size entry
/// per record giving where that record starts and how long it is.
use std::fs;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use super::super::bytes::{self, ByteReader, ReadError};
use super::shp::{self, ShpError, ShpHeader, SHP_HEADER_LENGTH};

const SHX_ENTRY_LENGTH: usize = 8;

#[derive(Debug, Error)]
pub enum ShxError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("Invalid .shx file: {0}")]
    InvalidFormat(String),
}

impl From<ShpError> for ShxError {
    fn from(err: ShpError) -> ShxError {
        match err {
            ShpError::Read(err) => ShxError::Read(err),
            ShpError::InvalidFormat(description) => ShxError::InvalidFormat(description),
            ShpError::IndexOutOfRange { index, len } => ShxError::InvalidFormat(format!("Index entry {} requested, but the index lists only {} records", index, len)),
        }
    }
}

/// Where one ".shp" record lives. Both values are in 16-bit words, as stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShxEntry {
    pub offset: u32,
    pub content_length: u32,
}

impl ShxEntry {
    /// Byte offset of the record header in the ".shp" file.
    pub fn byte_offset(&self) -> u64 {
        self.offset as u64 * 2
    }

    /// Length of the record content, excluding its 8-byte header.
    pub fn content_n_bytes(&self) -> usize {
        self.content_length as usize * 2
    }
}

/// A parsed ".shx" file.
///
/// # Example
///
/// ```
/// use shpread::read::shapefile::shx;
///
/// # let mut path = std::env::current_dir().unwrap();
/// # path.push("test/fixtures/springfield.shx");
/// let index = shx::open(&path).unwrap();
///
/// assert_eq!(1, index.len());
/// assert_eq!(100, index.entry(0).unwrap().byte_offset());
/// ```
#[derive(Debug, Clone)]
pub struct ShapeIndex {
    pub header: ShpHeader,
    entries: Box<[ShxEntry]>,
}

impl ShapeIndex {
    pub fn new<R: Read + Seek>(source: R) -> Result<ShapeIndex, ShxError> {
        ShapeIndex::from_byte_reader(ByteReader::new(source)?)
    }

    pub fn from_byte_reader<R: Read + Seek>(mut reader: ByteReader<R>) -> Result<ShapeIndex, ShxError> {
        let header = shp::read_shp_header(&mut reader)?;

        let body_n_bytes = header.file_n_bytes - SHP_HEADER_LENGTH as u64;
        if body_n_bytes % SHX_ENTRY_LENGTH as u64 != 0 {
            return Err(ShxError::InvalidFormat(format!("Index body is {} bytes, which is not a whole number of {}-byte entries", body_n_bytes, SHX_ENTRY_LENGTH)));
        }

        let n_entries = (body_n_bytes / SHX_ENTRY_LENGTH as u64) as usize;
        let buf = reader.read_fixed(n_entries * SHX_ENTRY_LENGTH)?;

        let mut entries = Vec::<ShxEntry>::with_capacity(n_entries);
        for (i, chunk) in buf.chunks(SHX_ENTRY_LENGTH).enumerate() {
            let offset = BigEndian::read_i32(&chunk[0..4]);
            let content_length = BigEndian::read_i32(&chunk[4..8]);

            if (offset as i64) * 2 < SHP_HEADER_LENGTH as i64 {
                return Err(ShxError::InvalidFormat(format!("Entry {} points to word {}, inside the .shp header", i, offset)));
            }
            if content_length < 0 {
                return Err(ShxError::InvalidFormat(format!("Entry {} has negative content length {}", i, content_length)));
            }

            entries.push(ShxEntry {
                offset: offset as u32,
                content_length: content_length as u32,
            });
        }

        Ok(ShapeIndex {
            header: header,
            entries: entries.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&ShxEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[ShxEntry] {
        &self.entries
    }
}

pub fn open(path: &Path) -> Result<ShapeIndex, ShxError> {
    let reader: ByteReader<BufReader<fs::File>> = bytes::open(path)?;
    ShapeIndex::from_byte_reader(reader)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;
    use super::*;
    use super::super::shp::ShapeType;
    use super::super::testutil::*;

    #[test]
    fn entries_locate_records() {
        let records = vec![
            point_record(1, 1., 1.),
            null_record(2),
            point_record(3, 3., 3.),
        ];
        let index = ShapeIndex::new(Cursor::new(shx_file(ShapeType::Point, &records))).unwrap();

        assert_eq!(3, index.len());
        assert_eq!(ShxEntry { offset: 50, content_length: 10 }, *index.entry(0).unwrap());
        assert_eq!(128, index.entry(1).unwrap().byte_offset());
        assert_eq!(4, index.entry(1).unwrap().content_n_bytes());
        assert_eq!(140, index.entry(2).unwrap().byte_offset());
        assert!(index.entry(3).is_none());
    }

    #[test]
    fn empty_index() {
        let index = ShapeIndex::new(Cursor::new(shx_file(ShapeType::Polygon, &[]))).unwrap();
        assert!(index.is_empty());
        assert_eq!(ShapeType::Polygon, index.header.shape_type);
    }

    #[test]
    fn shp_errors_keep_their_meaning() {
        match ShxError::from(ShpError::InvalidFormat(String::from("File has wrong magic number"))) {
            ShxError::InvalidFormat(msg) => assert_eq!("File has wrong magic number", msg),
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
        match ShxError::from(ShpError::IndexOutOfRange { index: 4, len: 2 }) {
            ShxError::InvalidFormat(msg) => assert!(msg.contains("entry 4") && msg.contains("only 2 records")),
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn partial_entry_is_rejected() {
        let mut bytes = shx_file(ShapeType::Point, &[ point_record(1, 1., 1.) ]);
        // declare 2 extra words
        bytes[27] += 2;
        bytes.extend_from_slice(&[ 0, 0, 0, 0 ]);
        assert!(matches!(ShapeIndex::new(Cursor::new(bytes)), Err(ShxError::InvalidFormat(_))));
    }

    #[test]
    fn offset_inside_header_is_rejected() {
        let mut bytes = shx_file(ShapeType::Point, &[ point_record(1, 1., 1.) ]);
        bytes[103] = 10;
        assert!(matches!(ShapeIndex::new(Cursor::new(bytes)), Err(ShxError::InvalidFormat(_))));
    }

    #[test]
    fn short_index_is_truncated() {
        let mut bytes = shx_file(ShapeType::Point, &[ point_record(1, 1., 1.), point_record(2, 2., 2.) ]);
        bytes.truncate(112);
        assert!(matches!(ShapeIndex::new(Cursor::new(bytes)), Err(ShxError::Read(ReadError::Truncated { .. }))));
    }

    #[test]
    fn bad_magic_is_invalid() {
        let mut bytes = shx_file(ShapeType::Point, &[]);
        bytes[2] = 0;
        assert!(matches!(ShapeIndex::new(Cursor::new(bytes)), Err(ShxError::InvalidFormat(_))));
    }
}
