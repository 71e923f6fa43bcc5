/// Reads xbase ".dbf" file, as per
/// https://www.clicketyclick.dk/databases/xbase/format/dbf.html

use std::cmp;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use encoding::{DecoderTrap, EncodingRef};
use regex::Regex;
use thiserror::Error;

use super::super::bytes::{self, ByteReader, ReadError};
use super::options::{self, MalformedValues, OpenOptions};

const DBF_HEADER_LENGTH: usize = 32;
const DBF_FIELD_DESCRIPTOR_LENGTH: usize = 32;
const DBF_FIELD_TERMINATOR: u8 = 0x0d;
const DBF_END_OF_FILE: u8 = 0x1a;
const DBF_ACTIVE: u8 = b' ';
const DBF_DELETED: u8 = b'*';

/// Version bytes written by dBASE, FoxPro and friends.
const DBF_VERSIONS: &[u8] = &[ 0x02, 0x03, 0x04, 0x05, 0x07, 0x30, 0x31, 0x32, 0x43, 0x63, 0x83, 0x8b, 0x8e, 0xcb, 0xf5, 0xfb ];

#[derive(Debug, Error)]
pub enum DbfError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("Invalid .dbf file: {0}")]
    InvalidFormat(String),

    #[error("Row {index} requested, but there are only {len} rows")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DbfType {
    Character,
    Numeric,
    Float,
    Date,
    Logical,
    /// Memo, binary and other types we hand back as text.
    Other(u8),
}

impl DbfType {
    fn with_u8(code: u8) -> DbfType {
        match code {
            b'C' => DbfType::Character,
            b'N' => DbfType::Numeric,
            b'F' => DbfType::Float,
            b'D' => DbfType::Date,
            b'L' => DbfType::Logical,
            _ => DbfType::Other(code),
        }
    }

    pub fn code(&self) -> u8 {
        match *self {
            DbfType::Character => b'C',
            DbfType::Numeric => b'N',
            DbfType::Float => b'F',
            DbfType::Date => b'D',
            DbfType::Logical => b'L',
            DbfType::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbfField {
    pub name: String,
    pub data_type: DbfType,
    /// Byte offset within a record, counting the deletion flag.
    pub offset: usize,
    pub len: usize,
    pub decimal_count: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DbfDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for DbfDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// One decoded cell. Numeric, date and logical cells may be missing: blank
/// cells always are, and so are malformed ones unless the table was opened
/// with `MalformedValues::Fail`.
#[derive(Debug, Clone, PartialEq)]
pub enum DbfValue {
    Character(String),
    Numeric(Option<f64>),
    Float(Option<f64>),
    Date(Option<DbfDate>),
    Logical(Option<bool>),
    Other(String),
}

impl DbfValue {
    pub fn is_missing(&self) -> bool {
        match *self {
            DbfValue::Numeric(None) | DbfValue::Float(None) | DbfValue::Date(None) | DbfValue::Logical(None) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            DbfValue::Character(ref s) | DbfValue::Other(ref s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            DbfValue::Numeric(n) | DbfValue::Float(n) => n,
            _ => None,
        }
    }

    /// The number, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().and_then(|n| {
            if n.fract() == 0. && n.abs() < 9.2e18 {
                Some(n as i64)
            } else {
                None
            }
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            DbfValue::Logical(b) => b,
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DbfDate> {
        match *self {
            DbfValue::Date(d) => d,
            _ => None,
        }
    }
}

impl fmt::Display for DbfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DbfValue::Character(ref s) | DbfValue::Other(ref s) => write!(f, "{}", s),
            DbfValue::Numeric(Some(n)) | DbfValue::Float(Some(n)) => write!(f, "{}", n),
            DbfValue::Date(Some(d)) => write!(f, "{}", d),
            DbfValue::Logical(Some(b)) => write!(f, "{}", b),
            _ => Ok(()),
        }
    }
}

/// One data record. Deleted rows are kept so row `i` always lines up with
/// shape `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: usize,
    pub deleted: bool,
    pub values: Box<[DbfValue]>,
}

impl Row {
    pub fn get(&self, column: usize) -> Option<&DbfValue> {
        self.values.get(column)
    }
}

#[derive(Debug, Clone)]
pub struct DbfHeader {
    pub version: u8,
    /// (year, month, day) of the last update.
    pub last_update: (u16, u8, u8),
    pub n_records: usize,
    pub n_header_bytes: usize,
    pub n_bytes_per_record: usize,
    pub language_driver: u8,
}

/// Field layout plus everything needed to turn record bytes into a `Row`.
pub struct DbfSchema {
    fields: Box<[DbfField]>,
    n_bytes_per_record: usize,
    encoding: EncodingRef,
    malformed_values: MalformedValues,
}

// encoding::EncodingRef does not implement std::fmt::Debug
impl fmt::Debug for DbfSchema {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("DbfSchema")
            .field("fields", &self.fields)
            .field("n_bytes_per_record", &self.n_bytes_per_record)
            .field("encoding", &self.encoding.name())
            .field("malformed_values", &self.malformed_values)
            .finish()
    }
}

lazy_static! {
    static ref DATE: Regex = Regex::new(r"^(\d{4})(\d{2})(\d{2})$").unwrap();
}

fn trim_cell(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '\0')
}

impl DbfSchema {
    pub fn fields(&self) -> &[DbfField] {
        &self.fields
    }

    pub fn encoding(&self) -> EncodingRef {
        self.encoding
    }

    /// Column number and field for `name`, compared case-insensitively as
    /// dBASE does.
    pub fn field(&self, name: &str) -> Option<(usize, &DbfField)> {
        self.fields.iter().enumerate().find(|&(_, f)| f.name.eq_ignore_ascii_case(name))
    }

    /// Decodes one record: deletion flag, then each field in declared order.
    pub fn decode_row(&self, buf: &[u8], index: usize) -> Result<Row, DbfError> {
        if buf.len() != self.n_bytes_per_record {
            return Err(DbfError::InvalidFormat(format!("Row {} is {} bytes; records are {} bytes", index, buf.len(), self.n_bytes_per_record)));
        }

        let deleted = match buf[0] {
            DBF_ACTIVE => false,
            DBF_DELETED => true,
            DBF_END_OF_FILE => {
                return Err(DbfError::InvalidFormat(format!("Found the end-of-file marker at row {}, before the rows the header promised", index)));
            }
            flag => {
                return Err(DbfError::InvalidFormat(format!("Row {} has deletion flag {:#04x}; expected ' ' or '*'", index, flag)));
            }
        };

        let mut values = Vec::<DbfValue>::with_capacity(self.fields.len());
        for field in self.fields.iter() {
            let raw = &buf[field.offset .. field.offset + field.len];
            values.push(self.decode_value(field, raw, index)?);
        }

        Ok(Row {
            index: index,
            deleted: deleted,
            values: values.into_boxed_slice(),
        })
    }

    fn decode_text(&self, raw: &[u8]) -> String {
        // DecoderTrap::Replace never fails
        let s = self.encoding.decode(raw, DecoderTrap::Replace).unwrap_or_default();
        trim_cell(&s).to_string()
    }

    fn malformed<T>(&self, field: &DbfField, raw: &[u8], index: usize) -> Result<Option<T>, DbfError> {
        let text = String::from_utf8_lossy(raw);
        match self.malformed_values {
            MalformedValues::Missing => {
                debug!("Row {} field {}: cannot parse {:?} as {:?}; treating as missing", index, field.name, text, field.data_type);
                Ok(None)
            }
            MalformedValues::Fail => {
                Err(DbfError::InvalidFormat(format!("Row {} field {}: cannot parse {:?} as {:?}", index, field.name, text, field.data_type)))
            }
        }
    }

    fn decode_number(&self, field: &DbfField, raw: &[u8], index: usize) -> Result<Option<f64>, DbfError> {
        let text = String::from_utf8_lossy(raw);
        let text = trim_cell(&text);

        // blank, or all '*': dBASE's "did not fit" marker
        if text.is_empty() || text.bytes().all(|b| b == b'*') {
            return Ok(None);
        }

        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Some(n)),
            _ => self.malformed(field, raw, index),
        }
    }

    fn decode_date(&self, field: &DbfField, raw: &[u8], index: usize) -> Result<Option<DbfDate>, DbfError> {
        let text = String::from_utf8_lossy(raw);
        let text = trim_cell(&text);

        if text.is_empty() || text.bytes().all(|b| b == b'0') {
            return Ok(None);
        }

        let parsed = DATE.captures(text).and_then(|caps| {
            let year = caps[1].parse::<u16>().ok()?;
            let month = caps[2].parse::<u8>().ok()?;
            let day = caps[3].parse::<u8>().ok()?;
            if month >= 1 && month <= 12 && day >= 1 && day <= 31 {
                Some(DbfDate { year: year, month: month, day: day })
            } else {
                None
            }
        });

        match parsed {
            Some(date) => Ok(Some(date)),
            None => self.malformed(field, raw, index),
        }
    }

    fn decode_logical(&self, field: &DbfField, raw: &[u8], index: usize) -> Result<Option<bool>, DbfError> {
        match raw.iter().find(|&&b| b != b' ') {
            None | Some(&b'?') | Some(&0) => Ok(None),
            Some(&b'T') | Some(&b't') | Some(&b'Y') | Some(&b'y') => Ok(Some(true)),
            Some(&b'F') | Some(&b'f') | Some(&b'N') | Some(&b'n') => Ok(Some(false)),
            Some(_) => self.malformed(field, raw, index),
        }
    }

    fn decode_value(&self, field: &DbfField, raw: &[u8], index: usize) -> Result<DbfValue, DbfError> {
        Ok(match field.data_type {
            DbfType::Character => DbfValue::Character(self.decode_text(raw)),
            DbfType::Numeric => DbfValue::Numeric(self.decode_number(field, raw, index)?),
            DbfType::Float => DbfValue::Float(self.decode_number(field, raw, index)?),
            DbfType::Date => DbfValue::Date(self.decode_date(field, raw, index)?),
            DbfType::Logical => DbfValue::Logical(self.decode_logical(field, raw, index)?),
            DbfType::Other(_) => DbfValue::Other(self.decode_text(raw)),
        })
    }
}

/// Reads the first 32 bytes of the file.
///
/// Side-effect: advances the file cursor 32 bytes.
fn read_dbf_header<R: Read + Seek>(file: &mut ByteReader<R>) -> Result<DbfHeader, DbfError> {
    let buf = file.read_fixed(DBF_HEADER_LENGTH)?;

    if !DBF_VERSIONS.contains(&buf[0]) {
        return Err(DbfError::InvalidFormat(format!("Unrecognized version byte {:#04x}. This is not a valid .dbf file.", buf[0])));
    }

    // Bytes 1-3 (base 0) are "YMD" in binary. All years are valid; there are
    // 12 valid months and 31 valid days.
    if buf[2] > 12 || buf[3] > 31 {
        return Err(DbfError::InvalidFormat(String::from("The first four bytes of the file mention an invalid update date. This is not a valid .dbf file.")));
    }

    let header = DbfHeader {
        version: buf[0],
        last_update: (1900 + buf[1] as u16, buf[2], buf[3]),
        n_records: LittleEndian::read_u32(&buf[4..8]) as usize,
        n_header_bytes: LittleEndian::read_u16(&buf[8..10]) as usize,
        n_bytes_per_record: LittleEndian::read_u16(&buf[10..12]) as usize,
        language_driver: buf[29],
    };

    if header.n_header_bytes < DBF_HEADER_LENGTH + 1 {
        return Err(DbfError::InvalidFormat(format!("Header size {} is too small to hold any field descriptors", header.n_header_bytes)));
    }

    if header.n_bytes_per_record == 0 {
        return Err(DbfError::InvalidFormat(String::from("Record size is 0")));
    }

    Ok(header)
}

/// Reads all field definitions from the file.
///
/// Assumes exactly DBF_HEADER_LENGTH bytes of the file have been read already.
/// In other words, call this after read_dbf_header().
///
/// Side-effect: advances the file cursor to the first data record.
fn read_dbf_fields<R: Read + Seek>(file: &mut ByteReader<R>, dbf_header: &DbfHeader, encoding: EncodingRef) -> Result<Box<[DbfField]>, DbfError> {
    let end = dbf_header.n_header_bytes as u64;
    let mut fields = Vec::<DbfField>::new();
    let mut offset = 1;

    while file.tell() < end {
        if file.peek_u8()? == Some(DBF_FIELD_TERMINATOR) {
            break;
        }

        if file.tell() + DBF_FIELD_DESCRIPTOR_LENGTH as u64 > end {
            return Err(DbfError::InvalidFormat(format!("Field descriptor {} runs past the {}-byte header", fields.len(), end)));
        }

        let buf = file.read_fixed(DBF_FIELD_DESCRIPTOR_LENGTH)?;
        let name_len = buf[0..11].iter().position(|&b| b == 0).unwrap_or(11);
        let name = encoding.decode(&buf[0..name_len], DecoderTrap::Replace).unwrap_or_default();
        let name = name.trim().to_string();
        let len = buf[16] as usize;

        if name.is_empty() {
            return Err(DbfError::InvalidFormat(format!("Field descriptor {} has no name", fields.len())));
        }

        if len == 0 {
            return Err(DbfError::InvalidFormat(format!("Field {} has length 0", name)));
        }

        fields.push(DbfField {
            name: name,
            data_type: DbfType::with_u8(buf[11]),
            offset: offset,
            len: len,
            decimal_count: buf[17],
        });
        offset += len;
    }

    if fields.is_empty() {
        return Err(DbfError::InvalidFormat(String::from("The header declares no fields")));
    }

    if offset != dbf_header.n_bytes_per_record {
        return Err(DbfError::InvalidFormat(format!("Fields add up to {} bytes per record (with the deletion flag), but the header says {}", offset, dbf_header.n_bytes_per_record)));
    }

    // Skip the terminator and anything else (e.g., a Visual FoxPro backlink)
    // the header size covers.
    file.seek(end)?;

    Ok(fields.into_boxed_slice())
}

/// Reads an xBase ".dbf" file row by row.
///
/// # Example
///
/// ```
/// use shpread::read::shapefile::dbf;
///
/// # let mut path = std::env::current_dir().unwrap();
/// # path.push("test/fixtures/springfield.dbf");
/// let dbf_reader = dbf::open_ascii(&path).unwrap();
/// for row in dbf_reader {
///     println!("{:?}", row.unwrap());
/// }
/// ```
#[derive(Debug)]
pub struct DbfReader<R> {
    file: ByteReader<R>,
    pub header: DbfHeader,
    schema: DbfSchema,
    n_records_already_iterated: usize,
    failed: bool,
}

impl<R: Read + Seek> DbfReader<R> {
    /// Reads the header with an explicit text encoding.
    pub fn new(source: R, encoding: EncodingRef) -> Result<DbfReader<R>, DbfError> {
        DbfReader::with_options(source, &OpenOptions::new().encoding(encoding))
    }

    pub fn with_options(source: R, options: &OpenOptions) -> Result<DbfReader<R>, DbfError> {
        DbfReader::from_byte_reader(ByteReader::new(source)?, options)
    }

    pub fn from_byte_reader(mut file: ByteReader<R>, options: &OpenOptions) -> Result<DbfReader<R>, DbfError> {
        let header = read_dbf_header(&mut file)?;

        let encoding = match options.encoding {
            Some(encoding) => encoding,
            None => match options::encoding_from_language_driver(header.language_driver) {
                Some(encoding) => {
                    debug!("Language driver {:#04x} means encoding {}", header.language_driver, encoding.name());
                    encoding
                }
                None => options::default_encoding(),
            },
        };

        let fields = read_dbf_fields(&mut file, &header, encoding)?;
        debug!(".dbf has {} fields and {} records of {} bytes", fields.len(), header.n_records, header.n_bytes_per_record);

        let schema = DbfSchema {
            fields: fields,
            n_bytes_per_record: header.n_bytes_per_record,
            encoding: encoding,
            malformed_values: options.malformed_values,
        };

        Ok(DbfReader {
            file: file,
            header: header,
            schema: schema,
            n_records_already_iterated: 0,
            failed: false,
        })
    }

    pub fn schema(&self) -> &DbfSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[DbfField] {
        self.schema.fields()
    }

    pub fn get_field(&self, name: &str) -> Option<DbfField> {
        self.schema.field(name).map(|(_, f)| f.clone())
    }

    /// Reads a single record.
    ///
    /// Side-effect: advances the file cursor to the next record.
    fn read_dbf_record(&mut self) -> Result<Row, DbfError> {
        let buf = self.file.read_fixed(self.schema.n_bytes_per_record)?;
        let row = self.schema.decode_row(&buf, self.n_records_already_iterated)?;
        self.n_records_already_iterated += 1;
        Ok(row)
    }

    /// Called once all promised rows are read: accepts the optional end-of-file
    /// marker and logs anything else.
    fn check_end(&mut self) -> Result<(), DbfError> {
        match self.file.peek_u8()? {
            None => {}
            Some(DBF_END_OF_FILE) => {
                self.file.read_u8()?;
                if !self.file.eof() {
                    warn!("Ignoring {} bytes after the .dbf end-of-file marker", self.file.remaining());
                }
            }
            Some(_) => {
                warn!("Ignoring {} bytes after the last .dbf record", self.file.remaining());
            }
        }
        Ok(())
    }

    fn into_database(mut self) -> Result<Database, DbfError> {
        let fit = (self.file.remaining() / self.header.n_bytes_per_record as u64) as usize;
        let mut rows = Vec::<Row>::with_capacity(cmp::min(self.header.n_records, fit));
        while self.n_records_already_iterated < self.header.n_records {
            rows.push(self.read_dbf_record()?);
        }
        self.check_end()?;

        Ok(Database {
            header: self.header,
            schema: self.schema,
            rows: rows.into_boxed_slice(),
        })
    }
}

impl<R: Read + Seek> Iterator for DbfReader<R> {
    type Item = Result<Row, DbfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.n_records_already_iterated == self.header.n_records {
            return None;
        }

        let mut ret = self.read_dbf_record();
        if ret.is_ok() && self.n_records_already_iterated == self.header.n_records {
            if let Err(err) = self.check_end() {
                ret = Err(err);
            }
        }
        if ret.is_err() {
            self.failed = true;
        }
        Some(ret)
    }
}

/// A whole ".dbf" table, loaded up front.
///
/// # Example
///
/// ```
/// use shpread::read::shapefile::Database;
///
/// # let mut path = std::env::current_dir().unwrap();
/// # path.push("test/fixtures/springfield.dbf");
/// let database = Database::open(&path).unwrap();
///
/// assert_eq!(vec![ "NAME", "POP" ], database.field_names());
/// assert_eq!(1, database.record_count());
///
/// let record = database.record_map(0).unwrap();
/// assert_eq!(Some("Springfield"), record["NAME"].as_str());
/// assert_eq!(Some(1000), record["POP"].as_i64());
/// ```
#[derive(Debug)]
pub struct Database {
    pub header: DbfHeader,
    schema: DbfSchema,
    rows: Box<[Row]>,
}

impl Database {
    /// Opens a ".dbf" file, detecting its encoding.
    pub fn open(path: &Path) -> Result<Database, DbfError> {
        Database::open_with(path, &OpenOptions::new())
    }

    pub fn open_with(path: &Path, options: &OpenOptions) -> Result<Database, DbfError> {
        info!("Opening .dbf file: {}", path.display());
        let mut options = options.clone();
        if options.encoding.is_none() {
            options.encoding = options::encoding_from_cpg_file(path);
        }
        let file = bytes::open(path)?;
        DbfReader::from_byte_reader(file, &options)?.into_database()
    }

    pub fn from_reader<R: Read + Seek>(source: R, options: &OpenOptions) -> Result<Database, DbfError> {
        DbfReader::with_options(source, options)?.into_database()
    }

    pub fn schema(&self) -> &DbfSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[DbfField] {
        self.schema.fields()
    }

    pub fn field_count(&self) -> usize {
        self.schema.fields.len()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.schema.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn get_field(&self, name: &str) -> Option<&DbfField> {
        self.schema.field(name).map(|(_, f)| f)
    }

    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_at(&self, index: usize) -> Result<&Row, DbfError> {
        self.rows.get(index).ok_or(DbfError::IndexOutOfRange { index: index, len: self.rows.len() })
    }

    /// The value of field `name` in row `index`.
    pub fn value(&self, index: usize, name: &str) -> Option<&DbfValue> {
        let (column, _) = self.schema.field(name)?;
        self.rows.get(index).and_then(|row| row.get(column))
    }

    /// Row `index` as a field name → value map.
    pub fn record_map(&self, index: usize) -> Option<BTreeMap<String, DbfValue>> {
        self.rows.get(index).map(|row| self.to_map(row))
    }

    /// Every row as a field name → value map.
    pub fn records(&self) -> Vec<BTreeMap<String, DbfValue>> {
        self.rows.iter().map(|row| self.to_map(row)).collect()
    }

    fn to_map(&self, row: &Row) -> BTreeMap<String, DbfValue> {
        self.schema.fields.iter()
            .zip(row.values.iter())
            .map(|(field, value)| (field.name.clone(), value.clone()))
            .collect()
    }
}

/// Opens an xBase ".dbf" file from the filesystem, following instructions at
/// https://www.clicketyclick.dk/databases/xbase/format/dbf.html
pub fn open(path: &Path, encoding: EncodingRef) -> Result<DbfReader<std::io::BufReader<std::fs::File>>, DbfError> {
    let file = bytes::open(path)?;
    DbfReader::from_byte_reader(file, &OpenOptions::new().encoding(encoding))
}

pub fn open_ascii(path: &Path) -> Result<DbfReader<std::io::BufReader<std::fs::File>>, DbfError> {
    open(path, encoding::all::ASCII)
}
