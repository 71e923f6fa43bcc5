/// Reads ESRI ".shp" Shapefile, as per
/// https://www.esri.com/library/whitepapers/pdfs/shapefile.pdf
use std::fmt;
use std::io::{Read, Seek};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use itertools::Itertools;
use thiserror::Error;

use super::super::bytes::{ByteReader, ReadError};
use super::shx::{ShapeIndex, ShxEntry};

pub const SHP_HEADER_LENGTH: usize = 100;
const SHP_RECORD_HEADER_LENGTH: usize = 8;
pub const SHP_MAGIC_NUMBER: i32 = 9994;
const SHP_VERSION: i32 = 1000;
const SHP_POINT_LENGTH: usize = 16;

/// Measures smaller than this mean "no data".
const SHP_NO_DATA: f64 = -1e38;

#[derive(Debug, Error)]
pub enum ShpError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("Invalid .shp file: {0}")]
    InvalidFormat(String),

    #[error("Record {index} requested, but there are only {len} records")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
    PointZ,
    PolyLineZ,
    PolygonZ,
    MultiPointZ,
    PointM,
    PolyLineM,
    PolygonM,
    MultiPointM,
    MultiPatch,
}

/// Record layouts, one per group of shape types that share a wire format.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShapeFamily {
    Null,
    Point,
    MultiPoint,
    PolyLine,
    Polygon,
    MultiPatch,
}

impl ShapeType {
    pub fn with_code(code: i32) -> Option<ShapeType> {
        match code {
            0  => Some(ShapeType::Null),
            1  => Some(ShapeType::Point),
            3  => Some(ShapeType::PolyLine),
            5  => Some(ShapeType::Polygon),
            8  => Some(ShapeType::MultiPoint),
            11 => Some(ShapeType::PointZ),
            13 => Some(ShapeType::PolyLineZ),
            15 => Some(ShapeType::PolygonZ),
            18 => Some(ShapeType::MultiPointZ),
            21 => Some(ShapeType::PointM),
            23 => Some(ShapeType::PolyLineM),
            25 => Some(ShapeType::PolygonM),
            28 => Some(ShapeType::MultiPointM),
            31 => Some(ShapeType::MultiPatch),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match *self {
            ShapeType::Null => 0,
            ShapeType::Point => 1,
            ShapeType::PolyLine => 3,
            ShapeType::Polygon => 5,
            ShapeType::MultiPoint => 8,
            ShapeType::PointZ => 11,
            ShapeType::PolyLineZ => 13,
            ShapeType::PolygonZ => 15,
            ShapeType::MultiPointZ => 18,
            ShapeType::PointM => 21,
            ShapeType::PolyLineM => 23,
            ShapeType::PolygonM => 25,
            ShapeType::MultiPointM => 28,
            ShapeType::MultiPatch => 31,
        }
    }

    /// Human-readable name, e.g. "PolygonZ".
    pub fn name(&self) -> &'static str {
        match *self {
            ShapeType::Null => "NullShape",
            ShapeType::Point => "Point",
            ShapeType::PolyLine => "PolyLine",
            ShapeType::Polygon => "Polygon",
            ShapeType::MultiPoint => "MultiPoint",
            ShapeType::PointZ => "PointZ",
            ShapeType::PolyLineZ => "PolyLineZ",
            ShapeType::PolygonZ => "PolygonZ",
            ShapeType::MultiPointZ => "MultiPointZ",
            ShapeType::PointM => "PointM",
            ShapeType::PolyLineM => "PolyLineM",
            ShapeType::PolygonM => "PolygonM",
            ShapeType::MultiPointM => "MultiPointM",
            ShapeType::MultiPatch => "MultiPatch",
        }
    }

    pub fn family(&self) -> ShapeFamily {
        match *self {
            ShapeType::Null => ShapeFamily::Null,
            ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => ShapeFamily::Point,
            ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM => ShapeFamily::MultiPoint,
            ShapeType::PolyLine | ShapeType::PolyLineZ | ShapeType::PolyLineM => ShapeFamily::PolyLine,
            ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM => ShapeFamily::Polygon,
            ShapeType::MultiPatch => ShapeFamily::MultiPatch,
        }
    }

    pub fn has_z(&self) -> bool {
        match *self {
            ShapeType::PointZ | ShapeType::PolyLineZ | ShapeType::PolygonZ
                | ShapeType::MultiPointZ | ShapeType::MultiPatch => true,
            _ => false,
        }
    }

    /// `true` for the "M" types, whose measures are mandatory. Z types carry
    /// optional measures.
    pub fn has_m(&self) -> bool {
        match *self {
            ShapeType::PointM | ShapeType::PolyLineM | ShapeType::PolygonM | ShapeType::MultiPointM => true,
            _ => false,
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The role of one part of a MultiPatch record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PatchType {
    TriangleStrip,
    TriangleFan,
    OuterRing,
    InnerRing,
    FirstRing,
    Ring,
}

impl PatchType {
    fn with_code(code: i32) -> Option<PatchType> {
        match code {
            0 => Some(PatchType::TriangleStrip),
            1 => Some(PatchType::TriangleFan),
            2 => Some(PatchType::OuterRing),
            3 => Some(PatchType::InnerRing),
            4 => Some(PatchType::FirstRing),
            5 => Some(PatchType::Ring),
            _ => None,
        }
    }
}

/// Extents: x, y, then the z and m ranges (zero when the type has none).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ShpBoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub m_min: f64,
    pub m_max: f64,
}

impl ShpBoundingBox {
    fn is_ordered(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max
    }

    fn of_point(p: &ShpPoint) -> ShpBoundingBox {
        let z = p.z.unwrap_or(0.);
        let m = p.m.unwrap_or(0.);
        ShpBoundingBox {
            x_min: p.x,
            y_min: p.y,
            x_max: p.x,
            y_max: p.y,
            z_min: z,
            z_max: z,
            m_min: m,
            m_max: m,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct ShpHeader {
    pub file_n_bytes: u64,
    pub shape_type: ShapeType,
    pub bounding_box: ShpBoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShpPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl ShpPoint {
    pub fn xy(x: f64, y: f64) -> ShpPoint {
        ShpPoint { x: x, y: y, z: None, m: None }
    }
}

impl fmt::Display for ShpPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}", self.x, self.y)?;
        if let Some(z) = self.z {
            write!(f, ",z={}", z)?;
        }
        if let Some(m) = self.m {
            write!(f, ",m={}", m)?;
        }
        write!(f, ")")
    }
}

/// One part of a record: a polygon ring, a polyline segment, or the points
/// of a (multi)point record. Winding is exactly as stored in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct ShpRing(pub Box<[ShpPoint]>);

impl fmt::Display for ShpRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, point) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", point)?;
        }
        write!(f, "]")
    }
}

/// A decoded shape. `index` is the 0-based ordinal that lines up with the
/// ".dbf" row and the ".shx" entry; `record_number` is what the file says.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    pub index: usize,
    pub record_number: i32,
    pub shape_type: ShapeType,
    pub bounding_box: ShpBoundingBox,
    pub parts: Box<[ShpRing]>,
    /// One entry per part for MultiPatch records; empty otherwise.
    pub part_types: Box<[PatchType]>,
}

impl ShapeRecord {
    pub fn is_null(&self) -> bool {
        self.shape_type == ShapeType::Null
    }

    pub fn point_count(&self) -> usize {
        self.parts.iter().map(|p| p.0.len()).sum()
    }
}

impl fmt::Display for ShapeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: ", self.index, self.shape_type)?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// Reads the 100-byte header shared by ".shp" and ".shx" files.
///
/// Side-effect: advances the cursor 100 bytes.
pub(crate) fn read_shp_header<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<ShpHeader, ShpError> {
    let buf = reader.read_fixed(SHP_HEADER_LENGTH)?;

    let magic_number = BigEndian::read_i32(&buf[0..4]);
    let file_len = BigEndian::read_i32(&buf[24..28]);
    let version = LittleEndian::read_i32(&buf[28..32]);
    let shape_type_code = LittleEndian::read_i32(&buf[32..36]);
    let bounding_box = ShpBoundingBox {
        x_min: LittleEndian::read_f64(&buf[36..44]),
        y_min: LittleEndian::read_f64(&buf[44..52]),
        x_max: LittleEndian::read_f64(&buf[52..60]),
        y_max: LittleEndian::read_f64(&buf[60..68]),
        z_min: LittleEndian::read_f64(&buf[68..76]),
        z_max: LittleEndian::read_f64(&buf[76..84]),
        m_min: LittleEndian::read_f64(&buf[84..92]),
        m_max: LittleEndian::read_f64(&buf[92..100]),
    };

    if magic_number != SHP_MAGIC_NUMBER {
        return Err(ShpError::InvalidFormat(format!("File has wrong magic number: found {}, expected {}", magic_number, SHP_MAGIC_NUMBER)));
    }

    if version != SHP_VERSION {
        return Err(ShpError::InvalidFormat(format!("File has wrong version: found {}, expected {}", version, SHP_VERSION)));
    }

    let file_n_bytes = (file_len as i64) * 2;
    if file_n_bytes < SHP_HEADER_LENGTH as i64 {
        return Err(ShpError::InvalidFormat(format!("File header says the file is {} bytes long, shorter than the header itself", file_n_bytes)));
    }

    let shape_type = ShapeType::with_code(shape_type_code)
        .ok_or_else(|| ShpError::InvalidFormat(format!("File has nonexistent shape type {}", shape_type_code)))?;

    if file_n_bytes > SHP_HEADER_LENGTH as i64 && shape_type != ShapeType::Null && !bounding_box.is_ordered() {
        return Err(ShpError::InvalidFormat(format!("File has an inverted bounding box: {:?}", bounding_box)));
    }

    Ok(ShpHeader {
        file_n_bytes: file_n_bytes as u64,
        shape_type: shape_type,
        bounding_box: bounding_box,
    })
}

/// Cursor over one record's content bytes.
///
/// Every read is bounds-checked against the content length the record header
/// declared, so a lying header surfaces as a parse error instead of a read
/// into the next record.
struct Content<'a> {
    buf: &'a [u8],
    pos: usize,
    record_number: i32,
}

impl<'a> Content<'a> {
    fn new(buf: &'a [u8], record_number: i32) -> Content<'a> {
        Content { buf: buf, pos: 0, record_number: record_number }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ShpError> {
        if n > self.remaining() {
            return Err(ShpError::InvalidFormat(format!("Record number {} needs more than the {} bytes its header declares", self.record_number, self.buf.len())));
        }
        let slice = &self.buf[self.pos .. self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn i32(&mut self) -> Result<i32, ShpError> {
        self.take(4).map(LittleEndian::read_i32)
    }

    fn f64(&mut self) -> Result<f64, ShpError> {
        self.take(8).map(LittleEndian::read_f64)
    }

    /// Reads a non-negative count and checks that `per_item` bytes for each
    /// item could still fit, before anything gets allocated.
    fn count(&mut self, what: &str, per_item: usize) -> Result<usize, ShpError> {
        let n = self.i32()?;
        if n < 0 || (n as usize).saturating_mul(per_item) > self.remaining() {
            return Err(ShpError::InvalidFormat(format!("Record number {} has {} {}, which cannot fit in its {} bytes", self.record_number, n, what, self.buf.len())));
        }
        Ok(n as usize)
    }

    fn bounding_box(&mut self) -> Result<ShpBoundingBox, ShpError> {
        let bbox = ShpBoundingBox {
            x_min: self.f64()?,
            y_min: self.f64()?,
            x_max: self.f64()?,
            y_max: self.f64()?,
            ..Default::default()
        };
        if !bbox.is_ordered() {
            return Err(ShpError::InvalidFormat(format!("Record number {} has an inverted bounding box: {:?}", self.record_number, bbox)));
        }
        Ok(bbox)
    }

    fn points(&mut self, n: usize) -> Result<Vec<ShpPoint>, ShpError> {
        let bytes = self.take(n * SHP_POINT_LENGTH)?;
        Ok(bytes.chunks(SHP_POINT_LENGTH)
            .map(|b| ShpPoint::xy(LittleEndian::read_f64(&b[0..8]), LittleEndian::read_f64(&b[8..16])))
            .collect())
    }

    /// Reads a [min, max] range followed by one value per point.
    fn range_and_values(&mut self, n: usize) -> Result<((f64, f64), Vec<f64>), ShpError> {
        let min = self.f64()?;
        let max = self.f64()?;
        let bytes = self.take(n * 8)?;
        Ok(((min, max), bytes.chunks(8).map(LittleEndian::read_f64).collect()))
    }
}

fn measure(m: f64) -> Option<f64> {
    if m < SHP_NO_DATA {
        None
    } else {
        Some(m)
    }
}

struct Decoded {
    bounding_box: ShpBoundingBox,
    parts: Vec<ShpRing>,
    part_types: Vec<PatchType>,
}

fn parse_point(c: &mut Content<'_>, shape_type: ShapeType) -> Result<Decoded, ShpError> {
    let mut point = ShpPoint::xy(c.f64()?, c.f64()?);

    if shape_type.has_z() {
        point.z = Some(c.f64()?);
        if c.remaining() >= 8 {
            point.m = measure(c.f64()?);
        }
    } else if shape_type.has_m() {
        point.m = measure(c.f64()?);
    }

    Ok(Decoded {
        bounding_box: ShpBoundingBox::of_point(&point),
        parts: vec![ ShpRing(vec![ point ].into_boxed_slice()) ],
        part_types: vec![],
    })
}

/// Reads the optional z and m sections that trail the x/y points of
/// MultiPoint, PolyLine, Polygon and MultiPatch records.
fn parse_z_and_m(c: &mut Content<'_>, shape_type: ShapeType, bbox: &mut ShpBoundingBox, points: &mut [ShpPoint]) -> Result<(), ShpError> {
    let n = points.len();

    if shape_type.has_z() {
        let ((z_min, z_max), zs) = c.range_and_values(n)?;
        bbox.z_min = z_min;
        bbox.z_max = z_max;
        for (point, z) in points.iter_mut().zip(zs) {
            point.z = Some(z);
        }
    }

    // Z types may omit measures entirely; M types must have them.
    if shape_type.has_m() || (shape_type.has_z() && c.remaining() > 0) {
        let ((m_min, m_max), ms) = c.range_and_values(n)?;
        bbox.m_min = m_min;
        bbox.m_max = m_max;
        for (point, m) in points.iter_mut().zip(ms) {
            point.m = measure(m);
        }
    }

    Ok(())
}

fn parse_multipoint(c: &mut Content<'_>, shape_type: ShapeType) -> Result<Decoded, ShpError> {
    let mut bbox = c.bounding_box()?;
    let num_points = c.count("points", SHP_POINT_LENGTH)?;
    let mut points = c.points(num_points)?;
    parse_z_and_m(c, shape_type, &mut bbox, &mut points)?;

    let parts = if points.is_empty() {
        vec![]
    } else {
        vec![ ShpRing(points.into_boxed_slice()) ]
    };

    Ok(Decoded {
        bounding_box: bbox,
        parts: parts,
        part_types: vec![],
    })
}

/// Splits `points` at the part start indices. Ring i spans
/// `points[parts[i] .. parts[i + 1]]`; the last ring runs to the end. The
/// rings cover every point, so the first part must start at 0.
fn split_rings(points: &[ShpPoint], parts: &[usize], record_number: i32) -> Result<Vec<ShpRing>, ShpError> {
    if parts.is_empty() {
        return if points.is_empty() {
            Ok(vec![])
        } else {
            Err(ShpError::InvalidFormat(format!("Record number {} has {} points but no parts", record_number, points.len())))
        };
    }

    if parts[0] != 0 {
        return Err(ShpError::InvalidFormat(format!("Record number {} has its first part starting at point {}, but parts must start at point 0", record_number, parts[0])));
    }

    let mut bounds = parts.to_vec();
    bounds.push(points.len());

    let mut rings = Vec::<ShpRing>::with_capacity(parts.len());
    for (&part_start, &part_end) in bounds.iter().tuple_windows() {
        if part_start >= points.len() {
            return Err(ShpError::InvalidFormat(format!("Record number {} has a part starting at point {}, but there are only {} points in the record", record_number, part_start, points.len())));
        }

        if part_start >= part_end {
            return Err(ShpError::InvalidFormat(format!("Record number {} has a part with points {}-{}, but part starts must be strictly increasing", record_number, part_start, part_end)));
        }

        rings.push(ShpRing(points[part_start .. part_end].to_vec().into_boxed_slice()));
    }

    Ok(rings)
}

fn parse_multipart(c: &mut Content<'_>, shape_type: ShapeType) -> Result<Decoded, ShpError> {
    let is_multipatch = shape_type == ShapeType::MultiPatch;

    let mut bbox = c.bounding_box()?;
    let num_parts = c.count("parts", if is_multipatch { 8 } else { 4 })?;
    let num_points = c.count("points", SHP_POINT_LENGTH)?;

    let mut parts = Vec::<usize>::with_capacity(num_parts);
    for _ in 0 .. num_parts {
        let start = c.i32()?;
        if start < 0 {
            return Err(ShpError::InvalidFormat(format!("Record number {} has a negative part start {}", c.record_number, start)));
        }
        parts.push(start as usize);
    }

    let mut part_types = Vec::<PatchType>::new();
    if is_multipatch {
        part_types.reserve(num_parts);
        for _ in 0 .. num_parts {
            let code = c.i32()?;
            let part_type = PatchType::with_code(code)
                .ok_or_else(|| ShpError::InvalidFormat(format!("Record number {} has unknown MultiPatch part type {}", c.record_number, code)))?;
            part_types.push(part_type);
        }
    }

    let mut points = c.points(num_points)?;
    parse_z_and_m(c, shape_type, &mut bbox, &mut points)?;

    Ok(Decoded {
        bounding_box: bbox,
        parts: split_rings(&points, &parts, c.record_number)?,
        part_types: part_types,
    })
}

/// Decodes one record's content (everything after the 8-byte record header).
///
/// `buf` must be exactly the declared content length; any bytes left over once
/// the shape is decoded are an error.
pub(crate) fn parse_record(buf: &[u8], index: usize, record_number: i32, file_shape_type: ShapeType) -> Result<ShapeRecord, ShpError> {
    let mut c = Content::new(buf, record_number);

    let code = c.i32()?;
    let shape_type = ShapeType::with_code(code)
        .ok_or_else(|| ShpError::InvalidFormat(format!("Record number {} has nonexistent shape type {}", record_number, code)))?;

    if shape_type != ShapeType::Null && shape_type != file_shape_type {
        return Err(ShpError::InvalidFormat(format!("Record number {} has shape type {}, but the file holds {}", record_number, shape_type, file_shape_type)));
    }

    let decoded = match shape_type.family() {
        ShapeFamily::Null => Decoded {
            bounding_box: ShpBoundingBox::default(),
            parts: vec![],
            part_types: vec![],
        },
        ShapeFamily::Point => parse_point(&mut c, shape_type)?,
        ShapeFamily::MultiPoint => parse_multipoint(&mut c, shape_type)?,
        ShapeFamily::PolyLine | ShapeFamily::Polygon | ShapeFamily::MultiPatch => parse_multipart(&mut c, shape_type)?,
    };

    if c.remaining() != 0 {
        return Err(ShpError::InvalidFormat(format!("Record number {} declares {} bytes, but its {} shape only uses {}", record_number, buf.len(), shape_type, c.pos)));
    }

    Ok(ShapeRecord {
        index: index,
        record_number: record_number,
        shape_type: shape_type,
        bounding_box: decoded.bounding_box,
        parts: decoded.parts.into_boxed_slice(),
        part_types: decoded.part_types.into_boxed_slice(),
    })
}

/// Reads an ESRI ".shp" Shapefile record by record.
///
/// Iterating yields records in file order. After the first error the iterator
/// is exhausted: a broken record leaves no trustworthy position for the next.
///
/// # Example
///
/// ```
/// use std::fs;
/// use std::io;
/// use shpread::read::shapefile::shp::{ShpPoint, ShpReader};
///
/// # let mut path = std::env::current_dir().unwrap();
/// # path.push("test/fixtures/springfield.shp");
///
/// let f = fs::File::open(&path).unwrap();
/// let r = io::BufReader::new(f);
///
/// // builder returns Result<ShpReader, ShpError>
/// let mut shp_reader = ShpReader::new(r).unwrap();
///
/// assert_eq!(128, shp_reader.header.file_n_bytes);
///
/// // shp_reader.next(), an Iterator method, returns
/// // Option<Result<ShapeRecord, ShpError>>
/// let record = shp_reader.next().unwrap().unwrap();
///
/// assert_eq!(1, record.parts.len());
/// assert_eq!(ShpPoint::xy(10., 20.), record.parts[0].0[0]);
/// assert!(shp_reader.next().is_none());
/// ```
#[derive(Debug)]
pub struct ShpReader<R> {
    reader: ByteReader<R>,
    pub header: ShpHeader,
    next_index: usize,
    failed: bool,
}

impl<R: Read + Seek> ShpReader<R> {
    pub fn new(source: R) -> Result<ShpReader<R>, ShpError> {
        ShpReader::from_byte_reader(ByteReader::new(source)?)
    }

    pub fn from_byte_reader(mut reader: ByteReader<R>) -> Result<ShpReader<R>, ShpError> {
        let header = read_shp_header(&mut reader)?;
        if reader.len() < header.file_n_bytes {
            debug!(".shp header declares {} bytes but the file has {}", header.file_n_bytes, reader.len());
        }
        Ok(ShpReader {
            reader: reader,
            header: header,
            next_index: 0,
            failed: false,
        })
    }

    /// `true` once the cursor has reached the length the header declares.
    pub fn is_done(&self) -> bool {
        self.reader.tell() >= self.header.file_n_bytes
    }

    /// Bytes in the stream beyond the length the header declares.
    pub fn trailing_bytes(&self) -> u64 {
        self.reader.len().saturating_sub(self.header.file_n_bytes)
    }

    /// Reads the record at the cursor, assigning it the next ordinal index.
    ///
    /// Side effect: advances the cursor past the record.
    pub fn read_record(&mut self) -> Result<ShapeRecord, ShpError> {
        let (record, _) = self.read_record_with_length()?;
        Ok(record)
    }

    /// Positions the cursor at record `index`, as located by the ".shx" index,
    /// without reading records `0 .. index`.
    pub fn seek_to_record(&mut self, index: usize, shx: &ShapeIndex) -> Result<(), ShpError> {
        let entry = shx.entry(index).ok_or(ShpError::IndexOutOfRange { index: index, len: shx.len() })?;
        self.reader.seek(entry.byte_offset())?;
        self.next_index = index;
        self.failed = false;
        Ok(())
    }

    /// Reads record `index` at the location `entry` gives, checking that the
    /// record header agrees with the index about the content length.
    pub fn read_record_at(&mut self, index: usize, entry: &ShxEntry) -> Result<ShapeRecord, ShpError> {
        self.reader.seek(entry.byte_offset())?;
        self.next_index = index;

        let (record, content_length) = self.read_record_with_length()?;
        if content_length != entry.content_n_bytes() {
            return Err(ShpError::InvalidFormat(format!("Record {} is {} bytes long according to the .shx index, but {} bytes according to the .shp file", index, entry.content_n_bytes(), content_length)));
        }
        Ok(record)
    }

    fn read_record_with_length(&mut self) -> Result<(ShapeRecord, usize), ShpError> {
        let header_buf = self.reader.read_fixed(SHP_RECORD_HEADER_LENGTH)?;
        let record_number = BigEndian::read_i32(&header_buf[0..4]);
        let content_length = BigEndian::read_i32(&header_buf[4..8]);

        if content_length < 2 {
            return Err(ShpError::InvalidFormat(format!("Record number {} has content length {} words; a record needs at least its 2-word shape type", record_number, content_length)));
        }

        let index = self.next_index;
        if record_number as i64 != index as i64 + 1 {
            warn!("Record {} of the .shp file is numbered {}", index, record_number);
        }

        let content_n_bytes = content_length as usize * 2;
        let end = self.reader.tell() + content_n_bytes as u64;
        if end > self.header.file_n_bytes {
            return Err(ShpError::InvalidFormat(format!("Record number {} ends at byte {}, but the Shapefile header says the file is {} bytes long", record_number, end, self.header.file_n_bytes)));
        }

        let buf = self.reader.read_fixed(content_n_bytes)?;
        let record = parse_record(&buf, index, record_number, self.header.shape_type)?;
        self.next_index += 1;
        Ok((record, content_n_bytes))
    }

    pub fn into_byte_reader(self) -> ByteReader<R> {
        self.reader
    }
}

impl<R: Read + Seek> Iterator for ShpReader<R> {
    type Item = Result<ShapeRecord, ShpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.is_done() {
            return None;
        }

        let ret = self.read_record();
        if ret.is_err() {
            self.failed = true;
        }
        Some(ret)
    }
}

/// All records of a ".shp" file, loaded up front.
#[derive(Debug, Clone)]
pub struct ShapeFile {
    pub header: ShpHeader,
    records: Box<[ShapeRecord]>,
}

impl ShapeFile {
    /// Loads every record with a sequential scan.
    pub fn from_shp_reader<R: Read + Seek>(mut shp_reader: ShpReader<R>) -> Result<ShapeFile, ShpError> {
        let mut records = Vec::<ShapeRecord>::new();
        while !shp_reader.is_done() {
            records.push(shp_reader.read_record()?);
        }

        let trailing = shp_reader.trailing_bytes();
        if trailing > 0 {
            warn!("Ignoring {} bytes after the end the .shp header declares", trailing);
        }

        Ok(ShapeFile {
            header: shp_reader.header,
            records: records.into_boxed_slice(),
        })
    }

    /// Loads every record by seeking to the offsets in `shx`.
    pub fn from_indexed_reader<R: Read + Seek>(mut shp_reader: ShpReader<R>, shx: &ShapeIndex) -> Result<ShapeFile, ShpError> {
        if shx.header.shape_type != shp_reader.header.shape_type {
            return Err(ShpError::InvalidFormat(format!("The .shx index holds {} shapes, but the .shp file holds {}", shx.header.shape_type, shp_reader.header.shape_type)));
        }

        let mut records = Vec::<ShapeRecord>::with_capacity(shx.len());
        for (index, entry) in shx.entries().iter().enumerate() {
            records.push(shp_reader.read_record_at(index, entry)?);
        }

        if shp_reader.reader.tell() < shp_reader.header.file_n_bytes {
            warn!("The .shx index lists {} records, which end before the end of the .shp file", shx.len());
        }

        Ok(ShapeFile {
            header: shp_reader.header,
            records: records.into_boxed_slice(),
        })
    }

    pub fn shape_type(&self) -> ShapeType {
        self.header.shape_type
    }

    pub fn bounding_box(&self) -> &ShpBoundingBox {
        &self.header.bounding_box
    }

    pub fn shape_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ShapeRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&ShapeRecord> {
        self.records.get(index)
    }

    /// Like `record()`, but a bad index is an error.
    pub fn record_at(&self, index: usize) -> Result<&ShapeRecord, ShpError> {
        self.records.get(index).ok_or(ShpError::IndexOutOfRange { index: index, len: self.records.len() })
    }
}
