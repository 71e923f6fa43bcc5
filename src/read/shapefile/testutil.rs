//! Builds small ".shp", ".shx" and ".dbf" files in memory for unit tests.

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use super::shp::{ShapeType, SHP_MAGIC_NUMBER};

fn bbox_of(points: &[(f64, f64)]) -> [f64; 4] {
    let mut b = [ ::std::f64::MAX, ::std::f64::MAX, ::std::f64::MIN, ::std::f64::MIN ];
    for &(x, y) in points {
        b[0] = b[0].min(x);
        b[1] = b[1].min(y);
        b[2] = b[2].max(x);
        b[3] = b[3].max(y);
    }
    if points.is_empty() {
        [ 0., 0., 0., 0. ]
    } else {
        b
    }
}

/// Starts a record: 8-byte header (content length patched later) + type.
fn record_start(record_number: i32, shape_type: ShapeType) -> Vec<u8> {
    let mut v = Vec::new();
    v.write_i32::<BigEndian>(record_number).unwrap();
    v.write_i32::<BigEndian>(0).unwrap();
    v.write_i32::<LittleEndian>(shape_type.code()).unwrap();
    v
}

/// Rewrites the record header's content length from the record's size.
pub fn set_content_length(record: &mut Vec<u8>) {
    let words = ((record.len() - 8) / 2) as i32;
    record[4..8].copy_from_slice(&words.to_be_bytes());
}

fn finish(mut record: Vec<u8>) -> Vec<u8> {
    set_content_length(&mut record);
    record
}

fn write_f64s(v: &mut Vec<u8>, values: &[f64]) {
    for &f in values {
        v.write_f64::<LittleEndian>(f).unwrap();
    }
}

pub fn null_record(record_number: i32) -> Vec<u8> {
    finish(record_start(record_number, ShapeType::Null))
}

pub fn point_record(record_number: i32, x: f64, y: f64) -> Vec<u8> {
    let mut v = record_start(record_number, ShapeType::Point);
    write_f64s(&mut v, &[ x, y ]);
    finish(v)
}

pub fn point_z_record(record_number: i32, p: (f64, f64, f64), m: Option<f64>) -> Vec<u8> {
    let mut v = record_start(record_number, ShapeType::PointZ);
    write_f64s(&mut v, &[ p.0, p.1, p.2 ]);
    if let Some(m) = m {
        write_f64s(&mut v, &[ m ]);
    }
    finish(v)
}

pub fn point_m_record(record_number: i32, p: (f64, f64), m: f64) -> Vec<u8> {
    let mut v = record_start(record_number, ShapeType::PointM);
    write_f64s(&mut v, &[ p.0, p.1, m ]);
    finish(v)
}

/// Writes a [min, max] range then the values, as the z and m sections do.
fn write_range_and_values(v: &mut Vec<u8>, values: &[f64]) {
    let real: Vec<f64> = values.iter().cloned().filter(|&f| f > -1e38).collect();
    let min = real.iter().cloned().fold(::std::f64::MAX, f64::min);
    let max = real.iter().cloned().fold(::std::f64::MIN, f64::max);
    write_f64s(v, &[ min, max ]);
    write_f64s(v, values);
}

/// MultiPointZ record; `ms` of `None` leaves out the optional m section.
pub fn multipoint_z_record(record_number: i32, points: &[(f64, f64, f64)], ms: Option<&[f64]>) -> Vec<u8> {
    let mut v = record_start(record_number, ShapeType::MultiPointZ);
    let xy: Vec<(f64, f64)> = points.iter().map(|p| (p.0, p.1)).collect();
    write_f64s(&mut v, &bbox_of(&xy));
    v.write_i32::<LittleEndian>(points.len() as i32).unwrap();
    for &(x, y) in &xy {
        write_f64s(&mut v, &[ x, y ]);
    }
    let zs: Vec<f64> = points.iter().map(|p| p.2).collect();
    write_range_and_values(&mut v, &zs);
    if let Some(ms) = ms {
        write_range_and_values(&mut v, ms);
    }
    finish(v)
}

pub fn multipoint_record(record_number: i32, points: &[(f64, f64)]) -> Vec<u8> {
    let mut v = record_start(record_number, ShapeType::MultiPoint);
    write_f64s(&mut v, &bbox_of(points));
    v.write_i32::<LittleEndian>(points.len() as i32).unwrap();
    for &(x, y) in points {
        write_f64s(&mut v, &[ x, y ]);
    }
    finish(v)
}

/// Writes bbox, part count, point count, part starts, then `extra` (for
/// MultiPatch part types), then the points.
fn multipart_body(v: &mut Vec<u8>, rings: &[Vec<(f64, f64)>], extra: &[i32]) {
    let all: Vec<(f64, f64)> = rings.iter().flat_map(|r| r.iter().cloned()).collect();
    write_f64s(v, &bbox_of(&all));
    v.write_i32::<LittleEndian>(rings.len() as i32).unwrap();
    v.write_i32::<LittleEndian>(all.len() as i32).unwrap();
    let mut start = 0;
    for ring in rings {
        v.write_i32::<LittleEndian>(start).unwrap();
        start += ring.len() as i32;
    }
    for &e in extra {
        v.write_i32::<LittleEndian>(e).unwrap();
    }
    for &(x, y) in &all {
        write_f64s(v, &[ x, y ]);
    }
}

/// PolyLine or Polygon record, one part per ring.
pub fn polygon_record(record_number: i32, shape_type: ShapeType, rings: &[Vec<(f64, f64)>]) -> Vec<u8> {
    let mut v = record_start(record_number, shape_type);
    multipart_body(&mut v, rings, &[]);
    finish(v)
}

/// PolyLineM or PolygonM record: rings, then one measure per point.
pub fn multipart_m_record(record_number: i32, shape_type: ShapeType, rings: &[Vec<(f64, f64)>], ms: &[f64]) -> Vec<u8> {
    let mut v = record_start(record_number, shape_type);
    multipart_body(&mut v, rings, &[]);
    write_range_and_values(&mut v, ms);
    finish(v)
}

/// Single-part PolyLineZ record with z and m arrays.
pub fn polyline_z_record(record_number: i32, points: &[(f64, f64, f64, f64)]) -> Vec<u8> {
    let mut v = record_start(record_number, ShapeType::PolyLineZ);
    let xy: Vec<(f64, f64)> = points.iter().map(|p| (p.0, p.1)).collect();
    multipart_body(&mut v, &[ xy ], &[]);
    let zs: Vec<f64> = points.iter().map(|p| p.2).collect();
    let ms: Vec<f64> = points.iter().map(|p| p.3).collect();
    write_f64s(&mut v, &[ zs.iter().cloned().fold(::std::f64::MAX, f64::min), zs.iter().cloned().fold(::std::f64::MIN, f64::max) ]);
    write_f64s(&mut v, &zs);
    write_f64s(&mut v, &[ 0., 0. ]);
    write_f64s(&mut v, &ms);
    finish(v)
}

/// MultiPatch record with z values and no measures.
pub fn multipatch_record(record_number: i32, parts: &[(i32, Vec<(f64, f64, f64)>)]) -> Vec<u8> {
    let mut v = record_start(record_number, ShapeType::MultiPatch);
    let rings: Vec<Vec<(f64, f64)>> = parts.iter().map(|&(_, ref ps)| ps.iter().map(|p| (p.0, p.1)).collect()).collect();
    let types: Vec<i32> = parts.iter().map(|&(t, _)| t).collect();
    multipart_body(&mut v, &rings, &types);
    let zs: Vec<f64> = parts.iter().flat_map(|&(_, ref ps)| ps.iter().map(|p| p.2)).collect();
    write_f64s(&mut v, &[ zs.iter().cloned().fold(::std::f64::MAX, f64::min), zs.iter().cloned().fold(::std::f64::MIN, f64::max) ]);
    write_f64s(&mut v, &zs);
    finish(v)
}

fn main_header(shape_type: ShapeType, file_n_bytes: usize) -> Vec<u8> {
    let mut v = Vec::with_capacity(100);
    v.write_i32::<BigEndian>(SHP_MAGIC_NUMBER).unwrap();
    for _ in 0..5 {
        v.write_i32::<BigEndian>(0).unwrap();
    }
    v.write_i32::<BigEndian>((file_n_bytes / 2) as i32).unwrap();
    v.write_i32::<LittleEndian>(1000).unwrap();
    v.write_i32::<LittleEndian>(shape_type.code()).unwrap();
    write_f64s(&mut v, &[ -180., -90., 180., 90., 0., 0., 0., 0. ]);
    v
}

pub fn shp_file(shape_type: ShapeType, records: &[Vec<u8>]) -> Vec<u8> {
    let len = 100 + records.iter().map(|r| r.len()).sum::<usize>();
    let mut v = main_header(shape_type, len);
    for r in records {
        v.extend_from_slice(r);
    }
    v
}

pub fn shx_file(shape_type: ShapeType, records: &[Vec<u8>]) -> Vec<u8> {
    let mut v = main_header(shape_type, 100 + 8 * records.len());
    let mut offset = 100;
    for r in records {
        v.write_i32::<BigEndian>((offset / 2) as i32).unwrap();
        v.write_i32::<BigEndian>(((r.len() - 8) / 2) as i32).unwrap();
        offset += r.len();
    }
    v
}

/// `fields` are (name, type code, length, decimal count); `rows` are
/// (deleted, values), each value padded to its field length.
pub fn dbf_file(fields: &[(&str, u8, u8, u8)], rows: &[(bool, Vec<&str>)]) -> Vec<u8> {
    let header_len = 32 + 32 * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|f| f.2 as usize).sum::<usize>();

    let mut v = Vec::new();
    v.push(0x03);
    v.extend_from_slice(&[ 120, 6, 15 ]);
    v.write_u32::<LittleEndian>(rows.len() as u32).unwrap();
    v.write_u16::<LittleEndian>(header_len as u16).unwrap();
    v.write_u16::<LittleEndian>(record_len as u16).unwrap();
    v.extend_from_slice(&[ 0u8; 20 ]);

    for &(name, code, len, decimals) in fields {
        let mut descriptor = [ 0u8; 32 ];
        descriptor[.. name.len()].copy_from_slice(name.as_bytes());
        descriptor[11] = code;
        descriptor[16] = len;
        descriptor[17] = decimals;
        v.extend_from_slice(&descriptor);
    }
    v.push(0x0d);

    for &(deleted, ref values) in rows {
        v.push(if deleted { b'*' } else { b' ' });
        for (field, value) in fields.iter().zip(values.iter()) {
            let len = field.2 as usize;
            let mut cell = vec![ b' '; len ];
            let bytes = value.as_bytes();
            if field.1 == b'N' || field.1 == b'F' {
                // numbers are right-aligned
                cell[len - bytes.len() ..].copy_from_slice(bytes);
            } else {
                cell[.. bytes.len()].copy_from_slice(bytes);
            }
            v.extend_from_slice(&cell);
        }
    }
    v.push(0x1a);
    v
}
