//! Reads ".shp" files, their ".shx" indexes and accompanying ".dbf" files.
//!
//! There are two pieces of information these files _don't_ contain:
//!
//! * The _projection_ isn't specified. Sometimes there's a ".prj" file that
//!   contains that information, but no file format can represent all the
//!   projections out there in the world. This library ignores the file and
//!   returns `f64` points.
//! * The ".dbf" text encoding. See `options` for how we guess it.
//!
//! # Examples
//!
//! Open by ".shp" filename; the ".shx" and ".dbf" beside it are found
//! automatically:
//!
//! ```
//! use shpread::read::shapefile;
//!
//! # let mut path = std::env::current_dir().unwrap();
//! # path.push("test/fixtures/springfield.shp");
//! let dataset = shapefile::open_utf8(&path).unwrap();
//!
//! for (shape, row) in dataset.iter() {
//!     println!("{} {:?}", shape, row);
//! }
//! ```
//!
//! Open by `io::Read + io::Seek` implementor:
//!
//! ```
//! use std::fs;
//! use std::io;
//! use shpread::read::shapefile::{Dataset, OpenOptions};
//!
//! # let mut path = std::env::current_dir().unwrap();
//! # path.push("test/fixtures/springfield.shp");
//! let shp_r = io::BufReader::new(fs::File::open(&path).unwrap());
//! path.set_extension("dbf");
//! let dbf_r = io::BufReader::new(fs::File::open(&path).unwrap());
//!
//! let options = OpenOptions::new().encoding(encoding::all::UTF_8);
//! let dataset = Dataset::from_readers(shp_r, None::<io::Cursor<Vec<u8>>>, Some(dbf_r), &options).unwrap();
//! assert_eq!(1, dataset.len());
//! ```
//!
//! Dump DBF data:
//!
//! ```
//! use shpread::read::shapefile;
//!
//! # let mut path = std::env::current_dir().unwrap();
//! # path.push("test/fixtures/springfield.shp");
//! let dataset = shapefile::open_utf8(&path).unwrap();
//! let database = dataset.database().unwrap();
//!
//! for row in database.rows() {
//!     for (field, value) in database.fields().iter().zip(row.values.iter()) {
//!         print!("{}: {}; ", field.name, value);
//!     }
//!     println!("");
//! }
//! ```

use std::path::{Path, PathBuf};
use encoding::{self, EncodingRef};

pub mod dbf;
pub mod geo;
pub mod options;
pub mod shapefile;
pub mod shp;
pub mod shx;

#[cfg(test)]
mod testutil;

pub use self::dbf::{Database, DbfError, DbfField, DbfType, DbfValue, Row};
pub use self::options::{MalformedValues, OpenOptions};
pub use self::shapefile::{Dataset, ShapefileError};
pub use self::shp::{PatchType, ShapeFile, ShapeRecord, ShapeType, ShpBoundingBox, ShpError, ShpPoint, ShpRing};
pub use self::shx::{ShapeIndex, ShxEntry, ShxError};

/// Finds the file beside `path` with extension `ext`, trying lowercase then
/// uppercase ("roads.dbf", then "roads.DBF").
pub(crate) fn sibling_path(path: &Path, ext: &str) -> Option<PathBuf> {
    let lower = path.with_extension(ext.to_lowercase());
    if lower.is_file() {
        return Some(lower);
    }

    let upper = path.with_extension(ext.to_uppercase());
    if upper.is_file() {
        return Some(upper);
    }

    None
}

/// Opens a ".shp" file along with the ".shx" and ".dbf" files beside it,
/// decoding ".dbf" text with `encoding`.
///
/// A missing ".dbf" gives a geometry-only dataset.
pub fn open(shp_path: &Path, encoding: EncodingRef) -> Result<Dataset, ShapefileError> {
    open_with(shp_path, &OpenOptions::new().encoding(encoding))
}

/// Opens a ".shp" file along with whichever of its ".shx", ".dbf" and ".cpg"
/// siblings exist.
pub fn open_with(shp_path: &Path, options: &OpenOptions) -> Result<Dataset, ShapefileError> {
    let dbf_path = sibling_path(shp_path, "dbf");
    if dbf_path.is_none() {
        debug!("No .dbf beside {}", shp_path.display());
    }
    Dataset::open_with(shp_path, dbf_path.as_ref().map(|p| p.as_path()), options)
}

pub fn open_ascii(shp_path: &Path) -> Result<Dataset, ShapefileError> {
    open(shp_path, encoding::all::ASCII)
}

pub fn open_utf8(shp_path: &Path) -> Result<Dataset, ShapefileError> {
    open(shp_path, encoding::all::UTF_8)
}

pub fn open_windows1252(shp_path: &Path) -> Result<Dataset, ShapefileError> {
    open(shp_path, encoding::all::WINDOWS_1252)
}

#[cfg(test)]
mod test {
    use std::fs;
    use super::*;

    #[test]
    fn sibling_path_tries_uppercase() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("roads.shp");
        fs::write(dir.path().join("roads.DBF"), b"").unwrap();
        fs::write(dir.path().join("roads.shx"), b"").unwrap();

        assert_eq!(Some(dir.path().join("roads.DBF")), sibling_path(&shp, "dbf"));
        assert_eq!(Some(dir.path().join("roads.shx")), sibling_path(&shp, "shx"));
        assert_eq!(None, sibling_path(&shp, "cpg"));
    }
}
