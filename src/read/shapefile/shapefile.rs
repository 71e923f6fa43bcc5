use std::io::{Read, Seek};
use std::path::Path;

use thiserror::Error;

use crate::geo::{Coordinate, Overlay};
use super::super::bytes;
use super::dbf::{Database, DbfError, DbfField, Row};
use super::geo;
use super::options::OpenOptions;
use super::shp::{ShapeFile, ShapeRecord, ShpError, ShpReader};
use super::shx::{self, ShapeIndex, ShxError};

#[derive(Debug, Error)]
pub enum ShapefileError {
    #[error(transparent)]
    ShpError(#[from] ShpError),

    #[error(transparent)]
    ShxError(#[from] ShxError),

    #[error(transparent)]
    DbfError(#[from] DbfError),

    #[error("Record {index} requested, but there are only {len} records")]
    IndexOutOfRange { index: usize, len: usize },

    /// The ".shp" and ".dbf" files disagree on how many records there are.
    #[error("The .shp file has {shapes} records, but the .dbf file has {rows}")]
    DatasetInconsistency { shapes: usize, rows: usize },
}

impl ShapeFile {
    /// Opens a ".shp" file, reading it through the ".shx" beside it if there
    /// is one.
    pub fn open(path: &Path) -> Result<ShapeFile, ShapefileError> {
        ShapeFile::open_with(path, &OpenOptions::new())
    }

    pub fn open_with(path: &Path, options: &OpenOptions) -> Result<ShapeFile, ShapefileError> {
        info!("Opening .shp file: {}", path.display());
        let file = bytes::open(path).map_err(ShpError::from)?;
        let shp_reader = ShpReader::from_byte_reader(file)?;

        let index = if options.use_index {
            match super::sibling_path(path, "shx") {
                Some(shx_path) => Some(shx::open(&shx_path)?),
                None => {
                    debug!("No .shx beside {}; scanning records in order", path.display());
                    None
                }
            }
        } else {
            None
        };

        let shape_file = match index {
            Some(ref index) => ShapeFile::from_indexed_reader(shp_reader, index)?,
            None => ShapeFile::from_shp_reader(shp_reader)?,
        };
        debug!("Read {} {} records", shape_file.shape_count(), shape_file.shape_type());
        Ok(shape_file)
    }
}

/// A ".shp" file and, optionally, its ".dbf" attribute table, joined by
/// position: shape `i` goes with row `i`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shpread::read::shapefile::Dataset;
///
/// # let mut path = std::env::current_dir().unwrap();
/// # path.push("test/fixtures/springfield.shp");
/// let dbf_path = path.with_extension("dbf");
/// let dataset = Dataset::open(&path, Some(dbf_path.as_path())).unwrap();
///
/// let (shape, row) = dataset.record_at(0).unwrap();
/// assert_eq!(1, shape.parts.len());
/// assert!(!row.unwrap().deleted);
///
/// // out of range is an error, not a panic
/// assert!(dataset.record_at(1).is_err());
/// ```
#[derive(Debug)]
pub struct Dataset {
    shape_file: ShapeFile,
    database: Option<Database>,
}

impl Dataset {
    /// Joins already-loaded files, checking they have the same number of
    /// records.
    pub fn new(shape_file: ShapeFile, database: Option<Database>) -> Result<Dataset, ShapefileError> {
        if let Some(ref db) = database {
            if db.record_count() != shape_file.shape_count() {
                return Err(ShapefileError::DatasetInconsistency {
                    shapes: shape_file.shape_count(),
                    rows: db.record_count(),
                });
            }
        }

        Ok(Dataset {
            shape_file: shape_file,
            database: database,
        })
    }

    /// Opens a ".shp" file and, if `dbf_path` is given, its ".dbf".
    pub fn open(shp_path: &Path, dbf_path: Option<&Path>) -> Result<Dataset, ShapefileError> {
        Dataset::open_with(shp_path, dbf_path, &OpenOptions::new())
    }

    pub fn open_with(shp_path: &Path, dbf_path: Option<&Path>, options: &OpenOptions) -> Result<Dataset, ShapefileError> {
        let shape_file = ShapeFile::open_with(shp_path, options)?;

        let database = match dbf_path {
            Some(dbf_path) if options.load_dbf => Some(Database::open_with(dbf_path, options)?),
            _ => None,
        };

        Dataset::new(shape_file, database)
    }

    /// Reads from in-memory or already-open sources.
    pub fn from_readers<R, S, T>(shp: R, shx: Option<S>, dbf: Option<T>, options: &OpenOptions) -> Result<Dataset, ShapefileError>
        where R: Read + Seek, S: Read + Seek, T: Read + Seek
    {
        let shp_reader = ShpReader::new(shp)?;
        let shape_file = match shx {
            Some(shx) if options.use_index => {
                let index = ShapeIndex::new(shx)?;
                ShapeFile::from_indexed_reader(shp_reader, &index)?
            }
            _ => ShapeFile::from_shp_reader(shp_reader)?,
        };

        let database = match dbf {
            Some(dbf) if options.load_dbf => Some(Database::from_reader(dbf, options)?),
            _ => None,
        };

        Dataset::new(shape_file, database)
    }

    pub fn shape_file(&self) -> &ShapeFile {
        &self.shape_file
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Attribute fields; empty without a ".dbf".
    pub fn fields(&self) -> &[DbfField] {
        match self.database {
            Some(ref db) => db.fields(),
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.shape_file.shape_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_index(&self, index: usize) -> Result<(), ShapefileError> {
        if index >= self.len() {
            Err(ShapefileError::IndexOutOfRange { index: index, len: self.len() })
        } else {
            Ok(())
        }
    }

    /// Shape `index` and, when there is a ".dbf", row `index`.
    pub fn record_at(&self, index: usize) -> Result<(&ShapeRecord, Option<&Row>), ShapefileError> {
        self.check_index(index)?;
        let shape = &self.shape_file.records()[index];
        let row = self.database.as_ref().and_then(|db| db.row(index));
        Ok((shape, row))
    }

    pub fn iter(&self) -> impl Iterator<Item=(&ShapeRecord, Option<&Row>)> + '_ {
        let database = self.database.as_ref();
        self.shape_file.records().iter()
            .map(move |shape| (shape, database.and_then(|db| db.row(shape.index))))
    }

    pub fn overlays_for_index(&self, index: usize) -> Result<Vec<Overlay>, ShapefileError> {
        self.check_index(index)?;
        Ok(geo::record_overlays(&self.shape_file.records()[index]))
    }

    pub fn coordinates_for_index(&self, index: usize) -> Result<Vec<Coordinate>, ShapefileError> {
        self.check_index(index)?;
        Ok(geo::record_coordinates(&self.shape_file.records()[index]))
    }
}
