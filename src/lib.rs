//! Reads ESRI shapefiles: ".shp" geometry, ".shx" record indexes and ".dbf"
//! attribute tables.

extern crate byteorder;
extern crate encoding;
extern crate itertools;
#[macro_use] extern crate lazy_static;
#[macro_use] extern crate log;
extern crate regex;
extern crate thiserror;

#[cfg(test)]
extern crate tempfile;

pub mod geo;
pub mod read;

pub use read::shapefile::{Dataset, OpenOptions, ShapefileError};
