pub mod bytes;
pub mod shapefile;
