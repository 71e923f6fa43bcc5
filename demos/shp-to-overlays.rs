extern crate shpread;

use std::env;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use shpread::read::shapefile;

/// Reads the given .shp file and outputs each record as map overlays:
/// polygons with holes, polylines or points, in (latitude,longitude).
fn main() {
    let mut args = env::args();

    if args.len() != 2 {
        writeln!(&mut io::stderr(), "Usage: {} <SHP_PATH>", args.next().unwrap()).unwrap();
        process::exit(1);
    }

    args.next();
    let path = PathBuf::from(args.next().unwrap());

    match shapefile::ShapeFile::open(&path) {
        Err(err) => {
            writeln!(&mut io::stderr(), "{}", err).unwrap();
            process::exit(1);
        }
        Ok(shape_file) => {
            let mut n_overlays: usize = 0;

            for index in 0..shape_file.shape_count() {
                match shape_file.overlays_for_index(index) {
                    Err(err) => {
                        writeln!(&mut io::stderr(), "Error during read: {}", err).unwrap();
                        process::exit(1);
                    }
                    Ok(overlays) => {
                        for overlay in overlays {
                            println!("{}: {}", index, overlay);
                            n_overlays += 1;
                        }
                    }
                }
            }

            println!("Read {} overlays", n_overlays);
        }
    }
}
