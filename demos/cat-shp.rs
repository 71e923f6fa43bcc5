extern crate shpread;

use std::env;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use shpread::read::shapefile;

/// Prints every shape of the given .shp file, with its .dbf row if there is
/// one.
fn main() {
    let mut args = env::args();

    if args.len() != 2 {
        writeln!(&mut io::stderr(), "Usage: {} <SHP_PATH>", args.next().unwrap()).unwrap();
        process::exit(1);
    }

    args.next();
    let path = PathBuf::from(args.next().unwrap());

    match shapefile::open_with(&path, &shapefile::OpenOptions::new()) {
        Err(err) => {
            writeln!(&mut io::stderr(), "{}", err).unwrap();
            process::exit(1);
        }
        Ok(dataset) => {
            let names: Vec<&str> = dataset.fields().iter().map(|f| f.name.as_str()).collect();
            println!("{} {} records; fields: {}", dataset.len(), dataset.shape_file().shape_type(), names.join(", "));

            for (shape, row) in dataset.iter() {
                println!("{}", shape);
                if let Some(row) = row {
                    let deleted = if row.deleted { " (deleted)" } else { "" };
                    let values: Vec<String> = names.iter()
                        .zip(row.values.iter())
                        .map(|(name, value)| format!("{}={}", name, value))
                        .collect();
                    println!("  {}{}", values.join("; "), deleted);
                }
            }

            println!("Read {} records", dataset.len());
        }
    }
}
