//! Knobs for opening a shapefile dataset, and text encoding discovery.
//!
//! ".dbf" text has no self-describing encoding. We pick one, in order:
//!
//! 1. `OpenOptions::encoding`, when the caller knows better;
//! 2. the ".cpg" file beside the ".dbf", e.g. "UTF-8" or "1252";
//! 3. the language driver byte in the ".dbf" header;
//! 4. Windows-1252, what most GIS programs write.

use std::fmt;
use std::fs;
use std::path::Path;

use encoding::{self, EncodingRef};
use regex::Regex;

/// What to do with a numeric, date or logical cell whose text doesn't parse.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MalformedValues {
    /// Decode the cell as a missing value.
    Missing,
    /// Fail the whole table with `DbfError::InvalidFormat`.
    Fail,
}

impl Default for MalformedValues {
    fn default() -> MalformedValues {
        MalformedValues::Missing
    }
}

#[derive(Clone)]
pub struct OpenOptions {
    /// Text encoding for ".dbf" field names and values. `None` means detect.
    pub encoding: Option<EncodingRef>,
    /// Read records through the ".shx" index when one exists.
    pub use_index: bool,
    /// Load the ".dbf" attribute table when one exists.
    pub load_dbf: bool,
    pub malformed_values: MalformedValues,
}

// encoding::EncodingRef does not implement std::fmt::Debug
impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("encoding", &self.encoding.map(|e| e.name()))
            .field("use_index", &self.use_index)
            .field("load_dbf", &self.load_dbf)
            .field("malformed_values", &self.malformed_values)
            .finish()
    }
}

impl Default for OpenOptions {
    fn default() -> OpenOptions {
        OpenOptions {
            encoding: None,
            use_index: true,
            load_dbf: true,
            malformed_values: MalformedValues::default(),
        }
    }
}

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions::default()
    }

    pub fn encoding(mut self, encoding: EncodingRef) -> OpenOptions {
        self.encoding = Some(encoding);
        self
    }

    pub fn use_index(mut self, use_index: bool) -> OpenOptions {
        self.use_index = use_index;
        self
    }

    pub fn load_dbf(mut self, load_dbf: bool) -> OpenOptions {
        self.load_dbf = load_dbf;
        self
    }

    pub fn malformed_values(mut self, malformed_values: MalformedValues) -> OpenOptions {
        self.malformed_values = malformed_values;
        self
    }
}

pub fn default_encoding() -> EncodingRef {
    encoding::all::WINDOWS_1252
}

lazy_static! {
    // ".cpg" files say "1252", "ANSI 1251", "88591" or a proper label.
    static ref CODE_PAGE_NUMBER: Regex = Regex::new(r"^(?i:ansi\s*)?(\d{3,5})$").unwrap();
    static ref ISO_8859_NUMBER: Regex = Regex::new(r"^8859(\d{1,2})$").unwrap();
}

/// Maps the contents of a ".cpg" file to an encoding.
pub fn encoding_from_code_page(text: &str) -> Option<EncodingRef> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let label = match CODE_PAGE_NUMBER.captures(text) {
        Some(caps) => {
            let number = &caps[1];
            if let Some(iso) = ISO_8859_NUMBER.captures(number) {
                format!("iso-8859-{}", &iso[1])
            } else {
                match number {
                    "65001" => "utf-8".to_string(),
                    "437" | "850" | "866" => format!("ibm{}", number),
                    "932" => "shift_jis".to_string(),
                    "936" => "gbk".to_string(),
                    "949" => "euc-kr".to_string(),
                    "950" => "big5".to_string(),
                    _ => format!("windows-{}", number),
                }
            }
        }
        None => text.to_lowercase(),
    };

    encoding::label::encoding_from_whatwg_label(&label)
}

/// Reads the ".cpg" file beside `dbf_path`, if there is one.
pub fn encoding_from_cpg_file(dbf_path: &Path) -> Option<EncodingRef> {
    let cpg_path = super::sibling_path(dbf_path, "cpg")?;
    let text = fs::read_to_string(&cpg_path).ok()?;
    let found = encoding_from_code_page(&text);
    match found {
        Some(enc) => debug!("{} names encoding {}", cpg_path.display(), enc.name()),
        None => warn!("{} names unknown encoding {:?}", cpg_path.display(), text.trim()),
    }
    found
}

/// Maps the dBASE language driver id (header byte 29) to an encoding.
pub fn encoding_from_language_driver(id: u8) -> Option<EncodingRef> {
    let label = match id {
        0x01 => "ibm437",
        0x02 | 0x64 => "ibm866",
        0x03 | 0x57 | 0x58 | 0x59 => "windows-1252",
        0x13 | 0x7b => "shift_jis",
        0x4d | 0x7a => "gbk",
        0x4e | 0x79 => "euc-kr",
        0x4f | 0x78 => "big5",
        0x26 | 0x65 | 0xc9 => "windows-1251",
        0xc8 => "windows-1250",
        0xca => "windows-1254",
        0xcb => "windows-1253",
        0xcc => "windows-1257",
        _ => return None,
    };
    encoding::label::encoding_from_whatwg_label(label)
}
