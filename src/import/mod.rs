//! Import of plain-text vector files
//!
//! Two files describe a batch: a vector table (one vector per line,
//! whitespace-separated floats) and an id list (one unsigned integer per
//! line, same row order). Blank lines and `#` comments are ignored.
//!
//! ```no_run
//! use annserve::import::load_files;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rows = load_files("docvectors.txt", "doc2vec_id.txt")?;
//! println!("Parsed {} vectors", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod table;

pub use table::{load_files, pair_rows, parse_id_list, parse_upload, parse_vector_table, ParseError};
