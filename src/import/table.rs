//! Typed parsing of vector tables and id lists

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::types::{Vector, VectorId};

/// Errors raised while parsing uploaded or on-disk vector files
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid number on line {line}: '{token}'")]
    InvalidNumber { line: usize, token: String },

    #[error("Row count mismatch: {vectors} vectors but {ids} ids")]
    RowCountMismatch { vectors: usize, ids: usize },

    #[error("{0} is not valid UTF-8")]
    InvalidEncoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Significant lines with their 1-based line numbers
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse a table of whitespace-separated floats, one vector per line.
///
/// Row lengths are not compared here; the store reports a
/// dimension mismatch when the rows are indexed.
pub fn parse_vector_table(text: &str) -> Result<Vec<Vector>, ParseError> {
    data_lines(text)
        .map(|(line, row)| {
            row.split_whitespace()
                .map(|token| match token.parse::<f32>() {
                    Ok(value) if value.is_finite() => Ok(value),
                    _ => Err(ParseError::InvalidNumber {
                        line,
                        token: token.to_string(),
                    }),
                })
                .collect()
        })
        .collect()
}

/// Parse one unsigned integer id per line
pub fn parse_id_list(text: &str) -> Result<Vec<VectorId>, ParseError> {
    data_lines(text)
        .map(|(line, token)| {
            token.parse::<VectorId>().map_err(|_| ParseError::InvalidNumber {
                line,
                token: token.to_string(),
            })
        })
        .collect()
}

/// Zip vectors with their ids, requiring equal row counts
pub fn pair_rows(
    vectors: Vec<Vector>,
    ids: Vec<VectorId>,
) -> Result<Vec<(VectorId, Vector)>, ParseError> {
    if vectors.len() != ids.len() {
        return Err(ParseError::RowCountMismatch {
            vectors: vectors.len(),
            ids: ids.len(),
        });
    }
    Ok(ids.into_iter().zip(vectors).collect())
}

/// Parse an uploaded (vector table, id list) pair of raw bodies
pub fn parse_upload(vectors: &[u8], ids: &[u8]) -> Result<Vec<(VectorId, Vector)>, ParseError> {
    let vectors = std::str::from_utf8(vectors)
        .map_err(|_| ParseError::InvalidEncoding("vector table".to_string()))?;
    let ids =
        std::str::from_utf8(ids).map_err(|_| ParseError::InvalidEncoding("id list".to_string()))?;
    pair_rows(parse_vector_table(vectors)?, parse_id_list(ids)?)
}

/// Read and parse a vector table file and an id list file
pub fn load_files(
    vectors_path: impl AsRef<Path>,
    ids_path: impl AsRef<Path>,
) -> Result<Vec<(VectorId, Vector)>, ParseError> {
    let vectors = fs::read(vectors_path.as_ref())?;
    let ids = fs::read(ids_path.as_ref())?;
    parse_upload(&vectors, &ids)
}
