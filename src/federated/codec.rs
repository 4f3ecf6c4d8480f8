//! Legacy text encoding of the progress matrix.
//!
//! Older deployments stored the matrix as newline-separated rows of
//! comma-separated cells (`N/a`, `A` or a decimal score). The codec is only
//! used when importing or exporting those records.

use crate::core::{Error, MatrixShape, Result};
use crate::federated::matrix::{CellState, ProgressMatrix};

/// Row delimiter in the legacy format.
pub const ROW_DELIMITER: char = '\n';
/// Cell delimiter in the legacy format.
pub const CELL_DELIMITER: char = ',';
/// Legacy token for an unassigned cell.
pub const UNASSIGNED_TOKEN: &str = "N/a";
/// Legacy token for a pending cell.
pub const PENDING_TOKEN: &str = "A";

/// Shape-checked codec for the legacy matrix text.
#[derive(Clone, Copy, Debug)]
pub struct RoundMatrixCodec {
    shape: MatrixShape,
}

impl RoundMatrixCodec {
    /// Create a codec for matrices of the given shape.
    pub fn new(shape: MatrixShape) -> Self {
        Self { shape }
    }

    /// Shape this codec accepts.
    pub fn shape(&self) -> MatrixShape {
        self.shape
    }

    /// Parse legacy text into a matrix.
    pub fn decode(&self, text: &str) -> Result<ProgressMatrix> {
        let body = text.strip_suffix(ROW_DELIMITER).unwrap_or(text);
        if body.is_empty() {
            return Err(Error::MalformedMatrix("empty matrix text".into()));
        }

        let rows = body
            .split(ROW_DELIMITER)
            .enumerate()
            .map(|(i, line)| {
                line.split(CELL_DELIMITER)
                    .map(|token| decode_cell(token).map_err(|e| row_error(i, e)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        ProgressMatrix::from_rows(rows, self.shape)
    }

    /// Render a matrix as legacy text.
    pub fn encode(&self, matrix: &ProgressMatrix) -> String {
        matrix
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(encode_cell)
                    .collect::<Vec<_>>()
                    .join(&CELL_DELIMITER.to_string())
            })
            .collect::<Vec<_>>()
            .join(&ROW_DELIMITER.to_string())
    }
}

fn decode_cell(token: &str) -> Result<CellState> {
    match token.trim() {
        UNASSIGNED_TOKEN => Ok(CellState::Unassigned),
        PENDING_TOKEN => Ok(CellState::Pending),
        other => {
            let value: f64 = other
                .parse()
                .map_err(|_| Error::MalformedMatrix(format!("unknown cell token {:?}", other)))?;
            if !value.is_finite() {
                return Err(Error::MalformedMatrix(format!(
                    "non-finite score {:?}",
                    other
                )));
            }
            Ok(CellState::Scored(value))
        }
    }
}

fn encode_cell(cell: &CellState) -> String {
    match cell {
        CellState::Unassigned => UNASSIGNED_TOKEN.to_string(),
        CellState::Pending => PENDING_TOKEN.to_string(),
        CellState::Scored(v) => v.to_string(),
    }
}

fn row_error(row: usize, err: Error) -> Error {
    match err {
        Error::MalformedMatrix(msg) => Error::MalformedMatrix(format!("row {}: {}", row, msg)),
        other => other,
    }
}
