//! Per-cluster progress matrix.
//!
//! One row per client slot, one cell per communication round.

use crate::core::{Error, MatrixShape, Result};
use serde::{Deserialize, Serialize};

/// State of a single (client, round) cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "score", rename_all = "snake_case")]
pub enum CellState {
    /// Round not yet opened for this slot
    Unassigned,
    /// Round opened, waiting for the client's result
    Pending,
    /// Best parameter reported for this round
    Scored(f64),
}

impl CellState {
    /// Whether the cell holds a reported score.
    pub fn is_scored(&self) -> bool {
        matches!(self, CellState::Scored(_))
    }

    /// The reported score, if any.
    pub fn score(&self) -> Option<f64> {
        match self {
            CellState::Scored(v) => Some(*v),
            _ => None,
        }
    }
}

/// Typed 2-D progress matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressMatrix {
    rows: Vec<Vec<CellState>>,
}

impl ProgressMatrix {
    /// Create a matrix for a new cluster: round 0 open for every slot,
    /// all later rounds unassigned.
    pub fn fresh(shape: MatrixShape) -> Self {
        let rows = (0..shape.clients)
            .map(|_| {
                (0..shape.rounds)
                    .map(|r| {
                        if r == 0 {
                            CellState::Pending
                        } else {
                            CellState::Unassigned
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Build from raw rows, checking the shape.
    pub fn from_rows(rows: Vec<Vec<CellState>>, shape: MatrixShape) -> Result<Self> {
        let matrix = Self { rows };
        matrix.validate(shape)?;
        Ok(matrix)
    }

    /// Check that the matrix has exactly the configured shape.
    pub fn validate(&self, shape: MatrixShape) -> Result<()> {
        if self.rows.len() != shape.clients {
            return Err(Error::MalformedMatrix(format!(
                "expected {} rows, found {}",
                shape.clients,
                self.rows.len()
            )));
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != shape.rounds {
                return Err(Error::MalformedMatrix(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    shape.rounds
                )));
            }
            if let Some(v) = row.iter().filter_map(CellState::score).find(|v| !v.is_finite()) {
                return Err(Error::MalformedMatrix(format!(
                    "row {} holds non-finite score {}",
                    i, v
                )));
            }
        }
        Ok(())
    }

    /// Rows of the matrix.
    pub fn rows(&self) -> &[Vec<CellState>] {
        &self.rows
    }

    /// Number of client rows.
    pub fn client_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of rounds per row.
    pub fn round_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// Cell at (row, round).
    pub fn cell(&self, row: usize, round: usize) -> Option<CellState> {
        self.rows.get(row).and_then(|r| r.get(round)).copied()
    }

    /// Overwrite the cell at (row, round).
    pub fn set(&mut self, row: usize, round: usize, state: CellState) -> Result<()> {
        let cell = self
            .rows
            .get_mut(row)
            .and_then(|r| r.get_mut(round))
            .ok_or_else(|| {
                Error::Internal(format!("cell ({}, {}) outside matrix", row, round))
            })?;
        *cell = state;
        Ok(())
    }

    /// Cells of one round across all rows.
    pub fn column(&self, round: usize) -> impl Iterator<Item = CellState> + '_ {
        self.rows.iter().filter_map(move |r| r.get(round).copied())
    }

    /// Index of each row's first cell without a score (`round_count` when
    /// every round is scored).
    pub fn frontiers(&self) -> Vec<usize> {
        self.rows
            .iter()
            .map(|row| row.iter().position(|c| !c.is_scored()).unwrap_or(row.len()))
            .collect()
    }

    /// The round every row is waiting on, if all rows agree on one that is
    /// still below the round count.
    pub fn common_frontier(&self) -> Option<usize> {
        let frontiers = self.frontiers();
        let first = *frontiers.first()?;
        (first < self.round_count() && frontiers.iter().all(|&f| f == first)).then_some(first)
    }

    /// Mark every unassigned cell of a round as pending. Returns how many
    /// cells changed.
    pub fn open_round(&mut self, round: usize) -> usize {
        let mut opened = 0;
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(round) {
                if *cell == CellState::Unassigned {
                    *cell = CellState::Pending;
                    opened += 1;
                }
            }
        }
        opened
    }

    /// Whether no row has the round opened yet.
    pub fn is_round_unopened(&self, round: usize) -> bool {
        self.column(round).all(|c| c == CellState::Unassigned)
    }

    /// Whether every row has reported a score for the round.
    pub fn is_round_complete(&self, round: usize) -> bool {
        self.client_count() > 0 && self.column(round).all(|c| c.is_scored())
    }
}
