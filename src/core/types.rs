//! Common types used across fedcoord modules.

use serde::{Deserialize, Serialize};

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Dimensions of a cluster's progress matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixShape {
    /// Number of client slots (rows)
    pub clients: usize,
    /// Number of communication rounds (columns)
    pub rounds: usize,
}

impl MatrixShape {
    /// Create a new shape.
    pub fn new(clients: usize, rounds: usize) -> Self {
        Self { clients, rounds }
    }

    /// Index of the final round.
    pub fn last_round(&self) -> usize {
        self.rounds.saturating_sub(1)
    }
}

impl std::fmt::Display for MatrixShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.clients, self.rounds)
    }
}

/// Split a wire-level cluster tag (`"<base>_<suffix>"`) into its parts.
///
/// The suffix is everything after the last underscore, so base names may
/// themselves contain underscores.
pub fn split_cluster_tag(tag: &str) -> Option<(&str, &str)> {
    let (base, suffix) = tag.rsplit_once('_')?;
    if base.is_empty() || suffix.is_empty() {
        return None;
    }
    Some((base, suffix))
}
