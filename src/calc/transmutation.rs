use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One band of a transmutation table: every initial grade at or above
/// `lower_bound` (and below the next row's bound) reports as `transmuted`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmutationRow {
    pub lower_bound: f64,
    pub transmuted: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("transmutation table must not be empty")]
    Empty,
    #[error("transmutation row {index} has a non-finite value")]
    NotFinite { index: usize },
    #[error("transmutation table must start at lower bound 0 (got {first})")]
    MissingZeroRow { first: f64 },
    #[error("transmutation lower bounds must strictly increase (row {index})")]
    BoundsNotIncreasing { index: usize },
    #[error("transmuted grades must not decrease (row {index})")]
    GradesDecreasing { index: usize },
    #[error("transmuted grade must be a whole number (row {index})")]
    FractionalGrade { index: usize },
}

/// Sorted ascending by `lower_bound`. Construct through [`TransmutationTable::new`]
/// or [`TransmutationTable::deped_default`] so the ordering invariant holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TransmutationTable {
    rows: Vec<TransmutationRow>,
}

// DepEd Order No. 8, s. 2015.
const DEPED_ROWS: &[(f64, f64)] = &[
    (0.0, 60.0),
    (4.0, 61.0),
    (8.0, 62.0),
    (12.0, 63.0),
    (16.0, 64.0),
    (20.0, 65.0),
    (24.0, 66.0),
    (28.0, 67.0),
    (32.0, 68.0),
    (36.0, 69.0),
    (40.0, 70.0),
    (44.0, 71.0),
    (48.0, 72.0),
    (52.0, 73.0),
    (56.0, 74.0),
    (60.0, 75.0),
    (61.6, 76.0),
    (63.2, 77.0),
    (64.8, 78.0),
    (66.4, 79.0),
    (68.0, 80.0),
    (69.6, 81.0),
    (71.2, 82.0),
    (72.8, 83.0),
    (74.4, 84.0),
    (76.0, 85.0),
    (77.6, 86.0),
    (79.2, 87.0),
    (80.8, 88.0),
    (82.4, 89.0),
    (84.0, 90.0),
    (85.6, 91.0),
    (87.2, 92.0),
    (88.8, 93.0),
    (90.4, 94.0),
    (92.0, 95.0),
    (93.6, 96.0),
    (95.2, 97.0),
    (96.8, 98.0),
    (98.4, 99.0),
    (100.0, 100.0),
];

impl TransmutationTable {
    pub fn new(rows: Vec<TransmutationRow>) -> Result<Self, TableError> {
        let Some(first) = rows.first() else {
            return Err(TableError::Empty);
        };
        if let Some(index) = rows
            .iter()
            .position(|r| !r.lower_bound.is_finite() || !r.transmuted.is_finite())
        {
            return Err(TableError::NotFinite { index });
        }
        // Transmuted grades are reported as whole numbers.
        if let Some(index) = rows.iter().position(|r| r.transmuted.fract() != 0.0) {
            return Err(TableError::FractionalGrade { index });
        }
        if first.lower_bound != 0.0 {
            return Err(TableError::MissingZeroRow {
                first: first.lower_bound,
            });
        }
        for (i, pair) in rows.windows(2).enumerate() {
            if pair[1].lower_bound <= pair[0].lower_bound {
                return Err(TableError::BoundsNotIncreasing { index: i + 1 });
            }
            if pair[1].transmuted < pair[0].transmuted {
                return Err(TableError::GradesDecreasing { index: i + 1 });
            }
        }
        Ok(Self { rows })
    }

    pub fn deped_default() -> Self {
        Self {
            rows: DEPED_ROWS
                .iter()
                .map(|&(lower_bound, transmuted)| TransmutationRow {
                    lower_bound,
                    transmuted,
                })
                .collect(),
        }
    }

    pub fn rows(&self) -> &[TransmutationRow] {
        &self.rows
    }

    /// Initial grades below the first bound clamp to the first row.
    pub fn transmute(&self, initial_grade: f64) -> f64 {
        self.rows
            .iter()
            .rev()
            .find(|r| initial_grade >= r.lower_bound)
            .or_else(|| self.rows.first())
            .map(|r| r.transmuted)
            .unwrap_or(initial_grade)
    }
}

impl Default for TransmutationTable {
    fn default() -> Self {
        Self::deped_default()
    }
}
