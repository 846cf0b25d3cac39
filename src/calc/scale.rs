use serde::{Deserialize, Serialize};

/// Numeric scale a college team reports grades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    #[serde(rename = "percentage")]
    Percentage,
    #[serde(rename = "5_point")]
    FivePoint,
    #[serde(rename = "4_point")]
    FourPoint,
}

// (lower bound percentage, grade). Highest band first.
const FIVE_POINT_TABLE: &[(f64, f64)] = &[
    (97.0, 1.00),
    (94.0, 1.25),
    (91.0, 1.50),
    (88.0, 1.75),
    (85.0, 2.00),
    (82.0, 2.25),
    (79.0, 2.50),
    (76.0, 2.75),
    (75.0, 3.00),
];
const FIVE_POINT_FAILING: f64 = 5.00;

const FOUR_POINT_TABLE: &[(f64, f64)] = &[
    (93.0, 4.0),
    (90.0, 3.7),
    (87.0, 3.3),
    (83.0, 3.0),
    (80.0, 2.7),
    (77.0, 2.3),
    (73.0, 2.0),
    (70.0, 1.7),
    (67.0, 1.3),
    (65.0, 1.0),
];
const FOUR_POINT_FAILING: f64 = 0.0;

impl Scale {
    /// Converts a 0..=100 percentage onto this scale.
    pub fn convert(self, percentage: f64) -> f64 {
        match self {
            Self::Percentage => percentage,
            Self::FivePoint => band_lookup(FIVE_POINT_TABLE, percentage, FIVE_POINT_FAILING),
            Self::FourPoint => band_lookup(FOUR_POINT_TABLE, percentage, FOUR_POINT_FAILING),
        }
    }
}

fn band_lookup(table: &[(f64, f64)], percentage: f64, fallback: f64) -> f64 {
    table
        .iter()
        .find(|(lower, _)| percentage >= *lower)
        .map(|(_, grade)| *grade)
        .unwrap_or(fallback)
}
