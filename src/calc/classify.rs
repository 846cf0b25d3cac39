use serde::Serialize;

use super::scale::Scale;

pub const NOT_AVAILABLE: &str = "N/A";

/// Presentation severity; names match the UI's badge classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Success,
    Primary,
    Info,
    Warning,
    Danger,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub descriptor: &'static str,
    pub color: Color,
}

impl Classification {
    const fn new(descriptor: &'static str, color: Color) -> Self {
        Self { descriptor, color }
    }

    pub const fn no_grade() -> Self {
        Self::new("No Grade", Color::Secondary)
    }
}

/// Bands a transmuted SHS grade.
pub fn shs(transmuted: f64) -> Classification {
    if transmuted >= 90.0 {
        Classification::new("Outstanding", Color::Success)
    } else if transmuted >= 85.0 {
        Classification::new("Very Satisfactory", Color::Primary)
    } else if transmuted >= 80.0 {
        Classification::new("Satisfactory", Color::Info)
    } else if transmuted >= 75.0 {
        Classification::new("Fairly Satisfactory", Color::Warning)
    } else {
        Classification::new("Did Not Meet Expectations", Color::Danger)
    }
}

/// Bands a college grade already expressed on `scale`.
pub fn college(value: f64, scale: Scale) -> Classification {
    match scale {
        Scale::Percentage => {
            if value >= 90.0 {
                Classification::new("Excellent", Color::Success)
            } else if value >= 80.0 {
                Classification::new("Very Good", Color::Primary)
            } else if value >= 75.0 {
                Classification::new("Passed", Color::Warning)
            } else {
                Classification::new("Failed", Color::Danger)
            }
        }
        // Inverted: 1.00 is the top grade.
        Scale::FivePoint => {
            if value <= 1.50 {
                Classification::new("Excellent", Color::Success)
            } else if value <= 2.00 {
                Classification::new("Very Good", Color::Primary)
            } else if value <= 2.50 {
                Classification::new("Good", Color::Info)
            } else if value <= 3.00 {
                Classification::new("Passed", Color::Warning)
            } else {
                Classification::new("Failed", Color::Danger)
            }
        }
        Scale::FourPoint => {
            if value >= 3.7 {
                Classification::new("Excellent", Color::Success)
            } else if value >= 3.0 {
                Classification::new("Very Good", Color::Primary)
            } else if value >= 2.0 {
                Classification::new("Good", Color::Info)
            } else if value >= 1.0 {
                Classification::new("Passed", Color::Warning)
            } else {
                Classification::new("Failed", Color::Danger)
            }
        }
    }
}

/// Rounds to the hundredths place a grade is reported at. Band lookups
/// take the rounded value so that 23.999999999999996 reads as 24.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

pub fn format_decimal(value: f64) -> String {
    format!("{:.2}", value)
}

pub fn format_whole(value: f64) -> String {
    format!("{:.0}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shs_band_edges() {
        assert_eq!(shs(100.0).descriptor, "Outstanding");
        assert_eq!(shs(90.0).color, Color::Success);
        assert_eq!(shs(89.0).descriptor, "Very Satisfactory");
        assert_eq!(shs(85.0).color, Color::Primary);
        assert_eq!(shs(84.0).descriptor, "Satisfactory");
        assert_eq!(shs(80.0).color, Color::Info);
        assert_eq!(shs(79.0).descriptor, "Fairly Satisfactory");
        assert_eq!(shs(75.0).color, Color::Warning);
        assert_eq!(shs(74.0).descriptor, "Did Not Meet Expectations");
        assert_eq!(shs(60.0).color, Color::Danger);
    }

    #[test]
    fn five_point_bands_run_inverted() {
        assert_eq!(college(1.0, Scale::FivePoint).color, Color::Success);
        assert_eq!(college(1.75, Scale::FivePoint).color, Color::Primary);
        assert_eq!(college(2.5, Scale::FivePoint).color, Color::Info);
        assert_eq!(college(3.0, Scale::FivePoint).color, Color::Warning);
        assert_eq!(college(5.0, Scale::FivePoint).color, Color::Danger);
    }

    #[test]
    fn percentage_and_four_point_bands() {
        assert_eq!(college(90.4, Scale::Percentage).color, Color::Success);
        assert_eq!(college(80.0, Scale::Percentage).color, Color::Primary);
        assert_eq!(college(75.0, Scale::Percentage).color, Color::Warning);
        assert_eq!(college(74.99, Scale::Percentage).color, Color::Danger);
        assert_eq!(college(3.7, Scale::FourPoint).color, Color::Success);
        assert_eq!(college(0.9, Scale::FourPoint).color, Color::Danger);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_decimal(90.4), "90.40");
        assert_eq!(format_decimal(1.75), "1.75");
        assert_eq!(format_whole(90.0), "90");
    }
}
