//! Team grading configuration: which mode is active and the weights it uses.
//!
//! Configuration is validated when it is written. The calculator only ever
//! sees a [`GradingSystem`] that passed [`GradingSystem::validate`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::calc::scale::Scale;
use crate::calc::{Category, Component, Term};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid grading config: {0}")]
    Malformed(String),
    #[error("{field} must be a finite number >= 0")]
    InvalidWeight { field: &'static str },
    #[error("{group} weights must sum to 100 (got {sum})")]
    WeightSum { group: &'static str, sum: f64 },
    #[error("{} activities lack the classification {mode} grading needs", .ids.len())]
    UnclassifiedActivities { mode: &'static str, ids: Vec<String> },
}

impl ConfigError {
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::WeightSum { group, sum } => Some(json!({ "group": group, "sum": sum })),
            Self::InvalidWeight { field } => Some(json!({ "field": field })),
            Self::UnclassifiedActivities { mode, ids } => {
                Some(json!({ "mode": mode, "activityIds": ids }))
            }
            Self::Malformed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShsWeights {
    pub written_work: f64,
    pub performance_task: f64,
    pub quarterly_assessment: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub written: f64,
    pub performance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TermWeights {
    pub prelim: f64,
    pub midterm: f64,
    #[serde(rename = "final")]
    pub final_term: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermConfig {
    pub scale: Scale,
    pub components: ComponentWeights,
    pub terms: TermWeights,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GwaConfig {
    pub scale: Scale,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradingSystem {
    Shs(ShsWeights),
    CollegeTerm(TermConfig),
    CollegeGwa(GwaConfig),
}

// Stored and wire shape: `{"system": "shs", "weights": {..}}` or
// `{"system": "college", "mode": "term" | "gwa", "scale": .., ..}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "system", rename_all = "lowercase")]
enum GradingWire {
    Shs { weights: ShsWeights },
    College(CollegeWire),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum CollegeWire {
    #[serde(rename_all = "camelCase")]
    Term {
        scale: Scale,
        component_weights: ComponentWeights,
        term_weights: TermWeights,
    },
    Gwa { scale: Scale },
}

impl From<GradingWire> for GradingSystem {
    fn from(wire: GradingWire) -> Self {
        match wire {
            GradingWire::Shs { weights } => GradingSystem::Shs(weights),
            GradingWire::College(CollegeWire::Term {
                scale,
                component_weights,
                term_weights,
            }) => GradingSystem::CollegeTerm(TermConfig {
                scale,
                components: component_weights,
                terms: term_weights,
            }),
            GradingWire::College(CollegeWire::Gwa { scale }) => {
                GradingSystem::CollegeGwa(GwaConfig { scale })
            }
        }
    }
}

impl From<&GradingSystem> for GradingWire {
    fn from(system: &GradingSystem) -> Self {
        match *system {
            GradingSystem::Shs(weights) => GradingWire::Shs { weights },
            GradingSystem::CollegeTerm(cfg) => GradingWire::College(CollegeWire::Term {
                scale: cfg.scale,
                component_weights: cfg.components,
                term_weights: cfg.terms,
            }),
            GradingSystem::CollegeGwa(cfg) => {
                GradingWire::College(CollegeWire::Gwa { scale: cfg.scale })
            }
        }
    }
}

impl GradingSystem {
    /// Parses the wire shape and validates it in one step.
    pub fn from_json(raw: &Value) -> Result<Self, ConfigError> {
        let wire =
            GradingWire::deserialize(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let parsed = GradingSystem::from(wire);
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            GradingSystem::Shs(w) => check_group(
                "component",
                &[
                    ("weights.writtenWork", w.written_work),
                    ("weights.performanceTask", w.performance_task),
                    ("weights.quarterlyAssessment", w.quarterly_assessment),
                ],
            ),
            GradingSystem::CollegeTerm(cfg) => {
                check_group(
                    "written/performance",
                    &[
                        ("componentWeights.written", cfg.components.written),
                        ("componentWeights.performance", cfg.components.performance),
                    ],
                )?;
                check_group(
                    "term",
                    &[
                        ("termWeights.prelim", cfg.terms.prelim),
                        ("termWeights.midterm", cfg.terms.midterm),
                        ("termWeights.final", cfg.terms.final_term),
                    ],
                )
            }
            GradingSystem::CollegeGwa(_) => Ok(()),
        }
    }

    /// Whether an activity with these tags takes part in this mode's grade.
    /// GWA grades every activity by credit units, so it needs no tags.
    pub fn accepts(
        &self,
        component: Option<Component>,
        category: Option<Category>,
        term: Option<Term>,
    ) -> bool {
        match self {
            GradingSystem::Shs(_) => component.is_some(),
            GradingSystem::CollegeTerm(_) => category.is_some() && term.is_some(),
            GradingSystem::CollegeGwa(_) => true,
        }
    }

    pub fn system_name(&self) -> &'static str {
        match self {
            GradingSystem::Shs(_) => "shs",
            GradingSystem::CollegeTerm(_) | GradingSystem::CollegeGwa(_) => "college",
        }
    }

    pub fn college_mode(&self) -> Option<&'static str> {
        match self {
            GradingSystem::Shs(_) => None,
            GradingSystem::CollegeTerm(_) => Some("term"),
            GradingSystem::CollegeGwa(_) => Some("gwa"),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        self.college_mode().unwrap_or("shs")
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(GradingWire::from(self)).unwrap_or(Value::Null)
    }
}

fn check_group(group: &'static str, weights: &[(&'static str, f64)]) -> Result<(), ConfigError> {
    for &(field, w) in weights {
        if !w.is_finite() || w < 0.0 {
            return Err(ConfigError::InvalidWeight { field });
        }
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if (sum - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::WeightSum { group, sum });
    }
    Ok(())
}
