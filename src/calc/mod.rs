//! Grade computation engine.
//!
//! Everything here is a pure function of a team's [`GradingSystem`], its
//! activities and one student's scores. Nothing is cached; callers load a
//! snapshot and ask again whenever scores or weights change.

pub mod classify;
pub mod scale;
pub mod transmutation;

use serde::Serialize;
use std::collections::HashMap;

use crate::grading::{GradingSystem, ShsWeights, TermConfig};
use classify::{Classification, NOT_AVAILABLE};
use scale::Scale;
use transmutation::TransmutationTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    WrittenWork,
    PerformanceTask,
    QuarterlyAssessment,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::WrittenWork,
        Component::PerformanceTask,
        Component::QuarterlyAssessment,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "written_work" | "ww" => Some(Self::WrittenWork),
            "performance_task" | "pt" => Some(Self::PerformanceTask),
            "quarterly_assessment" | "qa" => Some(Self::QuarterlyAssessment),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WrittenWork => "written_work",
            Self::PerformanceTask => "performance_task",
            Self::QuarterlyAssessment => "quarterly_assessment",
        }
    }

    fn weight_in(self, w: &ShsWeights) -> f64 {
        match self {
            Self::WrittenWork => w.written_work,
            Self::PerformanceTask => w.performance_task,
            Self::QuarterlyAssessment => w.quarterly_assessment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Written,
    Performance,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "written" => Some(Self::Written),
            "performance" => Some(Self::Performance),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Performance => "performance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Prelim,
    Midterm,
    Final,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::Prelim, Term::Midterm, Term::Final];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prelim" => Some(Self::Prelim),
            "midterm" => Some(Self::Midterm),
            "final" => Some(Self::Final),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prelim => "prelim",
            Self::Midterm => "midterm",
            Self::Final => "final",
        }
    }
}

/// An activity as the calculator sees it. Tags that belong to another
/// grading mode are carried but ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDef {
    pub id: String,
    pub title: String,
    pub total_points: Option<f64>,
    pub credit_units: f64,
    pub category: Option<Category>,
    pub component: Option<Component>,
    pub term: Option<Term>,
}

/// Activity id -> score. An absent key means ungraded.
pub type StudentScores = HashMap<String, f64>;

/// An intermediate number with its display string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub value: Option<f64>,
    pub formatted: String,
}

impl Metric {
    pub fn of(value: f64) -> Self {
        Self {
            value: Some(value),
            formatted: classify::format_decimal(value),
        }
    }

    pub fn missing() -> Self {
        Self {
            value: None,
            formatted: NOT_AVAILABLE.to_string(),
        }
    }

    fn from_option(value: Option<f64>) -> Self {
        value.map(Self::of).unwrap_or_else(Self::missing)
    }
}

/// A reportable grade: value, display string and severity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeFigure {
    pub value: Option<f64>,
    pub formatted: String,
    #[serde(flatten)]
    pub classification: Classification,
}

impl GradeFigure {
    pub fn not_available() -> Self {
        Self {
            value: None,
            formatted: NOT_AVAILABLE.to_string(),
            classification: Classification::no_grade(),
        }
    }

    pub fn college(value: Option<f64>, scale: Scale) -> Self {
        match value {
            Some(v) => Self {
                value: Some(v),
                formatted: classify::format_decimal(v),
                classification: classify::college(v, scale),
            },
            None => Self::not_available(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityContribution {
    pub activity_id: String,
    pub title: String,
    pub score: Option<f64>,
    pub total_points: Option<f64>,
    pub percentage: Option<f64>,
    pub counted: bool,
}

// ---------------------------------------------------------------- SHS

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentBreakdown {
    pub component: Component,
    pub weight: f64,
    pub graded_count: usize,
    pub raw_score: f64,
    pub possible_score: f64,
    pub percentage_score: Metric,
    pub weighted_score: Metric,
    pub activities: Vec<ActivityContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShsBreakdown {
    pub components: Vec<ComponentBreakdown>,
    pub initial_grade: Metric,
    pub transmuted_grade: GradeFigure,
    pub has_data: bool,
}

pub fn compute_shs(
    weights: &ShsWeights,
    transmutation: &TransmutationTable,
    activities: &[ActivityDef],
    scores: &StudentScores,
) -> ShsBreakdown {
    let mut components = Vec::with_capacity(Component::ALL.len());
    let mut initial_grade = 0.0_f64;
    let mut graded_total = 0_usize;

    for component in Component::ALL {
        let weight = component.weight_in(weights);
        let mut raw = 0.0_f64;
        let mut possible = 0.0_f64;
        let mut graded_count = 0_usize;
        let mut contributions = Vec::new();

        for a in activities.iter().filter(|a| a.component == Some(component)) {
            let score = scores.get(&a.id).copied();
            let counted = match (score, a.total_points) {
                (Some(s), Some(tp)) => {
                    raw += s;
                    possible += tp;
                    graded_count += 1;
                    true
                }
                _ => false,
            };
            contributions.push(ActivityContribution {
                activity_id: a.id.clone(),
                title: a.title.clone(),
                score,
                total_points: a.total_points,
                percentage: activity_percentage(score, a.total_points),
                counted,
            });
        }

        let percentage_score = if possible > 0.0 {
            raw * 100.0 / possible
        } else {
            0.0
        };
        let weighted_score = classify::round_off_2_decimals(percentage_score * weight / 100.0);
        initial_grade += weighted_score;
        graded_total += graded_count;

        components.push(ComponentBreakdown {
            component,
            weight,
            graded_count,
            raw_score: raw,
            possible_score: possible,
            percentage_score: Metric::of(percentage_score),
            weighted_score: Metric::of(weighted_score),
            activities: contributions,
        });
    }

    let initial_grade = classify::round_off_2_decimals(initial_grade);
    let has_data = graded_total > 0;
    let transmuted_grade = if has_data {
        let t = transmutation.transmute(initial_grade);
        GradeFigure {
            value: Some(t),
            formatted: classify::format_whole(t),
            classification: classify::shs(t),
        }
    } else {
        GradeFigure::not_available()
    };

    ShsBreakdown {
        components,
        initial_grade: Metric::of(initial_grade),
        transmuted_grade,
        has_data,
    }
}

// ------------------------------------------------------- College, term

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category: Category,
    pub weight: f64,
    pub effective_weight: Option<f64>,
    pub graded_count: usize,
    pub average: Metric,
    pub activities: Vec<ActivityContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermBreakdown {
    pub term: Term,
    pub weight: f64,
    pub effective_weight: Option<f64>,
    pub written: CategoryAverage,
    pub performance: CategoryAverage,
    pub term_percentage: Metric,
    pub term_grade: GradeFigure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeTermBreakdown {
    pub scale: Scale,
    pub terms: Vec<TermBreakdown>,
    pub final_grade: GradeFigure,
    pub has_data: bool,
}

fn category_average(
    term: Term,
    category: Category,
    weight: f64,
    activities: &[ActivityDef],
    scores: &StudentScores,
) -> CategoryAverage {
    let mut sum = 0.0_f64;
    let mut graded_count = 0_usize;
    let mut contributions = Vec::new();

    for a in activities
        .iter()
        .filter(|a| a.term == Some(term) && a.category == Some(category))
    {
        let score = scores.get(&a.id).copied();
        let percentage = activity_percentage(score, a.total_points);
        if let Some(p) = percentage {
            sum += p;
            graded_count += 1;
        }
        contributions.push(ActivityContribution {
            activity_id: a.id.clone(),
            title: a.title.clone(),
            score,
            total_points: a.total_points,
            percentage,
            counted: percentage.is_some(),
        });
    }

    let average = if graded_count > 0 {
        Some(sum / graded_count as f64)
    } else {
        None
    };

    CategoryAverage {
        category,
        weight,
        effective_weight: None,
        graded_count,
        average: Metric::from_option(average),
        activities: contributions,
    }
}

pub fn compute_college_term(
    cfg: &TermConfig,
    activities: &[ActivityDef],
    scores: &StudentScores,
) -> CollegeTermBreakdown {
    let mut terms = Vec::with_capacity(Term::ALL.len());

    for term in Term::ALL {
        let mut written = category_average(
            term,
            Category::Written,
            cfg.components.written,
            activities,
            scores,
        );
        let mut performance = category_average(
            term,
            Category::Performance,
            cfg.components.performance,
            activities,
            scores,
        );

        let (term_percentage, effective) = renormalized_mean(&[
            (written.average.value, written.weight),
            (performance.average.value, performance.weight),
        ]);
        let term_percentage = term_percentage.map(classify::round_off_2_decimals);
        written.effective_weight = effective[0];
        performance.effective_weight = effective[1];

        let term_grade = term_percentage.map(|p| cfg.scale.convert(p));
        let weight = match term {
            Term::Prelim => cfg.terms.prelim,
            Term::Midterm => cfg.terms.midterm,
            Term::Final => cfg.terms.final_term,
        };

        terms.push(TermBreakdown {
            term,
            weight,
            effective_weight: None,
            written,
            performance,
            term_percentage: Metric::from_option(term_percentage),
            term_grade: GradeFigure::college(term_grade, cfg.scale),
        });
    }

    let parts: Vec<(Option<f64>, f64)> = terms
        .iter()
        .map(|t| (t.term_grade.value, t.weight))
        .collect();
    let (final_grade, effective) = renormalized_mean(&parts);
    let final_grade = final_grade.map(classify::round_off_2_decimals);
    for (t, w) in terms.iter_mut().zip(effective) {
        t.effective_weight = w;
    }

    CollegeTermBreakdown {
        scale: cfg.scale,
        terms,
        final_grade: GradeFigure::college(final_grade, cfg.scale),
        has_data: final_grade.is_some(),
    }
}

/// Weighted mean over the parts that have a value. Parts without a value
/// drop out and the remaining weights scale back up to 100%. When every
/// remaining weight is zero the parts count equally.
///
/// Returns the mean and each part's effective weight in percent.
fn renormalized_mean(parts: &[(Option<f64>, f64)]) -> (Option<f64>, Vec<Option<f64>>) {
    let present: Vec<(usize, f64, f64)> = parts
        .iter()
        .enumerate()
        .filter_map(|(i, (v, w))| v.map(|v| (i, v, *w)))
        .collect();
    let mut effective = vec![None; parts.len()];

    match present.as_slice() {
        [] => (None, effective),
        [(i, v, _)] => {
            effective[*i] = Some(100.0);
            (Some(*v), effective)
        }
        _ => {
            let weight_total: f64 = present.iter().map(|(_, _, w)| *w).sum();
            if weight_total > 0.0 {
                let mut sum = 0.0_f64;
                for (i, v, w) in &present {
                    sum += v * w;
                    effective[*i] = Some(w * 100.0 / weight_total);
                }
                (Some(sum / weight_total), effective)
            } else {
                let share = 100.0 / present.len() as f64;
                let mut sum = 0.0_f64;
                for (i, v, _) in &present {
                    sum += v;
                    effective[*i] = Some(share);
                }
                (Some(sum / present.len() as f64), effective)
            }
        }
    }
}

// -------------------------------------------------------- College, GWA

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    NoCreditUnits,
    Ungraded,
    NoTotalPoints,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GwaActivity {
    pub activity_id: String,
    pub title: String,
    pub score: Option<f64>,
    pub total_points: Option<f64>,
    pub credit_units: f64,
    pub percentage: Option<f64>,
    pub scale_grade: Option<f64>,
    pub weighted_part: Option<f64>,
    pub excluded: Option<Exclusion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GwaBreakdown {
    pub scale: Scale,
    pub activities: Vec<GwaActivity>,
    pub total_credit_units: f64,
    pub total_weighted: f64,
    pub gwa: GradeFigure,
    pub has_data: bool,
}

pub fn compute_gwa(scale: Scale, activities: &[ActivityDef], scores: &StudentScores) -> GwaBreakdown {
    let mut rows = Vec::with_capacity(activities.len());
    let mut total_credit_units = 0.0_f64;
    let mut total_weighted = 0.0_f64;

    for a in activities {
        let score = scores.get(&a.id).copied();
        let excluded = if a.credit_units <= 0.0 {
            Some(Exclusion::NoCreditUnits)
        } else if score.is_none() {
            Some(Exclusion::Ungraded)
        } else if !a.total_points.map(|tp| tp > 0.0).unwrap_or(false) {
            Some(Exclusion::NoTotalPoints)
        } else {
            None
        };

        let (percentage, scale_grade, weighted_part) = if excluded.is_none() {
            let percentage =
                activity_percentage(score, a.total_points).map(classify::round_off_2_decimals);
            let scale_grade = percentage.map(|p| scale.convert(p));
            let weighted_part = scale_grade.map(|g| g * a.credit_units);
            if let Some(part) = weighted_part {
                total_weighted += part;
                total_credit_units += a.credit_units;
            }
            (percentage, scale_grade, weighted_part)
        } else {
            (None, None, None)
        };

        rows.push(GwaActivity {
            activity_id: a.id.clone(),
            title: a.title.clone(),
            score,
            total_points: a.total_points,
            credit_units: a.credit_units,
            percentage,
            scale_grade,
            weighted_part,
            excluded,
        });
    }

    let gwa = if total_credit_units > 0.0 {
        Some(classify::round_off_2_decimals(
            total_weighted / total_credit_units,
        ))
    } else {
        None
    };

    GwaBreakdown {
        scale,
        activities: rows,
        total_credit_units,
        total_weighted,
        gwa: GradeFigure::college(gwa, scale),
        has_data: gwa.is_some(),
    }
}

// ---------------------------------------------------------- dispatcher

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode")]
pub enum GradeBreakdown {
    #[serde(rename = "shs")]
    Shs(ShsBreakdown),
    #[serde(rename = "college_term")]
    CollegeTerm(CollegeTermBreakdown),
    #[serde(rename = "college_gwa")]
    CollegeGwa(GwaBreakdown),
}

impl GradeBreakdown {
    /// The single headline figure: transmuted grade, final grade or GWA.
    pub fn overall(&self) -> &GradeFigure {
        match self {
            GradeBreakdown::Shs(b) => &b.transmuted_grade,
            GradeBreakdown::CollegeTerm(b) => &b.final_grade,
            GradeBreakdown::CollegeGwa(b) => &b.gwa,
        }
    }

    pub fn has_data(&self) -> bool {
        match self {
            GradeBreakdown::Shs(b) => b.has_data,
            GradeBreakdown::CollegeTerm(b) => b.has_data,
            GradeBreakdown::CollegeGwa(b) => b.has_data,
        }
    }
}

pub struct GradeCalculator<'a> {
    system: &'a GradingSystem,
    transmutation: &'a TransmutationTable,
}

impl<'a> GradeCalculator<'a> {
    pub fn new(system: &'a GradingSystem, transmutation: &'a TransmutationTable) -> Self {
        Self {
            system,
            transmutation,
        }
    }

    pub fn student(&self, activities: &[ActivityDef], scores: &StudentScores) -> GradeBreakdown {
        match self.system {
            GradingSystem::Shs(weights) => GradeBreakdown::Shs(compute_shs(
                weights,
                self.transmutation,
                activities,
                scores,
            )),
            GradingSystem::CollegeTerm(cfg) => {
                GradeBreakdown::CollegeTerm(compute_college_term(cfg, activities, scores))
            }
            GradingSystem::CollegeGwa(cfg) => {
                GradeBreakdown::CollegeGwa(compute_gwa(cfg.scale, activities, scores))
            }
        }
    }

    /// Summarises headline figures across a roster. Students without data
    /// are left out of the average.
    pub fn class_average<'b, I>(&self, breakdowns: I) -> GradeFigure
    where
        I: IntoIterator<Item = &'b GradeBreakdown>,
    {
        let mut sum = 0.0_f64;
        let mut count = 0_usize;
        for b in breakdowns {
            if let Some(v) = b.overall().value {
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            return GradeFigure::not_available();
        }
        let avg = classify::round_off_2_decimals(sum / count as f64);
        match self.system {
            GradingSystem::Shs(_) => GradeFigure {
                value: Some(avg),
                formatted: classify::format_decimal(avg),
                classification: classify::shs(avg),
            },
            GradingSystem::CollegeTerm(cfg) => GradeFigure::college(Some(avg), cfg.scale),
            GradingSystem::CollegeGwa(cfg) => GradeFigure::college(Some(avg), cfg.scale),
        }
    }
}

fn activity_percentage(score: Option<f64>, total_points: Option<f64>) -> Option<f64> {
    match (score, total_points) {
        (Some(s), Some(tp)) if tp > 0.0 => Some(s * 100.0 / tp),
        _ => None,
    }
}
