//! Loads a team snapshot from the workspace database and runs the
//! calculator over it.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::calc::transmutation::{TransmutationRow, TransmutationTable};
use crate::calc::{
    ActivityDef, Category, Component, GradeBreakdown, GradeCalculator, GradeFigure, StudentScores,
    Term,
};
use crate::db;
use crate::grading::GradingSystem;

pub const TRANSMUTATION_KEY: &str = "calc.transmutation";

#[derive(Debug, Clone, Serialize)]
pub struct GradesheetError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GradesheetError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn db(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub id: String,
    pub idx: i64,
    pub title: String,
    pub total_points: Option<f64>,
    pub credit_units: f64,
    pub category: Option<Category>,
    pub component_type: Option<Component>,
    pub term: Option<Term>,
}

impl ActivityRow {
    pub fn to_def(&self) -> ActivityDef {
        ActivityDef {
            id: self.id.clone(),
            title: self.title.clone(),
            total_points: self.total_points,
            credit_units: self.credit_units,
            category: self.category,
            component: self.component_type,
            term: self.term,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamHeader {
    pub id: String,
    pub name: String,
    pub grading: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGradesheet {
    pub student_id: String,
    pub display_name: String,
    pub student_no: Option<String>,
    pub sort_order: i64,
    pub active: bool,
    pub has_data: bool,
    pub overall: GradeFigure,
    pub breakdown: GradeBreakdown,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub student_count: usize,
    pub with_data_count: usize,
    pub class_average: GradeFigure,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamGradesheet {
    pub team: TeamHeader,
    pub activities: Vec<ActivityRow>,
    pub students: Vec<StudentGradesheet>,
    pub summary: TeamSummary,
}

#[derive(Debug, Clone)]
struct RosterStudent {
    id: String,
    display_name: String,
    student_no: Option<String>,
    sort_order: i64,
    active: bool,
}

/// Returns the workspace transmutation table and whether it is the built-in one.
pub fn load_transmutation(conn: &Connection) -> Result<(TransmutationTable, bool), GradesheetError> {
    let stored = db::settings_get_json(conn, TRANSMUTATION_KEY)
        .map_err(|e| GradesheetError::new("db_query_failed", e.to_string()))?;
    let Some(raw) = stored else {
        return Ok((TransmutationTable::deped_default(), true));
    };
    let rows: Vec<TransmutationRow> = serde_json::from_value(raw).map_err(|e| {
        GradesheetError::new("invalid_config", format!("stored transmutation table: {e}"))
    })?;
    let table = TransmutationTable::new(rows)
        .map_err(|e| GradesheetError::new("invalid_config", e.to_string()))?;
    Ok((table, false))
}

pub fn load_team(conn: &Connection, team_id: &str) -> Result<(TeamHeader, GradingSystem), GradesheetError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT name, grading_config FROM teams WHERE id = ?",
            [team_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(GradesheetError::db)?;
    let Some((name, config_raw)) = row else {
        return Err(GradesheetError::new("not_found", "team not found"));
    };

    let config_json: serde_json::Value = serde_json::from_str(&config_raw).map_err(|e| {
        GradesheetError::new("invalid_config", format!("stored grading config: {e}"))
    })?;
    let system = GradingSystem::from_json(&config_json).map_err(|e| GradesheetError {
        code: "invalid_config".to_string(),
        message: e.to_string(),
        details: e.details(),
    })?;

    Ok((
        TeamHeader {
            id: team_id.to_string(),
            name,
            grading: system.to_json(),
        },
        system,
    ))
}

pub fn load_activities(conn: &Connection, team_id: &str) -> Result<Vec<ActivityRow>, GradesheetError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, idx, title, total_points, credit_units, category, component_type, term
             FROM activities
             WHERE team_id = ?
             ORDER BY idx",
        )
        .map_err(GradesheetError::db)?;
    stmt.query_map([team_id], |r| {
        let category: Option<String> = r.get(5)?;
        let component: Option<String> = r.get(6)?;
        let term: Option<String> = r.get(7)?;
        Ok(ActivityRow {
            id: r.get(0)?,
            idx: r.get(1)?,
            title: r.get(2)?,
            total_points: r.get(3)?,
            credit_units: r.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            category: category.as_deref().and_then(Category::parse),
            component_type: component.as_deref().and_then(Component::parse),
            term: term.as_deref().and_then(Term::parse),
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(GradesheetError::db)
}

fn load_roster(
    conn: &Connection,
    team_id: &str,
    only_student: Option<&str>,
) -> Result<Vec<RosterStudent>, GradesheetError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, student_no, sort_order, active
             FROM students
             WHERE team_id = ?1 AND (?2 IS NULL OR id = ?2)
             ORDER BY sort_order",
        )
        .map_err(GradesheetError::db)?;
    stmt.query_map((team_id, only_student), |r| {
        let last: String = r.get(1)?;
        let first: String = r.get(2)?;
        Ok(RosterStudent {
            id: r.get(0)?,
            display_name: format!("{}, {}", last, first),
            student_no: r.get(3)?,
            sort_order: r.get(4)?,
            active: r.get::<_, i64>(5)? != 0,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(GradesheetError::db)
}

/// Student id -> graded scores. Null scores are ungraded and left out.
fn load_scores(
    conn: &Connection,
    team_id: &str,
) -> Result<HashMap<String, StudentScores>, GradesheetError> {
    let mut stmt = conn
        .prepare(
            "SELECT s.student_id, s.activity_id, s.score
             FROM scores s
             JOIN activities a ON a.id = s.activity_id
             WHERE a.team_id = ? AND s.score IS NOT NULL",
        )
        .map_err(GradesheetError::db)?;
    let rows = stmt
        .query_map([team_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })
        .map_err(GradesheetError::db)?;

    let mut by_student: HashMap<String, StudentScores> = HashMap::new();
    for row in rows {
        let (student_id, activity_id, score) = row.map_err(GradesheetError::db)?;
        by_student
            .entry(student_id)
            .or_default()
            .insert(activity_id, score);
    }
    Ok(by_student)
}

fn sheet_for(
    calc: &GradeCalculator<'_>,
    defs: &[ActivityDef],
    student: RosterStudent,
    scores: &HashMap<String, StudentScores>,
) -> StudentGradesheet {
    let empty = StudentScores::new();
    let student_scores = scores.get(&student.id).unwrap_or(&empty);
    let breakdown = calc.student(defs, student_scores);
    StudentGradesheet {
        student_id: student.id,
        display_name: student.display_name,
        student_no: student.student_no,
        sort_order: student.sort_order,
        active: student.active,
        has_data: breakdown.has_data(),
        overall: breakdown.overall().clone(),
        breakdown,
    }
}

pub fn student_breakdown(
    conn: &Connection,
    team_id: &str,
    student_id: &str,
) -> Result<StudentGradesheet, GradesheetError> {
    let (_, system) = load_team(conn, team_id)?;
    let (table, _) = load_transmutation(conn)?;
    let Some(student) = load_roster(conn, team_id, Some(student_id))?.into_iter().next() else {
        return Err(GradesheetError::new("not_found", "student not found"));
    };
    let defs: Vec<ActivityDef> = load_activities(conn, team_id)?
        .iter()
        .map(ActivityRow::to_def)
        .collect();
    let scores = load_scores(conn, team_id)?;

    let calc = GradeCalculator::new(&system, &table);
    Ok(sheet_for(&calc, &defs, student, &scores))
}

pub fn team_gradesheet(conn: &Connection, team_id: &str) -> Result<TeamGradesheet, GradesheetError> {
    let (team, system) = load_team(conn, team_id)?;
    let (table, _) = load_transmutation(conn)?;
    let activities = load_activities(conn, team_id)?;
    let defs: Vec<ActivityDef> = activities.iter().map(ActivityRow::to_def).collect();
    let roster = load_roster(conn, team_id, None)?;
    let scores = load_scores(conn, team_id)?;

    let calc = GradeCalculator::new(&system, &table);
    let students: Vec<StudentGradesheet> = roster
        .into_iter()
        .map(|s| sheet_for(&calc, &defs, s, &scores))
        .collect();

    // Class-level figures only count active students.
    let class_average = calc.class_average(
        students
            .iter()
            .filter(|s| s.active)
            .map(|s| &s.breakdown),
    );
    let with_data_count = students.iter().filter(|s| s.active && s.has_data).count();
    let student_count = students.len();
    tracing::debug!(
        team_id,
        mode = system.mode_name(),
        student_count,
        with_data_count,
        "computed team gradesheet"
    );

    Ok(TeamGradesheet {
        team,
        activities,
        students,
        summary: TeamSummary {
            student_count,
            with_data_count,
            class_average,
        },
    })
}
