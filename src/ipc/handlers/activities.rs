use crate::calc::{Category, Component, Term};
use crate::db;
use crate::gradesheet::{self, ActivityRow};
use crate::grading::GradingSystem;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, gradesheet_err, optional_non_negative, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use uuid::Uuid;

const PATCH_FIELDS: [&str; 6] = [
    "title",
    "totalPoints",
    "creditUnits",
    "category",
    "componentType",
    "term",
];

#[derive(Debug, Clone, Default)]
struct ActivityFields {
    title: String,
    total_points: Option<f64>,
    credit_units: f64,
    category: Option<Category>,
    component: Option<Component>,
    term: Option<Term>,
}

impl From<&ActivityRow> for ActivityFields {
    fn from(row: &ActivityRow) -> Self {
        Self {
            title: row.title.clone(),
            total_points: row.total_points,
            credit_units: row.credit_units,
            category: row.category,
            component: row.component_type,
            term: row.term,
        }
    }
}

fn parse_tag<T>(
    obj: &Map<String, Value>,
    key: &str,
    allowed: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<Option<T>>, HandlerErr> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => {
            let parsed = v.as_str().and_then(parse);
            match parsed {
                Some(t) => Ok(Some(Some(t))),
                None => Err(HandlerErr::new(
                    "bad_params",
                    format!("{} must be one of: {}", key, allowed),
                )
                .with_details(json!({ "field": key, "value": v }))),
            }
        }
    }
}

/// Applies whichever known keys are present in `obj`.
fn apply_fields(fields: &mut ActivityFields, obj: &Map<String, Value>) -> Result<(), HandlerErr> {
    if let Some(v) = obj.get("title") {
        let Some(s) = v.as_str().map(|s| s.trim().to_string()) else {
            return Err(HandlerErr::new("bad_params", "title must be string"));
        };
        if s.is_empty() {
            return Err(HandlerErr::new("bad_params", "title must not be empty"));
        }
        fields.title = s;
    }
    if obj.contains_key("totalPoints") {
        fields.total_points = optional_non_negative(obj, "totalPoints")?;
    }
    if obj.contains_key("creditUnits") {
        fields.credit_units = optional_non_negative(obj, "creditUnits")?.unwrap_or(0.0);
    }
    if let Some(c) = parse_tag(obj, "category", "written, performance", Category::parse)? {
        fields.category = c;
    }
    if let Some(c) = parse_tag(
        obj,
        "componentType",
        "written_work, performance_task, quarterly_assessment",
        Component::parse,
    )? {
        fields.component = c;
    }
    if let Some(t) = parse_tag(obj, "term", "prelim, midterm, final", Term::parse)? {
        fields.term = t;
    }
    Ok(())
}

/// An activity must carry the classification its team's mode grades by.
fn check_classification(fields: &ActivityFields, system: &GradingSystem) -> Result<(), HandlerErr> {
    if system.accepts(fields.component, fields.category, fields.term) {
        return Ok(());
    }
    let message = match system {
        GradingSystem::Shs(_) => "componentType is required for SHS teams",
        _ => "category and term are required for term-based college teams",
    };
    Err(HandlerErr::new("bad_params", message))
}

fn handle_activities_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match gradesheet::load_activities(conn, &team_id) {
        Ok(rows) => ok(&req.id, json!({ "activities": rows })),
        Err(e) => gradesheet_err(&req.id, e),
    }
}

fn handle_activities_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(params) = req.params.as_object() else {
        return err(&req.id, "bad_params", "params must be an object", None);
    };
    if !params.contains_key("title") {
        return err(&req.id, "bad_params", "missing title", None);
    }

    let (_, system) = match gradesheet::load_team(conn, &team_id) {
        Ok(v) => v,
        Err(e) => return gradesheet_err(&req.id, e),
    };

    let mut fields = ActivityFields::default();
    if let Err(e) = apply_fields(&mut fields, params) {
        return e.response(&req.id);
    }
    if let Err(e) = check_classification(&fields, &system) {
        return e.response(&req.id);
    }

    let idx: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(idx) + 1, 0) FROM activities WHERE team_id = ?",
        [&team_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let activity_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO activities(id, team_id, idx, title, total_points, credit_units, category, component_type, term, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &activity_id,
            &team_id,
            idx,
            &fields.title,
            fields.total_points,
            fields.credit_units,
            fields.category.map(Category::as_str),
            fields.component.map(Component::as_str),
            fields.term.map(Term::as_str),
            db::now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "activities" })),
        );
    }

    ok(&req.id, json!({ "activityId": activity_id, "idx": idx }))
}

fn handle_activities_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let activity_id = match required_str(req, "activityId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    if let Some(unknown) = patch.keys().find(|k| !PATCH_FIELDS.contains(&k.as_str())) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown activity field: {}", unknown),
            None,
        );
    }

    let (_, system) = match gradesheet::load_team(conn, &team_id) {
        Ok(v) => v,
        Err(e) => return gradesheet_err(&req.id, e),
    };
    let rows = match gradesheet::load_activities(conn, &team_id) {
        Ok(v) => v,
        Err(e) => return gradesheet_err(&req.id, e),
    };
    let Some(current) = rows.iter().find(|a| a.id == activity_id) else {
        return err(&req.id, "not_found", "activity not found", None);
    };

    let mut fields = ActivityFields::from(current);
    if let Err(e) = apply_fields(&mut fields, patch) {
        return e.response(&req.id);
    }
    if let Err(e) = check_classification(&fields, &system) {
        return e.response(&req.id);
    }

    // Shrinking total points must not strand scores above the new maximum.
    if let Some(tp) = fields.total_points {
        let max_score: Option<f64> = match conn.query_row(
            "SELECT MAX(score) FROM scores WHERE activity_id = ?",
            [&activity_id],
            |r| r.get(0),
        ) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if let Some(max) = max_score.filter(|m| *m > tp) {
            tracing::warn!(activity_id = %activity_id, max, tp, "totalPoints below recorded score");
            return err(
                &req.id,
                "score_out_of_range",
                "totalPoints is below an existing score",
                Some(json!({ "maxScore": max, "totalPoints": tp })),
            );
        }
    }

    if let Err(e) = conn.execute(
        "UPDATE activities
         SET title = ?, total_points = ?, credit_units = ?, category = ?, component_type = ?, term = ?
         WHERE id = ? AND team_id = ?",
        (
            &fields.title,
            fields.total_points,
            fields.credit_units,
            fields.category.map(Category::as_str),
            fields.component.map(Component::as_str),
            fields.term.map(Term::as_str),
            &activity_id,
            &team_id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "activities" })),
        );
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_activities_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let activity_id = match required_str(req, "activityId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let deleted = match tx.execute(
        "DELETE FROM scores WHERE activity_id IN (SELECT id FROM activities WHERE id = ? AND team_id = ?)",
        (&activity_id, &team_id),
    )
    .and_then(|_| {
        tx.execute(
            "DELETE FROM activities WHERE id = ? AND team_id = ?",
            (&activity_id, &team_id),
        )
    }) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "activity not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activities.list" => Some(handle_activities_list(state, req)),
        "activities.create" => Some(handle_activities_create(state, req)),
        "activities.update" => Some(handle_activities_update(state, req)),
        "activities.delete" => Some(handle_activities_delete(state, req)),
        _ => None,
    }
}
