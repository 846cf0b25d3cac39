use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_team, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const SCORES_BULK_SET_MAX_EDITS: usize = 5000;

/// `Ok(None)` clears the score back to ungraded.
fn parse_score_value(raw: Option<&serde_json::Value>) -> Result<Option<f64>, HandlerErr> {
    match raw {
        None => Err(HandlerErr::new("bad_params", "missing score")),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) => Ok(Some(n)),
            None => Err(HandlerErr::new("bad_params", "score must be a number or null")
                .with_details(json!({ "score": v }))),
        },
    }
}

fn check_score_range(score: f64, total_points: Option<f64>) -> Result<(), HandlerErr> {
    let too_high = total_points.map(|tp| score > tp).unwrap_or(false);
    if !score.is_finite() || score < 0.0 || too_high {
        tracing::warn!(score, ?total_points, "rejected out-of-range score");
        return Err(HandlerErr::new(
            "score_out_of_range",
            "score must be between 0 and the activity's total points",
        )
        .with_details(json!({ "score": score, "totalPoints": total_points })));
    }
    Ok(())
}

fn resolve_activity_total(
    conn: &Connection,
    team_id: &str,
    activity_id: &str,
) -> Result<Option<f64>, HandlerErr> {
    let row: Option<Option<f64>> = conn
        .query_row(
            "SELECT total_points FROM activities WHERE id = ? AND team_id = ?",
            (activity_id, team_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    row.ok_or_else(|| {
        HandlerErr::new("not_found", "activity not found")
            .with_details(json!({ "activityId": activity_id }))
    })
}

fn require_student(conn: &Connection, team_id: &str, student_id: &str) -> Result<(), HandlerErr> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND team_id = ?",
            (student_id, team_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    }
    Ok(())
}

fn upsert_score(
    conn: &Connection,
    activity_id: &str,
    student_id: &str,
    score: Option<f64>,
) -> Result<(), HandlerErr> {
    let score_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO scores(id, activity_id, student_id, score, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(activity_id, student_id) DO UPDATE SET
           score = excluded.score,
           updated_at = excluded.updated_at",
        (&score_id, activity_id, student_id, score, db::now_rfc3339()),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "scores" }))
    })?;
    Ok(())
}

/// Validates and writes one score edit.
fn apply_score(
    conn: &Connection,
    team_id: &str,
    activity_id: &str,
    student_id: &str,
    raw: Option<&serde_json::Value>,
) -> Result<(), HandlerErr> {
    let score = parse_score_value(raw)?;
    let total_points = resolve_activity_total(conn, team_id, activity_id)?;
    require_student(conn, team_id, student_id)?;
    if let Some(s) = score {
        check_score_range(s, total_points)?;
    }
    upsert_score(conn, activity_id, student_id, score)
}

fn handle_scores_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT s.activity_id, s.student_id, s.score
         FROM scores s
         JOIN activities a ON a.id = s.activity_id
         WHERE a.team_id = ?
         ORDER BY a.idx, s.student_id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&team_id], |r| {
            let activity_id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let score: Option<f64> = r.get(2)?;
            Ok(json!({
                "activityId": activity_id,
                "studentId": student_id,
                "score": score
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(cells) => ok(&req.id, json!({ "cells": cells })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_scores_set(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match apply_score(
        conn,
        &team_id,
        &activity_id,
        &student_id,
        req.params.get("score"),
    ) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_scores_bulk_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(edits) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing edits[]", None);
    };
    if let Err(e) = require_team(conn, &team_id) {
        return e.response(&req.id);
    }

    if edits.len() > SCORES_BULK_SET_MAX_EDITS {
        let rejected = edits.len();
        return ok(
            &req.id,
            json!({
                "ok": true,
                "updated": 0,
                "rejected": rejected,
                "limitExceeded": true,
                "errors": [{
                    "index": -1,
                    "code": "too_many_edits",
                    "message": format!(
                        "bulk payload exceeds max edits: {} > {}",
                        rejected, SCORES_BULK_SET_MAX_EDITS
                    )
                }]
            }),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let mut updated: usize = 0;
    let mut errors: Vec<serde_json::Value> = Vec::new();
    for (i, edit) in edits.iter().enumerate() {
        let Some(obj) = edit.as_object() else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("edit at index {} must be an object", i),
            }));
            continue;
        };
        let (Some(activity_id), Some(student_id)) = (
            obj.get("activityId").and_then(|v| v.as_str()),
            obj.get("studentId").and_then(|v| v.as_str()),
        ) else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("edit at index {} needs activityId and studentId", i),
            }));
            continue;
        };

        match apply_score(&tx, &team_id, activity_id, student_id, obj.get("score")) {
            Ok(()) => updated += 1,
            Err(e) => errors.push(json!({
                "index": i,
                "activityId": activity_id,
                "studentId": student_id,
                "code": e.code,
                "message": e.message,
            })),
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    let mut result = json!({ "ok": true, "updated": updated });
    if !errors.is_empty() {
        result["rejected"] = json!(errors.len());
        result["errors"] = json!(errors);
    }
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.get" => Some(handle_scores_get(state, req)),
        "scores.set" => Some(handle_scores_set(state, req)),
        "scores.bulkSet" => Some(handle_scores_bulk_set(state, req)),
        _ => None,
    }
}
