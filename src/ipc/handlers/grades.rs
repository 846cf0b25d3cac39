use crate::gradesheet;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, gradesheet_err, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_grades_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sheet = match gradesheet::student_breakdown(conn, &team_id, &student_id) {
        Ok(s) => s,
        Err(e) => return gradesheet_err(&req.id, e),
    };
    match serde_json::to_value(sheet) {
        Ok(v) => ok(&req.id, json!({ "student": v })),
        Err(e) => err(&req.id, "server_error", e.to_string(), None),
    }
}

fn handle_grades_team(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sheet = match gradesheet::team_gradesheet(conn, &team_id) {
        Ok(s) => s,
        Err(e) => return gradesheet_err(&req.id, e),
    };
    match serde_json::to_value(sheet) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "server_error", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.student" => Some(handle_grades_student(state, req)),
        "grades.team" => Some(handle_grades_team(state, req)),
        _ => None,
    }
}
