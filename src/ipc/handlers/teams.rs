use crate::db;
use crate::gradesheet;
use crate::grading::{ConfigError, GradingSystem};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, gradesheet_err, require_team, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn parse_grading(req: &Request) -> Result<GradingSystem, HandlerErr> {
    let Some(raw) = req.params.get("grading") else {
        return Err(HandlerErr::new("bad_params", "missing grading"));
    };
    GradingSystem::from_json(raw).map_err(|e| {
        tracing::warn!(error = %e, "rejected grading configuration");
        HandlerErr::from(e)
    })
}

/// Existing activities must already carry the tags the new mode grades by;
/// otherwise they would drop out of every breakdown without notice.
fn check_activities_fit(
    conn: &rusqlite::Connection,
    team_id: &str,
    grading: &GradingSystem,
) -> Result<(), HandlerErr> {
    let activities = gradesheet::load_activities(conn, team_id).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.message,
        details: e.details,
    })?;
    let ids: Vec<String> = activities
        .into_iter()
        .filter(|a| !grading.accepts(a.component_type, a.category, a.term))
        .map(|a| a.id)
        .collect();
    if ids.is_empty() {
        return Ok(());
    }
    tracing::warn!(
        team_id,
        mode = grading.mode_name(),
        unclassified = ids.len(),
        "rejected grading switch"
    );
    Err(ConfigError::UnclassifiedActivities {
        mode: grading.mode_name(),
        ids,
    }
    .into())
}

fn handle_teams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "teams": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.name,
           t.grading_system,
           t.college_mode,
           (SELECT COUNT(*) FROM students s WHERE s.team_id = t.id) AS student_count,
           (SELECT COUNT(*) FROM activities a WHERE a.team_id = t.id) AS activity_count
         FROM teams t
         ORDER BY t.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grading_system: String = row.get(2)?;
            let college_mode: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let activity_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "gradingSystem": grading_system,
                "collegeMode": college_mode,
                "studentCount": student_count,
                "activityCount": activity_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(teams) => ok(&req.id, json!({ "teams": teams })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_teams_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let grading = match parse_grading(req) {
        Ok(g) => g,
        Err(e) => return e.response(&req.id),
    };

    let team_id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO teams(id, name, grading_system, college_mode, grading_config, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &team_id,
            &name,
            grading.system_name(),
            grading.college_mode(),
            grading.to_json().to_string(),
            &now,
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teams" })),
        );
    }

    tracing::info!(team_id = %team_id, system = grading.system_name(), "team created");
    ok(&req.id, json!({ "teamId": team_id, "name": name }))
}

fn handle_teams_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match gradesheet::load_team(conn, &team_id) {
        Ok((team, _)) => ok(&req.id, json!({ "team": team })),
        Err(e) => gradesheet_err(&req.id, e),
    }
}

fn handle_teams_grading_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_team(conn, &team_id) {
        return e.response(&req.id);
    }
    let grading = match parse_grading(req) {
        Ok(g) => g,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = check_activities_fit(conn, &team_id, &grading) {
        return e.response(&req.id);
    }

    if let Err(e) = conn.execute(
        "UPDATE teams
         SET grading_system = ?, college_mode = ?, grading_config = ?, updated_at = ?
         WHERE id = ?",
        (
            grading.system_name(),
            grading.college_mode(),
            grading.to_json().to_string(),
            db::now_rfc3339(),
            &team_id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "teams" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_teams_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let team_id = match required_str(req, "teamId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_team(conn, &team_id) {
        return e.response(&req.id);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependency order; the schema has no ON DELETE CASCADE.
    let steps: [(&str, &str); 4] = [
        (
            "scores",
            "DELETE FROM scores
             WHERE activity_id IN (SELECT id FROM activities WHERE team_id = ?)",
        ),
        ("activities", "DELETE FROM activities WHERE team_id = ?"),
        ("students", "DELETE FROM students WHERE team_id = ?"),
        ("teams", "DELETE FROM teams WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&team_id]) {
            let _ = tx.rollback();
            tracing::error!(table, error = %e, "team delete failed");
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teams.list" => Some(handle_teams_list(state, req)),
        "teams.create" => Some(handle_teams_create(state, req)),
        "teams.get" => Some(handle_teams_get(state, req)),
        "teams.grading.update" => Some(handle_teams_grading_update(state, req)),
        "teams.delete" => Some(handle_teams_delete(state, req)),
        _ => None,
    }
}
