use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::gradesheet::GradesheetError;
use crate::grading::ConfigError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

/// A handler failure that has not been bound to a request id yet.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ConfigError> for HandlerErr {
    fn from(e: ConfigError) -> Self {
        Self {
            code: "invalid_config",
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn gradesheet_err(id: &str, e: GradesheetError) -> serde_json::Value {
    if e.code.starts_with("db_") {
        tracing::error!(code = %e.code, message = %e.message, "gradesheet query failed");
    }
    err(id, &e.code, e.message, e.details)
}

pub fn team_exists(conn: &Connection, team_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM teams WHERE id = ?", [team_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

pub fn require_team(conn: &Connection, team_id: &str) -> Result<(), HandlerErr> {
    if team_exists(conn, team_id)? {
        Ok(())
    } else {
        Err(HandlerErr::new("not_found", "team not found").with_details(json!({ "teamId": team_id })))
    }
}

/// Reads an optional non-negative number. `Ok(None)` when the key is absent
/// or null.
pub fn optional_non_negative(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<f64>, HandlerErr> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
            _ => Err(HandlerErr::new(
                "bad_params",
                format!("{} must be a number >= 0", key),
            )
            .with_details(json!({ "field": key, "value": v }))),
        },
    }
}
