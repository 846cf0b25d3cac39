use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradesheet.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teams(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grading_system TEXT NOT NULL,
            college_mode TEXT,
            grading_config TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    ensure_teams_updated_at(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            team_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(team_id) REFERENCES teams(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_team_sort ON students(team_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities(
            id TEXT PRIMARY KEY,
            team_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            title TEXT NOT NULL,
            total_points REAL,
            category TEXT,
            component_type TEXT,
            term TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(team_id) REFERENCES teams(id),
            UNIQUE(team_id, idx)
        )",
        [],
    )?;
    // Workspaces created before GWA support have no credit_units column.
    ensure_activities_credit_units(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_team ON activities(team_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            activity_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            score REAL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(activity_id) REFERENCES activities(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(activity_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_activity ON scores(activity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn ensure_teams_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "teams", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE teams ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_activities_credit_units(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "activities", "credit_units")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE activities ADD COLUMN credit_units REAL NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn open_is_idempotent_and_migrates_columns() {
        let ws = temp_dir("gradesheet-db-open");
        {
            let conn = open_db(&ws).expect("first open");
            assert!(table_has_column(&conn, "activities", "credit_units").expect("pragma"));
            assert!(table_has_column(&conn, "teams", "updated_at").expect("pragma"));
        }
        let conn = open_db(&ws).expect("second open");
        assert!(table_has_column(&conn, "scores", "score").expect("pragma"));
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn settings_round_trip_and_delete() {
        let ws = temp_dir("gradesheet-db-settings");
        let conn = open_db(&ws).expect("open");
        assert_eq!(settings_get_json(&conn, "k").expect("get"), None);
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 2 })).expect("overwrite");
        assert_eq!(
            settings_get_json(&conn, "k").expect("get"),
            Some(serde_json::json!({ "a": 2 }))
        );
        settings_delete(&conn, "k").expect("delete");
        assert_eq!(settings_get_json(&conn, "k").expect("get"), None);
        let _ = std::fs::remove_dir_all(ws);
    }
}
