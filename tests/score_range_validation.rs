use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradesheetd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradesheetd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn setup_team(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> (String, String, String) {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let team = request_ok(
        stdin,
        reader,
        "team",
        "teams.create",
        json!({
            "name": "Grade 12 - Curie",
            "grading": {
                "system": "shs",
                "weights": { "writtenWork": 25, "performanceTask": 50, "quarterlyAssessment": 25 }
            }
        }),
    );
    let team_id = team["teamId"].as_str().expect("teamId").to_string();
    let act = request_ok(
        stdin,
        reader,
        "act",
        "activities.create",
        json!({
            "teamId": team_id,
            "title": "Long Quiz",
            "componentType": "written_work",
            "totalPoints": 40
        }),
    );
    let activity_id = act["activityId"].as_str().expect("activityId").to_string();
    let stu = request_ok(
        stdin,
        reader,
        "stu",
        "students.create",
        json!({ "teamId": team_id, "lastName": "Dela Cruz", "firstName": "Jo" }),
    );
    let student_id = stu["studentId"].as_str().expect("studentId").to_string();
    (team_id, activity_id, student_id)
}

#[test]
fn scores_outside_activity_range_are_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (team_id, activity_id, student_id) = setup_team(&mut stdin, &mut reader, "gradesheet-score-range");

    for (i, bad) in [json!(40.5), json!(-1), json!("ten")].iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad{}", i),
            "scores.set",
            json!({
                "teamId": team_id,
                "activityId": activity_id,
                "studentId": student_id,
                "score": bad
            }),
        );
        assert_eq!(resp["ok"].as_bool(), Some(false), "accepted {}", bad);
        let expected = if bad.is_number() { "score_out_of_range" } else { "bad_params" };
        assert_eq!(error_code(&resp), expected);
    }

    let cells = request_ok(&mut stdin, &mut reader, "1", "scores.get", json!({ "teamId": team_id }));
    assert_eq!(cells["cells"].as_array().map(|c| c.len()), Some(0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scores.set",
        json!({
            "teamId": team_id,
            "activityId": activity_id,
            "studentId": student_id,
            "score": 40
        }),
    );
    let cells = request_ok(&mut stdin, &mut reader, "3", "scores.get", json!({ "teamId": team_id }));
    assert_eq!(cells["cells"][0]["score"].as_f64(), Some(40.0));

    // Null clears the score without deleting the cell.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scores.set",
        json!({
            "teamId": team_id,
            "activityId": activity_id,
            "studentId": student_id,
            "score": null
        }),
    );
    let cells = request_ok(&mut stdin, &mut reader, "5", "scores.get", json!({ "teamId": team_id }));
    assert!(cells["cells"][0]["score"].is_null());
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.student",
        json!({ "teamId": team_id, "studentId": student_id }),
    );
    assert_eq!(sheet["student"]["hasData"].as_bool(), Some(false));

    let unknown = request(
        &mut stdin,
        &mut reader,
        "7",
        "scores.set",
        json!({
            "teamId": team_id,
            "activityId": "missing-activity",
            "studentId": student_id,
            "score": 1
        }),
    );
    assert_eq!(error_code(&unknown), "not_found");

    let _ = child.kill();
}

#[test]
fn total_points_cannot_drop_below_recorded_scores() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (team_id, activity_id, student_id) = setup_team(&mut stdin, &mut reader, "gradesheet-score-shrink");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.set",
        json!({
            "teamId": team_id,
            "activityId": activity_id,
            "studentId": student_id,
            "score": 35
        }),
    );
    let shrink = request(
        &mut stdin,
        &mut reader,
        "2",
        "activities.update",
        json!({ "teamId": team_id, "activityId": activity_id, "patch": { "totalPoints": 30 } }),
    );
    assert_eq!(error_code(&shrink), "score_out_of_range");
    assert_eq!(shrink["error"]["details"]["maxScore"].as_f64(), Some(35.0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "activities.update",
        json!({ "teamId": team_id, "activityId": activity_id, "patch": { "totalPoints": 35, "title": "Long Quiz 1" } }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "4", "activities.list", json!({ "teamId": team_id }));
    assert_eq!(listed["activities"][0]["totalPoints"].as_f64(), Some(35.0));
    assert_eq!(listed["activities"][0]["title"].as_str(), Some("Long Quiz 1"));

    let unknown_field = request(
        &mut stdin,
        &mut reader,
        "5",
        "activities.update",
        json!({ "teamId": team_id, "activityId": activity_id, "patch": { "weight": 3 } }),
    );
    assert_eq!(error_code(&unknown_field), "bad_params");

    let _ = child.kill();
}

#[test]
fn bulk_set_reports_rejected_edits_and_enforces_limit() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (team_id, activity_id, student_id) = setup_team(&mut stdin, &mut reader, "gradesheet-score-bulk");

    let mixed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.bulkSet",
        json!({
            "teamId": team_id,
            "edits": [
                { "activityId": activity_id, "studentId": student_id, "score": 30 },
                { "activityId": activity_id, "studentId": student_id, "score": 400 },
                { "activityId": activity_id, "score": 10 },
                "not an edit"
            ]
        }),
    );
    assert_eq!(mixed["updated"].as_u64(), Some(1));
    assert_eq!(mixed["rejected"].as_u64(), Some(3));
    let errors = mixed["errors"].as_array().expect("errors");
    assert_eq!(errors[0]["index"].as_u64(), Some(1));
    assert_eq!(errors[0]["code"].as_str(), Some("score_out_of_range"));
    assert_eq!(errors[1]["code"].as_str(), Some("bad_params"));
    assert_eq!(errors[2]["index"].as_u64(), Some(3));

    let cells = request_ok(&mut stdin, &mut reader, "2", "scores.get", json!({ "teamId": team_id }));
    assert_eq!(cells["cells"][0]["score"].as_f64(), Some(30.0));

    let oversized: Vec<serde_json::Value> = (0..5001)
        .map(|_| json!({ "activityId": activity_id, "studentId": student_id, "score": 1 }))
        .collect();
    let limited = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.bulkSet",
        json!({ "teamId": team_id, "edits": oversized }),
    );
    assert_eq!(limited["limitExceeded"].as_bool(), Some(true));
    assert_eq!(limited["updated"].as_u64(), Some(0));
    assert_eq!(limited["rejected"].as_u64(), Some(5001));

    let cells = request_ok(&mut stdin, &mut reader, "4", "scores.get", json!({ "teamId": team_id }));
    assert_eq!(cells["cells"][0]["score"].as_f64(), Some(30.0));

    let _ = child.kill();
}
