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

fn approx(v: &serde_json::Value, expected: f64) -> bool {
    v.as_f64().map(|x| (x - expected).abs() < 1e-6).unwrap_or(false)
}

fn setup_shs_team(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> (String, Vec<String>, String) {
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
            "name": "Grade 11 - Gauss",
            "grading": {
                "system": "shs",
                "weights": { "writtenWork": 30, "performanceTask": 50, "quarterlyAssessment": 20 }
            }
        }),
    );
    let team_id = team["teamId"].as_str().expect("teamId").to_string();

    let mut activity_ids = Vec::new();
    for (i, (title, component, tp)) in [
        ("Quiz 1", "written_work", 50.0),
        ("Lab Report", "performance_task", 100.0),
        ("Quarter Exam", "quarterly_assessment", 20.0),
    ]
    .iter()
    .enumerate()
    {
        let created = request_ok(
            stdin,
            reader,
            &format!("act{}", i),
            "activities.create",
            json!({
                "teamId": team_id,
                "title": title,
                "componentType": component,
                "totalPoints": tp
            }),
        );
        activity_ids.push(created["activityId"].as_str().expect("activityId").to_string());
    }

    let student = request_ok(
        stdin,
        reader,
        "stu",
        "students.create",
        json!({ "teamId": team_id, "lastName": "Reyes", "firstName": "Ana" }),
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();
    (team_id, activity_ids, student_id)
}

#[test]
fn shs_breakdown_pools_components_and_transmutes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (team_id, acts, student_id) = setup_shs_team(&mut stdin, &mut reader, "gradesheet-shs");

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.student",
        json!({ "teamId": team_id, "studentId": student_id }),
    );
    assert_eq!(before["student"]["hasData"].as_bool(), Some(false));
    assert_eq!(before["student"]["overall"]["formatted"].as_str(), Some("N/A"));
    assert_eq!(before["student"]["overall"]["descriptor"].as_str(), Some("No Grade"));
    assert_eq!(before["student"]["overall"]["color"].as_str(), Some("secondary"));

    for (i, (aid, score)) in acts.iter().zip([45.0, 80.0, 18.0]).enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "scores.set",
            json!({
                "teamId": team_id,
                "activityId": aid,
                "studentId": student_id,
                "score": score
            }),
        );
    }

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.student",
        json!({ "teamId": team_id, "studentId": student_id }),
    );
    let sheet = &after["student"];
    assert_eq!(sheet["hasData"].as_bool(), Some(true));
    assert_eq!(sheet["breakdown"]["mode"].as_str(), Some("shs"));

    let components = sheet["breakdown"]["components"].as_array().expect("components");
    assert_eq!(components.len(), 3);
    let weighted: Vec<f64> = components
        .iter()
        .map(|c| c["weightedScore"]["value"].as_f64().expect("weightedScore"))
        .collect();
    assert!((weighted[0] - 27.0).abs() < 1e-6);
    assert!((weighted[1] - 40.0).abs() < 1e-6);
    assert!((weighted[2] - 18.0).abs() < 1e-6);
    assert!(approx(&sheet["breakdown"]["initialGrade"]["value"], 85.0));
    let sum: f64 = weighted.iter().sum();
    assert!(approx(&sheet["breakdown"]["initialGrade"]["value"], sum));

    assert!(approx(&sheet["overall"]["value"], 90.0));
    assert_eq!(sheet["overall"]["formatted"].as_str(), Some("90"));
    assert_eq!(sheet["overall"]["descriptor"].as_str(), Some("Outstanding"));
    assert_eq!(sheet["overall"]["color"].as_str(), Some("success"));

    let _ = child.kill();
}

#[test]
fn shs_team_gradesheet_summarizes_active_students() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (team_id, acts, student_id) = setup_shs_team(&mut stdin, &mut reader, "gradesheet-shs-team");

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "teamId": team_id, "lastName": "Cruz", "firstName": "Ben" }),
    );
    let second_id = second["studentId"].as_str().expect("studentId").to_string();
    let withdrawn = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "teamId": team_id, "lastName": "Lim", "firstName": "Cy", "active": false }),
    );
    let withdrawn_id = withdrawn["studentId"].as_str().expect("studentId").to_string();

    // Full marks for the first student, half on the quiz only for the
    // withdrawn one, nothing for the second.
    let mut edits = Vec::new();
    for (aid, tp) in acts.iter().zip([50.0, 100.0, 20.0]) {
        edits.push(json!({ "activityId": aid, "studentId": student_id, "score": tp }));
    }
    edits.push(json!({ "activityId": acts[0], "studentId": withdrawn_id, "score": 25.0 }));
    let bulk = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.bulkSet",
        json!({ "teamId": team_id, "edits": edits }),
    );
    assert_eq!(bulk["updated"].as_u64(), Some(4));

    let team = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.team",
        json!({ "teamId": team_id }),
    );
    let students = team["students"].as_array().expect("students");
    assert_eq!(students.len(), 3);
    assert_eq!(students[0]["studentId"].as_str(), Some(student_id.as_str()));
    assert!(approx(&students[0]["overall"]["value"], 100.0));
    assert_eq!(students[1]["studentId"].as_str(), Some(second_id.as_str()));
    assert_eq!(students[1]["hasData"].as_bool(), Some(false));
    assert_eq!(students[2]["active"].as_bool(), Some(false));
    assert_eq!(students[2]["hasData"].as_bool(), Some(true));

    assert_eq!(team["summary"]["studentCount"].as_u64(), Some(3));
    assert_eq!(team["summary"]["withDataCount"].as_u64(), Some(1));
    assert!(approx(&team["summary"]["classAverage"]["value"], 100.0));
    assert_eq!(team["activities"].as_array().map(|a| a.len()), Some(3));

    let _ = child.kill();
}
