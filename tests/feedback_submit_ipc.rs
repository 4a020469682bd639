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
    let exe = env!("CARGO_BIN_EXE_feedbackd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn feedbackd");
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
    session: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
        "session": session,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn admin() -> serde_json::Value {
    json!({ "is_admin": true })
}

fn student(enrollment: &str) -> serde_json::Value {
    json!({ "enrollment": enrollment })
}

fn error_status(resp: &serde_json::Value) -> i64 {
    assert_eq!(resp["ok"], json!(false), "expected failure: {}", resp);
    resp["error"]["status"].as_i64().expect("error status")
}

fn create(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    table: &str,
    fields: serde_json::Value,
) -> serde_json::Value {
    let resp = request(
        stdin,
        reader,
        id,
        "tables.create",
        json!({ "table": table, "fields": fields }),
        admin(),
    );
    assert_eq!(resp["ok"], json!(true), "seed {} failed: {}", table, resp);
    resp["result"]["pk"].clone()
}

/// Open a workspace and seed one class: teacher T1, subject CS201
/// (CSE, semester 3), student EN1 in CSE/year 2/semester 3/section 1,
/// one allocation tying them together. Returns the allocation id.
fn seed_class(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> i64 {
    let workspace = temp_dir("feedbackd-submit");
    let resp = request(
        stdin,
        reader,
        "open",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
        json!({}),
    );
    assert_eq!(resp["ok"], json!(true), "open failed: {}", resp);

    create(
        stdin,
        reader,
        "seed-t",
        "Teacher",
        json!({ "teacher_id": "T1", "full_name": "John Smith", "designation": "Professor" }),
    );
    create(
        stdin,
        reader,
        "seed-s",
        "Subject",
        json!({
            "subject_code": "CS201",
            "subject_name": "Database Systems",
            "semester": 3,
            "branch": "CSE"
        }),
    );
    create(
        stdin,
        reader,
        "seed-en",
        "Student",
        json!({
            "enrollment_no": "EN1",
            "full_name": "Priya Sharma",
            "gender": "F",
            "email": "priya@example.edu",
            "branch": "CSE",
            "year": 2,
            "semester": 3,
            "section": 1
        }),
    );
    let pk = create(
        stdin,
        reader,
        "seed-a",
        "Allocation",
        json!({
            "teacher_id": "T1",
            "subject_code": "CS201",
            "target_branch": "CSE",
            "target_year": 2,
            "target_semester": 3,
            "target_section": 1
        }),
    );
    pk.as_i64().expect("allocation id")
}

fn submit_payload(allocation_id: i64) -> serde_json::Value {
    json!({
        "subject_code": "CS201",
        "allocation_id": allocation_id,
        "q1": 5, "q2": 4, "q3": 5, "q4": 3, "q5": 4,
        "q6": 5, "q7": 4, "q8": 3, "q9": 5, "q10": 4
    })
}

#[test]
fn submit_then_duplicate_conflicts() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let alloc = seed_class(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "feedback.submit",
        submit_payload(alloc),
        student("EN1"),
    );
    assert_eq!(resp["ok"], json!(true), "{}", resp);
    assert_eq!(resp["result"]["allocation_id"], json!(alloc));
    assert_eq!(resp["result"]["message"], json!("feedback submitted"));

    // Second submission for the same allocation must conflict even with
    // different ratings.
    let mut again = submit_payload(alloc);
    again["q1"] = json!(1);
    let resp = request(&mut stdin, &mut reader, "2", "feedback.submit", again, student("EN1"));
    assert_eq!(error_status(&resp), 409);
    assert_eq!(resp["error"]["message"], json!("feedback already submitted"));

    // The failed duplicate must not have left a second response behind.
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "tables.query",
        json!({ "table": "feedback_response" }),
        admin(),
    );
    assert_eq!(resp["result"]["total"], json!(1));

    let _ = child.kill();
}

#[test]
fn subject_code_is_normalized_before_comparison() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let alloc = seed_class(&mut stdin, &mut reader);

    let mut payload = submit_payload(alloc);
    payload["subject_code"] = json!("  cs201 ");
    let resp = request(&mut stdin, &mut reader, "1", "feedback.submit", payload, student("EN1"));
    assert_eq!(resp["ok"], json!(true), "{}", resp);

    let _ = child.kill();
}

#[test]
fn bad_ratings_are_field_scoped_validation_errors() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let alloc = seed_class(&mut stdin, &mut reader);

    let mut payload = submit_payload(alloc);
    payload["q4"] = json!(6);
    payload["q7"] = json!("not a number");
    let resp = request(&mut stdin, &mut reader, "1", "feedback.submit", payload, student("EN1"));
    assert_eq!(error_status(&resp), 400);
    assert_eq!(resp["error"]["fields"]["q4"], json!("rating must be 1-5"));
    assert_eq!(resp["error"]["fields"]["q7"], json!("rating must be 1-5"));

    // Nothing persisted on a validation failure.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "tables.query",
        json!({ "table": "feedback_submissionlog" }),
        admin(),
    );
    assert_eq!(resp["result"]["total"], json!(0));

    let _ = child.kill();
}

#[test]
fn mismatches_map_to_the_right_statuses() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let alloc = seed_class(&mut stdin, &mut reader);

    // Unknown allocation id.
    let mut payload = submit_payload(alloc + 999);
    let resp = request(&mut stdin, &mut reader, "1", "feedback.submit", payload.clone(), student("EN1"));
    assert_eq!(error_status(&resp), 404);
    assert_eq!(resp["error"]["message"], json!("Invalid allocation_id"));

    // Subject code that does not match the allocation's subject.
    payload = submit_payload(alloc);
    payload["subject_code"] = json!("MA101");
    let resp = request(&mut stdin, &mut reader, "2", "feedback.submit", payload, student("EN1"));
    assert_eq!(error_status(&resp), 403);
    assert_eq!(resp["error"]["message"], json!("subject mismatch for allocation_id"));

    // A student from another class cannot use this allocation.
    create(
        &mut stdin,
        &mut reader,
        "seed-other",
        "Student",
        json!({
            "enrollment_no": "EN2",
            "full_name": "Dev Patel",
            "gender": "M",
            "email": "dev@example.edu",
            "branch": "CSE",
            "year": 3,
            "semester": 5,
            "section": 1
        }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "feedback.submit",
        submit_payload(alloc),
        student("EN2"),
    );
    assert_eq!(error_status(&resp), 403);
    assert_eq!(
        resp["error"]["message"],
        json!("allocation_id does not belong to logged-in student")
    );

    // No session enrollment at all.
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "feedback.submit",
        submit_payload(alloc),
        json!({}),
    );
    assert_eq!(error_status(&resp), 401);

    // Enrollment that does not resolve to a student row.
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "feedback.submit",
        submit_payload(alloc),
        student("GHOST"),
    );
    assert_eq!(error_status(&resp), 404);
    assert_eq!(resp["error"]["message"], json!("student not found"));

    let _ = child.kill();
}

#[test]
fn successful_submission_writes_response_and_log_together() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let alloc = seed_class(&mut stdin, &mut reader);

    let mut payload = submit_payload(alloc);
    payload["comments"] = json!("  clear explanations  ");
    let resp = request(&mut stdin, &mut reader, "1", "feedback.submit", payload, student("EN1"));
    assert_eq!(resp["ok"], json!(true), "{}", resp);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "tables.query",
        json!({ "table": "feedback_response" }),
        admin(),
    );
    assert_eq!(resp["result"]["total"], json!(1));
    let row = &resp["result"]["rows"][0];
    assert_eq!(row["allocation_id"], json!(alloc));
    assert_eq!(row["q1_rating"], json!(5));
    assert_eq!(row["q10_rating"], json!(4));
    assert_eq!(row["comments"], json!("clear explanations"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "tables.query",
        json!({ "table": "feedback_submissionlog" }),
        admin(),
    );
    assert_eq!(resp["result"]["total"], json!(1));
    let row = &resp["result"]["rows"][0];
    assert_eq!(row["enrollment_no"], json!("EN1"));
    assert_eq!(row["allocation_id"], json!(alloc));
    assert!(row["timestamp"].as_str().is_some_and(|t| !t.is_empty()));

    // The student's own history shows the submission, newest first.
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "feedback.mine",
        json!({}),
        student("EN1"),
    );
    assert_eq!(resp["ok"], json!(true), "{}", resp);
    let feedbacks = resp["result"]["feedbacks"].as_array().expect("feedbacks");
    assert_eq!(feedbacks.len(), 1);
    assert_eq!(feedbacks[0]["subject_code"], json!("CS201"));
    assert_eq!(feedbacks[0]["teacher_name"], json!("John Smith"));
    assert_eq!(feedbacks[0]["ratings"]["q1"], json!(5));
    assert_eq!(feedbacks[0]["comments"], json!("clear explanations"));

    let _ = child.kill();
}
