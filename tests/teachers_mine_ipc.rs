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

/// Two subjects for the CSE/2/3/1 class (one taught by two teachers),
/// plus decoys: an allocation aimed at another section, and one whose
/// subject belongs to a different branch despite the matching target.
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> (i64, i64, i64) {
    let workspace = temp_dir("feedbackd-teachers");
    let resp = request(
        stdin,
        reader,
        "open",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
        json!({}),
    );
    assert_eq!(resp["ok"], json!(true), "open failed: {}", resp);

    for (id, name, designation) in [
        ("T1", "John Smith", Some("Professor")),
        ("T2", "Jane Smithers", None),
        ("T3", "Alan Turing", Some("Reader")),
    ] {
        create(
            stdin,
            reader,
            &format!("t-{}", id),
            "Teacher",
            json!({ "teacher_id": id, "full_name": name, "designation": designation }),
        );
    }

    for (code, name, semester, branch) in [
        ("CS201", "Database Systems", 3, "CSE"),
        ("CS305", "Operating Systems", 3, "CSE"),
        ("ME210", "Thermodynamics", 3, "ME"),
    ] {
        create(
            stdin,
            reader,
            &format!("s-{}", code),
            "Subject",
            json!({
                "subject_code": code,
                "subject_name": name,
                "semester": semester,
                "branch": branch
            }),
        );
    }

    create(
        stdin,
        reader,
        "stu",
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

    let mut alloc = |id: &str, teacher: &str, subject: &str, branch: &str, section: i64| {
        create(
            stdin,
            reader,
            id,
            "Allocation",
            json!({
                "teacher_id": teacher,
                "subject_code": subject,
                "target_branch": branch,
                "target_year": 2,
                "target_semester": 3,
                "target_section": section
            }),
        )
        .as_i64()
        .expect("allocation id")
    };

    // target_branch stored lower-case on purpose: matching is
    // case-insensitive.
    let a_cs201_t1 = alloc("a1", "T1", "CS201", "cse", 1);
    let a_cs201_t2 = alloc("a2", "T2", "CS201", "CSE", 1);
    let a_cs305_t3 = alloc("a3", "T3", "CS305", "CSE", 1);
    // Decoy: right subject, wrong section.
    alloc("a4", "T3", "CS201", "CSE", 2);
    // Decoy: target matches the student but the subject is ME branch.
    alloc("a5", "T1", "ME210", "CSE", 1);

    (a_cs201_t1, a_cs201_t2, a_cs305_t3)
}

#[test]
fn lookup_filters_groups_and_orders() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (a1, a2, a3) = seed(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "teachers.mine",
        json!({}),
        json!({ "enrollment": "EN1" }),
    );
    assert_eq!(resp["ok"], json!(true), "{}", resp);
    let result = &resp["result"];
    assert_eq!(result["enrollment"], json!("EN1"));
    assert_eq!(result["branch"], json!("CSE"));

    let subjects = result["subjects"].as_array().expect("subjects");
    // The wrong-section and wrong-subject-branch allocations are gone.
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0]["subject_code"], json!("CS201"));
    assert_eq!(subjects[1]["subject_code"], json!("CS305"));

    let cs201_teachers = subjects[0]["teachers"].as_array().expect("teachers");
    assert_eq!(cs201_teachers.len(), 2);
    let ids: Vec<i64> = cs201_teachers
        .iter()
        .map(|t| t["allocation_id"].as_i64().expect("id"))
        .collect();
    assert!(ids.contains(&a1) && ids.contains(&a2));
    for t in cs201_teachers {
        assert_eq!(t["is_submitted"], json!(false));
    }

    let cs305_teachers = subjects[1]["teachers"].as_array().expect("teachers");
    assert_eq!(cs305_teachers.len(), 1);
    assert_eq!(cs305_teachers[0]["allocation_id"], json!(a3));
    assert_eq!(cs305_teachers[0]["teacher_name"], json!("Alan Turing"));
    assert_eq!(cs305_teachers[0]["designation"], json!("Reader"));

    let _ = child.kill();
}

#[test]
fn is_submitted_flips_per_allocation_after_submission() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (a1, a2, _a3) = seed(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "feedback.submit",
        json!({
            "subject_code": "CS201",
            "allocation_id": a1,
            "q1": 5, "q2": 4, "q3": 5, "q4": 3, "q5": 4,
            "q6": 5, "q7": 4, "q8": 3, "q9": 5, "q10": 4
        }),
        json!({ "enrollment": "EN1" }),
    );
    assert_eq!(resp["ok"], json!(true), "{}", resp);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.mine",
        json!({}),
        json!({ "enrollment": "EN1" }),
    );
    let subjects = resp["result"]["subjects"].as_array().expect("subjects");
    let cs201_teachers = subjects[0]["teachers"].as_array().expect("teachers");
    for t in cs201_teachers {
        let expected = t["allocation_id"].as_i64() == Some(a1);
        assert_eq!(t["is_submitted"], json!(expected), "{}", t);
    }
    // The other teacher for the same subject stays open.
    assert!(cs201_teachers
        .iter()
        .any(|t| t["allocation_id"].as_i64() == Some(a2) && t["is_submitted"] == json!(false)));

    let _ = child.kill();
}

#[test]
fn lookup_requires_a_known_student_session() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seed(&mut stdin, &mut reader);

    let resp = request(&mut stdin, &mut reader, "1", "teachers.mine", json!({}), json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["status"], json!(401));

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.mine",
        json!({}),
        json!({ "enrollment": "GHOST" }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["status"], json!(404));

    let _ = child.kill();
}
