//! Student feedback submission and submission history.
//!
//! The submit path validates the payload, cross-checks the allocation
//! against the caller's own class attributes, refuses duplicates, and
//! writes the response plus its submission log in one transaction.

use crate::forms::FeedbackForm;
use crate::ipc::error::{err, err_fields, ok, ErrorKind};
use crate::ipc::helpers::{require_db, require_enrollment};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct StudentRow {
    branch: String,
    year: i64,
    semester: i64,
    section: i64,
}

struct AllocationRow {
    allocation_id: i64,
    subject_code: String,
    target_branch: String,
    target_year: i64,
    target_semester: i64,
    target_section: i64,
}

fn load_student(conn: &Connection, enrollment: &str) -> rusqlite::Result<Option<StudentRow>> {
    conn.query_row(
        "SELECT branch, year, semester, section FROM users_student WHERE enrollment_no = ?1",
        [enrollment],
        |r| {
            Ok(StudentRow {
                branch: r.get(0)?,
                year: r.get(1)?,
                semester: r.get(2)?,
                section: r.get(3)?,
            })
        },
    )
    .optional()
}

fn load_allocation(conn: &Connection, id: i64) -> rusqlite::Result<Option<AllocationRow>> {
    conn.query_row(
        "SELECT allocation_id, subject_code, target_branch, target_year, target_semester, target_section
         FROM academic_allocation WHERE allocation_id = ?1",
        [id],
        |r| {
            Ok(AllocationRow {
                allocation_id: r.get(0)?,
                subject_code: r.get(1)?,
                target_branch: r.get(2)?,
                target_year: r.get(3)?,
                target_semester: r.get(4)?,
                target_section: r.get(5)?,
            })
        },
    )
    .optional()
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let enrollment = match require_enrollment(&req.session) {
        Ok(e) => e.to_string(),
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };

    let form = match FeedbackForm::parse(&req.params) {
        Ok(f) => f,
        Err(fields) => return err_fields(&req.id, &fields),
    };

    let student = match load_student(conn, &enrollment) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, ErrorKind::NotFound, "student not found"),
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    };

    let alloc = match load_allocation(conn, form.allocation_id) {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, ErrorKind::NotFound, "Invalid allocation_id"),
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    };

    if alloc.subject_code != form.subject_code {
        return err(
            &req.id,
            ErrorKind::PermissionDenied,
            "subject mismatch for allocation_id",
        );
    }

    // Branch comparison is case-insensitive; the numeric class
    // attributes must match exactly.
    if !alloc.target_branch.eq_ignore_ascii_case(&student.branch)
        || alloc.target_year != student.year
        || alloc.target_section != student.section
        || alloc.target_semester != student.semester
    {
        return err(
            &req.id,
            ErrorKind::PermissionDenied,
            "allocation_id does not belong to logged-in student",
        );
    }

    let already: Result<Option<i64>, _> = conn
        .query_row(
            "SELECT 1 FROM feedback_submissionlog WHERE enrollment_no = ?1 AND allocation_id = ?2",
            rusqlite::params![enrollment, alloc.allocation_id],
            |r| r.get(0),
        )
        .optional();
    match already {
        Ok(Some(_)) => return err(&req.id, ErrorKind::Conflict, "feedback already submitted"),
        Ok(None) => {}
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    }

    // Response and log land together or not at all. The duplicate check
    // above is not atomic with this insert; the UNIQUE constraint on
    // (enrollment_no, allocation_id) catches the race.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    };

    let inserted = tx.execute(
        "INSERT INTO feedback_response(
            allocation_id,
            q1_rating, q2_rating, q3_rating, q4_rating, q5_rating,
            q6_rating, q7_rating, q8_rating, q9_rating, q10_rating,
            comments
         ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            alloc.allocation_id,
            form.ratings[0],
            form.ratings[1],
            form.ratings[2],
            form.ratings[3],
            form.ratings[4],
            form.ratings[5],
            form.ratings[6],
            form.ratings[7],
            form.ratings[8],
            form.ratings[9],
            form.comments,
        ],
    );
    if let Err(e) = inserted {
        let _ = tx.rollback();
        return err(
            &req.id,
            ErrorKind::Internal,
            format!("failed to save feedback: {}", e),
        );
    }
    let response_id = tx.last_insert_rowid();

    let logged = tx.execute(
        "INSERT INTO feedback_submissionlog(response_id, enrollment_no, allocation_id, timestamp)
         VALUES(?1, ?2, ?3, ?4)",
        rusqlite::params![
            response_id,
            enrollment,
            alloc.allocation_id,
            Utc::now().to_rfc3339(),
        ],
    );
    if let Err(e) = logged {
        let _ = tx.rollback();
        return err(
            &req.id,
            ErrorKind::Internal,
            format!("failed to save feedback: {}", e),
        );
    }

    if let Err(e) = tx.commit() {
        return err(
            &req.id,
            ErrorKind::Internal,
            format!("failed to save feedback: {}", e),
        );
    }

    ok(
        &req.id,
        json!({
            "message": "feedback submitted",
            "allocation_id": alloc.allocation_id,
        }),
    )
}

fn handle_mine(state: &mut AppState, req: &Request) -> serde_json::Value {
    let enrollment = match require_enrollment(&req.session) {
        Ok(e) => e.to_string(),
        Err(e) => return e.response(&req.id),
    };
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT l.log_id, l.timestamp,
                t.full_name,
                s.subject_name, s.subject_code,
                r.q1_rating, r.q2_rating, r.q3_rating, r.q4_rating, r.q5_rating,
                r.q6_rating, r.q7_rating, r.q8_rating, r.q9_rating, r.q10_rating,
                r.comments
         FROM feedback_submissionlog l
         JOIN feedback_response r ON r.response_id = l.response_id
         JOIN academic_allocation a ON a.allocation_id = l.allocation_id
         JOIN faculty_teacher t ON t.teacher_id = a.teacher_id
         JOIN academic_subject s ON s.subject_code = a.subject_code
         WHERE l.enrollment_no = ?1
         ORDER BY l.timestamp DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    };

    let rows = stmt
        .query_map([&enrollment], |row| {
            let mut ratings = serde_json::Map::new();
            for i in 0..10 {
                let v: i64 = row.get(5 + i)?;
                ratings.insert(format!("q{}", i + 1), json!(v));
            }
            Ok(json!({
                "log_id": row.get::<_, i64>(0)?,
                "timestamp": row.get::<_, String>(1)?,
                "teacher_name": row.get::<_, String>(2)?,
                "subject_name": row.get::<_, String>(3)?,
                "subject_code": row.get::<_, String>(4)?,
                "ratings": ratings,
                "comments": row.get::<_, Option<String>>(15)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(feedbacks) => ok(&req.id, json!({ "feedbacks": feedbacks })),
        Err(e) => err(&req.id, ErrorKind::Internal, e.to_string()),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feedback.submit" => Some(handle_submit(state, req)),
        "feedback.mine" => Some(handle_mine(state, req)),
        _ => None,
    }
}
