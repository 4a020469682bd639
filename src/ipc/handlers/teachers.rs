//! "My teachers" view: the allocations offered to the caller's own
//! class, grouped by subject, each teacher annotated with whether the
//! caller has already submitted feedback for that allocation.

use crate::ipc::error::{err, ok, ErrorKind};
use crate::ipc::helpers::{require_db, require_enrollment};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::HashSet;

struct StudentRow {
    branch: String,
    year: i64,
    semester: i64,
    section: i64,
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

    let student = match conn
        .query_row(
            "SELECT branch, year, semester, section FROM users_student WHERE enrollment_no = ?1",
            [&enrollment],
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
    {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, ErrorKind::NotFound, "student not found"),
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    };

    if student.branch.trim().is_empty()
        || student.year < 1
        || student.semester < 1
        || student.section < 1
    {
        return err(&req.id, ErrorKind::Validation, "student data incomplete");
    }

    let submitted: HashSet<i64> = {
        let mut stmt = match conn
            .prepare("SELECT allocation_id FROM feedback_submissionlog WHERE enrollment_no = ?1")
        {
            Ok(s) => s,
            Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
        };
        let ids = stmt
            .query_map([&enrollment], |r| r.get::<_, i64>(0))
            .and_then(|it| it.collect::<Result<HashSet<_>, _>>());
        match ids {
            Ok(set) => set,
            Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
        }
    };

    // The subject's own branch/semester must also match the student,
    // guarding against allocations pointing at stale subject rows.
    let mut stmt = match conn.prepare(
        "SELECT a.allocation_id,
                s.subject_code, s.subject_name, s.semester, s.branch,
                t.teacher_id, t.full_name, t.designation
         FROM academic_allocation a
         JOIN academic_subject s ON s.subject_code = a.subject_code
         JOIN faculty_teacher t ON t.teacher_id = a.teacher_id
         WHERE LOWER(a.target_branch) = LOWER(?1)
           AND a.target_year = ?2
           AND a.target_section = ?3
           AND a.target_semester = ?4
           AND s.semester = ?4
           AND LOWER(s.branch) = LOWER(?1)
         ORDER BY s.subject_code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    };

    struct AllocRow {
        allocation_id: i64,
        subject_code: String,
        subject_name: String,
        semester: i64,
        branch: String,
        teacher_id: String,
        teacher_name: String,
        designation: Option<String>,
    }

    let rows = stmt
        .query_map(
            rusqlite::params![student.branch, student.year, student.section, student.semester],
            |r| {
                Ok(AllocRow {
                    allocation_id: r.get(0)?,
                    subject_code: r.get(1)?,
                    subject_name: r.get(2)?,
                    semester: r.get(3)?,
                    branch: r.get(4)?,
                    teacher_id: r.get(5)?,
                    teacher_name: r.get(6)?,
                    designation: r.get(7)?,
                })
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, ErrorKind::Internal, e.to_string()),
    };

    struct SubjectGroup {
        code: String,
        name: String,
        semester: i64,
        branch: String,
        teachers: Vec<serde_json::Value>,
    }

    // Rows arrive sorted by subject code, so grouping is a single pass;
    // teacher order within a subject follows retrieval order.
    let mut groups: Vec<SubjectGroup> = Vec::new();
    for row in rows {
        let teacher = json!({
            "allocation_id": row.allocation_id,
            "teacher_id": row.teacher_id,
            "teacher_name": row.teacher_name,
            "designation": row.designation,
            "is_submitted": submitted.contains(&row.allocation_id),
        });
        match groups.last_mut() {
            Some(g) if g.code == row.subject_code => g.teachers.push(teacher),
            _ => groups.push(SubjectGroup {
                code: row.subject_code,
                name: row.subject_name,
                semester: row.semester,
                branch: row.branch,
                teachers: vec![teacher],
            }),
        }
    }

    let subjects: Vec<serde_json::Value> = groups
        .into_iter()
        .map(|g| {
            json!({
                "subject_code": g.code,
                "subject_name": g.name,
                "semester": g.semester,
                "branch": g.branch,
                "teachers": g.teachers,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "enrollment": enrollment,
            "branch": student.branch,
            "year": student.year,
            "semester": student.semester,
            "section": student.section,
            "subjects": subjects,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.mine" => Some(handle_mine(state, req)),
        _ => None,
    }
}
