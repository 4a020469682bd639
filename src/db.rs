use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the feedback store inside a workspace directory.
/// The schema is created idempotently; existing rows are never touched.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("feedback.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty_teacher(
            teacher_id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            designation TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_subject(
            subject_code TEXT PRIMARY KEY,
            subject_name TEXT NOT NULL,
            semester INTEGER NOT NULL,
            branch TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users_student(
            enrollment_no TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            gender TEXT NOT NULL,
            email TEXT NOT NULL,
            branch TEXT NOT NULL,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            section INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            date_of_birth TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_allocation(
            allocation_id INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_id TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            target_branch TEXT NOT NULL,
            target_year INTEGER NOT NULL,
            target_semester INTEGER NOT NULL,
            target_section INTEGER NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES faculty_teacher(teacher_id),
            FOREIGN KEY(subject_code) REFERENCES academic_subject(subject_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_allocation_class
         ON academic_allocation(target_branch, target_year, target_semester, target_section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback_response(
            response_id INTEGER PRIMARY KEY AUTOINCREMENT,
            allocation_id INTEGER NOT NULL,
            q1_rating INTEGER NOT NULL,
            q2_rating INTEGER NOT NULL,
            q3_rating INTEGER NOT NULL,
            q4_rating INTEGER NOT NULL,
            q5_rating INTEGER NOT NULL,
            q6_rating INTEGER NOT NULL,
            q7_rating INTEGER NOT NULL,
            q8_rating INTEGER NOT NULL,
            q9_rating INTEGER NOT NULL,
            q10_rating INTEGER NOT NULL,
            comments TEXT,
            FOREIGN KEY(allocation_id) REFERENCES academic_allocation(allocation_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_response_allocation
         ON feedback_response(allocation_id)",
        [],
    )?;

    // UNIQUE(enrollment_no, allocation_id) is the storage backstop for
    // the duplicate-submission check-then-act window: two concurrent
    // submissions can both pass the existence check, but only one log
    // row can land.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback_submissionlog(
            log_id INTEGER PRIMARY KEY AUTOINCREMENT,
            response_id INTEGER NOT NULL,
            enrollment_no TEXT NOT NULL,
            allocation_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            FOREIGN KEY(response_id) REFERENCES feedback_response(response_id),
            FOREIGN KEY(enrollment_no) REFERENCES users_student(enrollment_no),
            FOREIGN KEY(allocation_id) REFERENCES academic_allocation(allocation_id),
            UNIQUE(enrollment_no, allocation_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissionlog_student
         ON feedback_submissionlog(enrollment_no)",
        [],
    )?;

    Ok(conn)
}
