use rusqlite::Connection;
use serde_json::Value;

use crate::forms::as_integer;
use crate::ipc::error::{err, ErrorKind};
use crate::ipc::types::{AppState, Session};

/// Intermediate failure carried through handler helpers until the
/// request id is available to build the wire envelope.
pub struct HandlerErr {
    pub kind: ErrorKind,
    pub message: String,
}

impl HandlerErr {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        HandlerErr {
            kind,
            message: message.into(),
        }
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.kind, self.message)
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new(ErrorKind::Internal, "no workspace open"))
}

pub fn require_enrollment(session: &Session) -> Result<&str, HandlerErr> {
    session
        .enrollment
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            HandlerErr::new(ErrorKind::Unauthenticated, "not authenticated please login")
        })
}

pub fn require_admin(session: &Session) -> Result<(), HandlerErr> {
    if session.is_admin {
        Ok(())
    } else {
        Err(HandlerErr::new(ErrorKind::PermissionDenied, "admin required"))
    }
}

pub fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    opt_str(params, key)
        .ok_or_else(|| HandlerErr::new(ErrorKind::Validation, format!("missing {}", key)))
}

pub fn opt_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| as_integer(v))
}

/// Query-string style flags arrive as bools, numbers, or strings.
pub fn flag(params: &Value, key: &str) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|i| i != 0),
        Some(Value::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        }
        _ => false,
    }
}
