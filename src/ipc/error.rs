use std::collections::BTreeMap;

use serde_json::json;

/// Failure taxonomy shared by every operation. Each kind maps to a wire
/// code plus the HTTP-style status the boundary should relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Internal => "internal_error",
        }
    }

    pub fn status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthenticated => 401,
            Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, kind: ErrorKind, message: impl Into<String>) -> serde_json::Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": kind.code(),
            "status": kind.status(),
            "message": message.into(),
        }
    })
}

/// Unknown methods are a routing miss, not part of the operation
/// taxonomy; the boundary treats them as 404.
pub fn not_implemented(id: &str, method: &str) -> serde_json::Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": "not_implemented",
            "status": 404,
            "message": format!("unknown method: {}", method),
        }
    })
}

/// Validation failures report every bad field at once.
pub fn err_fields(id: &str, fields: &BTreeMap<String, String>) -> serde_json::Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": ErrorKind::Validation.code(),
            "status": ErrorKind::Validation.status(),
            "message": "validation failed",
            "fields": fields,
        }
    })
}
