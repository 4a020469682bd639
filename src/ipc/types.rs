use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// Identity context supplied by the boundary with each request. The
/// boundary owns authentication; this daemon only reads the result.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Session {
    #[serde(default)]
    pub enrollment: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub session: Session,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
