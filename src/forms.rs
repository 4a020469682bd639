//! Payload validation for the student feedback submission.
//!
//! The boundary may deliver integers as JSON numbers or as strings
//! (form encodings do the latter); both are accepted. Errors accumulate
//! into a field -> message map so the caller sees everything wrong with
//! the payload at once.

use serde_json::Value;
use std::collections::BTreeMap;

pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 5;

#[derive(Debug, Clone)]
pub struct FeedbackForm {
    pub subject_code: String,
    pub allocation_id: i64,
    pub ratings: [i64; 10],
    pub comments: Option<String>,
}

/// Read a value as an integer, tolerating numeric strings. A float with
/// a fractional part is not an integer.
pub fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl FeedbackForm {
    pub fn parse(params: &Value) -> Result<FeedbackForm, BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();

        let subject_code = match params.get("subject_code").and_then(as_text) {
            Some(raw) => {
                let normalized = raw.trim().to_uppercase();
                if normalized.is_empty() {
                    errors.insert("subject_code".into(), "subject_code is required".into());
                    String::new()
                } else if normalized.chars().count() > 50 {
                    errors.insert(
                        "subject_code".into(),
                        "subject_code must be at most 50 characters".into(),
                    );
                    String::new()
                } else {
                    normalized
                }
            }
            None => {
                errors.insert("subject_code".into(), "subject_code is required".into());
                String::new()
            }
        };

        let allocation_id = match params.get("allocation_id") {
            Some(v) => match as_integer(v) {
                Some(id) => id,
                None => {
                    errors.insert(
                        "allocation_id".into(),
                        "allocation_id must be an integer".into(),
                    );
                    0
                }
            },
            None => {
                errors.insert("allocation_id".into(), "allocation_id is required".into());
                0
            }
        };

        let mut ratings = [0i64; 10];
        for (i, slot) in ratings.iter_mut().enumerate() {
            let key = format!("q{}", i + 1);
            match params.get(&key) {
                Some(v) => match as_integer(v) {
                    Some(r) if (RATING_MIN..=RATING_MAX).contains(&r) => *slot = r,
                    Some(_) | None => {
                        errors.insert(key, "rating must be 1-5".into());
                    }
                },
                None => {
                    errors.insert(key.clone(), format!("{} is required", key));
                }
            }
        }

        let comments = match params.get("comments").and_then(Value::as_str) {
            Some(raw) => {
                let trimmed = raw.trim().to_string();
                if trimmed.chars().count() > 500 {
                    errors.insert(
                        "comments".into(),
                        "comments must be at most 500 characters".into(),
                    );
                    None
                } else if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed)
                }
            }
            None => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(FeedbackForm {
            subject_code,
            allocation_id,
            ratings,
            comments,
        })
    }
}
