//! Generic query and mutation engines for the admin table console.
//!
//! Both engines are driven entirely by the static catalog: SQL
//! identifiers come from `TableDef`/`FieldDef` constants, never from
//! caller input, so the only dynamic pieces are bound parameters.

use crate::catalog::{self, FieldDef, FieldType, TableDef, TextFormat};
use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug)]
pub enum TableError {
    NotFound(String),
    ReadOnly,
    Validation(BTreeMap<String, String>),
    Db(rusqlite::Error),
}

impl From<rusqlite::Error> for TableError {
    fn from(e: rusqlite::Error) -> Self {
        TableError::Db(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> SortOrder {
        if s.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub order: SortOrder,
    pub page: i64,
    pub page_size: i64,
    pub no_paginate: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            search: None,
            sort_by: None,
            order: SortOrder::Asc,
            page: 1,
            page_size: 50,
            no_paginate: false,
        }
    }
}

#[derive(Debug)]
pub struct QueryPage {
    pub rows: Vec<Value>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Filtered, sorted, paginated projection of one table. `total` counts
/// rows after filtering, before pagination.
pub fn query_table(
    conn: &Connection,
    table: &TableDef,
    opts: &QueryOptions,
) -> Result<QueryPage, TableError> {
    let mut where_sql = String::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(term) = opts.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let clauses: Vec<String> = table
            .fields
            .iter()
            .filter(|f| f.relation.is_none() && f.ftype.searchable())
            .map(|f| format!("LOWER(CAST({} AS TEXT)) LIKE ?1 ESCAPE '\\'", f.name))
            .collect();
        if !clauses.is_empty() {
            where_sql = format!(" WHERE ({})", clauses.join(" OR "));
            params.push(format!("%{}%", escape_like(&term.to_lowercase())));
        }
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}{}", table.table, where_sql),
        params_from_iter(params.iter()),
        |r| r.get(0),
    )?;

    // Sorting is accepted only for real catalog fields; anything else
    // leaves the implicit row order.
    let order_sql = match opts.sort_by.as_deref().and_then(|s| table.field(s)) {
        Some(f) => format!(" ORDER BY {} {}", f.name, opts.order.sql()),
        None => String::new(),
    };

    let (page, page_size, limit_sql) = if opts.no_paginate {
        (1, if total == 0 { 1 } else { total }, String::new())
    } else {
        let page = opts.page.max(1);
        let page_size = if opts.page_size < 1 { 10 } else { opts.page_size };
        // Both values are caller-controlled; saturate so an absurd page
        // yields an empty page rather than an overflow.
        let offset = (page - 1).saturating_mul(page_size);
        (page, page_size, format!(" LIMIT {} OFFSET {}", page_size, offset))
    };

    let select_list: Vec<&str> = table.fields.iter().map(|f| f.name).collect();
    let sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_list.join(", "),
        table.table,
        where_sql,
        order_sql,
        limit_sql
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            let mut obj = Map::new();
            for (idx, f) in table.fields.iter().enumerate() {
                obj.insert(f.name.to_string(), project_field(row, idx, f));
            }
            Ok(Value::Object(obj))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryPage {
        rows,
        total,
        page,
        page_size,
    })
}

/// One field of one row. A value that cannot be read as its declared
/// type degrades to null instead of failing the whole page.
fn project_field(row: &rusqlite::Row<'_>, idx: usize, f: &FieldDef) -> Value {
    use rusqlite::types::ValueRef;

    let Ok(cell) = row.get_ref(idx) else {
        return Value::Null;
    };
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match f.ftype {
            FieldType::Boolean => Value::Bool(i != 0),
            FieldType::Float => serde_json::json!(i as f64),
            _ => serde_json::json!(i),
        },
        ValueRef::Real(v) => serde_json::json!(v),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::Null,
        },
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Absent, null, and empty-string values are treated as "not supplied".
fn is_absent(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn value_for_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Type coercion only, no validation. Used for relation-pk probes and
/// for the permissive update path.
fn coerce(f: &FieldDef, v: &Value) -> Result<SqlValue, String> {
    match f.ftype {
        FieldType::Text | FieldType::Select | FieldType::Date => match v {
            Value::String(s) => Ok(SqlValue::Text(s.trim().to_string())),
            Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
            _ => Err("must be a string".into()),
        },
        FieldType::Number => crate::forms::as_integer(v)
            .map(SqlValue::Integer)
            .ok_or_else(|| "must be an integer".into()),
        FieldType::Float => match v {
            Value::Number(n) => n.as_f64().map(SqlValue::Real).ok_or_else(|| "must be a number".into()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(SqlValue::Real)
                .map_err(|_| "must be a number".into()),
            _ => Err("must be a number".into()),
        },
        FieldType::Boolean => match v {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(SqlValue::Integer(0)),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SqlValue::Integer(1)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(SqlValue::Integer(1)),
                "false" | "0" => Ok(SqlValue::Integer(0)),
                _ => Err("must be a boolean".into()),
            },
            _ => Err("must be a boolean".into()),
        },
    }
}

/// Coercion plus the full create-path checks: range, choice set,
/// max length, date format.
fn convert_strict(f: &FieldDef, v: &Value) -> Result<SqlValue, String> {
    let sql = coerce(f, v)?;
    match &sql {
        SqlValue::Integer(i) if f.ftype == FieldType::Number => {
            if let Some(min) = f.min {
                if *i < min {
                    return Err(match f.max {
                        Some(max) => format!("must be between {} and {}", min, max),
                        None => format!("must be at least {}", min),
                    });
                }
            }
            if let Some(max) = f.max {
                if *i > max {
                    return Err(format!("must be between {} and {}", f.min.unwrap_or(i64::MIN), max));
                }
            }
        }
        SqlValue::Text(s) => {
            if let Some(n) = f.max_len {
                if s.chars().count() > n {
                    return Err(format!("must be at most {} characters", n));
                }
            }
            if let Some(choices) = f.choices {
                if !choices.contains(&s.as_str()) {
                    return Err(format!("invalid choice: {}", s));
                }
            }
            if f.ftype == FieldType::Date && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() {
                return Err("must be a date (YYYY-MM-DD)".into());
            }
            if f.format == Some(TextFormat::Email) && !looks_like_email(s) {
                return Err("enter a valid email address".into());
            }
        }
        _ => {}
    }
    Ok(sql)
}

/// Minimal address shape check: one `@`, a non-empty local part, and a
/// dotted domain with non-empty labels. Not a deliverability check.
fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if s.chars().any(char::is_whitespace) || domain.contains('@') {
        return false;
    }
    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

fn relation_exists(
    conn: &Connection,
    target: &TableDef,
    value: &SqlValue,
) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT 1 FROM {} WHERE {} = ?1", target.table, target.pk),
        [value],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

fn pk_exists(conn: &Connection, table: &TableDef, pk: &SqlValue) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT 1 FROM {} WHERE {} = ?1", table.table, table.pk),
        [pk],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

fn coerce_pk(table: &TableDef, pk: &Value) -> Result<SqlValue, TableError> {
    // A pk that cannot even be coerced to the column type can match
    // nothing, which is the same outcome as a miss.
    coerce(table.pk_field(), pk)
        .map_err(|_| TableError::NotFound(format!("{} not found", table.kind)))
}

/// Insert one row. Relation values must resolve to an existing target
/// pk; full per-field validation runs before the insert. Returns the
/// new row's primary key.
pub fn create_row(
    conn: &Connection,
    table: &TableDef,
    fields: &Map<String, Value>,
) -> Result<Value, TableError> {
    if table.read_only {
        return Err(TableError::ReadOnly);
    }

    let mut errors: BTreeMap<String, String> = BTreeMap::new();
    let mut cols: Vec<&'static str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    for f in table.fields {
        if f.auto {
            continue;
        }
        let Some(raw) = fields.get(f.name) else {
            continue;
        };
        if is_absent(raw) {
            continue;
        }

        if let Some(target_name) = f.relation {
            let Some(target) = catalog::lookup(target_name) else {
                continue;
            };
            let sql = match coerce(f, raw) {
                Ok(v) => v,
                Err(_) => {
                    errors.insert(
                        f.name.to_string(),
                        format!("invalid {}: {}", f.name, value_for_display(raw)),
                    );
                    continue;
                }
            };
            match relation_exists(conn, target, &sql) {
                Ok(true) => {
                    cols.push(f.name);
                    values.push(sql);
                }
                Ok(false) => {
                    errors.insert(
                        f.name.to_string(),
                        format!("invalid {}: {}", f.name, value_for_display(raw)),
                    );
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            match convert_strict(f, raw) {
                Ok(sql) => {
                    cols.push(f.name);
                    values.push(sql);
                }
                Err(msg) => {
                    errors.insert(f.name.to_string(), msg);
                }
            }
        }
    }

    // Nullability runs after per-field checks so a bad value reports
    // its own message, not "required".
    for f in table.fields {
        if f.auto || f.nullable || f.has_default {
            continue;
        }
        if !cols.contains(&f.name) && !errors.contains_key(f.name) {
            errors.insert(f.name.to_string(), "this field is required".to_string());
        }
    }

    if !errors.is_empty() {
        return Err(TableError::Validation(errors));
    }

    if cols.is_empty() {
        conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", table.table), [])?;
    } else {
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{}", i)).collect();
        conn.execute(
            &format!(
                "INSERT INTO {}({}) VALUES({})",
                table.table,
                cols.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;
    }

    let pk = if table.pk_field().auto {
        serde_json::json!(conn.last_insert_rowid())
    } else {
        match cols.iter().position(|c| *c == table.pk) {
            Some(i) => match &values[i] {
                SqlValue::Text(s) => Value::String(s.clone()),
                SqlValue::Integer(n) => serde_json::json!(n),
                _ => Value::Null,
            },
            None => Value::Null,
        }
    };
    Ok(pk)
}

/// Update one row by primary key. Supplied fields that fail relation
/// resolution or type coercion are skipped, keeping the stored value;
/// updates do not re-run the create-path validation.
pub fn update_row(
    conn: &Connection,
    table: &TableDef,
    pk: &Value,
    fields: &Map<String, Value>,
) -> Result<(), TableError> {
    if table.read_only {
        return Err(TableError::ReadOnly);
    }

    let pk_sql = coerce_pk(table, pk)?;
    if !pk_exists(conn, table, &pk_sql)? {
        return Err(TableError::NotFound(format!("{} not found", table.kind)));
    }

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    for f in table.fields {
        if f.auto || f.name == table.pk {
            continue;
        }
        let Some(raw) = fields.get(f.name) else {
            continue;
        };
        if is_absent(raw) {
            continue;
        }
        let sql = match coerce(f, raw) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if let Some(target_name) = f.relation {
            let Some(target) = catalog::lookup(target_name) else {
                continue;
            };
            if !relation_exists(conn, target, &sql)? {
                continue;
            }
        }
        sets.push(format!("{} = ?{}", f.name, values.len() + 1));
        values.push(sql);
    }

    if sets.is_empty() {
        return Ok(());
    }

    values.push(pk_sql);
    conn.execute(
        &format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            table.table,
            sets.join(", "),
            table.pk,
            values.len()
        ),
        params_from_iter(values.iter()),
    )?;
    Ok(())
}

/// Delete one row by primary key. Dependent rows are the storage
/// layer's concern.
pub fn delete_row(conn: &Connection, table: &TableDef, pk: &Value) -> Result<(), TableError> {
    if table.read_only {
        return Err(TableError::ReadOnly);
    }

    let pk_sql = coerce_pk(table, pk)?;
    if !pk_exists(conn, table, &pk_sql)? {
        return Err(TableError::NotFound(format!("{} not found", table.kind)));
    }

    conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", table.table, table.pk),
        [&pk_sql],
    )?;
    Ok(())
}
