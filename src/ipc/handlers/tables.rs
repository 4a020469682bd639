//! Admin table console: uniform list/query/create/update/delete over
//! the record catalog. Every method requires an admin session.

use crate::catalog::{self, TableDef};
use crate::ipc::error::{err, err_fields, ok, ErrorKind};
use crate::ipc::helpers::{flag, opt_i64, opt_str, require_admin, require_db, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::tables::{self, QueryOptions, SortOrder, TableError};
use serde_json::{json, Map, Value};

fn table_error(id: &str, e: TableError) -> Value {
    match e {
        TableError::NotFound(msg) => err(id, ErrorKind::NotFound, msg),
        TableError::ReadOnly => err(id, ErrorKind::PermissionDenied, "read-only"),
        TableError::Validation(fields) => err_fields(id, &fields),
        TableError::Db(e) => err(id, ErrorKind::Internal, e.to_string()),
    }
}

fn resolve_table(req: &Request) -> Result<&'static TableDef, HandlerErr> {
    let name = required_str(&req.params, "table")?;
    catalog::lookup(&name)
        .ok_or_else(|| HandlerErr::new(ErrorKind::NotFound, format!("unknown table: {}", name)))
}

fn fields_param(req: &Request) -> Result<Map<String, Value>, HandlerErr> {
    match req.params.get("fields") {
        Some(Value::Object(map)) => Ok(map.clone()),
        _ => Err(HandlerErr::new(ErrorKind::Validation, "missing fields")),
    }
}

fn pk_param(req: &Request) -> Result<Value, HandlerErr> {
    match req.params.get("pk") {
        Some(Value::Null) | None => Err(HandlerErr::new(ErrorKind::Validation, "missing pk")),
        Some(v) => Ok(v.clone()),
    }
}

fn handle_list(req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(&req.session) {
        return e.response(&req.id);
    }

    let tables: Vec<Value> = catalog::all()
        .iter()
        .map(|t| {
            let fields: Vec<Value> = t
                .fields
                .iter()
                .map(|f| {
                    let mut meta = json!({
                        "name": f.name,
                        "type": f.ftype.as_str(),
                        "nullable": f.nullable,
                        "auto": f.auto,
                    });
                    if let Some(rel) = f.relation {
                        meta["relation"] = json!(rel);
                    }
                    if let Some(choices) = f.choices {
                        meta["choices"] = json!(choices);
                    }
                    meta
                })
                .collect();
            json!({
                "kind": t.kind,
                "table": t.table,
                "pk": t.pk,
                "read_only": t.read_only,
                "fields": fields,
            })
        })
        .collect();

    ok(&req.id, json!({ "tables": tables }))
}

fn handle_query(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(&req.session) {
        return e.response(&req.id);
    }
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let table = match resolve_table(req) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };

    let opts = QueryOptions {
        search: opt_str(&req.params, "search"),
        sort_by: opt_str(&req.params, "sort_by"),
        order: opt_str(&req.params, "order")
            .map(|s| SortOrder::parse(&s))
            .unwrap_or(SortOrder::Asc),
        page: opt_i64(&req.params, "page").unwrap_or(1),
        page_size: opt_i64(&req.params, "page_size").unwrap_or(50),
        no_paginate: flag(&req.params, "nopaginate"),
    };

    match tables::query_table(conn, table, &opts) {
        Ok(page) => ok(
            &req.id,
            json!({
                "table": table.table,
                "rows": page.rows,
                "total": page.total,
                "page": page.page,
                "page_size": page.page_size,
            }),
        ),
        Err(e) => table_error(&req.id, e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(&req.session) {
        return e.response(&req.id);
    }
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let table = match resolve_table(req) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    // The read-only refusal must win over payload complaints.
    if table.read_only {
        return table_error(&req.id, TableError::ReadOnly);
    }
    let fields = match fields_param(req) {
        Ok(f) => f,
        Err(e) => return e.response(&req.id),
    };

    match tables::create_row(conn, table, &fields) {
        Ok(pk) => ok(&req.id, json!({ "table": table.table, "pk": pk })),
        Err(e) => table_error(&req.id, e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(&req.session) {
        return e.response(&req.id);
    }
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let table = match resolve_table(req) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    if table.read_only {
        return table_error(&req.id, TableError::ReadOnly);
    }
    let pk = match pk_param(req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let fields = match fields_param(req) {
        Ok(f) => f,
        Err(e) => return e.response(&req.id),
    };

    match tables::update_row(conn, table, &pk, &fields) {
        Ok(()) => ok(&req.id, json!({ "table": table.table, "updated": true })),
        Err(e) => table_error(&req.id, e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_admin(&req.session) {
        return e.response(&req.id);
    }
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let table = match resolve_table(req) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    if table.read_only {
        return table_error(&req.id, TableError::ReadOnly);
    }
    let pk = match pk_param(req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match tables::delete_row(conn, table, &pk) {
        Ok(()) => ok(&req.id, json!({ "table": table.table, "deleted": true })),
        Err(e) => table_error(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tables.list" => Some(handle_list(req)),
        "tables.query" => Some(handle_query(state, req)),
        "tables.create" => Some(handle_create(state, req)),
        "tables.update" => Some(handle_update(state, req)),
        "tables.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
