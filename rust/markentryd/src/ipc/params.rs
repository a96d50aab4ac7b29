use serde_json::{json, Value};

use crate::calc::FinalMark;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::schema::{AssessmentSchema, SchemaError};
use crate::session::{EntryError, MarkSession};
use crate::validate::ValidationError;

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_bool(req: &Request, key: &str) -> Result<bool, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be boolean", key), None))
}

pub fn session_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a MarkSession, Value> {
    let session_id = required_str(req, "sessionId")?;
    state.sessions.get(&session_id).ok_or_else(|| {
        err(
            &req.id,
            "not_found",
            "session not found",
            Some(json!({ "sessionId": session_id })),
        )
    })
}

pub fn session_mut<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut MarkSession, Value> {
    let session_id = required_str(req, "sessionId")?;
    state.sessions.get_mut(&session_id).ok_or_else(|| {
        err(
            &req.id,
            "not_found",
            "session not found",
            Some(json!({ "sessionId": session_id })),
        )
    })
}

pub fn schema_error(id: &str, e: &SchemaError) -> Value {
    err(
        id,
        "schema_error",
        e.to_string(),
        Some(json!({ "kind": e.kind() })),
    )
}

pub fn entry_error(id: &str, e: &EntryError) -> Value {
    match e {
        EntryError::UnknownStudent(student_id) => err(
            id,
            "not_found",
            e.to_string(),
            Some(json!({ "studentId": student_id })),
        ),
        EntryError::Invalid(v) => {
            let details = match v {
                ValidationError::OutOfRange { max, value } => json!({ "max": max, "value": value }),
                ValidationError::NotEditable { key } => json!({ "key": key }),
            };
            err(id, v.code(), v.to_string(), Some(details))
        }
    }
}

pub fn final_json(f: FinalMark) -> Value {
    match f.value() {
        Some(v) => json!(v),
        None => Value::Null,
    }
}

pub fn schema_json(schema: &AssessmentSchema) -> Value {
    json!({
        "components": schema.components,
        "examCutoff": schema.exam_cutoff,
        "normalizeToHundred": schema.normalize_to_hundred,
        "caEnabled": schema.ca_enabled,
        "visibleColumns": schema.visible_columns,
        "totalCutoff": schema.total_cutoff(),
    })
}
