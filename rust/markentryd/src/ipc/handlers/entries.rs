use crate::ipc::error::{err, ok};
use crate::ipc::params::{entry_error, final_json, required_str, session_mut, session_ref};
use crate::ipc::types::{AppState, Request};
use crate::schema::ScoreKey;
use crate::validate::Validation;
use serde_json::{json, Value};

/// Raw cell text; numbers are accepted too since some hosts send them unquoted.
fn raw_input(req: &Request) -> Result<String, Value> {
    match req.params.get("raw") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            "raw must be a string",
            Some(json!({ "raw": other })),
        )),
    }
}

fn handle_entries_set(state: &mut AppState, req: &Request) -> Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let key = match required_str(req, "key") {
        Ok(v) => ScoreKey::from(v.as_str()),
        Err(resp) => return resp,
    };
    let raw = match raw_input(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match session.enter(&student_id, &key, &raw) {
        Ok(outcome) => {
            let committed = matches!(outcome.validation, Validation::Accepted(_));
            ok(
                &req.id,
                json!({
                    "status": outcome.validation.status(),
                    "committed": committed,
                    "studentId": student_id,
                    "key": key,
                    "value": outcome.value,
                    "final": final_json(outcome.final_mark),
                }),
            )
        }
        Err(e) => entry_error(&req.id, &e),
    }
}

fn handle_entries_clear(state: &mut AppState, req: &Request) -> Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let key = match required_str(req, "key") {
        Ok(v) => ScoreKey::from(v.as_str()),
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match session.clear_entry(&student_id, &key) {
        Ok(previous) => ok(
            &req.id,
            json!({
                "cleared": previous.is_some(),
                "previous": previous,
                "final": final_json(session.final_for(&student_id)),
            }),
        ),
        Err(e) => entry_error(&req.id, &e),
    }
}

fn handle_entries_get(state: &mut AppState, req: &Request) -> Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if !session.roster().iter().any(|s| s.id == student_id) {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    }
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "scores": session.record(&student_id).cloned().unwrap_or_default(),
            "final": final_json(session.final_for(&student_id)),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "entries.set" => Some(handle_entries_set(state, req)),
        "entries.clear" => Some(handle_entries_clear(state, req)),
        "entries.get" => Some(handle_entries_get(state, req)),
        _ => None,
    }
}
