use crate::ipc::error::{err, ok};
use crate::ipc::params::{required_bool, required_str, schema_error, schema_json, session_mut, session_ref};
use crate::ipc::types::{AppState, Request};
use crate::schema::{parse_cutoff, ScoreKey, VisibleColumns};
use serde_json::{json, Value};

fn handle_schema_get(state: &mut AppState, req: &Request) -> Value {
    match session_ref(state, req) {
        Ok(session) => ok(&req.id, json!({ "schema": schema_json(session.schema()) })),
        Err(resp) => resp,
    }
}

fn handle_add_component(state: &mut AppState, req: &Request) -> Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let label = req
        .params
        .get("label")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    match session.add_component(label) {
        Ok(component_id) => ok(
            &req.id,
            json!({
                "componentId": component_id,
                "schema": schema_json(session.schema())
            }),
        ),
        Err(e) => schema_error(&req.id, &e),
    }
}

fn handle_remove_component(state: &mut AppState, req: &Request) -> Value {
    let component_id = match required_str(req, "componentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match session.remove_component(&component_id) {
        Ok(removed) => ok(
            &req.id,
            json!({
                "removed": removed,
                "schema": schema_json(session.schema())
            }),
        ),
        Err(e) => schema_error(&req.id, &e),
    }
}

fn handle_rename_component(state: &mut AppState, req: &Request) -> Value {
    let component_id = match required_str(req, "componentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let label = match required_str(req, "label") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match session.rename_component(&component_id, &label) {
        Ok(()) => ok(&req.id, json!({ "schema": schema_json(session.schema()) })),
        Err(e) => schema_error(&req.id, &e),
    }
}

fn handle_set_cutoff(state: &mut AppState, req: &Request) -> Value {
    let key = match required_str(req, "key") {
        Ok(v) => ScoreKey::from(v.as_str()),
        Err(resp) => return resp,
    };
    let value = match parse_cutoff(req.params.get("value").unwrap_or(&Value::Null)) {
        Ok(v) => v,
        Err(e) => return schema_error(&req.id, &e),
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match session.set_cutoff(&key, value) {
        Ok(()) => ok(&req.id, json!({ "schema": schema_json(session.schema()) })),
        Err(e) => schema_error(&req.id, &e),
    }
}

fn handle_set_ca_enabled(state: &mut AppState, req: &Request) -> Value {
    let enabled = match required_bool(req, "enabled") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    session.set_ca_enabled(enabled);
    ok(&req.id, json!({ "schema": schema_json(session.schema()) }))
}

fn handle_set_normalize(state: &mut AppState, req: &Request) -> Value {
    let enabled = match required_bool(req, "enabled") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    session.set_normalize(enabled);
    ok(&req.id, json!({ "schema": schema_json(session.schema()) }))
}

fn handle_set_visible_columns(state: &mut AppState, req: &Request) -> Value {
    let raw = match required_str(req, "visibleColumns") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(columns) = VisibleColumns::parse(&raw) else {
        return err(
            &req.id,
            "bad_params",
            "visibleColumns must be one of: all, examOnly, caOnly",
            Some(json!({ "visibleColumns": raw })),
        );
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    session.set_visible_columns(columns);
    ok(&req.id, json!({ "schema": schema_json(session.schema()) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "schema.get" => Some(handle_schema_get(state, req)),
        "schema.addComponent" => Some(handle_add_component(state, req)),
        "schema.removeComponent" => Some(handle_remove_component(state, req)),
        "schema.renameComponent" => Some(handle_rename_component(state, req)),
        "schema.setCutoff" => Some(handle_set_cutoff(state, req)),
        "schema.setCaEnabled" => Some(handle_set_ca_enabled(state, req)),
        "schema.setNormalize" => Some(handle_set_normalize(state, req)),
        "schema.setVisibleColumns" => Some(handle_set_visible_columns(state, req)),
        _ => None,
    }
}
