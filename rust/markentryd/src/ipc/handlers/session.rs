use crate::autosave::{Autosave, SqliteSink};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::params::{schema_error, schema_json, session_ref};
use crate::ipc::types::{AppState, Request};
use crate::roster::Student;
use crate::schema::{AssessmentSchema, SchemaInit};
use crate::session::{MarkSession, OpenError, SessionMeta};
use crate::settings;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

fn parse_roster(req: &Request) -> Result<Vec<Student>, Value> {
    match req.params.get("roster") {
        // An absent roster is treated as an empty class.
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("roster must be a list of students: {e}"),
                None,
            )
        }),
    }
}

fn parse_meta(req: &Request) -> Result<SessionMeta, Value> {
    match req.params.get("meta") {
        None | Some(Value::Null) => Ok(SessionMeta::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| err(&req.id, "bad_params", format!("invalid meta: {e}"), None)),
    }
}

fn parse_schema_init(req: &Request) -> Result<Option<SchemaInit>, Value> {
    match req.params.get("schema") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| err(&req.id, "bad_params", format!("invalid schema: {e}"), None)),
    }
}

fn handle_session_open(state: &mut AppState, req: &Request) -> Value {
    let roster = match parse_roster(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let meta = match parse_meta(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let init = match parse_schema_init(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let restore = req
        .params
        .get("restore")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let entry = match settings::load_entry(state.db.as_ref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let schema = match init {
        Some(init) => match AssessmentSchema::from_init(
            init,
            entry.default_component_cutoff,
            entry.default_exam_cutoff,
        ) {
            Ok(s) => Some(s),
            Err(e) => return schema_error(&req.id, &e),
        },
        None => None,
    };

    let autosave = match state.workspace.as_ref() {
        Some(path) => match SqliteSink::open(path) {
            Ok(sink) => Some(Autosave::spawn(
                Duration::from_millis(entry.autosave_delay_ms),
                sink,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "autosave unavailable for session");
                None
            }
        },
        None => None,
    };
    let autosave_enabled = autosave.is_some();

    let session_id = Uuid::new_v4().to_string();
    let mut session = match MarkSession::open(
        session_id.clone(),
        roster,
        schema,
        meta,
        &entry,
        autosave,
    ) {
        Ok(s) => s,
        Err(OpenError::Schema(e)) => return schema_error(&req.id, &e),
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    let mut restored: Option<usize> = None;
    // Without an exam or class there is nothing to match a saved flow against.
    if restore && session.meta().names_flow() {
        if let Some(conn) = state.db.as_ref() {
            let meta = session.meta();
            match db::latest_snapshot_for(conn, meta.exam_name.as_deref(), meta.class_name.as_deref())
            {
                Ok(Some(snapshot)) => match session.restore(snapshot) {
                    Ok(n) => restored = Some(n),
                    Err(e) => tracing::warn!(error = %e, "saved schema rejected; starting fresh"),
                },
                Ok(None) => restored = Some(0),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
    }

    let result = json!({
        "sessionId": session_id,
        "studentCount": session.roster().len(),
        "schema": schema_json(session.schema()),
        "autosave": autosave_enabled,
        "restoredStudents": restored,
    });
    state.sessions.insert(session_id, session);
    ok(&req.id, result)
}

fn handle_session_close(state: &mut AppState, req: &Request) -> Value {
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    match state.sessions.remove(session_id) {
        Some(session) => {
            session.close();
            ok(&req.id, json!({ "closed": true }))
        }
        None => err(
            &req.id,
            "not_found",
            "session not found",
            Some(json!({ "sessionId": session_id })),
        ),
    }
}

fn handle_session_status(state: &mut AppState, req: &Request) -> Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let saved_snapshots = match state.db.as_ref() {
        Some(conn) => match db::snapshot_count(conn, session.id()) {
            Ok(n) => Some(n),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        None => None,
    };
    ok(
        &req.id,
        json!({
            "sessionId": session.id(),
            "meta": session.meta(),
            "studentCount": session.roster().len(),
            "autosave": session.autosave_status(),
            "savedSnapshots": saved_snapshots,
        }),
    )
}

fn handle_session_save(state: &mut AppState, req: &Request) -> Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match session.save_now() {
        Ok(saved) => ok(
            &req.id,
            json!({ "saved": saved, "autosave": session.autosave_status() }),
        ),
        Err(e) => err(&req.id, "save_failed", e, None),
    }
}

fn handle_session_snapshot(state: &mut AppState, req: &Request) -> Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match serde_json::to_value(session.snapshot()) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_sessions_list(state: &mut AppState, req: &Request) -> Value {
    let mut sessions: Vec<Value> = state
        .sessions
        .values()
        .map(|s| {
            json!({
                "sessionId": s.id(),
                "meta": s.meta(),
                "studentCount": s.roster().len(),
            })
        })
        .collect();
    sessions.sort_by(|a, b| {
        a["sessionId"]
            .as_str()
            .unwrap_or_default()
            .cmp(b["sessionId"].as_str().unwrap_or_default())
    });
    ok(&req.id, json!({ "sessions": sessions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "session.open" => Some(handle_session_open(state, req)),
        "session.close" => Some(handle_session_close(state, req)),
        "session.status" => Some(handle_session_status(state, req)),
        "session.save" => Some(handle_session_save(state, req)),
        "session.snapshot" => Some(handle_session_snapshot(state, req)),
        "sessions.list" => Some(handle_sessions_list(state, req)),
        _ => None,
    }
}
