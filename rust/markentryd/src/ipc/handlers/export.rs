use crate::ipc::error::{err, ok};
use crate::ipc::params::session_ref;
use crate::ipc::types::{AppState, Request};
use crate::settings;
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_export_csv(state: &mut AppState, req: &Request) -> Value {
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let csv = match session.csv() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };
    let file_name = session.csv_file_name();
    let rows_exported = session.roster().len();

    let out_path = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());
    if let Some(out_path) = out_path {
        let out = PathBuf::from(out_path);
        if let Some(parent) = out.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return err(
                    &req.id,
                    "io_failed",
                    e.to_string(),
                    Some(json!({ "path": out_path })),
                );
            }
        }
        if let Err(e) = std::fs::write(&out, &csv) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
        tracing::info!(session_id = session.id(), path = out_path, rows_exported, "marksheet csv written");
    }

    ok(
        &req.id,
        json!({
            "fileName": file_name,
            "rowsExported": rows_exported,
            "path": out_path,
            "csv": csv,
        }),
    )
}

fn handle_export_print(state: &mut AppState, req: &Request) -> Value {
    let printer = match settings::load_printer(state.db.as_ref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let format = req
        .params
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("model")
        .to_ascii_lowercase();
    if format != "model" && format != "text" {
        return err(
            &req.id,
            "bad_params",
            "format must be one of: model, text",
            Some(json!({ "format": format })),
        );
    }
    let session = match session_ref(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let layout = session.print_layout(&printer);
    if format == "text" {
        return ok(&req.id, json!({ "text": layout.render_text() }));
    }
    match serde_json::to_value(&layout) {
        Ok(v) => ok(&req.id, json!({ "layout": v })),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "export.csv" => Some(handle_export_csv(state, req)),
        "export.print" => Some(handle_export_print(state, req)),
        _ => None,
    }
}
