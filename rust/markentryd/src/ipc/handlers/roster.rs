use crate::ipc::error::ok;
use crate::ipc::params::{final_json, required_str, session_mut, session_ref};
use crate::ipc::types::{AppState, Request};
use crate::session::MarkSession;
use serde_json::{json, Value};

fn stats_json(session: &MarkSession) -> Value {
    let stats = session.visible_stats();
    json!({
        "enteredCount": stats.entered_count,
        "mean": stats.mean,
        "max": stats.max,
        "min": stats.min,
        "display": stats.display(),
    })
}

fn view_json(session: &MarkSession) -> Value {
    let visible = session.visible();
    let match_count = session.match_count();
    let rows: Vec<Value> = visible
        .iter()
        .map(|s| {
            json!({
                "student": s,
                "scores": session.record(&s.id).cloned().unwrap_or_default(),
                "final": final_json(session.final_for(&s.id)),
            })
        })
        .collect();
    let view = session.view_state();
    json!({
        "searchTerm": view.search_term,
        "pageWindow": view.page_window,
        "matchCount": match_count,
        "hasMore": match_count > visible.len(),
        "rows": rows,
        "stats": stats_json(session),
    })
}

fn handle_roster_view(state: &mut AppState, req: &Request) -> Value {
    match session_ref(state, req) {
        Ok(session) => ok(&req.id, view_json(session)),
        Err(resp) => resp,
    }
}

fn handle_roster_search(state: &mut AppState, req: &Request) -> Value {
    let term = match required_str(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let reset = session.search(&term);
    let mut result = view_json(session);
    result["windowReset"] = json!(reset);
    ok(&req.id, result)
}

fn handle_roster_show_more(state: &mut AppState, req: &Request) -> Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    session.show_more();
    ok(&req.id, view_json(session))
}

fn handle_roster_stats(state: &mut AppState, req: &Request) -> Value {
    match session_ref(state, req) {
        Ok(session) => ok(&req.id, stats_json(session)),
        Err(resp) => resp,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "roster.view" => Some(handle_roster_view(state, req)),
        "roster.search" => Some(handle_roster_search(state, req)),
        "roster.showMore" => Some(handle_roster_show_more(state, req)),
        "roster.stats" => Some(handle_roster_stats(state, req)),
        _ => None,
    }
}
