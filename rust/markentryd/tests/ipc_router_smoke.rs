use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_markentryd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn markentryd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_raw(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_raw(stdin, reader, id, method, params);
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("markentry-router-smoke");
    let csv_out = workspace.join("smoke-export.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "3", "setup.get", json!({}));
    let opened = request(
        &mut stdin,
        &mut reader,
        "4",
        "session.open",
        json!({
            "roster": [
                { "id": "st-1", "name": "Ada Obi", "admissionNumber": "A001", "gender": "F" },
                { "id": "st-2", "name": "Bola Ade", "phone": "0800" }
            ],
            "meta": { "examName": "Smoke", "className": "JSS1", "subject": "Maths" }
        }),
    );
    let session_id = opened
        .get("result")
        .and_then(|v| v.get("sessionId"))
        .and_then(|v| v.as_str())
        .expect("sessionId")
        .to_string();

    let methods: Vec<(&str, serde_json::Value)> = vec![
        ("schema.get", json!({ "sessionId": session_id })),
        ("schema.setCaEnabled", json!({ "sessionId": session_id, "enabled": true })),
        ("schema.addComponent", json!({ "sessionId": session_id, "label": "Quiz" })),
        ("schema.setCutoff", json!({ "sessionId": session_id, "key": "exam", "value": 60 })),
        ("schema.setNormalize", json!({ "sessionId": session_id, "enabled": true })),
        (
            "schema.setVisibleColumns",
            json!({ "sessionId": session_id, "visibleColumns": "all" }),
        ),
        (
            "entries.set",
            json!({ "sessionId": session_id, "studentId": "st-1", "key": "exam", "raw": "50" }),
        ),
        ("entries.get", json!({ "sessionId": session_id, "studentId": "st-1" })),
        (
            "entries.clear",
            json!({ "sessionId": session_id, "studentId": "st-1", "key": "exam" }),
        ),
        ("roster.view", json!({ "sessionId": session_id })),
        ("roster.search", json!({ "sessionId": session_id, "term": "ada" })),
        ("roster.showMore", json!({ "sessionId": session_id })),
        ("roster.stats", json!({ "sessionId": session_id })),
        (
            "export.csv",
            json!({ "sessionId": session_id, "outPath": csv_out.to_string_lossy() }),
        ),
        ("export.print", json!({ "sessionId": session_id, "format": "text" })),
        ("session.status", json!({ "sessionId": session_id })),
        ("session.save", json!({ "sessionId": session_id })),
        ("session.snapshot", json!({ "sessionId": session_id })),
        ("sessions.list", json!({})),
    ];
    for (i, (method, params)) in methods.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("m{}", i), method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
    }

    let unknown = request_raw(&mut stdin, &mut reader, "90", "grades.letter", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    let closed = request(
        &mut stdin,
        &mut reader,
        "91",
        "session.close",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(closed.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
