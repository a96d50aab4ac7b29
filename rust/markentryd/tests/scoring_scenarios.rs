use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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

fn request(
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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

fn roster() -> serde_json::Value {
    json!([
        { "id": "s1", "name": "Adaeze Nwosu" },
        { "id": "s2", "name": "Tunde Bakare" },
        { "id": "s3", "name": "Ngozi Eze" }
    ])
}

fn component_id(schema: &serde_json::Value, idx: usize) -> String {
    schema["components"][idx]["id"]
        .as_str()
        .expect("component id")
        .to_string()
}

#[test]
fn exam_only_final_is_not_normalized() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "session.open",
        json!({ "roster": roster(), "schema": { "normalizeToHundred": true } }),
    );
    let sid = opened["sessionId"].as_str().expect("sessionId").to_string();
    assert_eq!(opened["schema"]["caEnabled"], json!(false));
    assert_eq!(opened["schema"]["totalCutoff"], json!(100));

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s1", "key": "exam", "raw": "85" }),
    );
    assert_eq!(set["status"], json!("accepted"));
    assert_eq!(set["final"], json!(85));

    // Exam-only scale is 100 regardless of the configured exam cutoff.
    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s2", "key": "exam", "raw": "101" }),
    );
    assert_eq!(e["message"], json!("Marks must be between 0 and 100"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn ca_raw_sum_and_normalized_totals() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "session.open",
        json!({
            "roster": roster(),
            "schema": {
                "caEnabled": true,
                "components": [{ "label": "CA1", "cutoff": 30 }],
                "examCutoff": 70
            }
        }),
    );
    let sid = opened["sessionId"].as_str().expect("sessionId").to_string();
    assert_eq!(opened["schema"]["totalCutoff"], json!(100));
    let ca1 = component_id(&opened["schema"], 0);

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s1", "key": ca1, "raw": "25" }),
    );
    let set = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s1", "key": "exam", "raw": "60" }),
    );
    assert_eq!(set["final"], json!(85));

    // Second CA component at 30 takes the total cutoff to 130.
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schema.addComponent",
        json!({ "sessionId": sid, "label": "CA2" }),
    );
    let ca2 = added["componentId"].as_str().expect("componentId").to_string();
    let sch = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schema.setCutoff",
        json!({ "sessionId": sid, "key": ca2, "value": 30 }),
    );
    assert_eq!(sch["schema"]["totalCutoff"], json!(130));
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schema.setNormalize",
        json!({ "sessionId": sid, "enabled": true }),
    );

    for (i, (key, raw)) in [(ca1.as_str(), "20"), (ca2.as_str(), "25"), ("exam", "50")]
        .into_iter()
        .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("7-{}", i),
            "entries.set",
            json!({ "sessionId": sid, "studentId": "s2", "key": key, "raw": raw }),
        );
    }
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "entries.get",
        json!({ "sessionId": sid, "studentId": "s2" }),
    );
    assert_eq!(got["final"], json!(73));

    // Schema edits apply retroactively: s1 is now 85/130.
    let s1 = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "entries.get",
        json!({ "sessionId": sid, "studentId": "s1" }),
    );
    assert_eq!(s1["final"], json!(65));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unentered_students_stay_out_of_aggregates() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "session.open",
        json!({ "roster": roster() }),
    );
    let sid = opened["sessionId"].as_str().expect("sessionId").to_string();

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.stats",
        json!({ "sessionId": sid }),
    );
    assert_eq!(stats["enteredCount"], json!(0));
    assert_eq!(stats["display"]["mean"], json!("-"));
    assert_eq!(stats["display"]["max"], json!("-"));
    assert_eq!(stats["display"]["min"], json!("-"));

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s1", "key": "exam", "raw": "0" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s2", "key": "exam", "raw": "75" }),
    );
    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "roster.stats",
        json!({ "sessionId": sid }),
    );
    assert_eq!(stats["enteredCount"], json!(2));
    assert_eq!(stats["display"]["mean"], json!("37.50"));
    assert_eq!(stats["max"], json!(75));
    assert_eq!(stats["min"], json!(0));

    let s3 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "entries.get",
        json!({ "sessionId": sid, "studentId": "s3" }),
    );
    assert_eq!(s3["final"], json!(null));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn rejected_entries_leave_previous_state() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "session.open",
        json!({
            "roster": roster(),
            "schema": { "caEnabled": true, "components": [{ "label": "CA1", "cutoff": 30 }] }
        }),
    );
    let sid = opened["sessionId"].as_str().expect("sessionId").to_string();
    let ca1 = component_id(&opened["schema"], 0);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s1", "key": ca1, "raw": "45" }),
    );
    assert_eq!(e["code"], json!("validation_failed"));
    assert_eq!(e["message"], json!("Marks must be between 0 and 30"));
    assert_eq!(e["details"]["max"], json!(30));
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "entries.get",
        json!({ "sessionId": sid, "studentId": "s1" }),
    );
    assert_eq!(got["scores"], json!({}));
    assert_eq!(got["final"], json!(null));

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s1", "key": ca1, "raw": "18" }),
    );
    request_err(
        &mut stdin,
        &mut reader,
        "5",
        "entries.set",
        json!({ "sessionId": sid, "studentId": "s1", "key": ca1, "raw": "45" }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "entries.get",
        json!({ "sessionId": sid, "studentId": "s1" }),
    );
    assert_eq!(got["scores"][&ca1], json!(18));

    // Partial typing and junk are dropped without an error.
    for (i, raw) in ["", "abc", "1234", "-3"].into_iter().enumerate() {
        let r = request_ok(
            &mut stdin,
            &mut reader,
            &format!("7-{}", i),
            "entries.set",
            json!({ "sessionId": sid, "studentId": "s1", "key": ca1, "raw": raw }),
        );
        assert_eq!(r["committed"], json!(false));
        assert_eq!(r["value"], json!(18));
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn schema_errors_keep_prior_schema() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "session.open",
        json!({ "roster": roster(), "schema": { "caEnabled": true } }),
    );
    let sid = opened["sessionId"].as_str().expect("sessionId").to_string();
    let only = component_id(&opened["schema"], 0);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "schema.setCutoff",
        json!({ "sessionId": sid, "key": "exam", "value": -5 }),
    );
    assert_eq!(e["code"], json!("schema_error"));
    assert_eq!(e["details"]["kind"], json!("invalid_cutoff"));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "schema.setCutoff",
        json!({ "sessionId": sid, "key": "exam", "value": "lots" }),
    );
    assert_eq!(e["details"]["kind"], json!("invalid_cutoff"));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "schema.removeComponent",
        json!({ "sessionId": sid, "componentId": only }),
    );
    assert_eq!(e["details"]["kind"], json!("last_component"));

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schema.get",
        json!({ "sessionId": sid }),
    );
    assert_eq!(after["schema"], opened["schema"]);

    drop(stdin);
    let _ = child.wait();
}
