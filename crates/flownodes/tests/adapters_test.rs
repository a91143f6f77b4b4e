// crates/flownodes/tests/adapters_test.rs

use flowcore::{flow, input, ExecutionEvent, NodeEvent, Schema, Spec, Value};
use flownodes::{reach, transform, validate, wreck, Template, WreckDefaults};
use flowruntime::{execute, FlowRuntime};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// Serve exactly one request and hand back its raw text
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];

        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nX-Served-By: test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        String::from_utf8_lossy(&raw).to_string()
    });

    (format!("http://{}", addr), handle)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn request(uri: &str, payload: Option<Value>) -> Value {
    let mut options = HashMap::new();
    if let Some(payload) = payload {
        options.insert("payload".to_string(), payload);
    }
    let mut map = HashMap::new();
    map.insert("uri".to_string(), Value::from(uri));
    map.insert("options".to_string(), Value::Object(options));
    Value::Object(map)
}

#[tokio::test]
async fn test_reach_extracts_from_input() {
    let value: Value = serde_json::json!({ "a": { "b": ["x", "y"] } }).into();

    let result = execute(vec![value], reach("a.b.1")).await.unwrap();

    assert_eq!(result.result, Ok(Value::from("y")));
    assert_eq!(result.get("reach"), Some(Value::from("y")));
}

#[tokio::test]
async fn test_transform_in_a_series() {
    let value: Value = serde_json::json!({ "name": "ada", "meta": { "id": 3 } }).into();
    let template = Template::new().map("user.name", "name").map("user.id", "meta.id");

    let result = execute(vec![value], flow(vec![Spec::from(transform(template)), Spec::from(reach("user"))]).unwrap())
        .await
        .unwrap();

    let user = result.result.unwrap();
    assert_eq!(user.get("name"), Some(Value::from("ada")));
    assert_eq!(user.get("id"), Some(Value::Number(3.0)));
}

#[tokio::test]
async fn test_validate_rejects_bad_input() {
    let schema = Schema::object().field("count", Schema::Number);

    let bad: Value = serde_json::json!({ "count": "three" }).into();
    let result = execute(vec![bad], validate(schema.clone())).await.unwrap();
    assert!(matches!(
        result.error(),
        Some(flowcore::NodeError::InvalidInputType { field, .. }) if field == "value.count"
    ));

    let good: Value = serde_json::json!({ "count": 3 }).into();
    let result = execute(vec![good.clone()], validate(schema)).await.unwrap();
    assert_eq!(result.result, Ok(good));
}

#[tokio::test]
async fn test_wreck_get_parses_json_payload() {
    let (base, server) = serve_once("200 OK", r#"{"hello":"world"}"#).await;

    let flow = wreck().get(format!("{}/api/", base)).with_client(client());
    let result = execute(vec![request("greeting", None)], flow).await.unwrap();

    let output = result.result.unwrap();
    assert_eq!(output.get("status"), Some(Value::Number(200.0)));
    assert_eq!(
        output.get("payload").and_then(|p| p.get("hello")),
        Some(Value::from("world"))
    );
    assert_eq!(
        output.get("headers").and_then(|h| h.get("x-served-by")),
        Some(Value::from("test"))
    );

    let raw = server.await.unwrap();
    assert!(raw.starts_with("GET /api/greeting HTTP/1.1"), "unexpected request: {}", raw);
}

#[tokio::test]
async fn test_wreck_post_sends_json_and_headers() {
    let (base, server) = serve_once("201 Created", r#"{"id":1}"#).await;

    let payload: Value = serde_json::json!({ "name": "widget" }).into();
    let flow = wreck()
        .post(base)
        .header("x-api-key", "secret")
        .with_client(client());

    // The request comes from an upstream input node
    let spec = Spec::keyed()
        .entry("body", input())
        .entry_after("send", ["body"], flow);
    let composed = flowcore::flow(spec)
        .unwrap()
        .finalize(flowcore::task_fn(|args: Vec<Value>| async move {
            Ok(args[0].get("send").unwrap_or_default())
        }));

    let result = execute(vec![request("/widgets", Some(payload))], composed).await.unwrap();

    let output = result.result.unwrap();
    assert_eq!(output.get("status"), Some(Value::Number(201.0)));
    assert_eq!(output.get("payload").and_then(|p| p.get("id")), Some(Value::Number(1.0)));

    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /widgets HTTP/1.1"), "unexpected request: {}", raw);
    assert!(raw.to_lowercase().contains("x-api-key: secret"));
    assert!(raw.ends_with(r#"{"name":"widget"}"#));
}

#[tokio::test]
async fn test_wreck_reports_progress_and_status() {
    let (base, server) = serve_once("404 Not Found", r#"{"error":"missing"}"#).await;
    let runtime = FlowRuntime::new();
    let mut events = runtime.subscribe_events();

    let flow = wreck().get(base).with_client(client());
    let result = runtime.execute(vec![request("/missing", None)], flow).await.unwrap();

    // A non-2xx status is still a value
    let output = result.result.unwrap();
    assert_eq!(output.get("status"), Some(Value::Number(404.0)));
    server.await.unwrap();

    let mut node_events = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeEvent { event, .. } = event {
            node_events.push(event);
        }
    }

    let percents: Vec<f64> = node_events
        .iter()
        .filter_map(|e| match e {
            NodeEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![0.0, 50.0, 100.0]);
    assert!(node_events
        .iter()
        .any(|e| matches!(e, NodeEvent::Warning { message } if message.contains("404"))));
    assert!(node_events.iter().any(|e| matches!(
        e,
        NodeEvent::Data { key, value } if key == "status" && *value == Value::Number(404.0)
    )));
}

#[tokio::test]
async fn test_wreck_transport_failure_is_execution_failed() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let flow = wreck()
        .get(format!("http://{}", addr))
        .defaults(WreckDefaults {
            timeout_ms: Some(2000),
            ..Default::default()
        })
        .with_client(client());
    let result = execute(vec![request("/", None)], flow).await.unwrap();

    assert!(matches!(result.error(), Some(flowcore::NodeError::ExecutionFailed(_))));
}
