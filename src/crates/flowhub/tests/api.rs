//! HTTP API integration tests over an in-memory stack

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use flowhub::api::routes::{create_router, AppState};
use flowhub::auth::StaticTokenVerifier;
use flowhub::db::DatabaseConnection;
use flowhub::services::{ChatService, ExecutionService, WorkflowService};
use flowhub_engine::{EngineConfig, ExecutionEngine, InMemoryCheckpointStore, NodeEvaluator};
use flowhub_llm::MockChatModel;
use flowhub_skills::{InMemorySkillRegistry, SkillInvoker, StaticSecretStore};

async fn app(quota: i64) -> axum::Router {
    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    let evaluator = Arc::new(NodeEvaluator::new(
        Arc::new(MockChatModel::new()),
        Arc::new(InMemorySkillRegistry::new()),
        Arc::new(SkillInvoker::new(Arc::new(StaticSecretStore::new()))),
    ));
    let engine = Arc::new(ExecutionEngine::new(
        evaluator,
        Arc::new(InMemoryCheckpointStore::new()),
        EngineConfig::default(),
    ));

    let verifier = StaticTokenVerifier::new();
    verifier.insert("t-alice", "alice", false);
    verifier.insert("t-bob", "bob", false);

    let workflows = WorkflowService::new(db.clone());
    let executions = ExecutionService::new(db.clone(), engine, workflows.clone(), quota);
    let chat = ChatService::new(db.clone(), executions.clone());

    create_router(AppState {
        db,
        verifier: Arc::new(verifier),
        workflows,
        executions,
        chat,
    })
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn simple_workflow_body() -> Value {
    json!({
        "name": "Passthrough",
        "graph": {
            "nodes": [
                {"id": "in", "type": "input", "input_type": "text", "default": "hello"},
                {"id": "out", "type": "output", "format": "text"}
            ],
            "edges": [
                {"id": "e1", "source": "in", "target": "out"}
            ]
        }
    })
}

#[tokio::test]
async fn unauthenticated_request_is_401() {
    let app = app(10).await;
    let response = app
        .oneshot(request("GET", "/workflows?scope=mine", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn workflow_crud_and_versioning_flow() {
    let app = app(10).await;

    // Create
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/workflows",
            Some("t-alice"),
            Some(simple_workflow_body()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let workflow = json_body(response).await;
    let id = workflow["id"].as_str().unwrap().to_string();
    assert_eq!(workflow["version"], 1);

    // Private: bob cannot read
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/workflows/{}", id),
            Some("t-bob"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Update graph -> v2
    let mut body = simple_workflow_body();
    body["graph"]["nodes"]
        .as_array_mut()
        .unwrap()
        .push(json!({"id": "out2", "type": "output", "format": "auto"}));
    body["graph"]["edges"]
        .as_array_mut()
        .unwrap()
        .push(json!({"id": "e2", "source": "in", "target": "out2"}));
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/workflows/{}", id),
            Some("t-alice"),
            Some(json!({"graph": body["graph"], "version_notes": "add out2"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["version"], 2);

    // Versions listing
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/workflows/{}/versions", id),
            Some("t-alice"),
            None,
        ))
        .await
        .unwrap();
    let versions = json_body(response).await;
    assert_eq!(versions["current_version"], 2);
    assert_eq!(versions["history"].as_array().unwrap().len(), 1);

    // Compare v1..v2
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/workflows/{}/versions/compare?v1=1&v2=2", id),
            Some("t-alice"),
            None,
        ))
        .await
        .unwrap();
    let diff = json_body(response).await;
    assert_eq!(diff["nodes_added"].as_array().unwrap().len(), 1);

    // Revert to v1 -> v3
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/workflows/{}/revert", id),
            Some("t-alice"),
            Some(json!({"target_version": 1})),
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["version"], 3);

    // Unknown version -> 404
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/workflows/{}/revert", id),
            Some("t-alice"),
            Some(json!({"target_version": 42})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_graph_is_422() {
    let app = app(10).await;
    let mut body = simple_workflow_body();
    // Self-loop
    body["graph"]["edges"] = json!([{"id": "e1", "source": "in", "target": "in"}]);

    let response = app
        .oneshot(request("POST", "/workflows", Some("t-alice"), Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn scenario_e_quota_exhaustion_and_usage() {
    let app = app(2).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/workflows",
            Some("t-alice"),
            Some(simple_workflow_body()),
        ))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/executions/run",
                Some("t-alice"),
                Some(json!({"workflow_id": id, "input": {}})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // Third run refused with 429
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/executions/run",
            Some("t-alice"),
            Some(json!({"workflow_id": id, "input": {}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert_eq!(body["code"], "QUOTA_EXCEEDED");

    let response = app
        .oneshot(request("GET", "/users/me/usage", Some("t-alice"), None))
        .await
        .unwrap();
    let usage = json_body(response).await;
    assert_eq!(usage["limit"], 2);
    assert_eq!(usage["used"], 2);
}

#[tokio::test]
async fn run_then_fetch_record_and_cancel_is_202() {
    let app = app(10).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/workflows",
            Some("t-alice"),
            Some(simple_workflow_body()),
        ))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/executions/run",
            Some("t-alice"),
            Some(json!({"workflow_id": id, "input": {}})),
        ))
        .await
        .unwrap();
    let execution = json_body(response).await;
    let execution_id = execution["id"].as_str().unwrap().to_string();

    // Give the run time to finish
    tokio::time::sleep(Duration::from_millis(300)).await;

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/executions/{}", execution_id),
            Some("t-alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = json_body(response).await;
    assert_eq!(record["status"], "completed");
    assert_eq!(record["final_output"]["out"], "hello");

    // Cancel on a terminal run is an accepted no-op
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/executions/{}/cancel", execution_id),
            Some("t-alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Foreign access forbidden
    let response = app
        .oneshot(request(
            "GET",
            &format!("/executions/{}", execution_id),
            Some("t-bob"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn sse_stream_replays_terminal_execution() {
    let app = app(10).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/workflows",
            Some("t-alice"),
            Some(simple_workflow_body()),
        ))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/executions/run",
            Some("t-alice"),
            Some(json!({"workflow_id": id, "input": {}})),
        ))
        .await
        .unwrap();
    let execution_id = json_body(response).await["id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut req = request(
        "GET",
        &format!("/executions/{}", execution_id),
        Some("t-alice"),
        None,
    );
    req.headers_mut().insert(
        header::ACCEPT,
        "text/event-stream".parse().unwrap(),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("event: started"));
    assert!(text.contains("event: completed"));
    assert!(text.contains("id: "));
}

#[tokio::test]
async fn chat_turn_and_session_listing() {
    let app = app(10).await;

    let mut body = simple_workflow_body();
    body["name"] = json!("Chat Flow");
    body["graph"]["nodes"] = json!([
        {"id": "message", "type": "input", "input_type": "text"},
        {"id": "out", "type": "output", "format": "text"}
    ]);
    body["graph"]["edges"] = json!([
        {"id": "e1", "source": "message", "target": "out"}
    ]);

    let response = app
        .clone()
        .oneshot(request("POST", "/workflows", Some("t-alice"), Some(body)))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/agents/{}/chat", id),
            Some("t-alice"),
            Some(json!({"message": "ni hao"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let turn = json_body(response).await;
    let session_id = turn["session_id"].as_str().unwrap().to_string();
    assert!(turn["execution_id"].as_str().is_some());

    // Wait for the assistant append, then list and clear
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/sessions/{}/messages", session_id),
                Some("t-alice"),
                None,
            ))
            .await
            .unwrap();
        let messages = json_body(response).await;
        if messages["items"].as_array().unwrap().len() == 2 {
            assert_eq!(messages["items"][1]["role"], "assistant");
            assert_eq!(messages["items"][1]["content"], "ni hao");

            let response = app
                .oneshot(request(
                    "DELETE",
                    &format!("/sessions/{}/messages", session_id),
                    Some("t-alice"),
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("assistant message never appeared");
}
