//! End-to-end engine scenarios over stubbed collaborators

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use flowhub_engine::{
    Checkpoint, CheckpointStore, EngineConfig, EventSubscription, ExecutionEngine,
    ExecutionStatus, InMemoryCheckpointStore, NodeEvaluator, RunParams, StepEvent, StepEventKind,
};
use flowhub_graph::{
    Edge, EdgeKind, Graph, InputType, Node, NodeKind, OutputFormat, TransformKind,
};
use flowhub_llm::{ChatModel, ChatRequest, ChatResponse, MockChatModel, TokenStream};
use flowhub_skills::{
    AuthKind, HttpMethod, InMemorySkillRegistry, Skill, SkillInvoker, StaticSecretStore,
};

fn engine_with(
    model: Arc<dyn ChatModel>,
    registry: Arc<InMemorySkillRegistry>,
    checkpoints: Arc<InMemoryCheckpointStore>,
    config: EngineConfig,
) -> ExecutionEngine {
    let secrets = Arc::new(StaticSecretStore::new());
    secrets.insert("test", "secret");
    let evaluator = Arc::new(NodeEvaluator::new(
        model,
        registry,
        Arc::new(SkillInvoker::new(secrets)),
    ));
    ExecutionEngine::new(evaluator, checkpoints, config)
}

fn default_engine(model: Arc<dyn ChatModel>) -> ExecutionEngine {
    engine_with(
        model,
        Arc::new(InMemorySkillRegistry::new()),
        Arc::new(InMemoryCheckpointStore::new()),
        EngineConfig::default(),
    )
}

fn params(graph: Graph, envelope: Value) -> RunParams {
    RunParams {
        execution_id: None,
        workflow_id: Uuid::new_v4(),
        workflow_version: 1,
        user_id: "tester".to_string(),
        graph,
        input_envelope: envelope,
    }
}

fn input(id: &str, default: Value) -> Node {
    Node::new(
        id,
        NodeKind::Input {
            input_type: InputType::Text,
            default: Some(default),
        },
    )
}

fn output(id: &str, format: OutputFormat) -> Node {
    Node::new(id, NodeKind::Output { format })
}

async fn drain(mut sub: EventSubscription) -> Vec<StepEvent> {
    let mut events = Vec::new();
    while let Some(event) = sub.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn scenario_a_simple_passthrough() {
    // Input(default "hello") -> Output(text), empty envelope
    let mut graph = Graph::new();
    graph.add_node(input("in", json!("hello")));
    graph.add_node(output("out", OutputFormat::Text));
    graph.add_edge(Edge::new("e1", "in", "out"));

    let engine = default_engine(Arc::new(MockChatModel::new()));
    let handle = engine.start(params(graph, json!({}))).unwrap();
    let sub = handle.subscribe(0);
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.final_output, Some(json!({"out": "hello"})));

    let events = drain(sub).await;
    let tokens = events.iter().filter(|e| e.kind == StepEventKind::Token).count();
    assert_eq!(tokens, 0);
    let starts = events.iter().filter(|e| e.kind == StepEventKind::Started).count();
    assert!(starts <= 2);

    // seq strictly increasing
    for pair in events.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
    }
}

#[tokio::test]
async fn scenario_b_llm_and_transform() {
    // Input(q) -> LLM(m) -> Transform(t, template) -> Output(o)
    let mut graph = Graph::new();
    graph.add_node(input("q", json!("")));
    graph.add_node(Node::new(
        "m",
        NodeKind::Llm {
            model: "stub".to_string(),
            system_prompt: None,
            prompt: "Echo: {{q}}".to_string(),
            temperature: 0.0,
            json_output: false,
        },
    ));
    graph.add_node(Node::new(
        "t",
        NodeKind::Transform {
            kind: TransformKind::Template,
            field: None,
            template: Some("A: {{m}}".to_string()),
            separator: None,
        },
    ));
    graph.add_node(output("o", OutputFormat::Auto));
    graph.add_edge(Edge::new("e1", "q", "m"));
    graph.add_edge(Edge::new("e2", "m", "t"));
    graph.add_edge(Edge::new("e3", "t", "o"));

    let model = Arc::new(MockChatModel::with_responses(["42"]));
    let engine = default_engine(model);
    let handle = engine
        .start(params(graph, json!({"q": "42"})))
        .unwrap();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.final_output, Some(json!({"o": "A: 42"})));
    assert!(record.token_usage.is_some());
}

/// Minimal HTTP responder that always answers 500
async fn spawn_failing_endpoint() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 5\r\nconnection: close\r\n\r\nerror",
                    )
                    .await;
            });
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn scenario_c_skill_error_path() {
    let endpoint = spawn_failing_endpoint().await;

    let registry = Arc::new(InMemorySkillRegistry::new());
    registry.insert(Skill {
        id: "broken".to_string(),
        tool_id: Uuid::new_v4(),
        name: "Broken".to_string(),
        endpoint_url: endpoint,
        http_method: HttpMethod::Get,
        auth_kind: AuthKind::None,
        credential_ref: String::new(),
        input_schema: json!({}),
        output_schema: json!({}),
        timeout_ms: 2_000,
        rate_limit: None,
    });

    // Input -> Skill -[error]-> Transform(template) -> Output
    let mut graph = Graph::new();
    graph.add_node(input("in", json!("x")));
    graph.add_node(Node::new("s", NodeKind::Skill { skill_id: "broken".to_string() }));
    graph.add_node(Node::new(
        "t",
        NodeKind::Transform {
            kind: TransformKind::Template,
            field: None,
            template: Some("fallback: {{s.error.kind}}".to_string()),
            separator: None,
        },
    ));
    graph.add_node(output("out", OutputFormat::Auto));
    graph.add_edge(Edge::new("e1", "in", "s"));
    graph.add_edge(Edge::new("e2", "s", "t").with_kind(EdgeKind::Error));
    graph.add_edge(Edge::new("e3", "t", "out"));

    let engine = engine_with(
        Arc::new(MockChatModel::new()),
        registry,
        Arc::new(InMemoryCheckpointStore::new()),
        EngineConfig::default(),
    );
    let handle = engine.start(params(graph, json!({}))).unwrap();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(
        record.final_output,
        Some(json!({"out": "fallback: SkillHttpError"}))
    );
}

#[tokio::test]
async fn unconditional_control_loop_hits_budget() {
    // in -> a -> b, b -(control)-> a; a -> out
    let mut graph = Graph::new();
    graph.add_node(input("in", json!("seed")));
    graph.add_node(Node::new(
        "a",
        NodeKind::Transform {
            kind: TransformKind::Passthrough,
            field: None,
            template: None,
            separator: None,
        },
    ));
    graph.add_node(Node::new(
        "b",
        NodeKind::Transform {
            kind: TransformKind::Passthrough,
            field: None,
            template: None,
            separator: None,
        },
    ));
    graph.add_node(output("out", OutputFormat::Auto));
    graph.add_edge(Edge::new("e1", "in", "a"));
    graph.add_edge(Edge::new("e2", "a", "b"));
    graph.add_edge(Edge::new("e3", "b", "a").with_kind(EdgeKind::Control));
    graph.add_edge(Edge::new("e4", "a", "out"));

    let config = EngineConfig {
        reentry_cap: 5,
        ..EngineConfig::default()
    };
    let engine = engine_with(
        Arc::new(MockChatModel::new()),
        Arc::new(InMemorySkillRegistry::new()),
        Arc::new(InMemoryCheckpointStore::new()),
        config,
    );
    let handle = engine.start(params(graph, json!({}))).unwrap();
    let sub = handle.subscribe(0);
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error.as_ref().unwrap().kind, "LoopBudgetExceeded");

    // The looping node never started more than the cap allows
    let events = drain(sub).await;
    let a_starts = events
        .iter()
        .filter(|e| e.node_id == "a" && e.kind == StepEventKind::Started)
        .count();
    assert!(a_starts <= 5, "a started {} times", a_starts);
}

#[tokio::test]
async fn conditional_control_edge_does_not_fire_on_falsy_handle() {
    // in (json object with continue=false) -> t -> out, t -(control:continue)-> in
    let mut graph = Graph::new();
    graph.add_node(Node::new(
        "in",
        NodeKind::Input {
            input_type: InputType::Json,
            default: Some(json!({"continue": false, "text": "done"})),
        },
    ));
    graph.add_node(Node::new(
        "t",
        NodeKind::Transform {
            kind: TransformKind::Passthrough,
            field: None,
            template: None,
            separator: None,
        },
    ));
    graph.add_node(output("out", OutputFormat::Auto));
    graph.add_edge(Edge::new("e1", "in", "t"));
    graph.add_edge(Edge::new("e2", "t", "out"));
    graph.add_edge(
        Edge::new("e3", "t", "in")
            .with_kind(EdgeKind::Control)
            .with_handles(Some("continue".to_string()), None),
    );

    let engine = default_engine(Arc::new(MockChatModel::new()));
    let handle = engine.start(params(graph, json!({}))).unwrap();
    let sub = handle.subscribe(0);
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    let events = drain(sub).await;
    let in_starts = events
        .iter()
        .filter(|e| e.node_id == "in" && e.kind == StepEventKind::Started)
        .count();
    assert_eq!(in_starts, 1);
}

/// Chat model that streams slowly, for cancellation tests
struct SlowModel;

#[async_trait::async_trait]
impl ChatModel for SlowModel {
    async fn chat(&self, _request: ChatRequest) -> flowhub_llm::Result<ChatResponse> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(ChatResponse { content: "late".to_string(), usage: None })
    }

    async fn stream(&self, _request: ChatRequest) -> flowhub_llm::Result<TokenStream> {
        let stream = async_stream_chunks();
        Ok(stream)
    }
}

fn async_stream_chunks() -> TokenStream {
    use flowhub_llm::MessageChunk;
    Box::pin(async_stream::stream! {
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            yield Ok(MessageChunk::delta("tick "));
        }
        yield Ok(MessageChunk::done(None));
    })
}

#[tokio::test]
async fn cancellation_during_streaming_yields_terminal_cancelled() {
    let mut graph = Graph::new();
    graph.add_node(input("q", json!("x")));
    graph.add_node(Node::new(
        "m",
        NodeKind::Llm {
            model: "slow".to_string(),
            system_prompt: None,
            prompt: "{{q}}".to_string(),
            temperature: 0.0,
            json_output: false,
        },
    ));
    graph.add_node(output("o", OutputFormat::Auto));
    graph.add_edge(Edge::new("e1", "q", "m"));
    graph.add_edge(Edge::new("e2", "m", "o"));

    let engine = default_engine(Arc::new(SlowModel));
    let handle = engine.start(params(graph, json!({}))).unwrap();
    let sub = handle.subscribe(0);

    // Let some tokens flow, then cancel
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.cancel();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Cancelled);
    assert!(record.error.is_none());

    let events = drain(sub).await;
    let max_token_seq = events
        .iter()
        .filter(|e| e.kind == StepEventKind::Token)
        .map(|e| e.seq)
        .max()
        .unwrap_or(0);
    let terminal = events.last().unwrap();
    assert_eq!(terminal.kind, StepEventKind::Cancelled);
    assert!(terminal.seq > max_token_seq);
}

#[tokio::test]
async fn resume_from_checkpoint_completes_remaining_frontier() {
    let mut graph = Graph::new();
    graph.add_node(input("in", json!("hello")));
    graph.add_node(output("out", OutputFormat::Text));
    graph.add_edge(Edge::new("e1", "in", "out"));

    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let execution_id = Uuid::new_v4();

    // Simulate an interrupted run: input completed, output still queued
    checkpoints
        .save(Checkpoint {
            execution_id,
            number: 1,
            after_node_id: "in".to_string(),
            node_outputs: HashMap::from([("in".to_string(), json!("hello"))]),
            frontier: ["out".to_string()].into_iter().collect(),
            last_seq: 4,
            at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let engine = engine_with(
        Arc::new(MockChatModel::new()),
        Arc::new(InMemorySkillRegistry::new()),
        checkpoints,
        EngineConfig::default(),
    );

    let mut run_params = params(graph, json!({}));
    run_params.execution_id = Some(execution_id);
    let handle = engine.resume(run_params).await.unwrap();
    let sub = handle.subscribe(0);
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.final_output, Some(json!({"out": "hello"})));

    // Sequence numbers continue after the checkpointed position
    let events = drain(sub).await;
    assert!(events.iter().all(|e| e.seq > 4));
}

#[tokio::test]
async fn failure_without_error_edge_fails_execution() {
    let mut graph = Graph::new();
    graph.add_node(input("in", json!("not json")));
    graph.add_node(Node::new(
        "p",
        NodeKind::Transform {
            kind: TransformKind::JsonParse,
            field: None,
            template: None,
            separator: None,
        },
    ));
    graph.add_node(output("o", OutputFormat::Auto));
    graph.add_edge(Edge::new("e1", "in", "p"));
    graph.add_edge(Edge::new("e2", "p", "o"));

    let engine = default_engine(Arc::new(MockChatModel::new()));
    let handle = engine.start(params(graph, json!({}))).unwrap();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error.as_ref().unwrap().kind, "TransformError");
}

#[tokio::test]
async fn parallel_branches_both_complete() {
    let mut graph = Graph::new();
    graph.add_node(input("in", json!("v")));
    graph.add_node(output("a", OutputFormat::Auto));
    graph.add_node(output("b", OutputFormat::Auto));
    graph.add_edge(Edge::new("e1", "in", "a"));
    graph.add_edge(Edge::new("e2", "in", "b"));

    let engine = default_engine(Arc::new(MockChatModel::new()));
    let handle = engine.start(params(graph, json!({}))).unwrap();
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.final_output, Some(json!({"a": "v", "b": "v"})));
}
