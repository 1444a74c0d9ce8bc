//! 多回合对话端到端测试：脚本模型 + 内存向量索引 / 文档库 + 检查点存储

use std::sync::Arc;
use std::time::Duration;

use hr_agent::agent::{assemble_runner, AgentServices};
use hr_agent::config::{AppConfig, PolicyOverrides};
use hr_agent::core::{AgentRunner, ErrorKind, EMPTY_ANSWER_FALLBACK};
use hr_agent::llm::{AssistantReply, LlmClient, MockEmbedder, MockLlmClient, ScriptStep, ScriptedLlmClient};
use hr_agent::memory::{
    CheckpointStore, ConversationState, FileCheckpointStore, MemoryCheckpointStore, Role,
};
use hr_agent::react::TurnEvent;
use hr_agent::store::{EmployeeRecord, InMemoryDocumentStore, InMemoryVectorIndex};
use serde_json::Value;
use tokio::sync::mpsc;

const TIMEOUT_MESSAGE: &str = "The request timed out. Please try again with a simpler query.";

fn fast(timeout_ms: u64, max_retries: u32) -> PolicyOverrides {
    PolicyOverrides {
        max_retries: Some(max_retries),
        timeout_ms: Some(timeout_ms),
        factor: Some(2.0),
        min_backoff_ms: Some(10),
        max_backoff_ms: Some(40),
    }
}

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.resilience.model = fast(200, 3);
    cfg.resilience.tool = fast(200, 2);
    cfg.resilience.turn = fast(30_000, 2);
    cfg
}

fn employee(id: &str, first: &str, last: &str, title: &str, skills: &[&str]) -> EmployeeRecord {
    let mut rec = EmployeeRecord {
        employee_id: id.into(),
        first_name: first.into(),
        last_name: last.into(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    rec.job_details.job_title = title.into();
    rec.job_details.department = "Engineering".into();
    rec
}

async fn services(llm: Arc<dyn LlmClient>, checkpoints: Arc<dyn CheckpointStore>) -> AgentServices {
    let embedder = MockEmbedder::default();
    let index = Arc::new(InMemoryVectorIndex::new());
    let documents = Arc::new(InMemoryDocumentStore::new());
    index.create_collection("employees").await;
    for rec in [
        employee("E1", "Ada", "Lovelace", "Data Engineer", &["Python", "SQL"]),
        employee("E2", "Grace", "Hopper", "Backend Engineer", &["Java", "COBOL"]),
        employee("E3", "Linus", "Torvalds", "Kernel Engineer", &["C", "Git"]),
    ] {
        let summary = rec.summary();
        index
            .upsert("employees", &rec.employee_id, &summary, embedder.embed_text(&summary))
            .await;
        documents.insert("employees", rec).await;
    }
    AgentServices {
        llm,
        embedder: Arc::new(embedder),
        index,
        documents,
        checkpoints,
    }
}

async fn runner_with(cfg: &AppConfig, llm: Arc<ScriptedLlmClient>) -> (AgentRunner, Arc<MemoryCheckpointStore>) {
    let store = Arc::new(MemoryCheckpointStore::default());
    let runner = assemble_runner(cfg, services(llm, store.clone()).await);
    (runner, store)
}

fn employee_ids(tool_content: &str) -> Vec<String> {
    let v: Value = serde_json::from_str(tool_content).unwrap();
    v.as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["employee"]["employee_id"].as_str().map(String::from))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_python_question_produces_four_messages() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        ScriptStep::lookup("Python skills"),
        ScriptStep::text("Ada Lovelace has Python skills."),
    ]));
    let (runner, store) = runner_with(&test_config(), llm.clone()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = runner.with_event_sender(tx);

    let answer = runner
        .run_conversation_turn("thread-1", "Which employees have Python skills?")
        .await
        .unwrap();
    assert_eq!(answer, "Ada Lovelace has Python skills.");

    let state = store.load("thread-1").await.unwrap();
    let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert!(state.messages()[1].has_tool_calls());
    assert_eq!(
        state.messages()[2].tool_call_id.as_deref(),
        Some(state.messages()[1].tool_calls[0].id.as_str())
    );
    assert!(employee_ids(&state.messages()[2].content).contains(&"E1".to_string()));
    assert!(state.tool_calls_resolved());

    let mut visits = 0;
    while let Ok(ev) = rx.try_recv() {
        if matches!(ev, TurnEvent::AgentVisit { .. }) {
            visits += 1;
        }
    }
    assert_eq!(visits, 2);
}

#[tokio::test(start_paused = true)]
async fn test_follow_up_reuses_thread_history() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        ScriptStep::lookup("Python skills"),
        ScriptStep::text("Ada Lovelace has Python skills."),
        ScriptStep::lookup("Java skills"),
        ScriptStep::text("Grace Hopper knows Java."),
    ]));
    let (runner, store) = runner_with(&test_config(), llm.clone()).await;

    runner
        .run_conversation_turn("thread-2", "Which employees have Python skills?")
        .await
        .unwrap();
    let answer = runner.run_conversation_turn("thread-2", "What about Java?").await.unwrap();
    assert_eq!(answer, "Grace Hopper knows Java.");

    let state = store.load("thread-2").await.unwrap();
    assert_eq!(state.len(), 8);
    assert_eq!(state.messages()[4].content, "What about Java?");
    assert!(state.tool_calls_resolved());

    // 第二回合首次调用模型时：system + 前一回合 4 条 + 新的用户消息
    let seen = llm.seen_messages();
    assert_eq!(seen[2].len(), 6);
    assert_eq!(seen[2][0].role, Role::System);
    assert_eq!(seen[2][5].content, "What about Java?");
}

#[tokio::test(start_paused = true)]
async fn test_oversize_message_rejected_before_any_call() {
    let llm = Arc::new(ScriptedLlmClient::repeating(ScriptStep::text("unused")));
    let (runner, store) = runner_with(&test_config(), llm.clone()).await;

    let err = runner
        .run_conversation_turn("thread-3", &"x".repeat(2001))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(err.status(), 400);
    assert_eq!(llm.calls(), 0);
    assert_eq!(store.thread_count().await, 0);

    // 恰好 2000 字符可以通过
    assert!(runner.run_conversation_turn("thread-3", &"x".repeat(2000)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_model_timeouts_return_fixed_message_and_update_checkpoint() {
    let slow = ScriptStep::Delayed(Duration::from_secs(60), AssistantReply::text("too late"));
    let llm = Arc::new(ScriptedLlmClient::new(vec![slow.clone(), slow.clone(), slow.clone(), slow])
        .with_fallback(ScriptStep::text("Back online.")));
    let (runner, store) = runner_with(&test_config(), llm.clone()).await;

    let answer = runner.run_conversation_turn("thread-4", "Who manages Ada?").await.unwrap();
    assert_eq!(answer, TIMEOUT_MESSAGE);
    assert_eq!(llm.calls(), 4);

    let state = store.load("thread-4").await.unwrap();
    assert_eq!(state.len(), 2);
    assert_eq!(state.messages()[1].role, Role::Assistant);
    assert_eq!(state.messages()[1].content, TIMEOUT_MESSAGE);

    // 线程可以继续
    let next = runner.run_conversation_turn("thread-4", "Try again").await.unwrap();
    assert_eq!(next, "Back online.");
    assert_eq!(store.load("thread-4").await.unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_turn_deadline_maps_to_model_timeout() {
    let mut cfg = test_config();
    cfg.resilience.model = fast(10_000, 0);
    cfg.resilience.turn = fast(300, 1);
    let slow = ScriptStep::Delayed(Duration::from_secs(60), AssistantReply::text("too late"));
    let llm = Arc::new(ScriptedLlmClient::repeating(slow));
    let (runner, store) = runner_with(&cfg, llm.clone()).await;

    let err = runner.run_conversation_turn("thread-5", "Hello?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelTimeout);
    assert_eq!(err.status(), 504);
    assert_eq!(err.message(), TIMEOUT_MESSAGE);
    assert_eq!(llm.calls(), 2);

    let state = store.load("thread-5").await.unwrap();
    assert_eq!(state.len(), 2);
    assert_eq!(state.messages()[1].content, TIMEOUT_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn test_recursion_limit_is_workflow_error_without_checkpoint() {
    let mut cfg = test_config();
    cfg.agent.recursion_limit = 2;
    let llm = Arc::new(ScriptedLlmClient::repeating(ScriptStep::lookup("everyone")));
    let (runner, store) = runner_with(&cfg, llm.clone()).await;

    let err = runner.run_conversation_turn("thread-6", "List everyone").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Workflow);
    assert_eq!(err.message(), ErrorKind::Workflow.user_message());
    // Agent 最多访问 limit + 1 次；不可重试，回合不重跑
    assert_eq!(llm.calls(), 3);
    assert!(store.load("thread-6").await.unwrap().is_empty());

    let text = runner.respond("thread-6", "List everyone").await;
    assert_eq!(text, ErrorKind::Workflow.user_message());
}

#[tokio::test]
async fn test_resume_from_file_checkpoint_in_new_runner() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();

    let first = Arc::new(ScriptedLlmClient::new(vec![
        ScriptStep::lookup("Python skills"),
        ScriptStep::text("Ada Lovelace has Python skills."),
    ]));
    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path(), "hr"));
    let runner = assemble_runner(&cfg, services(first, store).await);
    runner
        .run_conversation_turn("thread-7", "Which employees have Python skills?")
        .await
        .unwrap();
    drop(runner);

    let second = Arc::new(ScriptedLlmClient::new(vec![
        ScriptStep::lookup("Java skills"),
        ScriptStep::text("Grace Hopper knows Java."),
    ]));
    let store = Arc::new(FileCheckpointStore::new(dir.path(), "hr"));
    let runner = assemble_runner(&cfg, services(second.clone(), store.clone()).await);
    runner.run_conversation_turn("thread-7", "What about Java?").await.unwrap();

    let state = store.load("thread-7").await.unwrap();
    assert_eq!(state.len(), 8);
    assert_eq!(second.seen_messages()[0].len(), 6);
    assert_eq!(store.version("thread-7").await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_turns_on_one_thread_are_serialized() {
    let cfg = test_config();
    let store = Arc::new(MemoryCheckpointStore::default());
    let runner = Arc::new(assemble_runner(
        &cfg,
        services(Arc::new(MockLlmClient), store.clone()).await,
    ));

    let mut handles = Vec::new();
    for (thread, question) in [
        ("shared", "Who knows Python?"),
        ("shared", "Who knows Java?"),
        ("other", "Who knows C?"),
    ] {
        let runner = runner.clone();
        handles.push(tokio::spawn(async move {
            runner.run_conversation_turn(thread, question).await
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().is_ok());
    }

    let shared = store.load("shared").await.unwrap();
    assert_eq!(shared.len(), 8);
    assert!(shared.tool_calls_resolved());
    assert_eq!(store.load("other").await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_offline_mock_model_names_matching_employees() {
    let store = Arc::new(MemoryCheckpointStore::default());
    let runner = assemble_runner(
        &test_config(),
        services(Arc::new(MockLlmClient), store.clone()).await,
    );

    let answer = runner
        .run_conversation_turn("offline", "Which employees have Python skills?")
        .await
        .unwrap();
    assert!(answer.contains("Ada Lovelace"), "{}", answer);
    assert_eq!(store.load("offline").await.unwrap().len(), 4);
}

fn two_turn_script() -> Arc<ScriptedLlmClient> {
    Arc::new(ScriptedLlmClient::new(vec![
        ScriptStep::lookup("Python skills"),
        ScriptStep::text("Ada Lovelace has Python skills."),
        ScriptStep::lookup("Java skills"),
        ScriptStep::text("Grace Hopper knows Java."),
    ]))
}

/// (role, content) 序列；工具调用 ID 每次随机生成，不参与比较
fn transcript(state: &ConversationState) -> Vec<(Role, String)> {
    state
        .messages()
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_replaying_same_turns_gives_same_conversation() {
    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let (runner, store) = runner_with(&test_config(), two_turn_script()).await;
        runner
            .run_conversation_turn("replay", "Which employees have Python skills?")
            .await
            .unwrap();
        let answer = runner.run_conversation_turn("replay", "What about Java?").await.unwrap();
        let state = store.load("replay").await.unwrap();
        outcomes.push((state.len(), answer, transcript(&state)));
    }

    assert_eq!(outcomes[0].0, 8);
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test(start_paused = true)]
async fn test_resuming_from_same_checkpoint_twice_is_idempotent() {
    let (runner, store) = runner_with(&test_config(), two_turn_script()).await;
    runner
        .run_conversation_turn("seed", "Which employees have Python skills?")
        .await
        .unwrap();
    let checkpoint = store.load("seed").await.unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            ScriptStep::lookup("Java skills"),
            ScriptStep::text("Grace Hopper knows Java."),
        ]));
        let (runner, store) = runner_with(&test_config(), llm).await;
        store.save("seed", &checkpoint).await.unwrap();
        let answer = runner.run_conversation_turn("seed", "What about Java?").await.unwrap();
        let state = store.load("seed").await.unwrap();
        outcomes.push((state.len(), answer, transcript(&state)));
    }

    assert_eq!(outcomes[0].0, 8);
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn test_boundary_inputs_return_text_or_typed_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();
    let store = Arc::new(FileCheckpointStore::new(dir.path(), "hr"));
    let llm = Arc::new(ScriptedLlmClient::repeating(ScriptStep::text("Done.")));
    let runner = assemble_runner(&cfg, services(llm, store.clone()).await);

    let max_message = "é".repeat(cfg.app.max_message_chars);
    let max_thread = "t".repeat(cfg.app.max_thread_id_chars);
    let accepted: Vec<(&str, &str)> = vec![
        ("one-char", "a"),
        ("multibyte", max_message.as_str()),
        (max_thread.as_str(), "hello"),
        ("team/alpha", "hello"),
        ("..", "hello"),
        ("../../etc/passwd", "hello"),
        ("spaces in id", "  padded  "),
    ];
    for (thread, message) in &accepted {
        let answer = runner
            .run_conversation_turn(thread, message)
            .await
            .unwrap_or_else(|e| panic!("thread {:?} failed: {:?}", thread, e));
        assert_eq!(answer, "Done.");
        assert_eq!(store.load(thread).await.unwrap().len(), 2, "thread {:?}", thread);
    }
    // 所有快照都落在命名空间目录内
    let entries = std::fs::read_dir(dir.path().join("hr")).unwrap().count();
    assert_eq!(entries, accepted.len());

    let too_long_message = "é".repeat(cfg.app.max_message_chars + 1);
    let too_long_thread = "t".repeat(cfg.app.max_thread_id_chars + 1);
    let rejected: Vec<(&str, &str)> = vec![
        ("", "hello"),
        ("   ", "hello"),
        ("t", ""),
        ("t", " \n\t "),
        ("t", too_long_message.as_str()),
        (too_long_thread.as_str(), "hello"),
    ];
    for (thread, message) in &rejected {
        let err = runner.run_conversation_turn(thread, message).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "thread {:?}", thread);
        assert!(!err.message().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_model_reply_uses_fallback_answer() {
    let llm = Arc::new(ScriptedLlmClient::repeating(ScriptStep::text("")));
    let (runner, store) = runner_with(&test_config(), llm).await;

    let answer = runner.run_conversation_turn("quiet", "Anyone?").await.unwrap();
    assert_eq!(answer, EMPTY_ANSWER_FALLBACK);
    assert!(!answer.is_empty());
    assert_eq!(store.load("quiet").await.unwrap().len(), 2);
}
