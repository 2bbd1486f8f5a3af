//! Shared helpers: an in-process mock of an OpenAI-style inference server.
#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use scripture_insights::config::Config;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Maps (system prompt, user prompt) to (HTTP status, assistant content)
pub type Responder = Arc<dyn Fn(&str, &str) -> (u16, String) + Send + Sync>;

#[derive(Clone)]
struct MockState {
    responder: Responder,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    user_prompts: Arc<Mutex<Vec<String>>>,
}

pub struct MockLlm {
    pub url: String,
    pub calls: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub user_prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLlm {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.user_prompts.lock().unwrap().clone()
    }
}

async fn chat(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);
    state.calls.fetch_add(1, Ordering::SeqCst);

    let system = body["messages"][0]["content"].as_str().unwrap_or("").to_string();
    let user = body["messages"][1]["content"].as_str().unwrap_or("").to_string();
    state.user_prompts.lock().unwrap().push(user.clone());

    tokio::time::sleep(state.delay).await;
    let (status, content) = (state.responder)(&system, &user);
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    if status == 200 {
        Json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        }))
        .into_response()
    } else {
        (StatusCode::from_u16(status).unwrap(), content).into_response()
    }
}

pub async fn spawn_mock_llm(delay: Duration, responder: Responder) -> MockLlm {
    let state = MockState {
        responder,
        delay,
        in_flight: Arc::new(AtomicUsize::new(0)),
        max_in_flight: Arc::new(AtomicUsize::new(0)),
        calls: Arc::new(AtomicUsize::new(0)),
        user_prompts: Arc::new(Mutex::new(Vec::new())),
    };
    let mock = MockLlm {
        url: String::new(),
        calls: state.calls.clone(),
        max_in_flight: state.max_in_flight.clone(),
        user_prompts: state.user_prompts.clone(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/v1/chat/completions", post(chat))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockLlm {
        url: format!("http://{}", addr),
        ..mock
    }
}

/// An endpoint on which nothing is listening.
pub async fn unreachable_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn is_normalize_prompt(system: &str) -> bool {
    system.starts_with("You normalize Bible references")
}

pub fn well_formed_insight(summary: &str) -> String {
    json!({
        "summary": summary,
        "theological_terms": {"agape": "self-giving love", "eternal life": "life of the age to come"},
        "cross_references": ["Romans 5:8", "1 John 4:9"],
        "historical_context": "Spoken to Nicodemus, a Pharisee, in Jerusalem.",
        "original_language_notes": ["monogenes: only, unique"],
        "related_entities": {"people": ["Jesus", "Nicodemus"], "places": ["Jerusalem"]}
    })
    .to_string()
}

/// Responder that normalizes "jn3.16" and answers insights with `insight`.
pub fn scripted(insight: impl Into<String>) -> Responder {
    let insight = insight.into();
    Arc::new(move |system, user| {
        if is_normalize_prompt(system) {
            let reply = match user {
                "jn3.16" => "John 3:16".to_string(),
                other => other.to_string(),
            };
            (200, reply)
        } else {
            (200, insight.clone())
        }
    })
}

pub fn test_config(endpoint: &str) -> Config {
    let mut config = Config::default();
    config.llm.endpoint = endpoint.to_string();
    config.llm.timeout_ms = 5_000;
    config.llm.max_retries = 0;
    config.llm.retry_delay_ms = 10;
    config.insights.cache_ttl_sec = 0;
    config
}
