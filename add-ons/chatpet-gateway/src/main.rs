//! Axum-based gateway for ChatPet: exposes chat sessions, pet profiles and logs over HTTP.
//! Config-driven via CoreConfig.

mod sessions;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chatpet_core::{
    CoreConfig, JournalError, JournalStats, JournalWriter, LlmUiState, ModelHandle, ProfileStore,
    SledProfileStore, StateChange, SubmitRejected,
};
use chatpet_engines::{LlmMode, ModelRouter};
use sessions::SessionRegistry;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::field::Visit;
use tracing_subscriber::layer::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Captures the "message" field from a tracing event.
struct MessageCollector<'a>(&'a mut String);

impl Visit for MessageCollector<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.0 = value.to_string();
        }
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{:?}", value);
        }
    }
}

/// Sends each tracing event as a line to a broadcast channel for SSE log streaming.
#[derive(Clone)]
struct LogBroadcastLayer {
    tx: broadcast::Sender<String>,
}

impl LogBroadcastLayer {
    fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

impl<S> tracing_subscriber::Layer<S> for LogBroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageCollector(&mut message));
        let line = format!(
            "{} [{}] {}",
            event.metadata().level(),
            event.metadata().target(),
            message
        );
        let _ = self.tx.send(line);
    }
}

/// Pre-flight check: config loads, the profile DB opens and the port is free.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;

    let db_path = config.profile_db_path();
    print!("Checking profile store at {}... ", db_path.display());
    let store = SledProfileStore::open_path(&db_path)
        .map_err(|e| format!("profile store LOCKED or inaccessible: {}", e))?;
    store
        .load("__verify_probe__")
        .map_err(|e| format!("profile store unreadable: {}", e))?;
    drop(store);
    println!("OK");

    println!(
        "Engine mode: {} (model: {})",
        LlmMode::parse(&config.llm_mode).as_str(),
        config.model_path
    );

    let port = config.port;
    print!("Checking port {}... ", port);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => {
            return Err(format!("Port {} BLOCKED: {}", port, e));
        }
    }

    println!("\nSUCCESS: ready to start gateway.");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[chatpet-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    let (log_tx, _) = broadcast::channel(1000);
    let log_layer = LogBroadcastLayer::new(log_tx.clone());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(log_layer)
        .init();

    let config = Arc::new(CoreConfig::load().expect("load CoreConfig"));
    let store = Arc::new(
        SledProfileStore::open_path(config.profile_db_path()).expect("open profile store"),
    );
    let router = Arc::new(ModelRouter::from_config(&config));
    tracing::info!(
        mode = router.mode().as_str(),
        model = %config.model_path,
        "Inference engine ready"
    );

    let sessions = Arc::new(SessionRegistry::new(store.clone(), router.clone(), &config));
    let journal = Arc::new(JournalWriter::new(
        router.clone(),
        store.journal_book().expect("open journal tree"),
        ModelHandle::new(config.model_path.clone()),
        config.generate_timeout(),
    ));
    let app = build_app(AppState {
        config: Arc::clone(&config),
        sessions: Arc::clone(&sessions),
        journal,
        log_tx,
    });

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    tracing::info!("{} listening on {}", config.app_name, addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    let cancelled = sessions.cancel_all();
    router.release().await;
    if let Err(e) = store.flush() {
        tracing::warn!(error = %e, "Profile store flush failed");
    }
    tracing::info!(cancelled_turns = cancelled, "Gateway stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Exact origins the browser may call from: `cors_origins`, or the gateway's own localhost origins.
fn allowed_origins(config: &CoreConfig) -> Vec<HeaderValue> {
    let configured = if config.cors_origins.is_empty() {
        vec![
            format!("http://localhost:{}", config.port),
            format!("http://127.0.0.1:{}", config.port),
        ]
    } else {
        config.cors_origins.clone()
    };
    configured
        .iter()
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(&state.config)))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .expose_headers(tower_http::cors::Any);

    Router::new()
        .route("/v1/status", get(status))
        .route("/api/v1/health", get(health))
        .route("/api/v1/logs", get(logs_stream))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/chat/:user_key/cancel", post(cancel_chat))
        .route("/api/v1/chat/:user_key/state", get(chat_state))
        .route("/api/v1/chat/:user_key/events", get(chat_events))
        .route("/api/v1/profile/:user_key", get(get_profile))
        .route("/api/v1/journal/:user_key", get(list_journal).post(write_journal))
        .with_state(state)
        .layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) journal: Arc<JournalWriter>,
    pub(crate) log_tx: broadcast::Sender<String>,
}

/// Wire view of a UI state.
fn state_json(state: &LlmUiState, generation: u64) -> serde_json::Value {
    match state {
        LlmUiState::Success(text) => serde_json::json!({
            "state": state.kind(),
            "text": text,
            "generation": generation,
        }),
        LlmUiState::Error { title, message } => serde_json::json!({
            "state": state.kind(),
            "title": title,
            "message": message,
            "generation": generation,
        }),
        LlmUiState::Idle | LlmUiState::Loading => serde_json::json!({
            "state": state.kind(),
            "generation": generation,
        }),
    }
}

fn state_event(change: &StateChange) -> Event {
    Event::default()
        .event(change.state.kind())
        .data(state_json(&change.state, change.generation).to_string())
}

/// GET /api/v1/health – liveness check for UI and scripts.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// GET /v1/status – app identity and engine settings from config.
async fn status(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "app_name": state.config.app_name,
        "port": state.config.port,
        "llm_mode": LlmMode::parse(&state.config.llm_mode).as_str(),
        "model_path": state.config.model_path,
        "active_sessions": state.sessions.len(),
    }))
}

/// GET /api/v1/logs – Server-Sent Events stream of gateway logs (tracing output).
async fn logs_stream(
    State(state): State<AppState>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    use async_stream::stream;
    let mut rx = state.log_tx.subscribe();
    let stream = stream! {
        loop {
            tokio::select! {
                r = rx.recv() => match r {
                    Ok(line) => yield Ok(Event::default().data(line)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        yield Ok(Event::default().data(format!("... {} log lines dropped", n)));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    yield Ok(Event::default().comment("keepalive"));
                }
            }
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

#[derive(serde::Deserialize)]
struct ChatRequest {
    user_key: String,
    message: String,
}

/// POST /api/v1/chat – starts a turn on the user's session. The reply arrives via state/events.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let user_key = req.user_key.trim();
    if user_key.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({ "status": "rejected", "error": "user_key is required" })),
        );
    }

    let session = state.sessions.get_or_open(user_key);
    match session.submit(&req.message) {
        Ok(turn) => (
            StatusCode::ACCEPTED,
            axum::Json(serde_json::json!({
                "status": "accepted",
                "generation": turn.generation,
                "turn_id": turn.turn_id.to_string(),
            })),
        ),
        Err(rejected) => {
            let code = match rejected {
                SubmitRejected::InvalidInput => StatusCode::BAD_REQUEST,
                SubmitRejected::Overlap => StatusCode::CONFLICT,
            };
            (
                code,
                axum::Json(serde_json::json!({ "status": "rejected", "error": rejected.to_string() })),
            )
        }
    }
}

/// POST /api/v1/chat/:user_key/cancel – abandons the in-flight turn, if any.
async fn cancel_chat(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
) -> axum::Json<serde_json::Value> {
    let (cancelled, view) = match state.sessions.get(&user_key) {
        Some(session) => {
            let cancelled = session.cancel();
            (cancelled, state_json(&session.state(), session.generation()))
        }
        None => (false, state_json(&LlmUiState::Idle, 0)),
    };
    axum::Json(serde_json::json!({ "cancelled": cancelled, "current": view }))
}

/// GET /api/v1/chat/:user_key/state – current UI state (idle for unknown users).
async fn chat_state(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
) -> axum::Json<serde_json::Value> {
    let view = match state.sessions.get(&user_key) {
        Some(session) => state_json(&session.state(), session.generation()),
        None => state_json(&LlmUiState::Idle, 0),
    };
    axum::Json(view)
}

/// GET /api/v1/chat/:user_key/events – SSE stream of state transitions, starting with the current one.
///
/// Unknown users get a single idle event; watching never opens a session.
async fn chat_events(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    use async_stream::stream;
    let watched = state.sessions.get(&user_key).map(|session| {
        let rx = session.subscribe();
        (session, rx)
    });
    let stream = stream! {
        let Some((session, mut rx)) = watched else {
            yield Ok(state_event(&StateChange { generation: 0, state: LlmUiState::Idle }));
            return;
        };
        yield Ok(state_event(&StateChange {
            generation: session.generation(),
            state: session.state(),
        }));
        loop {
            match rx.recv().await {
                Ok(change) => yield Ok(state_event(&change)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(target: "chatpet::session", user_key = %user_key, skipped = n, "State subscriber lagged");
                    yield Ok(state_event(&StateChange {
                        generation: session.generation(),
                        state: session.state(),
                    }));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// GET /api/v1/profile/:user_key – stored pet profile (defaults when none is stored).
async fn get_profile(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
) -> Result<axum::Json<serde_json::Value>, StatusCode> {
    let profile = state.sessions.store().get(&user_key);
    let value = serde_json::to_value(&profile).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(axum::Json(value))
}

/// POST /api/v1/journal/:user_key – writes today's journal entry from the stored profile.
/// Body (optional): day stats as JSON.
async fn write_journal(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
    stats: Option<Json<JournalStats>>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let stats = stats.map(|Json(s)| s).unwrap_or_default();
    let profile = state.sessions.store().get(&user_key);
    match state.journal.write_entry(&user_key, &profile, &stats).await {
        Ok(entry) => match serde_json::to_value(&entry) {
            Ok(value) => (StatusCode::CREATED, axum::Json(value)),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "error": e.to_string() })),
            ),
        },
        Err(e) => {
            let (code, title) = match &e {
                JournalError::Busy => (StatusCode::CONFLICT, "Already writing"),
                JournalError::Engine(engine) => (StatusCode::BAD_GATEWAY, engine.title()),
                JournalError::Empty => (StatusCode::BAD_GATEWAY, "No entry"),
                JournalError::Storage(_) | JournalError::Codec(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Could not save")
                }
            };
            (
                code,
                axum::Json(serde_json::json!({ "title": title, "error": e.to_string() })),
            )
        }
    }
}

/// GET /api/v1/journal/:user_key – saved journal entries, newest first.
async fn list_journal(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
) -> Result<axum::Json<serde_json::Value>, StatusCode> {
    let entries = state.journal.book().entries(&user_key).map_err(|e| {
        tracing::error!(target: "chatpet::journal", user_key = %user_key, error = %e, "Journal read failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(axum::Json(serde_json::json!({ "user_key": user_key, "entries": entries })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chatpet_core::{EngineError, InferenceEngine, PetProfile, PetType};
    use futures_util::StreamExt;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    struct Gated {
        started: Notify,
        gate: Notify,
    }

    impl Gated {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Notify::new(),
                gate: Notify::new(),
            })
        }
    }

    #[async_trait::async_trait]
    impl InferenceEngine for Gated {
        fn name(&self) -> &str {
            "gated"
        }

        async fn generate(&self, _: &ModelHandle, _: &str, _: &str) -> Result<String, EngineError> {
            self.started.notify_one();
            self.gate.notified().await;
            Ok("Hello!".to_string())
        }
    }

    fn test_log_tx() -> broadcast::Sender<String> {
        let (tx, _) = broadcast::channel(1);
        tx
    }

    fn test_config() -> CoreConfig {
        CoreConfig {
            app_name: "Test Gateway".to_string(),
            ..CoreConfig::default()
        }
    }

    fn test_app(
        dir: &tempfile::TempDir,
        engine: Arc<dyn InferenceEngine>,
    ) -> (Router, Arc<SledProfileStore>, Arc<SessionRegistry>) {
        test_app_with(dir, engine, test_config())
    }

    fn test_app_with(
        dir: &tempfile::TempDir,
        engine: Arc<dyn InferenceEngine>,
        config: CoreConfig,
    ) -> (Router, Arc<SledProfileStore>, Arc<SessionRegistry>) {
        let store = Arc::new(SledProfileStore::open_path(dir.path()).unwrap());
        let sessions = Arc::new(SessionRegistry::new(store.clone(), engine.clone(), &config));
        let journal = Arc::new(JournalWriter::new(
            engine,
            store.journal_book().unwrap(),
            ModelHandle::new(config.model_path.clone()),
            config.generate_timeout(),
        ));
        let app = build_app(AppState {
            config: Arc::new(config),
            sessions: sessions.clone(),
            journal,
            log_tx: test_log_tx(),
        });
        (app, store, sessions)
    }

    fn chat_request(user_key: &str, message: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "user_key": user_key, "message": message }).to_string(),
            ))
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_until_settled(sessions: &SessionRegistry, user_key: &str) -> LlmUiState {
        let session = sessions.get(user_key).unwrap();
        for _ in 0..200 {
            let state = session.state();
            if !state.is_loading() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("turn never finished");
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, _) = test_app(&dir, Arc::new(ModelRouter::mock()));
        let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_returns_app_identity_and_engine() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, _) = test_app(&dir, Arc::new(ModelRouter::mock()));
        let req = Request::builder().uri("/v1/status").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["app_name"], "Test Gateway");
        assert_eq!(json["port"], 8001);
        assert_eq!(json["llm_mode"], "mock");
        assert_eq!(json["model_path"], "gemma3-1b-it-int4");
        assert_eq!(json["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_chat_success_updates_state_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let (app, store, sessions) = test_app(&dir, Arc::new(ModelRouter::mock()));
        store
            .put("alice", &PetProfile::new(PetType::Unicorn, "Daisy").with_happiness(90))
            .unwrap();

        let res = app.clone().oneshot(chat_request("alice", "hi Daisy")).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let json = body_json(res).await;
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["generation"], 1);

        let settled = wait_until_settled(&sessions, "alice").await;
        assert!(matches!(settled, LlmUiState::Success(_)));

        let req = Request::builder()
            .uri("/api/v1/chat/alice/state")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["state"], "success");
        assert!(json["text"].as_str().unwrap().starts_with("*Daisy perks up*"));

        // Progression runs right after Success is published.
        let mut happiness = 0;
        for _ in 0..200 {
            happiness = store.get("alice").happiness;
            if happiness == 100 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(happiness, 100);

        let req = Request::builder()
            .uri("/api/v1/profile/alice")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(json["pet_name"], "Daisy");
        assert_eq!(json["pet_type"], "Unicorn");
        assert_eq!(json["happiness"], 100);
    }

    #[tokio::test]
    async fn test_blank_message_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, sessions) = test_app(&dir, Arc::new(ModelRouter::mock()));

        let res = app.clone().oneshot(chat_request("alice", "   ")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(sessions.get("alice").unwrap().state(), LlmUiState::Idle);

        let res = app.oneshot(chat_request("  ", "hello")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_overlap_conflicts_then_cancel_returns_idle() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Gated::new();
        let (app, _, _) = test_app(&dir, engine);

        let res = app.clone().oneshot(chat_request("bob", "first")).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let res = app.clone().oneshot(chat_request("bob", "second")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/chat/bob/cancel")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["cancelled"], true);
        assert_eq!(json["current"]["state"], "idle");
        assert_eq!(json["current"]["generation"], 2);

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/chat/bob/cancel")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(json["cancelled"], false);
    }

    #[tokio::test]
    async fn test_unknown_user_state_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, sessions) = test_app(&dir, Arc::new(ModelRouter::mock()));
        let req = Request::builder()
            .uri("/api/v1/chat/nobody/state")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(json["state"], "idle");
        assert_eq!(sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_events_stream_starts_with_current_state() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _, sessions) = test_app(&dir, Arc::new(ModelRouter::mock()));
        let req = Request::builder()
            .uri("/api/v1/chat/carol/events")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let mut body = res.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.contains("event: idle"), "got {text}");
        assert!(text.contains("\"generation\":0"));
        assert!(body.next().await.is_none());
        assert_eq!(sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_events_stream_follows_an_open_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Gated::new();
        let (app, _, _) = test_app(&dir, engine.clone());
        let res = app.clone().oneshot(chat_request("dora", "hi")).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);

        let req = Request::builder()
            .uri("/api/v1/chat/dora/events")
            .body(Body::empty())
            .unwrap();
        let mut body = app.oneshot(req).await.unwrap().into_body().into_data_stream();
        let first = String::from_utf8(body.next().await.unwrap().unwrap().to_vec()).unwrap();
        assert!(first.contains("event: loading"), "got {first}");

        engine.gate.notify_one();
        let next = String::from_utf8(body.next().await.unwrap().unwrap().to_vec()).unwrap();
        assert!(next.contains("event: success"), "got {next}");
    }

    #[tokio::test]
    async fn test_cors_allows_only_configured_origins() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            cors_origins: vec!["http://localhost:5173/".to_string()],
            ..test_config()
        };
        let (app, _, _) = test_app_with(&dir, Arc::new(ModelRouter::mock()), config);

        let from = |origin: &str| {
            Request::builder()
                .uri("/api/v1/health")
                .header("origin", origin)
                .body(Body::empty())
                .unwrap()
        };
        let res = app.clone().oneshot(from("http://localhost:5173")).await.unwrap();
        assert_eq!(
            res.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
        let res = app.oneshot(from("http://localhost:3005")).await.unwrap();
        assert!(res.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_default_origins_are_the_gateway_itself() {
        let origins = allowed_origins(&test_config());
        assert_eq!(
            origins,
            vec![
                HeaderValue::from_static("http://localhost:8001"),
                HeaderValue::from_static("http://127.0.0.1:8001"),
            ]
        );
    }

    #[tokio::test]
    async fn test_journal_write_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let (app, store, _) = test_app(&dir, Arc::new(ModelRouter::mock()));
        store
            .put("erin", &PetProfile::new(PetType::Dragon, "Ember").with_level(2))
            .unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/journal/erin")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "times_fed": 2 }).to_string()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let written = body_json(res).await;
        assert_eq!(written["user_key"], "erin");
        assert!(!written["text"].as_str().unwrap().is_empty());

        let req = Request::builder()
            .uri("/api/v1/journal/erin")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        let entries = json["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["entry_id"], written["entry_id"]);
    }

    #[tokio::test]
    async fn test_journal_while_writing_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Gated::new();
        let (app, _, _) = test_app(&dir, engine.clone());

        let post = || {
            Request::builder()
                .method("POST")
                .uri("/api/v1/journal/finn")
                .body(Body::empty())
                .unwrap()
        };
        let first = tokio::spawn(app.clone().oneshot(post()));
        engine.started.notified().await;

        let second = app.clone().oneshot(post()).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["title"], "Already writing");

        engine.gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::CREATED);
    }

    #[test]
    fn test_state_json_shapes() {
        let v = state_json(&LlmUiState::Success("Hello!".into()), 3);
        assert_eq!(v, serde_json::json!({ "state": "success", "text": "Hello!", "generation": 3 }));
        let v = state_json(&LlmUiState::error("No reply", "empty response"), 4);
        assert_eq!(v["title"], "No reply");
        assert_eq!(v["message"], "empty response");
    }
}
