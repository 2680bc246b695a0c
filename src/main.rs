use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde_json::json;

mod assistant;
mod config;
mod error;
mod leetcode;
mod models;
mod normalize;
mod prompts;
mod rate_limit;
mod store;

use assistant::GeminiClient;
use config::AppConfig;
use error::{ApiError, ApiResult};
use leetcode::ProblemClient;
use models::{
    Chat, ChatDraft, ChatMessage, CreateSessionRequest, ListChatsQuery, NormalizeRequest,
    NormalizeResponse, Problem, ProblemRequest, Proficiency, Role, SendMessageRequest,
    SendMessageResponse, Session,
};
use rate_limit::{RateLimitStatus, RateLimiter};
use store::{ChatStore, KeyValueStore, MemoryChatStore, MemoryStore};

// ── Application state ────────────────────────────────────────────────────────

struct AppState {
    config: AppConfig,
    problems: ProblemClient,
    problem_cache: Box<dyn KeyValueStore<Problem>>,
    sessions: Box<dyn KeyValueStore<Session>>,
    chats: Box<dyn ChatStore>,
    limiter: RateLimiter,
    assistant: GeminiClient,
}

type SharedState = Arc<AppState>;

impl AppState {
    fn new(config: AppConfig) -> Result<Self, ApiError> {
        let problems = ProblemClient::new(&config.leetcode_graphql_url, config.insecure_ssl)?;
        let assistant = GeminiClient::new(
            &config.gemini_base_url,
            &config.gemini_model,
            config.google_api_key.clone(),
        )?;
        if !assistant.is_configured() {
            tracing::warn!("GOOGLE_API_KEY is not set; chat replies will be unavailable");
        }

        Ok(Self {
            limiter: RateLimiter::new(config.rate_limit.clone()),
            problems,
            problem_cache: Box::new(MemoryStore::<Problem>::new()),
            sessions: Box::new(MemoryStore::<Session>::new()),
            chats: Box::new(MemoryChatStore::new()),
            assistant,
            config,
        })
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let state = Arc::new(AppState::new(config).map_err(std::io::Error::other)?);

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/normalize", post(normalize_endpoint))
        .route("/problems", post(problem_endpoint))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/messages", post(send_message))
        .route("/sessions/:id/limits", get(session_limits))
        .route("/chats", get(list_chats))
        .route("/chats/:id", get(get_chat).delete(delete_chat))
        .route("/chats/:id/resume", post(resume_chat))
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn normalize_endpoint(Json(req): Json<NormalizeRequest>) -> Json<NormalizeResponse> {
    let description = normalize::normalize(&req.html);
    let markdown = normalize::expand(&description.text, &description.images);
    Json(NormalizeResponse {
        text: description.text,
        images: description.images,
        markdown,
    })
}

async fn problem_endpoint(
    State(state): State<SharedState>,
    Json(req): Json<ProblemRequest>,
) -> ApiResult<Json<Problem>> {
    Ok(Json(load_problem(&state, &req.url).await?))
}

async fn create_session(
    State(state): State<SharedState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let problem = load_problem(&state, &req.url).await?;
    let proficiency = Proficiency::resolve(req.proficiency.as_deref());

    let session = Session {
        id: uuid::Uuid::new_v4().to_string(),
        problem_url: problem.url.clone(),
        messages: vec![ChatMessage::assistant(prompts::greeting(&problem))],
        problem,
        proficiency,
        chat_id: None,
    };
    state.sessions.put(&session.id, session.clone());

    tracing::info!(
        session = %session.id,
        slug = %session.problem.title_slug,
        level = proficiency.short_name(),
        "session started"
    );
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    state
        .sessions
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Session".to_string()))
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    match state.sessions.evict(&id) {
        Some(_) => {
            state.limiter.forget(&id).await;
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::NotFound("Session".to_string())),
    }
}

async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest(
            "Message content must not be empty".to_string(),
        ));
    }

    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Session".to_string()))?;

    let limits = state.limiter.check(&id, content).await?;

    let prompt = prompts::build_prompt(
        &session.problem,
        session.proficiency,
        &session.messages,
        content,
    );
    // On failure nothing is appended, so the question can simply be resent.
    let answer = state.assistant.generate(&prompt).await?;

    let reply = ChatMessage::assistant(answer);
    let chat_id = record_exchange(&state, &id, content, &reply)?;

    Ok(Json(SendMessageResponse {
        reply,
        chat_id,
        remaining_queries: limits.remaining,
    }))
}

async fn session_limits(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RateLimitStatus>> {
    if state.sessions.get(&id).is_none() {
        return Err(ApiError::NotFound("Session".to_string()));
    }
    Ok(Json(state.limiter.status(&id).await))
}

async fn list_chats(
    State(state): State<SharedState>,
    Query(query): Query<ListChatsQuery>,
) -> Json<Vec<Chat>> {
    let limit = query.limit.unwrap_or(state.config.chat_history_limit);
    Json(state.chats.recent(limit))
}

async fn get_chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Chat>> {
    state
        .chats
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Chat".to_string()))
}

async fn resume_chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let chat = state
        .chats
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Chat".to_string()))?;

    let session = Session {
        id: uuid::Uuid::new_v4().to_string(),
        problem_url: chat.problem_url,
        problem: chat.problem,
        proficiency: chat.proficiency,
        messages: chat.messages,
        chat_id: Some(chat.id),
    };
    state.sessions.put(&session.id, session.clone());

    tracing::info!(session = %session.id, chat_id = %id, "chat resumed");
    Ok((StatusCode::CREATED, Json(session)))
}

async fn delete_chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.chats.delete(&id) {
        tracing::info!(chat_id = %id, "chat deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Chat".to_string()))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Fetch a problem, memoized by slug.
async fn load_problem(state: &AppState, url: &str) -> ApiResult<Problem> {
    let slug = leetcode::validate_url(url)?;
    if let Some(problem) = state.problem_cache.get(&slug) {
        tracing::debug!(slug = %slug, "problem cache hit");
        return Ok(problem);
    }

    let problem = state.problems.fetch_problem(url).await?;
    state.problem_cache.put(&slug, problem.clone());
    Ok(problem)
}

/// Append a question and its answer to the stored session, under the store
/// lock, and persist the chat. A session evicted meanwhile is not recreated.
fn record_exchange(
    state: &AppState,
    id: &str,
    question: &str,
    reply: &ChatMessage,
) -> ApiResult<Option<String>> {
    let session = state
        .sessions
        .update(id, &mut |session: &mut Session| {
            session.messages.push(ChatMessage::user(question));
            session.messages.push(reply.clone());
        })
        .ok_or_else(|| ApiError::NotFound("Session".to_string()))?;

    let chat_id = persist_chat(state, &session);
    if let Some(chat_id) = &chat_id {
        state
            .sessions
            .update(id, &mut |session: &mut Session| session.chat_id = Some(chat_id.clone()));
    }
    Ok(chat_id)
}

/// Chats are persisted only once the assistant has had the last word.
fn persist_chat(state: &AppState, session: &Session) -> Option<String> {
    if session.messages.last().map(|m| m.role) != Some(Role::Assistant) {
        return None;
    }

    let id = state.chats.save(ChatDraft {
        timestamp: Local::now(),
        problem_url: session.problem_url.clone(),
        proficiency: session.proficiency,
        messages: session.messages.clone(),
        problem: session.problem.clone(),
    });
    Some(id)
}
