use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NormalizeRequest {
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct ProblemRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub url: String,
    pub proficiency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    pub limit: Option<usize>,
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NormalizeResponse {
    pub text: String,
    pub images: Vec<ExtractedImage>,
    pub markdown: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub reply: ChatMessage,
    pub chat_id: Option<String>,
    pub remaining_queries: Option<usize>,
}

// ── Problem ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub source: String,
    pub alt: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDescription {
    pub text: String,
    #[serde(default)]
    pub images: Vec<ExtractedImage>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SimilarQuestion {
    pub title: String,
    pub difficulty: String,
    #[serde(alias = "titleSlug")]
    pub title_slug: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Problem {
    pub question_id: String,
    pub url: String,
    pub title_slug: String,
    pub title: String,
    pub difficulty: String,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub description: NormalizedDescription,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub similar_questions: Vec<SimilarQuestion>,
    #[serde(default)]
    pub raw_html: String,
}

// ── Conversation ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Proficiency {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A live conversation about one problem.
#[derive(Debug, Serialize, Clone)]
pub struct Session {
    pub id: String,
    pub problem_url: String,
    pub problem: Problem,
    pub proficiency: Proficiency,
    pub messages: Vec<ChatMessage>,
    pub chat_id: Option<String>,
}

// ── Persisted chats ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub question_count: usize,
    pub last_question: Option<String>,
    pub topics_discussed: Vec<String>,
}

impl ChatSummary {
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        let question_count = messages.iter().filter(|m| m.role == Role::User).count();
        let last_question = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone());

        let mut topics_discussed: Vec<String> = Vec::new();
        for msg in messages.iter().filter(|m| m.role == Role::Assistant) {
            let lower = msg.content.to_lowercase();
            let Some(pos) = lower.find("topics:") else {
                continue;
            };
            let rest = &lower[pos + "topics:".len()..];
            let line = rest.lines().next().unwrap_or("");
            for topic in line.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                if !topics_discussed.iter().any(|t| t == topic) {
                    topics_discussed.push(topic.to_string());
                }
            }
        }

        Self { question_count, last_question, topics_discussed }
    }
}

/// What a session hands to the chat store on save.
#[derive(Debug, Clone)]
pub struct ChatDraft {
    pub timestamp: DateTime<Local>,
    pub problem_url: String,
    pub proficiency: Proficiency,
    pub messages: Vec<ChatMessage>,
    pub problem: Problem,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chat {
    pub id: String,
    pub problem_url: String,
    pub problem_title: String,
    pub difficulty: String,
    pub timestamp: DateTime<Local>,
    pub last_updated: DateTime<Local>,
    #[serde(default)]
    pub proficiency: Proficiency,
    pub messages: Vec<ChatMessage>,
    pub problem: Problem,
    pub summary: ChatSummary,
}
