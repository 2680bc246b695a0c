use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::models::{Problem, SimilarQuestion};
use crate::normalize::normalize;

// ── Constants ────────────────────────────────────────────────────────────────

const USER_AGENT: &str = "dsa-tutor-api/1.0";
const ALLOWED_HOSTS: &[&str] = &["leetcode.com", "www.leetcode.com"];

const QUESTION_QUERY: &str = r#"
query questionData($titleSlug: String!) {
  question(titleSlug: $titleSlug) {
    questionId
    title
    content
    difficulty
    exampleTestcases
    topicTags {
      name
    }
    similarQuestions
  }
}
"#;

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("No problem found for slug '{0}'")]
    NotFound(String),
    #[error("Upstream returned status {0}")]
    Upstream(u16),
    #[error("{0}")]
    Request(String),
    #[error("Malformed upstream response: {0}")]
    Decode(String),
}

// ── GraphQL payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<QuestionEnvelope>,
}

#[derive(Debug, Deserialize)]
struct QuestionEnvelope {
    question: Option<RawQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
    pub question_id: String,
    pub title: String,
    pub content: Option<String>,
    pub difficulty: String,
    pub example_testcases: Option<String>,
    #[serde(default)]
    pub topic_tags: Vec<TopicTag>,
    pub similar_questions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopicTag {
    pub name: String,
}

// ── URL validation ───────────────────────────────────────────────────────────

/// Check that `url` points at a problem page and return its slug.
pub fn validate_url(url: &str) -> Result<String, FetchError> {
    let trimmed = url.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate)
        .map_err(|_| FetchError::InvalidUrl("Invalid URL".to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(
            "Only http(s) URLs are allowed".to_string(),
        ));
    }

    let host = parsed.host_str().unwrap_or("").to_lowercase();
    if !ALLOWED_HOSTS.contains(&host.as_str()) {
        return Err(FetchError::InvalidUrl(
            "Only leetcode.com problem URLs are allowed".to_string(),
        ));
    }

    let mut segments = parsed.path_segments().into_iter().flatten();
    match (segments.next(), segments.next()) {
        (Some("problems"), Some(slug)) if SLUG_RE.is_match(slug) => Ok(slug.to_string()),
        _ => Err(FetchError::InvalidUrl(
            "Expected a URL of the form https://leetcode.com/problems/<slug>/".to_string(),
        )),
    }
}

/// Stable URL for a slug, so the same problem always keys the same chat.
pub fn canonical_url(slug: &str) -> String {
    format!("https://leetcode.com/problems/{}/", slug)
}

// ── HTTP client ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ProblemClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ProblemClient {
    pub fn new(endpoint: &str, insecure: bool) -> Result<Self, FetchError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let mut builder = reqwest::ClientBuilder::new()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .default_headers(headers);

        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn fetch_problem(&self, url: &str) -> Result<Problem, FetchError> {
        let slug = validate_url(url)?;
        tracing::info!(slug = %slug, "fetching problem");

        let body = json!({
            "query": QUESTION_QUERY,
            "variables": { "titleSlug": slug },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Request(format!("TimeoutError: {}", e))
                } else if e.is_connect() {
                    FetchError::Request(format!("ConnectError: {}", e))
                } else {
                    FetchError::Request(format!("RequestError: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(slug = %slug, status = status.as_u16(), "problem API returned an error");
            return Err(FetchError::Upstream(status.as_u16()));
        }

        let payload: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let question = payload
            .data
            .and_then(|d| d.question)
            .ok_or_else(|| FetchError::NotFound(slug.clone()))?;

        let problem = build_problem(&canonical_url(&slug), &slug, question);
        tracing::info!(
            slug = %slug,
            title = %problem.title,
            difficulty = %problem.difficulty,
            images = problem.description.images.len(),
            "problem fetched"
        );
        Ok(problem)
    }
}

// ── Payload → Problem ────────────────────────────────────────────────────────

pub fn build_problem(url: &str, slug: &str, question: RawQuestion) -> Problem {
    let raw_html = question.content.unwrap_or_default();
    let description = normalize(&raw_html);

    Problem {
        question_id: question.question_id,
        url: url.to_string(),
        title_slug: slug.to_string(),
        title: question.title,
        difficulty: question.difficulty,
        topic_tags: question.topic_tags.into_iter().map(|t| t.name).collect(),
        description,
        examples: split_examples(question.example_testcases.as_deref().unwrap_or("")),
        similar_questions: parse_similar_questions(
            question.similar_questions.as_deref().unwrap_or(""),
        ),
        raw_html,
    }
}

pub fn split_examples(testcases: &str) -> Vec<String> {
    testcases
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// The API ships similar questions as a JSON document inside a string.
/// Anything undecodable is logged and treated as "no similar questions".
pub fn parse_similar_questions(raw: &str) -> Vec<SimilarQuestion> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<SimilarQuestion>>(raw) {
        Ok(questions) => questions,
        Err(e) => {
            tracing::warn!(error = %e, "could not decode similar questions");
            Vec::new()
        }
    }
}
