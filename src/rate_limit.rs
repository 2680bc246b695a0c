use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_queries_per_hour: usize,
    pub max_tokens_per_query: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded. You have made {used}/{max} queries in the last hour; retry in {} minutes", .retry_after.as_secs().div_ceil(60))]
    Exceeded {
        used: usize,
        max: usize,
        retry_after: Duration,
    },
    #[error("Query too long. Estimated {estimated} tokens exceeds limit of {max} tokens")]
    TooManyTokens { estimated: usize, max: usize },
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub used: usize,
    pub max_queries: usize,
    pub remaining: Option<usize>,
    pub reset_in_secs: Option<u64>,
    pub max_tokens_per_query: usize,
}

/// Rough token count: about four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Sliding one-hour window of query timestamps per session.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate a query for `key` and record it when allowed.
    pub async fn check(&self, key: &str, text: &str) -> Result<RateLimitStatus, RateLimitError> {
        self.check_at(key, text, Instant::now()).await
    }

    pub async fn status(&self, key: &str) -> RateLimitStatus {
        self.status_at(key, Instant::now()).await
    }

    async fn check_at(
        &self,
        key: &str,
        text: &str,
        now: Instant,
    ) -> Result<RateLimitStatus, RateLimitError> {
        if !self.config.enabled {
            return Ok(self.disabled_status());
        }

        let estimated = estimate_tokens(text);
        if estimated > self.config.max_tokens_per_query {
            return Err(RateLimitError::TooManyTokens {
                estimated,
                max: self.config.max_tokens_per_query,
            });
        }

        let mut state = self.state.lock().await;
        state.retain(|_, queries| {
            prune(queries, now);
            !queries.is_empty()
        });

        let queries = state.get(key).map(Vec::as_slice).unwrap_or_default();
        if queries.len() >= self.config.max_queries_per_hour {
            let retry_after = queries
                .first()
                .map(|oldest| (*oldest + WINDOW).saturating_duration_since(now))
                .unwrap_or_default();
            tracing::info!(session = %key, used = queries.len(), "rate limit hit");
            return Err(RateLimitError::Exceeded {
                used: queries.len(),
                max: self.config.max_queries_per_hour,
                retry_after,
            });
        }

        let queries = state.entry(key.to_string()).or_default();
        queries.push(now);
        Ok(self.build_status(queries.as_slice(), now))
    }

    async fn status_at(&self, key: &str, now: Instant) -> RateLimitStatus {
        if !self.config.enabled {
            return self.disabled_status();
        }

        let mut state = self.state.lock().await;
        let queries = state
            .get_mut(key)
            .map(|queries| {
                prune(queries, now);
                queries.clone()
            })
            .unwrap_or_default();
        if queries.is_empty() {
            state.remove(key);
        }
        self.build_status(&queries, now)
    }

    /// Drop everything recorded for `key`.
    pub async fn forget(&self, key: &str) {
        self.state.lock().await.remove(key);
    }

    #[cfg(test)]
    pub async fn is_tracking(&self, key: &str) -> bool {
        self.state.lock().await.contains_key(key)
    }

    fn build_status(&self, queries: &[Instant], now: Instant) -> RateLimitStatus {
        RateLimitStatus {
            enabled: true,
            used: queries.len(),
            max_queries: self.config.max_queries_per_hour,
            remaining: Some(self.config.max_queries_per_hour.saturating_sub(queries.len())),
            reset_in_secs: queries
                .first()
                .map(|oldest| (*oldest + WINDOW).saturating_duration_since(now).as_secs()),
            max_tokens_per_query: self.config.max_tokens_per_query,
        }
    }

    fn disabled_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            enabled: false,
            used: 0,
            max_queries: self.config.max_queries_per_hour,
            remaining: None,
            reset_in_secs: None,
            max_tokens_per_query: self.config.max_tokens_per_query,
        }
    }
}

/// Drop timestamps that have left the window. Timestamps are kept in
/// insertion order, so the oldest is always first.
fn prune(queries: &mut Vec<Instant>, now: Instant) {
    queries.retain(|t| now.saturating_duration_since(*t) < WINDOW);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_queries: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_queries_per_hour: max_queries,
            max_tokens_per_query: 10,
        })
    }

    #[test]
    fn token_estimate_is_quarter_of_chars() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefg"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(41)), 10);
    }

    #[tokio::test]
    async fn denies_after_max_queries_in_window() {
        let limiter = limiter(2);
        let start = Instant::now();

        let first = limiter.check_at("s1", "q", start).await.unwrap();
        assert_eq!(first.remaining, Some(1));
        limiter
            .check_at("s1", "q", start + Duration::from_secs(60))
            .await
            .unwrap();

        let err = limiter
            .check_at("s1", "q", start + Duration::from_secs(120))
            .await
            .unwrap_err();
        match err {
            RateLimitError::Exceeded { used, max, retry_after } => {
                assert_eq!((used, max), (2, 2));
                assert_eq!(retry_after, WINDOW - Duration::from_secs(120));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn window_slides_after_an_hour() {
        let limiter = limiter(1);
        let start = Instant::now();

        limiter.check_at("s1", "q", start).await.unwrap();
        assert!(limiter.check_at("s1", "q", start + Duration::from_secs(10)).await.is_err());

        let later = start + WINDOW + Duration::from_secs(1);
        let status = limiter.check_at("s1", "q", later).await.unwrap();
        assert_eq!(status.used, 1);
    }

    #[tokio::test]
    async fn sessions_are_counted_separately() {
        let limiter = limiter(1);
        let now = Instant::now();

        limiter.check_at("s1", "q", now).await.unwrap();
        assert!(limiter.check_at("s2", "q", now).await.is_ok());
    }

    #[tokio::test]
    async fn long_queries_are_rejected_without_recording() {
        let limiter = limiter(5);
        let now = Instant::now();

        let err = limiter.check_at("s1", &"x".repeat(100), now).await.unwrap_err();
        assert!(matches!(err, RateLimitError::TooManyTokens { estimated: 25, max: 10 }));
        assert_eq!(limiter.status_at("s1", now).await.used, 0);
    }

    #[tokio::test]
    async fn status_reports_reset_time() {
        let limiter = limiter(3);
        let start = Instant::now();
        limiter.check_at("s1", "q", start).await.unwrap();

        let status = limiter.status_at("s1", start + Duration::from_secs(600)).await;
        assert_eq!(status.used, 1);
        assert_eq!(status.remaining, Some(2));
        assert_eq!(status.reset_in_secs, Some(3000));
    }

    #[tokio::test]
    async fn forget_clears_a_session() {
        let limiter = limiter(1);
        let now = Instant::now();
        limiter.check_at("s1", "q", now).await.unwrap();

        limiter.forget("s1").await;
        assert!(!limiter.is_tracking("s1").await);
        assert!(limiter.check_at("s1", "q", now).await.is_ok());
    }

    #[tokio::test]
    async fn expired_sessions_are_swept_on_check() {
        let limiter = limiter(3);
        let start = Instant::now();
        limiter.check_at("old", "q", start).await.unwrap();

        limiter
            .check_at("new", "q", start + WINDOW + Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!limiter.is_tracking("old").await);
        assert!(limiter.is_tracking("new").await);
    }

    #[tokio::test]
    async fn status_does_not_track_unknown_sessions() {
        let limiter = limiter(3);
        let status = limiter.status_at("nobody", Instant::now()).await;

        assert_eq!(status.used, 0);
        assert_eq!(status.reset_in_secs, None);
        assert!(!limiter.is_tracking("nobody").await);
    }

    #[tokio::test]
    async fn zero_quota_denies_without_tracking() {
        let limiter = limiter(0);
        assert!(limiter.check_at("s1", "q", Instant::now()).await.is_err());
        assert!(!limiter.is_tracking("s1").await);
    }

    #[tokio::test]
    async fn disabled_limiter_allows_everything() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            max_queries_per_hour: 0,
            max_tokens_per_query: 0,
        });
        let status = limiter.check("s1", &"x".repeat(1000)).await.unwrap();
        assert!(!status.enabled);
        assert_eq!(status.remaining, None);
    }
}
