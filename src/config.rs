use std::env;

use crate::rate_limit::RateLimitConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub leetcode_graphql_url: String,
    pub insecure_ssl: bool,
    pub google_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub rate_limit: RateLimitConfig,
    pub chat_history_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            leetcode_graphql_url: env::var("LEETCODE_GRAPHQL_URL")
                .unwrap_or_else(|_| "https://leetcode.com/graphql".to_string()),
            insecure_ssl: env::var("DSA_TUTOR_INSECURE_SSL").as_deref() == Ok("1"),
            google_api_key: env::var("GOOGLE_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            gemini_base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            rate_limit: RateLimitConfig {
                enabled: env::var("ENABLE_RATE_LIMITING")
                    .ok()
                    .map(|v| parse_flag(&v))
                    .unwrap_or(true),
                max_queries_per_hour: parse_or("MAX_QUERIES_PER_HOUR", 30),
                max_tokens_per_query: parse_or("MAX_TOKENS_PER_QUERY", 2000),
            },
            chat_history_limit: parse_or("CHAT_HISTORY_LIMIT", 10),
        }
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            leetcode_graphql_url: "http://127.0.0.1:9/graphql".to_string(),
            insecure_ssl: false,
            google_api_key: None,
            gemini_base_url: "http://127.0.0.1:9/v1beta".to_string(),
            gemini_model: "gemini-test".to_string(),
            rate_limit: RateLimitConfig {
                enabled: true,
                max_queries_per_hour: 5,
                max_tokens_per_query: 100,
            },
            chat_history_limit: 10,
        }
    }
}

fn parse_or(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_common_spellings() {
        assert!(parse_flag("1"));
        assert!(parse_flag("true"));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(" False "));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn numeric_settings_fall_back_to_defaults() {
        assert_eq!(parse_or("DSA_TUTOR_TEST_UNSET_NUMBER", 42), 42);
    }

    #[test]
    fn config_from_env_with_defaults() {
        let config = AppConfig::from_env();

        assert!(!config.bind_addr.is_empty());
        assert!(config.leetcode_graphql_url.starts_with("http"));
        assert!(!config.gemini_model.is_empty());
    }
}
