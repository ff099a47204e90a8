//! Tag suggestion
//!
//! Turns a free-text task description into up to [`MAX_TAGS`] descriptive
//! tags. Suggestions are advisory and independent of task creation.
//!
//! Two providers:
//! - [`KeywordSuggester`]: local and deterministic, ranks the description's
//!   own words by frequency.
//! - [`LlmSuggester`]: asks an OpenAI-compatible chat-completions endpoint.
//!
//! A provider that cannot produce an answer reports
//! [`SuggestError::Unavailable`]; it never makes tags up.

use crate::config::{SuggestConfig, SuggestProvider};
use crate::models::{normalize_tags, MAX_TAGS};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Error types for tag suggestion
#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider failed; the caller may retry later
    #[error("Tag suggestion unavailable: {0}")]
    Unavailable(String),
}

/// Text-to-tags transform
#[async_trait]
pub trait TagSuggester: Send + Sync {
    async fn suggest(&self, description: &str) -> Result<Vec<String>, SuggestError>;
}

fn require_description(description: &str) -> Result<&str, SuggestError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(SuggestError::Validation(
            "Description is required".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Build the configured suggester
pub fn build_suggester(config: &SuggestConfig) -> anyhow::Result<Arc<dyn TagSuggester>> {
    let max_tags = config.max_tags.clamp(1, MAX_TAGS);
    match config.provider {
        SuggestProvider::Keyword => Ok(Arc::new(KeywordSuggester::new(max_tags))),
        SuggestProvider::Llm => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| anyhow!("suggest.endpoint is required for the llm provider"))?;
            let suggester = LlmSuggester::new(
                endpoint,
                config.api_key.clone(),
                config.model.clone(),
                Duration::from_secs(config.timeout_secs),
                max_tags,
            )?;
            Ok(Arc::new(suggester))
        }
    }
}

// ============================================================================
// Keyword suggester
// ============================================================================

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "about", "after", "all", "also", "and", "any", "are", "because", "been", "before",
        "being", "but", "can", "could", "did", "does", "each", "for", "from", "get", "had",
        "has", "have", "her", "here", "his", "how", "into", "its", "just", "like", "more",
        "most", "need", "needs", "not", "now", "one", "only", "other", "our", "out", "over",
        "own", "please", "same", "she", "should", "some", "such", "than", "that", "the",
        "their", "them", "then", "there", "these", "they", "this", "those", "through", "too",
        "under", "until", "very", "want", "was", "way", "were", "what", "when", "where",
        "which", "while", "who", "why", "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Ranks the description's words by frequency, ties broken by first
/// occurrence.
#[derive(Debug, Clone)]
pub struct KeywordSuggester {
    max_tags: usize,
}

impl KeywordSuggester {
    pub fn new(max_tags: usize) -> Self {
        Self {
            max_tags: max_tags.clamp(1, MAX_TAGS),
        }
    }

    fn extract(&self, description: &str) -> Vec<String> {
        let lowered = description.to_lowercase();

        // word -> (count, first position)
        let mut stats: HashMap<&str, (usize, usize)> = HashMap::new();
        let words = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(w));
        for (position, word) in words.enumerate() {
            stats.entry(word).or_insert((0, position)).0 += 1;
        }

        let mut ranked: Vec<(&str, usize, usize)> =
            stats.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        ranked
            .into_iter()
            .take(self.max_tags)
            .map(|(word, _, _)| word.to_string())
            .collect()
    }
}

impl Default for KeywordSuggester {
    fn default() -> Self {
        Self::new(MAX_TAGS)
    }
}

#[async_trait]
impl TagSuggester for KeywordSuggester {
    async fn suggest(&self, description: &str) -> Result<Vec<String>, SuggestError> {
        let description = require_description(description)?;
        Ok(self.extract(description))
    }
}

// ============================================================================
// LLM suggester
// ============================================================================

const SYSTEM_PROMPT: &str = "You suggest meta tags that help people categorize and find \
collaborative tasks. Reply with a JSON array of at most 5 short strings and nothing else.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Suggests tags through an OpenAI-compatible chat-completions endpoint.
///
/// `endpoint` is the full URL of the completions resource, e.g.
/// `https://api.openai.com/v1/chat/completions`.
pub struct LlmSuggester {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tags: usize,
}

impl std::fmt::Debug for LlmSuggester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSuggester")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmSuggester {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
        max_tags: usize,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            max_tags: max_tags.clamp(1, MAX_TAGS),
        })
    }

    fn user_prompt(description: &str) -> String {
        format!(
            "Suggest up to 5 meta tags for the task below. Focus on the task's purpose, \
             the skills it requires or its target audience.\n\nTask description: {}",
            description
        )
    }
}

#[async_trait]
impl TagSuggester for LlmSuggester {
    async fn suggest(&self, description: &str) -> Result<Vec<String>, SuggestError> {
        let description = require_description(description)?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::user_prompt(description),
                },
            ],
            temperature: 0.2,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Tag suggestion request failed");
            SuggestError::Unavailable("suggestion provider unreachable".to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Tag suggestion provider returned an error");
            return Err(SuggestError::Unavailable(format!(
                "suggestion provider returned {}",
                status.as_u16()
            )));
        }

        let reply: ChatResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Tag suggestion response was not valid JSON");
            SuggestError::Unavailable("unreadable suggestion response".to_string())
        })?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let tags = parse_tag_array(&content, self.max_tags).ok_or_else(|| {
            tracing::warn!("Tag suggestion provider returned no tag array");
            SuggestError::Unavailable("unreadable suggestion response".to_string())
        })?;
        Ok(tags)
    }
}

/// Pull a JSON string array out of a model reply, tolerating surrounding
/// prose or code fences. Result is normalized and cut to `max_tags`.
fn parse_tag_array(content: &str, max_tags: usize) -> Option<Vec<String>> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end < start {
        return None;
    }

    let raw: Vec<String> = serde_json::from_str(&content[start..=end]).ok()?;
    let mut tags = normalize_tags(raw);
    tags.truncate(max_tags);
    Some(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_ranks_by_frequency_then_first_occurrence() {
        let suggester = KeywordSuggester::default();
        let tags = suggester
            .suggest(
                "Garden cleanup: bring gloves. The garden needs weeding; \
                 gloves provided for garden volunteers.",
            )
            .await
            .unwrap();

        assert_eq!(
            tags,
            vec!["garden", "gloves", "cleanup", "bring", "weeding"]
        );
    }

    #[tokio::test]
    async fn test_keyword_drops_short_words_and_stop_words() {
        let suggester = KeywordSuggester::default();
        let tags = suggester.suggest("We go to the zoo and the park").await.unwrap();
        assert_eq!(tags, vec!["zoo", "park"]);
    }

    #[tokio::test]
    async fn test_keyword_respects_max_tags() {
        let suggester = KeywordSuggester::new(2);
        let tags = suggester
            .suggest("alpha beta gamma delta epsilon zeta")
            .await
            .unwrap();
        assert_eq!(tags, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_keyword_never_exceeds_limit() {
        let suggester = KeywordSuggester::new(50);
        let tags = suggester
            .suggest("one1 two2 three four five six seven eight")
            .await
            .unwrap();
        assert_eq!(tags.len(), MAX_TAGS);
    }

    #[tokio::test]
    async fn test_empty_description_is_validation_error() {
        let suggester = KeywordSuggester::default();
        assert!(matches!(
            suggester.suggest("   ").await,
            Err(SuggestError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_tag_array_plain_and_fenced() {
        assert_eq!(
            parse_tag_array(r#"["rust", "backend"]"#, 5),
            Some(vec!["rust".to_string(), "backend".to_string()])
        );
        assert_eq!(
            parse_tag_array("```json\n[\"a\", \" a \", \"b\"]\n```", 5),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_parse_tag_array_truncates() {
        let tags = parse_tag_array(r#"["a","b","c","d","e","f","g"]"#, 5).unwrap();
        assert_eq!(tags.len(), 5);
    }

    #[test]
    fn test_parse_tag_array_rejects_garbage() {
        assert_eq!(parse_tag_array("no tags here", 5), None);
        assert_eq!(parse_tag_array("[1, 2, 3]", 5), None);
        assert_eq!(parse_tag_array("] oops [", 5), None);
    }

    #[tokio::test]
    async fn test_llm_unreachable_is_unavailable() {
        // Port 9 (discard) is closed on test machines
        let suggester = LlmSuggester::new(
            "http://127.0.0.1:9/v1/chat/completions".to_string(),
            None,
            "test-model".to_string(),
            Duration::from_secs(2),
            5,
        )
        .unwrap();

        assert!(matches!(
            suggester.suggest("Organize a hackathon").await,
            Err(SuggestError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_llm_empty_description_skips_request() {
        let suggester = LlmSuggester::new(
            "http://127.0.0.1:9/v1/chat/completions".to_string(),
            None,
            "test-model".to_string(),
            Duration::from_secs(2),
            5,
        )
        .unwrap();

        assert!(matches!(
            suggester.suggest("").await,
            Err(SuggestError::Validation(_))
        ));
    }

    #[test]
    fn test_build_suggester_llm_requires_endpoint() {
        let config = SuggestConfig {
            provider: SuggestProvider::Llm,
            endpoint: None,
            ..SuggestConfig::default()
        };
        assert!(build_suggester(&config).is_err());
        assert!(build_suggester(&SuggestConfig::default()).is_ok());
    }
}
