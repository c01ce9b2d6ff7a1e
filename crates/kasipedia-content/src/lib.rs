//! Content collaborator client.
//!
//! One call to the Gemini `generateContent` endpoint with a structured
//! response schema produces everything the homepage renders. Auth is via API
//! key in query parameter.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use kasipedia_core::config::Config;
use kasipedia_core::error::{KasipediaError, Result};
use kasipedia_core::types::HomepageData;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct ContentClient {
    pub base_url: String,
    client: reqwest::Client,
}

impl ContentClient {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Generate a fresh homepage model.
    ///
    /// Any failure — missing credential, network, non-2xx status, or a
    /// response that does not conform to the schema — surfaces as a single
    /// error; no partial model is ever returned.
    pub async fn fetch_homepage(&self, config: &Config) -> Result<HomepageData> {
        let api_key = config
            .resolve_api_key()
            .ok_or(KasipediaError::CredentialMissing)?;

        let today = chrono::Local::now().date_naive();
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": homepage_prompt(&today.format("%B %-d").to_string()) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": homepage_schema(),
                "temperature": config.content_temperature(),
            }
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            config.content_model(),
            api_key
        );

        debug!(model = %config.content_model(), "Requesting homepage content");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| KasipediaError::ContentFetch(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(KasipediaError::ContentFetch(format!(
                "content API error {status}: {body}"
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| KasipediaError::ContentFetch(e.to_string()))?;

        let text = parsed
            .first_text()
            .ok_or_else(|| KasipediaError::ContentFetch("response contained no text".into()))?;

        parse_homepage(&text)
    }
}

impl Default for ContentClient {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Parse the model's JSON text into the homepage model.
pub fn parse_homepage(text: &str) -> Result<HomepageData> {
    serde_json::from_str(text).map_err(|e| KasipediaError::ContentFetch(e.to_string()))
}

pub fn homepage_prompt(date: &str) -> String {
    format!(
        "Generate content for a Wikipedia-style homepage. It should be diverse, \
         educational, and engaging, just like a real encyclopedia front page. \
         Today's date is {date}."
    )
}

/// Response schema forcing structured JSON output with the four homepage
/// sections.
pub fn homepage_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "featured_article": {
                "type": "OBJECT",
                "properties": {
                    "title": { "type": "STRING", "description": "Title of a fascinating, obscure, or highly important encyclopedia article." },
                    "summary": { "type": "STRING", "description": "A 2-3 sentence engaging summary of the article." },
                    "image_seed": { "type": "STRING", "description": "A single keyword related to the article to use as an image seed (e.g., 'castle', 'microscope', 'jazz')." }
                },
                "required": ["title", "summary", "image_seed"]
            },
            "in_the_news": {
                "type": "ARRAY",
                "description": "4 current or recent major news headlines.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "headline": { "type": "STRING" },
                        "context": { "type": "STRING", "description": "One sentence of context for the headline." }
                    },
                    "required": ["headline", "context"]
                }
            },
            "did_you_know": {
                "type": "ARRAY",
                "description": "5 interesting, lesser-known facts.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "fact": { "type": "STRING", "description": "The fact itself, phrased as a continuation of 'Did you know...'." },
                        "topic": { "type": "STRING", "description": "The main subject of the fact." }
                    },
                    "required": ["fact", "topic"]
                }
            },
            "on_this_day": {
                "type": "ARRAY",
                "description": "5 historical events that happened on roughly this date in history.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "year": { "type": "STRING", "description": "The year of the event." },
                        "event": { "type": "STRING", "description": "A concise description of the event." }
                    },
                    "required": ["year", "event"]
                }
            }
        },
        "required": ["featured_article", "in_the_news", "did_you_know", "on_this_day"]
    })
}

// --- Gemini response types ---

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate's parts, if any.
    fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_has_four_required_sections() {
        let schema = homepage_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
        for field in ["featured_article", "in_the_news", "did_you_know", "on_this_day"] {
            assert!(required.iter().any(|v| v == field));
            assert!(schema["properties"][field].is_object());
        }
    }

    #[test]
    fn test_prompt_embeds_date() {
        let prompt = homepage_prompt("March 3");
        assert!(prompt.contains("March 3"));
        assert!(prompt.contains("encyclopedia"));
    }

    #[test]
    fn test_response_text_extraction() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_empty_response_has_no_text() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.first_text().is_none());
    }

    #[test]
    fn test_parse_homepage_valid() {
        let text = r#"{
            "featured_article": {"title": "Tardigrade", "summary": "s", "image_seed": "microscope"},
            "in_the_news": [{"headline": "h1", "context": "c1"}, {"headline": "h2", "context": "c2"}],
            "did_you_know": [{"fact": "f", "topic": "t"}],
            "on_this_day": [{"year": "1903", "event": "e"}]
        }"#;
        let data = parse_homepage(text).unwrap();
        assert_eq!(data.featured_article.title, "Tardigrade");
        assert_eq!(data.in_the_news.len(), 2);
        assert_eq!(data.in_the_news[1].headline, "h2");
    }

    #[test]
    fn test_parse_homepage_malformed_is_content_fetch() {
        let err = parse_homepage("not json").unwrap_err();
        assert!(matches!(
            err,
            kasipedia_core::error::KasipediaError::ContentFetch(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let config = Config {
            provider: Some(kasipedia_core::config::ProviderConfig {
                api_key: None,
                api_key_env: Some("KASIPEDIA_CONTENT_TEST_UNSET".into()),
            }),
            ..Default::default()
        };
        let client = ContentClient::default();
        let err = client.fetch_homepage(&config).await.unwrap_err();
        assert!(matches!(
            err,
            kasipedia_core::error::KasipediaError::CredentialMissing
        ));
    }
}
