//! DeepSeek (OpenAI-compatible) chat-completions backend.
//!
//! Error mapping:
//!
//! | Condition | Kind |
//! |-----------|------|
//! | no API key configured | `Permanent` |
//! | HTTP 429 / 5xx, connect error, timeout | `Transient` |
//! | other 4xx (bad key, bad request) | `Permanent` |
//! | malformed or truncated body, no choices | `Transient` |

use super::TranslationBackend;
use crate::config::TranslatorConfig;
use crate::error::TranslationError;
use crate::utils::{looks_truncated, truncate_for_log};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct DeepSeekBackend {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
}

impl std::fmt::Debug for DeepSeekBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSeekBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DeepSeekBackend {
    pub fn new(config: &TranslatorConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        if config.api_key.is_none() {
            warn!("No translation API key configured; descriptions will be published untranslated");
        }
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn headers(&self, api_key: &str) -> Result<HeaderMap, TranslationError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| TranslationError::permanent("API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl TranslationBackend for DeepSeekBackend {
    #[instrument(level = "info", skip_all, fields(model = %self.model, target_lang = %target_lang))]
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(TranslationError::permanent("no API key configured"));
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(text, target_lang),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let t0 = Instant::now();
        let resp = self
            .http
            .post(self.endpoint())
            .headers(self.headers(api_key)?)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslationError::transient(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TranslationError::transient(format!("reading body failed: {e}")))?;
        debug!(
            status = status.as_u16(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = body.len(),
            "Translation response"
        );

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }
        parse_completion(&body)
    }
}

/// Human-readable name used in the prompt; unknown codes pass through.
pub fn language_name(code: &str) -> &str {
    match code.trim().to_ascii_lowercase().as_str() {
        "zh" | "zh-cn" | "zh-hans" => "Simplified Chinese",
        "zh-tw" | "zh-hant" => "Traditional Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "en" => "English",
        _ => code.trim(),
    }
}

pub fn build_prompt(text: &str, target_lang: &str) -> String {
    format!(
        "Translate the following English text into {}. Keep it professional and accurate. \
         Output only the translation of the text itself, with no notes, explanations or \
         translation strategy.\n\nOriginal: {}\n\nTranslation:",
        language_name(target_lang),
        text
    )
}

fn classify_status(status: u16, body: &str) -> TranslationError {
    let message = format!("HTTP {status}: {}", truncate_for_log(body, 200));
    if status == 429 || status >= 500 {
        TranslationError::transient(message)
    } else {
        TranslationError::permanent(message)
    }
}

/// Extract the first choice's text from a chat-completions body.
pub fn parse_completion(body: &str) -> Result<String, TranslationError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        let hint = if looks_truncated(&e) { " (truncated)" } else { "" };
        TranslationError::transient(format!(
            "malformed response{hint}: {e}: {}",
            truncate_for_log(body, 200)
        ))
    })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| TranslationError::transient("response has no choices"))?;

    let cleaned = strip_answer_prefix(content.trim());
    if cleaned.is_empty() {
        return Err(TranslationError::transient("response content is empty"));
    }
    Ok(cleaned.to_string())
}

/// Models sometimes echo the prompt's answer label.
fn strip_answer_prefix(s: &str) -> &str {
    for prefix in ["Translation:", "翻译：", "翻译:"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return rest.trim();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_the_language() {
        let p = build_prompt("A fast web framework", "zh");
        assert!(p.contains("into Simplified Chinese"));
        assert!(p.contains("Original: A fast web framework"));
        assert!(p.ends_with("Translation:"));
        assert!(build_prompt("x", "nl").contains("into nl."));
    }

    #[test]
    fn test_parse_completion_strips_label() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  翻译：一个快速的 Web 框架 "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "一个快速的 Web 框架");
    }

    #[test]
    fn test_empty_choices_is_transient() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_truncated_body_is_transient() {
        let err = parse_completion(r#"{"choices":[{"message":{"content":"半"#).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(429, "slow down").is_transient());
        assert!(classify_status(503, "").is_transient());
        assert!(!classify_status(401, "bad key").is_transient());
        assert!(!classify_status(400, "bad request").is_transient());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_permanent() {
        let backend = DeepSeekBackend::new(&TranslatorConfig::default()).unwrap();
        let err = backend.translate("Hello", "zh").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
