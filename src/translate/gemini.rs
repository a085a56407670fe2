//! Gemini-based translation using the Generative AI API.

use crate::error::{PolysubError, Result};
use crate::languages::language_name;
use crate::translate::{http_client, Translator};
use async_trait::async_trait;
use reqwest::Client;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Translator using Google Gemini API.
pub struct GeminiTranslator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiTranslator {
    /// Create a new Gemini translator with the given API key.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: "gemini-2.0-flash".to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Set a different model (e.g., "gemini-1.5-pro").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the prompt. Several texts are sent as `[n]`-numbered lines.
    fn build_prompt(&self, texts: &[&str], source_lang: Option<&str>, target_lang: &str) -> String {
        let target = language_name(target_lang).unwrap_or(target_lang);
        let mut prompt = match source_lang.and_then(language_name) {
            Some(source) => format!("You are a subtitle translator. Translate from {} to {}.\n", source, target),
            None => format!("You are a subtitle translator. Translate into {}.\n", target),
        };

        if let [text] = texts {
            prompt.push_str("Reply with the translation only. Keep line breaks as they are.\n\n");
            prompt.push_str(text);
        } else {
            prompt.push_str(
                "Each input line starts with a [n] marker. Reply with one translated line per marker, keeping the markers.\n\n",
            );
            for (i, text) in texts.iter().enumerate() {
                prompt.push_str(&format!("[{}] {}\n", i + 1, text));
            }
        }
        prompt
    }

    /// Split a numbered reply back into `count` texts.
    ///
    /// Text after each `[n]` marker runs until the next marker. Replies
    /// without usable markers fall back to one text per non-empty line.
    /// Missing entries come back empty.
    fn parse_batch_response(&self, response: &str, count: usize) -> Vec<String> {
        let mut results = vec![String::new(); count];
        let markers: Vec<_> = batch_marker().captures_iter(response).collect();

        let mut found = 0;
        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Ok(n) = number.as_str().parse::<usize>() else {
                continue;
            };
            if n == 0 || n > count {
                continue;
            }
            let text_end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(response.len());
            results[n - 1] = response[whole.end()..text_end].trim().to_string();
            found += 1;
        }

        if found < count {
            warn!(
                "Gemini reply had {} of {} numbered entries, splitting by line",
                found, count
            );
            let lines = response.lines().map(str::trim).filter(|l| !l.is_empty());
            results = lines.map(str::to_string).take(count).collect();
            results.resize(count, String::new());
        }

        results
    }
}

fn batch_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?m)^\s*\[(\d+)\]").expect("batch marker pattern is valid"))
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn reply_text(self) -> String {
        self.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .map(|parts| parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponseContent {
    parts: Option<Vec<GeminiResponsePart>>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate_batch(
        &self,
        texts: &[&str],
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Gemini: translating {} text(s) to {}", texts.len(), target_lang);

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: self.build_prompt(texts, source_lang, target_lang),
                }],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| PolysubError::api("Gemini", None, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PolysubError::api("Gemini", None, e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(PolysubError::api("Gemini", Some(status.as_u16()), message));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&body)?;

        if let Some(error) = gemini_response.error {
            return Err(PolysubError::api("Gemini", None, error.message));
        }

        let reply = gemini_response.reply_text();
        if reply.trim().is_empty() {
            return Err(PolysubError::api(
                "Gemini",
                Some(status.as_u16()),
                "Empty reply from model",
            ));
        }

        match texts {
            [_] => Ok(vec![reply.trim().to_string()]),
            _ => Ok(self.parse_batch_response(&reply, texts.len())),
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
