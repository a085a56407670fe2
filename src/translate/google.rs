//! Google Cloud Translation (v2 REST API).

use crate::error::{PolysubError, Result};
use crate::translate::{http_client, Translator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const GOOGLE_API_BASE: &str = "https://translation.googleapis.com";

pub struct GoogleTranslator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            base_url: GOOGLE_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct GoogleRequest<'a> {
    q: &'a [&'a str],
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    format: &'static str,
}

#[derive(Deserialize, Debug)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Deserialize, Debug)]
struct GoogleData {
    translations: Vec<GoogleTranslation>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
}

#[derive(Deserialize, Debug)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Deserialize, Debug)]
struct GoogleError {
    message: String,
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate_batch(
        &self,
        texts: &[&str],
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Google: translating {} text(s) to {}", texts.len(), target_lang);

        let request = GoogleRequest {
            q: texts,
            target: target_lang,
            source: source_lang.filter(|s| *s != "auto" && *s != "unknown"),
            format: "text",
        };

        let url = format!("{}/language/translate/v2", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| PolysubError::api("Google Translate", None, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PolysubError::api("Google Translate", None, e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GoogleErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(PolysubError::api(
                "Google Translate",
                Some(status.as_u16()),
                message,
            ));
        }

        let parsed: GoogleResponse = serde_json::from_str(&body)?;
        if parsed.data.translations.len() != texts.len() {
            return Err(PolysubError::api(
                "Google Translate",
                Some(status.as_u16()),
                format!(
                    "Expected {} translations, got {}",
                    texts.len(),
                    parsed.data.translations.len()
                ),
            ));
        }

        Ok(parsed
            .data
            .translations
            .into_iter()
            .map(|t| t.translated_text.trim().to_string())
            .collect())
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_auto_source() {
        let texts = ["Hello"];
        let request = GoogleRequest {
            q: &texts,
            target: "fr",
            source: None,
            format: "text",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["q"][0], "Hello");
        assert_eq!(json["target"], "fr");
        assert!(json.get("source").is_none());
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"data":{"translations":[{"translatedText":"Bonjour","detectedSourceLanguage":"en"}]}}"#;
        let parsed: GoogleResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.translations[0].translated_text, "Bonjour");
    }

    #[test]
    fn test_base_url_override() {
        let translator = GoogleTranslator::new("k".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://127.0.0.1:9000/");
        assert_eq!(translator.base_url, "http://127.0.0.1:9000");
        assert_eq!(translator.name(), "google");
    }
}
