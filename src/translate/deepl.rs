//! DeepL translation (`/v2/translate`).

use crate::error::{PolysubError, Result};
use crate::translate::{http_client, Translator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEEPL_API_BASE: &str = "https://api.deepl.com";
const DEEPL_FREE_API_BASE: &str = "https://api-free.deepl.com";

pub struct DeeplTranslator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl DeeplTranslator {
    /// Keys ending in `:fx` belong to the free plan and use the free host.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let base_url = if api_key.ends_with(":fx") {
            DEEPL_FREE_API_BASE
        } else {
            DEEPL_API_BASE
        };
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            base_url: base_url.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// DeepL target codes are upper case and distinguish Chinese scripts.
fn target_code(lang: &str) -> String {
    match lang.to_lowercase().as_str() {
        "zh" | "zh-cn" | "zh-hans" => "ZH-HANS".to_string(),
        "zh-tw" | "zh-hant" => "ZH-HANT".to_string(),
        other => other.to_uppercase(),
    }
}

/// Source codes take only the base language.
fn source_code(lang: &str) -> Option<String> {
    match lang {
        "" | "auto" | "unknown" => None,
        other => other.split('-').next().map(str::to_uppercase),
    }
}

#[derive(Serialize)]
struct DeeplRequest<'a> {
    text: &'a [&'a str],
    target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
}

#[derive(Deserialize, Debug)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Deserialize, Debug)]
struct DeeplTranslation {
    text: String,
}

#[derive(Deserialize, Debug)]
struct DeeplErrorResponse {
    message: String,
}

#[async_trait]
impl Translator for DeeplTranslator {
    async fn translate_batch(
        &self,
        texts: &[&str],
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("DeepL: translating {} text(s) to {}", texts.len(), target_lang);

        let request = DeeplRequest {
            text: texts,
            target_lang: target_code(target_lang),
            source_lang: source_lang.and_then(source_code),
        };

        let response = self
            .client
            .post(format!("{}/v2/translate", self.base_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| PolysubError::api("DeepL", None, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PolysubError::api("DeepL", None, e.to_string()))?;

        if !status.is_success() {
            // 456 is DeepL's quota exceeded status
            let message = serde_json::from_str::<DeeplErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(PolysubError::api("DeepL", Some(status.as_u16()), message));
        }

        let parsed: DeeplResponse = serde_json::from_str(&body)?;
        if parsed.translations.len() != texts.len() {
            return Err(PolysubError::api(
                "DeepL",
                Some(status.as_u16()),
                format!(
                    "Expected {} translations, got {}",
                    texts.len(),
                    parsed.translations.len()
                ),
            ));
        }

        Ok(parsed
            .translations
            .into_iter()
            .map(|t| t.text.trim().to_string())
            .collect())
    }

    fn name(&self) -> &'static str {
        "deepl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_key_uses_free_host() {
        let free = DeeplTranslator::new("abc:fx".to_string(), Duration::from_secs(5)).unwrap();
        assert_eq!(free.base_url, DEEPL_FREE_API_BASE);

        let pro = DeeplTranslator::new("abc".to_string(), Duration::from_secs(5)).unwrap();
        assert_eq!(pro.base_url, DEEPL_API_BASE);
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(target_code("fr"), "FR");
        assert_eq!(target_code("zh-CN"), "ZH-HANS");
        assert_eq!(target_code("zh-TW"), "ZH-HANT");
        assert_eq!(target_code("pt-BR"), "PT-BR");
        assert_eq!(source_code("zh-CN").as_deref(), Some("ZH"));
        assert_eq!(source_code("auto"), None);
    }
}
