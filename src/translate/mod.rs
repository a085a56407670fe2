pub mod deepl;
pub mod gemini;
pub mod google;

pub use deepl::DeeplTranslator;
pub use gemini::GeminiTranslator;
pub use google::GoogleTranslator;

use crate::config::{Config, TranslationService};
use crate::error::{PolysubError, Result};
use crate::languages::uses_word_spacing;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A translated transcript for one target language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub service: String,
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate several texts in one request, preserving order.
    async fn translate_batch(
        &self,
        texts: &[&str],
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Vec<String>>;

    fn name(&self) -> &'static str;

    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<TranslationResult> {
        let translated = self
            .translate_batch(&[text], source_lang, target_lang)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        Ok(TranslationResult {
            original_text: text.to_string(),
            translated_text: translated,
            source_lang: source_lang.unwrap_or("auto").to_string(),
            target_lang: target_lang.to_string(),
            service: self.name().to_string(),
        })
    }
}

/// Create the translator selected by the configuration.
pub fn create_translator(config: &Config) -> Result<Arc<dyn Translator>> {
    let api_key = config.translation_api_key.clone().ok_or_else(|| {
        PolysubError::Config(format!(
            "No API key for the {} translation service. Set POLYSUB_TRANSLATION_API_KEY or translation_api_key",
            config.translation_service
        ))
    })?;
    let timeout = config.translation_timeout();

    let translator: Arc<dyn Translator> = match config.translation_service {
        TranslationService::Google => Arc::new(GoogleTranslator::new(api_key, timeout)?),
        TranslationService::Deepl => Arc::new(DeeplTranslator::new(api_key, timeout)?),
        TranslationService::Gemini => Arc::new(GeminiTranslator::new(api_key, timeout)?),
    };
    Ok(translator)
}

/// Build an HTTP client with the request timeout every translator uses.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Translate a whole transcript with bounded retry.
///
/// Blank text is returned as-is without calling the service. Text longer
/// than `max_chars` is split at natural boundaries and sent as one batch.
pub async fn translate_text(
    translator: &dyn Translator,
    text: &str,
    source_lang: Option<&str>,
    target_lang: &str,
    retry: &RetryPolicy,
    max_chars: usize,
) -> Result<TranslationResult> {
    let service = translator.name().to_string();
    let source = source_lang.unwrap_or("auto").to_string();

    if text.trim().is_empty() {
        return Ok(TranslationResult {
            original_text: text.to_string(),
            translated_text: text.to_string(),
            source_lang: source,
            target_lang: target_lang.to_string(),
            service,
        });
    }

    let pieces = split_for_request(text, max_chars);
    debug!(
        "Translating {} chars to {} in {} piece(s) via {}",
        text.chars().count(),
        target_lang,
        pieces.len(),
        service
    );
    let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
    let label = format!("{} -> {}", service, target_lang);

    let translated = retry
        .run(&label, |_| translator.translate_batch(&refs, source_lang, target_lang))
        .await
        .map_err(|failure| PolysubError::Translation {
            target: target_lang.to_string(),
            retries: failure.retries,
            source: Box::new(failure.error),
        })?;

    let separator = if uses_word_spacing(target_lang) { " " } else { "" };
    Ok(TranslationResult {
        original_text: text.to_string(),
        translated_text: translated.join(separator),
        source_lang: source,
        target_lang: target_lang.to_string(),
        service,
    })
}

/// Split text into pieces of at most `max_chars` characters.
///
/// Prefers the last sentence end, then the last comma, then the last space
/// within the window; falls back to a hard cut.
pub fn split_for_request(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_chars {
            pieces.push(remaining.to_string());
            break;
        }

        let byte_limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..byte_limit];

        let cut = match find_split_point(window) {
            Some(pos) => {
                // Keep the boundary character with the left piece
                let width = window[pos..].chars().next().map_or(1, char::len_utf8);
                pos + width
            }
            None => byte_limit,
        };

        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = remaining[cut..].trim_start();
    }

    pieces
}

fn find_split_point(window: &str) -> Option<usize> {
    let last_of = |pred: fn(char) -> bool| {
        window
            .char_indices()
            .filter(|(_, c)| pred(*c))
            .map(|(i, _)| i)
            .last()
    };

    last_of(|c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'))
        .or_else(|| last_of(|c| matches!(c, ',' | '，' | '、')))
        .or_else(|| last_of(char::is_whitespace))
        .filter(|&pos| pos > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Uppercases input; fails the first `failures` calls with a 503.
    struct FlakyTranslator {
        failures: u32,
        calls: AtomicU32,
        batches: Mutex<Vec<usize>>,
    }

    impl FlakyTranslator {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Translator for FlakyTranslator {
        async fn translate_batch(
            &self,
            texts: &[&str],
            _source_lang: Option<&str>,
            _target_lang: &str,
        ) -> Result<Vec<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(PolysubError::api("flaky", Some(503), "try later"));
            }
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| t.to_uppercase()).collect())
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[test]
    fn test_split_short_text_is_single_piece() {
        assert_eq!(split_for_request("  short text ", 100), vec!["short text"]);
        assert!(split_for_request("   ", 100).is_empty());
    }

    #[test]
    fn test_split_prefers_sentence_end() {
        let pieces = split_for_request("One two. Three four, five six", 20);
        assert_eq!(pieces[0], "One two.");
        assert!(pieces.iter().all(|p| p.chars().count() <= 20));
    }

    #[test]
    fn test_split_falls_back_to_comma_then_space() {
        let pieces = split_for_request("alpha beta, gamma delta epsilon", 15);
        assert_eq!(pieces[0], "alpha beta,");

        let pieces = split_for_request("alpha beta gamma", 12);
        assert_eq!(pieces, vec!["alpha beta", "gamma"]);
    }

    #[test]
    fn test_split_hard_cut_and_multibyte() {
        let pieces = split_for_request("日本語のテキストです", 4);
        assert_eq!(pieces, vec!["日本語の", "テキスト", "です"]);
    }

    #[tokio::test]
    async fn test_default_translate_wraps_batch() {
        let translator = FlakyTranslator::new(0);
        let result = translator.translate("hola", Some("es"), "en").await.unwrap();
        assert_eq!(result.translated_text, "HOLA");
        assert_eq!(result.source_lang, "es");
        assert_eq!(result.service, "flaky");
    }

    #[tokio::test]
    async fn test_translate_text_retries_then_succeeds() {
        let translator = FlakyTranslator::new(2);
        let retry = RetryPolicy::new(3, Duration::ZERO);
        let result = translate_text(&translator, "hello", Some("en"), "fr", &retry, 5000)
            .await
            .unwrap();
        assert_eq!(result.translated_text, "HELLO");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_translate_text_reports_retry_count() {
        let translator = FlakyTranslator::new(10);
        let retry = RetryPolicy::new(2, Duration::ZERO);
        let err = translate_text(&translator, "hello", None, "de", &retry, 5000)
            .await
            .unwrap_err();
        assert_eq!(translator.calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("failed after 2 retries"));
    }

    #[tokio::test]
    async fn test_pieces_rejoined_per_target_script() {
        let translator = FlakyTranslator::new(0);
        let retry = RetryPolicy::none();

        let ja = translate_text(&translator, "日本語のテキストです", None, "ja", &retry, 4)
            .await
            .unwrap();
        assert_eq!(ja.translated_text, "日本語のテキストです");

        let fr = translate_text(&translator, "alpha beta gamma", None, "fr", &retry, 12)
            .await
            .unwrap();
        assert_eq!(fr.translated_text, "ALPHA BETA GAMMA");
        assert_eq!(*translator.batches.lock().unwrap(), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_translation_error_keeps_service_error_as_source() {
        use std::error::Error as _;

        let translator = FlakyTranslator::new(10);
        let err = translate_text(&translator, "hello", None, "it", &RetryPolicy::none(), 5000)
            .await
            .unwrap_err();

        assert!(matches!(err, PolysubError::Translation { retries: 0, .. }));
        assert_eq!(err.source().unwrap().to_string(), "flaky API error: try later");
    }

    #[tokio::test]
    async fn test_blank_text_skips_service() {
        let translator = FlakyTranslator::new(0);
        let result = translate_text(&translator, "  ", None, "ja", &RetryPolicy::none(), 5000)
            .await
            .unwrap();
        assert_eq!(result.translated_text, "  ");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_long_text_is_batched_and_joined() {
        let translator = FlakyTranslator::new(0);
        let result = translate_text(
            &translator,
            "first part. second part.",
            None,
            "en",
            &RetryPolicy::none(),
            12,
        )
        .await
        .unwrap();
        assert_eq!(result.translated_text, "FIRST PART. SECOND PART.");
        assert_eq!(*translator.batches.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_create_translator_requires_key() {
        let config = Config::default();
        assert!(matches!(
            create_translator(&config),
            Err(PolysubError::Config(_))
        ));

        let config = Config {
            translation_service: TranslationService::Deepl,
            translation_api_key: Some("key:fx".to_string()),
            ..Default::default()
        };
        assert_eq!(create_translator(&config).unwrap().name(), "deepl");
    }
}
