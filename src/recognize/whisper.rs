use crate::config::RecognitionTask;
use crate::error::{PolysubError, Result};
use crate::languages::normalize_language;
use crate::recognize::{
    join_segments, secs, tighten_to_words, RecognitionResult, Recognizer, RecognizerOptions,
    Segment, WordTiming,
};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// OpenAI audio API base URL.
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Maximum upload size for the Whisper API (25 MB).
const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// OpenAI Whisper API client.
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    options: RecognizerOptions,
    retry: RetryPolicy,
}

impl WhisperClient {
    /// Create a new Whisper client with the given API key.
    ///
    /// A model of `base` or any other local whisper size maps to `whisper-1`.
    pub fn new(api_key: String, options: RecognizerOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
            options,
            retry: RetryPolicy::new(3, Duration::from_millis(1000)),
        }
    }

    /// Point the client at a different API host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_model(&self) -> &str {
        match self.options.model.as_str() {
            "tiny" | "base" | "small" | "medium" | "large" => "whisper-1",
            other => other,
        }
    }

    fn endpoint(&self) -> String {
        match self.options.task {
            RecognitionTask::Transcribe => format!("{}/audio/transcriptions", self.base_url),
            RecognitionTask::Translate => format!("{}/audio/translations", self.base_url),
        }
    }

    /// Build the multipart form for the API request.
    async fn build_form(&self, audio_path: &Path) -> Result<Form> {
        let file_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let mime_type = match audio_path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("webm") => "audio/webm",
            _ => "application/octet-stream",
        };

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.api_model().to_string())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        if self.options.enhanced_alignment {
            form = form.text("timestamp_granularities[]", "word");
        }

        // The translations endpoint always outputs English and takes no language hint
        if self.options.task == RecognitionTask::Transcribe {
            if let Some(ref lang) = self.options.language {
                form = form.text("language", lang.clone());
            }
        }

        Ok(form)
    }

    /// Make the API request (form is consumed, so the caller rebuilds it per attempt).
    async fn call_api(&self, form: Form) -> Result<WhisperResponse> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!("Whisper API response status: {}", status);

        let body = response.text().await?;

        if status.is_success() {
            debug!(
                "Whisper API response: {}",
                body.chars().take(500).collect::<String>()
            );
            return Ok(serde_json::from_str(&body)?);
        }

        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| format!("{} ({})", e.error.message, e.error.r#type))
            .unwrap_or(body);

        Err(PolysubError::api(
            "OpenAI Whisper",
            Some(status.as_u16()),
            message,
        ))
    }

    /// Convert the Whisper API response to a recognition result.
    fn parse_response(&self, response: WhisperResponse) -> RecognitionResult {
        let words: Vec<WordTiming> = response
            .words
            .unwrap_or_default()
            .into_iter()
            .map(|w| WordTiming {
                start: secs(w.start),
                end: secs(w.end),
            })
            .collect();

        let api_segments = response.segments.unwrap_or_default();

        let confidence = if api_segments.is_empty() {
            None
        } else {
            let sum: f64 = api_segments
                .iter()
                .map(|s| s.avg_logprob.unwrap_or(0.0).exp())
                .sum();
            Some((sum / api_segments.len() as f64).clamp(0.0, 1.0) as f32)
        };

        let mut segments: Vec<Segment> = api_segments
            .into_iter()
            .map(|seg| Segment::new(secs(seg.start), secs(seg.end), seg.text.trim()))
            .collect();

        if segments.is_empty() && !response.text.trim().is_empty() {
            // No segment breakdown: one segment spanning the whole audio
            segments.push(Segment::new(
                Duration::ZERO,
                secs(response.duration.unwrap_or(0.0)),
                response.text.trim(),
            ));
        }

        if self.options.enhanced_alignment && !words.is_empty() {
            for segment in &mut segments {
                tighten_to_words(segment, &words);
            }
        }

        let text = if segments.is_empty() {
            response.text.trim().to_string()
        } else {
            join_segments(&segments)
        };

        let language = match self.options.task {
            RecognitionTask::Translate => "en".to_string(),
            RecognitionTask::Transcribe => response
                .language
                .as_deref()
                .map(normalize_language)
                .or_else(|| self.options.language.clone())
                .unwrap_or_else(|| "unknown".to_string()),
        };

        RecognitionResult {
            text,
            language,
            segments,
            confidence,
        }
    }
}

#[async_trait]
impl Recognizer for WhisperClient {
    async fn recognize(&self, audio: &Path) -> Result<RecognitionResult> {
        let metadata = fs::metadata(audio).await.map_err(|e| {
            PolysubError::Recognition(format!("Cannot read {}: {}", audio.display(), e))
        })?;

        if metadata.len() > MAX_FILE_SIZE {
            return Err(PolysubError::Recognition(format!(
                "File too large for Whisper API: {} bytes (max {} bytes). Use a compressed audio_format or the whisper_cpp backend",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        info!("Recognizing {} with OpenAI Whisper", audio.display());

        let response = self
            .retry
            .run("whisper", |_| async {
                let form = self.build_form(audio).await?;
                self.call_api(form).await
            })
            .await
            .map_err(|failure| {
                PolysubError::Recognition(format!(
                    "{} (after {} retries)",
                    failure.error, failure.retries
                ))
            })?;

        let result = self.parse_response(response);
        debug!(
            "Whisper returned {} segments, language {}",
            result.segments.len(),
            result.language
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    words: Option<Vec<WhisperWord>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    r#type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(options: RecognizerOptions) -> WhisperClient {
        WhisperClient::new("test-key".to_string(), options)
    }

    #[test]
    fn test_api_model_mapping() {
        assert_eq!(client(RecognizerOptions::default()).api_model(), "whisper-1");
        let custom = RecognizerOptions {
            model: "gpt-4o-transcribe".to_string(),
            ..Default::default()
        };
        assert_eq!(client(custom).api_model(), "gpt-4o-transcribe");
    }

    #[test]
    fn test_endpoint_follows_task() {
        let transcribe = client(RecognizerOptions::default()).with_base_url("http://localhost:1/");
        assert_eq!(transcribe.endpoint(), "http://localhost:1/audio/transcriptions");

        let translate = client(RecognizerOptions {
            task: RecognitionTask::Translate,
            ..Default::default()
        });
        assert!(translate.endpoint().ends_with("/audio/translations"));
    }

    #[test]
    fn test_parse_response_with_segments() {
        let response: WhisperResponse = serde_json::from_str(
            r#"{
                "text": " Hello world. How are you?",
                "language": "english",
                "duration": 4.0,
                "segments": [
                    {"start": 0.0, "end": 2.0, "text": " Hello world.", "avg_logprob": -0.1},
                    {"start": 2.5, "end": 4.0, "text": " How are you?", "avg_logprob": -0.3}
                ]
            }"#,
        )
        .unwrap();

        let result = client(RecognizerOptions::default()).parse_response(response);
        assert_eq!(result.language, "en");
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].text, "Hello world.");
        assert_eq!(result.segments[1].start, Duration::from_millis(2500));
        assert_eq!(result.text, "Hello world. How are you?");
        let confidence = result.confidence.unwrap();
        assert!(confidence > 0.7 && confidence < 1.0);
    }

    #[test]
    fn test_parse_response_without_segments() {
        let response: WhisperResponse =
            serde_json::from_str(r#"{"text": "Hello world", "language": "en", "duration": 2.0}"#)
                .unwrap();

        let result = client(RecognizerOptions::default()).parse_response(response);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].start, Duration::ZERO);
        assert_eq!(result.segments[0].end, Duration::from_secs(2));
        assert!(result.confidence.is_none());
    }

    #[test]
    fn test_parse_response_enhanced_alignment() {
        let response: WhisperResponse = serde_json::from_str(
            r#"{
                "text": "Hi there",
                "language": "en",
                "segments": [{"start": 0.0, "end": 3.0, "text": "Hi there"}],
                "words": [
                    {"word": "Hi", "start": 0.4, "end": 0.7},
                    {"word": "there", "start": 0.8, "end": 1.6}
                ]
            }"#,
        )
        .unwrap();

        let options = RecognizerOptions {
            enhanced_alignment: true,
            ..Default::default()
        };
        let result = client(options).parse_response(response);
        assert_eq!(result.segments[0].start, Duration::from_millis(400));
        assert_eq!(result.segments[0].end, Duration::from_millis(1600));
    }

    #[test]
    fn test_translate_task_reports_english() {
        let response: WhisperResponse =
            serde_json::from_str(r#"{"text": "Good morning", "language": "japanese"}"#).unwrap();
        let options = RecognizerOptions {
            task: RecognitionTask::Translate,
            ..Default::default()
        };
        assert_eq!(client(options).parse_response(response).language, "en");
    }

    #[tokio::test]
    async fn test_missing_audio_file() {
        let result = client(RecognizerOptions::default())
            .recognize(Path::new("/tmp/polysub_nonexistent_audio.wav"))
            .await;
        assert!(matches!(result, Err(PolysubError::Recognition(_))));
    }
}
