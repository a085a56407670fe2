pub mod whisper;
pub mod whisper_cpp;

pub use whisper::WhisperClient;
pub use whisper_cpp::WhisperCppRecognizer;

use crate::config::{Config, RecognitionBackend, RecognitionTask};
use crate::error::{PolysubError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// A time-stamped piece of recognized speech.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl Segment {
    pub fn new(start: Duration, end: Duration, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Output of the recognition stage for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// Full transcript in segment order.
    pub text: String,
    /// Detected source language code.
    pub language: String,
    pub segments: Vec<Segment>,
    pub confidence: Option<f32>,
}

impl RecognitionResult {
    /// End of the last segment.
    pub fn duration(&self) -> Duration {
        self.segments
            .iter()
            .map(|s| s.end)
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

/// Word-level timing used to tighten segment bounds.
#[derive(Debug, Clone)]
pub struct WordTiming {
    pub start: Duration,
    pub end: Duration,
}

/// Options passed to a recognizer.
#[derive(Debug, Clone)]
pub struct RecognizerOptions {
    pub model: String,
    pub device: String,
    /// Source language hint, `None` to auto-detect.
    pub language: Option<String>,
    pub task: RecognitionTask,
    /// Request word timestamps and snap segment bounds to them.
    pub enhanced_alignment: bool,
}

impl Default for RecognizerOptions {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            device: "cpu".to_string(),
            language: None,
            task: RecognitionTask::Transcribe,
            enhanced_alignment: false,
        }
    }
}

impl RecognizerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.speech_recognition_model.clone(),
            device: config.speech_recognition_device.clone(),
            language: config.recognition_language.clone(),
            task: config.recognition_task,
            enhanced_alignment: config.enhanced_alignment,
        }
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, audio: &Path) -> Result<RecognitionResult>;
    fn name(&self) -> &'static str;
}

/// Create the recognizer selected by the configuration.
pub fn create_recognizer(config: &Config) -> Result<Box<dyn Recognizer>> {
    let options = RecognizerOptions::from_config(config);
    match config.recognition_backend {
        RecognitionBackend::WhisperCpp => Ok(Box::new(
            WhisperCppRecognizer::new(options)
                .with_binary(config.whisper_cpp_binary.clone())
                .with_model_dir(config.whisper_model_dir.clone()),
        )),
        RecognitionBackend::OpenAi => {
            let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
                PolysubError::Config(
                    "OpenAI API key not set. Set OPENAI_API_KEY environment variable.".to_string(),
                )
            })?;
            Ok(Box::new(WhisperClient::new(api_key.clone(), options)))
        }
    }
}

/// Convert recognizer seconds to a `Duration`, treating negative or invalid values as zero.
pub(crate) fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

/// Snap a segment's bounds to the first and last word spoken inside it.
///
/// Segment boundaries from the decoder often include leading or trailing
/// silence; word timings are tighter. Words outside the segment are ignored
/// and a segment with no words keeps its original bounds.
pub(crate) fn tighten_to_words(segment: &mut Segment, words: &[WordTiming]) {
    let inside: Vec<&WordTiming> = words
        .iter()
        .filter(|w| w.start >= segment.start && w.end <= segment.end && w.end > w.start)
        .collect();

    let (Some(first), Some(last)) = (inside.first(), inside.last()) else {
        return;
    };

    if first.start < last.end {
        segment.start = first.start;
        segment.end = last.end;
    }
}

/// Join segment texts into the full transcript.
pub(crate) fn join_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_secs_conversion() {
        assert_eq!(secs(1.5), ms(1500));
        assert_eq!(secs(-3.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_tighten_to_words() {
        let mut segment = Segment::new(ms(0), ms(4000), "hello there");
        let words = vec![
            WordTiming {
                start: ms(600),
                end: ms(1100),
            },
            WordTiming {
                start: ms(1200),
                end: ms(3100),
            },
            // Belongs to the next segment
            WordTiming {
                start: ms(4100),
                end: ms(4500),
            },
        ];

        tighten_to_words(&mut segment, &words);
        assert_eq!(segment.start, ms(600));
        assert_eq!(segment.end, ms(3100));
    }

    #[test]
    fn test_tighten_without_words_keeps_bounds() {
        let mut segment = Segment::new(ms(1000), ms(2000), "music");
        tighten_to_words(&mut segment, &[]);
        assert_eq!(segment.start, ms(1000));
        assert_eq!(segment.end, ms(2000));
    }

    #[test]
    fn test_join_segments() {
        let segments = vec![
            Segment::new(ms(0), ms(1000), " Hello"),
            Segment::new(ms(1000), ms(2000), "  "),
            Segment::new(ms(2000), ms(3000), " world "),
        ];
        assert_eq!(join_segments(&segments), "Hello world");
    }

    #[test]
    fn test_result_duration() {
        let result = RecognitionResult {
            text: "a b".to_string(),
            language: "en".to_string(),
            segments: vec![
                Segment::new(ms(0), ms(1000), "a"),
                Segment::new(ms(1000), ms(2500), "b"),
            ],
            confidence: None,
        };
        assert_eq!(result.duration(), ms(2500));
    }

    #[test]
    fn test_create_openai_recognizer_requires_key() {
        let config = Config {
            recognition_backend: RecognitionBackend::OpenAi,
            openai_api_key: None,
            ..Default::default()
        };
        assert!(create_recognizer(&config).is_err());

        let config = Config {
            recognition_backend: RecognitionBackend::OpenAi,
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert_eq!(create_recognizer(&config).unwrap().name(), "OpenAI Whisper");
    }

    #[test]
    fn test_create_whisper_cpp_recognizer() {
        let config = Config::default();
        assert_eq!(create_recognizer(&config).unwrap().name(), "whisper.cpp");
    }
}
