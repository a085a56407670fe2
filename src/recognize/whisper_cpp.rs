use crate::config::RecognitionTask;
use crate::error::{PolysubError, Result};
use crate::languages::normalize_language;
use crate::recognize::{
    join_segments, tighten_to_words, RecognitionResult, Recognizer, RecognizerOptions, Segment,
    WordTiming,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs the whisper.cpp command line tool and reads its JSON output.
pub struct WhisperCppRecognizer {
    options: RecognizerOptions,
    binary: String,
    model_dir: PathBuf,
}

impl WhisperCppRecognizer {
    pub fn new(options: RecognizerOptions) -> Self {
        Self {
            options,
            binary: "whisper-cli".to_string(),
            model_dir: PathBuf::from("./models"),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    /// Model file for the configured model: a path is used as-is, a bare
    /// name like `base` resolves to `<model_dir>/ggml-base.bin`.
    pub fn resolve_model(&self) -> PathBuf {
        let model = Path::new(&self.options.model);
        if model.extension().is_some() || model.components().count() > 1 {
            model.to_path_buf()
        } else {
            self.model_dir
                .join(format!("ggml-{}.bin", self.options.model))
        }
    }

    fn build_args(&self, audio: &Path, output_base: &Path) -> Vec<String> {
        let json_flag = if self.options.enhanced_alignment {
            "-ojf"
        } else {
            "-oj"
        };

        let mut args = vec![
            "-m".to_string(),
            self.resolve_model().to_string_lossy().to_string(),
            "-f".to_string(),
            audio.to_string_lossy().to_string(),
            json_flag.to_string(),
            "-of".to_string(),
            output_base.to_string_lossy().to_string(),
            "-l".to_string(),
            self.options
                .language
                .clone()
                .unwrap_or_else(|| "auto".to_string()),
        ];

        if self.options.task == RecognitionTask::Translate {
            args.push("--translate".to_string());
        }
        if self.options.device.eq_ignore_ascii_case("cpu") {
            args.push("-ng".to_string());
        }
        args
    }

    fn parse_output(&self, output: WhisperCppOutput) -> RecognitionResult {
        let mut segments = Vec::with_capacity(output.transcription.len());
        let mut probabilities = Vec::new();

        for entry in output.transcription {
            let text = entry.text.trim();
            if text.is_empty() {
                continue;
            }

            probabilities.extend(
                entry
                    .tokens
                    .iter()
                    .filter(|t| !t.text.starts_with("[_"))
                    .filter_map(|t| t.p),
            );

            let mut segment = Segment::new(
                millis(entry.offsets.from),
                millis(entry.offsets.to),
                text,
            );

            if self.options.enhanced_alignment {
                let words: Vec<WordTiming> = entry
                    .tokens
                    .iter()
                    .filter(|t| !t.text.trim().is_empty() && !t.text.starts_with("[_"))
                    .map(|t| WordTiming {
                        start: millis(t.offsets.from),
                        end: millis(t.offsets.to),
                    })
                    .collect();
                tighten_to_words(&mut segment, &words);
            }

            segments.push(segment);
        }

        let confidence = if probabilities.is_empty() {
            None
        } else {
            let mean = probabilities.iter().sum::<f64>() / probabilities.len() as f64;
            Some(mean.clamp(0.0, 1.0) as f32)
        };

        let language = match self.options.task {
            RecognitionTask::Translate => "en".to_string(),
            RecognitionTask::Transcribe => output
                .result
                .map(|r| normalize_language(&r.language))
                .or_else(|| self.options.language.clone())
                .unwrap_or_else(|| "unknown".to_string()),
        };

        RecognitionResult {
            text: join_segments(&segments),
            language,
            segments,
            confidence,
        }
    }
}

fn millis(value: i64) -> Duration {
    Duration::from_millis(value.max(0) as u64)
}

#[async_trait]
impl Recognizer for WhisperCppRecognizer {
    async fn recognize(&self, audio: &Path) -> Result<RecognitionResult> {
        if !audio.exists() {
            return Err(PolysubError::FileNotFound(audio.display().to_string()));
        }

        let model = self.resolve_model();
        if !model.exists() {
            return Err(PolysubError::Recognition(format!(
                "Model file not found: {}",
                model.display()
            )));
        }

        let work_dir = tempfile::tempdir()?;
        let output_base = work_dir.path().join("transcript");
        let output_path = work_dir.path().join("transcript.json");

        let args = self.build_args(audio, &output_base);
        info!("Recognizing {} with whisper.cpp", audio.display());
        debug!("{} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                PolysubError::Recognition(format!("Failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PolysubError::Recognition(format!(
                "whisper.cpp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let json = tokio::fs::read_to_string(&output_path).await.map_err(|e| {
            PolysubError::Recognition(format!("Failed to read transcription: {}", e))
        })?;
        debug!(
            "whisper.cpp output: {}",
            json.chars().take(500).collect::<String>()
        );

        let parsed: WhisperCppOutput = serde_json::from_str(&json).map_err(|e| {
            PolysubError::Recognition(format!("Failed to parse transcription JSON: {}", e))
        })?;

        let result = self.parse_output(parsed);
        debug!(
            "whisper.cpp returned {} segments, language {}",
            result.segments.len(),
            result.language
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "whisper.cpp"
    }
}

#[derive(Debug, Deserialize)]
struct WhisperCppOutput {
    #[serde(default)]
    result: Option<WhisperCppResult>,
    #[serde(default)]
    transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperCppResult {
    language: String,
}

#[derive(Debug, Deserialize)]
struct WhisperCppSegment {
    offsets: WhisperCppOffsets,
    text: String,
    #[serde(default)]
    tokens: Vec<WhisperCppToken>,
}

#[derive(Debug, Deserialize)]
struct WhisperCppToken {
    text: String,
    offsets: WhisperCppOffsets,
    #[serde(default)]
    p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhisperCppOffsets {
    from: i64,
    to: i64,
}
