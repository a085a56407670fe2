use crate::error::{PolysubError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Srt,
    Vtt,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "srt" => Ok(OutputFormat::Srt),
            "vtt" => Ok(OutputFormat::Vtt),
            _ => Err(format!("Unknown subtitle format: {}. Use 'srt' or 'vtt'", s)),
        }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationService {
    #[default]
    Google,
    Deepl,
    Gemini,
}

impl std::fmt::Display for TranslationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationService::Google => write!(f, "google"),
            TranslationService::Deepl => write!(f, "deepl"),
            TranslationService::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for TranslationService {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(TranslationService::Google),
            "deepl" => Ok(TranslationService::Deepl),
            "gemini" => Ok(TranslationService::Gemini),
            _ => Err(format!(
                "Unknown translation service: {}. Use 'google', 'deepl' or 'gemini'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionBackend {
    /// Local whisper.cpp command line.
    #[default]
    WhisperCpp,
    /// OpenAI Whisper HTTP API.
    OpenAi,
}

impl std::fmt::Display for RecognitionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionBackend::WhisperCpp => write!(f, "whisper_cpp"),
            RecognitionBackend::OpenAi => write!(f, "open_ai"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionTask {
    #[default]
    Transcribe,
    /// Recognize and translate to English in one pass.
    Translate,
}

/// What to do when one target language fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any translation or rendering failure aborts the whole request.
    #[default]
    Abort,
    /// Record the failure for that language and keep going with the rest.
    Isolate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub video_extensions: Vec<String>,

    pub audio_format: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,

    pub recognition_backend: RecognitionBackend,
    pub speech_recognition_model: String,
    pub speech_recognition_device: String,
    pub enhanced_alignment: bool,
    pub recognition_language: Option<String>,
    pub recognition_task: RecognitionTask,
    pub whisper_cpp_binary: String,
    pub whisper_model_dir: PathBuf,
    pub openai_api_key: Option<String>,

    pub translation_service: TranslationService,
    pub translation_api_key: Option<String>,
    pub translation_retries: u32,
    pub translation_backoff_ms: u64,
    pub translation_timeout_secs: u64,
    pub translation_concurrency: usize,
    pub max_request_chars: usize,
    pub target_languages: Vec<String>,
    pub failure_policy: FailurePolicy,

    pub subtitle_format: OutputFormat,
    pub subtitle_filename_suffix: String,
    pub language_code_in_filename: bool,
    pub default_duration_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            temp_dir: PathBuf::from("./temp"),
            output_dir: PathBuf::from("./output"),
            log_dir: PathBuf::from("./logs"),
            video_extensions: [".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            audio_format: "wav".to_string(),
            audio_sample_rate: 16000,
            audio_channels: 1,
            recognition_backend: RecognitionBackend::default(),
            speech_recognition_model: "base".to_string(),
            speech_recognition_device: "cpu".to_string(),
            enhanced_alignment: true,
            recognition_language: None,
            recognition_task: RecognitionTask::default(),
            whisper_cpp_binary: "whisper-cli".to_string(),
            whisper_model_dir: PathBuf::from("./models"),
            openai_api_key: None,
            translation_service: TranslationService::default(),
            translation_api_key: None,
            translation_retries: 3,
            translation_backoff_ms: 500,
            translation_timeout_secs: 10,
            translation_concurrency: 1,
            max_request_chars: 5000,
            target_languages: vec!["en".to_string()],
            failure_policy: FailurePolicy::default(),
            subtitle_format: OutputFormat::default(),
            subtitle_filename_suffix: "_subtitles".to_string(),
            language_code_in_filename: true,
            default_duration_secs: 60.0,
        }
    }
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// An explicit path that does not exist.
    Missing(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Missing(path) => {
                warn!("Config file {} not found, using defaults", path.display())
            }
            ConfigSource::Defaults => debug!("No config file found, using defaults"),
        }
    }
}

fn language_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z]{2,4})?$").expect("language code pattern is valid")
    })
}

impl Config {
    /// Load configuration and log where it came from.
    ///
    /// See [`Config::resolve`]. Callers that install logging after loading
    /// should use `resolve` and call [`ConfigSource::log`] themselves.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config, source) = Self::resolve(path)?;
        source.log();
        Ok(config)
    }

    /// Load configuration from `path`, or from the user config directory when
    /// no path is given, then apply environment overrides.
    ///
    /// An explicit path that does not exist falls back to defaults and is
    /// reported as [`ConfigSource::Missing`]. A file that exists but does not
    /// parse is an error.
    pub fn resolve(path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let (mut config, source) = match path {
            Some(path) if path.exists() => {
                (Self::from_file(path)?, ConfigSource::File(path.to_path_buf()))
            }
            Some(path) => (Self::default(), ConfigSource::Missing(path.to_path_buf())),
            None => match Self::config_file_path() {
                Some(path) if path.exists() => (Self::from_file(&path)?, ConfigSource::File(path)),
                _ => (Self::default(), ConfigSource::Defaults),
            },
        };

        config.apply_env();
        Ok((config, source))
    }

    /// Parse a config file: `.json` as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config = if is_json {
            serde_json::from_str(&contents).map_err(|e| {
                PolysubError::Config(format!("{}: {}", path.display(), e))
            })?
        } else {
            toml::from_str(&contents).map_err(|e| {
                PolysubError::Config(format!("{}: {}", path.display(), e))
            })?
        };

        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("POLYSUB_TRANSLATION_API_KEY") {
            self.translation_api_key = Some(key);
        }
        if let Ok(level) = std::env::var("POLYSUB_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_languages.is_empty() {
            return Err(PolysubError::Config(
                "At least one target language is required".to_string(),
            ));
        }

        for lang in &self.target_languages {
            if !language_code_pattern().is_match(lang) {
                return Err(PolysubError::Config(format!(
                    "Invalid language code: '{}'",
                    lang
                )));
            }
        }

        if self.audio_sample_rate == 0 {
            return Err(PolysubError::Config(
                "Audio sample rate must be greater than 0".to_string(),
            ));
        }
        if self.audio_channels == 0 {
            return Err(PolysubError::Config(
                "Audio channel count must be greater than 0".to_string(),
            ));
        }
        if self.translation_concurrency == 0 {
            return Err(PolysubError::Config(
                "Translation concurrency must be greater than 0".to_string(),
            ));
        }
        if self.translation_timeout_secs == 0 {
            return Err(PolysubError::Config(
                "Translation timeout must be greater than 0".to_string(),
            ));
        }
        if !self.default_duration_secs.is_finite() || self.default_duration_secs <= 0.0 {
            return Err(PolysubError::Config(
                "Default subtitle duration must be positive".to_string(),
            ));
        }

        if self.recognition_backend == RecognitionBackend::OpenAi && self.openai_api_key.is_none()
        {
            return Err(PolysubError::Config(
                "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-...".to_string(),
            ));
        }

        Ok(())
    }

    /// Create the temp, output and log directories.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.temp_dir, &self.output_dir, &self.log_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                debug!("Created directory {}", dir.display());
            }
        }
        Ok(())
    }

    pub fn translation_timeout(&self) -> Duration {
        Duration::from_secs(self.translation_timeout_secs)
    }

    /// Length of the synthetic segment used when recognition yields no segments.
    pub fn default_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.default_duration_secs)
            .unwrap_or(Duration::from_secs(60))
    }

    /// Whether the file extension is one of the configured video extensions.
    pub fn is_supported_video(&self, path: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
        self.video_extensions
            .iter()
            .any(|e| e.to_lowercase() == ext)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("polysub").join("config.toml"))
    }
}
