use crate::audio::{probe_duration, AudioExtractor, AudioSettings, FfmpegExtractor};
use crate::config::{Config, FailurePolicy, OutputFormat};
use crate::error::{PolysubError, Result};
use crate::progress::{CancelFlag, ProgressReporter, Stage};
use crate::recognize::{create_recognizer, RecognitionResult, Recognizer};
use crate::retry::RetryPolicy;
use crate::subtitle::{align, create_renderer};
use crate::translate::{create_translator, translate_text, TranslationResult, Translator};
use console::style;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One video to subtitle.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateRequest {
    pub video: PathBuf,
    /// Requested subtitle languages, in output order.
    pub languages: Vec<String>,
    pub format: OutputFormat,
}

impl TranslateRequest {
    /// Request using the configured target languages and format.
    pub fn from_config(video: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            video: video.into(),
            languages: config.target_languages.clone(),
            format: config.subtitle_format,
        }
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Requested languages with duplicates removed, first occurrence kept.
    fn unique_languages(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.languages.len());
        for lang in &self.languages {
            let lang = lang.trim();
            if !lang.is_empty() && !seen.iter().any(|s: &String| s.eq_ignore_ascii_case(lang)) {
                seen.push(lang.to_string());
            }
        }
        seen
    }
}

/// Statistics from the subtitle generation process.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub extraction_time: Duration,
    pub recognition_time: Duration,
    pub translation_time: Duration,
    pub rendering_time: Duration,
    /// Recognized segments (before alignment).
    pub segment_count: usize,
    /// Languages that went through the translation service.
    pub languages_translated: usize,
    /// Audio length as reported by ffprobe, when it could be read.
    pub audio_duration: Option<Duration>,
    pub recognizer: String,
    pub translator: Option<String>,
}

/// Result of processing one video.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Language code to written subtitle file.
    pub subtitles: BTreeMap<String, PathBuf>,
    /// Language code to error message, only populated under [`FailurePolicy::Isolate`].
    pub failures: BTreeMap<String, String>,
    pub detected_language: String,
    pub stats: PipelineStats,
}

/// Sequences extraction, recognition, translation and rendering for a video.
pub struct VideoTranslator {
    config: Config,
    extractor: Arc<dyn AudioExtractor>,
    recognizer: Arc<dyn Recognizer>,
    translator: Option<Arc<dyn Translator>>,
}

impl VideoTranslator {
    pub fn new(
        config: Config,
        extractor: Arc<dyn AudioExtractor>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            config,
            extractor,
            recognizer,
            translator: None,
        }
    }

    pub fn with_translator(mut self, translator: Option<Arc<dyn Translator>>) -> Self {
        self.translator = translator;
        self
    }

    /// Build the ffmpeg extractor and the configured recognizer and translator.
    ///
    /// A missing translation key is not an error here; it only fails a
    /// request that actually needs translation.
    pub fn from_config(config: Config) -> Result<Self> {
        let extractor = FfmpegExtractor::new(AudioSettings::from_config(&config));
        let recognizer: Arc<dyn Recognizer> = Arc::from(create_recognizer(&config)?);
        let translator = match config.translation_api_key {
            Some(_) => Some(create_translator(&config)?),
            None => None,
        };

        Ok(Self::new(config, Arc::new(extractor), recognizer).with_translator(translator))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Output path: `{stem}{suffix}[_{lang}].{ext}` in the output directory.
    pub fn subtitle_path(&self, video: &Path, lang: &str, format: OutputFormat) -> PathBuf {
        let stem = video_stem(video);
        let name = if self.config.language_code_in_filename {
            format!(
                "{}{}_{}.{}",
                stem,
                self.config.subtitle_filename_suffix,
                lang,
                format.extension()
            )
        } else {
            format!(
                "{}{}.{}",
                stem,
                self.config.subtitle_filename_suffix,
                format.extension()
            )
        };
        self.config.output_dir.join(name)
    }

    /// Run the full pipeline for one video.
    ///
    /// Emits progress through `progress` and checks `cancel` between stages.
    /// A failure is reported as a final [`Stage::Failed`] event before it is
    /// returned.
    pub async fn process_video(
        &self,
        request: &TranslateRequest,
        progress: &ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<PipelineResult> {
        match self.run(request, progress, cancel).await {
            Ok(result) => {
                progress.report(Stage::Done, "Subtitles complete", Some(1.0));
                Ok(result)
            }
            Err(e) => {
                progress.report(Stage::Failed, e.to_string(), None);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &TranslateRequest,
        progress: &ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let languages = request.unique_languages();
        if languages.is_empty() {
            return Err(PolysubError::Config(
                "No target languages requested".to_string(),
            ));
        }
        if languages.len() > 1 && !self.config.language_code_in_filename {
            warn!(
                "language_code_in_filename is off: {} languages will write to the same file",
                languages.len()
            );
        }

        check_cancelled(cancel)?;

        // Stage 1: audio extraction
        info!("Stage 1/4: Extracting audio from {}", request.video.display());
        progress.report(Stage::Extracting, "Extracting audio", Some(0.1));
        let extraction_start = Instant::now();

        std::fs::create_dir_all(&self.config.temp_dir)
            .map_err(|e| PolysubError::from(e).in_stage(Stage::Extracting))?;
        let work_dir = tempfile::Builder::new()
            .prefix("polysub-")
            .tempdir_in(&self.config.temp_dir)
            .map_err(|e| PolysubError::from(e).in_stage(Stage::Extracting))?;
        debug!("Using temp directory {}", work_dir.path().display());

        let audio_path = work_dir.path().join(format!(
            "{}.{}",
            video_stem(&request.video),
            self.extractor.settings().format
        ));
        let audio = self
            .extractor
            .extract(&request.video, &audio_path)
            .await
            .map_err(|e| e.in_stage(Stage::Extracting))?;

        let audio_duration = match probe_duration(&audio).await {
            Ok(d) => Some(d),
            Err(e) => {
                debug!("Could not probe audio duration: {}", e);
                None
            }
        };
        let extraction_time = extraction_start.elapsed();
        progress.report(Stage::Extracting, "Audio extracted", Some(0.2));
        check_cancelled(cancel)?;

        // Stage 2: speech recognition
        info!("Stage 2/4: Recognizing speech with {}", self.recognizer.name());
        progress.report(Stage::Recognizing, "Recognizing speech", Some(0.3));
        let recognition_start = Instant::now();

        let recognition = self
            .recognizer
            .recognize(&audio)
            .await
            .map_err(|e| e.in_stage(Stage::Recognizing))?;

        let recognition_time = recognition_start.elapsed();
        info!(
            "Recognized {} segments, language '{}' in {:.2}s",
            recognition.segments.len(),
            recognition.language,
            recognition_time.as_secs_f64()
        );
        progress.report(
            Stage::Recognizing,
            format!(
                "Recognized {} segments ({})",
                recognition.segments.len(),
                recognition.language
            ),
            Some(0.4),
        );
        check_cancelled(cancel)?;

        // Stage 3: translation
        let targets: Vec<String> = languages
            .iter()
            .filter(|l| !same_language(l, &recognition.language))
            .cloned()
            .collect();
        info!(
            "Stage 3/4: Translating to {} language(s)",
            targets.len()
        );
        progress.report(Stage::Translating, "Translating transcript", Some(0.5));
        let translation_start = Instant::now();

        let (translations, mut failures) = self
            .translate_all(&recognition, &targets, progress, cancel)
            .await?;

        let translation_time = translation_start.elapsed();
        progress.report(Stage::Translating, "Translation finished", Some(0.6));
        check_cancelled(cancel)?;

        // Stage 4: alignment and rendering
        info!("Stage 4/4: Writing {} subtitles", request.format);
        progress.report(Stage::Rendering, "Writing subtitles", Some(0.7));
        let rendering_start = Instant::now();

        let renderer = create_renderer(request.format);
        let default_duration = self.config.default_duration();
        let mut subtitles = BTreeMap::new();
        let total = languages.len();

        for (i, lang) in languages.iter().enumerate() {
            check_cancelled(cancel)?;
            if failures.contains_key(lang) {
                continue;
            }

            let is_source = same_language(lang, &recognition.language);
            let translated = if is_source {
                None
            } else {
                translations.get(lang).map(|t| t.translated_text.as_str())
            };
            // With no segments the whole transcript becomes the single cue
            let text = match translated {
                None if recognition.segments.is_empty() => Some(recognition.text.as_str()),
                other => other,
            };

            let cues = align(&recognition.segments, text, default_duration);
            let path = self.subtitle_path(&request.video, lang, request.format);

            match renderer.write(&cues, &path) {
                Ok(written) => {
                    info!("Wrote {} cues for '{}' to {}", cues.len(), lang, written.display());
                    subtitles.insert(lang.clone(), written);
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(e.in_stage(Stage::Rendering)),
                    FailurePolicy::Isolate => {
                        warn!("Rendering '{}' failed: {}", lang, e);
                        failures.insert(lang.clone(), e.in_stage(Stage::Rendering).to_string());
                        continue;
                    }
                },
            }

            progress.report(
                Stage::Rendering,
                format!("Wrote {} subtitles", lang),
                Some(0.7 + 0.2 * (i + 1) as f64 / total as f64),
            );
        }

        if subtitles.is_empty() {
            return Err(PolysubError::AllLanguagesFailed { failures });
        }

        progress.report(Stage::Rendering, "Subtitles written", Some(0.95));
        let rendering_time = rendering_start.elapsed();

        let stats = PipelineStats {
            total_time: start_time.elapsed(),
            extraction_time,
            recognition_time,
            translation_time,
            rendering_time,
            segment_count: recognition.segments.len(),
            languages_translated: translations.len(),
            audio_duration,
            recognizer: self.recognizer.name().to_string(),
            translator: self.translator.as_ref().map(|t| t.name().to_string()),
        };

        Ok(PipelineResult {
            subtitles,
            failures,
            detected_language: recognition.language,
            stats,
        })
    }

    /// Translate the transcript into every target, in request order.
    ///
    /// Under [`FailurePolicy::Abort`] the first failure is returned; under
    /// [`FailurePolicy::Isolate`] failures are collected per language.
    async fn translate_all(
        &self,
        recognition: &RecognitionResult,
        targets: &[String],
        progress: &ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<(BTreeMap<String, TranslationResult>, BTreeMap<String, String>)> {
        let mut translations = BTreeMap::new();
        let mut failures = BTreeMap::new();
        if targets.is_empty() {
            return Ok((translations, failures));
        }

        let translator: &dyn Translator = self
            .translator
            .as_deref()
            .ok_or_else(|| {
                PolysubError::Config(format!(
                    "No translation API key for {}. Set POLYSUB_TRANSLATION_API_KEY",
                    self.config.translation_service
                ))
            })
            .map_err(|e| e.in_stage(Stage::Translating))?;

        let retry = RetryPolicy::new(
            self.config.translation_retries,
            Duration::from_millis(self.config.translation_backoff_ms),
        );
        let max_chars = self.config.max_request_chars;
        let text = recognition.text.as_str();
        let source = Some(recognition.language.as_str()).filter(|l| *l != "unknown");
        let total = targets.len();

        let retry = &retry;
        let mut results = stream::iter(targets.iter().cloned())
            .map(move |lang: String| async move {
                let result =
                    translate_text(translator, text, source, &lang, retry, max_chars).await;
                (lang, result)
            })
            .buffered(self.config.translation_concurrency.max(1));

        let mut finished = 0;
        while let Some((lang, result)) = results.next().await {
            check_cancelled(cancel)?;
            finished += 1;

            match result {
                Ok(translation) => {
                    debug!(
                        "Translated {} chars to '{}'",
                        translation.translated_text.chars().count(),
                        lang
                    );
                    translations.insert(lang.clone(), translation);
                    progress.report(
                        Stage::Translating,
                        format!("Translated to {}", lang),
                        Some(0.5 + 0.1 * finished as f64 / total as f64),
                    );
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(e.in_stage(Stage::Translating)),
                    FailurePolicy::Isolate => {
                        warn!("Skipping '{}': {}", lang, e);
                        failures.insert(lang.clone(), e.to_string());
                    }
                },
            }
        }

        Ok((translations, failures))
    }
}

fn check_cancelled(cancel: &CancelFlag) -> Result<()> {
    if cancel.is_cancelled() {
        warn!("Pipeline cancelled");
        return Err(PolysubError::Cancelled);
    }
    Ok(())
}

fn same_language(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn video_stem(video: &Path) -> String {
    video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string())
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Subtitle Generation Complete              ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Detected:   {}", result.detected_language);
    println!("  Segments:   {}", result.stats.segment_count);
    println!("  Recognizer: {}", result.stats.recognizer);
    if let Some(ref translator) = result.stats.translator {
        println!(
            "  Translator: {} ({} language(s))",
            translator, result.stats.languages_translated
        );
    }
    if let Some(duration) = result.stats.audio_duration {
        println!("  Duration:   {:.1}s audio", duration.as_secs_f64());
    }
    println!();
    println!("  Subtitles:");
    for (lang, path) in &result.subtitles {
        println!("    {:<8} {}", style(lang).green(), path.display());
    }
    if !result.failures.is_empty() {
        println!();
        println!("  Failed:");
        for (lang, error) in &result.failures {
            println!("    {:<8} {}", style(lang).red(), error);
        }
    }
    println!();
    println!("  Timing:");
    println!(
        "    Extract:     {:.2}s",
        result.stats.extraction_time.as_secs_f64()
    );
    println!(
        "    Recognize:   {:.2}s",
        result.stats.recognition_time.as_secs_f64()
    );
    println!(
        "    Translate:   {:.2}s",
        result.stats.translation_time.as_secs_f64()
    );
    println!(
        "    Render:      {:.2}s",
        result.stats.rendering_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
