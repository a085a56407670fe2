use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PolysubError, Result};

use super::{AudioExtractor, AudioSettings};

/// Check if FFmpeg is installed and accessible.
pub async fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|e| {
            PolysubError::Extraction(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(PolysubError::Extraction("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Get media duration using FFprobe.
pub async fn probe_duration(input: &Path) -> Result<Duration> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .await
        .map_err(|e| PolysubError::Extraction(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PolysubError::Extraction(format!(
            "FFprobe failed: {}",
            stderr.trim()
        )));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration_secs: f64 = duration_str.trim().parse().map_err(|e| {
        PolysubError::Extraction(format!(
            "Failed to parse duration '{}': {e}",
            duration_str.trim()
        ))
    })?;

    Duration::try_from_secs_f64(duration_secs)
        .map_err(|e| PolysubError::Extraction(format!("Invalid duration {duration_secs}: {e}")))
}

/// Last few lines of FFmpeg's stderr, which carry the actual failure reason.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    lines[start..].join(" | ")
}

/// Extracts audio by shelling out to `ffmpeg`.
pub struct FfmpegExtractor {
    settings: AudioSettings,
    binary: String,
}

impl FfmpegExtractor {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings,
            binary: "ffmpeg".to_string(),
        }
    }

    /// Use a different ffmpeg executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
        ];
        if let Some(codec) = self.settings.codec() {
            args.push("-acodec".to_string());
            args.push(codec.to_string());
        }
        args.extend([
            "-ar".to_string(),
            self.settings.sample_rate.to_string(),
            "-ac".to_string(),
            self.settings.channels.to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, output: &Path) -> Result<PathBuf> {
        if !video.exists() {
            return Err(PolysubError::FileNotFound(video.display().to_string()));
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Extracting audio from {}", video.display());

        let args = self.build_args(video, output);
        debug!("{} {:?}", self.binary, args);

        let result = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                PolysubError::Extraction(format!("Failed to run {}: {e}", self.binary))
            })?;

        if !result.status.success() {
            return Err(PolysubError::Extraction(format!(
                "FFmpeg exited with {}: {}",
                result.status,
                stderr_tail(&result.stderr)
            )));
        }

        if !output.exists() {
            return Err(PolysubError::Extraction(
                "Output file was not created".to_string(),
            ));
        }

        info!("Audio extracted to {}", output.display());
        Ok(output.to_path_buf())
    }

    fn settings(&self) -> &AudioSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg_available() -> bool {
        std::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_build_args_wav() {
        let extractor = FfmpegExtractor::new(AudioSettings::default());
        let args = extractor.build_args(Path::new("in.mp4"), Path::new("out.wav"));
        assert_eq!(
            args,
            vec![
                "-y", "-i", "in.mp4", "-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1",
                "out.wav"
            ]
        );
    }

    #[test]
    fn test_build_args_unknown_format_omits_codec() {
        let extractor = FfmpegExtractor::new(AudioSettings {
            format: "opus".to_string(),
            sample_rate: 48000,
            channels: 2,
        });
        let args = extractor.build_args(Path::new("in.mkv"), Path::new("out.opus"));
        assert!(!args.contains(&"-acodec".to_string()));
        assert!(args.contains(&"48000".to_string()));
        assert!(args.contains(&"2".to_string()));
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = b"ffmpeg version 6\n\nInput #0\nStream map '0:a' matches no streams.\n";
        assert_eq!(
            stderr_tail(stderr),
            "ffmpeg version 6 | Input #0 | Stream map '0:a' matches no streams."
        );
    }

    #[tokio::test]
    async fn test_check_ffmpeg() {
        let result = check_ffmpeg().await;
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available or broken");
            return;
        }
        assert!(result.is_ok(), "FFmpeg check failed: {:?}", result.err());
    }

    #[tokio::test]
    async fn test_extract_file_not_found() {
        let extractor = FfmpegExtractor::new(AudioSettings::default());
        let result = extractor
            .extract(Path::new("/nonexistent/file.mp4"), Path::new("/tmp/out.wav"))
            .await;

        match result {
            Err(PolysubError::FileNotFound(path)) => assert!(path.contains("nonexistent")),
            Err(other) => panic!("Expected FileNotFound error, got: {other}"),
            Ok(_) => panic!("Expected error but got Ok"),
        }
    }

    #[tokio::test]
    async fn test_extract_missing_binary() {
        let video = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let extractor = FfmpegExtractor::new(AudioSettings::default())
            .with_binary("definitely-not-ffmpeg-polysub");

        let result = extractor
            .extract(video.path(), &out_dir.path().join("out.wav"))
            .await;
        assert!(matches!(result, Err(PolysubError::Extraction(_))));
    }
}
