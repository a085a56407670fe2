pub mod extract;

pub use extract::{check_ffmpeg, probe_duration, FfmpegExtractor};

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Target encoding for the extracted audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSettings {
    /// Container/extension, e.g. `wav`.
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl AudioSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            format: config.audio_format.to_lowercase(),
            sample_rate: config.audio_sample_rate,
            channels: config.audio_channels,
        }
    }

    /// Codec ffmpeg should encode with, `None` to let ffmpeg pick from the extension.
    pub fn codec(&self) -> Option<&'static str> {
        match self.format.as_str() {
            "wav" => Some("pcm_s16le"),
            "mp3" => Some("libmp3lame"),
            "flac" => Some("flac"),
            "ogg" => Some("libvorbis"),
            "m4a" => Some("aac"),
            _ => None,
        }
    }
}

/// Pulls the audio track out of a video file.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Write the audio track of `video` to `output` and return the written path.
    async fn extract(&self, video: &Path, output: &Path) -> Result<PathBuf>;

    fn settings(&self) -> &AudioSettings;
}
