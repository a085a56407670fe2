pub mod align;
pub mod srt;
pub mod vtt;

pub use align::align;

use crate::config::OutputFormat;
use crate::error::{PolysubError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One numbered subtitle cue.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleSegment {
    /// 1-based, contiguous.
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

pub trait SubtitleRenderer: Send + Sync {
    fn render(&self, segments: &[SubtitleSegment]) -> String;

    fn extension(&self) -> &'static str;

    /// Render `segments` to `path`, creating parent directories.
    fn write(&self, segments: &[SubtitleSegment], path: &Path) -> Result<PathBuf> {
        let render_err =
            |e: std::io::Error| PolysubError::Render(format!("{}: {}", path.display(), e));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(render_err)?;
        }
        fs::write(path, self.render(segments)).map_err(render_err)?;
        Ok(path.to_path_buf())
    }
}

pub fn create_renderer(format: OutputFormat) -> Box<dyn SubtitleRenderer> {
    match format {
        OutputFormat::Srt => Box::new(srt::SrtRenderer),
        OutputFormat::Vtt => Box::new(vtt::VttRenderer),
    }
}

/// `HH:MM:SS<sep>mmm`, hours unbounded.
pub(crate) fn clock(d: Duration, millis_separator: char) -> String {
    let total_secs = d.as_secs();
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        millis_separator,
        d.subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock() {
        assert_eq!(clock(Duration::from_millis(1500), ','), "00:00:01,500");
        assert_eq!(
            clock(Duration::from_secs(3661) + Duration::from_millis(123), '.'),
            "01:01:01.123"
        );
        assert_eq!(clock(Duration::from_secs(100 * 3600), ','), "100:00:00,000");
    }

    #[test]
    fn test_create_renderer() {
        assert_eq!(create_renderer(OutputFormat::Srt).extension(), "srt");
        assert_eq!(create_renderer(OutputFormat::Vtt).extension(), "vtt");
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.srt");
        let segments = vec![SubtitleSegment {
            index: 1,
            start: Duration::ZERO,
            end: Duration::from_secs(2),
            text: "Hi".to_string(),
        }];

        let written = create_renderer(OutputFormat::Srt)
            .write(&segments, &path)
            .unwrap();
        assert_eq!(written, path);
        assert!(fs::read_to_string(&path).unwrap().contains("Hi"));
    }

    #[test]
    fn test_write_failure_is_render_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // A regular file cannot be a parent directory
        let path = file.path().join("out.vtt");
        let result = create_renderer(OutputFormat::Vtt).write(&[], &path);
        assert!(matches!(result, Err(PolysubError::Render(_))));
    }
}
