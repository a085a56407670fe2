// SRT subtitle format
use super::{clock, SubtitleRenderer, SubtitleSegment};

pub struct SrtRenderer;

impl SubtitleRenderer for SrtRenderer {
    fn render(&self, segments: &[SubtitleSegment]) -> String {
        segments
            .iter()
            .map(|segment| {
                format!(
                    "{}\n{} --> {}\n{}\n",
                    segment.index,
                    clock(segment.start, ','),
                    clock(segment.end, ','),
                    segment.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn extension(&self) -> &'static str {
        "srt"
    }
}
