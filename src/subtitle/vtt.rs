// WebVTT subtitle format
use super::{clock, SubtitleRenderer, SubtitleSegment};

pub struct VttRenderer;

impl SubtitleRenderer for VttRenderer {
    fn render(&self, segments: &[SubtitleSegment]) -> String {
        let mut output = String::from("WEBVTT\n\n");

        for segment in segments {
            output.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                segment.index,
                clock(segment.start, '.'),
                clock(segment.end, '.'),
                segment.text
            ));
        }

        output
    }

    fn extension(&self) -> &'static str {
        "vtt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_vtt_render() {
        let segments = vec![SubtitleSegment {
            index: 1,
            start: Duration::from_millis(1500),
            end: Duration::from_millis(4000),
            text: "Hello, world!".to_string(),
        }];

        let output = VttRenderer.render(&segments);
        assert!(output.starts_with("WEBVTT\n\n"));
        assert!(output.contains("1\n00:00:01.500 --> 00:00:04.000\nHello, world!\n"));
    }

    #[test]
    fn test_vtt_render_empty_has_header() {
        assert_eq!(VttRenderer.render(&[]), "WEBVTT\n\n");
    }
}
