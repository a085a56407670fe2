//! Maps one translated string back onto the recognizer's timing segments.
//!
//! Translation services return a single undifferentiated string, so the
//! segment boundaries are lost. Each segment receives a slice of the
//! translation proportional to its share of the original characters. This
//! assumes roughly uniform character density across languages; it is a
//! heuristic, not a linguistic alignment.

use crate::recognize::Segment;
use crate::subtitle::SubtitleSegment;
use std::time::Duration;

/// Build subtitle segments for one language.
///
/// `translated` is `None` for the source language, in which case each
/// segment keeps its own text. The output always has one entry per input
/// segment, except that no input segments yields a single cue spanning
/// `[0, default_duration]` with the whole text.
pub fn align(
    segments: &[Segment],
    translated: Option<&str>,
    default_duration: Duration,
) -> Vec<SubtitleSegment> {
    if segments.is_empty() {
        let text = translated.unwrap_or_default();
        return vec![SubtitleSegment {
            index: 1,
            start: Duration::ZERO,
            end: default_duration,
            text: text.trim().to_string(),
        }];
    }

    match translated {
        None => segments
            .iter()
            .enumerate()
            .map(|(i, s)| cue(i, s, s.text.trim().to_string()))
            .collect(),
        Some(text) if segments.len() == 1 => vec![cue(0, &segments[0], text.to_string())],
        Some(text) => proportional(segments, text),
    }
}

fn cue(position: usize, segment: &Segment, text: String) -> SubtitleSegment {
    SubtitleSegment {
        index: position + 1,
        start: segment.start,
        end: segment.end,
        text,
    }
}

fn proportional(segments: &[Segment], translated: &str) -> Vec<SubtitleSegment> {
    let chars: Vec<char> = translated.chars().collect();
    let translated_len = chars.len();
    let weights: Vec<usize> = segments.iter().map(|s| s.text.chars().count()).collect();
    let total: usize = weights.iter().sum();

    let mut cues = Vec::with_capacity(segments.len());
    let mut pos = 0;

    for (i, (segment, weight)) in segments.iter().zip(&weights).enumerate() {
        let take = if total == 0 {
            0
        } else {
            translated_len * weight / total
        };
        let end = (pos + take).min(translated_len);
        let slice: String = chars[pos..end].iter().collect();
        pos = end;
        cues.push(cue(i, segment, slice.trim().to_string()));
    }

    // Integer truncation leaves a remainder; it belongs to the last cue
    if pos < translated_len {
        if let Some(last) = cues.last_mut() {
            let rest: String = chars[pos..].iter().collect();
            last.text.push_str(&rest);
            last.text = last.text.trim().to_string();
        }
    }

    cues
}
