//! Condensing a vision analysis into the text handed to the chat model.

use std::cmp::Ordering;

use super::truncate_chars;
use crate::providers::{AnalysisFinding, ImageAnalysis};

pub const CAPTION_MIN_CONFIDENCE: f64 = 0.5;
pub const TAG_MIN_CONFIDENCE: f64 = 0.65;

/// Hard cap on the summary length, in characters.
pub const MAX_SUMMARY_CHARS: usize = 3000;

const CAPTIONS_HEADER: &str = "Here are descriptions of different aspects of the image:";
const TAGS_HEADER: &str = "Here is a list of different parts of the image:";
const TEXT_HEADER: &str = "Text found within the image:";

/// Keep entries at or above `threshold`, most confident first. Equal confidences keep their
/// reported order.
fn ranked<'a>(entries: impl Iterator<Item = (&'a str, f64)>, threshold: f64) -> Vec<&'a str> {
    let mut kept: Vec<(&str, f64)> = entries.filter(|(_, confidence)| *confidence >= threshold).collect();
    kept.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    kept.into_iter().map(|(text, _)| text).collect()
}

/// Build the analysis section of the captioning prompt.
///
/// Region captions are numbered, tags and text lines are comma-joined, and any section without
/// content is left out along with its header. The result never exceeds [`MAX_SUMMARY_CHARS`].
pub fn summarize(analysis: &ImageAnalysis) -> String {
    let captions = ranked(
        analysis.findings.iter().filter_map(|f| match f {
            AnalysisFinding::RegionCaption { text, confidence } => Some((text.as_str(), *confidence)),
            _ => None,
        }),
        CAPTION_MIN_CONFIDENCE,
    );
    let tags = ranked(
        analysis.findings.iter().filter_map(|f| match f {
            AnalysisFinding::Tag { name, confidence } => Some((name.as_str(), *confidence)),
            _ => None,
        }),
        TAG_MIN_CONFIDENCE,
    );
    let lines: Vec<&str> = analysis
        .findings
        .iter()
        .filter_map(|f| match f {
            AnalysisFinding::TextLine { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    let mut sections = Vec::with_capacity(3);
    if !captions.is_empty() {
        let numbered = captions
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{}. {}", i + 1, text))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("{CAPTIONS_HEADER}\n{numbered}"));
    }
    if !tags.is_empty() {
        sections.push(format!("{TAGS_HEADER}\n{}", tags.join(", ")));
    }
    if !lines.is_empty() {
        sections.push(format!("{TEXT_HEADER}\n{}", lines.join(", ")));
    }

    let summary = sections.join("\n\n");
    truncate_chars(&summary, MAX_SUMMARY_CHARS).to_string()
}
