//! Turning free-text captions into archive entry names.
//!
//! Names are restricted to `[A-Za-z0-9 _-]`, at most [`MAX_STEM_CHARS`] long, and always carry
//! the `.png` extension the archive re-encodes to.

use std::collections::HashSet;
use std::fmt;

use super::truncate_chars;

/// Stem used when a caption is missing or sanitizes to nothing.
pub const FALLBACK_STEM: &str = "image";

/// Extension of every archive entry; matches the re-encoded format.
pub const EXTENSION: &str = "png";

pub const MAX_STEM_CHARS: usize = 200;

/// A sanitized archive entry name. The stem is never empty and never contains anything outside
/// `[A-Za-z0-9 _-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveEntryName {
    stem: String,
}

impl ArchiveEntryName {
    pub fn fallback() -> Self {
        Self {
            stem: FALLBACK_STEM.to_string(),
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, EXTENSION)
    }
}

impl fmt::Display for ArchiveEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stem, EXTENSION)
    }
}

/// Whitespace as understood by the caption rules: space, tab, newline, vertical tab, form feed,
/// carriage return. Unicode spaces are not separators and are replaced like any other symbol.
fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\u{0B}' | '\u{0C}' | '\r')
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || is_separator(c)
}

/// Trim control characters and spaces from both ends.
fn trim_controls(s: &str) -> &str {
    s.trim_matches(|c: char| c <= ' ')
}

/// Replace each run of `.`, `!` or `?` that ends a word (followed by whitespace or the end of the
/// text) with a single comma. Runs inside a token such as `v1.2` are left alone.
fn soften_sentence_ends(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if is_sentence_end(chars[i]) {
            let start = i;
            while i < chars.len() && is_sentence_end(chars[i]) {
                i += 1;
            }
            if i == chars.len() || is_separator(chars[i]) {
                out.push(',');
            } else {
                out.extend(&chars[start..i]);
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn collapse_separators(s: &str) -> String {
    s.split(is_separator).filter(|part| !part.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Sanitize a caption into an archive entry name.
///
/// Missing and empty captions map to [`ArchiveEntryName::fallback`]. The result is deterministic
/// for a given input.
pub fn sanitize(caption: Option<&str>) -> ArchiveEntryName {
    let Some(caption) = caption.filter(|c| !c.is_empty()) else {
        return ArchiveEntryName::fallback();
    };

    let trimmed = trim_controls(caption);
    let unquoted = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);

    let softened = soften_sentence_ends(unquoted);
    let softened = softened.trim_end_matches(|c: char| c == ',' || is_separator(c));

    let replaced: String = softened.chars().map(|c| if is_allowed(c) { c } else { ' ' }).collect();
    let collapsed = collapse_separators(&replaced);

    if collapsed.is_empty() {
        return ArchiveEntryName::fallback();
    }

    ArchiveEntryName {
        stem: truncate_chars(&collapsed, MAX_STEM_CHARS).trim().to_string(),
    }
}

/// Hands out entry names that are unique within one archive.
///
/// The first claim of a name keeps it; later claims get `-2`, `-3`, ... appended to the stem,
/// shortening the stem when needed to stay within [`MAX_STEM_CHARS`]. Names are compared
/// case-insensitively so the archive also extracts cleanly on case-insensitive file systems.
#[derive(Debug, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: ArchiveEntryName) -> ArchiveEntryName {
        if self.taken.insert(name.stem.to_ascii_lowercase()) {
            return name;
        }

        let mut n: usize = 2;
        loop {
            let suffix = format!("-{n}");
            let room = MAX_STEM_CHARS.saturating_sub(suffix.len());
            let base = truncate_chars(&name.stem, room).trim_end();
            let stem = format!("{base}{suffix}");
            if self.taken.insert(stem.to_ascii_lowercase()) {
                return ArchiveEntryName { stem };
            }
            n += 1;
        }
    }
}
