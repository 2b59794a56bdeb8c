//! Heading-scoped, overlapping-window markdown chunker.
//!
//! Splits a policy document into [`Chunk`]s whose boundaries follow the
//! document's markdown headings. Each heading starts a new section; a section
//! longer than `max_chars` is cut into fixed-size windows that overlap by
//! `overlap` characters so no sentence is lost at a window edge.
//!
//! Each chunk receives a content-addressed id (`{domain}-{stem}-{hash12}`),
//! so re-ingesting unchanged text upserts the same rows instead of
//! duplicating them.
//!
//! # Algorithm
//!
//! 1. Normalize `\r\n` to `\n` and trim the whole document.
//! 2. Walk the lines. A line matching `^#{1,6}\s+(.*)$` is a heading: the
//!    buffered section is flushed under the previous heading, then the
//!    heading becomes current and its line opens the new buffer.
//! 3. Flushing joins the buffer with `\n`, trims it, and drops it if empty.
//! 4. A section of at most `max_chars` characters is one chunk. A longer one
//!    is windowed: `[start, start + max_chars)`, then
//!    `start = end - overlap`, until a window reaches the end.
//!
//! Lengths and offsets are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use policy_assistant::chunk::split_markdown;
//!
//! let sections = split_markdown("Intro\n# Leave\nTwenty days.", 1000, 150);
//! assert_eq!(sections.len(), 2);
//! assert_eq!(sections[0].heading, "");
//! assert_eq!(sections[1].heading, "Leave");
//! assert_eq!(sections[1].content, "# Leave\nTwenty days.");
//! ```

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::models::{Chunk, Domain, PolicyDocument};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("heading pattern is valid"));

/// A window of text together with the heading it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub content: String,
}

/// Split markdown text into heading-scoped, size-bounded windows.
///
/// # Guarantees
///
/// - Output order follows the document.
/// - A window is at most `max_chars` characters unless `max_chars` is 0.
/// - Consecutive windows of one section share at least `overlap`
///   characters, except that the last window may be shorter.
/// - Text before the first heading carries an empty heading.
pub fn split_markdown(text: &str, max_chars: usize, overlap: usize) -> Vec<Section> {
    let text = text.replace("\r\n", "\n");
    let text = text.trim();

    let mut sections = Vec::new();
    let mut current_heading = String::new();
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if let Some(caps) = HEADING.captures(line) {
            flush(&buffer, &current_heading, max_chars, overlap, &mut sections);
            buffer.clear();
            current_heading = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
        }
        buffer.push(line);
    }
    flush(&buffer, &current_heading, max_chars, overlap, &mut sections);

    sections
}

fn flush(
    buffer: &[&str],
    heading: &str,
    max_chars: usize,
    overlap: usize,
    out: &mut Vec<Section>,
) {
    if buffer.is_empty() {
        return;
    }
    let joined = buffer.join("\n");
    let section = joined.trim();
    if section.is_empty() {
        return;
    }
    for content in window(section, max_chars, overlap) {
        out.push(Section {
            heading: heading.to_string(),
            content: content.to_string(),
        });
    }
}

/// Cut `section` into windows of `max_chars` characters stepping by
/// `max_chars - overlap`.
fn window(section: &str, max_chars: usize, overlap: usize) -> Vec<&str> {
    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = section
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(section.len()))
        .collect();
    let len = bounds.len() - 1;

    if len <= max_chars || max_chars == 0 {
        return vec![section];
    }

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_chars).min(len);
        windows.push(&section[bounds[start]..bounds[end]]);
        if end == len {
            break;
        }
        // Always advance, even with a misconfigured overlap.
        start = end.saturating_sub(overlap).max(start + 1);
    }
    windows
}

/// Chunk a policy document and assign content-addressed ids.
pub fn chunk_document(doc: &PolicyDocument, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    let source = doc.source_name();
    let stem = doc.source_stem();

    split_markdown(&doc.text, max_chars, overlap)
        .into_iter()
        .map(|section| {
            let hash = content_hash(&section.heading, &section.content);
            Chunk {
                id: chunk_id(doc.domain, &stem, &hash),
                domain: doc.domain,
                source: source.clone(),
                heading: section.heading,
                content: section.content,
                hash,
            }
        })
        .collect()
}

/// SHA-256 (hex) of `heading + "\n" + content`.
pub fn content_hash(heading: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(heading.as_bytes());
    hasher.update(b"\n");
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `{domain}-{stem}-{first 12 hex chars of hash}`.
pub fn chunk_id(domain: Domain, source_stem: &str, hash: &str) -> String {
    let short = hash.get(..12).unwrap_or(hash);
    format!("{}-{}-{}", domain, source_stem, short)
}
