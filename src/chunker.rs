//! Deterministic text-to-chunk splitting.
//!
//! [`split`] turns raw extracted text into an ordered sequence of overlapping,
//! position-tagged [`Chunk`]s suitable for embedding. The splitter is pure and
//! synchronous: identical input and parameters always yield an identical chunk
//! sequence, and no input panics or loops.
//!
//! Packing is paragraph-aware: paragraphs are accumulated greedily until the
//! next one would overflow `chunk_size`, so chunks rarely break mid-sentence.
//! Overlap is character-based: the tail of each emitted chunk is carried into
//! the next buffer so boundary context survives even across long paragraphs.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator inserted between paragraphs when packing chunk text.
const PARAGRAPH_SEPARATOR: &str = "\n\n";
/// Character cost of a paragraph separator when advancing positions.
const SEPARATOR_CHARS: usize = 2;

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\u{9F}]").expect("control char pattern")
});
static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("horizontal whitespace pattern"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("excess newline pattern"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break pattern"));
static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#{1,6}\s+|[A-Z][A-Za-z\s]+:|\d+\.\s+[A-Z])").expect("section header pattern")
});

/// A bounded, position-tagged slice of a document's cleaned text.
///
/// Offsets are **character** offsets into the cleaned text the chunk was
/// derived from, so they are stable for multi-byte content. `char_end -
/// char_start` need not equal the chunk text length exactly (trimming and
/// separator accounting shift it), but starts and ends are monotonically
/// non-decreasing across increasing `chunk_index`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub char_start: usize,
    pub char_end: usize,
    /// Positional fields plus any caller-supplied context.
    pub metadata: serde_json::Value,
}

/// A titled section extracted from structured text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

/// Splits `text` into overlapping, position-tracked chunks.
///
/// Empty or whitespace-only input yields an empty vector. Callers should keep
/// `chunk_overlap < chunk_size`; violating that degrades chunk quality but
/// never loops or panics.
///
/// A single paragraph longer than `chunk_size` is **not** split further; it
/// becomes its own oversized chunk. This is a known limitation kept for
/// compatibility with existing stored chunks; callers needing a hard size cap
/// must pre-split pathological paragraphs.
///
/// Caller-supplied `metadata` is shallow-merged into every chunk's metadata,
/// with the chunk's own positional fields taking precedence.
///
/// # Examples
///
/// ```
/// use docuchat::chunker::split;
///
/// let chunks = split("First paragraph.\n\nSecond paragraph.", 1000, 200, None);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "First paragraph.\n\nSecond paragraph.");
/// assert_eq!(chunks[0].chunk_index, 0);
/// ```
pub fn split(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    metadata: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Vec<Chunk> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;
    let mut current_start = 0usize;
    let mut char_position = 0usize;

    for paragraph in PARAGRAPH_BREAK.split(&cleaned) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let paragraph_chars = char_len(paragraph);

        if buffer_chars + paragraph_chars + 1 > chunk_size && !buffer.is_empty() {
            chunks.push(make_chunk(
                &buffer,
                chunks.len(),
                current_start,
                char_position,
                metadata,
            ));

            // Seed the next buffer with the tail of the one just emitted so
            // trailing context carries across the boundary.
            let tail = tail_chars(&buffer, chunk_overlap);
            let tail_count = char_len(tail);
            let mut next = String::with_capacity(tail.len() + PARAGRAPH_SEPARATOR.len() + paragraph.len());
            next.push_str(tail);
            next.push_str(PARAGRAPH_SEPARATOR);
            next.push_str(paragraph);
            buffer = next;
            buffer_chars = tail_count + SEPARATOR_CHARS + paragraph_chars;
            current_start = char_position.saturating_sub(tail_count);
        } else {
            if !buffer.is_empty() {
                buffer.push_str(PARAGRAPH_SEPARATOR);
                buffer_chars += SEPARATOR_CHARS;
            }
            buffer.push_str(paragraph);
            buffer_chars += paragraph_chars;
        }

        char_position += paragraph_chars + SEPARATOR_CHARS;
    }

    if !buffer.trim().is_empty() {
        chunks.push(make_chunk(
            &buffer,
            chunks.len(),
            current_start,
            char_position,
            metadata,
        ));
    }

    chunks
}

/// Normalizes raw extracted text before splitting.
///
/// Unifies line endings, strips non-printable control characters, collapses
/// runs of horizontal whitespace to single spaces, and collapses 3+
/// consecutive newlines to exactly two, preserving paragraph breaks while
/// dropping excess blank lines.
pub fn clean_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let stripped = CONTROL_CHARS.replace_all(&unified, "");
    let collapsed = HORIZONTAL_WHITESPACE.replace_all(&stripped, " ");
    let normalized = EXCESS_NEWLINES.replace_all(&collapsed, "\n\n");
    normalized.trim().to_string()
}

/// Rough token estimate for budget planning: ~4 characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    char_len(text) / 4
}

/// Splits text into titled sections on common header patterns.
///
/// Lines matching a Markdown heading, a `Title:` label, or a numbered heading
/// start a new section; everything before the first header lands in an
/// `Introduction` section.
pub fn extract_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        title: "Introduction".to_string(),
        content: String::new(),
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if SECTION_HEADER.is_match(trimmed) {
            if !current.content.trim().is_empty() {
                sections.push(current);
            }
            current = Section {
                title: trimmed.trim_start_matches('#').trim().to_string(),
                content: String::new(),
            };
        } else {
            current.content.push_str(line);
            current.content.push('\n');
        }
    }

    if !current.content.trim().is_empty() {
        sections.push(current);
    }

    sections
}

fn make_chunk(
    buffer: &str,
    index: usize,
    char_start: usize,
    char_end: usize,
    caller_metadata: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Chunk {
    let mut metadata = caller_metadata.cloned().unwrap_or_default();
    metadata.insert("chunk_index".to_string(), index.into());
    metadata.insert("char_start".to_string(), char_start.into());
    metadata.insert("char_end".to_string(), char_end.into());

    Chunk {
        text: buffer.trim().to_string(),
        chunk_index: index,
        char_start,
        char_end,
        metadata: serde_json::Value::Object(metadata),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Returns the suffix of `s` holding its last `n` characters.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
