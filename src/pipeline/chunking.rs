//! Recursive character chunking and page attribution.
//!
//! Text is split with `semchunk-rs` using a character counter, so every base chunk stays within
//! `chunk_size` characters while preferring paragraph, line, sentence, and word boundaries in
//! that order. A second pass prefixes each chunk after the first with up to `overlap` trailing
//! characters of its predecessor, cut at a word boundary when one is available.

use semchunk_rs::Chunker;

use super::types::TextChunk;

/// Characters compared when locating a chunk's leading or trailing excerpt on a page.
const EXCERPT_CHARS: usize = 40;
/// Shorter excerpt retried when the full excerpt spans a page break.
const SHORT_EXCERPT_CHARS: usize = 16;

/// `ceil(chars / 4)`.
pub(crate) fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split `text` into overlapping chunks of roughly `chunk_size` characters.
///
/// Returns an empty vector for whitespace-only input.
pub(crate) fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunker = Chunker::new(
        chunk_size.max(1),
        Box::new(|segment: &str| segment.chars().count()),
    );
    let base_chunks: Vec<String> = chunker
        .chunk(text)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect();

    apply_overlap(base_chunks, chunk_size, overlap)
}

fn apply_overlap(chunks: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let chunk = match previous.as_deref() {
            Some(prev) => build_overlapped_chunk(prev, &current, effective_overlap),
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(previous: &str, current: &str, overlap: usize) -> String {
    let tail = tail_with_char_limit(previous, overlap);
    if tail.is_empty() {
        return current.to_string();
    }

    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
        combined.push(' ');
    }
    combined.push_str(current);
    combined
}

/// The last `limit` characters of `text`, advanced to the next word start when the cut lands
/// mid-word and a later boundary exists.
fn tail_with_char_limit(text: &str, limit: usize) -> &str {
    let total = text.chars().count();
    if total <= limit {
        return text.trim_start();
    }

    let start = text
        .char_indices()
        .nth(total - limit)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    let tail = &text[start..];

    let cut_mid_word = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());
    if cut_mid_word && let Some(space) = tail.find(char::is_whitespace) {
        let rest = tail[space..].trim_start();
        if !rest.is_empty() {
            return rest;
        }
    }

    tail.trim_start()
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

/// Collapse whitespace runs so excerpts match regardless of line wrapping.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn leading_excerpt(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect::<String>().trim().to_string()
}

fn trailing_excerpt(text: &str, chars: usize) -> String {
    let total = text.chars().count();
    text.chars()
        .skip(total.saturating_sub(chars))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Locate a chunk that opens with an overlap fragment cut from the previous chunk.
///
/// Returns `(start, body)`: the page holding the text after the fragment, and the page before it
/// when that page also contains the fragment.
fn locate_after_fragment(pages: &[String], normalized: &str) -> (Option<usize>, Option<usize>) {
    let Some((fragment, rest)) = normalized.split_once(' ') else {
        return (None, None);
    };
    let Some(body) = locate(pages, 0, &[leading_excerpt(rest, SHORT_EXCERPT_CHARS)]) else {
        return (None, None);
    };
    let start = match body.checked_sub(1) {
        Some(previous) if pages[previous].contains(fragment) => previous,
        _ => body,
    };
    (Some(start), Some(body))
}

/// Index of the first page at or after `from` containing one of the candidate excerpts.
fn locate(pages: &[String], from: usize, candidates: &[String]) -> Option<usize> {
    candidates
        .iter()
        .filter(|excerpt| !excerpt.is_empty())
        .find_map(|excerpt| {
            pages
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, page)| page.contains(excerpt.as_str()))
                .map(|(index, _)| index)
        })
}

/// Build [`TextChunk`]s with page ranges from raw chunk strings.
///
/// A chunk's start page is the first page containing its leading excerpt and its end page the
/// first page (not before the start) containing its trailing excerpt. A leading overlap
/// fragment is skipped when the full excerpt is not found. Unlocatable excerpts default to
/// page 1; the end never precedes the start.
pub(crate) fn attribute_pages(chunks: Vec<String>, pages: &[String]) -> Vec<TextChunk> {
    let normalized_pages: Vec<String> =
        pages.iter().map(|page| normalize_whitespace(page)).collect();

    chunks
        .into_iter()
        .map(|text| {
            let normalized = normalize_whitespace(&text);
            let lead = [
                leading_excerpt(&normalized, EXCERPT_CHARS),
                leading_excerpt(&normalized, SHORT_EXCERPT_CHARS),
            ];
            let trail = [
                trailing_excerpt(&normalized, EXCERPT_CHARS),
                trailing_excerpt(&normalized, SHORT_EXCERPT_CHARS),
            ];

            let (start_index, body_index) = match locate(&normalized_pages, 0, &lead) {
                Some(index) => (Some(index), Some(index)),
                None => locate_after_fragment(&normalized_pages, &normalized),
            };
            let end_index =
                locate(&normalized_pages, start_index.unwrap_or(0), &trail).or(body_index);

            let page_start = start_index.map_or(1, |index| index as u32 + 1);
            let page_end = end_index
                .map_or(page_start, |index| index as u32 + 1)
                .max(page_start);

            TextChunk {
                token_count: estimate_tokens(&text),
                text,
                page_start,
                page_end,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn split_text_handles_blank_input() {
        assert!(split_text("   \n\n ", 100, 10).is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = split_text("A short paragraph.", 1000, 200);
        assert_eq!(chunks, vec!["A short paragraph."]);
    }

    #[test]
    fn base_chunks_respect_size_and_overlap_bound() {
        let text = "Alpha alpha alpha. Beta beta beta. Gamma gamma gamma.";
        let chunks = split_text(text, 10, 2);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10 + 2 + 1, "chunk too long: {chunk:?}");
        }
        let joined = chunks.join(" ");
        for word in ["Alpha", "Beta", "Gamma"] {
            assert!(joined.contains(word));
        }
    }

    #[test]
    fn overlap_carries_previous_tail() {
        let chunks = apply_overlap(
            vec!["one two three".to_string(), "four five six".to_string()],
            20,
            5,
        );
        assert_eq!(chunks[0], "one two three");
        assert_eq!(chunks[1], "three four five six");
    }

    #[test]
    fn zero_overlap_leaves_chunks_untouched() {
        let input = vec!["one".to_string(), "two".to_string()];
        assert_eq!(apply_overlap(input.clone(), 10, 0), input);
    }

    #[test]
    fn tail_falls_back_to_raw_characters_without_boundary() {
        assert_eq!(tail_with_char_limit("abcdefgh", 3), "fgh");
        assert_eq!(tail_with_char_limit("ab", 3), "ab");
    }

    #[test]
    fn attribution_tracks_chunks_across_pages() {
        let pages = vec![
            "Introduction to the system and its goals.".to_string(),
            "Detailed design of the storage layer.\nIt spans two lines.".to_string(),
        ];
        let chunks = attribute_pages(
            vec![
                "Introduction to the system and its goals.".to_string(),
                "goals. Detailed design of the storage layer. It spans two lines.".to_string(),
                "Detailed design of the storage layer.".to_string(),
            ],
            &pages,
        );

        assert_eq!((chunks[0].page_start, chunks[0].page_end), (1, 1));
        assert_eq!((chunks[1].page_start, chunks[1].page_end), (1, 2));
        assert_eq!((chunks[2].page_start, chunks[2].page_end), (2, 2));
        assert_eq!(chunks[2].token_count, estimate_tokens("Detailed design of the storage layer."));
    }

    #[test]
    fn overlap_fragment_from_previous_page_extends_range() {
        let pages = vec!["Alpha alpha alpha.".to_string(), "Beta beta beta.".to_string()];
        let chunks = attribute_pages(
            vec!["a. Beta beta".to_string(), "ta beta.".to_string()],
            &pages,
        );
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (1, 2));
        assert_eq!((chunks[1].page_start, chunks[1].page_end), (2, 2));
    }

    #[test]
    fn unlocatable_chunks_default_to_first_page() {
        let pages = vec!["something else".to_string(), "entirely".to_string()];
        let chunks = attribute_pages(vec!["not present anywhere".to_string()], &pages);
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (1, 1));
    }

    #[test]
    fn end_page_never_precedes_start() {
        let pages = vec![
            "shared closing words".to_string(),
            "opening line here then shared closing words".to_string(),
        ];
        let chunks = attribute_pages(
            vec!["opening line here then shared closing words".to_string()],
            &pages,
        );
        assert_eq!(chunks[0].page_start, 2);
        assert!(chunks[0].page_end >= chunks[0].page_start);
    }
}
