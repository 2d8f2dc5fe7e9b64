//! Question cleanup before embedding.

use std::sync::LazyLock;

use regex::Regex;

static FILLER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:hey|hi|hello|please|kindly|can you|could you|would you|tell me)\b[\s,.!]*",
    )
    .expect("valid filler prefix regex")
});

static POLITE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s,]*\b(?:please|thanks|thank you)[\s.!]*(\?)?\s*$")
        .expect("valid polite suffix regex")
});

static DISALLOWED_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s?'-]").expect("valid punctuation regex"));

/// Lowercase, strip filler prefixes and polite suffixes, drop punctuation other than `?`,
/// apostrophes, and hyphens, and collapse whitespace.
///
/// Falls back to the lowercased, trimmed input when cleanup would leave nothing.
pub fn normalize_question(question: &str) -> String {
    let lowered = question.trim().to_lowercase();

    let mut current = lowered.clone();
    loop {
        let stripped = FILLER_PREFIX.replace(&current, "").trim_start().to_string();
        if stripped == current {
            break;
        }
        current = stripped;
    }

    let without_suffix = POLITE_SUFFIX.replace(&current, "$1");
    let without_punctuation = DISALLOWED_PUNCTUATION.replace_all(&without_suffix, "");
    let collapsed = without_punctuation
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.is_empty() || collapsed == "?" {
        lowered
    } else {
        collapsed
    }
}
