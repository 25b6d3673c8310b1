//! Cleanup passes applied to raw model output before splitting.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on a raw answer.
pub(crate) fn run_pipeline(text: &str) -> String {
    strip_markup_tags(text)
}

// ---------------------------------------------------------------------------
// Pass 1: Strip markup tags
// ---------------------------------------------------------------------------

/// Remove every angle-bracket tag, keeping the text between tags.
pub(crate) fn strip_markup_tags(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

    TAG_RE.replace_all(text, "").into_owned()
}
