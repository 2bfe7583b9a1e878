//! Fixed tables and heuristics shared by the candidate strategies.

use once_cell::sync::Lazy;
use regex::Regex;

/// Attribute names treated as dedicated test hooks, in rule order.
pub const TEST_ID_ATTRIBUTES: [&str; 3] = ["data-testid", "data-qa", "data-test"];

/// Tags that imply an accessible role even without a `role` attribute.
pub const ROLE_BEARING_TAGS: [&str; 3] = ["button", "input", "a"];

/// Text selectors are only proposed for text shorter than this (UTF-16 units).
pub const MAX_TEXT_SELECTOR_LEN: usize = 50;

/// Serialized markup kept on a snapshot.
pub const MARKUP_LIMIT: usize = 500;

pub const TESTID_SCORE: u32 = 40;
pub const ROLE_SCORE: u32 = 25;
pub const TEXT_SCORE: u32 = 15;
pub const ID_SCORE: u32 = 10;
pub const DYNAMIC_ID_SCORE: u32 = 5;
pub const CLASS_SCORE: u32 = 5;

static DYNAMIC_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4,}|[a-f0-9]{8}-[a-f0-9]{4}").expect("dynamic id pattern compiles")
});

/// Looks like a generated id: a run of four digits or a UUID prefix.
pub fn is_dynamic_id(id: &str) -> bool {
    DYNAMIC_ID.is_match(id)
}

/// Role implied by a lowercased tag name.
pub fn implied_role(tag: &str) -> &'static str {
    match tag {
        "button" => "button",
        "a" => "link",
        "input" | "textarea" => "textbox",
        "select" => "combobox",
        _ => "generic",
    }
}

/// Length as the page measures it.
pub fn js_length(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Cuts `text` to at most `limit` UTF-16 units, like `slice(0, limit)` in the
/// page. A surrogate pair split by the limit is dropped whole.
pub fn js_truncate(mut text: String, limit: usize) -> String {
    let mut units = 0;
    let cut = text.char_indices().find_map(|(index, ch)| {
        units += ch.len_utf16();
        (units > limit).then_some(index)
    });
    if let Some(index) = cut {
        text.truncate(index);
    }
    text
}
