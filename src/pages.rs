//! Page splitting for source documents.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Regex for a page marker line such as `## Page 12`.
static PAGE_MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^## Page (\d+)\s*$").expect("Invalid PAGE_MARKER_REGEX"));

/// Splits a document into pages keyed by the number in each `## Page N` marker.
///
/// Each page runs from its marker line (included) up to the next marker and is
/// trimmed of surrounding whitespace. Text before the first marker is dropped.
/// Numbers are used as written, so gaps and out-of-order pages are kept; a
/// repeated number keeps the later region.
pub fn split_pages(text: &str) -> BTreeMap<u32, String> {
    let mut pages = BTreeMap::new();
    let mut current_page: Option<u32> = None;
    let mut current_content: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if let Some(number) = page_marker(line) {
            if let Some(page) = current_page {
                pages.insert(page, current_content.join("\n").trim().to_string());
            }
            current_page = Some(number);
            current_content = vec![line];
        } else if current_page.is_some() {
            current_content.push(line);
        }
    }

    if let Some(page) = current_page {
        pages.insert(page, current_content.join("\n").trim().to_string());
    }

    pages
}

/// Returns the page number if `line` is a page marker.
fn page_marker(line: &str) -> Option<u32> {
    PAGE_MARKER_REGEX
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
}
