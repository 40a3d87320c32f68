//! Chapter list maintenance for the static book site.
//!
//! Reads `chapter<N>.md` files from a folder and rewrites the chapter list
//! in the site's `index.html`.

use crate::error::SiteError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Regex for chapter file names such as `chapter3.md` or `chapter03.md`.
static CHAPTER_FILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^chapter(\d+)\.md$").expect("Invalid CHAPTER_FILE_REGEX"));

/// Regex for a markdown heading line. Applied to single lines.
static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+[ \t]*(.+)$").expect("Invalid HEADING_REGEX"));

/// Regex for the chapter list element in `index.html`.
static CHAPTER_LIST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<ul class="chapter-list" id="chapterList">)[\s\S]*?(</ul>)"#)
        .expect("Invalid CHAPTER_LIST_REGEX")
});

/// Indentation of list items inside the chapter list.
const ITEM_INDENT: &str = "                    ";

/// Indentation of the closing `</ul>`.
const CLOSE_INDENT: &str = "                ";

/// A chapter file of the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteChapter {
    pub number: u32,
    pub title: String,
    pub file: PathBuf,
}

/// Title of a chapter: its first non-empty heading, or a numbered fallback.
pub fn chapter_title(markdown: &str, number: u32) -> String {
    markdown
        .lines()
        .filter_map(|line| HEADING_REGEX.captures(line))
        .map(|caps| caps[1].trim().to_string())
        .find(|title| !title.is_empty())
        .unwrap_or_else(|| format!("챕터 {}", number))
}

/// Collect the chapter files in `dir`, sorted by chapter number.
pub fn scan_chapters(dir: &Path) -> Result<Vec<SiteChapter>, SiteError> {
    if !dir.is_dir() {
        return Err(SiteError::MissingDirectory(dir.to_path_buf()));
    }

    let mut chapters = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(number) = CHAPTER_FILE_REGEX
            .captures(name)
            .and_then(|caps| caps[1].parse::<u32>().ok())
        else {
            continue;
        };

        let content = std::fs::read_to_string(&path)?;
        chapters.push(SiteChapter {
            number,
            title: chapter_title(&content, number),
            file: path,
        });
    }

    chapters.sort_by_key(|chapter| chapter.number);
    Ok(chapters)
}

/// Escape text for use inside HTML element content.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the `<li>` items for the chapter list.
pub fn render_chapter_list(chapters: &[SiteChapter]) -> String {
    chapters
        .iter()
        .map(|chapter| {
            format!(
                r##"{}<li><a href="#" data-chapter="{}">{}</a></li>"##,
                ITEM_INDENT,
                chapter.number,
                escape_html(&chapter.title)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the chapter list inside `html`.
pub fn update_index_html(html: &str, chapters: &[SiteChapter]) -> Result<String, SiteError> {
    let caps = CHAPTER_LIST_REGEX
        .captures(html)
        .ok_or(SiteError::ChapterListNotFound)?;
    let whole = caps.get(0).ok_or(SiteError::ChapterListNotFound)?;

    let replacement = format!(
        "{}\n{}\n{}{}",
        &caps[1],
        render_chapter_list(chapters),
        CLOSE_INDENT,
        &caps[2]
    );

    let mut updated = String::with_capacity(html.len() + replacement.len());
    updated.push_str(&html[..whole.start()]);
    updated.push_str(&replacement);
    updated.push_str(&html[whole.end()..]);
    Ok(updated)
}

/// Rebuild the chapter list of `index_path` from the files in `chapters_dir`.
///
/// Returns the chapters that were listed.
pub fn update_index_file(
    chapters_dir: &Path,
    index_path: &Path,
) -> Result<Vec<SiteChapter>, SiteError> {
    let chapters = scan_chapters(chapters_dir)?;
    if chapters.is_empty() {
        return Err(SiteError::NoChapters(chapters_dir.to_path_buf()));
    }

    let html = std::fs::read_to_string(index_path)?;
    let updated = update_index_html(&html, &chapters)?;
    std::fs::write(index_path, updated)?;

    tracing::info!(
        chapters = chapters.len(),
        index = %index_path.display(),
        "Updated site chapter list"
    );
    Ok(chapters)
}
