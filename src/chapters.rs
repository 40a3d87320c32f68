//! Chapter splitting for the translated book.
//!
//! Finds chapter headings from a chapter catalog in the merged translation
//! and writes an mdBook source tree: one file per chapter, `SUMMARY.md`,
//! and `introduction.md`. Chapters whose heading cannot be found are
//! reported instead of being dropped silently.

use crate::error::ChapterError;
use crate::utils::write_creating_dirs;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Book-level text used for the introduction and table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookInfo {
    /// Translated book title.
    pub title: String,
    /// Subtitle shown under the title.
    pub subtitle: String,
    /// Author line.
    pub author: String,
    /// Short credit used when the document has no introduction text.
    pub byline: String,
    /// Short description placed before the introduction text.
    pub blurb: String,
    /// Link text for the introduction in `SUMMARY.md`.
    pub introduction_label: String,
}

impl Default for BookInfo {
    fn default() -> Self {
        Self {
            title: "게임 디자인의 예술".to_string(),
            subtitle: "A Book of Lenses".to_string(),
            author: "Jesse Schell (Carnegie Mellon University)".to_string(),
            byline: "Jesse Schell 저".to_string(),
            blurb: "이 책은 게임 디자이너가 자신의 작업을 다양한 관점(렌즈)으로 바라볼 수 있도록 돕는 가이드입니다.".to_string(),
            introduction_label: "소개".to_string(),
        }
    }
}

/// One known chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    /// Chapter number.
    pub number: u32,
    /// Heading text as it appears in the source language.
    pub heading: String,
    /// Title in the target language.
    pub title: String,
}

/// Ordered list of chapters to look for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterCatalog {
    #[serde(default)]
    pub book: BookInfo,
    pub chapters: Vec<ChapterEntry>,
}

/// Chapters of "The Art of Game Design" with Korean titles.
const DEFAULT_CHAPTERS: &[(u32, &str, &str)] = &[
    (1, "In the Beginning, There Is the Designer", "시작에는 디자이너가 있다"),
    (2, "The Designer Creates an Experience", "디자이너는 경험을 창조한다"),
    (3, "The Experience Rises Out of a Game", "경험은 게임에서 비롯된다"),
    (4, "The Game Consists of Elements", "게임은 요소들로 구성된다"),
    (5, "The Elements Support a Theme", "요소들은 테마를 지탱한다"),
    (6, "The Game Begins with an Idea", "게임은 아이디어에서 시작된다"),
    (7, "The Game Improves Through Iteration", "게임은 반복을 통해 개선된다"),
    (8, "The Game is Made for a Player", "게임은 플레이어를 위해 만들어진다"),
    (9, "The Experience is in the Player's Mind", "경험은 플레이어의 마음속에 있다"),
    (10, "Some Elements are Game Mechanics", "일부 요소는 게임 메커닉이다"),
    (11, "Game Mechanics Must be in Balance", "게임 메커닉은 균형을 이루어야 한다"),
    (12, "Game Mechanics Support Puzzles", "게임 메커닉은 퍼즐을 지원한다"),
    (13, "Players Play Games Through an Interface", "플레이어는 인터페이스를 통해 게임을 한다"),
    (14, "Experiences Can be Judged by Their Interest Curves", "경험은 흥미 곡선으로 평가할 수 있다"),
    (15, "One Kind of Experience Is the Story", "경험의 한 종류는 스토리다"),
    (16, "Story and Game Structures can be Artfully Merged with Indirect Control", "스토리와 게임 구조는 간접 제어로 예술적으로 융합될 수 있다"),
    (17, "Stories and Games Take Place in Worlds", "스토리와 게임은 세계 속에서 펼쳐진다"),
    (18, "Worlds Contain Characters", "세계에는 캐릭터가 있다"),
    (19, "Worlds Contain Spaces", "세계에는 공간이 있다"),
    (20, "The Look and Feel of a World Is Defined by Its Aesthetics", "세계의 외관과 느낌은 미학으로 정의된다"),
    (21, "Some Games are Played with Other Players", "일부 게임은 다른 플레이어와 함께 한다"),
    (22, "Other Players Sometimes Form Communities", "다른 플레이어들은 때때로 커뮤니티를 형성한다"),
    (23, "The Designer Usually Works with a Team", "디자이너는 보통 팀과 함께 일한다"),
    (24, "The Team Sometimes Communicates Through Documents", "팀은 때때로 문서를 통해 소통한다"),
    (25, "Good Games are Created Through Playtesting", "좋은 게임은 플레이테스트를 통해 만들어진다"),
];

impl Default for ChapterCatalog {
    fn default() -> Self {
        Self {
            book: BookInfo::default(),
            chapters: DEFAULT_CHAPTERS
                .iter()
                .map(|&(number, heading, title)| ChapterEntry {
                    number,
                    heading: heading.to_string(),
                    title: title.to_string(),
                })
                .collect(),
        }
    }
}

impl ChapterCatalog {
    /// Load a catalog from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, ChapterError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ChapterError::Catalog(e.to_string()))
    }

    /// Look up an entry by chapter number.
    pub fn entry(&self, number: u32) -> Option<&ChapterEntry> {
        self.chapters.iter().find(|entry| entry.number == number)
    }
}

/// A chapter cut out of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub number: u32,
    pub title: String,
    /// Chapter text from its heading up to the next chapter.
    pub content: String,
}

/// Result of splitting a document into chapters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterSplit {
    /// Found chapters keyed by number.
    pub chapters: BTreeMap<u32, Chapter>,
    /// Text before the first found chapter; `None` if nothing was found.
    pub introduction: Option<String>,
    /// Catalog chapters whose heading was not found, ascending.
    pub unmatched: Vec<u32>,
}

/// Files written by [`write_book`].
#[derive(Debug, Clone, Default)]
pub struct WrittenBook {
    pub chapter_files: Vec<PathBuf>,
    pub summary: PathBuf,
    pub introduction: PathBuf,
}

/// Heading patterns for one chapter, tried in order: exact numbered
/// heading, loose numbered heading, exact title heading, any heading that
/// contains the title. All are anchored at the start of a line.
fn heading_patterns(entry: &ChapterEntry) -> Result<Vec<Regex>, ChapterError> {
    let number = entry.number;
    let heading = regex::escape(&entry.heading);

    [
        format!(r"(?m)^# CHAPTER {}\b", number),
        format!(r"(?m)^#{{1,6}}[ \t]*CHAPTER[^\n]*?\b{}\b", number),
        format!(r"(?m)^# {}", heading),
        format!(r"(?m)^#{{1,6}}[ \t]*[^\n]*?{}", heading),
    ]
    .iter()
    .map(|pattern| {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(ChapterError::from)
    })
    .collect()
}

/// Byte offset where `entry` starts in `text`, if any pattern matches.
fn find_chapter_start(text: &str, entry: &ChapterEntry) -> Result<Option<usize>, ChapterError> {
    for regex in heading_patterns(entry)? {
        if let Some(found) = regex.find(text) {
            return Ok(Some(found.start()));
        }
    }
    Ok(None)
}

/// Split `text` into the catalog's chapters.
///
/// A chapter whose match lands on an offset already taken by an earlier
/// catalog entry counts as unmatched.
pub fn split_chapters(text: &str, catalog: &ChapterCatalog) -> Result<ChapterSplit, ChapterError> {
    let mut starts: Vec<(usize, &ChapterEntry)> = Vec::new();
    let mut unmatched = Vec::new();

    for entry in &catalog.chapters {
        match find_chapter_start(text, entry)? {
            Some(offset) if !starts.iter().any(|&(taken, _)| taken == offset) => {
                starts.push((offset, entry));
            }
            Some(offset) => {
                tracing::debug!(
                    chapter = entry.number,
                    offset,
                    "Chapter heading collides with an earlier chapter"
                );
                unmatched.push(entry.number);
            }
            None => unmatched.push(entry.number),
        }
    }

    starts.sort_by_key(|&(offset, _)| offset);
    unmatched.sort_unstable();

    let mut chapters = BTreeMap::new();
    for (index, &(offset, entry)) in starts.iter().enumerate() {
        let end = starts
            .get(index + 1)
            .map(|&(next, _)| next)
            .unwrap_or(text.len());
        chapters.insert(
            entry.number,
            Chapter {
                number: entry.number,
                title: entry.title.clone(),
                content: text[offset..end].trim().to_string(),
            },
        );
    }

    let introduction = starts
        .first()
        .map(|&(offset, _)| text[..offset].trim().to_string());

    Ok(ChapterSplit {
        chapters,
        introduction,
        unmatched,
    })
}

/// File name of a chapter, e.g. `chapter07.md`.
pub fn chapter_file_name(number: u32) -> String {
    format!("chapter{:02}.md", number)
}

/// Render a chapter file with its injected heading.
pub fn render_chapter(chapter: &Chapter) -> String {
    format!(
        "# Chapter {}: {}\n\n{}",
        chapter.number, chapter.title, chapter.content
    )
}

/// Render `SUMMARY.md` listing the found chapters in order.
pub fn render_summary(split: &ChapterSplit, book: &BookInfo) -> String {
    let mut lines = vec![
        "# Summary".to_string(),
        String::new(),
        format!("[{}](./introduction.md)", book.introduction_label),
        String::new(),
    ];

    for chapter in split.chapters.values() {
        lines.push(format!(
            "- [Chapter {}: {}](./chapters/{})",
            chapter.number,
            chapter.title,
            chapter_file_name(chapter.number)
        ));
    }

    lines.join("\n")
}

/// Render `introduction.md`.
pub fn render_introduction(split: &ChapterSplit, book: &BookInfo) -> String {
    let intro = match &split.introduction {
        Some(text) => text.clone(),
        None => format!("# {}\n\n{}", book.title, book.byline),
    };

    format!(
        "# {title}\n\n## {subtitle}\n\n**저자**: {author}\n\n---\n\n{blurb}\n\n---\n\n{intro}\n",
        title = book.title,
        subtitle = book.subtitle,
        author = book.author,
        blurb = book.blurb,
        intro = intro,
    )
}

/// Write the mdBook source tree for `split` under `src_dir`.
pub fn write_book(
    split: &ChapterSplit,
    book: &BookInfo,
    src_dir: &Path,
) -> Result<WrittenBook, ChapterError> {
    let chapters_dir = src_dir.join("chapters");
    std::fs::create_dir_all(&chapters_dir)?;

    let introduction = src_dir.join("introduction.md");
    write_creating_dirs(&introduction, &render_introduction(split, book))?;

    let mut chapter_files = Vec::new();
    for chapter in split.chapters.values() {
        let path = chapters_dir.join(chapter_file_name(chapter.number));
        std::fs::write(&path, render_chapter(chapter))?;
        chapter_files.push(path);
    }

    let summary = src_dir.join("SUMMARY.md");
    std::fs::write(&summary, render_summary(split, book))?;

    Ok(WrittenBook {
        chapter_files,
        summary,
        introduction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOC: &str = "Preface text\n\n# CHAPTER 3\n셋째 장 내용\n\n# CHAPTER 1\n첫째 장 내용\n";

    #[test]
    fn test_default_catalog() {
        let catalog = ChapterCatalog::default();
        assert_eq!(catalog.chapters.len(), 25);
        assert_eq!(catalog.entry(9).unwrap().heading, "The Experience is in the Player's Mind");
        assert!(catalog.entry(26).is_none());
    }

    #[test]
    fn test_two_of_twenty_five() {
        let split = split_chapters(DOC, &ChapterCatalog::default()).unwrap();

        assert_eq!(split.chapters.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(split.unmatched.len(), 23);
        assert!(!split.unmatched.contains(&1));
        assert_eq!(split.introduction.as_deref(), Some("Preface text"));

        // Slices follow document order, not chapter order.
        assert_eq!(split.chapters[&3].content, "# CHAPTER 3\n셋째 장 내용");
        assert_eq!(split.chapters[&1].content, "# CHAPTER 1\n첫째 장 내용");
    }

    #[test]
    fn test_number_needs_word_boundary() {
        let doc = "# CHAPTER 10\nten\n";
        let split = split_chapters(doc, &ChapterCatalog::default()).unwrap();

        assert_eq!(split.chapters.keys().copied().collect::<Vec<_>>(), vec![10]);
        assert!(split.unmatched.contains(&1));
    }

    #[test]
    fn test_fallback_patterns() {
        let doc = "intro\n# chapter two: 2\nloose\n## The Game Begins with an Idea\nidea\n### 4. The Game Consists of Elements\nelements\n";
        let split = split_chapters(doc, &ChapterCatalog::default()).unwrap();

        assert_eq!(
            split.chapters.keys().copied().collect::<Vec<_>>(),
            vec![2, 4, 6]
        );
        assert!(split.chapters[&6].content.starts_with("## The Game Begins"));
        assert!(split.chapters[&4].content.starts_with("### 4."));
    }

    #[test]
    fn test_heading_is_escaped() {
        let catalog = ChapterCatalog {
            book: BookInfo::default(),
            chapters: vec![ChapterEntry {
                number: 1,
                heading: "What? (Really)".to_string(),
                title: "정말?".to_string(),
            }],
        };

        let split = split_chapters("# What? (Really)\nbody", &catalog).unwrap();
        assert_eq!(split.chapters.len(), 1);

        let split = split_chapters("# Wha (Really)\nbody", &catalog).unwrap();
        assert_eq!(split.unmatched, vec![1]);
    }

    #[test]
    fn test_shared_offset_is_unmatched() {
        let catalog = ChapterCatalog {
            book: BookInfo::default(),
            chapters: vec![
                ChapterEntry {
                    number: 1,
                    heading: "Same".to_string(),
                    title: "하나".to_string(),
                },
                ChapterEntry {
                    number: 2,
                    heading: "Same".to_string(),
                    title: "둘".to_string(),
                },
            ],
        };

        let split = split_chapters("# Same\ntext", &catalog).unwrap();
        assert_eq!(split.chapters.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(split.unmatched, vec![2]);
    }

    #[test]
    fn test_no_chapters_found() {
        let split = split_chapters("just text", &ChapterCatalog::default()).unwrap();
        assert!(split.chapters.is_empty());
        assert_eq!(split.introduction, None);
        assert_eq!(split.unmatched.len(), 25);

        let intro = render_introduction(&split, &BookInfo::default());
        assert!(intro.ends_with("---\n\n# 게임 디자인의 예술\n\nJesse Schell 저\n"));
        assert!(intro.contains("**저자**: Jesse Schell (Carnegie Mellon University)"));
    }

    #[test]
    fn test_write_book() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let catalog = ChapterCatalog::default();
        let split = split_chapters(DOC, &catalog).unwrap();

        let written = write_book(&split, &catalog.book, &src).unwrap();
        assert_eq!(written.chapter_files.len(), 2);

        let mut files: Vec<String> = std::fs::read_dir(src.join("chapters"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["chapter01.md", "chapter03.md"]);

        let chapter3 = std::fs::read_to_string(src.join("chapters/chapter03.md")).unwrap();
        assert!(chapter3.starts_with("# Chapter 3: 경험은 게임에서 비롯된다\n\n# CHAPTER 3"));

        let summary = std::fs::read_to_string(&written.summary).unwrap();
        let entries: Vec<&str> = summary.lines().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(
            entries,
            vec![
                "- [Chapter 1: 시작에는 디자이너가 있다](./chapters/chapter01.md)",
                "- [Chapter 3: 경험은 게임에서 비롯된다](./chapters/chapter03.md)",
            ]
        );
        assert!(summary.contains("[소개](./introduction.md)"));

        let intro = std::fs::read_to_string(&written.introduction).unwrap();
        assert!(intro.ends_with("Preface text\n"));
    }

    #[test]
    fn test_catalog_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(
            &path,
            r#"
[book]
title = "My Book"

[[chapters]]
number = 1
heading = "Start"
title = "시작"
"#,
        )
        .unwrap();

        let catalog = ChapterCatalog::load_from(&path).unwrap();
        assert_eq!(catalog.book.title, "My Book");
        assert_eq!(catalog.book.introduction_label, "소개");
        assert_eq!(catalog.chapters.len(), 1);

        std::fs::write(&path, "chapters = 3").unwrap();
        assert!(matches!(
            ChapterCatalog::load_from(&path),
            Err(ChapterError::Catalog(_))
        ));
    }
}
