//! Honyaku - resumable markdown book translator.
//!
//! This library provides functionality for:
//! - Splitting a markdown book into pages and translating them one at a time
//!   through a locally hosted, OpenAI-compatible model server
//! - Tracking per-page progress in a JSON state file so jobs can resume
//! - Splitting the translated book into chapters for an mdBook site and
//!   refreshing the chapter list of a static site

pub mod chapters;
pub mod config;
pub mod console;
pub mod error;
pub mod pages;
pub mod pipeline;
pub mod protector;
pub mod site;
pub mod state;
pub mod translator;
pub mod utils;

// Re-export commonly used types
pub use chapters::{ChapterCatalog, ChapterSplit, split_chapters, write_book};
pub use config::Config;
pub use console::Console;
pub use error::{
    ChapterError, ConfigError, PipelineError, SiteError, StateError, TranslationError,
};
pub use pages::split_pages;
pub use pipeline::{Interrupt, Pipeline, RunOptions, RunSummary};
pub use protector::{Protected, protect};
pub use state::{JobState, PageRecord, PageStatus, PageUpdate};
pub use translator::{ChatCompletionsBackend, ChatPrompt, ModelBackend, Translator};
