//! Resumable book translation pipeline.
//!
//! Splits the source into pages, registers them in the job state, translates
//! outstanding pages one at a time, and merges the result into one document.

use crate::console::Console;
use crate::error::PipelineError;
use crate::pages::split_pages;
use crate::state::{JobState, PageStatus, PageUpdate, now};
use crate::translator::Translator;
use crate::utils::{truncate_chars, write_creating_dirs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Separator placed between pages in the exported document.
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Number of characters shown in the sample preview.
const SAMPLE_PREVIEW_CHARS: usize = 2000;

/// Shared interrupt flag, set from a signal handler.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the pipeline stop.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolves once [`Interrupt::trigger`] has been called.
    pub async fn triggered(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Options for [`Pipeline::run`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Continue from saved state instead of re-initializing.
    pub resume: bool,
    /// Translate at most this many pages.
    pub limit: Option<usize>,
    /// Skip pages numbered below this.
    pub start_page: Option<u32>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: true,
            limit: None,
            start_page: None,
        }
    }
}

/// Outcome of one [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Pages picked for this run, in processing order.
    pub selected: Vec<u32>,
    /// Pages that completed in this run.
    pub completed: Vec<u32>,
    /// Pages that failed in this run.
    pub failed: Vec<u32>,
    /// Whether the run stopped early on an interrupt.
    pub interrupted: bool,
    /// Completion rate of the whole job after the run.
    pub completion_rate: f64,
}

/// Drives a translation job from source document to merged output.
pub struct Pipeline {
    /// Source document.
    input: PathBuf,
    /// Merged output document.
    output: PathBuf,
    /// Job state.
    state: JobState,
    /// Page translator.
    translator: Translator,
    /// Pause after each page.
    page_delay: Duration,
    /// Stop request from the user.
    interrupt: Interrupt,
    /// Console for output.
    console: Console,
}

impl Pipeline {
    /// Create a pipeline over an already loaded job state.
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        state: JobState,
        translator: Translator,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            state,
            translator,
            page_delay: Duration::ZERO,
            interrupt: Interrupt::new(),
            console: Console::new(),
        }
    }

    /// Set the pause after each page.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Use `interrupt` to stop the translation loop.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Get the job state.
    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Get the job state for modification.
    pub fn state_mut(&mut self) -> &mut JobState {
        &mut self.state
    }

    /// Get the output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Read and split the source, register its pages, and save the state.
    ///
    /// Pages already in the state keep their status and translation.
    /// Returns the number of pages found.
    pub fn initialize(&mut self) -> Result<usize, PipelineError> {
        if !self.input.exists() {
            return Err(PipelineError::MissingInput(self.input.clone()));
        }

        self.console
            .step(&format!("Reading {}", self.input.display()));
        let text = std::fs::read_to_string(&self.input)?;

        let pages = split_pages(&text);
        self.console.info(&format!("Found {} pages", pages.len()));

        let page_count = pages.len();
        for (page_num, content) in pages {
            self.state.add_page(page_num, content);
        }

        let model = self.translator.model().to_string();
        let metadata = self.state.metadata_mut();
        metadata.source_file = self.input.display().to_string();
        metadata.total_pages = page_count;
        metadata.model = model;
        metadata.started_at = Some(now());

        self.state.save()?;
        tracing::info!(pages = page_count, "Initialized translation job");
        Ok(page_count)
    }

    /// Translate outstanding pages in ascending order.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunSummary, PipelineError> {
        if !options.resume || self.state.is_empty() {
            self.initialize()?;
        }

        let recovered = self.state.recover_interrupted()?;
        if !recovered.is_empty() {
            self.console.warning(&format!(
                "{} page(s) were left in progress and will be retried",
                recovered.len()
            ));
        }

        let mut pending = self.state.pending_pages();
        if pending.is_empty() {
            self.console.success("All pages are already translated!");
            return Ok(self.summary(Vec::new()));
        }

        if let Some(start) = options.start_page {
            pending.retain(|&page| page >= start);
        }
        pending.sort_unstable();
        if let Some(limit) = options.limit {
            pending.truncate(limit);
        }

        let mut summary = self.summary(pending.clone());
        let total = pending.len();

        self.console.section(&format!("Translating {} page(s)", total));
        self.console.info(&format!("Model: {}", self.translator.model()));
        self.console.info(&format!(
            "Current completion: {}",
            self.console.percent(self.state.completion_rate())
        ));

        for (index, page_num) in pending.into_iter().enumerate() {
            if self.interrupt.is_triggered() {
                summary.interrupted = true;
                break;
            }

            let Some(content) = self.state.page(page_num).map(|page| page.content.clone()) else {
                continue;
            };

            self.state
                .update_page(page_num, PageUpdate::status(PageStatus::InProgress))?;
            self.console.step(&format!(
                "{} translating...",
                self.console.page_info(page_num, index + 1, total)
            ));

            let interrupt = self.interrupt.clone();
            let outcome = tokio::select! {
                result = self.translator.translate(&content) => Some(result),
                _ = interrupt.triggered() => None,
            };

            match outcome {
                Some(Ok(translated)) => {
                    self.state
                        .update_page(page_num, PageUpdate::completed(translated))?;
                    summary.completed.push(page_num);
                }
                Some(Err(e)) => {
                    self.console
                        .error(&format!("Page {} translation failed: {}", page_num, e));
                    self.state
                        .update_page(page_num, PageUpdate::failed(e.to_string()))?;
                    summary.failed.push(page_num);
                }
                None => {
                    self.console.clear_line();
                    self.console
                        .warning("Interrupted by user. Progress has been saved.");
                    self.state
                        .update_page(page_num, PageUpdate::status(PageStatus::Pending))?;
                    summary.interrupted = true;
                    break;
                }
            }

            self.console.info(&format!(
                "{} completion {}",
                self.console.progress_bar(index + 1, total),
                self.console.percent(self.state.completion_rate())
            ));

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        summary.completion_rate = self.state.completion_rate();
        self.console.success(&format!(
            "Translation completion: {}",
            self.console.percent(summary.completion_rate)
        ));
        Ok(summary)
    }

    /// Merge pages in ascending order and write the output document.
    ///
    /// Completed pages contribute their translation; other pages contribute
    /// their original text unless `translated_only` is set.
    pub fn export(&self, translated_only: bool) -> Result<String, PipelineError> {
        self.console
            .step(&format!("Exporting to {}", self.output.display()));

        let merged = merge_pages(&self.state, translated_only);
        write_creating_dirs(&self.output, &merged)?;

        self.console
            .success(&format!("Saved: {}", self.output.display()));
        Ok(merged)
    }

    /// Translate a few pages from a fresh state and export only the result.
    ///
    /// The state file is deleted first, so every sample run starts over.
    pub async fn run_sample(
        &mut self,
        pages: usize,
        start_page: Option<u32>,
    ) -> Result<RunSummary, PipelineError> {
        let state_path = self.state.path().to_path_buf();
        if state_path.exists() {
            std::fs::remove_file(&state_path)?;
        }
        self.state.reset();

        self.console.section("Sample translation test");
        match start_page {
            Some(start) => self.console.info(&format!(
                "Sample pages: from {} (up to {} pages)",
                start, pages
            )),
            None => self.console.info(&format!("Sample pages: {}", pages)),
        }

        let summary = self
            .run(RunOptions {
                resume: false,
                limit: Some(pages),
                start_page,
            })
            .await?;
        let merged = self.export(true)?;

        self.console.section("Preview");
        let (preview, truncated) = truncate_chars(&merged, SAMPLE_PREVIEW_CHARS);
        println!("{}", preview);
        if truncated {
            println!("{}", self.console.muted("\n... (truncated) ..."));
        }

        Ok(summary)
    }

    fn summary(&self, selected: Vec<u32>) -> RunSummary {
        RunSummary {
            selected,
            completion_rate: self.state.completion_rate(),
            ..RunSummary::default()
        }
    }
}

/// Join pages for export. See [`Pipeline::export`].
pub fn merge_pages(state: &JobState, translated_only: bool) -> String {
    state
        .pages()
        .filter_map(|page| match (&page.status, &page.translated) {
            (PageStatus::Completed, Some(translated)) => Some(translated.as_str()),
            _ if translated_only => None,
            _ => Some(page.content.as_str()),
        })
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}
