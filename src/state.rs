//! Job state store for resumable translation.
//!
//! Keeps one record per page plus job metadata, and rewrites the whole
//! JSON state file after every mutation so an interrupted job can resume
//! from the last completed write.

use crate::error::StateError;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Translation status of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PageStatus {
    /// Returns the status as written in the state file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a page in this status still needs translating.
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Whether the page lifecycle allows moving from `self` to `next`.
    ///
    /// Setting the current status again is always allowed. `Completed` is
    /// final; only [`JobState::reset`] clears it.
    pub fn can_transition_to(self, next: PageStatus) -> bool {
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Failed, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::InProgress, Self::Pending)
        )
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record for one page of the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page number from the source marker.
    pub page_num: u32,
    /// Original page text.
    pub content: String,
    /// Translated text, once available.
    #[serde(default)]
    pub translated: Option<String>,
    /// Current status.
    #[serde(default)]
    pub status: PageStatus,
    /// Last error message; only set while the page is failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Time of the last change.
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl PageRecord {
    /// Create a pending record.
    pub fn new(page_num: u32, content: String) -> Self {
        Self {
            page_num,
            content,
            translated: None,
            status: PageStatus::Pending,
            error: None,
            timestamp: None,
        }
    }
}

/// Metadata describing the whole job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobMetadata {
    /// Source document path as given by the user.
    pub source_file: String,
    /// Number of pages found in the source.
    pub total_pages: usize,
    /// Model identifier used for translation.
    pub model: String,
    /// When the job was (last) initialized.
    pub started_at: Option<NaiveDateTime>,
    /// When the state file was last written.
    pub last_updated: Option<NaiveDateTime>,
}

/// On-disk layout of the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateData {
    #[serde(default)]
    metadata: JobMetadata,
    #[serde(default)]
    pages: BTreeMap<u32, PageRecord>,
}

/// Fields to change in [`JobState::update_page`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct PageUpdate {
    pub translated: Option<String>,
    pub status: Option<PageStatus>,
    pub error: Option<String>,
}

impl PageUpdate {
    /// Update that only changes the status.
    pub fn status(status: PageStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Update marking the page completed with its translation.
    pub fn completed(translated: String) -> Self {
        Self {
            translated: Some(translated),
            status: Some(PageStatus::Completed),
            error: None,
        }
    }

    /// Update marking the page failed with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            translated: None,
            status: Some(PageStatus::Failed),
            error: Some(error.into()),
        }
    }
}

/// Page counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Persistent job state backed by a JSON file.
pub struct JobState {
    /// Path to the JSON file.
    filepath: PathBuf,
    /// The state data.
    data: StateData,
}

impl JobState {
    /// Load the state at `path`, or start empty if the file does not exist.
    ///
    /// A file that exists but cannot be parsed is an error; nothing is
    /// salvaged from it.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let filepath = path.into();
        let data = if filepath.exists() {
            let content = std::fs::read_to_string(&filepath)?;
            serde_json::from_str(&content)?
        } else {
            StateData::default()
        };

        tracing::debug!(
            path = %filepath.display(),
            pages = data.pages.len(),
            "Loaded job state"
        );

        Ok(Self { filepath, data })
    }

    /// Get the filepath for this store.
    pub fn path(&self) -> &Path {
        &self.filepath
    }

    /// Write the whole store to disk, replacing the file atomically.
    pub fn save(&mut self) -> Result<(), StateError> {
        self.data.metadata.last_updated = Some(now());

        let parent = match self.filepath.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let content = serde_json::to_string_pretty(&self.data)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.filepath)
            .map_err(|e| StateError::WriteError(e.to_string()))?;

        tracing::trace!(path = %self.filepath.display(), "Saved job state");
        Ok(())
    }

    /// Register a page as pending. Existing pages are left untouched.
    pub fn add_page(&mut self, page_num: u32, content: impl Into<String>) {
        self.data
            .pages
            .entry(page_num)
            .or_insert_with(|| PageRecord::new(page_num, content.into()));
    }

    /// Apply `update` to a page, stamp it, and persist the store.
    ///
    /// Unknown page numbers are ignored. A status change the lifecycle does
    /// not allow is rejected before anything is modified.
    pub fn update_page(&mut self, page_num: u32, update: PageUpdate) -> Result<(), StateError> {
        let Some(page) = self.data.pages.get_mut(&page_num) else {
            tracing::debug!(page = page_num, "Ignoring update for unknown page");
            return Ok(());
        };

        if let Some(next) = update.status
            && !page.status.can_transition_to(next)
        {
            return Err(StateError::InvalidTransition {
                page: page_num,
                from: page.status,
                to: next,
            });
        }

        if let Some(translated) = update.translated {
            page.translated = Some(translated);
        }
        if let Some(status) = update.status {
            page.status = status;
        }
        if let Some(error) = update.error {
            page.error = Some(error);
        }
        if page.status != PageStatus::Failed {
            page.error = None;
        }
        page.timestamp = Some(now());

        self.save()
    }

    /// Page numbers that still need translating (pending or failed), ascending.
    pub fn pending_pages(&self) -> Vec<u32> {
        self.data
            .pages
            .values()
            .filter(|page| page.status.is_outstanding())
            .map(|page| page.page_num)
            .collect()
    }

    /// Percentage of pages that are completed; `0.0` when there are none.
    pub fn completion_rate(&self) -> f64 {
        if self.data.pages.is_empty() {
            return 0.0;
        }

        let completed = self
            .data
            .pages
            .values()
            .filter(|page| page.status == PageStatus::Completed)
            .count();

        completed as f64 / self.data.pages.len() as f64 * 100.0
    }

    /// Count pages per status.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for page in self.data.pages.values() {
            match page.status {
                PageStatus::Pending => counts.pending += 1,
                PageStatus::InProgress => counts.in_progress += 1,
                PageStatus::Completed => counts.completed += 1,
                PageStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Move pages left `in_progress` by a crashed run back to `pending`.
    ///
    /// Returns the recovered page numbers. Persists only if something changed.
    pub fn recover_interrupted(&mut self) -> Result<Vec<u32>, StateError> {
        let mut recovered = Vec::new();
        let stamp = now();

        for page in self.data.pages.values_mut() {
            if page.status == PageStatus::InProgress {
                page.status = PageStatus::Pending;
                page.timestamp = Some(stamp);
                recovered.push(page.page_num);
            }
        }

        if !recovered.is_empty() {
            tracing::info!(pages = ?recovered, "Recovered pages left in progress");
            self.save()?;
        }

        Ok(recovered)
    }

    /// Discard every page and all metadata (explicit full re-run).
    ///
    /// Only the in-memory state is cleared; the next save rewrites the file.
    pub fn reset(&mut self) {
        self.data = StateData::default();
    }

    /// Get a page record.
    pub fn page(&self, page_num: u32) -> Option<&PageRecord> {
        self.data.pages.get(&page_num)
    }

    /// Iterate over all pages in ascending page order.
    pub fn pages(&self) -> impl Iterator<Item = &PageRecord> {
        self.data.pages.values()
    }

    /// Get the job metadata.
    pub fn metadata(&self) -> &JobMetadata {
        &self.data.metadata
    }

    /// Get the job metadata for modification.
    pub fn metadata_mut(&mut self) -> &mut JobMetadata {
        &mut self.data.metadata
    }

    /// Get the number of pages.
    pub fn len(&self) -> usize {
        self.data.pages.len()
    }

    /// Check if there are no pages.
    pub fn is_empty(&self) -> bool {
        self.data.pages.is_empty()
    }
}

/// Current local time, as written to the state file.
pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JobState {
        JobState::load(dir.path().join("state.json")).unwrap()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let state = store_in(&temp_dir);

        assert!(state.is_empty());
        assert_eq!(state.completion_rate(), 0.0);
        assert!(state.pending_pages().is_empty());
        assert!(!state.path().exists());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(JobState::load(&path), Err(StateError::Parse(_))));
    }

    #[test]
    fn test_add_page_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);

        state.add_page(1, "original");
        state
            .update_page(1, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        state
            .update_page(1, PageUpdate::completed("번역".to_string()))
            .unwrap();

        state.add_page(1, "something else");

        let page = state.page(1).unwrap();
        assert_eq!(page.content, "original");
        assert_eq!(page.status, PageStatus::Completed);
        assert_eq!(page.translated.as_deref(), Some("번역"));
    }

    #[test]
    fn test_update_persists_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        state.add_page(4, "four");
        state
            .update_page(4, PageUpdate::status(PageStatus::InProgress))
            .unwrap();

        let reloaded = store_in(&temp_dir);
        let page = reloaded.page(4).unwrap();
        assert_eq!(page.status, PageStatus::InProgress);
        assert!(page.timestamp.is_some());
        assert!(reloaded.metadata().last_updated.is_some());
    }

    #[test]
    fn test_update_unknown_page_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);

        state
            .update_page(99, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        assert!(state.is_empty());
        assert!(!state.path().exists());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        state.add_page(1, "one");

        let err = state
            .update_page(1, PageUpdate::completed("x".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::InvalidTransition {
                page: 1,
                from: PageStatus::Pending,
                to: PageStatus::Completed,
            }
        ));
        assert_eq!(state.page(1).unwrap().translated, None);
    }

    #[test]
    fn test_completed_is_final() {
        assert!(!PageStatus::Completed.can_transition_to(PageStatus::InProgress));
        assert!(!PageStatus::Completed.can_transition_to(PageStatus::Pending));
        assert!(PageStatus::Failed.can_transition_to(PageStatus::InProgress));
        assert!(PageStatus::InProgress.can_transition_to(PageStatus::Pending));
        assert!(!PageStatus::Pending.can_transition_to(PageStatus::Failed));
    }

    #[test]
    fn test_error_cleared_when_not_failed() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        state.add_page(1, "one");

        state
            .update_page(1, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        state.update_page(1, PageUpdate::failed("timeout")).unwrap();
        assert_eq!(state.page(1).unwrap().error.as_deref(), Some("timeout"));

        state
            .update_page(1, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        assert_eq!(state.page(1).unwrap().error, None);
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        state.add_page(1, "one");
        state.add_page(2, "two");
        state.add_page(5, "five");
        state.metadata_mut().source_file = "book.md".to_string();
        state.metadata_mut().total_pages = 3;
        state.metadata_mut().model = "translategemma".to_string();

        state
            .update_page(1, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        state
            .update_page(1, PageUpdate::completed("하나".to_string()))
            .unwrap();
        state
            .update_page(2, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        state.update_page(2, PageUpdate::failed("HTTP 500")).unwrap();

        let reloaded = store_in(&temp_dir);
        assert_eq!(reloaded.metadata(), state.metadata());
        let original: Vec<&PageRecord> = state.pages().collect();
        let loaded: Vec<&PageRecord> = reloaded.pages().collect();
        assert_eq!(original, loaded);
        assert_eq!(reloaded.page(5).unwrap().translated, None);
        assert_eq!(reloaded.page(5).unwrap().error, None);
    }

    #[test]
    fn test_file_layout() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        state.add_page(3, "three");
        state.save().unwrap();

        let raw = std::fs::read_to_string(state.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let page = &json["pages"]["3"];
        assert_eq!(page["page_num"], 3);
        assert_eq!(page["status"], "pending");
        assert!(page["translated"].is_null());
        assert!(page["error"].is_null());
        assert!(json["metadata"]["last_updated"].is_string());
    }

    #[test]
    fn test_reads_existing_state_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(
            &path,
            r###"{
  "metadata": {
    "source_file": "book.md",
    "total_pages": 2,
    "model": "translategemma",
    "started_at": "2026-01-05T09:30:00.123456",
    "last_updated": "2026-01-05T09:45:10.000001"
  },
  "pages": {
    "1": {"page_num": 1, "content": "## Page 1", "translated": "## 페이지 1",
          "status": "completed", "error": null, "timestamp": "2026-01-05T09:40:00.5"},
    "2": {"page_num": 2, "content": "## Page 2", "translated": null,
          "status": "failed", "error": "boom", "timestamp": null}
  }
}"###,
        )
        .unwrap();

        let state = JobState::load(&path).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.metadata().total_pages, 2);
        assert_eq!(state.page(2).unwrap().status, PageStatus::Failed);
        assert_eq!(state.pending_pages(), vec![2]);
        assert_eq!(state.completion_rate(), 50.0);
    }

    #[test]
    fn test_pending_and_completion() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        for n in [3, 1, 2, 4] {
            state.add_page(n, format!("page {}", n));
        }

        state
            .update_page(1, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        state
            .update_page(1, PageUpdate::completed("done".to_string()))
            .unwrap();
        state
            .update_page(2, PageUpdate::status(PageStatus::InProgress))
            .unwrap();
        state.update_page(2, PageUpdate::failed("err")).unwrap();
        state
            .update_page(4, PageUpdate::status(PageStatus::InProgress))
            .unwrap();

        assert_eq!(state.pending_pages(), vec![2, 3]);
        assert_eq!(state.completion_rate(), 25.0);
        assert_eq!(
            state.status_counts(),
            StatusCounts {
                pending: 1,
                in_progress: 1,
                completed: 1,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_recover_interrupted() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        state.add_page(1, "one");
        state.add_page(2, "two");
        state
            .update_page(2, PageUpdate::status(PageStatus::InProgress))
            .unwrap();

        let recovered = state.recover_interrupted().unwrap();
        assert_eq!(recovered, vec![2]);
        assert_eq!(state.pending_pages(), vec![1, 2]);

        let reloaded = store_in(&temp_dir);
        assert_eq!(reloaded.page(2).unwrap().status, PageStatus::Pending);
    }

    #[test]
    fn test_reset_clears_everything() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = store_in(&temp_dir);
        state.add_page(1, "one");
        state.metadata_mut().model = "m".to_string();

        state.reset();
        assert!(state.is_empty());
        assert_eq!(state.metadata(), &JobMetadata::default());
    }
}
