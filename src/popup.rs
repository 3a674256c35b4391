//! Background popup and toast watcher, one per device.
//!
//! The watcher owns a pattern list and a bounded history. A spawned task polls
//! the device, dismisses known popups, captures toasts and appends a record for
//! everything it sees. Both collections sit behind their own short-lived locks
//! so foreground callers can reconfigure or read history while the loop runs.

use crate::config::WatcherConfig;
use crate::device::{wait_until_gone, Device, DeviceError, ElementQuery};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const NATIVE_TOAST: &str = "native_toast";
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum PopupError {
    #[error("cannot read pattern file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pattern file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ========================= Patterns =========================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupKind {
    /// Detected and dismissed.
    #[default]
    Popup,
    /// Detected and recorded with its text, never dismissed.
    Toast,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopupPattern {
    #[serde(default)]
    pub name: String,
    pub detect: ElementQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismiss: Option<ElementQuery>,
    #[serde(default)]
    pub kind: PopupKind,
}

impl PopupPattern {
    pub fn popup(name: impl Into<String>, detect: ElementQuery, dismiss: ElementQuery) -> Self {
        Self { name: name.into(), detect, dismiss: Some(dismiss), kind: PopupKind::Popup }
    }

    pub fn toast(name: impl Into<String>, detect: ElementQuery) -> Self {
        Self { name: name.into(), detect, dismiss: None, kind: PopupKind::Toast }
    }
}

#[derive(Debug, Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: Vec<PopupPattern>,
}

/// Reads `{"patterns": [...]}` from disk.
pub fn load_patterns(path: &Path) -> Result<Vec<PopupPattern>, PopupError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| PopupError::Io { path: path.to_path_buf(), source })?;
    let file: PatternFile = serde_json::from_str(&raw)
        .map_err(|source| PopupError::Parse { path: path.to_path_buf(), source })?;
    Ok(file.patterns)
}

// ========================= History =========================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopupRecord {
    pub id: String,
    pub name: String,
    pub kind: PopupKind,
    pub timestamp: DateTime<Utc>,
    pub dismissed: bool,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_text: Option<String>,
    pub message: String,
}

impl PopupRecord {
    fn new(name: &str, kind: PopupKind, message: String) -> Self {
        Self {
            id: nanoid::nanoid!(),
            name: name.to_string(),
            kind,
            timestamp: Utc::now(),
            dismissed: false,
            verified: false,
            captured_text: None,
            message,
        }
    }

    fn toast(name: &str, text: Option<String>) -> Self {
        let message = match (&text, name) {
            (Some(t), NATIVE_TOAST) => format!("Toast: {t}"),
            (Some(t), _) => format!("Toast '{name}': {t}"),
            (None, _) => format!("Toast '{name}' detected"),
        };
        let mut record = Self::new(name, PopupKind::Toast, message);
        record.captured_text = text;
        record
    }

    fn popup(name: &str, dismissed: bool, verified: bool) -> Self {
        let message = match (dismissed, verified) {
            (true, true) => format!("Auto-dismissed '{name}'"),
            (true, false) => format!("Clicked dismiss for '{name}' but popup still visible"),
            _ => format!("Detected '{name}' but dismiss button not found"),
        };
        let mut record = Self::new(name, PopupKind::Popup, message);
        record.dismissed = dismissed;
        record.verified = verified;
        record
    }
}

/// Fixed-capacity record buffer; the oldest entry is evicted first.
#[derive(Debug)]
pub struct PopupHistory {
    records: VecDeque<PopupRecord>,
    capacity: usize,
}

impl PopupHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { records: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, record: PopupRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Up to `limit` records, newest first.
    pub fn newest(&self, limit: usize) -> Vec<PopupRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

// ========================= Reports =========================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigureReport {
    pub added: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatcherStart {
    Started { pattern_count: usize },
    AlreadyRunning { pattern_count: usize },
    NoPatterns,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatcherStop {
    Stopped,
    NotRunning,
    /// The loop ignored cancellation within the bound and was detached.
    TimedOut,
}

#[derive(Clone, Debug, Serialize)]
pub struct VisiblePopup {
    pub name: String,
    pub detect: ElementQuery,
    pub dismiss: Option<ElementQuery>,
    pub kind: PopupKind,
}

#[derive(Clone, Debug, Serialize)]
pub struct PopupCheck {
    pub found: Vec<VisiblePopup>,
    pub checked: usize,
    pub any_visible: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryReport {
    pub entries: Vec<PopupRecord>,
    pub total: usize,
    pub returned: usize,
    pub watcher_active: bool,
    pub pattern_count: usize,
}

// ========================= Scanner =========================

/// One pass over the device. Kept separate from the task so a single tick
/// can be driven directly.
struct Scanner {
    device: Arc<dyn Device>,
    patterns: Arc<Mutex<Vec<PopupPattern>>>,
    history: Arc<Mutex<PopupHistory>>,
    verify_wait: std::time::Duration,
    last_toast: Option<String>,
}

impl Scanner {
    /// Returns how many records were appended. Only fatal device errors
    /// escape; everything else is logged and the pass continues.
    async fn tick(&mut self, cancel: &CancellationToken) -> Result<usize, DeviceError> {
        let serial = self.device.serial().to_string();
        let mut appended = 0;

        match self.capture_native_toast().await {
            Ok(Some(record)) => {
                self.history.lock().await.push(record);
                appended += 1;
            }
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!(serial = %serial, error = %e, "toast capture failed"),
        }

        let patterns = self.patterns.lock().await.clone();
        for pattern in &patterns {
            if cancel.is_cancelled() {
                break;
            }
            if pattern.detect.is_blank() {
                continue;
            }
            match self.handle(pattern).await {
                Ok(Some(record)) => {
                    info!(serial = %serial, popup = %pattern.name, outcome = %record.message, "popup handled");
                    self.history.lock().await.push(record);
                    appended += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(serial = %serial, popup = %pattern.name, error = %e, "pattern check failed"),
            }
        }
        Ok(appended)
    }

    async fn capture_native_toast(&mut self) -> Result<Option<PopupRecord>, DeviceError> {
        let Some(text) = self.device.last_toast().await? else {
            return Ok(None);
        };
        if text.is_empty() || self.last_toast.as_deref() == Some(text.as_str()) {
            return Ok(None);
        }
        info!(serial = %self.device.serial(), toast = %text, "native toast captured");
        self.last_toast = Some(text.clone());
        self.device.reset_toast().await?;
        Ok(Some(PopupRecord::toast(NATIVE_TOAST, Some(text))))
    }

    async fn handle(&self, pattern: &PopupPattern) -> Result<Option<PopupRecord>, DeviceError> {
        if !self.device.exists(&pattern.detect).await? {
            return Ok(None);
        }
        match pattern.kind {
            PopupKind::Toast => {
                let text = match self.device.element_text(&pattern.detect).await {
                    Ok(text) => text,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(_) => None,
                };
                Ok(Some(PopupRecord::toast(&pattern.name, text)))
            }
            PopupKind::Popup => {
                let (dismissed, verified) = match self.dismiss(pattern).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(serial = %self.device.serial(), popup = %pattern.name, error = %e, "dismiss failed");
                        (false, false)
                    }
                };
                Ok(Some(PopupRecord::popup(&pattern.name, dismissed, verified)))
            }
        }
    }

    async fn dismiss(&self, pattern: &PopupPattern) -> Result<(bool, bool), DeviceError> {
        let Some(target) = pattern.dismiss.as_ref().filter(|q| !q.is_blank()) else {
            return Ok((false, false));
        };
        if !self.device.exists(target).await? {
            return Ok((false, false));
        }
        self.device.click(target).await?;
        let gone = wait_until_gone(self.device.as_ref(), &pattern.detect, self.verify_wait).await?;
        Ok((true, gone))
    }
}

async fn watch(mut scanner: Scanner, config: WatcherConfig, cancel: CancellationToken) {
    let serial = scanner.device.serial().to_string();
    info!(serial = %serial, "popup watcher started");
    loop {
        let pause = match scanner.tick(&cancel).await {
            Ok(_) => config.poll_interval,
            Err(e) => {
                error!(serial = %serial, error = %e, "popup watcher error");
                config.error_backoff
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(pause) => {}
        }
    }
    info!(serial = %serial, "popup watcher stopped");
}

// ========================= Watcher =========================

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct PopupWatcher {
    device: Arc<dyn Device>,
    config: WatcherConfig,
    patterns: Arc<Mutex<Vec<PopupPattern>>>,
    history: Arc<Mutex<PopupHistory>>,
    task: Mutex<Option<RunningTask>>,
}

impl PopupWatcher {
    pub fn new(device: Arc<dyn Device>, config: WatcherConfig) -> Self {
        let history = PopupHistory::new(config.history_capacity);
        Self {
            device,
            config,
            patterns: Arc::new(Mutex::new(Vec::new())),
            history: Arc::new(Mutex::new(history)),
            task: Mutex::new(None),
        }
    }

    fn scanner(&self) -> Scanner {
        Scanner {
            device: self.device.clone(),
            patterns: self.patterns.clone(),
            history: self.history.clone(),
            verify_wait: self.config.verify_wait,
            last_toast: None,
        }
    }

    pub async fn patterns(&self) -> Vec<PopupPattern> {
        self.patterns.lock().await.clone()
    }

    pub async fn pattern_count(&self) -> usize {
        self.patterns.lock().await.len()
    }

    /// Adds patterns (or replaces the list when `append` is false). Entries
    /// without a detect query are skipped; unnamed ones get `pattern_<n>`.
    pub async fn configure(&self, incoming: Vec<PopupPattern>, append: bool) -> ConfigureReport {
        let mut patterns = self.patterns.lock().await;
        if !append {
            patterns.clear();
        }
        let (mut added, mut skipped) = (0, 0);
        for mut pattern in incoming {
            if pattern.detect.is_blank() {
                skipped += 1;
                continue;
            }
            if pattern.name.trim().is_empty() {
                pattern.name = format!("pattern_{}", patterns.len());
            }
            patterns.push(pattern);
            added += 1;
        }
        ConfigureReport { added, skipped, total: patterns.len() }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    pub async fn start(&self) -> WatcherStart {
        let pattern_count = self.pattern_count().await;
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return WatcherStart::AlreadyRunning { pattern_count };
        }
        if pattern_count == 0 {
            return WatcherStart::NoPatterns;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch(self.scanner(), self.config.clone(), cancel.clone()));
        *task = Some(RunningTask { cancel, handle });
        info!(serial = %self.device.serial(), patterns = pattern_count, "popup watcher enabled");
        WatcherStart::Started { pattern_count }
    }

    /// Signals the loop and waits up to `stop_timeout` for it to exit.
    /// Patterns and history survive.
    pub async fn stop(&self) -> WatcherStop {
        let Some(RunningTask { cancel, handle }) = self.task.lock().await.take() else {
            return WatcherStop::NotRunning;
        };
        cancel.cancel();
        match timeout(self.config.stop_timeout, handle).await {
            Ok(Ok(())) => WatcherStop::Stopped,
            Ok(Err(e)) => {
                warn!(serial = %self.device.serial(), error = %e, "popup watcher task ended abnormally");
                WatcherStop::Stopped
            }
            Err(_) => {
                warn!(serial = %self.device.serial(), "popup watcher did not stop cleanly");
                WatcherStop::TimedOut
            }
        }
    }

    /// Reports which patterns are visible right now. Nothing is clicked or
    /// recorded.
    pub async fn check_now(&self, patterns: Option<Vec<PopupPattern>>) -> PopupCheck {
        let patterns = match patterns {
            Some(p) if !p.is_empty() => p,
            _ => self.patterns().await,
        };
        let mut found = Vec::new();
        for pattern in &patterns {
            if pattern.detect.is_blank() {
                continue;
            }
            match self.device.exists(&pattern.detect).await {
                Ok(true) => found.push(VisiblePopup {
                    name: pattern.name.clone(),
                    detect: pattern.detect.clone(),
                    dismiss: pattern.dismiss.clone(),
                    kind: pattern.kind,
                }),
                Ok(false) => {}
                Err(e) => debug!(popup = %pattern.name, error = %e, "pattern check failed"),
            }
        }
        PopupCheck { any_visible: !found.is_empty(), found, checked: patterns.len() }
    }

    pub async fn history(&self, limit: usize, clear: bool) -> HistoryReport {
        let watcher_active = self.is_running().await;
        let pattern_count = self.pattern_count().await;
        let mut history = self.history.lock().await;
        let entries = history.newest(limit);
        let total = history.len();
        if clear {
            history.clear();
        }
        HistoryReport { returned: entries.len(), entries, total, watcher_active, pattern_count }
    }
}
