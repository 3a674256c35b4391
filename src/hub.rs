//! Per-device registry and the operations exposed to callers.
//!
//! Each serial gets one [`DeviceSession`] (driver handle, detector, navigator
//! and popup watcher), created on first use. The session map and the cached
//! default popup patterns sit behind separate locks, and neither lock is held
//! while talking to a device.

use crate::config::HubConfig;
use crate::detector::{DetectionStats, ScreenDetector};
use crate::device::{Device, DeviceError, DeviceProvider};
use crate::elements::SignatureDump;
use crate::graph::{GraphInfo, NavigationGraph};
use crate::navigator::{NavigateOptions, NavigationResult, NavigationStats, Navigator, RecoveryContext};
use crate::popup::{
    load_patterns, ConfigureReport, HistoryReport, PopupCheck, PopupPattern, PopupWatcher,
    WatcherStart, WatcherStop,
};
use crate::search::{KeywordSearch, SearchOptions, SearchProfile, SearchReport};
use crate::signature::{ScreenDetectionResult, ScreenInfo, SignatureRegistry};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("cannot connect to device {serial}: {source}")]
    Connect {
        serial: String,
        #[source]
        source: DeviceError,
    },
}

pub type HubResult<T> = Result<T, HubError>;

/// Signature dump, or why it could not be taken.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DumpOutcome {
    Dump(SignatureDump),
    Failed { error: String },
}

pub struct DeviceSession {
    pub device: Arc<dyn Device>,
    pub detector: Arc<ScreenDetector>,
    pub navigator: Navigator,
    pub watcher: PopupWatcher,
}

impl DeviceSession {
    fn new(
        device: Arc<dyn Device>,
        signatures: Arc<SignatureRegistry>,
        graph: Arc<NavigationGraph>,
        config: &HubConfig,
    ) -> Self {
        let detector = Arc::new(ScreenDetector::new(
            device.clone(),
            signatures,
            config.detector.clone(),
        ));
        let navigator = Navigator::new(
            device.clone(),
            detector.clone(),
            graph,
            config.app_id.clone(),
            config.navigator.clone(),
        );
        let watcher = PopupWatcher::new(device.clone(), config.watcher.clone());
        Self { device, detector, navigator, watcher }
    }

    pub fn serial(&self) -> &str {
        self.device.serial()
    }
}

pub struct DeviceHub {
    provider: Arc<dyn DeviceProvider>,
    signatures: Arc<SignatureRegistry>,
    graph: Arc<NavigationGraph>,
    config: HubConfig,
    search_profile: SearchProfile,
    sessions: Mutex<HashMap<String, Arc<DeviceSession>>>,
    default_patterns: Mutex<Option<Vec<PopupPattern>>>,
}

impl DeviceHub {
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        signatures: Arc<SignatureRegistry>,
        graph: Arc<NavigationGraph>,
        config: HubConfig,
    ) -> Self {
        Self {
            provider,
            signatures,
            graph,
            config,
            search_profile: SearchProfile::instagram(),
            sessions: Mutex::new(HashMap::new()),
            default_patterns: Mutex::new(None),
        }
    }

    pub fn with_search_profile(mut self, profile: SearchProfile) -> Self {
        self.search_profile = profile;
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub async fn serials(&self) -> Vec<String> {
        let mut serials: Vec<_> = self.sessions.lock().await.keys().cloned().collect();
        serials.sort();
        serials
    }

    /// Returns the session for `serial`, connecting and setting up the popup
    /// watcher on first access.
    pub async fn get_or_create(&self, serial: &str) -> HubResult<Arc<DeviceSession>> {
        if let Some(session) = self.sessions.lock().await.get(serial) {
            return Ok(session.clone());
        }

        let device = self
            .provider
            .connect(serial)
            .await
            .map_err(|source| HubError::Connect { serial: serial.to_string(), source })?;
        let fresh = Arc::new(DeviceSession::new(
            device,
            self.signatures.clone(),
            self.graph.clone(),
            &self.config,
        ));

        let session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(serial) {
                // lost a race with another caller; theirs is already set up
                Some(existing) => return Ok(existing.clone()),
                None => {
                    sessions.insert(serial.to_string(), fresh.clone());
                    fresh
                }
            }
        };
        info!(serial, "device session created");
        self.auto_setup(&session).await;
        Ok(session)
    }

    async fn auto_setup(&self, session: &DeviceSession) {
        if session.watcher.pattern_count().await > 0 {
            return;
        }
        let mut patterns = self.default_patterns().await;
        if patterns.is_empty() {
            patterns = self.patterns_from_other_sessions(session.serial()).await;
        }
        if patterns.is_empty() {
            return;
        }
        let report = session.watcher.configure(patterns, false).await;
        info!(serial = %session.serial(), patterns = report.total, "popup patterns auto-configured");
        session.watcher.start().await;
    }

    /// Patterns from the configured file. Only a non-empty load is cached, so
    /// a file that is missing or broken now is read again for later sessions.
    async fn default_patterns(&self) -> Vec<PopupPattern> {
        if let Some(cached) = self.default_patterns.lock().await.as_ref() {
            return cached.clone();
        }
        let path = &self.config.pattern_file;
        let loaded = if path.exists() {
            match load_patterns(path) {
                Ok(p) => {
                    info!(count = p.len(), path = %path.display(), "loaded default popup patterns");
                    p
                }
                Err(e) => {
                    warn!(error = %e, "failed to load popup patterns");
                    Vec::new()
                }
            }
        } else {
            warn!(path = %path.display(), "popup pattern file not found");
            Vec::new()
        };
        if loaded.is_empty() {
            return loaded;
        }
        self.default_patterns.lock().await.get_or_insert(loaded).clone()
    }

    async fn patterns_from_other_sessions(&self, serial: &str) -> Vec<PopupPattern> {
        let others: Vec<Arc<DeviceSession>> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|(s, _)| s.as_str() != serial)
            .map(|(_, session)| session.clone())
            .collect();
        for other in others {
            let patterns = other.watcher.patterns().await;
            if !patterns.is_empty() {
                info!(serial, source = %other.serial(), "copying popup patterns from another device");
                return patterns;
            }
        }
        Vec::new()
    }

    fn app_or_default<'a>(&'a self, app_id: Option<&'a str>) -> &'a str {
        app_id.unwrap_or(&self.config.app_id)
    }

    // ===== Detection =====

    pub async fn detect_screen(
        &self,
        serial: &str,
        app_id: Option<&str>,
        force_refresh: bool,
    ) -> HubResult<ScreenDetectionResult> {
        let session = self.get_or_create(serial).await?;
        let app = self.app_or_default(app_id);
        Ok(session.detector.detect_screen(app, force_refresh, true).await)
    }

    pub async fn dump_for_signature(&self, serial: &str) -> HubResult<DumpOutcome> {
        let session = self.get_or_create(serial).await?;
        Ok(match session.detector.dump_for_signature().await {
            Ok(dump) => DumpOutcome::Dump(dump),
            Err(e) => DumpOutcome::Failed { error: e.to_string() },
        })
    }

    pub fn screen_info(&self, app_id: Option<&str>, screen_id: Option<&str>) -> ScreenInfo {
        ScreenInfo::lookup(&self.signatures, self.app_or_default(app_id), screen_id)
    }

    pub async fn detection_stats(&self, serial: &str) -> HubResult<DetectionStats> {
        Ok(self.get_or_create(serial).await?.detector.stats().await)
    }

    // ===== Navigation =====

    pub async fn navigate_to(
        &self,
        serial: &str,
        target: &str,
        opts: NavigateOptions,
    ) -> HubResult<NavigationResult> {
        let session = self.get_or_create(serial).await?;
        Ok(session.navigator.navigate_to(target, opts).await)
    }

    pub async fn recover_to_safe_state(
        &self,
        serial: &str,
        context: &str,
    ) -> HubResult<NavigationResult> {
        let session = self.get_or_create(serial).await?;
        Ok(session.navigator.recover_to_safe_state(RecoveryContext::parse(context)).await)
    }

    pub fn navigation_graph(&self, screen: Option<&str>) -> GraphInfo {
        GraphInfo::describe(&self.graph, screen)
    }

    pub async fn navigation_stats(&self, serial: &str) -> HubResult<NavigationStats> {
        Ok(self.get_or_create(serial).await?.navigator.stats().await)
    }

    pub async fn search_for_keyword(
        &self,
        serial: &str,
        keyword: &str,
        opts: &SearchOptions,
    ) -> HubResult<SearchReport> {
        let session = self.get_or_create(serial).await?;
        let search = KeywordSearch::new(
            session.device.as_ref(),
            &session.detector,
            &session.navigator,
            &self.search_profile,
        );
        Ok(search.run(keyword, opts).await)
    }

    // ===== Popups =====

    pub async fn popup_configure(
        &self,
        serial: &str,
        patterns: Vec<PopupPattern>,
        append: bool,
    ) -> HubResult<ConfigureReport> {
        let session = self.get_or_create(serial).await?;
        Ok(session.watcher.configure(patterns, append).await)
    }

    pub async fn popup_enable(&self, serial: &str) -> HubResult<WatcherStart> {
        Ok(self.get_or_create(serial).await?.watcher.start().await)
    }

    pub async fn popup_disable(&self, serial: &str) -> HubResult<WatcherStop> {
        Ok(self.get_or_create(serial).await?.watcher.stop().await)
    }

    pub async fn popup_history(
        &self,
        serial: &str,
        limit: usize,
        clear: bool,
    ) -> HubResult<HistoryReport> {
        Ok(self.get_or_create(serial).await?.watcher.history(limit, clear).await)
    }

    pub async fn popup_check(
        &self,
        serial: &str,
        patterns: Option<Vec<PopupPattern>>,
    ) -> HubResult<PopupCheck> {
        Ok(self.get_or_create(serial).await?.watcher.check_now(patterns).await)
    }

    /// Stops every watcher concurrently. Sessions are dropped afterwards.
    pub async fn shutdown(&self) -> Vec<(String, WatcherStop)> {
        let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
        let stops = sessions.iter().map(|(serial, session)| async move {
            (serial.clone(), session.watcher.stop().await)
        });
        let mut outcomes = join_all(stops).await;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        info!(devices = outcomes.len(), "hub shut down");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ElementQuery, UiNode};
    use crate::popup::DEFAULT_HISTORY_LIMIT;
    use crate::replay::ScriptedDevice;
    use crate::signature::ScreenSignature;
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::PathBuf;

    struct FixedProvider {
        devices: HashMap<String, Arc<ScriptedDevice>>,
    }

    #[async_trait]
    impl DeviceProvider for FixedProvider {
        async fn connect(&self, serial: &str) -> Result<Arc<dyn Device>, DeviceError> {
            match self.devices.get(serial) {
                Some(d) => Ok(d.clone()),
                None => Err(DeviceError::Disconnected(format!("{serial} not attached"))),
            }
        }
    }

    fn scripted(serial: &str) -> Arc<ScriptedDevice> {
        Arc::new(
            ScriptedDevice::builder(serial)
                .screen(
                    "home",
                    UiNode::new("FrameLayout").child(
                        UiNode::new("FrameLayout").with_id("com.instagram.android:id/feed_tab"),
                    ),
                )
                .start_at("home")
                .build(),
        )
    }

    fn hub(pattern_file: PathBuf, serials: &[&str]) -> DeviceHub {
        let devices = serials.iter().map(|s| (s.to_string(), scripted(s))).collect();
        let mut registry = SignatureRegistry::new();
        registry
            .register(
                "instagram",
                vec![ScreenSignature::builder("instagram", "home_feed")
                    .required(&["id:feed_tab"])
                    .build()
                    .unwrap()],
            )
            .unwrap();
        let config = HubConfig { pattern_file, ..HubConfig::default() };
        DeviceHub::new(
            Arc::new(FixedProvider { devices }),
            Arc::new(registry),
            Arc::new(NavigationGraph::builtin()),
            config,
        )
    }

    fn pattern() -> PopupPattern {
        PopupPattern::popup("rate_app", ElementQuery::text("Rate us"), ElementQuery::text("Later"))
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_created_once() {
        let hub = hub(PathBuf::from("/nonexistent/patterns.json"), &["a"]);
        let first = hub.get_or_create("a").await.unwrap();
        let second = hub.get_or_create("a").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hub.serials().await, vec!["a"]);

        let err = hub.get_or_create("missing").await.err().unwrap();
        assert!(matches!(err, HubError::Connect { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_setup_loads_pattern_file_and_starts_watcher() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"patterns": [{{"name": "rate_app", "detect": {{"by": "text", "value": "Rate us"}}}}]}}"#
        )
        .unwrap();
        let hub = hub(file.path().to_path_buf(), &["a"]);

        let history = hub.popup_history("a", DEFAULT_HISTORY_LIMIT, false).await.unwrap();
        assert!(history.watcher_active);
        assert_eq!(history.pattern_count, 1);

        assert_eq!(hub.popup_disable("a").await.unwrap(), WatcherStop::Stopped);
        assert_eq!(hub.popup_disable("a").await.unwrap(), WatcherStop::NotRunning);
        assert_eq!(
            hub.popup_enable("a").await.unwrap(),
            WatcherStart::Started { pattern_count: 1 }
        );
        hub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn later_devices_copy_patterns_when_no_file() {
        let hub = hub(PathBuf::from("/nonexistent/patterns.json"), &["a", "b"]);
        hub.get_or_create("a").await.unwrap();
        assert!(!hub.popup_history("a", 5, false).await.unwrap().watcher_active);

        hub.popup_configure("a", vec![pattern()], true).await.unwrap();
        let b = hub.get_or_create("b").await.unwrap();
        assert_eq!(b.watcher.patterns().await, vec![pattern()]);
        assert!(b.watcher.is_running().await);

        let stops = hub.shutdown().await;
        assert_eq!(stops, vec![
            ("a".to_string(), WatcherStop::NotRunning),
            ("b".to_string(), WatcherStop::Stopped),
        ]);
        assert!(hub.serials().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pattern_file_is_retried_after_a_failed_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let hub = hub(path.clone(), &["a", "b", "c"]);

        hub.get_or_create("a").await.unwrap();
        assert!(!hub.popup_history("a", 5, false).await.unwrap().watcher_active);

        std::fs::write(&path, "{ not json").unwrap();
        let b = hub.get_or_create("b").await.unwrap();
        assert!(b.watcher.patterns().await.is_empty());

        std::fs::write(
            &path,
            r#"{"patterns": [{"name": "rate_app", "detect": {"by": "text", "value": "Rate us"}}]}"#,
        )
        .unwrap();
        let c = hub.get_or_create("c").await.unwrap();
        assert_eq!(c.watcher.patterns().await.len(), 1);
        assert!(c.watcher.is_running().await);
        hub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn operations_route_to_the_session() {
        let hub = hub(PathBuf::from("/nonexistent/patterns.json"), &["a"]);
        let result = hub.detect_screen("a", None, false).await.unwrap();
        assert_eq!(result.screen_id, "home_feed");
        assert_eq!(hub.detection_stats("a").await.unwrap().detection_count, 1);

        match hub.dump_for_signature("a").await.unwrap() {
            DumpOutcome::Dump(dump) => assert!(dump.resource_ids.contains(&"feed_tab".to_string())),
            DumpOutcome::Failed { error } => panic!("dump failed: {error}"),
        }

        let nav = hub.navigate_to("a", "home_feed", NavigateOptions::default()).await.unwrap();
        assert!(nav.success());
        assert_eq!(hub.navigation_stats("a").await.unwrap().total_navigations, 1);

        assert!(matches!(hub.screen_info(None, Some("nope")), ScreenInfo::Missing { .. }));
        assert!(matches!(hub.navigation_graph(None), GraphInfo::Summary { .. }));

        let check = hub.popup_check("a", Some(vec![pattern()])).await.unwrap();
        assert_eq!(check.checked, 1);
        assert!(!check.any_visible);
    }
}
