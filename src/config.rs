use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_APP_ID: &str = "instagram";
pub const DEFAULT_PATTERN_FILE: &str = "popup_patterns.json";

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Snapshots younger than this are reused unless a refresh is forced.
    pub snapshot_ttl: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { snapshot_ttl: Duration::from_millis(500) }
    }
}

#[derive(Clone, Debug)]
pub struct NavigatorConfig {
    pub unknown_pause: Duration,
    pub verify_pause: Duration,
    pub swipe_duration: Duration,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            unknown_pause: Duration::from_secs(1),
            verify_pause: Duration::from_millis(500),
            swipe_duration: Duration::from_millis(300),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    /// Sleep after a loop-level failure before polling again.
    pub error_backoff: Duration,
    pub history_capacity: usize,
    pub stop_timeout: Duration,
    /// How long a dismissed popup gets to disappear.
    pub verify_wait: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(2),
            history_capacity: 100,
            stop_timeout: Duration::from_secs(3),
            verify_wait: Duration::from_millis(1500),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub app_id: String,       // env SCREEN_PILOT_APP_ID
    pub pattern_file: PathBuf, // env SCREEN_PILOT_POPUP_PATTERNS
    pub detector: DetectorConfig,
    pub navigator: NavigatorConfig,
    pub watcher: WatcherConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        let mut watcher = WatcherConfig::default();
        if let Some(ms) = env_parse::<u64>("SCREEN_PILOT_POPUP_POLL_MS") {
            watcher.poll_interval = Duration::from_millis(ms);
        }
        if let Some(cap) = env_parse::<usize>("SCREEN_PILOT_POPUP_HISTORY") {
            watcher.history_capacity = cap.max(1);
        }
        Self {
            app_id: env::var("SCREEN_PILOT_APP_ID").unwrap_or_else(|_| DEFAULT_APP_ID.into()),
            pattern_file: env::var("SCREEN_PILOT_POPUP_PATTERNS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_PATTERN_FILE)),
            detector: DetectorConfig::default(),
            navigator: NavigatorConfig::default(),
            watcher,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_defaults() {
        let w = WatcherConfig::default();
        assert_eq!(w.poll_interval, Duration::from_millis(500));
        assert_eq!(w.history_capacity, 100);
        assert_eq!(w.stop_timeout, Duration::from_secs(3));
        assert_eq!(DetectorConfig::default().snapshot_ttl, Duration::from_millis(500));
    }

    #[test]
    fn env_values_must_parse() {
        env::set_var("SCREEN_PILOT_TEST_NUMBER", " 250 ");
        assert_eq!(env_parse::<u64>("SCREEN_PILOT_TEST_NUMBER"), Some(250));
        env::set_var("SCREEN_PILOT_TEST_NUMBER", "soon");
        assert_eq!(env_parse::<u64>("SCREEN_PILOT_TEST_NUMBER"), None);
        env::remove_var("SCREEN_PILOT_TEST_NUMBER");
    }
}
