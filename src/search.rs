//! Keyword search: a scripted flow on top of the detector and navigator.
//!
//! Unlike graph navigation the outcome depends on what the app returns for the
//! query, so results are classified after submission and optionally switched
//! to the preferred category.

use crate::detector::ScreenDetector;
use crate::device::{wait_until_exists, Device, DeviceError, ElementQuery};
use crate::navigator::{NavigateOptions, Navigator};
use crate::signature::UNKNOWN_SCREEN;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

const SEARCH_BAR_WAIT: Duration = Duration::from_secs(5);
const EDIT_TEXT_WAIT: Duration = Duration::from_secs(3);
const TAB_WAIT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCategory {
    Reels,
    Accounts,
    Unknown,
    Failed,
}

#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Category to switch to when the app shows another one first.
    pub preferred: Option<ResultCategory>,
    pub timeout: Duration,
    pub poll_iterations: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            preferred: Some(ResultCategory::Reels),
            timeout: Duration::from_secs(15),
            poll_iterations: 5,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchReport {
    pub success: bool,
    pub keyword: String,
    pub category: ResultCategory,
    pub final_screen: String,
    pub steps: Vec<String>,
    pub total_time_seconds: f64,
    pub error_message: Option<String>,
}

/// Where the search lives in a given app and how its results look.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchProfile {
    pub landing_screen: String,
    pub reels_screen: String,
    pub accounts_screen: String,
    pub search_bar: ElementQuery,
    pub edit_text: ElementQuery,
    pub reels_tab: ElementQuery,
    pub accounts_tab: ElementQuery,
    pub reel_marker: ElementQuery,
    pub account_marker: ElementQuery,
}

impl SearchProfile {
    pub fn instagram() -> Self {
        let search_bar = ElementQuery::resource_id_contains("action_bar_search_edit_text");
        Self {
            landing_screen: "explore_grid".into(),
            reels_screen: "search_results_reels".into(),
            accounts_screen: "search_results_accounts".into(),
            edit_text: ElementQuery::AllOf(vec![
                search_bar.clone(),
                ElementQuery::ClassName("android.widget.EditText".into()),
            ]),
            search_bar,
            reels_tab: ElementQuery::AnyOf(vec![ElementQuery::text("Reels"), ElementQuery::text("REELS")]),
            accounts_tab: ElementQuery::AnyOf(vec![
                ElementQuery::text("Accounts"),
                ElementQuery::text("ACCOUNTS"),
            ]),
            reel_marker: ElementQuery::AllOf(vec![
                ElementQuery::ClassName("android.widget.ImageView".into()),
                ElementQuery::DescriptionContains("Reel by".into()),
            ]),
            account_marker: ElementQuery::resource_id_contains("row_search_user_username"),
        }
    }
}

fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

async fn human_delay(min_ms: u64, max_ms: u64) {
    sleep(jitter(min_ms, max_ms)).await;
}

pub struct KeywordSearch<'a> {
    device: &'a dyn Device,
    detector: &'a ScreenDetector,
    navigator: &'a Navigator,
    profile: &'a SearchProfile,
}

impl<'a> KeywordSearch<'a> {
    pub fn new(
        device: &'a dyn Device,
        detector: &'a ScreenDetector,
        navigator: &'a Navigator,
        profile: &'a SearchProfile,
    ) -> Self {
        Self { device, detector, navigator, profile }
    }

    /// Runs the whole flow. Never fails: device errors end up in the report.
    pub async fn run(&self, keyword: &str, opts: &SearchOptions) -> SearchReport {
        let started = Instant::now();
        let mut steps = Vec::new();
        match self.search(keyword, opts, started, &mut steps).await {
            Ok(report) => report,
            Err(e) => {
                error!(serial = %self.device.serial(), keyword, error = %e, "keyword search failed");
                let final_screen = self.current_screen().await;
                SearchReport {
                    success: false,
                    keyword: keyword.to_string(),
                    category: ResultCategory::Failed,
                    final_screen,
                    steps,
                    total_time_seconds: started.elapsed().as_secs_f64(),
                    error_message: Some(e.to_string()),
                }
            }
        }
    }

    async fn current_screen(&self) -> String {
        let app = self.navigator.app_id();
        self.detector.detect_screen(app, true, true).await.screen_id
    }

    async fn search(
        &self,
        keyword: &str,
        opts: &SearchOptions,
        started: Instant,
        steps: &mut Vec<String>,
    ) -> Result<SearchReport, DeviceError> {
        let p = self.profile;
        let failed = |final_screen: &str, steps: &mut Vec<String>, message: String| SearchReport {
            success: false,
            keyword: keyword.to_string(),
            category: ResultCategory::Failed,
            final_screen: final_screen.to_string(),
            steps: std::mem::take(steps),
            total_time_seconds: started.elapsed().as_secs_f64(),
            error_message: Some(message),
        };

        let current = self.current_screen().await;
        steps.push(format!("Started at: {current}"));
        info!(serial = %self.device.serial(), screen = %current, keyword, "starting search");

        if current != p.landing_screen {
            steps.push(format!("Navigating to {}", p.landing_screen));
            let nav = self.navigator.navigate_to(&p.landing_screen, NavigateOptions::attempts(2)).await;
            if !nav.success() {
                let reason = nav.error_message.unwrap_or_default();
                return Ok(failed(
                    &current,
                    steps,
                    format!("Failed to navigate to {}: {reason}", p.landing_screen),
                ));
            }
            steps.push(format!("Arrived at {} in {:.1}s", p.landing_screen, nav.total_time_seconds));
        }

        steps.push("Clicking search bar".into());
        if !wait_until_exists(self.device, &p.search_bar, SEARCH_BAR_WAIT).await? {
            return Ok(failed(&p.landing_screen, steps, "Search bar not found".into()));
        }
        self.device.click(&p.search_bar).await?;
        human_delay(300, 500).await;

        steps.push(format!("Typing keyword: {keyword}"));
        let input = if wait_until_exists(self.device, &p.edit_text, EDIT_TEXT_WAIT).await? {
            &p.edit_text
        } else {
            &p.search_bar
        };
        if !self.device.exists(input).await? {
            return Ok(failed(&p.landing_screen, steps, "Search input field not found".into()));
        }
        self.device.click(input).await?;
        human_delay(100, 200).await;
        self.device.clear_text().await?;
        human_delay(100, 200).await;
        for ch in keyword.chars() {
            let mut buf = [0u8; 4];
            self.device.type_text(ch.encode_utf8(&mut buf)).await?;
            human_delay(30, 100).await;
        }
        human_delay(200, 400).await;

        steps.push("Pressing Enter to search".into());
        self.device.press_key("enter").await?;
        human_delay(1000, 1500).await;

        steps.push("Detecting search result type".into());
        let mut category = ResultCategory::Unknown;
        for _ in 0..opts.poll_iterations {
            if started.elapsed() >= opts.timeout {
                break;
            }
            human_delay(500, 800).await;
            category = self.classify().await?;
            if category != ResultCategory::Unknown {
                break;
            }
        }
        steps.push(format!("Result type detected: {}", category_name(category)));

        if let Some(preferred) = opts.preferred {
            if let Some(tab) = self.tab_for(preferred, category) {
                let label = category_name(preferred);
                steps.push(format!("Switching to {label} tab"));
                if wait_until_exists(self.device, tab, TAB_WAIT).await? {
                    self.device.click(tab).await?;
                    human_delay(800, 1200).await;
                    if self.classify().await? == preferred {
                        category = preferred;
                        steps.push(format!("Successfully switched to {label} tab"));
                    } else {
                        warn!(serial = %self.device.serial(), label, "tab switch not confirmed");
                        steps.push("Tab switch may not have worked, staying on current results".into());
                    }
                } else {
                    steps.push(format!("{label} tab not found, staying on current results"));
                }
            }
        }

        let final_screen = self.current_screen().await;
        steps.push(format!("Final screen: {final_screen}"));
        Ok(SearchReport {
            success: true,
            keyword: keyword.to_string(),
            category,
            final_screen,
            steps: std::mem::take(steps),
            total_time_seconds: started.elapsed().as_secs_f64(),
            error_message: None,
        })
    }

    /// Tab that switches from `shown` to `preferred`, if a switch is needed.
    fn tab_for(&self, preferred: ResultCategory, shown: ResultCategory) -> Option<&ElementQuery> {
        match (preferred, shown) {
            (ResultCategory::Reels, ResultCategory::Accounts) => Some(&self.profile.reels_tab),
            (ResultCategory::Accounts, ResultCategory::Reels) => Some(&self.profile.accounts_tab),
            _ => None,
        }
    }

    /// Classifies the visible results. Transient lookup errors read as
    /// [`ResultCategory::Unknown`] so the caller keeps polling; only a lost
    /// device escapes.
    async fn classify(&self) -> Result<ResultCategory, DeviceError> {
        let screen = self.current_screen().await;
        if screen == self.profile.reels_screen {
            return Ok(ResultCategory::Reels);
        }
        if screen == self.profile.accounts_screen {
            return Ok(ResultCategory::Accounts);
        }
        if screen == UNKNOWN_SCREEN {
            info!(serial = %self.device.serial(), "results unclassified by signature, checking markers");
        }
        for (marker, category) in [
            (&self.profile.reel_marker, ResultCategory::Reels),
            (&self.profile.account_marker, ResultCategory::Accounts),
        ] {
            match self.device.exists(marker).await {
                Ok(true) => return Ok(category),
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(serial = %self.device.serial(), marker = %marker, error = %e, "result marker check failed");
                    return Ok(ResultCategory::Unknown);
                }
            }
        }
        Ok(ResultCategory::Unknown)
    }
}

fn category_name(category: ResultCategory) -> &'static str {
    match category {
        ResultCategory::Reels => "Reels",
        ResultCategory::Accounts => "Accounts",
        ResultCategory::Unknown => "unknown",
        ResultCategory::Failed => "failed",
    }
}
