//! BFS planning over the [`NavigationGraph`] plus verified step execution.

use crate::config::NavigatorConfig;
use crate::detector::ScreenDetector;
use crate::device::{Device, DeviceError, ElementQuery};
use crate::graph::{
    edge_counts, ActionKind, NavigationAction, NavigationEdge, NavigationGraph, BROWSE_SAFE_STATES,
    LOGIN_SAFE_STATES, WARMUP_SAFE_STATES,
};
use crate::signature::UNKNOWN_SCREEN;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

// ========================= Paths & Results =========================

#[derive(Clone, Debug, Serialize)]
pub struct NavigationStep {
    pub from_screen: String,
    pub to_screen: String,
    pub edge: NavigationEdge,
}

#[derive(Clone, Debug, Serialize)]
pub struct NavigationPath {
    pub steps: Vec<NavigationStep>,
    pub total_cost: f64,
    pub estimated_reliability: f64,
}

impl NavigationPath {
    fn empty() -> Self {
        Self { steps: Vec::new(), total_cost: 0.0, estimated_reliability: 1.0 }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStatus {
    Success,
    Failed,
    Partial,
    NoPath,
    Timeout,
    AlreadyThere,
}

#[derive(Clone, Debug, Serialize)]
pub struct NavigationResult {
    pub status: NavigationStatus,
    pub start_screen: String,
    pub target_screen: String,
    pub final_screen: String,
    pub path_taken: Vec<NavigationStep>,
    pub steps_completed: usize,
    pub total_time_seconds: f64,
    pub error_message: Option<String>,
    pub recovery_attempts: u32,
}

impl NavigationResult {
    pub fn success(&self) -> bool {
        matches!(self.status, NavigationStatus::Success | NavigationStatus::AlreadyThere)
    }

    pub fn path_summary(&self) -> Vec<String> {
        self.path_taken.iter().map(|s| format!("{} → {}", s.from_screen, s.to_screen)).collect()
    }
}

#[derive(Clone, Debug)]
pub struct NavigateOptions {
    pub max_attempts: u32,
    pub verify_each_step: bool,
    /// Overall time budget; `None` means attempts are the only bound.
    pub deadline: Option<Duration>,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self { max_attempts: 3, verify_each_step: true, deadline: None }
    }
}

impl NavigateOptions {
    pub fn attempts(max_attempts: u32) -> Self {
        Self { max_attempts, ..Default::default() }
    }
}

/// Which set of low-risk screens a recovery should aim for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryContext {
    Warmup,
    Login,
    Browse,
}

impl RecoveryContext {
    /// Unrecognised names fall back to `Warmup`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "login" => Self::Login,
            "browse" => Self::Browse,
            _ => Self::Warmup,
        }
    }

    pub fn safe_states(self) -> &'static [&'static str] {
        match self {
            Self::Warmup => WARMUP_SAFE_STATES,
            Self::Login => LOGIN_SAFE_STATES,
            Self::Browse => BROWSE_SAFE_STATES,
        }
    }

    pub fn preferred(self) -> &'static str {
        match self {
            Self::Warmup | Self::Browse => "explore_grid",
            Self::Login => "home_feed",
        }
    }
}

impl From<&str> for RecoveryContext {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NavigationStats {
    pub total_navigations: u64,
    pub successful_navigations: u64,
    pub success_rate: f64,
    pub total_steps_executed: u64,
    pub average_navigation_time_seconds: f64,
    pub graph_screens: usize,
}

#[derive(Default)]
struct Counters {
    total: u64,
    successful: u64,
    steps: u64,
    total_time: f64,
}

// ========================= Navigator =========================

pub struct Navigator {
    device: Arc<dyn Device>,
    detector: Arc<ScreenDetector>,
    graph: Arc<NavigationGraph>,
    app_id: String,
    config: NavigatorConfig,
    counters: Mutex<Counters>,
}

impl Navigator {
    pub fn new(
        device: Arc<dyn Device>,
        detector: Arc<ScreenDetector>,
        graph: Arc<NavigationGraph>,
        app_id: impl Into<String>,
        config: NavigatorConfig,
    ) -> Self {
        debug!(sources = graph.screen_count(), edges = ?edge_counts(&graph), "navigator ready");
        Self {
            device,
            detector,
            graph,
            app_id: app_id.into(),
            config,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn graph(&self) -> &Arc<NavigationGraph> {
        &self.graph
    }

    pub fn detector(&self) -> &Arc<ScreenDetector> {
        &self.detector
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Fewest-hop path; cost and reliability are accumulated, not optimised.
    pub fn find_path(&self, from: &str, to: &str) -> Option<NavigationPath> {
        self.bfs(from, |screen| screen == to)
    }

    pub fn find_path_to_any(&self, from: &str, targets: &[&str]) -> Option<NavigationPath> {
        self.bfs(from, |screen| targets.iter().any(|t| *t == screen))
    }

    pub fn has_path(&self, from: &str, to: &str) -> bool {
        self.find_path(from, to).is_some()
    }

    fn bfs(&self, from: &str, is_target: impl Fn(&str) -> bool) -> Option<NavigationPath> {
        if is_target(from) {
            return Some(NavigationPath::empty());
        }
        let mut visited: HashSet<&str> = HashSet::from([from]);
        let mut queue: VecDeque<(&str, NavigationPath)> =
            VecDeque::from([(from, NavigationPath::empty())]);

        while let Some((current, path)) = queue.pop_front() {
            for edge in self.graph.edges_from(current) {
                let next = edge.to_screen.as_str();
                if visited.contains(next) {
                    continue;
                }
                let mut extended = path.clone();
                extended.steps.push(NavigationStep {
                    from_screen: current.to_string(),
                    to_screen: next.to_string(),
                    edge: edge.clone(),
                });
                extended.total_cost += edge.cost;
                extended.estimated_reliability *= edge.reliability;
                if is_target(next) {
                    return Some(extended);
                }
                visited.insert(next);
                queue.push_back((next, extended));
            }
        }
        None
    }

    async fn detect_current(&self) -> String {
        self.detector.detect_screen(&self.app_id, true, true).await.screen_id
    }

    pub async fn navigate_to(&self, target: &str, opts: NavigateOptions) -> NavigationResult {
        self.counters.lock().await.total += 1;
        let started = Instant::now();
        let expired = || opts.deadline.map_or(false, |d| started.elapsed() >= d);

        let mut taken: Vec<NavigationStep> = Vec::new();
        let mut recovery_attempts = 0u32;
        let mut start_screen = UNKNOWN_SCREEN.to_string();
        let mut last_seen = UNKNOWN_SCREEN.to_string();

        let finish = |status: NavigationStatus,
                      start_screen: String,
                      final_screen: String,
                      taken: Vec<NavigationStep>,
                      error_message: Option<String>,
                      recovery_attempts: u32| NavigationResult {
            status,
            start_screen,
            target_screen: target.to_string(),
            final_screen,
            steps_completed: taken.len(),
            path_taken: taken,
            total_time_seconds: started.elapsed().as_secs_f64(),
            error_message,
            recovery_attempts,
        };

        for attempt in 1..=opts.max_attempts {
            if expired() {
                return self.out_of_time(finish, start_screen, last_seen, taken, recovery_attempts);
            }
            info!(serial = %self.device.serial(), attempt, max = opts.max_attempts, to = target, "navigation attempt");

            let current = self.detect_current().await;
            if start_screen == UNKNOWN_SCREEN {
                start_screen = current.clone();
            }
            last_seen = current.clone();

            if current == UNKNOWN_SCREEN {
                warn!(serial = %self.device.serial(), attempt, "unknown screen");
                recovery_attempts += 1;
                sleep(self.config.unknown_pause).await;
                continue;
            }

            if current == target {
                self.counters.lock().await.successful += 1;
                let status = if attempt == 1 {
                    NavigationStatus::AlreadyThere
                } else {
                    NavigationStatus::Success
                };
                return finish(status, start_screen, current, taken, None, recovery_attempts);
            }

            let Some(path) = self.find_path(&current, target) else {
                return finish(
                    NavigationStatus::NoPath,
                    start_screen,
                    current.clone(),
                    taken,
                    Some(format!("No path from {current} to {target}")),
                    recovery_attempts,
                );
            };
            info!(
                steps = path.len(),
                reliability = path.estimated_reliability,
                "path found"
            );

            let total = path.len();
            for (i, step) in path.steps.into_iter().enumerate() {
                if expired() {
                    return self.out_of_time(finish, start_screen, last_seen, taken, recovery_attempts);
                }
                info!(step = i + 1, of = total, from = %step.from_screen, to = %step.to_screen, "executing step");

                if !self.execute_step(&step).await {
                    warn!(from = %step.from_screen, to = %step.to_screen, "step execution failed");
                    recovery_attempts += 1;
                    break;
                }
                let expected = step.to_screen.clone();
                taken.push(step);
                self.counters.lock().await.steps += 1;
                last_seen = expected.clone();

                if opts.verify_each_step {
                    sleep(self.config.verify_pause).await;
                    let actual = self.detect_current().await;
                    if actual != expected {
                        warn!(expected = %expected, actual = %actual, "deviated from planned path");
                        last_seen = actual;
                        recovery_attempts += 1;
                        break;
                    }
                }

                if i + 1 == total {
                    let elapsed = started.elapsed().as_secs_f64();
                    {
                        let mut c = self.counters.lock().await;
                        c.successful += 1;
                        c.total_time += elapsed;
                    }
                    return finish(
                        NavigationStatus::Success,
                        start_screen,
                        expected,
                        taken,
                        None,
                        recovery_attempts,
                    );
                }
            }
        }

        let final_screen = self.detect_current().await;
        finish(
            NavigationStatus::Failed,
            start_screen,
            final_screen,
            taken,
            Some(format!("Failed after {} attempts", opts.max_attempts)),
            recovery_attempts,
        )
    }

    fn out_of_time<F>(
        &self,
        finish: F,
        start_screen: String,
        last_seen: String,
        taken: Vec<NavigationStep>,
        recovery_attempts: u32,
    ) -> NavigationResult
    where
        F: Fn(NavigationStatus, String, String, Vec<NavigationStep>, Option<String>, u32) -> NavigationResult,
    {
        let status =
            if taken.is_empty() { NavigationStatus::Timeout } else { NavigationStatus::Partial };
        warn!(serial = %self.device.serial(), steps = taken.len(), ?status, "navigation deadline elapsed");
        finish(
            status,
            start_screen,
            last_seen,
            taken,
            Some("Navigation deadline elapsed".to_string()),
            recovery_attempts,
        )
    }

    pub async fn recover_to_safe_state(&self, context: RecoveryContext) -> NavigationResult {
        let targets = context.safe_states();
        let preferred = context.preferred();
        info!(serial = %self.device.serial(), ?context, "recovering to safe state");

        let current = self.detect_current().await;
        if targets.iter().any(|t| *t == current) {
            info!(screen = %current, "already in safe state");
            return NavigationResult {
                status: NavigationStatus::AlreadyThere,
                start_screen: current.clone(),
                target_screen: current.clone(),
                final_screen: current,
                path_taken: Vec::new(),
                steps_completed: 0,
                total_time_seconds: 0.0,
                error_message: None,
                recovery_attempts: 0,
            };
        }

        let result = self.navigate_to(preferred, NavigateOptions::attempts(2)).await;
        if result.success() {
            return result;
        }

        info!(preferred, "preferred target failed, trying any safe state");
        if let Some(path) = self.find_path_to_any(&current, targets) {
            if let Some(last) = path.steps.last() {
                return self.navigate_to(&last.to_screen, NavigateOptions::attempts(2)).await;
            }
        }

        NavigationResult {
            status: NavigationStatus::NoPath,
            start_screen: current.clone(),
            target_screen: preferred.to_string(),
            final_screen: current,
            path_taken: Vec::new(),
            steps_completed: 0,
            total_time_seconds: 0.0,
            error_message: Some("No path to any safe state".to_string()),
            recovery_attempts: 0,
        }
    }

    async fn execute_step(&self, step: &NavigationStep) -> bool {
        for action in &step.edge.actions {
            if !self.execute_action(action).await {
                return false;
            }
        }
        true
    }

    /// Runs one gesture. Failures of any kind come back as `false`.
    pub async fn execute_action(&self, action: &NavigationAction) -> bool {
        match self.perform(action).await {
            Ok(true) => {
                sleep(action.wait_after).await;
                true
            }
            Ok(false) => {
                warn!(action = %action.description, element = ?action.target(), "element not found");
                false
            }
            Err(e) => {
                error!(action = %action.description, error = %e, "action execution error");
                false
            }
        }
    }

    async fn perform(&self, action: &NavigationAction) -> Result<bool, DeviceError> {
        match &action.kind {
            ActionKind::PressBack => {
                self.device.press_key("back").await?;
                Ok(true)
            }
            ActionKind::ClickTab { name } => {
                self.click_first(&[ElementQuery::description(name.as_str())]).await
            }
            ActionKind::ClickText { text } => {
                self.click_first(&[
                    ElementQuery::text(text.as_str()),
                    ElementQuery::TextContains(text.clone()),
                ])
                .await
            }
            ActionKind::ClickContentDesc { desc } => {
                self.click_first(&[
                    ElementQuery::description(desc.as_str()),
                    ElementQuery::DescriptionContains(desc.clone()),
                ])
                .await
            }
            ActionKind::ClickElement { query } => self.click_first(std::slice::from_ref(query)).await,
            ActionKind::SwipeUp => {
                self.swipe_relative((0.5, 0.7), (0.5, 0.3)).await?;
                Ok(true)
            }
            ActionKind::SwipeDown => {
                self.swipe_relative((0.5, 0.3), (0.5, 0.7)).await?;
                Ok(true)
            }
            ActionKind::Wait => Ok(true),
            ActionKind::LaunchApp { package, activity } => {
                self.device.app_start(package, activity.as_deref()).await?;
                Ok(true)
            }
        }
    }

    /// Clicks the first query that currently resolves to an element.
    async fn click_first(&self, queries: &[ElementQuery]) -> Result<bool, DeviceError> {
        for query in queries {
            if query.is_blank() {
                continue;
            }
            if self.device.exists(query).await? {
                self.device.click(query).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn swipe_relative(&self, from: (f64, f64), to: (f64, f64)) -> Result<(), DeviceError> {
        let (w, h) = self.device.window_size().await?;
        let px = |frac: f64, total: u32| (frac * total as f64).round() as u32;
        self.device
            .swipe(
                px(from.0, w),
                px(from.1, h),
                px(to.0, w),
                px(to.1, h),
                self.config.swipe_duration,
            )
            .await
    }

    pub async fn stats(&self) -> NavigationStats {
        let c = self.counters.lock().await;
        let success_rate = if c.total > 0 { c.successful as f64 / c.total as f64 } else { 0.0 };
        let avg = if c.successful > 0 { c.total_time / c.successful as f64 } else { 0.0 };
        NavigationStats {
            total_navigations: c.total,
            successful_navigations: c.successful,
            success_rate: (success_rate * 1000.0).round() / 1000.0,
            total_steps_executed: c.steps,
            average_navigation_time_seconds: (avg * 100.0).round() / 100.0,
            graph_screens: self.graph.screen_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::device::UiNode;
    use crate::replay::ScriptedDevice;
    use crate::signature::{ScreenSignature, SignatureRegistry};

    const APP: &str = "toy";
    const SCREENS: [&str; 5] = ["home_feed", "explore_grid", "profile_page", "dm_inbox", "detour"];

    fn screen(name: &str) -> UiNode {
        UiNode::new("android.widget.FrameLayout")
            .with_id(format!("com.toy:id/screen_{name}"))
            .children([
                UiNode::new("android.widget.Button").with_desc("Search and explore").clickable(),
                UiNode::new("android.widget.Button").with_text("Profile").clickable(),
                UiNode::new("android.widget.Button").with_text("Messages").clickable(),
            ])
    }

    fn device(drift: bool) -> Arc<ScriptedDevice> {
        let mut b = ScriptedDevice::builder("toy-1");
        for name in SCREENS {
            b = b.screen(name, screen(name));
        }
        let profile_lands_on = if drift { "detour" } else { "profile_page" };
        Arc::new(
            b.on_click("home_feed", ElementQuery::description("Search and explore"), "explore_grid")
                .on_click("home_feed", ElementQuery::text("Messages"), "dm_inbox")
                .on_click("explore_grid", ElementQuery::text("Profile"), profile_lands_on)
                .on_key("dm_inbox", "back", "home_feed")
                .on_key("detour", "back", "profile_page")
                .start_at("home_feed")
                .build(),
        )
    }

    fn graph() -> NavigationGraph {
        use NavigationAction as A;
        NavigationGraph::new()
            .with_edge("home_feed", NavigationEdge::new("explore_grid", vec![A::click_tab("Search and explore")]))
            .with_edge("home_feed", NavigationEdge::new("dm_inbox", vec![A::click_text("Messages")]))
            .with_edge("explore_grid", NavigationEdge::new("profile_page", vec![A::click_text("Profile")]))
            .with_edge("dm_inbox", NavigationEdge::new("home_feed", vec![A::press_back()]))
            .with_edge("detour", NavigationEdge::new("profile_page", vec![A::press_back()]))
    }

    fn navigator(device: Arc<ScriptedDevice>) -> Navigator {
        let mut registry = SignatureRegistry::new();
        let sigs = SCREENS
            .iter()
            .map(|name| {
                ScreenSignature::builder(APP, name)
                    .unique(&[format!(":id/screen_{name}").as_str()])
                    .build()
                    .unwrap()
            })
            .collect();
        registry.register(APP, sigs).unwrap();
        let detector =
            Arc::new(ScreenDetector::new(device.clone(), Arc::new(registry), DetectorConfig::default()));
        Navigator::new(device, detector, Arc::new(graph()), APP, NavigatorConfig::default())
    }

    #[test]
    fn bfs_paths() {
        let nav = navigator(device(false));
        let same = nav.find_path("dm_inbox", "dm_inbox").unwrap();
        assert!(same.is_empty());
        assert_eq!((same.total_cost, same.estimated_reliability), (0.0, 1.0));

        let path = nav.find_path("dm_inbox", "profile_page").unwrap();
        let hops: Vec<&str> = path.steps.iter().map(|s| s.to_screen.as_str()).collect();
        assert_eq!(hops, vec!["home_feed", "explore_grid", "profile_page"]);
        assert_eq!(path.total_cost, 3.0);
        assert!((path.estimated_reliability - 0.95f64.powi(3)).abs() < 1e-9);

        assert!(nav.find_path("profile_page", "home_feed").is_none());
        assert!(!nav.has_path("profile_page", "home_feed"));
        assert!(nav.has_path("detour", "profile_page"));

        let any = nav.find_path_to_any("dm_inbox", &["explore_grid", "home_feed"]).unwrap();
        assert_eq!(any.len(), 1);
    }

    #[test]
    fn bfs_prefers_fewer_hops_over_reliability() {
        let device = device(false);
        let mut nav = navigator(device);
        let g = NavigationGraph::new()
            .with_edge("a", NavigationEdge::new("b", vec![]).reliability(1.0))
            .with_edge("b", NavigationEdge::new("c", vec![]).reliability(1.0))
            .with_edge("a", NavigationEdge::new("c", vec![]).reliability(0.5));
        nav.graph = Arc::new(g);
        let path = nav.find_path("a", "c").unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.estimated_reliability, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn already_there_executes_nothing() {
        let device = device(false);
        let nav = navigator(device.clone());
        let result = nav.navigate_to("home_feed", NavigateOptions::default()).await;
        assert_eq!(result.status, NavigationStatus::AlreadyThere);
        assert!(result.success());
        assert!(device.actions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn multi_step_navigation() {
        let device = device(false);
        let nav = navigator(device.clone());
        let result = nav.navigate_to("profile_page", NavigateOptions::default()).await;
        assert_eq!(result.status, NavigationStatus::Success);
        assert_eq!(result.steps_completed, 2);
        assert_eq!(result.path_summary(), vec!["home_feed → explore_grid", "explore_grid → profile_page"]);
        assert_eq!(device.actions().await, vec!["click desc=Search and explore", "click text=Profile"]);

        let stats = nav.stats().await;
        assert_eq!((stats.total_navigations, stats.successful_navigations), (1, 1));
        assert_eq!(stats.total_steps_executed, 2);
        assert_eq!(stats.graph_screens, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn drift_triggers_replan() {
        let device = device(true);
        let nav = navigator(device.clone());
        let result = nav.navigate_to("profile_page", NavigateOptions::default()).await;
        assert_eq!(result.status, NavigationStatus::Success);
        assert_eq!(result.recovery_attempts, 1);
        assert_eq!(result.steps_completed, 3);
        assert_eq!(result.path_taken[2].from_screen, "detour");
        assert_eq!(device.current_screen().await, "profile_page");
    }

    #[tokio::test(start_paused = true)]
    async fn drift_without_retries_fails() {
        let device = device(true);
        let nav = navigator(device.clone());
        let result = nav.navigate_to("profile_page", NavigateOptions::attempts(1)).await;
        assert_eq!(result.status, NavigationStatus::Failed);
        assert!(!result.success());
        assert_eq!(result.final_screen, "detour");
        assert_eq!(result.error_message.as_deref(), Some("Failed after 1 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_path_is_terminal() {
        let device = device(false);
        device.set_screen("profile_page").await;
        let nav = navigator(device.clone());
        let result = nav.navigate_to("home_feed", NavigateOptions::default()).await;
        assert_eq!(result.status, NavigationStatus::NoPath);
        assert_eq!(result.recovery_attempts, 0);
        assert!(device.actions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_screen_exhausts_attempts() {
        let device = device(false);
        let nav = navigator(device.clone());
        device.fail_next_dumps(10).await;
        let result = nav.navigate_to("profile_page", NavigateOptions::attempts(2)).await;
        assert_eq!(result.status, NavigationStatus::Failed);
        assert_eq!(result.recovery_attempts, 2);
        assert_eq!(result.start_screen, "unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_yields_timeout_or_partial() {
        let nav = navigator(device(false));
        let opts = NavigateOptions { deadline: Some(Duration::ZERO), ..Default::default() };
        let result = nav.navigate_to("profile_page", opts).await;
        assert_eq!(result.status, NavigationStatus::Timeout);

        // first step costs 1.0s wait + 0.5s verification
        let nav = navigator(device(false));
        let opts = NavigateOptions { deadline: Some(Duration::from_millis(1200)), ..Default::default() };
        let result = nav.navigate_to("profile_page", opts).await;
        assert_eq!(result.status, NavigationStatus::Partial);
        assert_eq!(result.steps_completed, 1);
        assert_eq!(result.final_screen, "explore_grid");
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_contexts() {
        let device = device(false);
        device.set_screen("dm_inbox").await;
        let nav = navigator(device.clone());
        let result = nav.recover_to_safe_state(RecoveryContext::parse("warmup")).await;
        assert!(result.success());
        assert_eq!(result.final_screen, "explore_grid");

        let again = nav.recover_to_safe_state("anything".into()).await;
        assert_eq!(again.status, NavigationStatus::AlreadyThere);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_falls_back_to_any_safe_state() {
        let device = device(false);
        device.set_screen("detour").await;
        let nav = navigator(device.clone());
        let result = nav.recover_to_safe_state(RecoveryContext::Login).await;
        assert!(result.success());
        assert_eq!(result.final_screen, "profile_page");

        device.set_screen("detour").await;
        let result = nav.recover_to_safe_state(RecoveryContext::Browse).await;
        assert_eq!(result.status, NavigationStatus::NoPath);
    }

    #[tokio::test(start_paused = true)]
    async fn swipe_uses_relative_coordinates() {
        let device = Arc::new(
            ScriptedDevice::builder("s")
                .screen("feed", UiNode::new("FrameLayout"))
                .screen("next", UiNode::new("FrameLayout"))
                .on_key("feed", "swipe_up", "next")
                .start_at("feed")
                .build(),
        );
        let nav = navigator(device.clone());
        assert!(nav.execute_action(&NavigationAction::swipe_up()).await);
        assert_eq!(device.current_screen().await, "next");
        assert!(!nav.execute_action(&NavigationAction::click_text("missing")).await);
    }
}
