//! Static screen-transition graph.
//!
//! Edges are hand-authored: each one lists the gestures that move the app from
//! one screen to another, plus a cost and an empirical reliability. The graph
//! is built once and shared read-only.

use crate::device::ElementQuery;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const WARMUP_SAFE_STATES: &[&str] =
    &["explore_grid", "search_results_reels", "reel_viewing", "home_feed"];
pub const LOGIN_SAFE_STATES: &[&str] = &["home_feed", "explore_grid", "profile_page"];
pub const BROWSE_SAFE_STATES: &[&str] = &["explore_grid", "search_results_reels"];

const DEFAULT_RELIABILITY: f64 = 0.95;

// ========================= Actions =========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    PressBack,
    /// Structural lookup for elements without a stable label.
    ClickElement { query: ElementQuery },
    /// Bottom navigation tab, matched on exact content-desc.
    ClickTab { name: String },
    ClickText { text: String },
    ClickContentDesc { desc: String },
    SwipeUp,
    SwipeDown,
    Wait,
    LaunchApp { package: String, activity: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationAction {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(with = "secs")]
    pub wait_after: Duration,
    pub description: String,
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let v = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(v.max(0.0)))
    }
}

fn secs_f(v: f64) -> Duration {
    Duration::from_secs_f64(v)
}

impl NavigationAction {
    pub fn new(kind: ActionKind, wait_after: Duration, description: impl Into<String>) -> Self {
        Self { kind, wait_after, description: description.into() }
    }

    pub fn press_back() -> Self {
        Self::new(ActionKind::PressBack, secs_f(0.8), "Press back")
    }

    pub fn click_text(text: &str) -> Self {
        Self::new(
            ActionKind::ClickText { text: text.to_string() },
            secs_f(1.0),
            format!("Click text: {text}"),
        )
    }

    pub fn click_content_desc(desc: &str) -> Self {
        Self::new(
            ActionKind::ClickContentDesc { desc: desc.to_string() },
            secs_f(1.0),
            format!("Click desc: {desc}"),
        )
    }

    pub fn click_tab(name: &str) -> Self {
        Self::new(
            ActionKind::ClickTab { name: name.to_string() },
            secs_f(1.0),
            format!("Click tab: {name}"),
        )
    }

    pub fn click_element(query: ElementQuery) -> Self {
        let description = format!("Click: {query}");
        Self::new(ActionKind::ClickElement { query }, secs_f(1.0), description)
    }

    pub fn wait(seconds: f64) -> Self {
        Self::new(ActionKind::Wait, secs_f(seconds), format!("Wait {seconds}s"))
    }

    pub fn swipe_up() -> Self {
        Self::new(ActionKind::SwipeUp, secs_f(0.5), "Swipe up")
    }

    pub fn swipe_down() -> Self {
        Self::new(ActionKind::SwipeDown, secs_f(0.5), "Swipe down")
    }

    pub fn launch_app(package: &str) -> Self {
        Self::new(
            ActionKind::LaunchApp { package: package.to_string(), activity: None },
            secs_f(3.0),
            format!("Launch {package}"),
        )
    }

    pub fn wait_after(mut self, seconds: f64) -> Self {
        self.wait_after = secs_f(seconds);
        self
    }

    /// Text, label, package or query the action aims at, if any.
    pub fn target(&self) -> Option<String> {
        match &self.kind {
            ActionKind::ClickElement { query } => Some(query.to_string()),
            ActionKind::ClickTab { name } => Some(name.clone()),
            ActionKind::ClickText { text } => Some(text.clone()),
            ActionKind::ClickContentDesc { desc } => Some(desc.clone()),
            ActionKind::LaunchApp { package, .. } => Some(package.clone()),
            ActionKind::PressBack | ActionKind::SwipeUp | ActionKind::SwipeDown | ActionKind::Wait => {
                None
            }
        }
    }
}

// ========================= Edges & Graph =========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationEdge {
    pub to_screen: String,
    pub actions: Vec<NavigationAction>,
    pub cost: f64,
    pub reliability: f64,
    pub description: String,
}

impl NavigationEdge {
    pub fn new(to_screen: &str, actions: Vec<NavigationAction>) -> Self {
        Self {
            to_screen: to_screen.to_string(),
            actions,
            cost: 1.0,
            reliability: DEFAULT_RELIABILITY,
            description: String::new(),
        }
    }

    pub fn reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability.clamp(f64::MIN_POSITIVE, 1.0);
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn describe(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct NavigationGraph {
    edges: HashMap<String, Vec<NavigationEdge>>,
}

impl NavigationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Login and main-app graphs merged.
    pub fn builtin() -> Self {
        let mut graph = Self::login_flow();
        graph.merge(Self::main_app());
        graph
    }

    pub fn add_edge(&mut self, from: &str, edge: NavigationEdge) -> &mut Self {
        self.edges.entry(from.to_string()).or_default().push(edge);
        self
    }

    pub fn with_edge(mut self, from: &str, edge: NavigationEdge) -> Self {
        self.add_edge(from, edge);
        self
    }

    /// Union of edge lists per source screen; existing edges keep precedence.
    pub fn merge(&mut self, other: NavigationGraph) {
        for (from, edges) in other.edges {
            self.edges.entry(from).or_default().extend(edges);
        }
    }

    pub fn edges_from(&self, screen: &str) -> &[NavigationEdge] {
        self.edges.get(screen).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Source screens, sorted.
    pub fn screens(&self) -> Vec<String> {
        let mut screens: Vec<String> = self.edges.keys().cloned().collect();
        screens.sort();
        screens
    }

    pub fn screen_count(&self) -> usize {
        self.edges.len()
    }

    pub fn login_flow() -> Self {
        Self::new()
            .with_edge(
                "login_page",
                NavigationEdge::new(
                    "login_password",
                    vec![NavigationAction::click_element(ElementQuery::resource_id_contains(
                        "login_username",
                    ))],
                )
                .describe("Enter username field"),
            )
            .with_edge(
                "login_save_info",
                NavigationEdge::new("home_feed", vec![NavigationAction::click_text("Not now").wait_after(2.0)])
                    .reliability(0.98)
                    .describe("Skip save login info"),
            )
            .with_edge(
                "login_save_info",
                NavigationEdge::new("home_feed", vec![NavigationAction::click_text("Not Now").wait_after(2.0)])
                    .describe("Skip save login info (alt)"),
            )
            .with_edge(
                "notifications_prompt",
                NavigationEdge::new("home_feed", vec![NavigationAction::click_text("Not Now").wait_after(1.5)])
                    .reliability(0.98)
                    .describe("Skip notifications prompt"),
            )
    }

    pub fn main_app() -> Self {
        use NavigationAction as A;

        let tab = |to: &str, name: &str, desc: &str| {
            NavigationEdge::new(to, vec![A::click_tab(name)]).reliability(0.98).describe(desc)
        };
        let back = |to: &str, reliability: f64, desc: &str| {
            NavigationEdge::new(to, vec![A::press_back()]).reliability(reliability).describe(desc)
        };
        let by_id = |to: &str, id: &str, reliability: f64, desc: &str| {
            NavigationEdge::new(to, vec![A::click_element(ElementQuery::resource_id_contains(id))])
                .reliability(reliability)
                .describe(desc)
        };

        let mut g = Self::new();
        // home feed
        g.add_edge("home_feed", tab("explore_grid", "Search and explore", "Go to Explore from Home"))
            .add_edge("home_feed", tab("reels_tab", "Reels", "Go to Reels tab"))
            .add_edge("home_feed", tab("profile_page", "Profile", "Go to Profile"))
            .add_edge(
                "home_feed",
                NavigationEdge::new(
                    "dm_inbox",
                    vec![A::click_content_desc("Direct message button, Double tap for direct messages")],
                )
                .describe("Go to DM inbox"),
            )
            .add_edge(
                "home_feed",
                NavigationEdge::new("create_post_select", vec![A::click_tab("Create")])
                    .describe("Open create menu"),
            );

        // explore
        g.add_edge("explore_grid", tab("home_feed", "Home", "Go to Home from Explore"))
            .add_edge(
                "explore_grid",
                by_id("search_input", "action_bar_search_edit_text", 0.98, "Focus search input"),
            )
            .add_edge("explore_grid", tab("reels_tab", "Reels", "Go to Reels tab from Explore"))
            .add_edge("explore_grid", tab("profile_page", "Profile", "Go to Profile from Explore"));

        // search results
        g.add_edge(
            "search_results_reels",
            NavigationEdge::new("explore_grid", vec![A::press_back().wait_after(1.0)])
                .describe("Back to Explore from search results"),
        )
        .add_edge(
            "search_results_reels",
            NavigationEdge::new(
                "reel_viewing",
                vec![A::click_element(ElementQuery::resource_id_contains("image_button")).wait_after(1.5)],
            )
            .reliability(0.9)
            .describe("Open first reel from search"),
        )
        .add_edge("search_results_accounts", back("explore_grid", 0.95, "Back to Explore"))
        .add_edge("search_results_tags", back("explore_grid", 0.95, "Back to Explore"))
        .add_edge("search_input", back("explore_grid", 0.98, "Cancel search"));

        // reel viewer
        g.add_edge(
            "reel_viewing",
            NavigationEdge::new("explore_grid", vec![A::press_back().wait_after(1.0)])
                .reliability(0.9)
                .describe("Exit reel to Explore"),
        )
        .add_edge(
            "reel_viewing",
            NavigationEdge::new("comments_view", vec![A::click_content_desc("Comment")])
                .describe("Open comments"),
        )
        .add_edge("reel_viewing", by_id("likes_page", "like_count", 0.85, "Open likes page"))
        .add_edge(
            "reel_viewing",
            NavigationEdge::new(
                "profile_page",
                vec![A::click_element(ElementQuery::AnyOf(vec![
                    ElementQuery::resource_id_contains("clips_author_profile_pic"),
                    ElementQuery::resource_id_contains("row_feed_photo_profile_imageview"),
                ]))],
            )
            .reliability(0.9)
            .describe("Go to reel author profile"),
        );

        // reels tab
        g.add_edge("reels_tab", tab("home_feed", "Home", "Go to Home from Reels"))
            .add_edge("reels_tab", tab("explore_grid", "Search and explore", "Go to Explore from Reels"))
            .add_edge(
                "reels_tab",
                NavigationEdge::new("comments_view", vec![A::click_content_desc("Comment")])
                    .describe("Open comments on reel"),
            );

        // profile
        g.add_edge("profile_page", tab("home_feed", "Home", "Go to Home from Profile"))
            .add_edge("profile_page", tab("explore_grid", "Search and explore", "Go to Explore from Profile"))
            .add_edge(
                "profile_page",
                by_id("profile_followers", "row_profile_header_followers_container", 0.9, "Open followers list"),
            )
            .add_edge(
                "profile_page",
                by_id("profile_following", "row_profile_header_following_container", 0.9, "Open following list"),
            );

        // overlays and leaf screens
        g.add_edge(
            "comments_view",
            NavigationEdge::new("reel_viewing", vec![A::press_back().wait_after(0.5)])
                .reliability(0.98)
                .describe("Close comments"),
        )
        .add_edge("likes_page", back("reel_viewing", 0.98, "Close likes page"))
        .add_edge("share_sheet", back("reel_viewing", 0.98, "Close share sheet"))
        .add_edge("peek_view", back("explore_grid", 0.98, "Close peek view"))
        .add_edge("profile_followers", back("profile_page", 0.98, "Close followers list"))
        .add_edge("profile_following", back("profile_page", 0.98, "Close following list"))
        .add_edge("dm_inbox", back("home_feed", 0.95, "Back to Home from DMs"))
        .add_edge("story_viewing", back("home_feed", 0.9, "Exit story to Home"))
        .add_edge("create_post_select", back("home_feed", 0.95, "Cancel create"))
        .add_edge("create_post_edit", back("create_post_select", 0.9, "Back to selection"));

        g
    }
}

// ========================= Introspection =========================

#[derive(Clone, Debug, Serialize)]
pub struct EdgeInfo {
    pub to: String,
    pub cost: f64,
    pub reliability: f64,
    pub description: String,
    pub actions: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum GraphInfo {
    Summary {
        total_screens: usize,
        screens: Vec<String>,
        safe_states: Vec<String>,
    },
    Screen {
        screen: String,
        outgoing_edges: Vec<EdgeInfo>,
    },
}

impl GraphInfo {
    pub fn describe(graph: &NavigationGraph, screen: Option<&str>) -> Self {
        match screen {
            None => {
                let mut safe_states: Vec<String> =
                    WARMUP_SAFE_STATES.iter().map(|s| s.to_string()).collect();
                safe_states.sort();
                GraphInfo::Summary {
                    total_screens: graph.screen_count(),
                    screens: graph.screens(),
                    safe_states,
                }
            }
            Some(screen) => GraphInfo::Screen {
                screen: screen.to_string(),
                outgoing_edges: graph
                    .edges_from(screen)
                    .iter()
                    .map(|e| EdgeInfo {
                        to: e.to_screen.clone(),
                        cost: e.cost,
                        reliability: e.reliability,
                        description: e.description.clone(),
                        actions: e.actions.len(),
                    })
                    .collect(),
            },
        }
    }
}

/// Per-source edge counts, for log lines.
pub fn edge_counts(graph: &NavigationGraph) -> BTreeMap<String, usize> {
    graph
        .screens()
        .into_iter()
        .map(|s| {
            let n = graph.edges_from(&s).len();
            (s, n)
        })
        .collect()
}
