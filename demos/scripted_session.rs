use anyhow::Result;
use async_trait::async_trait;
use screen_pilot::navigator::NavigateOptions;
use screen_pilot::search::SearchOptions;
use screen_pilot::{
    Device, DeviceError, DeviceHub, DeviceProvider, ElementQuery, HubConfig, NavigationGraph,
    ScriptedDevice, SignatureRegistry, UiNode,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn id(name: &str) -> String {
    format!("com.instagram.android:id/{name}")
}

fn tabs() -> UiNode {
    UiNode::new("android.widget.LinearLayout").children(
        ["Home", "Search and explore", "Reels", "Profile"]
            .into_iter()
            .map(|d| UiNode::new("android.widget.FrameLayout").with_desc(d).clickable()),
    )
}

fn scripted_instagram() -> ScriptedDevice {
    let desc = |d: &str| ElementQuery::description(d);
    ScriptedDevice::builder("scripted-0")
        .screen(
            "home",
            UiNode::new("android.widget.FrameLayout").children([
                UiNode::new("android.widget.ImageView").with_id(id("row_feed_button_like")).clickable(),
                tabs(),
            ]),
        )
        .screen(
            "explore",
            UiNode::new("android.widget.FrameLayout").children([
                UiNode::new("android.widget.LinearLayout").with_id(id("explore_action_bar")).child(
                    UiNode::new("android.widget.EditText")
                        .with_id(id("action_bar_search_edit_text"))
                        .clickable(),
                ),
                tabs(),
            ]),
        )
        .screen(
            "results",
            UiNode::new("android.widget.FrameLayout").children([
                UiNode::new("android.widget.ImageView").with_id(id("action_bar_button_back")),
                UiNode::new("android.widget.HorizontalScrollView")
                    .with_id(id("scrollable_tab_layout"))
                    .child(UiNode::new("android.widget.TextView").with_text("Reels").clickable()),
                UiNode::new("android.widget.ImageView").with_desc("Reel by someone").clickable(),
            ]),
        )
        .screen(
            "save_login",
            UiNode::new("android.widget.FrameLayout").children([
                UiNode::new("android.view.View").with_desc("Save your login info?"),
                UiNode::new("android.widget.Button").with_text("Not now").clickable(),
            ]),
        )
        .on_click("home", desc("Search and explore"), "explore")
        .on_click("explore", desc("Home"), "home")
        .on_key("explore", "enter", "results")
        .on_key("results", "back", "explore")
        .on_click("save_login", ElementQuery::text("Not now"), "home")
        .start_at("save_login")
        .launch_to("home")
        .build()
}

struct Local(Arc<ScriptedDevice>);

#[async_trait]
impl DeviceProvider for Local {
    async fn connect(&self, serial: &str) -> Result<Arc<dyn Device>, DeviceError> {
        if serial == self.0.serial() {
            Ok(self.0.clone())
        } else {
            Err(DeviceError::Disconnected(serial.to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let device = Arc::new(scripted_instagram());
    let hub = DeviceHub::new(
        Arc::new(Local(device.clone())),
        Arc::new(SignatureRegistry::builtin()?),
        Arc::new(NavigationGraph::builtin()),
        HubConfig::default(),
    );
    let serial = device.serial().to_string();

    // First access loads popup_patterns.json and starts the watcher, which
    // should clear the "save login info" prompt on its own.
    let first = hub.detect_screen(&serial, None, true).await?;
    info!(screen = %first.full_id(), "first look");
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    let detection = hub.detect_screen(&serial, None, true).await?;
    println!("{}", serde_json::to_string_pretty(&detection)?);

    let nav = hub.navigate_to(&serial, "explore_grid", NavigateOptions::default()).await?;
    println!("{}", serde_json::to_string_pretty(&nav)?);

    let search = hub.search_for_keyword(&serial, "sunsets", &SearchOptions::default()).await?;
    println!("{}", serde_json::to_string_pretty(&search)?);

    let recovery = hub.recover_to_safe_state(&serial, "warmup").await?;
    println!("{}", serde_json::to_string_pretty(&recovery)?);

    let history = hub.popup_history(&serial, 20, false).await?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    println!("{}", serde_json::to_string_pretty(&hub.navigation_stats(&serial).await?)?);

    for (serial, stop) in hub.shutdown().await {
        info!(serial = %serial, status = ?stop, "watcher stopped");
    }
    Ok(())
}
