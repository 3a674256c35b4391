use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

// ========================= Core Types =========================

/// One node of an accessibility-tree snapshot.
///
/// Attribute names follow the uiautomator dump: `resource-id`, `content-desc`,
/// `text`, `class`, `clickable`. Empty strings mean "attribute absent".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    #[serde(default, rename = "resource-id")]
    pub resource_id: String,
    #[serde(default, rename = "content-desc")]
    pub content_desc: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default)]
    pub children: Vec<UiNode>,
}

impl UiNode {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), ..Default::default() }
    }

    pub fn with_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    pub fn with_desc(mut self, content_desc: impl Into<String>) -> Self {
        self.content_desc = content_desc.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }

    pub fn child(mut self, node: UiNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = UiNode>) -> Self {
        self.children.extend(nodes);
        self
    }

    /// Depth-first, pre-order walk including `self`.
    pub fn iter(&self) -> UiNodeIter<'_> {
        UiNodeIter { stack: vec![self] }
    }

    pub fn find(&self, query: &ElementQuery) -> Option<&UiNode> {
        self.iter().find(|n| query.matches_node(n))
    }

    pub fn contains(&self, query: &ElementQuery) -> bool {
        self.find(query).is_some()
    }
}

pub struct UiNodeIter<'a> {
    stack: Vec<&'a UiNode>,
}

impl<'a> Iterator for UiNodeIter<'a> {
    type Item = &'a UiNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// How a gesture or presence check locates an element on the device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum ElementQuery {
    Text(String),
    TextContains(String),
    Description(String),
    DescriptionContains(String),
    /// Id suffix after `:id/`, package-agnostic.
    ResourceId(String),
    ResourceIdContains(String),
    ClassName(String),
    AnyOf(Vec<ElementQuery>),
    /// Every sub-query must hold for the same node.
    AllOf(Vec<ElementQuery>),
    /// Structural query handed to the driver as-is.
    XPath(String),
}

impl ElementQuery {
    pub fn text(v: impl Into<String>) -> Self {
        Self::Text(v.into())
    }

    pub fn description(v: impl Into<String>) -> Self {
        Self::Description(v.into())
    }

    pub fn resource_id(v: impl Into<String>) -> Self {
        Self::ResourceId(v.into())
    }

    pub fn resource_id_contains(v: impl Into<String>) -> Self {
        Self::ResourceIdContains(v.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::AnyOf(parts) | Self::AllOf(parts) => {
                parts.is_empty() || parts.iter().all(|p| p.is_blank())
            }
            Self::Text(v)
            | Self::TextContains(v)
            | Self::Description(v)
            | Self::DescriptionContains(v)
            | Self::ResourceId(v)
            | Self::ResourceIdContains(v)
            | Self::ClassName(v)
            | Self::XPath(v) => v.trim().is_empty(),
        }
    }

    /// Local evaluation against a dumped node. XPath never matches here.
    pub fn matches_node(&self, node: &UiNode) -> bool {
        match self {
            Self::Text(v) => !node.text.is_empty() && node.text == *v,
            Self::TextContains(v) => !node.text.is_empty() && node.text.contains(v.as_str()),
            Self::Description(v) => !node.content_desc.is_empty() && node.content_desc == *v,
            Self::DescriptionContains(v) => {
                !node.content_desc.is_empty() && node.content_desc.contains(v.as_str())
            }
            Self::ResourceId(v) => {
                let rid = &node.resource_id;
                !rid.is_empty()
                    && (rid == v || rid.rsplit(":id/").next().map_or(false, |suffix| suffix == v))
            }
            Self::ResourceIdContains(v) => {
                !node.resource_id.is_empty() && node.resource_id.contains(v.as_str())
            }
            Self::ClassName(v) => {
                !node.class_name.is_empty()
                    && (node.class_name == *v || node.class_name.rsplit('.').next() == Some(v))
            }
            Self::AnyOf(parts) => parts.iter().any(|p| p.matches_node(node)),
            Self::AllOf(parts) => !parts.is_empty() && parts.iter().all(|p| p.matches_node(node)),
            Self::XPath(_) => false,
        }
    }
}

impl std::fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(v) => write!(f, "text={v}"),
            Self::TextContains(v) => write!(f, "text~{v}"),
            Self::Description(v) => write!(f, "desc={v}"),
            Self::DescriptionContains(v) => write!(f, "desc~{v}"),
            Self::ResourceId(v) => write!(f, "id={v}"),
            Self::ResourceIdContains(v) => write!(f, "id~{v}"),
            Self::ClassName(v) => write!(f, "class={v}"),
            Self::AnyOf(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", joined.join(" | "))
            }
            Self::AllOf(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", joined.join(" & "))
            }
            Self::XPath(v) => write!(f, "xpath={v}"),
        }
    }
}

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum DeviceError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("command failed: {0}")]
    Command(String),
}

impl DeviceError {
    /// Errors after which further commands on the same handle are pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Disconnected(_))
    }
}

// ========================= Pluggable Subsystems =========================

/// The low-level driver for one device. Implementations own the transport;
/// every call may block up to the driver's own timeout.
#[async_trait]
pub trait Device: Send + Sync {
    fn serial(&self) -> &str;
    async fn dump_tree(&self) -> Result<UiNode, DeviceError>;
    async fn window_size(&self) -> Result<(u32, u32), DeviceError>;
    async fn exists(&self, query: &ElementQuery) -> Result<bool, DeviceError>;
    async fn click(&self, query: &ElementQuery) -> Result<(), DeviceError>;
    async fn element_text(&self, query: &ElementQuery) -> Result<Option<String>, DeviceError>;
    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration: Duration,
    ) -> Result<(), DeviceError>;
    async fn press_key(&self, key: &str) -> Result<(), DeviceError>;
    async fn type_text(&self, text: &str) -> Result<(), DeviceError>;
    async fn clear_text(&self) -> Result<(), DeviceError>;
    async fn app_start(&self, package: &str, activity: Option<&str>) -> Result<(), DeviceError>;
    async fn app_stop(&self, package: &str) -> Result<(), DeviceError>;
    async fn last_toast(&self) -> Result<Option<String>, DeviceError>;
    async fn reset_toast(&self) -> Result<(), DeviceError>;
}

/// Resolves a device serial to a live driver handle.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn connect(&self, serial: &str) -> Result<Arc<dyn Device>, DeviceError>;
}

// ========================= Helpers =========================

const WAIT_POLL: Duration = Duration::from_millis(100);

/// Polls until `query` is present or `timeout` elapses.
pub async fn wait_until_exists(
    device: &dyn Device,
    query: &ElementQuery,
    timeout: Duration,
) -> Result<bool, DeviceError> {
    let deadline = Instant::now() + timeout;
    loop {
        if device.exists(query).await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(WAIT_POLL).await;
    }
}

/// Polls until `query` is absent or `timeout` elapses.
pub async fn wait_until_gone(
    device: &dyn Device,
    query: &ElementQuery,
    timeout: Duration,
) -> Result<bool, DeviceError> {
    let deadline = Instant::now() + timeout;
    loop {
        if !device.exists(query).await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(WAIT_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UiNode {
        UiNode::new("android.widget.FrameLayout").children([
            UiNode::new("android.widget.TextView")
                .with_id("com.instagram.android:id/title_logo")
                .with_text("Instagram"),
            UiNode::new("android.widget.LinearLayout").child(
                UiNode::new("android.widget.Button")
                    .with_desc("Search and explore")
                    .clickable(),
            ),
        ])
    }

    #[test]
    fn iter_walks_depth_first() {
        let tree = sample();
        let classes: Vec<&str> = tree.iter().map(|n| n.class_name.as_str()).collect();
        assert_eq!(
            classes,
            vec![
                "android.widget.FrameLayout",
                "android.widget.TextView",
                "android.widget.LinearLayout",
                "android.widget.Button",
            ]
        );
    }

    #[test]
    fn resource_id_query_ignores_package() {
        let tree = sample();
        assert!(tree.contains(&ElementQuery::resource_id("title_logo")));
        assert!(tree.contains(&ElementQuery::resource_id_contains("title")));
        assert!(!tree.contains(&ElementQuery::resource_id("title")));
    }

    #[test]
    fn any_of_and_class_queries() {
        let tree = sample();
        let q = ElementQuery::AnyOf(vec![
            ElementQuery::text("Nope"),
            ElementQuery::description("Search and explore"),
        ]);
        assert!(tree.contains(&q));
        assert!(tree.contains(&ElementQuery::ClassName("Button".into())));
        let both = ElementQuery::AllOf(vec![
            ElementQuery::ClassName("TextView".into()),
            ElementQuery::resource_id_contains("title"),
        ]);
        assert!(tree.contains(&both));
        assert!(!tree.contains(&ElementQuery::AllOf(vec![
            ElementQuery::ClassName("Button".into()),
            ElementQuery::resource_id_contains("title"),
        ])));
        assert!(!tree.contains(&ElementQuery::XPath("//*".into())));
    }

    #[test]
    fn blank_queries() {
        assert!(ElementQuery::text("  ").is_blank());
        assert!(ElementQuery::AnyOf(vec![]).is_blank());
        assert!(!ElementQuery::text("OK").is_blank());
    }

    #[test]
    fn query_json_form() {
        let q: ElementQuery =
            serde_json::from_str(r#"{"by":"text_contains","value":"Turn on"}"#).unwrap();
        assert_eq!(q, ElementQuery::TextContains("Turn on".into()));
    }
}
