//! An in-memory [`Device`] that walks a scripted set of screens.
//!
//! Screens are plain [`UiNode`] trees. Gestures move between them through
//! transitions keyed by the current screen and a [`Trigger`]. Useful for
//! offline sessions and for exercising the detector/navigator without hardware.

use crate::device::{Device, DeviceError, ElementQuery, UiNode};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Clicking any element the query matches.
    Click(ElementQuery),
    /// Key press by name (`back`, `enter`), or `swipe_up` / `swipe_down`.
    Key(String),
}

#[derive(Default)]
struct ScriptState {
    current: String,
    typed: String,
    toast: Option<String>,
    pending_toasts: VecDeque<String>,
    actions: Vec<String>,
    failing_dumps: usize,
    failing_gestures: usize,
    failing_checks: HashMap<ElementQuery, usize>,
    disconnected: bool,
}

impl ScriptState {
    fn link(&self) -> Result<(), DeviceError> {
        if self.disconnected {
            return Err(DeviceError::Disconnected("scripted link down".into()));
        }
        Ok(())
    }

    /// Consumes one injected gesture failure, if any are pending.
    fn gesture(&mut self, name: &str) -> Result<(), DeviceError> {
        self.link()?;
        if self.failing_gestures > 0 {
            self.failing_gestures -= 1;
            return Err(DeviceError::Command(format!("{name} rejected")));
        }
        Ok(())
    }

    /// Consumes one injected failure for lookups of `query`, if any are pending.
    fn check(&mut self, query: &ElementQuery) -> Result<(), DeviceError> {
        self.link()?;
        if let Some(left) = self.failing_checks.get_mut(query) {
            *left -= 1;
            if *left == 0 {
                self.failing_checks.remove(query);
            }
            return Err(DeviceError::Timeout(format!("lookup of {query} timed out")));
        }
        Ok(())
    }
}

pub struct ScriptedDevice {
    serial: String,
    screens: HashMap<String, UiNode>,
    transitions: Vec<(String, Trigger, String)>,
    launch_screen: Option<String>,
    size: (u32, u32),
    state: Mutex<ScriptState>,
}

pub struct ScriptedDeviceBuilder {
    serial: String,
    screens: HashMap<String, UiNode>,
    transitions: Vec<(String, Trigger, String)>,
    launch_screen: Option<String>,
    start: Option<String>,
    size: (u32, u32),
}

impl ScriptedDeviceBuilder {
    pub fn screen(mut self, name: impl Into<String>, tree: UiNode) -> Self {
        self.screens.insert(name.into(), tree);
        self
    }

    pub fn on_click(
        mut self,
        from: impl Into<String>,
        query: ElementQuery,
        to: impl Into<String>,
    ) -> Self {
        self.transitions.push((from.into(), Trigger::Click(query), to.into()));
        self
    }

    pub fn on_key(
        mut self,
        from: impl Into<String>,
        key: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.transitions.push((from.into(), Trigger::Key(key.into()), to.into()));
        self
    }

    pub fn launch_to(mut self, screen: impl Into<String>) -> Self {
        self.launch_screen = Some(screen.into());
        self
    }

    pub fn start_at(mut self, screen: impl Into<String>) -> Self {
        self.start = Some(screen.into());
        self
    }

    pub fn window(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn build(self) -> ScriptedDevice {
        let current = self.start.unwrap_or_default();
        ScriptedDevice {
            serial: self.serial,
            screens: self.screens,
            transitions: self.transitions,
            launch_screen: self.launch_screen,
            size: self.size,
            state: Mutex::new(ScriptState { current, ..Default::default() }),
        }
    }
}

impl ScriptedDevice {
    pub fn builder(serial: impl Into<String>) -> ScriptedDeviceBuilder {
        ScriptedDeviceBuilder {
            serial: serial.into(),
            screens: HashMap::new(),
            transitions: Vec::new(),
            launch_screen: None,
            start: None,
            size: (1080, 2400),
        }
    }

    pub async fn current_screen(&self) -> String {
        self.state.lock().await.current.clone()
    }

    pub async fn set_screen(&self, screen: impl Into<String>) {
        self.state.lock().await.current = screen.into();
    }

    /// Queues a toast; it becomes visible once the current one is reset.
    pub async fn push_toast(&self, text: impl Into<String>) {
        let mut st = self.state.lock().await;
        if st.toast.is_none() {
            st.toast = Some(text.into());
        } else {
            st.pending_toasts.push_back(text.into());
        }
    }

    pub async fn fail_next_dumps(&self, count: usize) {
        self.state.lock().await.failing_dumps = count;
    }

    /// Makes the next `count` gestures (click, key, swipe, typing) fail.
    pub async fn fail_next_gestures(&self, count: usize) {
        self.state.lock().await.failing_gestures = count;
    }

    /// Makes the next `count` lookups (`exists`, `element_text`) of exactly
    /// `query` time out. Other queries are unaffected.
    pub async fn fail_next_checks(&self, query: ElementQuery, count: usize) {
        let mut st = self.state.lock().await;
        if count == 0 {
            st.failing_checks.remove(&query);
        } else {
            st.failing_checks.insert(query, count);
        }
    }

    /// While disconnected every call fails with [`DeviceError::Disconnected`].
    pub async fn set_connected(&self, connected: bool) {
        self.state.lock().await.disconnected = !connected;
    }

    /// Every gesture performed so far, in order.
    pub async fn actions(&self) -> Vec<String> {
        self.state.lock().await.actions.clone()
    }

    pub async fn typed_text(&self) -> String {
        self.state.lock().await.typed.clone()
    }

    fn tree(&self, screen: &str) -> Result<&UiNode, DeviceError> {
        self.screens
            .get(screen)
            .ok_or_else(|| DeviceError::Command(format!("no scripted screen '{screen}'")))
    }

    fn follow(&self, current: &str, trigger: impl Fn(&Trigger) -> bool) -> Option<&str> {
        self.transitions
            .iter()
            .find(|(from, t, _)| from == current && trigger(t))
            .map(|(_, _, to)| to.as_str())
    }

    async fn key_transition(&self, key: &str) -> Result<(), DeviceError> {
        let mut st = self.state.lock().await;
        st.gesture(key)?;
        st.actions.push(format!("key {key}"));
        let next = self
            .follow(&st.current, |t| matches!(t, Trigger::Key(k) if k == key))
            .map(str::to_string);
        if let Some(next) = next {
            debug!(from = %st.current, to = %next, key, "scripted transition");
            st.current = next;
        }
        Ok(())
    }
}

#[async_trait]
impl Device for ScriptedDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn dump_tree(&self) -> Result<UiNode, DeviceError> {
        let mut st = self.state.lock().await;
        st.link()?;
        if st.failing_dumps > 0 {
            st.failing_dumps -= 1;
            return Err(DeviceError::Command("hierarchy dump failed".into()));
        }
        Ok(self.tree(&st.current)?.clone())
    }

    async fn window_size(&self) -> Result<(u32, u32), DeviceError> {
        self.state.lock().await.link()?;
        Ok(self.size)
    }

    async fn exists(&self, query: &ElementQuery) -> Result<bool, DeviceError> {
        let mut st = self.state.lock().await;
        st.check(query)?;
        Ok(self.tree(&st.current)?.contains(query))
    }

    async fn click(&self, query: &ElementQuery) -> Result<(), DeviceError> {
        let mut st = self.state.lock().await;
        st.gesture("click")?;
        let node = self
            .tree(&st.current)?
            .find(query)
            .ok_or_else(|| DeviceError::ElementNotFound(query.to_string()))?;
        st.actions.push(format!("click {query}"));
        let next = self
            .follow(&st.current, |t| matches!(t, Trigger::Click(q) if q.matches_node(node)))
            .map(str::to_string);
        if let Some(next) = next {
            debug!(from = %st.current, to = %next, "scripted transition");
            st.current = next;
        }
        Ok(())
    }

    async fn element_text(&self, query: &ElementQuery) -> Result<Option<String>, DeviceError> {
        let mut st = self.state.lock().await;
        st.check(query)?;
        Ok(self.tree(&st.current)?.find(query).and_then(|n| {
            if !n.text.is_empty() {
                Some(n.text.clone())
            } else if !n.content_desc.is_empty() {
                Some(n.content_desc.clone())
            } else {
                None
            }
        }))
    }

    async fn swipe(
        &self,
        _x1: u32,
        y1: u32,
        _x2: u32,
        y2: u32,
        _duration: Duration,
    ) -> Result<(), DeviceError> {
        let key = if y2 < y1 { "swipe_up" } else { "swipe_down" };
        self.key_transition(key).await
    }

    async fn press_key(&self, key: &str) -> Result<(), DeviceError> {
        self.key_transition(key).await
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        let mut st = self.state.lock().await;
        st.gesture("type")?;
        st.typed.push_str(text);
        st.actions.push(format!("type {text}"));
        Ok(())
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        let mut st = self.state.lock().await;
        st.gesture("clear")?;
        st.typed.clear();
        st.actions.push("clear".to_string());
        Ok(())
    }

    async fn app_start(&self, package: &str, activity: Option<&str>) -> Result<(), DeviceError> {
        let mut st = self.state.lock().await;
        st.link()?;
        st.actions.push(match activity {
            Some(a) => format!("start {package}/{a}"),
            None => format!("start {package}"),
        });
        if let Some(screen) = &self.launch_screen {
            st.current = screen.clone();
        }
        Ok(())
    }

    async fn app_stop(&self, package: &str) -> Result<(), DeviceError> {
        let mut st = self.state.lock().await;
        st.link()?;
        st.actions.push(format!("stop {package}"));
        Ok(())
    }

    async fn last_toast(&self) -> Result<Option<String>, DeviceError> {
        let st = self.state.lock().await;
        st.link()?;
        Ok(st.toast.clone())
    }

    async fn reset_toast(&self) -> Result<(), DeviceError> {
        let mut st = self.state.lock().await;
        st.link()?;
        st.toast = st.pending_toasts.pop_front();
        Ok(())
    }
}
