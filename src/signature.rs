use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Namespace whose signatures overlay every app (permission, crash dialogs).
pub const SYSTEM_APP_ID: &str = "android_system";
pub const UNKNOWN_SCREEN: &str = "unknown";
pub const CONFIDENT_THRESHOLD: f64 = 0.8;

#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignatureError {
    #[error("signature {0} declares neither required nor unique selectors")]
    NoDiscriminator(String),
    #[error("signature {full_id} registered under namespace '{namespace}'")]
    WrongNamespace { full_id: String, namespace: String },
    #[error("duplicate screen id {0}")]
    Duplicate(String),
}

/// Fingerprint of one recognizable UI state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenSignature {
    pub app_id: String,
    pub screen_id: String,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<String>,
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub recovery_action: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_safe_state: bool,
}

fn default_priority() -> i32 {
    50
}

impl ScreenSignature {
    pub fn builder(app_id: &str, screen_id: &str) -> SignatureBuilder {
        SignatureBuilder {
            sig: ScreenSignature {
                app_id: app_id.to_string(),
                screen_id: screen_id.to_string(),
                required: Vec::new(),
                forbidden: Vec::new(),
                unique: Vec::new(),
                optional: Vec::new(),
                priority: default_priority(),
                recovery_action: None,
                description: String::new(),
                is_safe_state: false,
            },
        }
    }

    pub fn full_id(&self) -> String {
        format!("{}/{}", self.app_id, self.screen_id)
    }

    pub fn validate(&self) -> Result<(), SignatureError> {
        if self.required.is_empty() && self.unique.is_empty() {
            return Err(SignatureError::NoDiscriminator(self.full_id()));
        }
        Ok(())
    }
}

pub struct SignatureBuilder {
    sig: ScreenSignature,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SignatureBuilder {
    pub fn describe(mut self, text: &str) -> Self {
        self.sig.description = text.to_string();
        self
    }

    pub fn required(mut self, items: &[&str]) -> Self {
        self.sig.required = owned(items);
        self
    }

    pub fn forbidden(mut self, items: &[&str]) -> Self {
        self.sig.forbidden = owned(items);
        self
    }

    pub fn unique(mut self, items: &[&str]) -> Self {
        self.sig.unique = owned(items);
        self
    }

    pub fn optional(mut self, items: &[&str]) -> Self {
        self.sig.optional = owned(items);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.sig.priority = priority;
        self
    }

    pub fn recovery(mut self, action: &str) -> Self {
        self.sig.recovery_action = Some(action.to_string());
        self
    }

    pub fn safe(mut self) -> Self {
        self.sig.is_safe_state = true;
        self
    }

    pub fn build(self) -> Result<ScreenSignature, SignatureError> {
        self.sig.validate()?;
        Ok(self.sig)
    }
}

// ========================= Detection Result =========================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub screen_id: String,
    pub score: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreenDetectionResult {
    pub app_id: String,
    pub screen_id: String,
    pub confidence: f64,
    pub detection_time_ms: f64,
    pub matched_elements: Vec<String>,
    pub candidates: Vec<Candidate>,
    pub description: String,
    pub is_safe_state: bool,
    pub recovery_action: Option<String>,
    pub error: Option<String>,
}

impl ScreenDetectionResult {
    pub fn unknown(app_id: &str, detection_time_ms: f64) -> Self {
        Self {
            app_id: app_id.to_string(),
            screen_id: UNKNOWN_SCREEN.to_string(),
            confidence: 0.0,
            detection_time_ms,
            matched_elements: Vec::new(),
            candidates: Vec::new(),
            description: String::new(),
            is_safe_state: false,
            recovery_action: None,
            error: None,
        }
    }

    pub fn failed(app_id: &str, detection_time_ms: f64, error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::unknown(app_id, detection_time_ms) }
    }

    pub fn is_confident(&self) -> bool {
        self.confidence >= CONFIDENT_THRESHOLD
    }

    pub fn is_unknown(&self) -> bool {
        self.screen_id == UNKNOWN_SCREEN
    }

    pub fn full_id(&self) -> String {
        format!("{}/{}", self.app_id, self.screen_id)
    }
}

// ========================= Registry =========================

/// Per-app signature sets, each kept sorted by priority (highest first).
///
/// Populated once at start-up; reads are lock-free afterwards because the
/// registry is shared behind an `Arc` and never mutated again.
#[derive(Clone, Debug, Default)]
pub struct SignatureRegistry {
    by_app: HashMap<String, Vec<ScreenSignature>>,
    order: Vec<String>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every baked-in app set plus the system overlays.
    pub fn builtin() -> Result<Self, SignatureError> {
        crate::signatures::builtin_registry()
    }

    /// Replaces the full signature list for `app_id`.
    pub fn register(
        &mut self,
        app_id: &str,
        mut signatures: Vec<ScreenSignature>,
    ) -> Result<(), SignatureError> {
        let mut seen = std::collections::HashSet::new();
        for sig in &signatures {
            sig.validate()?;
            if sig.app_id != app_id {
                return Err(SignatureError::WrongNamespace {
                    full_id: sig.full_id(),
                    namespace: app_id.to_string(),
                });
            }
            if !seen.insert(sig.screen_id.as_str()) {
                return Err(SignatureError::Duplicate(sig.full_id()));
            }
        }
        // stable: equal priorities keep declaration order
        signatures.sort_by(|a, b| b.priority.cmp(&a.priority));
        if !self.by_app.contains_key(app_id) {
            self.order.push(app_id.to_string());
        }
        self.by_app.insert(app_id.to_string(), signatures);
        Ok(())
    }

    pub fn signatures(&self, app_id: &str, include_system: bool) -> Vec<ScreenSignature> {
        let mut sigs = self.by_app.get(app_id).cloned().unwrap_or_default();
        if include_system && app_id != SYSTEM_APP_ID {
            if let Some(system) = self.by_app.get(SYSTEM_APP_ID) {
                sigs.extend(system.iter().cloned());
                sigs.sort_by(|a, b| b.priority.cmp(&a.priority));
            }
        }
        sigs
    }

    pub fn signature(&self, app_id: &str, screen_id: &str) -> Option<&ScreenSignature> {
        self.by_app.get(app_id)?.iter().find(|s| s.screen_id == screen_id)
    }

    pub fn screen_ids(&self, app_id: &str) -> Vec<String> {
        self.by_app
            .get(app_id)
            .map(|sigs| sigs.iter().map(|s| s.screen_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn safe_states(&self, app_id: &str) -> Vec<String> {
        self.by_app
            .get(app_id)
            .map(|sigs| {
                sigs.iter().filter(|s| s.is_safe_state).map(|s| s.screen_id.clone()).collect()
            })
            .unwrap_or_default()
    }

    pub fn apps(&self) -> Vec<String> {
        self.order.clone()
    }
}

/// Signature details (or the app's screen listing) for the caller surface.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ScreenInfo {
    Listing {
        app_id: String,
        screens: Vec<String>,
        safe_states: Vec<String>,
        total_count: usize,
        apps_available: Vec<String>,
    },
    Detail {
        full_id: String,
        #[serde(flatten)]
        signature: ScreenSignature,
    },
    Missing {
        error: String,
        available_screens: Vec<String>,
    },
}

impl ScreenInfo {
    pub fn lookup(registry: &SignatureRegistry, app_id: &str, screen_id: Option<&str>) -> Self {
        match screen_id {
            None => {
                let screens = registry.screen_ids(app_id);
                ScreenInfo::Listing {
                    app_id: app_id.to_string(),
                    total_count: screens.len(),
                    screens,
                    safe_states: registry.safe_states(app_id),
                    apps_available: registry.apps(),
                }
            }
            Some(id) => match registry.signature(app_id, id) {
                Some(sig) => ScreenInfo::Detail { full_id: sig.full_id(), signature: sig.clone() },
                None => ScreenInfo::Missing {
                    error: format!("screen '{id}' not found for app '{app_id}'"),
                    available_screens: registry.screen_ids(app_id),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(app: &str, screen: &str, priority: i32) -> ScreenSignature {
        ScreenSignature::builder(app, screen)
            .unique(&[format!("id:{screen}").as_str()])
            .priority(priority)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_signature_without_discriminator() {
        let err = ScreenSignature::builder("app", "blank").optional(&["text:x"]).build().unwrap_err();
        assert_eq!(err, SignatureError::NoDiscriminator("app/blank".into()));
    }

    #[test]
    fn register_sorts_by_priority() {
        let mut reg = SignatureRegistry::new();
        reg.register("app", vec![sig("app", "low", 10), sig("app", "high", 90), sig("app", "mid", 50)])
            .unwrap();
        assert_eq!(reg.screen_ids("app"), vec!["high", "mid", "low"]);
    }

    #[test]
    fn register_replaces_previous_list() {
        let mut reg = SignatureRegistry::new();
        reg.register("app", vec![sig("app", "a", 10)]).unwrap();
        reg.register("app", vec![sig("app", "b", 10)]).unwrap();
        assert_eq!(reg.screen_ids("app"), vec!["b"]);
        assert_eq!(reg.apps(), vec!["app"]);
    }

    #[test]
    fn register_fails_loudly() {
        let mut reg = SignatureRegistry::new();
        let mut bad = sig("app", "a", 10);
        bad.unique.clear();
        assert!(matches!(reg.register("app", vec![bad]), Err(SignatureError::NoDiscriminator(_))));
        assert!(matches!(
            reg.register("app", vec![sig("other", "a", 10)]),
            Err(SignatureError::WrongNamespace { .. })
        ));
        assert!(matches!(
            reg.register("app", vec![sig("app", "a", 10), sig("app", "a", 20)]),
            Err(SignatureError::Duplicate(_))
        ));
        assert!(reg.apps().is_empty());
    }

    #[test]
    fn system_overlays_are_merged_on_request() {
        let mut reg = SignatureRegistry::new();
        reg.register("app", vec![sig("app", "feed", 25)]).unwrap();
        reg.register(SYSTEM_APP_ID, vec![sig(SYSTEM_APP_ID, "permission_dialog", 100)]).unwrap();

        let ids: Vec<String> = reg.signatures("app", true).into_iter().map(|s| s.screen_id).collect();
        assert_eq!(ids, vec!["permission_dialog", "feed"]);
        assert_eq!(reg.signatures("app", false).len(), 1);
        assert_eq!(reg.signatures(SYSTEM_APP_ID, true).len(), 1);
    }

    #[test]
    fn safe_states_and_lookup() {
        let mut reg = SignatureRegistry::new();
        let safe = ScreenSignature::builder("app", "grid").unique(&["id:grid"]).safe().build().unwrap();
        reg.register("app", vec![safe, sig("app", "feed", 10)]).unwrap();
        assert_eq!(reg.safe_states("app"), vec!["grid"]);
        assert!(reg.signature("app", "feed").is_some());
        assert!(reg.signature("app", "nope").is_none());
        assert!(matches!(ScreenInfo::lookup(&reg, "app", Some("nope")), ScreenInfo::Missing { .. }));
    }

    #[test]
    fn result_predicates() {
        let r = ScreenDetectionResult::unknown("app", 1.0);
        assert!(r.is_unknown());
        assert!(!r.is_confident());
        assert_eq!(r.full_id(), "app/unknown");
    }
}
