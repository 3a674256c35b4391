//! Screen detection: snapshot cache, signature scoring and running stats.

use crate::config::DetectorConfig;
use crate::device::{Device, DeviceError, UiNode};
use crate::elements::{ElementSet, SignatureDump};
use crate::selector::selector_matches;
use crate::signature::{Candidate, ScreenDetectionResult, ScreenSignature, SignatureRegistry};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};

const MAX_CANDIDATES: usize = 5;
const NEAR_TIE_MARGIN: f64 = 0.1;

struct Snapshot {
    id: String,
    taken_at: Instant,
    tree: Arc<UiNode>,
    elements: Option<Arc<ElementSet>>,
}

#[derive(Default)]
struct Counters {
    detections: u64,
    total_time_ms: f64,
    unknown: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    pub detection_count: u64,
    pub average_time_ms: f64,
    pub unknown_count: u64,
    pub unknown_rate: f64,
}

pub struct ScreenDetector {
    device: Arc<dyn Device>,
    registry: Arc<SignatureRegistry>,
    config: DetectorConfig,
    cache: Mutex<Option<Snapshot>>,
    counters: Mutex<Counters>,
}

impl ScreenDetector {
    pub fn new(
        device: Arc<dyn Device>,
        registry: Arc<SignatureRegistry>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            device,
            registry,
            config,
            cache: Mutex::new(None),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn registry(&self) -> &Arc<SignatureRegistry> {
        &self.registry
    }

    /// Returns the cached tree while it is younger than the TTL, else dumps.
    ///
    /// The cache lock is released for the dump itself; two racing refreshes
    /// both dump and the later one wins.
    pub async fn snapshot(&self, force_refresh: bool) -> Result<Arc<UiNode>, DeviceError> {
        if !force_refresh {
            if let Some(snap) = self.cache.lock().await.as_ref() {
                if snap.taken_at.elapsed() < self.config.snapshot_ttl {
                    return Ok(snap.tree.clone());
                }
            }
        }
        let tree = Arc::new(self.device.dump_tree().await?);
        let id = nanoid::nanoid!(10);
        debug!(serial = %self.device.serial(), snapshot = %id, "fresh hierarchy dump");
        *self.cache.lock().await = Some(Snapshot {
            id,
            taken_at: Instant::now(),
            tree: tree.clone(),
            elements: None,
        });
        Ok(tree)
    }

    /// Fingerprints of the current snapshot, extracted once per snapshot.
    pub async fn elements(&self, force_refresh: bool) -> Result<Arc<ElementSet>, DeviceError> {
        let tree = self.snapshot(force_refresh).await?;
        let mut cache = self.cache.lock().await;
        if let Some(snap) = cache.as_mut() {
            if Arc::ptr_eq(&snap.tree, &tree) {
                if let Some(elements) = &snap.elements {
                    return Ok(elements.clone());
                }
                let elements = Arc::new(ElementSet::from_tree(&tree));
                debug!(snapshot = %snap.id, count = elements.len(), "elements extracted");
                snap.elements = Some(elements.clone());
                return Ok(elements);
            }
        }
        // replaced by a concurrent refresh; use what we dumped
        Ok(Arc::new(ElementSet::from_tree(&tree)))
    }

    pub async fn invalidate_cache(&self) {
        *self.cache.lock().await = None;
    }

    pub async fn detect_screen(
        &self,
        app_id: &str,
        force_refresh: bool,
        include_system: bool,
    ) -> ScreenDetectionResult {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_secs_f64() * 1000.0;

        let elements = match self.elements(force_refresh).await {
            Ok(e) => e,
            Err(e) => {
                error!(serial = %self.device.serial(), error = %e, "UI dump failed");
                return ScreenDetectionResult::failed(
                    app_id,
                    elapsed_ms(),
                    format!("Failed to dump UI hierarchy: {e}"),
                );
            }
        };

        let signatures = self.registry.signatures(app_id, include_system);
        if signatures.is_empty() {
            return ScreenDetectionResult::failed(
                app_id,
                elapsed_ms(),
                format!("No signatures registered for app: {app_id}"),
            );
        }

        let mut scored: Vec<(f64, Vec<String>, &ScreenSignature)> = signatures
            .iter()
            .filter_map(|sig| {
                let (score, matched) = score_signature(sig, &elements);
                (score > 0.0).then_some((score, matched, sig))
            })
            .collect();
        // stable, so equal scores keep priority order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let detection_time_ms = elapsed_ms();
        {
            let mut c = self.counters.lock().await;
            c.detections += 1;
            c.total_time_ms += detection_time_ms;
            if scored.is_empty() {
                c.unknown += 1;
            }
        }

        let Some((score, matched, winner)) = scored.first() else {
            self.log_unknown(app_id, &elements);
            return ScreenDetectionResult::unknown(app_id, detection_time_ms);
        };

        if let Some((second, _, runner_up)) = scored.get(1) {
            if score - second < NEAR_TIE_MARGIN {
                debug!(
                    winner = %winner.screen_id,
                    winner_score = *score,
                    runner_up = %runner_up.screen_id,
                    runner_up_score = *second,
                    "close match"
                );
            }
        }

        ScreenDetectionResult {
            app_id: winner.app_id.clone(),
            screen_id: winner.screen_id.clone(),
            confidence: *score,
            detection_time_ms,
            matched_elements: matched.clone(),
            candidates: scored
                .iter()
                .take(MAX_CANDIDATES)
                .map(|(score, _, sig)| Candidate { screen_id: sig.screen_id.clone(), score: *score })
                .collect(),
            description: winner.description.clone(),
            is_safe_state: winner.is_safe_state,
            recovery_action: winner.recovery_action.clone(),
            error: None,
        }
    }

    fn log_unknown(&self, app_id: &str, elements: &ElementSet) {
        let top = |prefix: &str| -> Vec<String> {
            elements.values_with_prefix(prefix).into_iter().take(5).collect()
        };
        warn!(
            serial = %self.device.serial(),
            app = app_id,
            ids = ?top("id:"),
            descs = ?top("content-desc:"),
            texts = ?top("text:"),
            "unknown screen"
        );
    }

    pub async fn stats(&self) -> DetectionStats {
        let c = self.counters.lock().await;
        if c.detections == 0 {
            return DetectionStats::default();
        }
        let n = c.detections as f64;
        DetectionStats {
            detection_count: c.detections,
            average_time_ms: round_to(c.total_time_ms / n, 2),
            unknown_count: c.unknown,
            unknown_rate: round_to(c.unknown as f64 / n, 3),
        }
    }

    /// Groups a fresh snapshot's fingerprints for writing a new signature.
    pub async fn dump_for_signature(&self) -> Result<SignatureDump, DeviceError> {
        let elements = self.elements(true).await?;
        Ok(SignatureDump::from_elements(&elements))
    }
}

/// Scores one signature against a fingerprint set.
///
/// Forbidden selectors veto everything, a unique hit is an instant 1.0,
/// otherwise the required hit ratio (0.5 with no required list) plus up to
/// 0.1 for optional hits.
pub fn score_signature(sig: &ScreenSignature, elements: &ElementSet) -> (f64, Vec<String>) {
    let forbidden_hit = || sig.forbidden.iter().any(|f| selector_matches(f, elements));

    if let Some(unique) = sig.unique.iter().find(|u| selector_matches(u, elements)) {
        if forbidden_hit() {
            return (0.0, Vec::new());
        }
        return (1.0, vec![format!("unique:{unique}")]);
    }
    if forbidden_hit() {
        return (0.0, Vec::new());
    }

    let mut matched: Vec<String> = sig
        .required
        .iter()
        .filter(|r| selector_matches(r, elements))
        .map(|r| format!("required:{r}"))
        .collect();
    if !sig.required.is_empty() && matched.is_empty() {
        return (0.0, Vec::new());
    }
    let base = if sig.required.is_empty() {
        0.5
    } else {
        matched.len() as f64 / sig.required.len() as f64
    };

    let optional_hits: Vec<String> = sig
        .optional
        .iter()
        .filter(|o| selector_matches(o, elements))
        .map(|o| format!("optional:{o}"))
        .collect();
    let boost = if sig.optional.is_empty() {
        0.0
    } else {
        0.1 * optional_hits.len() as f64 / sig.optional.len() as f64
    };
    matched.extend(optional_hits);

    ((base + boost).min(1.0), matched)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ScriptedDevice;
    use crate::signature::SYSTEM_APP_ID;
    use std::time::Duration;

    fn set(items: &[&str]) -> ElementSet {
        ElementSet::from_fingerprints(items.iter().map(|s| s.to_string()))
    }

    fn home_feed() -> ScreenSignature {
        ScreenSignature::builder("app", "home_feed")
            .required(&["id:row_feed_button_like"])
            .forbidden(&["id:action_bar_search_edit_text", "id:profile_header_container"])
            .optional(&["text:Your story", "id:title_logo"])
            .priority(25)
            .build()
            .unwrap()
    }

    #[test]
    fn forbidden_vetoes_unique_hit() {
        let sig = ScreenSignature::builder("app", "grid")
            .unique(&["id:grid"])
            .forbidden(&["text:Comments"])
            .build()
            .unwrap();
        assert_eq!(score_signature(&sig, &set(&["id:grid"])).0, 1.0);
        assert_eq!(score_signature(&sig, &set(&["id:grid", "text:Comments"])).0, 0.0);
    }

    #[test]
    fn required_miss_ignores_optional() {
        let sig = home_feed();
        let (score, matched) = score_signature(&sig, &set(&["text:Your story", "id:title_logo"]));
        assert_eq!(score, 0.0);
        assert!(matched.is_empty());
    }

    #[test]
    fn required_ratio_plus_bounded_boost() {
        let sig = home_feed();
        let (score, matched) =
            score_signature(&sig, &set(&["id:row_feed_button_like", "text:Your story"]));
        assert!((score - 1.0).abs() < 1e-9, "1.0 + 0.05 caps at 1.0, got {score}");
        assert_eq!(matched, vec!["required:id:row_feed_button_like", "optional:text:Your story"]);

        let partial = ScreenSignature::builder("app", "two")
            .required(&["id:a", "id:b"])
            .optional(&["id:c", "id:d"])
            .build()
            .unwrap();
        let (score, _) = score_signature(&partial, &set(&["id:a", "id:c"]));
        assert!((score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn no_required_is_catch_all_half() {
        let sig = ScreenSignature::builder("app", "loose")
            .unique(&["id:never"])
            .optional(&["id:x"])
            .build()
            .unwrap();
        let (score, _) = score_signature(&sig, &set(&["id:x"]));
        assert!((score - 0.6).abs() < 1e-9);
        assert!(score <= 1.0);
    }

    fn detector_for(tree: UiNode, sigs: Vec<ScreenSignature>) -> (Arc<ScriptedDevice>, ScreenDetector) {
        let device = Arc::new(ScriptedDevice::builder("test").screen("s", tree).start_at("s").build());
        let mut registry = SignatureRegistry::new();
        registry.register("app", sigs).unwrap();
        let detector = ScreenDetector::new(device.clone(), Arc::new(registry), DetectorConfig::default());
        (device, detector)
    }

    fn feed_tree() -> UiNode {
        UiNode::new("android.widget.FrameLayout").children([
            UiNode::new("android.widget.ImageView").with_id("com.instagram.android:id/row_feed_button_like"),
            UiNode::new("android.widget.TextView").with_text("Your story"),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn home_feed_detected_then_vetoed() {
        let (_, detector) = detector_for(feed_tree(), vec![home_feed()]);
        let result = detector.detect_screen("app", true, false).await;
        assert_eq!(result.screen_id, "home_feed");
        assert!(result.confidence >= 0.5);
        assert_eq!(result.candidates.len(), 1);

        let vetoed = feed_tree()
            .child(UiNode::new("android.view.View").with_id("com.instagram.android:id/profile_header_container"));
        let (_, detector) = detector_for(vetoed, vec![home_feed()]);
        let result = detector.detect_screen("app", true, false).await;
        assert!(result.is_unknown());
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_counts_once_per_call() {
        let (_, detector) = detector_for(UiNode::new("FrameLayout").with_text("nothing"), vec![home_feed()]);
        detector.detect_screen("app", true, false).await;
        detector.detect_screen("app", true, false).await;
        let stats = detector.stats().await;
        assert_eq!(stats.detection_count, 2);
        assert_eq!(stats.unknown_count, 2);
        assert_eq!(stats.unknown_rate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_app_and_dump_failure_are_errors() {
        let (device, detector) = detector_for(feed_tree(), vec![home_feed()]);
        let result = detector.detect_screen("other", true, false).await;
        assert!(result.is_unknown());
        assert!(result.error.unwrap().contains("No signatures"));

        device.fail_next_dumps(1).await;
        let result = detector.detect_screen("app", true, false).await;
        assert!(result.error.is_some());
        assert_eq!(detector.stats().await.detection_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_cache_honours_ttl() {
        let (device, detector) = detector_for(feed_tree(), vec![home_feed()]);
        let first = detector.snapshot(false).await.unwrap();
        device.fail_next_dumps(1).await;
        // still cached, so the injected failure is not hit
        let second = detector.snapshot(false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(detector.snapshot(false).await.is_err());
        assert!(detector.snapshot(false).await.is_ok());

        let before = detector.snapshot(false).await.unwrap();
        detector.invalidate_cache().await;
        let after = detector.snapshot(false).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test(start_paused = true)]
    async fn system_overlay_outranks_app_screen() {
        let device = Arc::new(
            ScriptedDevice::builder("test")
                .screen(
                    "s",
                    feed_tree().children([
                        UiNode::new("android.widget.Button").with_text("Allow"),
                        UiNode::new("android.widget.Button").with_text("Deny"),
                    ]),
                )
                .start_at("s")
                .build(),
        );
        let mut registry = SignatureRegistry::new();
        registry.register("app", vec![home_feed()]).unwrap();
        registry
            .register(
                SYSTEM_APP_ID,
                vec![ScreenSignature::builder(SYSTEM_APP_ID, "permission_dialog")
                    .required(&["text:Allow", "text:Deny"])
                    .priority(100)
                    .build()
                    .unwrap()],
            )
            .unwrap();
        let detector = ScreenDetector::new(device, Arc::new(registry), DetectorConfig::default());

        let result = detector.detect_screen("app", true, true).await;
        assert_eq!(result.full_id(), "android_system/permission_dialog");
        assert_eq!(result.candidates[1].screen_id, "home_feed");

        let app_only = detector.detect_screen("app", true, false).await;
        assert_eq!(app_only.screen_id, "home_feed");
    }

    #[tokio::test(start_paused = true)]
    async fn signature_dump_reflects_screen() {
        let (_, detector) = detector_for(feed_tree(), vec![home_feed()]);
        let dump = detector.dump_for_signature().await.unwrap();
        assert_eq!(dump.resource_ids, vec!["row_feed_button_like"]);
        assert_eq!(dump.texts, vec!["Your story"]);
    }
}
