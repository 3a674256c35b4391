use crate::device::UiNode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Normalized fingerprints extracted from one snapshot.
///
/// Each node contributes several spellings of the same attribute so that a
/// selector matches no matter which format its author picked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementSet {
    items: HashSet<String>,
}

impl ElementSet {
    pub fn from_tree(root: &UiNode) -> Self {
        let mut items = HashSet::new();
        for node in root.iter() {
            if !node.resource_id.is_empty() {
                items.insert(format!("resource-id:{}", node.resource_id));
                if let Some((_, suffix)) = node.resource_id.rsplit_once(":id/") {
                    items.insert(format!("id:{suffix}"));
                }
            }
            if !node.content_desc.is_empty() {
                items.insert(format!("content-desc:{}", node.content_desc));
                items.insert(format!("content-desc-lower:{}", node.content_desc.to_lowercase()));
            }
            if !node.text.is_empty() {
                items.insert(format!("text:{}", node.text));
                items.insert(format!("text-lower:{}", node.text.to_lowercase()));
            }
            if !node.class_name.is_empty() {
                items.insert(format!("class:{}", node.class_name));
                if let Some((_, short)) = node.class_name.rsplit_once('.') {
                    items.insert(format!("class-short:{short}"));
                }
            }
            if node.clickable {
                if !node.content_desc.is_empty() {
                    items.insert(format!("clickable:{}", node.content_desc));
                }
                if !node.text.is_empty() {
                    items.insert(format!("clickable-text:{}", node.text));
                }
            }
        }
        Self { items }
    }

    pub fn from_fingerprints(items: impl IntoIterator<Item = String>) -> Self {
        Self { items: items.into_iter().collect() }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.items.contains(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sorted values of every fingerprint with `prefix`, prefix stripped.
    pub fn values_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .items
            .iter()
            .filter_map(|e| e.strip_prefix(prefix))
            .map(str::to_string)
            .collect();
        out.sort();
        out
    }
}

/// Snapshot contents grouped by attribute, for authoring new signatures.
#[derive(Clone, Debug, Serialize)]
pub struct SignatureDump {
    pub timestamp: DateTime<Utc>,
    pub resource_ids: Vec<String>,
    pub content_descs: Vec<String>,
    pub texts: Vec<String>,
    pub classes: Vec<String>,
    pub clickables: Vec<String>,
    pub total_elements: usize,
    pub hint: String,
}

impl SignatureDump {
    pub fn from_elements(elements: &ElementSet) -> Self {
        Self {
            timestamp: Utc::now(),
            resource_ids: elements.values_with_prefix("id:"),
            content_descs: elements.values_with_prefix("content-desc:"),
            texts: elements.values_with_prefix("text:"),
            classes: elements.values_with_prefix("class-short:"),
            clickables: elements.values_with_prefix("clickable:"),
            total_elements: elements.len(),
            hint: "prefer ':id/<name>' selectors; they match any package prefix".to_string(),
        }
    }
}
