//! Selector mini-language used by screen signatures.
//!
//! | form | meaning |
//! |---|---|
//! | `A OR B` | either side matches |
//! | `contains:foo` | case-insensitive substring of any fingerprint |
//! | `:id/foo`, `pkg:id/foo` | resource id suffix, any package |
//! | `id:foo` | same, short form |
//! | `content-desc:Like` / `text:Your story` | exact fingerprint |
//! | `VideoView` | short class name |
//! | anything else | content-desc, then text, then short id |

use crate::elements::ElementSet;
use serde::{Deserialize, Serialize};

const ID_SEPARATOR: &str = ":id/";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    Any(Vec<Selector>),
    Contains(String),
    ResourceId(String),
    ContentDesc(String),
    Text(String),
    ClassShort(String),
    Generic(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Selector {
        if raw.contains(" OR ") {
            return Selector::Any(raw.split(" OR ").map(|p| Selector::parse(p.trim())).collect());
        }
        if let Some(rest) = raw.strip_prefix("contains:") {
            return Selector::Contains(rest.to_lowercase());
        }
        if raw.contains(ID_SEPARATOR) {
            let suffix = raw.rsplit(ID_SEPARATOR).next().unwrap_or_default();
            return Selector::ResourceId(suffix.to_string());
        }
        if let Some(rest) = raw.strip_prefix("id:") {
            return Selector::ResourceId(rest.to_string());
        }
        if let Some(rest) = raw.strip_prefix("content-desc:") {
            return Selector::ContentDesc(rest.to_string());
        }
        if let Some(rest) = raw.strip_prefix("text:") {
            return Selector::Text(rest.to_string());
        }
        let capitalized = raw.chars().next().map_or(false, |c| c.is_uppercase());
        if capitalized && !raw.contains(':') {
            return Selector::ClassShort(raw.to_string());
        }
        Selector::Generic(raw.to_string())
    }

    pub fn matches(&self, elements: &ElementSet) -> bool {
        match self {
            Selector::Any(parts) => parts.iter().any(|p| p.matches(elements)),
            Selector::Contains(needle) => {
                elements.iter().any(|e| e.to_lowercase().contains(needle.as_str()))
            }
            Selector::ResourceId(suffix) => id_matches(suffix, elements),
            Selector::ContentDesc(v) => elements.contains(&format!("content-desc:{v}")),
            Selector::Text(v) => elements.contains(&format!("text:{v}")),
            Selector::ClassShort(v) => elements.contains(&format!("class-short:{v}")),
            Selector::Generic(v) => {
                elements.contains(&format!("content-desc:{v}"))
                    || elements.contains(&format!("text:{v}"))
                    || elements.contains(&format!("id:{v}"))
            }
        }
    }
}

fn id_matches(suffix: &str, elements: &ElementSet) -> bool {
    let needle = format!("{ID_SEPARATOR}{suffix}");
    let short = format!("id:{suffix}");
    elements.iter().any(|e| (e.starts_with("resource-id:") && e.contains(&needle)) || e == &short)
}

/// Parses and evaluates `selector` in one go.
pub fn selector_matches(selector: &str, elements: &ElementSet) -> bool {
    Selector::parse(selector).matches(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> ElementSet {
        ElementSet::from_fingerprints(items.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parse_forms() {
        assert_eq!(
            Selector::parse("content-desc:Like OR content-desc:Unlike"),
            Selector::Any(vec![
                Selector::ContentDesc("Like".into()),
                Selector::ContentDesc("Unlike".into()),
            ])
        );
        assert_eq!(Selector::parse("contains:Reel BY"), Selector::Contains("reel by".into()));
        assert_eq!(
            Selector::parse("com.instagram.android:id/peek_container"),
            Selector::ResourceId("peek_container".into())
        );
        assert_eq!(Selector::parse(":id/peek_container"), Selector::ResourceId("peek_container".into()));
        assert_eq!(Selector::parse("id:peek_container"), Selector::ResourceId("peek_container".into()));
        assert_eq!(Selector::parse("VideoView"), Selector::ClassShort("VideoView".into()));
        assert_eq!(Selector::parse("Allow:now"), Selector::Generic("Allow:now".into()));
        assert_eq!(Selector::parse("like"), Selector::Generic("like".into()));
    }

    #[test]
    fn resource_id_is_clone_safe() {
        let elements = set(&["resource-id:com.instagram.clone:id/row_feed_button_like"]);
        assert!(selector_matches(":id/row_feed_button_like", &elements));
        assert!(selector_matches("com.instagram.android:id/row_feed_button_like", &elements));
        assert!(selector_matches("id:row_feed_button_like", &elements));
        assert!(!selector_matches("id:row_feed_button_share", &elements));
    }

    #[test]
    fn short_id_fingerprint_matches_exactly() {
        let elements = set(&["id:explore_action_bar"]);
        assert!(selector_matches("id:explore_action_bar", &elements));
        assert!(!selector_matches("id:explore_action", &elements));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let elements = set(&["content-desc:Reel by someone"]);
        assert!(selector_matches("contains:reel BY", &elements));
        assert!(!selector_matches("contains:story", &elements));
    }

    #[test]
    fn exact_desc_and_text() {
        let elements = set(&["text:Your story", "content-desc:Like"]);
        assert!(selector_matches("text:Your story", &elements));
        assert!(!selector_matches("text:your story", &elements));
        assert!(selector_matches("content-desc:Like", &elements));
        assert!(selector_matches("content-desc:Nope OR text:Your story", &elements));
    }

    #[test]
    fn class_and_generic_fallback() {
        let elements = set(&["class-short:VideoView", "text:Allow", "id:like_button"]);
        assert!(selector_matches("VideoView", &elements));
        assert!(!selector_matches("ImageView", &elements));
        assert!(selector_matches("like_button", &elements));
        // capitalized bare tokens are class names, never text
        assert!(!selector_matches("Allow", &elements));
        assert!(selector_matches("text:Allow OR text:Deny", &elements));
    }
}
