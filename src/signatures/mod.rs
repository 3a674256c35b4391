//! Baked-in signature sets.

pub mod android_system;
pub mod instagram;

use crate::signature::{SignatureError, SignatureRegistry, SYSTEM_APP_ID};

/// Registry preloaded with every built-in app plus the system overlays.
pub fn builtin_registry() -> Result<SignatureRegistry, SignatureError> {
    let mut registry = SignatureRegistry::new();
    registry.register(instagram::APP_ID, instagram::signatures()?)?;
    registry.register(SYSTEM_APP_ID, android_system::signatures()?)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sets_register_cleanly() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.apps(), vec![instagram::APP_ID, SYSTEM_APP_ID]);
        assert!(registry.screen_ids(instagram::APP_ID).contains(&"home_feed".to_string()));
        assert!(registry.safe_states(instagram::APP_ID).contains(&"explore_grid".to_string()));
        // overlays outrank base screens
        let merged = registry.signatures(instagram::APP_ID, true);
        assert!(merged.first().unwrap().priority >= 95);
    }
}
