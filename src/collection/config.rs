//! Collection configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Options recognised by `ObservableSortableCollection`.
///
/// Decodable from JSON; every field is optional and falls back to its
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// `replace` is permitted.
    pub allow_edit: bool,
    /// `remove_at` and `clear` are permitted.
    pub allow_remove: bool,
    /// `begin_add` is permitted. Unset derives it from whether the
    /// collection can construct items.
    pub allow_new: Option<bool>,
    /// Maximum depth of enumerated and observed paths. 0 = direct
    /// properties only.
    pub traversal_depth: usize,
    /// Report every path below a replaced intermediate object.
    pub cascade_nested_notifications: bool,
    /// Emit structural events. Property-change events are always emitted.
    pub raise_list_changed_events: bool,
    /// Events dispatched from inside this many nested handlers are dropped.
    pub max_dispatch_depth: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            allow_edit: true,
            allow_remove: true,
            allow_new: None,
            traversal_depth: 1,
            cascade_nested_notifications: true,
            raise_list_changed_events: true,
            max_dispatch_depth: 32,
        }
    }
}

impl CollectionConfig {
    pub fn with_depth(traversal_depth: usize) -> Self {
        Self { traversal_depth, ..Self::default() }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("collection config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_dispatch_depth == 0 {
            return Err(Error::InvalidArgument("max_dispatch_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectionConfig::default();
        assert!(config.allow_edit);
        assert!(config.allow_remove);
        assert_eq!(config.allow_new, None);
        assert_eq!(config.traversal_depth, 1);
        assert!(config.cascade_nested_notifications);
    }

    #[test]
    fn test_from_json_partial() {
        let config = CollectionConfig::from_json(r#"{"traversal_depth": 2, "allow_new": false}"#).unwrap();
        assert_eq!(config.traversal_depth, 2);
        assert_eq!(config.allow_new, Some(false));
        assert!(config.allow_remove);
    }

    #[test]
    fn test_negative_depth_rejected() {
        assert!(CollectionConfig::from_json(r#"{"traversal_depth": -1}"#).is_err());
        assert!(CollectionConfig::from_json(r#"{"max_dispatch_depth": 0}"#).is_err());
    }
}
