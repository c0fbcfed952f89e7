//! Settings layers
//!
//! A [`SettingsLayer`] is one mapping from slash-delimited key paths to
//! [`SettingValue`]s. The store stacks three of them; which one wins for a key
//! is decided by [`PRECEDENCE`].

use crate::error::{Error, Result};
use crate::value::{SettingValue, split_key};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one of the three layers of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Session-scoped overrides, never persisted
    Temporary,
    /// User customizations, persisted to the user settings file
    User,
    /// Shipped defaults from builder, default files and descriptors
    Default,
}

/// Resolution order: the first layer holding a key wins.
pub const PRECEDENCE: [LayerKind; 3] = [LayerKind::Temporary, LayerKind::User, LayerKind::Default];

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayerKind::Temporary => "temporary",
            LayerKind::User => "user",
            LayerKind::Default => "default",
        })
    }
}

/// An ordered key-path to value mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsLayer {
    root: SettingValue,
}

impl Default for SettingsLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLayer {
    /// Create an empty layer
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: SettingValue::map(),
        }
    }

    /// Build a layer from a deserialized value tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedValue`] if `root` is not a map. An absent
    /// root (an empty file) yields an empty layer.
    pub fn from_value(root: SettingValue) -> Result<Self> {
        match root {
            SettingValue::Map(_) => Ok(Self { root }),
            SettingValue::Absent => Ok(Self::new()),
            other => Err(Error::MalformedValue {
                key: "<root>".into(),
                expected: format!("map, found {}", other.type_name()),
            }),
        }
    }

    /// The whole layer as one value tree
    #[must_use]
    pub fn root(&self) -> &SettingValue {
        &self.root
    }

    #[must_use]
    pub fn into_value(self) -> SettingValue {
        self.root
    }

    /// Exact lookup within this layer only.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.root.get_path(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite `key`.
    ///
    /// With `only_if_different`, a stored value structurally equal to `value`
    /// is left alone and `Ok(false)` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `key` is not a valid path.
    pub fn set(&mut self, key: &str, value: SettingValue, only_if_different: bool) -> Result<bool> {
        split_key(key)?;
        if only_if_different && self.get(key) == Some(&value) {
            return Ok(false);
        }
        self.root.set_path(key, value)?;
        Ok(true)
    }

    /// Remove `key`, returning whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.root.remove_path(key).is_some()
    }

    /// Leaf key paths of the layer, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.root.leaf_paths()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.as_map().is_none_or(|m| m.is_empty())
    }

    pub fn clear(&mut self) {
        self.root = SettingValue::map();
    }

    /// Deep-merge another value tree on top of this layer.
    ///
    /// Non-map trees are ignored; a layer root is always a map.
    pub fn merge(&mut self, tree: SettingValue) {
        if tree.is_map() {
            self.root.merge(tree);
        }
    }
}

/// The three layers of a store, addressable by [`LayerKind`].
#[derive(Debug, Clone, Default)]
pub(crate) struct LayerStack {
    pub temporary: SettingsLayer,
    pub user: SettingsLayer,
    pub default: SettingsLayer,
}

impl LayerStack {
    pub fn layer(&self, kind: LayerKind) -> &SettingsLayer {
        match kind {
            LayerKind::Temporary => &self.temporary,
            LayerKind::User => &self.user,
            LayerKind::Default => &self.default,
        }
    }

    pub fn layer_mut(&mut self, kind: LayerKind) -> &mut SettingsLayer {
        match kind {
            LayerKind::Temporary => &mut self.temporary,
            LayerKind::User => &mut self.user,
            LayerKind::Default => &mut self.default,
        }
    }

    /// Walk [`PRECEDENCE`] and return the winning value and its layer.
    pub fn resolve(&self, key: &str) -> Option<(LayerKind, &SettingValue)> {
        PRECEDENCE
            .iter()
            .find_map(|kind| self.layer(*kind).get(key).map(|value| (*kind, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_only_if_different() {
        let mut layer = SettingsLayer::new();

        assert!(layer.set("ui/theme", "dark".into(), true).unwrap());
        assert!(!layer.set("ui/theme", "dark".into(), true).unwrap());
        assert!(layer.set("ui/theme", "dark".into(), false).unwrap());
        assert!(layer.set("ui/theme", "light".into(), true).unwrap());
        assert_eq!(layer.get("ui/theme"), Some(&SettingValue::from("light")));
    }

    #[test]
    fn test_invalid_keys() {
        let mut layer = SettingsLayer::new();
        assert!(matches!(
            layer.set("", 1.into(), false),
            Err(Error::InvalidKey(_))
        ));
        assert!(layer.set("a//b", 1.into(), false).is_err());
        assert_eq!(layer.get(""), None);
        assert!(!layer.remove(""));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let mut layer = SettingsLayer::new();
        layer.set("General/Name", "a".into(), false).unwrap();
        layer.set("general/name", "b".into(), false).unwrap();

        assert_eq!(layer.keys(), vec!["General/Name", "general/name"]);
        assert_eq!(layer.get("General/Name"), Some(&SettingValue::from("a")));
    }

    #[test]
    fn test_remove_reports_existence() {
        let mut layer = SettingsLayer::new();
        layer.set("a/b", true.into(), false).unwrap();

        assert!(layer.remove("a/b"));
        assert!(!layer.remove("a/b"));
        assert!(layer.is_empty());
    }

    #[test]
    fn test_from_value_requires_map() {
        assert!(SettingsLayer::from_value(SettingValue::map()).is_ok());
        assert!(SettingsLayer::from_value(SettingValue::Absent).unwrap().is_empty());
        assert!(matches!(
            SettingsLayer::from_value(SettingValue::Int(3)),
            Err(Error::MalformedValue { .. })
        ));
    }

    #[test]
    fn test_stack_resolution_follows_precedence() {
        let mut stack = LayerStack::default();
        stack.default.set("k", "default".into(), false).unwrap();
        assert_eq!(stack.resolve("k").map(|(kind, _)| kind), Some(LayerKind::Default));

        stack.user.set("k", "user".into(), false).unwrap();
        assert_eq!(stack.resolve("k").map(|(kind, _)| kind), Some(LayerKind::User));

        stack.temporary.set("k", "temp".into(), false).unwrap();
        let (kind, value) = stack.resolve("k").unwrap();
        assert_eq!(kind, LayerKind::Temporary);
        assert_eq!(value, &SettingValue::from("temp"));

        assert!(stack.resolve("missing").is_none());
    }
}
