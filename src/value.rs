//! Setting values
//!
//! [`SettingValue`] is the one value model used for every layer and for every
//! file the store reads or writes. Maps are ordered by key, so two maps with
//! the same entries compare equal and serialize identically regardless of
//! insertion order.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Map key used to carry byte sequences through text formats.
///
/// Map keys that start with `@` are written with one extra `@` and unescaped
/// on read, so a setting named `@bytes` never collides with the tag.
pub const BYTES_TAG: &str = "@bytes";

const ESCAPE: char = '@';

fn escape_key(key: &str) -> Cow<'_, str> {
    if key.starts_with(ESCAPE) {
        Cow::Owned(format!("{ESCAPE}{key}"))
    } else {
        Cow::Borrowed(key)
    }
}

fn unescape_key(mut key: String) -> String {
    if key.starts_with("@@") {
        key.remove(0);
    }
    key
}

/// Separator between key path segments.
pub const KEY_SEPARATOR: char = '/';

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/]+(/[^/]+)*$").expect("key pattern is a valid regex"));

/// Split a slash-delimited key path into its segments.
///
/// # Errors
///
/// Returns [`Error::InvalidKey`] for an empty path or a path with an empty
/// segment (`"a//b"`, `"/a"`, `"a/"`).
pub fn split_key(key: &str) -> Result<Vec<&str>> {
    if KEY_PATTERN.is_match(key) {
        Ok(key.split(KEY_SEPARATOR).collect())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

/// A tagged, recursively structured setting value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SettingValue {
    /// No value. Returned for undefined keys.
    #[default]
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<SettingValue>),
    Map(BTreeMap<String, SettingValue>),
}

impl SettingValue {
    /// An empty map, the root of every layer.
    #[must_use]
    pub fn map() -> Self {
        SettingValue::Map(BTreeMap::new())
    }

    /// Wrap raw bytes.
    #[must_use]
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        SettingValue::Bytes(data.into())
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, SettingValue::Absent)
    }

    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, SettingValue::Map(_))
    }

    /// Whether every number in the tree can be written to a settings file.
    /// Infinite and NaN floats cannot.
    #[must_use]
    pub fn is_storable(&self) -> bool {
        match self {
            SettingValue::Float(f) => f.is_finite(),
            SettingValue::List(items) => items.iter().all(SettingValue::is_storable),
            SettingValue::Map(entries) => entries.values().all(SettingValue::is_storable),
            _ => true,
        }
    }

    /// Name of the variant, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Absent => "absent",
            SettingValue::Bool(_) => "boolean",
            SettingValue::Int(_) => "integer",
            SettingValue::Float(_) => "float",
            SettingValue::String(_) => "string",
            SettingValue::Bytes(_) => "bytes",
            SettingValue::List(_) => "list",
            SettingValue::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Floats, and integers widened to float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Float(f) => Some(*f),
            SettingValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SettingValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[SettingValue]> {
        match self {
            SettingValue::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, SettingValue>> {
        match self {
            SettingValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, SettingValue>> {
        match self {
            SettingValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Convert into `T`, or `None` when the shape does not match.
    #[must_use]
    pub fn extract<T: FromSettingValue>(&self) -> Option<T> {
        T::from_setting(self)
    }

    /// Look up a nested value by key path.
    ///
    /// Invalid paths and paths that run through a non-map value resolve to
    /// `None`.
    #[must_use]
    pub fn get_path(&self, key: &str) -> Option<&SettingValue> {
        let segments = split_key(key).ok()?;
        let mut current = self;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Store `value` at `key`, creating intermediate maps as needed.
    ///
    /// A non-map value found on the way (or at the root) is replaced by a map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `key` is not a valid path.
    pub fn set_path(&mut self, key: &str, value: SettingValue) -> Result<()> {
        let segments = split_key(key)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| Error::InvalidKey(key.to_string()))?;

        let mut current = self;
        for segment in parents {
            current = current
                .ensure_map()
                .entry((*segment).to_string())
                .or_insert_with(SettingValue::map);
        }
        current.ensure_map().insert((*last).to_string(), value);
        Ok(())
    }

    /// Remove the value at `key`, pruning parent maps left empty.
    pub fn remove_path(&mut self, key: &str) -> Option<SettingValue> {
        let segments = split_key(key).ok()?;
        Self::remove_segments(self, &segments)
    }

    fn remove_segments(node: &mut SettingValue, segments: &[&str]) -> Option<SettingValue> {
        let map = node.as_map_mut()?;
        match segments {
            [] => None,
            [last] => map.remove(*last),
            [head, rest @ ..] => {
                let child = map.get_mut(*head)?;
                let removed = Self::remove_segments(child, rest)?;
                if child.as_map().is_some_and(BTreeMap::is_empty) {
                    map.remove(*head);
                }
                Some(removed)
            }
        }
    }

    /// Deep-merge `other` into `self`.
    ///
    /// Maps merge key by key; any other pairing is replaced by `other`.
    /// An absent `other` leaves `self` untouched.
    pub fn merge(&mut self, other: SettingValue) {
        match (self, other) {
            (_, SettingValue::Absent) => {}
            (SettingValue::Map(target), SettingValue::Map(source)) => {
                for (key, value) in source {
                    match target.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            if !value.is_absent() {
                                target.insert(key, value);
                            }
                        }
                    }
                }
            }
            (target, other) => *target = other,
        }
    }

    /// Key paths of every leaf under this value, sorted.
    ///
    /// Empty maps count as leaves so that a key explicitly set to an empty
    /// map is still enumerated.
    #[must_use]
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let SettingValue::Map(map) = self {
            for (key, value) in map {
                Self::collect_leaves(key.clone(), value, &mut out);
            }
        }
        out
    }

    fn collect_leaves(prefix: String, value: &SettingValue, out: &mut Vec<String>) {
        match value {
            SettingValue::Map(map) if !map.is_empty() => {
                for (key, child) in map {
                    Self::collect_leaves(format!("{prefix}{KEY_SEPARATOR}{key}"), child, out);
                }
            }
            _ => out.push(prefix),
        }
    }

    fn ensure_map(&mut self) -> &mut BTreeMap<String, SettingValue> {
        if !self.is_map() {
            *self = SettingValue::map();
        }
        match self {
            SettingValue::Map(map) => map,
            _ => unreachable!("value was just replaced by a map"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        SettingValue::Int(i64::from(value))
    }
}

impl From<u32> for SettingValue {
    fn from(value: u32) -> Self {
        SettingValue::Int(i64::from(value))
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Float(value)
    }
}

impl From<f32> for SettingValue {
    fn from(value: f32) -> Self {
        SettingValue::Float(f64::from(value))
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::String(value)
    }
}

impl From<&Path> for SettingValue {
    fn from(value: &Path) -> Self {
        SettingValue::String(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for SettingValue {
    fn from(value: PathBuf) -> Self {
        SettingValue::from(value.as_path())
    }
}

impl<T: Into<SettingValue>> From<Vec<T>> for SettingValue {
    fn from(values: Vec<T>) -> Self {
        SettingValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, SettingValue>> for SettingValue {
    fn from(map: BTreeMap<String, SettingValue>) -> Self {
        SettingValue::Map(map)
    }
}

impl<T: Into<SettingValue>> From<Option<T>> for SettingValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SettingValue::Absent, Into::into)
    }
}

impl<K: Into<String>, V: Into<SettingValue>> FromIterator<(K, V)> for SettingValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SettingValue::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Typed extraction from a [`SettingValue`].
///
/// Returns `None` when the value does not have the expected shape; callers
/// treat that the same as an absent setting.
pub trait FromSettingValue: Sized {
    /// Human-readable shape, used in diagnostics
    const EXPECTED: &'static str;

    fn from_setting(value: &SettingValue) -> Option<Self>;
}

impl FromSettingValue for SettingValue {
    const EXPECTED: &'static str = "any value";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        (!value.is_absent()).then(|| value.clone())
    }
}

impl FromSettingValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSettingValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromSettingValue for i32 {
    const EXPECTED: &'static str = "32-bit integer";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_i64().and_then(|n| i32::try_from(n).ok())
    }
}

impl FromSettingValue for u32 {
    const EXPECTED: &'static str = "unsigned 32-bit integer";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_i64().and_then(|n| u32::try_from(n).ok())
    }
}

impl FromSettingValue for usize {
    const EXPECTED: &'static str = "non-negative integer";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_i64().and_then(|n| usize::try_from(n).ok())
    }
}

impl FromSettingValue for f64 {
    const EXPECTED: &'static str = "number";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromSettingValue for String {
    const EXPECTED: &'static str = "string";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromSettingValue for PathBuf {
    const EXPECTED: &'static str = "path string";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_str().map(PathBuf::from)
    }
}

impl<T: FromSettingValue> FromSettingValue for Vec<T> {
    const EXPECTED: &'static str = "list";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value.as_list()?.iter().map(T::from_setting).collect()
    }
}

impl<T: FromSettingValue> FromSettingValue for BTreeMap<String, T> {
    const EXPECTED: &'static str = "map";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        value
            .as_map()?
            .iter()
            .map(|(k, v)| T::from_setting(v).map(|v| (k.clone(), v)))
            .collect()
    }
}

// =============================================================================
// Serde
// =============================================================================

impl Serialize for SettingValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SettingValue::Absent => serializer.serialize_unit(),
            SettingValue::Bool(b) => serializer.serialize_bool(*b),
            SettingValue::Int(n) => serializer.serialize_i64(*n),
            SettingValue::Float(f) if !f.is_finite() => {
                Err(S::Error::custom(format!("cannot store non-finite number {f}")))
            }
            SettingValue::Float(f) => serializer.serialize_f64(*f),
            SettingValue::String(s) => serializer.serialize_str(s),
            SettingValue::Bytes(data) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BYTES_TAG, &BASE64.encode(data))?;
                map.end()
            }
            SettingValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            SettingValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(&escape_key(key), value)?;
                }
                map.end()
            }
        }
    }
}

struct SettingValueVisitor;

impl<'de> Visitor<'de> for SettingValueVisitor {
    type Value = SettingValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a setting value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<SettingValue, E> {
        i64::try_from(v).map(SettingValue::Int).map_err(|_| {
            E::invalid_value(de::Unexpected::Unsigned(v), &"an integer within i64 range")
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::Bytes(v))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::Absent)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<SettingValue, E> {
        Ok(SettingValue::Absent)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<SettingValue, D::Error> {
        SettingValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<SettingValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<SettingValue>()? {
            items.push(item);
        }
        Ok(SettingValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<SettingValue, A::Error> {
        let mut entries = Vec::new();
        while let Some(entry) = access.next_entry::<String, SettingValue>()? {
            entries.push(entry);
        }

        if let [(key, SettingValue::String(encoded))] = entries.as_slice() {
            if key.as_str() == BYTES_TAG {
                return BASE64
                    .decode(encoded)
                    .map(SettingValue::Bytes)
                    .map_err(|e| de::Error::custom(format!("invalid {BYTES_TAG} payload: {e}")));
            }
        }
        Ok(SettingValue::Map(
            entries
                .into_iter()
                .map(|(key, value)| (unescape_key(key), value))
                .collect(),
        ))
    }
}

impl<'de> Deserialize<'de> for SettingValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(SettingValueVisitor)
    }
}
