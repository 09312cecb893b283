//! Layered attribute store
//!
//! Holds the attribute tree for one convergence run at three precedence tiers
//! (`default`, `override`, `force_override`) and resolves a key path to a single
//! value by walking the tiers from highest to lowest precedence.
//!
//! # Resolution Rules
//!
//! - A tier contributes a value only if the path is explicitly set in that tier.
//! - The first tier that defines the path wins; insertion order inside a tier
//!   never matters.
//! - Lists and maps are whole values. A map stored at `a.b` in the override tier
//!   shadows the default tier's map at `a.b` completely when `a.b` itself is
//!   resolved; leaf paths below it are still looked up tier by tier.
//! - `AttrValue::Null` is an explicit nil: it *defines* the path (so it shadows
//!   lower tiers) but optional accessors read it as "no value".

pub mod defaults;

use crate::error::{ConvergeError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

// ============================================================================
// Key Paths
// ============================================================================

/// An ordered sequence of string segments addressing one attribute node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// Build a key path from explicit segments (segments may contain dots).
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path such as `openstack.identity.ssl.enabled`.
    ///
    /// Empty segments (leading, trailing or doubled dots) are dropped.
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new path with one more segment appended.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for KeyPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for KeyPath {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&KeyPath> for KeyPath {
    fn from(p: &KeyPath) -> Self {
        p.clone()
    }
}

// ============================================================================
// Attribute Values
// ============================================================================

/// A resolved attribute value: scalar, list of strings, or nested map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Explicit nil
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Human-readable description including the value, e.g. `string "yes"`.
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "nil".to_string(),
            Self::Bool(b) => format!("boolean {}", b),
            Self::Int(i) => format!("integer {}", i),
            Self::Str(s) => format!("string {:?}", s),
            Self::List(l) => format!("list of {} item(s)", l.len()),
            Self::Map(m) => format!("map of {} key(s)", m.len()),
        }
    }

    /// Scalar rendering: strings verbatim, integers in decimal, booleans lowercase.
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Convert a JSON value into an attribute value.
    ///
    /// Numbers must be integers; array elements must be strings or integers
    /// (integers are stringified).
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => {
                    return Err(ConvergeError::config(format!(
                        "attribute numbers must be integers, found {}",
                        n
                    )));
                }
            },
            Value::String(s) => Self::Str(s),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => list.push(s),
                        Value::Number(n) if n.is_i64() || n.is_u64() => list.push(n.to_string()),
                        other => {
                            return Err(ConvergeError::config(format!(
                                "attribute lists may only hold strings, found {}",
                                other
                            )));
                        }
                    }
                }
                Self::List(list)
            }
            Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k, Self::from_json(v)?);
                }
                Self::Map(out)
            }
        })
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for AttrValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(l: Vec<String>) -> Self {
        Self::List(l)
    }
}

impl From<Vec<&str>> for AttrValue {
    fn from(l: Vec<&str>) -> Self {
        Self::List(l.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[(&str, AttrValue); N]> for AttrValue {
    fn from(entries: [(&str, AttrValue); N]) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

// ============================================================================
// Precedence Tiers
// ============================================================================

/// Attribute precedence tier. Later variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    Default,
    Override,
    ForceOverride,
}

impl Tier {
    /// Tiers in resolution order (highest precedence first).
    pub const HIGHEST_FIRST: [Tier; 3] = [Tier::ForceOverride, Tier::Override, Tier::Default];
}

// ============================================================================
// Attribute Store
// ============================================================================

type Tree = BTreeMap<String, AttrValue>;

/// The layered attribute tree for one run.
///
/// Built fresh at the start of every run and passed by reference into value
/// computation, rendering, and graph declaration.
#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    default: Tree,
    overrides: Tree,
    force: Tree,
}

impl AttributeStore {
    /// Create an empty store (no defaults loaded).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the identity-server schema defaults loaded.
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        defaults::load_defaults(&mut store);
        store
    }

    fn tree(&self, tier: Tier) -> &Tree {
        match tier {
            Tier::Default => &self.default,
            Tier::Override => &self.overrides,
            Tier::ForceOverride => &self.force,
        }
    }

    fn tree_mut(&mut self, tier: Tier) -> &mut Tree {
        match tier {
            Tier::Default => &mut self.default,
            Tier::Override => &mut self.overrides,
            Tier::ForceOverride => &mut self.force,
        }
    }

    /// Set a value at `path` in `tier`, creating intermediate maps.
    ///
    /// A non-map value sitting on an intermediate segment is replaced by a map.
    pub fn set(&mut self, tier: Tier, path: impl Into<KeyPath>, value: impl Into<AttrValue>) {
        let path = path.into();
        let Some((last, parents)) = path.segments().split_last() else {
            return;
        };
        let mut map = self.tree_mut(tier);
        for segment in parents {
            map = child_map(map, segment);
        }
        map.insert(last.clone(), value.into());
    }

    pub fn set_default(&mut self, path: impl Into<KeyPath>, value: impl Into<AttrValue>) {
        self.set(Tier::Default, path, value);
    }

    pub fn set_override(&mut self, path: impl Into<KeyPath>, value: impl Into<AttrValue>) {
        self.set(Tier::Override, path, value);
    }

    pub fn set_force_override(&mut self, path: impl Into<KeyPath>, value: impl Into<AttrValue>) {
        self.set(Tier::ForceOverride, path, value);
    }

    /// Set `path` at the override tier only if no tier defines it yet.
    ///
    /// Returns true if the value was written. Idempotent and non-destructive.
    pub fn set_unless(&mut self, path: impl Into<KeyPath>, value: impl Into<AttrValue>) -> bool {
        let path = path.into();
        if self.is_defined(&path) {
            return false;
        }
        self.set(Tier::Override, path, value);
        true
    }

    /// Remove `path` from `tier`, returning the removed value.
    pub fn unset(&mut self, tier: Tier, path: impl Into<KeyPath>) -> Option<AttrValue> {
        let path = path.into();
        let (last, parents) = path.segments().split_last()?;
        let mut map = self.tree_mut(tier);
        for segment in parents {
            match map.get_mut(segment) {
                Some(AttrValue::Map(m)) => map = m,
                _ => return None,
            }
        }
        map.remove(last)
    }

    /// True if any tier sets `path` (an explicit nil counts as set).
    pub fn is_defined(&self, path: impl Into<KeyPath>) -> bool {
        self.lookup(path).is_some()
    }

    /// Find the winning tier and value for `path`.
    pub fn lookup(&self, path: impl Into<KeyPath>) -> Option<(Tier, &AttrValue)> {
        let path = path.into();
        Tier::HIGHEST_FIRST
            .iter()
            .find_map(|tier| lookup_in(self.tree(*tier), &path).map(|v| (*tier, v)))
    }

    /// Value of `path` as set in exactly `tier` (no fallthrough).
    pub fn get_at(&self, tier: Tier, path: impl Into<KeyPath>) -> Option<&AttrValue> {
        lookup_in(self.tree(tier), &path.into())
    }

    /// Resolve `path` through the tier stack.
    ///
    /// # Errors
    ///
    /// `AttributeResolution` if no tier defines the path.
    pub fn resolve(&self, path: impl Into<KeyPath>) -> Result<&AttrValue> {
        let path = path.into();
        self.lookup(&path)
            .map(|(_, v)| v)
            .ok_or_else(|| ConvergeError::missing(path.to_string()))
    }

    // ------------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------------

    /// Required scalar as a string. An explicit nil counts as missing.
    pub fn string(&self, path: &str) -> Result<String> {
        match self.resolve(path)? {
            AttrValue::Null => Err(ConvergeError::missing(path)),
            value => value
                .as_scalar()
                .ok_or_else(|| ConvergeError::invalid_value(path, value.describe(), "a scalar")),
        }
    }

    /// Optional scalar: `None` when unset or nil.
    pub fn opt_string(&self, path: &str) -> Result<Option<String>> {
        match self.lookup(path) {
            None | Some((_, AttrValue::Null)) => Ok(None),
            Some((_, value)) => value
                .as_scalar()
                .map(Some)
                .ok_or_else(|| ConvergeError::invalid_value(path, value.describe(), "a scalar")),
        }
    }

    /// Required integer. Numeric strings are accepted.
    pub fn int(&self, path: &str) -> Result<i64> {
        match self.resolve(path)? {
            AttrValue::Int(i) => Ok(*i),
            AttrValue::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| ConvergeError::invalid_value(path, s.clone(), "an integer")),
            AttrValue::Null => Err(ConvergeError::missing(path)),
            other => Err(ConvergeError::invalid_value(path, other.describe(), "an integer")),
        }
    }

    /// Optional integer: `None` when unset or nil.
    pub fn opt_int(&self, path: &str) -> Result<Option<i64>> {
        match self.lookup(path) {
            None | Some((_, AttrValue::Null)) => Ok(None),
            Some(_) => self.int(path).map(Some),
        }
    }

    /// Required boolean guard.
    ///
    /// # Errors
    ///
    /// `GuardEvaluation` when the resolved value is not a boolean (nil included).
    pub fn flag(&self, path: &str) -> Result<bool> {
        match self.resolve(path)? {
            AttrValue::Bool(b) => Ok(*b),
            other => Err(ConvergeError::guard(path, other.describe())),
        }
    }

    /// Optional boolean guard: unset and nil both read as `default`.
    pub fn flag_or(&self, path: &str, default: bool) -> Result<bool> {
        match self.lookup(path) {
            None | Some((_, AttrValue::Null)) => Ok(default),
            Some((_, AttrValue::Bool(b))) => Ok(*b),
            Some((_, other)) => Err(ConvergeError::guard(path, other.describe())),
        }
    }

    /// Required list of strings. An explicit nil reads as an empty list.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        match self.resolve(path)? {
            AttrValue::List(items) => Ok(items.clone()),
            AttrValue::Null => Ok(Vec::new()),
            other => Err(ConvergeError::invalid_value(path, other.describe(), "a list of strings")),
        }
    }

    /// Required enum-valued selector parsed through `FromStr`.
    pub fn choice<T: FromStr>(&self, path: &str, expected: &str) -> Result<T> {
        let raw = self.string(path)?;
        raw.parse()
            .map_err(|_| ConvergeError::invalid_value(path, raw.clone(), expected))
    }

    // ------------------------------------------------------------------------
    // JSON input
    // ------------------------------------------------------------------------

    /// Deep-merge a JSON object into `tier`, writing every leaf at its path.
    ///
    /// Nested objects are merged key by key; any other value replaces what the
    /// tier held at that path.
    pub fn merge_json(&mut self, tier: Tier, value: serde_json::Value) -> Result<()> {
        match value {
            serde_json::Value::Object(map) => {
                for (key, child) in map {
                    self.merge_json_at(tier, KeyPath::new([key]), child)?;
                }
                Ok(())
            }
            other => Err(ConvergeError::config(format!(
                "{} attributes must be a JSON object, found {}",
                tier, other
            ))),
        }
    }

    fn merge_json_at(&mut self, tier: Tier, path: KeyPath, value: serde_json::Value) -> Result<()> {
        match value {
            serde_json::Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    self.merge_json_at(tier, path.child(&key), child)?;
                }
                Ok(())
            }
            serde_json::Value::Object(_) => {
                if self.get_at(tier, &path).is_none() {
                    self.set(tier, path, AttrValue::empty_map());
                }
                Ok(())
            }
            other => {
                let value = AttrValue::from_json(other)?;
                self.set(tier, path, value);
                Ok(())
            }
        }
    }
}

fn lookup_in<'a>(root: &'a Tree, path: &KeyPath) -> Option<&'a AttrValue> {
    let (first, rest) = path.segments().split_first()?;
    let mut node = root.get(first)?;
    for segment in rest {
        match node {
            AttrValue::Map(m) => node = m.get(segment)?,
            _ => return None,
        }
    }
    Some(node)
}

fn child_map<'a>(map: &'a mut Tree, segment: &str) -> &'a mut Tree {
    let entry = map
        .entry(segment.to_string())
        .or_insert_with(AttrValue::empty_map);
    if !matches!(entry, AttrValue::Map(_)) {
        *entry = AttrValue::empty_map();
    }
    match entry {
        AttrValue::Map(m) => m,
        _ => unreachable!("entry was just replaced with a map"),
    }
}

// ============================================================================
// Tests
// ============================================================================
