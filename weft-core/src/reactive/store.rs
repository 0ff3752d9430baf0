//! Reactive Storage
//!
//! Reactive storage wraps plain dynamic data so that reads and writes are
//! observable by the dependency graph. In place of a runtime property trap,
//! the interception layer is an explicit wrapper type with typed get/set
//! accessors: [`Store`] for map-like data and [`ListStore`] for
//! sequence-like data.
//!
//! # Invariants
//!
//! - Reading a key returns an unwrapped primitive or a recursively wrapped
//!   nested object. Wrapping is idempotent: the raw allocation carries the
//!   [`TargetId`], so rewrapping the same raw object always produces a
//!   wrapper keyed into the same dep sets.
//! - A write triggers only after the raw value is committed, so observers
//!   always see post-write state.
//! - Writing an equal value does not trigger.
//!
//! Values convert to and from `serde_json::Value`, which is how embedders
//! snapshot and seed state.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::dep::{self, DepKey, TargetId, TriggerKind};

/// A dynamic value held by reactive storage.
///
/// `List` and `Map` variants share their interior via `Rc`; equality for
/// them is identity (two handles to the same raw object), while primitives
/// compare by value.
#[derive(Clone)]
pub enum Value {
    /// The absent value; also what reads of missing keys return.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Str(String),
    /// A nested sequence.
    List(Rc<RawList>),
    /// A nested mapping.
    Map(Rc<RawMap>),
}

impl Value {
    /// A fresh empty map value.
    pub fn map() -> Self {
        Value::Map(RawMap::new())
    }

    /// A fresh empty list value.
    pub fn list() -> Self {
        Value::List(RawList::new())
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The float payload; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// The boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Wrap a nested map payload, if any.
    pub fn as_map(&self) -> Option<Store> {
        match self {
            Value::Map(raw) => Some(Store::wrap(raw.clone())),
            _ => None,
        }
    }

    /// Wrap a nested list payload, if any.
    pub fn as_list(&self) -> Option<ListStore> {
        match self {
            Value::List(raw) => Some(ListStore::wrap(raw.clone())),
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value`, deep-copying nested objects.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Value::from(*n),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(raw) => {
                serde_json::Value::Array(raw.items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Map(raw) => serde_json::Value::Object(
                raw.entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(raw) => serializer.collect_seq(raw.items.borrow().iter()),
            Value::Map(raw) => serializer.collect_map(raw.entries.borrow().iter()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(n) => write!(f, "Float({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(raw) => write!(f, "List(#{})", raw.id.raw()),
            Value::Map(raw) => write!(f, "Map(#{})", raw.id.raw()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                let raw = RawList::new();
                raw.items
                    .borrow_mut()
                    .extend(items.into_iter().map(Value::from));
                Value::List(raw)
            }
            serde_json::Value::Object(entries) => {
                let raw = RawMap::new();
                raw.entries
                    .borrow_mut()
                    .extend(entries.into_iter().map(|(k, v)| (k, Value::from(v))));
                Value::Map(raw)
            }
        }
    }
}

/// The raw allocation backing a map-like store.
///
/// Carries the target identity so every wrapper over the same data keys
/// into the same dep sets.
pub struct RawMap {
    id: TargetId,
    entries: RefCell<IndexMap<String, Value>>,
}

impl RawMap {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            id: TargetId::next(),
            entries: RefCell::new(IndexMap::new()),
        })
    }
}

impl Drop for RawMap {
    fn drop(&mut self) {
        dep::drop_target(self.id);
    }
}

/// The raw allocation backing a list-like store.
pub struct RawList {
    id: TargetId,
    items: RefCell<Vec<Value>>,
}

impl RawList {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            id: TargetId::next(),
            items: RefCell::new(Vec::new()),
        })
    }
}

impl Drop for RawList {
    fn drop(&mut self) {
        dep::drop_target(self.id);
    }
}

/// Observable map-like storage.
///
/// Cloning yields another handle to the same underlying data.
#[derive(Clone)]
pub struct Store {
    raw: Rc<RawMap>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self { raw: RawMap::new() }
    }

    /// Wrap an existing raw map. Idempotent: the wrapper shares the raw
    /// object's identity.
    pub fn wrap(raw: Rc<RawMap>) -> Self {
        Self { raw }
    }

    /// Build a store from a JSON object. Non-object values yield an empty
    /// store.
    pub fn from_json(json: serde_json::Value) -> Self {
        match Value::from(json) {
            Value::Map(raw) => Self { raw },
            _ => Self::new(),
        }
    }

    /// The store's identity in the dependency graph.
    pub fn id(&self) -> TargetId {
        self.raw.id
    }

    /// Read one key, registering it as a dependency of the active effect.
    ///
    /// Missing keys read as [`Value::Null`].
    pub fn get(&self, key: &str) -> Value {
        dep::track(self.raw.id, DepKey::Field(key.to_owned()));
        self.raw
            .entries
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Read a nested map, lazily wrapped.
    pub fn get_map(&self, key: &str) -> Option<Store> {
        self.get(key).as_map()
    }

    /// Read a nested list, lazily wrapped.
    pub fn get_list(&self, key: &str) -> Option<ListStore> {
        self.get(key).as_list()
    }

    /// Write one key and notify subscribers.
    ///
    /// Writing a value equal to the current one does not trigger.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let kind = {
            let mut entries = self.raw.entries.borrow_mut();
            match entries.get(key) {
                Some(prev) if *prev == value => None,
                Some(_) => {
                    entries.insert(key.to_owned(), value);
                    Some(TriggerKind::Set)
                }
                None => {
                    entries.insert(key.to_owned(), value);
                    Some(TriggerKind::Add)
                }
            }
        };
        // The raw value is committed before observers run.
        if let Some(kind) = kind {
            dep::trigger(self.raw.id, Some(DepKey::Field(key.to_owned())), kind);
        }
    }

    /// Remove one key, returning its value.
    pub fn remove(&self, key: &str) -> Value {
        let removed = self.raw.entries.borrow_mut().shift_remove(key);
        match removed {
            Some(value) => {
                dep::trigger(
                    self.raw.id,
                    Some(DepKey::Field(key.to_owned())),
                    TriggerKind::Delete,
                );
                value
            }
            None => Value::Null,
        }
    }

    /// Remove every key.
    pub fn clear(&self) {
        let was_empty = {
            let mut entries = self.raw.entries.borrow_mut();
            let was_empty = entries.is_empty();
            entries.clear();
            was_empty
        };
        if !was_empty {
            dep::trigger(self.raw.id, None, TriggerKind::Clear);
        }
    }

    /// Whether a key is present. Tracks the key like a read.
    pub fn contains_key(&self, key: &str) -> bool {
        dep::track(self.raw.id, DepKey::Field(key.to_owned()));
        self.raw.entries.borrow().contains_key(key)
    }

    /// Number of keys. Tracks the iteration marker.
    pub fn len(&self) -> usize {
        dep::track(self.raw.id, DepKey::Iterate);
        self.raw.entries.borrow().len()
    }

    /// Whether the store has no keys. Tracks the iteration marker.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the keys in insertion order. Tracks the iteration
    /// marker.
    pub fn keys(&self) -> Vec<String> {
        dep::track(self.raw.id, DepKey::Iterate);
        self.raw.entries.borrow().keys().cloned().collect()
    }

    /// Deep-copy the store into a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Map(self.raw.clone()).to_json()
    }
}

// Untracked snapshot serialization, for embedders persisting state.
impl serde::Serialize for Store {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_map(self.raw.entries.borrow().iter())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.raw.id)
            .field("len", &self.raw.entries.borrow().len())
            .finish()
    }
}

/// Observable sequence-like storage.
#[derive(Clone)]
pub struct ListStore {
    raw: Rc<RawList>,
}

impl ListStore {
    /// Create an empty list store.
    pub fn new() -> Self {
        Self {
            raw: RawList::new(),
        }
    }

    /// Wrap an existing raw list.
    pub fn wrap(raw: Rc<RawList>) -> Self {
        Self { raw }
    }

    /// The list's identity in the dependency graph.
    pub fn id(&self) -> TargetId {
        self.raw.id
    }

    /// Read one index, registering it as a dependency.
    pub fn get(&self, index: usize) -> Value {
        dep::track(self.raw.id, DepKey::Index(index));
        self.raw
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Write one index.
    ///
    /// Writing at or past the end grows the list (padding with `Null`) and
    /// counts as an addition, which also notifies length subscribers.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let kind = {
            let mut items = self.raw.items.borrow_mut();
            if index < items.len() {
                if items[index] == value {
                    None
                } else {
                    items[index] = value;
                    Some(TriggerKind::Set)
                }
            } else {
                items.resize(index + 1, Value::Null);
                items[index] = value;
                Some(TriggerKind::Add)
            }
        };
        if let Some(kind) = kind {
            dep::trigger(self.raw.id, Some(DepKey::Index(index)), kind);
        }
    }

    /// Append a value.
    pub fn push(&self, value: impl Into<Value>) {
        let index = {
            let mut items = self.raw.items.borrow_mut();
            items.push(value.into());
            items.len() - 1
        };
        dep::trigger(self.raw.id, Some(DepKey::Index(index)), TriggerKind::Add);
    }

    /// Remove and return the last value.
    pub fn pop(&self) -> Value {
        let popped = {
            let mut items = self.raw.items.borrow_mut();
            items.pop().map(|v| (items.len(), v))
        };
        match popped {
            Some((index, value)) => {
                dep::trigger(self.raw.id, Some(DepKey::Index(index)), TriggerKind::Delete);
                value
            }
            None => Value::Null,
        }
    }

    /// Remove and return the value at an index. Out-of-range reads as
    /// `Null`.
    pub fn remove(&self, index: usize) -> Value {
        let removed = {
            let mut items = self.raw.items.borrow_mut();
            if index < items.len() {
                Some(items.remove(index))
            } else {
                None
            }
        };
        match removed {
            Some(value) => {
                dep::trigger(self.raw.id, Some(DepKey::Index(index)), TriggerKind::Delete);
                value
            }
            None => Value::Null,
        }
    }

    /// Remove every item.
    pub fn clear(&self) {
        let was_empty = {
            let mut items = self.raw.items.borrow_mut();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            dep::trigger(self.raw.id, None, TriggerKind::Clear);
        }
    }

    /// Replace a range with new items, as one bulk mutation.
    ///
    /// The raw edit runs with tracking suspended so per-item writes do not
    /// fire; subscribers of the length and iteration deps are notified once
    /// afterwards. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, new_items: Vec<Value>) -> Vec<Value> {
        let removed = {
            let _pause = dep::PauseScope::enter();
            let mut items = self.raw.items.borrow_mut();
            let start = start.min(items.len());
            let end = (start + delete_count).min(items.len());
            items.splice(start..end, new_items).collect()
        };
        dep::trigger(self.raw.id, Some(DepKey::Length), TriggerKind::Set);
        dep::trigger(self.raw.id, Some(DepKey::Iterate), TriggerKind::Set);
        removed
    }

    /// Number of items. Tracks the length dep.
    pub fn len(&self) -> usize {
        dep::track(self.raw.id, DepKey::Length);
        self.raw.items.borrow().len()
    }

    /// Whether the list is empty. Tracks the length dep.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the items. Tracks the iteration marker.
    pub fn to_vec(&self) -> Vec<Value> {
        dep::track(self.raw.id, DepKey::Iterate);
        self.raw.items.borrow().clone()
    }

    /// Deep-copy the list into a JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        Value::List(self.raw.clone()).to_json()
    }
}

impl serde::Serialize for ListStore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.raw.items.borrow().iter())
    }
}

impl Default for ListStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListStore")
            .field("id", &self.raw.id)
            .field("len", &self.raw.items.borrow().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::Cell;

    #[test]
    fn get_and_set() {
        let store = Store::new();
        assert!(store.get("missing").is_null());

        store.set("count", 42);
        assert_eq!(store.get("count").as_int(), Some(42));

        store.set("count", 43);
        assert_eq!(store.get("count").as_int(), Some(43));
    }

    #[test]
    fn effect_reruns_on_tracked_write() {
        let store = Store::new();
        store.set("count", 0);

        let observed = Rc::new(Cell::new(-1));
        let observed_clone = observed.clone();
        let store_clone = store.clone();
        let _effect = Effect::new(move || {
            observed_clone.set(store_clone.get("count").as_int().unwrap_or(-1));
            Ok(())
        });
        assert_eq!(observed.get(), 0);

        store.set("count", 7);
        // Observers see post-write state.
        assert_eq!(observed.get(), 7);
    }

    #[test]
    fn equal_write_does_not_trigger() {
        let store = Store::new();
        store.set("name", "a");

        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let store_clone = store.clone();
        let _effect = Effect::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            let _ = store_clone.get("name");
            Ok(())
        });
        assert_eq!(runs.get(), 1);

        store.set("name", "a");
        assert_eq!(runs.get(), 1);

        store.set("name", "b");
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn key_listing_sees_additions_and_removals() {
        let store = Store::new();
        store.set("a", 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let store_clone = store.clone();
        let _effect = Effect::new(move || {
            *seen_clone.borrow_mut() = store_clone.keys();
            Ok(())
        });
        assert_eq!(*seen.borrow(), vec!["a".to_owned()]);

        store.set("b", 2);
        assert_eq!(*seen.borrow(), vec!["a".to_owned(), "b".to_owned()]);

        store.remove("a");
        assert_eq!(*seen.borrow(), vec!["b".to_owned()]);

        // A plain value change does not touch the iteration dep.
        let before = seen.borrow().clone();
        store.set("b", 3);
        assert_eq!(*seen.borrow(), before);
    }

    #[test]
    fn nested_maps_wrap_lazily_and_share_identity() {
        let store = Store::from_json(serde_json::json!({
            "user": { "name": "ada" }
        }));

        let first = store.get_map("user").unwrap();
        let second = store.get_map("user").unwrap();
        // Rewrapping the same raw object yields the same identity.
        assert_eq!(first.id(), second.id());

        let observed = Rc::new(RefCell::new(String::new()));
        let observed_clone = observed.clone();
        let user = first.clone();
        let _effect = Effect::new(move || {
            *observed_clone.borrow_mut() =
                user.get("name").as_str().unwrap_or_default().to_owned();
            Ok(())
        });
        assert_eq!(*observed.borrow(), "ada");

        // Writing through the second wrapper reaches the same dep sets.
        second.set("name", "grace");
        assert_eq!(*observed.borrow(), "grace");
    }

    #[test]
    fn list_length_dep_fires_on_push_and_pop() {
        let list = ListStore::new();
        list.push(1);

        let lengths = Rc::new(Cell::new(0usize));
        let lengths_clone = lengths.clone();
        let list_clone = list.clone();
        let _effect = Effect::new(move || {
            lengths_clone.set(list_clone.len());
            Ok(())
        });
        assert_eq!(lengths.get(), 1);

        list.push(2);
        assert_eq!(lengths.get(), 2);

        list.pop();
        assert_eq!(lengths.get(), 1);

        // In-place writes do not move the length.
        list.set(0, 99);
        assert_eq!(lengths.get(), 1);
    }

    #[test]
    fn splice_fires_once() {
        let list = ListStore::new();
        for n in 0..4 {
            list.push(n);
        }

        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let list_clone = list.clone();
        let _effect = Effect::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            let _ = list_clone.len();
            Ok(())
        });
        assert_eq!(runs.get(), 1);

        let removed = list.splice(1, 2, vec![Value::from(10), Value::from(11), Value::from(12)]);
        assert_eq!(removed.len(), 2);
        assert_eq!(runs.get(), 2);
        assert_eq!(list.get(1).as_int(), Some(10));
        assert_eq!(list.get(4).as_int(), Some(3));
    }

    #[test]
    fn stores_serialize_as_plain_maps() {
        let store = Store::from_json(serde_json::json!({
            "name": "weft",
            "nested": { "ok": true }
        }));
        let out = serde_json::to_string(&store).unwrap();
        assert_eq!(out, r#"{"name":"weft","nested":{"ok":true}}"#);
    }

    #[test]
    fn json_round_trip() {
        let json = serde_json::json!({
            "title": "weft",
            "tags": ["ui", "reactive"],
            "meta": { "stars": 3 }
        });
        let store = Store::from_json(json.clone());
        assert_eq!(store.to_json(), json);
    }
}
