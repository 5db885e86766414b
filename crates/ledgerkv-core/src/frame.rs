//! The frame: a string-keyed container of owned values.
//!
//! Frames nest through `Value::Frame`, so a frame and everything below it form
//! a tree with exactly one owner per node. `Clone` is a deep copy.

use std::{cmp::Ordering, collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    path::{self, Path},
    value::{Value, ValueType},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty path")]
    EmptyPath,
    #[error("no such path: {0}")]
    NoSuchPath(String),
    #[error("{path} holds a {found} value, not a frame")]
    NotAFrame { path: String, found: ValueType },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    slots: BTreeMap<String, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True iff the frame has no immediate keys.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Stores `value` under `key` in this frame, returning the value it
    /// displaced. `key` is taken literally, `/` included.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.slots.insert(key.into(), value)
    }

    /// Stores `value` at `path`. Every frame along the way must already exist.
    pub fn set_at(&mut self, path: impl Into<Path>, value: Value) -> Result<Option<Value>, FrameError> {
        self.set_in(path.into(), value, false)
    }

    /// Stores `value` at `path`, creating missing intermediate frames.
    pub fn set_path(&mut self, path: impl Into<Path>, value: Value) -> Result<Option<Value>, FrameError> {
        self.set_in(path.into(), value, true)
    }

    fn set_in(&mut self, path: Path, value: Value, create: bool) -> Result<Option<Value>, FrameError> {
        let (parents, key) = path.split_last().ok_or(FrameError::EmptyPath)?;
        let frame = path::resolve_for_write(self, parents, create)?;
        Ok(frame.set(key, value))
    }

    pub fn get_slot(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }

    pub(crate) fn get_slot_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.slots.get_mut(key)
    }

    /// Looks up the value at the end of `path`. Absent if any segment is
    /// missing or a non-terminal segment is not a frame.
    pub fn get_slot_at(&self, path: impl Into<Path>) -> Option<&Value> {
        let path = path.into();
        let (parents, key) = path.split_last()?;
        path::resolve(self, parents)?.get_slot(key)
    }

    /// The frame at `path`; the empty path names `self`.
    pub fn get_frame(&self, path: impl Into<Path>) -> Option<&Frame> {
        path::resolve(self, path.into().segments())
    }

    pub fn get_frame_mut(&mut self, path: impl Into<Path>) -> Option<&mut Frame> {
        path::resolve_mut(self, path.into().segments())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.slots.remove(key)
    }

    pub fn remove_at(&mut self, path: impl Into<Path>) -> Option<Value> {
        let path = path.into();
        let (parents, key) = path.split_last()?;
        path::resolve_mut(self, parents)?.remove(key)
    }

    /// The immediate keys. Allocates on every call; prefer `for_each_slot` or
    /// `iter` when walking the frame.
    pub fn get_keys(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// Calls `visitor` once per immediate slot, in key order.
    pub fn for_each_slot<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Value),
    {
        for (key, value) in &self.slots {
            visitor(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Recursively folds `other` into this frame: frames present on both sides
    /// merge, anything else in `other` replaces what is here.
    pub fn merge(&mut self, other: Frame) {
        for (key, incoming) in other.slots {
            match (self.slots.get_mut(&key), incoming) {
                (Some(Value::Frame(existing)), Value::Frame(incoming)) => existing.merge(incoming),
                (_, incoming) => {
                    self.slots.insert(key, incoming);
                }
            }
        }
    }

    pub(crate) fn fmt_nested(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        if self.slots.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{\n")?;
        for (key, value) in &self.slots {
            write!(f, "{:indent$}{} => ", "", key, indent = (depth + 1) * 4)?;
            value.fmt_nested(f, depth + 1)?;
            f.write_str("\n")?;
        }
        write!(f, "{:indent$}}}", "", indent = depth * 4)
    }
}

/// Total order over frames: (key, value) pairs compared in key order,
/// recursing into nested frames and lists, then by slot count.
pub fn compare(a: &Frame, b: &Frame) -> Ordering {
    a.slots.cmp(&b.slots)
}

impl Ord for Frame {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for Frame {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frame {}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_nested(f, 0)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Frame {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Frame {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}
