//! Paths through nested frames and the resolver that walks them.
//!
//! A path is an ordered sequence of keys. Its textual form joins the keys with
//! `/`; there is no escaping, so a key containing `/` can only be addressed by
//! building the path from explicit segments. `.` and `..` are ordinary keys.

use std::fmt::Display;

use crate::{
    frame::{Frame, FrameError},
    value::Value,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `text` on `/`, dropping empty segments, so `"/a//b/"` and
    /// `"a/b"` name the same path.
    pub fn parse(text: &str) -> Self {
        Self {
            segments: text
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn join(&self, segment: impl Into<String>) -> Path {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    /// The frame-navigation prefix and the terminal key.
    pub fn split_last(&self) -> Option<(&[String], &str)> {
        self.segments
            .split_last()
            .map(|(last, parents)| (parents, last.as_str()))
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl From<&str> for Path {
    fn from(text: &str) -> Self {
        Path::parse(text)
    }
}

impl From<&String> for Path {
    fn from(text: &String) -> Self {
        Path::parse(text)
    }
}

impl From<String> for Path {
    fn from(text: String) -> Self {
        Path::parse(&text)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

impl From<Vec<&str>> for Path {
    fn from(segments: Vec<&str>) -> Self {
        segments.into_iter().collect()
    }
}

impl From<&[&str]> for Path {
    fn from(segments: &[&str]) -> Self {
        segments.iter().copied().collect()
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(segments: [&str; N]) -> Self {
        segments.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().map(Into::into).collect(),
        }
    }
}

fn prefix(parents: &[String], depth: usize) -> String {
    parents[..=depth].join("/")
}

/// Follows `parents` from `root` through frame-kind values. Absent if a
/// segment is missing or names a non-frame value.
pub(crate) fn resolve<'a>(root: &'a Frame, parents: &[String]) -> Option<&'a Frame> {
    let mut current = root;
    for segment in parents {
        current = current.get_slot(segment)?.as_frame()?;
    }
    Some(current)
}

pub(crate) fn resolve_mut<'a>(root: &'a mut Frame, parents: &[String]) -> Option<&'a mut Frame> {
    let mut current = root;
    for segment in parents {
        current = current.get_slot_mut(segment)?.as_frame_mut()?;
    }
    Some(current)
}

/// Follows `parents` for a write. With `create`, missing segments are filled
/// with empty frames. A segment holding a non-frame value is never coerced.
///
/// On error the tree is untouched: creation only starts once a segment is
/// missing, and every segment below a freshly created frame is missing too.
pub(crate) fn resolve_for_write<'a>(
    root: &'a mut Frame,
    parents: &[String],
    create: bool,
) -> Result<&'a mut Frame, FrameError> {
    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        if create && !current.contains_key(segment) {
            current.set(segment.clone(), Value::Frame(Frame::new()));
        }
        current = match current.get_slot_mut(segment) {
            Some(Value::Frame(frame)) => frame,
            Some(other) => {
                return Err(FrameError::NotAFrame {
                    path: prefix(parents, depth),
                    found: other.value_type(),
                })
            }
            None => return Err(FrameError::NoSuchPath(prefix(parents, depth))),
        };
    }
    Ok(current)
}
