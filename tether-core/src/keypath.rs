//! Keypaths
//!
//! A keypath addresses a location in an instance's data tree, e.g.
//! `items.2.name`. Keypaths are immutable values: every derivation
//! (`parent`, `join`, `replace_prefix`) returns a new keypath.
//!
//! Numeric segments are parsed as list indices. The empty keypath is the
//! root of the data tree and has no ancestors.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

/// A single keypath segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// An object key.
    Key(String),
    /// A list index.
    Index(usize),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        // "007" is a key, not index 7
        match raw.parse::<usize>() {
            Ok(index) if index.to_string() == raw => Segment::Index(index),
            _ => Segment::Key(raw.to_string()),
        }
    }

    /// The segment as an object key, whatever its kind.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }

    /// The segment as a list index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(index) => Some(*index),
            Segment::Key(_) => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(raw: &str) -> Self {
        Segment::parse(raw)
    }
}

impl From<String> for Segment {
    fn from(raw: String) -> Self {
        Segment::parse(&raw)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// An ordered sequence of segments identifying a location in a data tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Keypath {
    segments: SmallVec<[Segment; 4]>,
}

impl Keypath {
    /// The empty keypath, addressing the whole data tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a keypath from segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The first segment, used to look up mappings.
    pub fn top(&self) -> Option<&Segment> {
        self.segments.first()
    }

    /// Everything after the first segment.
    pub fn tail(&self) -> Keypath {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// The parent keypath, or `None` for the root.
    pub fn parent(&self) -> Option<Keypath> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Append a single segment.
    pub fn join(&self, segment: impl Into<Segment>) -> Keypath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Append every segment of `other`.
    pub fn join_path(&self, other: &Keypath) -> Keypath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Whether `self` equals `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &Keypath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Strict prefix relation: `foo` is an ancestor of `foo.bar` but not of
    /// itself.
    pub fn is_ancestor_of(&self, other: &Keypath) -> bool {
        other.segments.len() > self.segments.len() && other.starts_with(self)
    }

    /// Iterate over strict ancestors, nearest first, ending with the root.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: self.parent(),
        }
    }

    /// Swap `old` for `new` at the front of this keypath. Returns `None`
    /// when `old` is not a prefix.
    pub fn replace_prefix(&self, old: &Keypath, new: &Keypath) -> Option<Keypath> {
        if !self.starts_with(old) {
            return None;
        }
        let mut segments: SmallVec<[Segment; 4]> = new.segments.clone();
        segments.extend(self.segments[old.segments.len()..].iter().cloned());
        Some(Self { segments })
    }
}

/// Iterator returned by [`Keypath::ancestors`].
pub struct Ancestors {
    next: Option<Keypath>,
}

impl Iterator for Ancestors {
    type Item = Keypath;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

impl fmt::Display for Keypath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Keypath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self {
            segments: s.split('.').map(Segment::parse).collect(),
        })
    }
}

impl From<&str> for Keypath {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(keypath) => keypath,
            Err(never) => match never {},
        }
    }
}
