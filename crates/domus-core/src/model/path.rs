// ── Store paths ──
//
// Slash-separated key paths into the live store. Always normalized to a
// leading slash, no trailing slash, and no empty segments; the root is "/".

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized live-store key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StorePath(String);

impl StorePath {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let joined = raw
            .as_ref()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(format!("/{joined}"))
    }

    pub fn root() -> Self {
        Self("/".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// `/a/b` + `c` → `/a/b/c`
    pub fn child(&self, segment: &str) -> Self {
        Self::new(format!("{}/{segment}", self.0))
    }

    /// Re-root this path under `root`: `/ack` + `/bedRoomLight` → `/ack/bedRoomLight`.
    pub fn under(&self, root: &StorePath) -> Self {
        Self::new(format!("{}{}", root.0, self.0))
    }

    /// Last segment, or `""` for the root.
    pub fn key(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// `true` when `self` equals `other` or lies above it.
    pub fn contains(&self, other: &StorePath) -> bool {
        if self.is_root() || self == other {
            return true;
        }
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Whether either path lies within the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StorePath {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for StorePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> Self {
        path.0
    }
}

impl AsRef<str> for StorePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
