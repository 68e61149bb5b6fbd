//! Feature-flag wire payload and snapshot types.
//!
//! Flags travel as opaque name/value string pairs. A value gates a feature
//! when it is exactly the literal `"true"`, ASCII-case-insensitive; every
//! other value, including absence, means disabled. Unknown values are never
//! an error.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Returns true if a raw flag value counts as enabled.
///
/// Only the exact literal `"true"` (case-insensitive) is truthy; `"yes"`,
/// `"1"`, etc. are disabled.
pub fn value_is_enabled(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// One named flag assignment as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagAssignment {
    /// Flag name.
    pub name: String,
    /// Raw flag value.
    pub value: String,
}

impl FlagAssignment {
    /// Creates an assignment from name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The decoded body of one feature-flag response.
///
/// # Wire format (JSON)
/// ```json
/// { "flags": [ {"name": "...", "value": "..."}, ... ], "ttl_seconds": 300 }
/// ```
///
/// An absent `flags` array decodes as the empty list; a response with an
/// explicit empty list is valid and clears every previously known flag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagPayload {
    /// Complete flag assignment list.
    #[serde(default)]
    pub flags: Vec<FlagAssignment>,
    /// Server-dictated seconds until the next refresh, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

impl FlagPayload {
    /// Returns the refresh interval the server dictated, if the payload
    /// carried a positive TTL. Absent or non-positive TTLs leave the current
    /// interval unchanged and yield `None` here.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.ttl_seconds {
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
            _ => None,
        }
    }
}

/// The complete flag mapping held by one context at one instant.
///
/// A snapshot is either empty (no successful fetch yet) or the content of
/// exactly one well-formed server response. It is immutable once built;
/// refreshes install a whole new snapshot rather than mutating this one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlagSnapshot {
    entries: HashMap<String, String>,
}

impl FlagSnapshot {
    /// Creates an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the raw value of a flag, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Returns true if the named flag is present and truthy.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).map(value_is_enabled).unwrap_or(false)
    }

    /// Returns the number of flags in this snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if this snapshot holds no flags.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<FlagPayload> for FlagSnapshot {
    fn from(payload: FlagPayload) -> Self {
        // Later duplicates win, matching iteration order of the wire list.
        let entries = payload
            .flags
            .into_iter()
            .map(|f| (f.name, f.value))
            .collect();
        Self { entries }
    }
}

impl FromIterator<(String, String)> for FlagSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
