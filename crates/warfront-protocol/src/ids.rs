//! Identifier newtypes.
//!
//! Numeric ids serialize as plain numbers and string ids as plain strings
//! (`#[serde(transparent)]`), so clients never see wrapper objects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A participant's durable identity, stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub u64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I-{:016x}", self.0)
    }
}

/// One running match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// A combat declaration within one game. Allocated by the game's writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationId(pub u64);

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D-{}", self.0)
    }
}

/// A faction key, as it appears in the stat table (`"red"`, `"iron-legion"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactionId(pub String);

impl FactionId {
    /// Creates a faction id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A participant's color. Two colors are the same if they match after
/// trimming and ASCII lowercasing, so `"Red "` collides with `"red"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub String);

impl Color {
    /// Creates a color, normalizing it.
    pub fn new(color: impl AsRef<str>) -> Self {
        Self(color.as_ref().trim().to_ascii_lowercase())
    }

    /// Returns the normalized form. Colors decoded from the wire are not
    /// normalized yet; anything comparing colors goes through this.
    pub fn normalized(&self) -> Self {
        Self::new(&self.0)
    }

    /// The raw color string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit type key within a faction's stat table (`"infantry"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitKind(pub String);

impl UnitKind {
    /// Creates a unit kind from anything string-like.
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
