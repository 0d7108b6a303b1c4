// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Unit identifiers.
//!
//! A [`Unit`] is one of the three independent configuration contexts a user
//! can switch between. The set is closed: units are never created or
//! destroyed, so the type is an enum rather than a bare integer.
//!
//! # Example
//!
//! ```
//! use blend_sync::Unit;
//!
//! assert_eq!(Unit::clamp(0), Unit::One);
//! assert_eq!(Unit::clamp(2), Unit::Two);
//! assert_eq!(Unit::clamp(42), Unit::Three);
//! assert_eq!(Unit::Two.others(), [Unit::One, Unit::Three]);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the three plant units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Unit {
    #[default]
    One,
    Two,
    Three,
}

impl Unit {
    /// All units in ascending order.
    pub const ALL: [Unit; 3] = [Unit::One, Unit::Two, Unit::Three];

    /// Clamp any integer into the unit domain.
    #[must_use]
    pub fn clamp(n: i64) -> Self {
        match n {
            i64::MIN..=1 => Unit::One,
            2 => Unit::Two,
            _ => Unit::Three,
        }
    }

    /// Strict conversion; `None` outside 1..=3.
    #[must_use]
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(Unit::One),
            2 => Some(Unit::Two),
            3 => Some(Unit::Three),
            _ => None,
        }
    }

    /// Wire number (1, 2 or 3).
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Unit::One => 1,
            Unit::Two => 2,
            Unit::Three => 3,
        }
    }

    /// The two units other than `self`, in ascending order.
    #[must_use]
    pub fn others(self) -> [Unit; 2] {
        match self {
            Unit::One => [Unit::Two, Unit::Three],
            Unit::Two => [Unit::One, Unit::Three],
            Unit::Three => [Unit::One, Unit::Two],
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Error returned when a string is not a unit number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid unit: {0:?}")]
pub struct InvalidUnit(pub String);

impl FromStr for Unit {
    type Err = InvalidUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .ok()
            .and_then(Unit::from_number)
            .ok_or_else(|| InvalidUnit(s.to_string()))
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.to_string()
    }
}

impl TryFrom<String> for Unit {
    type Error = InvalidUnit;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(Unit::clamp(i64::MIN), Unit::One);
        assert_eq!(Unit::clamp(-5), Unit::One);
        assert_eq!(Unit::clamp(1), Unit::One);
        assert_eq!(Unit::clamp(2), Unit::Two);
        assert_eq!(Unit::clamp(3), Unit::Three);
        assert_eq!(Unit::clamp(i64::MAX), Unit::Three);
    }

    #[test]
    fn test_from_number_is_strict() {
        assert_eq!(Unit::from_number(0), None);
        assert_eq!(Unit::from_number(4), None);
        assert_eq!(Unit::from_number(3), Some(Unit::Three));
    }

    #[test]
    fn test_parse() {
        assert_eq!(" 2 ".parse::<Unit>().unwrap(), Unit::Two);
        assert!("x".parse::<Unit>().is_err());
        assert!("7".parse::<Unit>().is_err());
    }

    #[test]
    fn test_others_excludes_self() {
        for unit in Unit::ALL {
            assert!(!unit.others().contains(&unit));
        }
    }

    #[test]
    fn test_serializes_as_string_map_key() {
        let mut map = BTreeMap::new();
        map.insert(Unit::Two, "abc");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"2":"abc"}"#);

        let back: BTreeMap<Unit, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&Unit::Two).map(String::as_str), Some("abc"));
    }
}
