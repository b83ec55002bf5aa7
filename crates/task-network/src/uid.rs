//! Task identifiers.

use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque identity of a task.
///
/// Identifiers are non-negative integers, compared and ordered by value.
/// The graphs only ever refer to tasks through their `Uid`; names,
/// descriptions and other attributes live in a store kept by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "u64"))]
pub struct Uid(u64);

/// An ordered set of task identifiers.
pub type TaskSet = BTreeSet<Uid>;

impl Uid {
    /// Create an identifier from a non-negative number.
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// The number backing this identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Uid {
    fn from(number: u64) -> Self {
        Self(number)
    }
}

impl From<u32> for Uid {
    fn from(number: u32) -> Self {
        Self(u64::from(number))
    }
}

impl From<Uid> for u64 {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl TryFrom<i64> for Uid {
    type Error = Error;

    fn try_from(number: i64) -> Result<Self> {
        u64::try_from(number)
            .map(Self)
            .map_err(|_| Error::InvalidUidNumber { number })
    }
}

impl TryFrom<i32> for Uid {
    type Error = Error;

    fn try_from(number: i32) -> Result<Self> {
        Self::try_from(i64::from(number))
    }
}

impl FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let number: i64 = s.trim().parse().map_err(|_| Error::InvalidUidText {
            text: s.to_string(),
        })?;
        Self::try_from(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_number_is_rejected() {
        let err = Uid::try_from(-1_i64).unwrap_err();
        assert!(matches!(err, Error::InvalidUidNumber { number: -1 }));
    }

    #[test]
    fn test_zero_is_a_valid_identifier() {
        assert_eq!(Uid::try_from(0_i64).unwrap(), Uid::new(0));
    }

    #[test]
    fn test_ordering_follows_value() {
        let mut uids = vec![Uid::new(7), Uid::new(2), Uid::new(40)];
        uids.sort();
        assert_eq!(uids, vec![Uid::new(2), Uid::new(7), Uid::new(40)]);
    }

    #[test]
    fn test_parse_from_text() {
        assert_eq!(" 12 ".parse::<Uid>().unwrap(), Uid::new(12));
        assert!(matches!(
            "-3".parse::<Uid>(),
            Err(Error::InvalidUidNumber { number: -3 })
        ));
        assert!(matches!(
            "twelve".parse::<Uid>(),
            Err(Error::InvalidUidText { .. })
        ));
    }

    #[test]
    fn test_display_prints_number() {
        assert_eq!(Uid::new(42).to_string(), "42");
    }
}
