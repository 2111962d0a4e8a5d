use core::fmt;
use std::sync::LazyLock;

use compact_str::{CompactString, format_compact};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest sequence number a three-digit roll suffix can hold.
pub const MAX_SEQUENCE: u16 = 999;

static ROLL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})([A-Z0-9]{3})(\d{3})$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollError {
    #[error("{0:?} is not a two-digit year")]
    Year(CompactString),
    #[error("{0:?} is not a three-character branch code")]
    Branch(CompactString),
    #[error("{0:?} is not a roll number")]
    Roll(CompactString),
    #[error("sequence {0} does not fit in three digits")]
    Sequence(u32),
}

/// Two-digit academic year, e.g. `21`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearPartition(CompactString);

impl YearPartition {
    pub fn new(s: &str) -> Result<Self, RollError> {
        if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.into()))
        } else {
            Err(RollError::Year(s.into()))
        }
    }

    #[must_use]
    pub fn from_number(n: u8) -> Option<Self> {
        (n < 100).then(|| Self(format_compact!("{n:02}")))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Portal URL segment for this year, e.g. `scheme21`.
    #[must_use]
    pub fn scheme(&self) -> CompactString {
        format_compact!("scheme{}", self.0)
    }

    /// Storage partition name, e.g. `2021`.
    #[must_use]
    pub fn collection(&self) -> CompactString {
        format_compact!("20{}", self.0)
    }
}

/// Three-character programme code, e.g. `BEC`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Branch(CompactString);

impl Branch {
    pub fn new(s: &str) -> Result<Self, RollError> {
        if s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            Ok(Self(s.into()))
        } else {
            Err(RollError::Branch(s.into()))
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub const DEFAULT_BRANCHES: [&str; 12] = [
    "BAR", "BCE", "BCH", "BCS", "BEC", "BEE", "BMA", "BME", "BMS", "BPH", "DCS", "DEC",
];

#[must_use]
pub fn default_branches() -> Vec<Branch> {
    DEFAULT_BRANCHES
        .iter()
        .map(|&s| Branch(CompactString::const_new(s)))
        .collect()
}

/// `<year:2><branch:3><sequence:3>`, e.g. `21BEC030`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RollNumber {
    year: YearPartition,
    branch: Branch,
    sequence: u16,
}

impl RollNumber {
    pub fn new(year: &YearPartition, branch: &Branch, sequence: u32) -> Result<Self, RollError> {
        match u16::try_from(sequence) {
            Ok(sequence) if sequence <= MAX_SEQUENCE => Ok(Self {
                year: year.clone(),
                branch: branch.clone(),
                sequence,
            }),
            _ => Err(RollError::Sequence(sequence)),
        }
    }

    pub fn parse(s: &str) -> Result<Self, RollError> {
        let cap = ROLL.captures(s).ok_or_else(|| RollError::Roll(s.into()))?;
        Ok(Self {
            year: YearPartition(cap[1].into()),
            branch: Branch(cap[2].into()),
            sequence: cap[3].parse().map_err(|_| RollError::Roll(s.into()))?,
        })
    }

    /// The roll number `n` positions later in the same year and branch,
    /// or `None` once the sequence runs past three digits.
    #[must_use]
    pub fn advance(&self, n: u32) -> Option<Self> {
        let sequence = u32::from(self.sequence).checked_add(n)?;
        Self::new(&self.year, &self.branch, sequence).ok()
    }

    #[inline]
    #[must_use]
    pub const fn year(&self) -> &YearPartition {
        &self.year
    }

    #[inline]
    #[must_use]
    pub const fn branch(&self) -> &Branch {
        &self.branch
    }

    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u16 {
        self.sequence
    }
}

impl fmt::Display for YearPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RollNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:03}", self.year, self.branch, self.sequence)
    }
}

macro_rules! string_serde {
    ($($ty:ty => $ctor:path),* $(,)?) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = CompactString::deserialize(deserializer)?;
                $ctor(&s).map_err(serde::de::Error::custom)
            }
        }
    )*};
}

string_serde! {
    YearPartition => YearPartition::new,
    Branch => Branch::new,
    RollNumber => RollNumber::parse,
}
