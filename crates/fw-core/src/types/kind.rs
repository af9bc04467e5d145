//! Renderer kinds.
//!
//! A render watch regenerates one artifact family per selected
//! [`DiagramKind`]. The selection is a [`DiagramKinds`] bitset so that any
//! combination can be configured, written in configuration files as a
//! `|`- or `,`-separated list (`"activity|class"`) or `"all"`.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::ConfigError;

/// A single renderer kind.
///
/// # Examples
///
/// ```
/// use fw_core::DiagramKind;
///
/// let kind: DiagramKind = "class".parse().unwrap();
/// assert_eq!(kind, DiagramKind::Class);
/// assert_eq!(kind.label(), "class");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    /// Activity diagrams (control flow of methods).
    Activity,
    /// Class diagrams (types and their relations).
    Class,
    /// Sequence diagrams (call order between types).
    Sequence,
}

impl DiagramKind {
    /// All kinds in rendering order.
    pub const ALL: [Self; 3] = [Self::Activity, Self::Class, Self::Sequence];

    /// Returns the lowercase label used in configuration and logs.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Class => "class",
            Self::Sequence => "sequence",
        }
    }

    /// Returns the single-bit set for this kind.
    #[inline]
    #[must_use]
    pub const fn as_flag(self) -> DiagramKinds {
        match self {
            Self::Activity => DiagramKinds::ACTIVITY,
            Self::Class => DiagramKinds::CLASS,
            Self::Sequence => DiagramKinds::SEQUENCE,
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DiagramKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                ConfigError::invalid_option(
                    "kinds",
                    format!(
                        "unknown diagram kind '{wanted}' (expected activity, class or sequence)"
                    ),
                )
            })
    }
}

bitflags! {
    /// The set of renderer kinds a render watch regenerates.
    ///
    /// # Examples
    ///
    /// ```
    /// use fw_core::{DiagramKind, DiagramKinds};
    ///
    /// let kinds: DiagramKinds = "activity|sequence".parse().unwrap();
    /// assert!(kinds.contains(DiagramKinds::ACTIVITY));
    /// assert!(!kinds.contains(DiagramKinds::CLASS));
    /// assert_eq!(kinds.kinds().as_slice(), &[DiagramKind::Activity, DiagramKind::Sequence]);
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DiagramKinds: u8 {
        /// Activity diagrams.
        const ACTIVITY = 0b001;
        /// Class diagrams.
        const CLASS    = 0b010;
        /// Sequence diagrams.
        const SEQUENCE = 0b100;
    }
}

impl DiagramKinds {
    /// Expands the set into individual kinds, in rendering order.
    #[must_use]
    pub fn kinds(self) -> SmallVec<[DiagramKind; 3]> {
        DiagramKind::ALL
            .into_iter()
            .filter(|kind| self.contains(kind.as_flag()))
            .collect()
    }
}

impl Default for DiagramKinds {
    fn default() -> Self {
        Self::all()
    }
}

impl From<DiagramKind> for DiagramKinds {
    fn from(kind: DiagramKind) -> Self {
        kind.as_flag()
    }
}

impl fmt::Display for DiagramKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, kind) in self.kinds().iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(kind.label())?;
        }
        Ok(())
    }
}

impl FromStr for DiagramKinds {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let mut kinds = Self::empty();
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            kinds |= part.parse::<DiagramKind>()?.as_flag();
        }
        if kinds.is_empty() {
            return Err(ConfigError::invalid_option(
                "kinds",
                "at least one diagram kind must be selected",
            ));
        }
        Ok(kinds)
    }
}

impl Serialize for DiagramKinds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DiagramKinds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
