//! Dotted plugin version comparison.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// A dotted numeric version such as `v1.19.2`.
///
/// Any leading non-digit prefix is ignored, each component contributes its
/// leading digits only (`3-r1` reads as `3`), and missing trailing
/// components compare as zero, so `1.19` equals `1.19.0`.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
    raw: String,
}

impl Version {
    fn part(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let Some(start) = raw.find(|c: char| c.is_ascii_digit()) else {
            return Err(StoreError::Unsupported(format!(
                "unrecognised version string {raw:?}"
            )));
        };

        let parts = raw[start..]
            .split('.')
            .map(|component| {
                let digits: String = component
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                digits.parse().unwrap_or(0)
            })
            .collect();

        Ok(Self {
            parts,
            raw: raw.to_string(),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.part(i).cmp(&other.part(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
