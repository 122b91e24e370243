//! CRS identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized `AUTHORITY:CODE` identifier, e.g. `EPSG:4326`.
///
/// Parsing is case-insensitive on the authority and tolerant of surrounding
/// whitespace; the stored form is always upper-case. A bare numeric code is
/// read as an EPSG code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CrsId(String);

impl CrsId {
    pub fn new(id: &str) -> Self {
        let id = id.trim();
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            return Self(format!("EPSG:{}", id));
        }
        match id.split_once(':') {
            Some((authority, code)) => Self(format!(
                "{}:{}",
                authority.trim().to_ascii_uppercase(),
                code.trim().to_ascii_uppercase()
            )),
            None => Self(id.to_ascii_uppercase()),
        }
    }

    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{}", code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric EPSG code, when this is an EPSG identifier.
    pub fn epsg_code(&self) -> Option<u32> {
        self.0
            .strip_prefix("EPSG:")
            .and_then(|code| code.parse().ok())
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CrsId {
    fn from(s: String) -> Self {
        CrsId::new(&s)
    }
}

impl From<CrsId> for String {
    fn from(id: CrsId) -> Self {
        id.0
    }
}

impl FromStr for CrsId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CrsId::new(s))
    }
}
