use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reverse-DNS identifier assigned by the app platform, e.g. `org.mozilla.firefox`.
///
/// The identifier is treated as an opaque key everywhere except here: shape
/// validation happens once at the parse boundary so the rest of the system can
/// trust the value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IdError {
    #[error("application id is empty")]
    Empty,
    #[error("application id {0:?} is not reverse-DNS shaped")]
    Malformed(String),
}

impl ApplicationId {
    /// Validates `raw` as a dot-separated reverse-DNS identifier.
    ///
    /// At least two components, each non-empty and drawn from
    /// `[A-Za-z0-9_-]`. Anything else is rejected so foreign rows from the
    /// platform CLI and foreign files in the bin directory never masquerade
    /// as applications.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        let components: Vec<&str> = raw.split('.').collect();
        if components.len() < 2 {
            return Err(IdError::Malformed(raw.to_string()));
        }
        for component in &components {
            if component.is_empty() {
                return Err(IdError::Malformed(raw.to_string()));
            }
            if !component
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(IdError::Malformed(raw.to_string()));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// True when `raw` would parse; used to filter platform CLI rows.
    pub fn looks_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last dot-separated component, the seed for wrapper naming.
    pub fn last_segment(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ApplicationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ApplicationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
