use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::app::ApplicationId;

/// Longest wrapper name we will derive. Anything beyond this is truncated
/// before the fallback check so pathological ids still produce stable names.
const MAX_NAME_LEN: usize = 64;

/// Short on-disk name for a wrapper, derived from an [`ApplicationId`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrapperName(String);

impl WrapperName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts an already-derived name, e.g. read back from a wrapper header
    /// or given on the command line. Only the character set is checked; the
    /// derivation rules live in [`sanitize`].
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_NAME_LEN {
            return None;
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }
}

impl fmt::Display for WrapperName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WrapperName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the wrapper name for an application id.
///
/// The last dot-separated segment is lowercased, characters outside
/// `[a-z0-9_-]` become `-`, and the result is truncated to 64 bytes. When
/// that leaves nothing usable (empty, or not starting with a letter) the name
/// falls back to `app-<hash>` where `<hash>` is the first 8 hex characters of
/// the SHA-256 digest of the full id. Total: every id gets a name.
pub fn sanitize(id: &ApplicationId) -> WrapperName {
    let mut name: String = id
        .last_segment()
        .chars()
        .map(|c| {
            let lowered = c.to_ascii_lowercase();
            if lowered.is_ascii_lowercase() || lowered.is_ascii_digit() || lowered == '_' || lowered == '-'
            {
                lowered
            } else {
                '-'
            }
        })
        .collect();
    name.truncate(MAX_NAME_LEN);

    let usable = name
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_lowercase());
    if usable {
        WrapperName(name)
    } else {
        WrapperName(format!("app-{}", short_digest(id.as_str())))
    }
}

fn short_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..4])
}

/// Where a wrapper launch goes: the native binary or the sandboxed build.
///
/// The design term for the second variant is "sandboxed"; its on-disk and
/// user-facing token is `flatpak`, so the string forms use that.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum LaunchTarget {
    #[strum(serialize = "system")]
    #[serde(rename = "system")]
    System,
    #[strum(serialize = "flatpak")]
    #[serde(rename = "flatpak")]
    Sandboxed,
}

impl LaunchTarget {
    pub fn as_token(self) -> &'static str {
        match self {
            LaunchTarget::System => "system",
            LaunchTarget::Sandboxed => "flatpak",
        }
    }

    pub fn parse_token(raw: &str) -> Option<Self> {
        Self::from_str(raw.trim()).ok()
    }
}
