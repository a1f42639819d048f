use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema version written into every export document.
pub const EXPORT_VERSION: u32 = 1;

/// Self-describing snapshot of the portable configuration state.
///
/// Everything is keyed by wrapper name (preferences, env) or alias name, with
/// `BTreeMap`s so the serialized form is deterministic and the
/// export → clear → import round-trip is byte-stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub blocklist: Vec<String>,
}

impl ExportDocument {
    pub fn new() -> Self {
        Self {
            version: EXPORT_VERSION,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
            && self.env.is_empty()
            && self.aliases.is_empty()
            && self.blocklist.is_empty()
    }

    /// Normalizes the blocklist to sorted unique entries.
    pub fn normalize(&mut self) {
        self.blocklist.sort();
        self.blocklist.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut doc = ExportDocument::new();
        doc.preferences
            .insert("firefox".into(), "flatpak".into());
        doc.env.entry("chrome".into()).or_default().insert(
            "FOO".into(),
            "bar".into(),
        );
        doc.aliases.insert("browser".into(), "chrome".into());
        doc.blocklist.push("org.gimp.GIMP".into());

        let text = serde_json::to_string_pretty(&doc).expect("serialize");
        let back: ExportDocument = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, doc);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let doc: ExportDocument = serde_json::from_str(r#"{"version":1}"#).expect("parse");
        assert_eq!(doc.version, EXPORT_VERSION);
        assert!(doc.is_empty());
    }

    #[test]
    fn normalize_sorts_and_dedupes_blocklist() {
        let mut doc = ExportDocument::new();
        doc.blocklist = vec!["b.b".into(), "a.a".into(), "b.b".into()];
        doc.normalize();
        assert_eq!(doc.blocklist, vec!["a.a".to_string(), "b.b".to_string()]);
    }
}
