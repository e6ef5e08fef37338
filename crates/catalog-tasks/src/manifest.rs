//! `bower.json` manifest parsing (§4.5, §4.6). The manifest is the
//! source of license/kind resolution fallback and of per-version
//! dependency/page data.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BowerManifest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// `{page-key: path}`, source-host libraries only (§4.6 step 4).
    #[serde(default)]
    pub pages: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl BowerManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn is_collection(&self) -> bool {
        self.keywords.iter().any(|k| k == "element-collection")
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let manifest = BowerManifest::parse(br#"{"license":"MIT"}"#).unwrap();
        assert_eq!(manifest.license.as_deref(), Some("MIT"));
        assert!(!manifest.is_collection());
    }

    #[test]
    fn detects_collection_keyword() {
        let manifest = BowerManifest::parse(br#"{"keywords":["foo","element-collection"]}"#).unwrap();
        assert!(manifest.is_collection());
    }

    #[test]
    fn counts_dependencies() {
        let manifest = BowerManifest::parse(br#"{"dependencies":{"a":"^1.0.0","b":"^2.0.0"}}"#).unwrap();
        assert_eq!(manifest.dependency_count(), 2);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(BowerManifest::parse(b"not json").is_err());
    }
}
