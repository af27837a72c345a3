//! Request and response types of the REST catalog surface.

pub mod config;
pub mod credential;
pub mod metrics;
pub mod namespace;
pub mod requirement;
pub mod table;
pub mod update;

use serde::{Deserialize, Serialize};

/// Separator between namespace labels in URL path segments. It must be
/// percent-encoded as `%1F` on the wire; routers hand it to us decoded.
pub const UNIT_SEPARATOR: char = '\u{1f}';

/// An ordered, non-empty path of labels identifying a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceIdent(Vec<String>);

#[derive(Debug, thiserror::Error)]
#[error("namespace identifier must contain at least one non-empty label")]
pub struct EmptyNamespaceIdent;

impl NamespaceIdent {
    pub fn from_vec(levels: Vec<String>) -> Result<Self, EmptyNamespaceIdent> {
        if levels.is_empty() || levels.iter().any(String::is_empty) {
            return Err(EmptyNamespaceIdent);
        }
        Ok(Self(levels))
    }

    /// Parse a URL path segment. The segment is expected percent-decoded;
    /// a literal `%1F` is tolerated for clients that skip decoding. A
    /// segment without separators is a single-label path.
    pub fn from_url_segment(segment: &str) -> Result<Self, EmptyNamespaceIdent> {
        let decoded = segment.replace("%1F", &UNIT_SEPARATOR.to_string());
        Self::from_vec(decoded.split(UNIT_SEPARATOR).map(String::from).collect())
    }

    /// Encode for use as a URL path segment (before percent-encoding).
    #[must_use]
    pub fn to_url_segment(&self) -> String {
        self.0.join(&UNIT_SEPARATOR.to_string())
    }

    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// The root label, used as the fallback credential prefix.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.0[0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for NamespaceIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl AsRef<[String]> for NamespaceIdent {
    fn as_ref(&self) -> &[String] {
        &self.0
    }
}

/// A fully qualified table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdent {
    pub namespace: NamespaceIdent,
    pub name: String,
}

impl TableIdent {
    #[must_use]
    pub fn new(namespace: NamespaceIdent, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_label_segment() {
        let ns = NamespaceIdent::from_url_segment("accounting").unwrap();
        assert_eq!(ns.levels(), ["accounting".to_string()]);
    }

    #[test]
    fn test_unit_separator_segment() {
        let ns = NamespaceIdent::from_url_segment("acct\u{1f}tax").unwrap();
        assert_eq!(ns.levels(), ["acct".to_string(), "tax".to_string()]);
        assert_eq!(ns.to_url_segment(), "acct\u{1f}tax");
    }

    #[test]
    fn test_literal_percent_encoded_segment() {
        let ns = NamespaceIdent::from_url_segment("acct%1Ftax").unwrap();
        assert_eq!(ns.levels(), ["acct".to_string(), "tax".to_string()]);
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert!(NamespaceIdent::from_url_segment("").is_err());
        assert!(NamespaceIdent::from_vec(vec![]).is_err());
        assert!(NamespaceIdent::from_vec(vec!["a".into(), String::new()]).is_err());
    }

    #[test]
    fn test_serde_is_a_plain_array() {
        let ns = NamespaceIdent::from_vec(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(
            serde_json::to_value(&ns).unwrap(),
            serde_json::json!(["a", "b"])
        );
    }
}
