//! Records flowing through the pipeline: links, documents, and their ids.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Maximum length of a document id, bounded by filesystem name limits.
const DOC_ID_MAX_LEN: usize = 200;

/// Derive the stable document id for a URL.
///
/// The same URL always maps to the same id. Truncation can collide for very
/// long URLs; colliding documents silently overwrite each other.
pub fn doc_id(url: &str) -> String {
    let mut encoded = URL_SAFE.encode(url.as_bytes());
    encoded.truncate(DOC_ID_MAX_LEN);
    encoded
}

/// Classification of a link as discovered by the spider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Page,
    Pdf,
    #[default]
    Unknown,
}

/// A URL tracked through the spider and downloader stages.
///
/// `depth` and `attempt` travel inside the record itself; no stage keeps
/// retry state in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    /// Seed URL of the site this link was discovered under.
    pub website: String,
    /// Opaque site label carried from the seed.
    pub name: String,
    /// Opaque site code carried from the seed.
    pub code: String,
    pub depth: u32,
    pub attempt: u32,
    #[serde(rename = "type", default)]
    pub kind: LinkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

impl Link {
    /// Mint a depth-0 link from a seed record.
    pub fn seed(website: String, name: String, code: String) -> Self {
        Self {
            url: website.clone(),
            website,
            name,
            code,
            depth: 0,
            attempt: 0,
            kind: LinkKind::Page,
            doc_id: None,
        }
    }

    /// Mint a child link discovered on this page.
    pub fn child(&self, url: String) -> Self {
        Self {
            url,
            website: self.website.clone(),
            name: self.name.clone(),
            code: self.code.clone(),
            depth: self.depth + 1,
            attempt: 0,
            kind: LinkKind::Unknown,
            doc_id: None,
        }
    }

    /// Ensure the link carries its document id.
    pub fn ensure_doc_id(&mut self) -> &str {
        if self.doc_id.is_none() {
            self.doc_id = Some(doc_id(&self.url));
        }
        self.doc_id.as_deref().unwrap_or_default()
    }
}

/// One place a document was discovered at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub uid: String,
    pub url: String,
}

/// A downloaded document travelling through the extractor stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub locations: Vec<Location>,
    pub origin_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
}

impl Document {
    /// Seed a document record from a successfully downloaded link.
    pub fn from_downloaded(link: &Link) -> Self {
        Self {
            doc_id: link
                .doc_id
                .clone()
                .unwrap_or_else(|| doc_id(&link.url)),
            locations: vec![Location {
                name: link.name.clone(),
                uid: link.code.clone(),
                url: link.website.clone(),
            }],
            origin_url: link.url.clone(),
            text: None,
            publication_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_link() -> Link {
        Link::seed(
            "https://example.org".to_string(),
            "Example".to_string(),
            "ex01".to_string(),
        )
    }

    #[test]
    fn test_doc_id_deterministic() {
        let url = "https://example.org/reports/a.pdf";
        assert_eq!(doc_id(url), doc_id(url));
        assert_ne!(doc_id(url), doc_id("https://example.org/reports/b.pdf"));
    }

    #[test]
    fn test_doc_id_is_urlsafe() {
        let id = doc_id("https://example.org/a?q=1&r=2//x");
        assert!(!id.contains('/'));
        assert!(!id.contains('+'));
    }

    #[test]
    fn test_doc_id_truncated() {
        let long_url = format!("https://example.org/{}", "x".repeat(400));
        assert_eq!(doc_id(&long_url).len(), 200);
    }

    #[test]
    fn test_link_roundtrip() {
        let mut link = sample_link();
        link.kind = LinkKind::Pdf;
        link.ensure_doc_id();
        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("\"type\":\"pdf\""));
        let back: Link = serde_json::from_str(&json).unwrap();
        assert_eq!(back, link);
    }

    #[test]
    fn test_child_inherits_site_fields() {
        let parent = sample_link();
        let child = parent.child("https://example.org/sub".to_string());
        assert_eq!(child.website, parent.website);
        assert_eq!(child.name, parent.name);
        assert_eq!(child.code, parent.code);
        assert_eq!(child.depth, parent.depth + 1);
        assert_eq!(child.attempt, 0);
        assert_eq!(child.kind, LinkKind::Unknown);
    }

    #[test]
    fn test_finished_document_key_set() {
        let mut doc = Document::from_downloaded(&sample_link());
        doc.text = Some("hello".to_string());
        doc.publication_date = Some("01/02/2003".to_string());
        let value: serde_json::Value = serde_json::to_value(&doc).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["doc_id", "locations", "origin_url", "publication_date", "text"]
        );
    }
}
