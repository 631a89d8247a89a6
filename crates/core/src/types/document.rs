use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Retrieved Documents
// =============================================================================

/// Kind of source a document was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Standard web page.
    #[default]
    WebPage,
    /// Tabular / structured data source.
    DataTalk,
}

impl<'de> Deserialize<'de> for DocumentType {
    /// Accepts the snake_case name, the legacy `DOCUMENT_TYPE_*` name, or the
    /// legacy integer code. Anything else is treated as a web page.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let parsed = match &value {
            Value::String(s) => match s.as_str() {
                "data_talk" | "DOCUMENT_TYPE_DATATALK" => DocumentType::DataTalk,
                _ => DocumentType::WebPage,
            },
            Value::Number(n) if n.as_u64() == Some(2) => DocumentType::DataTalk,
            _ => DocumentType::WebPage,
        };
        Ok(parsed)
    }
}

/// A retrieved source. Identity is the `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    #[serde(default)]
    pub excerpts: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "reason_for_retrieval")]
    pub retrieval_reason: Option<String>,
    #[serde(default, alias = "document_type")]
    pub doc_type: DocumentType,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl Document {
    /// Create a web-page document with only a url.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            excerpts: Vec::new(),
            title: None,
            timestamp: None,
            retrieval_reason: None,
            doc_type: DocumentType::WebPage,
            metadata: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpts.push(excerpt.into());
        self
    }

    /// Title for display, `Untitled` when absent.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

// =============================================================================
// Citation Ledger
// =============================================================================

/// Ordered, url-deduplicated collection of documents.
///
/// Indices handed out by [`CitationLedger::add`] are 1-based and stable: the
/// first document seen for a url keeps its slot.
#[derive(Debug, Clone, Default)]
pub struct CitationLedger {
    documents: Vec<Document>,
    index: HashMap<String, usize>,
}

impl CitationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, returning its 1-based citation index.
    pub fn add(&mut self, doc: &Document) -> usize {
        if let Some(&idx) = self.index.get(&doc.url) {
            return idx;
        }
        self.documents.push(doc.clone());
        let idx = self.documents.len();
        self.index.insert(doc.url.clone(), idx);
        idx
    }

    pub fn extend<'a>(&mut self, docs: impl IntoIterator<Item = &'a Document>) {
        for doc in docs {
            self.add(doc);
        }
    }

    pub fn index_of(&self, url: &str) -> Option<usize> {
        self.index.get(url).copied()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}
