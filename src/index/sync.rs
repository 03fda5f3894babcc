use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::error::RepoResult;
use crate::types::props;
use crate::value::{Scalar, Value};
use super::{ContentReaderRegistry, IndexDocument, SearchIndex, PARENT_FIELD};

// Bookkeeping text that would otherwise make every object match common words
const NOT_FULLTEXT: &[&str] = &[
    props::CREATED_BY,
    props::LAST_MODIFIED_BY,
    props::CHANGE_TOKEN,
    props::VERSION_LABEL,
    props::VERSION_SERIES_CHECKED_OUT_BY,
    props::CONTENT_STREAM_MIME_TYPE,
    props::PATH,
];

/// Borrowed view of a stored object, enough to derive its index document.
pub struct IndexSource<'a> {
    pub properties: &'a BTreeMap<String, Value>,
    pub parents: &'a [String],
    pub is_root: bool,
    /// MIME type and bytes of the content stream
    pub content: Option<(&'a str, &'a [u8])>,
    pub fulltext_indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFailure {
    pub object_id: String,
    pub operation: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Pushes index documents for stored objects. Index errors never undo the store
/// mutation that triggered them; they are logged and kept in a bounded failure log.
pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
    readers: ContentReaderRegistry,
    settings: IndexConfig,
    failures: Mutex<VecDeque<IndexFailure>>,
}

impl IndexSynchronizer {
    pub fn new(index: Arc<dyn SearchIndex>, readers: ContentReaderRegistry, settings: IndexConfig) -> Self {
        Self { index, readers, settings, failures: Mutex::new(VecDeque::new()) }
    }

    pub fn index(&self) -> &dyn SearchIndex { self.index.as_ref() }

    pub fn readers(&self) -> &ContentReaderRegistry { &self.readers }

    pub fn enabled(&self) -> bool { self.settings.enabled }

    pub fn document(&self, src: &IndexSource<'_>) -> IndexDocument {
        let mut doc = IndexDocument::default();
        let mut body: Vec<String> = Vec::new();
        for (pid, value) in src.properties {
            if value.is_empty() { continue; }
            doc.fields.insert(pid.clone(), value.scalars());
            if src.fulltext_indexed && !NOT_FULLTEXT.contains(&pid.as_str()) {
                if let Value::String(vs) | Value::Html(vs) = value { body.extend(vs.iter().cloned()); }
            }
        }
        let parents: Vec<Scalar> = if src.is_root {
            vec![Scalar::Text(String::new())]
        } else {
            src.parents.iter().map(|p| Scalar::Text(p.clone())).collect()
        };
        if !parents.is_empty() { doc.fields.insert(PARENT_FIELD.to_string(), parents); }

        if src.fulltext_indexed && self.settings.extract_content {
            if let Some((mime, bytes)) = src.content {
                match self.readers.get_content_as_text(mime, bytes) {
                    Some(text) => body.push(text.chars().take(self.settings.max_extracted_chars).collect()),
                    None => debug!(target: "folio::index", "no content reader for {}", mime),
                }
            }
        }
        doc.fulltext = body.join("\n");
        doc
    }

    pub fn created(&self, id: &str, document: IndexDocument) {
        if !self.settings.enabled { return; }
        let res = self.index.index(id, document);
        self.record("created", id, res);
    }

    pub fn updated(&self, id: &str, document: IndexDocument) {
        if !self.settings.enabled { return; }
        let res = self.index.index(id, document);
        self.record("updated", id, res);
    }

    pub fn removed(&self, id: &str) {
        if !self.settings.enabled { return; }
        let res = self.index.retract(id);
        self.record("removed", id, res);
    }

    fn record(&self, operation: &str, id: &str, res: RepoResult<()>) {
        match res {
            Ok(()) => debug!(target: "folio::index", "{} {}", operation, id),
            Err(e) => {
                warn!(target: "folio::index", "index {} failed for {}: {}", operation, id, e);
                let mut failures = self.failures.lock();
                if self.settings.max_failures_kept == 0 { return; }
                while failures.len() >= self.settings.max_failures_kept { failures.pop_front(); }
                failures.push_back(IndexFailure {
                    object_id: id.to_string(),
                    operation: operation.to_string(),
                    message: e.to_string(),
                    at: Utc::now(),
                });
            }
        }
    }

    /// Oldest first.
    pub fn failures(&self) -> Vec<IndexFailure> { self.failures.lock().iter().cloned().collect() }

    pub fn clear_failures(&self) { self.failures.lock().clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoError;
    use crate::index::{IndexRow, NativeQuery};

    struct Broken;
    impl SearchIndex for Broken {
        fn index(&self, _id: &str, _d: IndexDocument) -> RepoResult<()> { Err(RepoError::storage("index offline")) }
        fn retract(&self, _id: &str) -> RepoResult<()> { Err(RepoError::storage("index offline")) }
        fn search(&self, _q: &NativeQuery) -> RepoResult<Vec<IndexRow>> { Ok(vec![]) }
    }

    fn props_of(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn document_flattens_properties_and_content() {
        let sync = IndexSynchronizer::new(Arc::new(crate::index::InMemoryIndex::default()), ContentReaderRegistry::with_defaults(), IndexConfig::default());
        let p = props_of(&[
            (props::NAME, Value::string("Apollo 13")),
            (props::CREATED_BY, Value::string("system")),
            ("nasa:mass", Value::decimal(3038.5)),
            ("nasa:crew", Value::String(vec![])),
        ]);
        let parents = vec!["f1".to_string()];
        let doc = sync.document(&IndexSource {
            properties: &p, parents: &parents, is_root: false,
            content: Some(("text/plain", &b"intended to land on the Moon"[..])), fulltext_indexed: true,
        });
        assert_eq!(doc.fields["nasa:mass"], vec![Scalar::Number(3038.5)]);
        assert_eq!(doc.fields[PARENT_FIELD], vec![Scalar::Text("f1".into())]);
        assert!(!doc.fields.contains_key("nasa:crew"));
        assert!(doc.fulltext.contains("Apollo 13"));
        assert!(doc.fulltext.contains("Moon"));
        assert!(!doc.fulltext.contains("system"));
    }

    #[test]
    fn root_parent_is_empty_string() {
        let sync = IndexSynchronizer::new(Arc::new(crate::index::InMemoryIndex::default()), ContentReaderRegistry::empty(), IndexConfig::default());
        let p = props_of(&[(props::NAME, Value::string(""))]);
        let doc = sync.document(&IndexSource { properties: &p, parents: &[], is_root: true, content: None, fulltext_indexed: false });
        assert_eq!(doc.fields[PARENT_FIELD], vec![Scalar::Text(String::new())]);
        assert!(doc.fulltext.is_empty());
    }

    #[test]
    fn failures_are_bounded_and_never_panic() {
        let settings = IndexConfig { max_failures_kept: 2, ..IndexConfig::default() };
        let sync = IndexSynchronizer::new(Arc::new(Broken), ContentReaderRegistry::empty(), settings);
        sync.created("a", IndexDocument::default());
        sync.updated("b", IndexDocument::default());
        sync.removed("c");
        let f = sync.failures();
        assert_eq!(f.len(), 2);
        assert_eq!(f[0].object_id, "b");
        assert_eq!(f[1].operation, "removed");
        sync.clear_failures();
        assert!(sync.failures().is_empty());
    }
}
