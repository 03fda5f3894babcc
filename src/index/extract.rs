use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").ok());
static WS_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\s+").ok());

/// Turns a content stream of one MIME type into indexable text.
pub trait ContentReader: Send + Sync {
    fn read(&self, bytes: &[u8]) -> Option<String>;
}

pub struct PlainTextReader;

impl ContentReader for PlainTextReader {
    fn read(&self, bytes: &[u8]) -> Option<String> {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// HTML and XML: markup and comments are dropped, common entities decoded.
pub struct MarkupReader;

impl ContentReader for MarkupReader {
    fn read(&self, bytes: &[u8]) -> Option<String> {
        let raw = String::from_utf8_lossy(bytes);
        let stripped = match TAG_RE.as_ref() { Some(re) => re.replace_all(&raw, " ").into_owned(), None => raw.into_owned() };
        let decoded = stripped
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&nbsp;", " ")
            .replace("&amp;", "&");
        match WS_RE.as_ref() {
            Some(re) => Some(re.replace_all(decoded.trim(), " ").into_owned()),
            None => Some(decoded.trim().to_string()),
        }
    }
}

/// Readers keyed by MIME type (lowercase, parameters stripped).
#[derive(Clone, Default)]
pub struct ContentReaderRegistry {
    readers: HashMap<String, Arc<dyn ContentReader>>,
}

impl ContentReaderRegistry {
    pub fn empty() -> Self { Self::default() }

    pub fn with_defaults() -> Self {
        let mut reg = Self::empty();
        let plain: Arc<dyn ContentReader> = Arc::new(PlainTextReader);
        let markup: Arc<dyn ContentReader> = Arc::new(MarkupReader);
        for m in ["text/plain", "text/csv", "text/markdown", "application/json"] { reg.readers.insert(m.to_string(), plain.clone()); }
        for m in ["text/html", "text/xml", "application/xml", "application/xhtml+xml"] { reg.readers.insert(m.to_string(), markup.clone()); }
        reg
    }

    pub fn register(&mut self, mime_type: &str, reader: Arc<dyn ContentReader>) {
        self.readers.insert(normalize_mime(mime_type), reader);
    }

    pub fn supports(&self, mime_type: &str) -> bool { self.readers.contains_key(&normalize_mime(mime_type)) }

    /// `None` when no reader handles `mime_type`.
    pub fn get_content_as_text(&self, mime_type: &str, bytes: &[u8]) -> Option<String> {
        self.readers.get(&normalize_mime(mime_type)).and_then(|r| r.read(bytes))
    }
}

fn normalize_mime(m: &str) -> String {
    m.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}
