//! Source fetching and text extraction seams
//!
//! The pipeline consumes these contracts; real implementations (HTTP
//! client, readability extraction, PDF text layer) live outside this
//! repository. Implementations own their I/O timeouts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::FetchError;

/// Raw page material returned by a fetcher
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,
    /// Title advertised by the transport or markup, if any
    pub title: Option<String>,
    /// Raw body
    pub body_html: String,
    /// Declared content type
    pub content_type: Option<String>,
}

/// Cleaned text pulled out of raw source material
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub cleaned_text: String,
    pub title: Option<String>,
}

/// Fetches source bytes over the network
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch one URL, following redirects, bounded by the implementation's
    /// own timeout
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Turns raw source material into cleaned text
pub trait TextExtractor: Send + Sync {
    /// Extract readable text from HTML
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Malformed`] when the markup cannot be reduced
    /// to text.
    fn extract_html(&self, html: &str) -> Result<ExtractedText, FetchError>;

    /// Extract the text layer of a PDF
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Malformed`] when the document has no
    /// extractable text.
    fn extract_pdf(&self, bytes: &[u8]) -> Result<ExtractedText, FetchError>;
}

// ---------------------------------------------------------------------------
// Mock implementations for tests and development
// ---------------------------------------------------------------------------

/// Mock fetcher serving scripted pages from memory
#[derive(Clone, Default)]
pub struct MockSourceFetcher {
    pages: Arc<Mutex<HashMap<String, FetchedPage>>>,
    /// Fail this many fetches with a network error before succeeding
    fail_first: Arc<AtomicUsize>,
}

impl MockSourceFetcher {
    /// Create an empty mock fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`
    pub fn stub(&self, url: &str, body: &str) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(
                url.to_string(),
                FetchedPage {
                    final_url: url.to_string(),
                    title: None,
                    body_html: body.to_string(),
                    content_type: Some("text/html".to_string()),
                },
            );
        }
    }

    /// Fail the next `n` fetches with a network error, then recover
    #[must_use]
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl SourceFetcher for MockSourceFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(FetchError::Network(format!("connection reset: {url}")));
        }

        self.pages
            .lock()
            .ok()
            .and_then(|pages| pages.get(url).cloned())
            .ok_or_else(|| FetchError::Network(format!("no route to {url}")))
    }
}

/// Mock extractor treating input as near-plain text
///
/// Strips anything between angle brackets and collapses whitespace; good
/// enough to drive the pipeline in tests without a real HTML or PDF
/// parser.
#[derive(Clone, Copy, Default)]
pub struct MockTextExtractor;

impl MockTextExtractor {
    pub const fn new() -> Self {
        Self
    }

    fn strip_markup(input: &str) -> String {
        let mut text = String::with_capacity(input.len());
        let mut in_tag = false;
        for ch in input.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => text.push(ch),
                _ => {}
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl TextExtractor for MockTextExtractor {
    fn extract_html(&self, html: &str) -> Result<ExtractedText, FetchError> {
        let cleaned_text = Self::strip_markup(html);
        if cleaned_text.is_empty() {
            return Err(FetchError::Malformed("page yielded no text".into()));
        }
        Ok(ExtractedText {
            cleaned_text,
            title: None,
        })
    }

    fn extract_pdf(&self, bytes: &[u8]) -> Result<ExtractedText, FetchError> {
        let text = String::from_utf8_lossy(bytes);
        let cleaned_text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned_text.is_empty() {
            return Err(FetchError::Malformed("document has no text layer".into()));
        }
        Ok(ExtractedText {
            cleaned_text,
            title: None,
        })
    }
}
