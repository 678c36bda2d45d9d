//! Fetching auxiliary thread pages.
//!
//! Archive mirrors still serve Shift_JIS, so the body is decoded by hand
//! instead of trusting `reqwest`'s text helpers: the Content-Type charset
//! wins, then a `<meta>` declaration sniffed from the first few KB, then
//! UTF-8.

use std::future::Future;

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::dom::ThreadDocument;
use crate::error::ReplayError;

/// Bytes inspected when sniffing a `<meta>` charset.
pub const SNIFF_LIMIT: usize = 4096;

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset=["']?([^"'>\s]+)"#).expect("static meta pattern")
});

static META_HTTP_EQUIV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+http-equiv=["']?content-type["']?[^>]*content=["'][^"']*charset=([^"'>\s]+)"#,
    )
    .expect("static http-equiv pattern")
});

/// Source of thread documents by URL.
///
/// There is no timeout and no cancellation: a hung request stalls its
/// caller until the transport gives up.
pub trait DocumentFetcher {
    fn fetch_document(&self, url: &str) -> impl Future<Output = Result<ThreadDocument, ReplayError>>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpFetcher {
    pub fn new(user_agent: Option<&str>) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent.to_string());
        }
        // Falls back to a default client instead of panicking.
        let client = builder.build().unwrap_or_default();
        Self { client }
    }
}

impl DocumentFetcher for HttpFetcher {
    async fn fetch_document(&self, url: &str) -> Result<ThreadDocument, ReplayError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReplayError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ReplayError::HttpStatus {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = resp.bytes().await.map_err(|e| ReplayError::Transport {
            url: url.to_string(),
            detail: e.to_string(),
        })?;

        let html = decode_html(&bytes, content_type.as_deref());
        debug!(url, bytes = bytes.len(), "fetched thread page");
        Ok(ThreadDocument::parse(&html))
    }
}

/// Decode a page body using the detected charset, UTF-8 when unknown.
pub fn decode_html(body: &[u8], content_type: Option<&str>) -> String {
    let label = detect_charset(body, content_type);
    let encoding = label
        .as_deref()
        .and_then(|l| Encoding::for_label(l.as_bytes()))
        .unwrap_or(UTF_8);
    let (decoded, used, had_errors) = encoding.decode(body);
    if had_errors {
        debug!(encoding = used.name(), "page contained malformed sequences");
    }
    decoded.into_owned()
}

/// The charset label declared for a page, if any.
pub fn detect_charset(body: &[u8], content_type: Option<&str>) -> Option<String> {
    if let Some(label) = content_type.and_then(charset_from_content_type) {
        return Some(label);
    }
    let probe = String::from_utf8_lossy(&body[..body.len().min(SNIFF_LIMIT)]);
    charset_from_meta(&probe)
}

/// `charset=` parameter of a Content-Type header value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches('"').trim_matches('\'');
        (!label.is_empty()).then(|| label.to_string())
    })
}

/// `<meta charset>` or `http-equiv` Content-Type declaration.
pub fn charset_from_meta(snippet: &str) -> Option<String> {
    META_CHARSET
        .captures(snippet)
        .or_else(|| META_HTTP_EQUIV.captures(snippet))
        .map(|caps| caps[1].to_string())
}
