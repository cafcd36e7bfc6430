//! Request/response types and the dev middleware chain.
//!
//! Each layer either answers a request or returns `None` to pass it to the
//! next one. The chain ends in a plain 404.
//!
//! ```text
//! request ──► UrlMapMiddleware ──None──► bundler fallback ──None──► 404
//!                  │ Some                      │ Some
//!                  ▼                           ▼
//!              response                    response
//! ```

use crate::log;
use anyhow::Result;
use std::{path::Path, sync::Arc};

/// An incoming dev server request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevRequest {
    pub method: String,
    /// Raw request target, including any query string.
    pub url: String,
}

impl DevRequest {
    #[cfg(test)]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
        }
    }

    /// Decoded path without the query string.
    pub fn path(&self) -> String {
        let raw = self.url.split(['?', '#']).next().unwrap_or_default();
        urlencoding::decode(raw)
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_else(|_| raw.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl DevResponse {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into().into_bytes(),
        }
    }

    pub fn file(body: Vec<u8>, path: &Path) -> Self {
        Self {
            status: 200,
            content_type: guess_content_type(path),
            body,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain; charset=utf-8",
            body: b"404 Not Found".to_vec(),
        }
    }

    pub fn server_error(message: &str) -> Self {
        Self {
            status: 500,
            content_type: "text/plain; charset=utf-8",
            body: message.as_bytes().to_vec(),
        }
    }
}

/// One layer of the dev server.
pub trait Middleware: Send + Sync {
    /// Answer the request, or return `None` to call the next layer.
    fn handle(&self, request: &DevRequest) -> Result<Option<DevResponse>>;
}

/// Ordered middleware layers.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self { layers }
    }

    /// Run the layers in order. Errors become a 500 response.
    ///
    /// A `HEAD` request gets the status and content type of the matching
    /// `GET` with an empty body.
    pub fn handle(&self, request: &DevRequest) -> DevResponse {
        let mut response = self.dispatch(request);
        if request.method == "HEAD" {
            response.body.clear();
        }
        response
    }

    fn dispatch(&self, request: &DevRequest) -> DevResponse {
        for layer in &self.layers {
            match layer.handle(request) {
                Ok(Some(response)) => return response,
                Ok(None) => {}
                Err(err) => {
                    log!("error"; "{} {}: {err:#}", request.method, request.url);
                    return DevResponse::server_error(&format!("{err:#}"));
                }
            }
        }
        DevResponse::not_found()
    }
}

/// Strip the site's path prefix from a request path on a segment boundary.
///
/// `/blog` matches `/blog` and `/blog/post/` but not `/blogroll/`. A root
/// prefix (`/` or empty) matches everything. Returns `None` when the path
/// lies outside the prefix.
pub fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    path.strip_prefix(prefix)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
pub fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        // Component sources are served as modules
        Some("js" | "mjs" | "jsx" | "ts" | "tsx" | "svelte" | "vue") => {
            "text/javascript; charset=utf-8"
        }
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",

        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        _ => "application/octet-stream",
    }
}
