//! Development URL map and its middleware.
//!
//! Every page written during a dev build is recorded under its normalized
//! URL. Requests are normalized the same way and answered from the map,
//! with the hydration transform applied at request time.

use super::HtmlTransformer;
use crate::{
    middleware::{DevRequest, DevResponse, Middleware, strip_path_prefix},
    utils::fs::to_slash_relative,
};
use anyhow::Result;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Canonical map key for a request URL or an output-relative path.
///
/// `/blog/post/`, `blog/post/index.html` and `/blog/post/index` all become
/// `blog/post`; the site root becomes the empty string.
pub fn normalize_url(path: &str) -> String {
    let raw = path.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(raw)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| raw.to_owned());
    let slashed = decoded.replace('\\', "/");

    let key = slashed.trim_matches('/');
    let key = key.strip_suffix(".html").unwrap_or(key);
    let key = if key == "index" {
        ""
    } else {
        key.strip_suffix("/index").unwrap_or(key)
    };
    key.trim_matches('/').to_owned()
}

/// A page produced by the latest dev build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub output_path: PathBuf,
    /// Untransformed page markup.
    pub content: String,
    generation: u64,
}

/// Normalized URL → latest output for that URL.
///
/// Entries are overwritten, not cleared, when a build starts, so requests
/// during a rebuild still see the previous page. Pages that a finished build
/// did not write again are pruned.
#[derive(Debug, Default)]
pub struct UrlTransformMap {
    entries: RwLock<FxHashMap<String, UrlEntry>>,
    generation: AtomicU64,
}

impl UrlTransformMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new build generation.
    pub fn begin_build(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop entries not written since [`begin_build`](Self::begin_build).
    pub fn prune(&self) -> usize {
        let current = self.generation.load(Ordering::SeqCst);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.generation == current);
        before - entries.len()
    }

    /// Record `output_path` under its URL. Last write for a URL wins.
    pub fn insert(&self, output_dir: &Path, output_path: &Path, content: String) -> String {
        let rel = to_slash_relative(output_path, output_dir)
            .unwrap_or_else(|| output_path.to_string_lossy().into_owned());
        let key = normalize_url(&rel);
        let entry = UrlEntry {
            output_path: output_path.to_path_buf(),
            content,
            generation: self.generation.load(Ordering::SeqCst),
        };
        self.entries.write().insert(key.clone(), entry);
        key
    }

    /// Entry for a request path, normalized the same way as on insert.
    pub fn get(&self, url: &str) -> Option<UrlEntry> {
        self.entries.read().get(&normalize_url(url)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Answers requests whose URL the last build produced.
pub struct UrlMapMiddleware {
    map: Arc<UrlTransformMap>,
    transformer: Arc<HtmlTransformer>,
    path_prefix: String,
}

impl UrlMapMiddleware {
    pub fn new(map: Arc<UrlTransformMap>, transformer: Arc<HtmlTransformer>, path_prefix: &str) -> Self {
        Self {
            map,
            transformer,
            path_prefix: format!("/{}", path_prefix.trim_matches('/')),
        }
    }
}

impl Middleware for UrlMapMiddleware {
    fn handle(&self, request: &DevRequest) -> Result<Option<DevResponse>> {
        if !matches!(request.method.as_str(), "GET" | "HEAD") {
            return Ok(None);
        }

        let path = request.path();
        let Some(path) = strip_path_prefix(&path, &self.path_prefix) else {
            return Ok(None);
        };
        let Some(entry) = self.map.get(path) else {
            return Ok(None);
        };

        let html = self.transformer.transform(&entry.content, &entry.output_path)?;
        Ok(Some(DevResponse::html(html)))
    }
}
