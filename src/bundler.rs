//! Module bundler interface and the built-in static bundler.
//!
//! The transform pipeline needs four things from a bundler: alias-aware
//! import resolution, the URL a browser loads a module from, a final pass
//! over production HTML, and a dev middleware that serves whatever the
//! URL map does not own.
//!
//! [`StaticBundler`] performs no compilation. In development it serves the
//! output directory, then the input directory, then the project root. In
//! production it copies every module referenced by a hydration script into
//! the output tree under the same URL.

use crate::{
    config::{Mode, SiteConfig},
    log,
    middleware::{DevRequest, DevResponse, Middleware, strip_path_prefix},
    renderer::RenderError,
    utils::{
        fs::{copy_file, to_slash_relative},
        minify::minify_html,
    },
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

pub trait Bundler: Send + Sync {
    /// Resolve a component reference written in `importer` to a module file.
    fn resolve_import(&self, specifier: &str, importer: &Path) -> Result<PathBuf>;

    /// URL the browser imports `module` from.
    fn module_url(&self, module: &Path) -> String;

    /// Final pass over a transformed page.
    fn transform_html(&self, html: String, output_path: &Path) -> Result<String>;

    /// Dev fallback layer, placed after the URL map.
    fn middleware(&self) -> Option<Arc<dyn Middleware>>;

    /// Write modules referenced during the build. Returns how many were written.
    fn emit_assets(&self) -> Result<usize> {
        Ok(0)
    }
}

#[derive(Debug)]
pub struct StaticBundler {
    mode: Mode,
    root: PathBuf,
    input: PathBuf,
    output: PathBuf,
    includes: PathBuf,
    /// Longest alias first, so `@c/ui` beats `@c`.
    aliases: Vec<(String, PathBuf)>,
    path_prefix: String,
    minify: bool,
    dry_run: bool,
    incremental: bool,
    referenced: Mutex<BTreeSet<PathBuf>>,
}

impl StaticBundler {
    pub fn new(config: &SiteConfig, mode: Mode) -> Self {
        let mut aliases: Vec<_> = config
            .aliases
            .iter()
            .map(|(alias, dir)| (alias.trim_end_matches('/').to_owned(), dir.clone()))
            .collect();
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self {
            mode,
            root: config.get_root().to_path_buf(),
            input: config.build.input.clone(),
            output: config.build.output.clone(),
            includes: config.build.includes_dir(),
            aliases,
            path_prefix: normalize_prefix(&config.build.path_prefix),
            minify: config.build.minify,
            dry_run: config.build.dry_run,
            incremental: config.build.incremental,
            referenced: Mutex::new(BTreeSet::new()),
        }
    }

    fn resolve_alias(&self, specifier: &str) -> Option<PathBuf> {
        self.aliases.iter().find_map(|(alias, dir)| {
            if specifier == alias {
                Some(dir.clone())
            } else {
                specifier
                    .strip_prefix(alias.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                    .map(|rest| dir.join(rest))
            }
        })
    }

    /// Module path relative to the served roots, `/`-separated.
    fn module_rel(&self, module: &Path) -> String {
        to_slash_relative(module, &self.input)
            .or_else(|| to_slash_relative(module, &self.root))
            .unwrap_or_else(|| {
                module
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
    }
}

impl Bundler for StaticBundler {
    fn resolve_import(&self, specifier: &str, importer: &Path) -> Result<PathBuf> {
        let candidate = if let Some(path) = self.resolve_alias(specifier) {
            path
        } else if specifier.starts_with("./") || specifier.starts_with("../") {
            importer.parent().unwrap_or(self.input.as_path()).join(specifier)
        } else if let Some(rest) = specifier.strip_prefix('/') {
            self.input.join(rest)
        } else {
            self.includes.join(specifier)
        };

        if candidate.is_file() {
            Ok(candidate)
        } else {
            Err(RenderError::ComponentNotFound(candidate).into())
        }
    }

    fn module_url(&self, module: &Path) -> String {
        if self.mode == Mode::Production {
            self.referenced.lock().insert(module.to_path_buf());
        }
        format!("{}{}", self.path_prefix, self.module_rel(module))
    }

    fn transform_html(&self, html: String, _output_path: &Path) -> Result<String> {
        if self.mode == Mode::Production && self.minify {
            return String::from_utf8(minify_html(html.as_bytes()))
                .context("Minified HTML is not UTF-8");
        }
        Ok(html)
    }

    fn middleware(&self) -> Option<Arc<dyn Middleware>> {
        match self.mode {
            Mode::Development => Some(Arc::new(DevFiles {
                roots: vec![self.output.clone(), self.input.clone(), self.root.clone()],
                path_prefix: self.path_prefix.clone(),
            })),
            Mode::Production => None,
        }
    }

    fn emit_assets(&self) -> Result<usize> {
        let modules = std::mem::take(&mut *self.referenced.lock());
        if self.dry_run {
            return Ok(0);
        }

        let mut written = 0;
        for module in modules {
            let dst = self.output.join(self.module_rel(&module));
            if self.incremental && crate::utils::fs::is_up_to_date(&module, &dst) {
                continue;
            }
            copy_file(&module, &dst)?;
            written += 1;
        }
        if written > 0 {
            log!("bundle"; "copied {written} modules");
        }
        Ok(written)
    }
}

/// `docs` → `/docs/`, `` → `/`
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{trimmed}/")
    }
}

/// Dev fallback: static files from the output, input and root directories.
struct DevFiles {
    roots: Vec<PathBuf>,
    path_prefix: String,
}

impl Middleware for DevFiles {
    fn handle(&self, request: &DevRequest) -> Result<Option<DevResponse>> {
        let path = request.path();
        let Some(path) = strip_path_prefix(&path, &self.path_prefix) else {
            return Ok(None);
        };
        let rel = Path::new(path.trim_matches('/'));

        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Ok(None);
        }

        for root in &self.roots {
            let local = root.join(rel);
            let file = if local.is_dir() {
                local.join("index.html")
            } else {
                local
            };
            if file.is_file() {
                let body =
                    fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
                return Ok(Some(DevResponse::file(body, &file)));
            }
        }
        Ok(None)
    }
}
