//! Site building orchestration.
//!
//! [`Site`] owns every piece of per-process state: the renderer registry,
//! the attribute store, the bundler, the dev URL map and the dev server
//! slot. One build runs at a time.
//!
//! # Architecture
//!
//! ```text
//! build()
//!     │
//!     ├── on_before_build() ──► store cleared, URL map generation bumped
//!     │
//!     ├── collect sources ──► pages / markdown / text templates / passthrough
//!     │
//!     ├── render (rayon) ──► write_output()
//!     │       ├── development: URL map + raw file
//!     │       └── production:  transform + file
//!     │
//!     ├── passthrough copies, bundler assets
//!     │
//!     └── on_after_build() ──► stale URLs pruned, dev server created if absent
//! ```

use crate::{
    binder::{
        RenderContext,
        page::PageBinder,
        shortcode::{ShortcodeSet, restore_fragments},
    },
    bundler::{Bundler, StaticBundler},
    config::{Mode, SiteConfig},
    extensions::{TemplateExtensions, reconcile},
    log,
    logger::ProgressBars,
    middleware::{Middleware, MiddlewareChain},
    renderer::RendererRegistry,
    serve::{CreateOnce, DevSession, start_dev_server},
    store::{ComponentAttrStore, IdMinter},
    template::{self, Document},
    transform::{HtmlTransformer, UrlMapMiddleware, UrlTransformMap},
    utils::{
        fs::{collect_all_files, copy_file, is_up_to_date, to_slash_relative, write_file},
        ignore::IgnoreMatcher,
    },
};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Instant,
};

/// Starts the dev server for a middleware chain.
pub type ServerStarter = Box<dyn Fn(MiddlewareChain) -> Result<DevSession> + Send + Sync>;

/// How a source file is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    /// Rendered by a renderer's page capability.
    Page,
    Markdown,
    /// Any other template format: front matter, shortcodes, optional layout.
    Text,
    /// Copied verbatim.
    Passthrough,
}

#[derive(Debug, Clone)]
struct Source {
    path: PathBuf,
    /// Input-relative, `/`-separated.
    rel: String,
    kind: SourceKind,
}

/// Counts from one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub pages: usize,
    pub failed: usize,
    pub copied: usize,
    pub modules: usize,
}

pub struct Site {
    config: SiteConfig,
    mode: Mode,
    registry: Arc<RendererRegistry>,
    store: Arc<ComponentAttrStore>,
    bundler: Arc<dyn Bundler>,
    transformer: Arc<HtmlTransformer>,
    url_map: Arc<UrlTransformMap>,
    extensions: TemplateExtensions,
    ignore: IgnoreMatcher,
    dev_server: CreateOnce<DevSession>,
    start_server: ServerStarter,
}

impl Site {
    /// Site with command renderers from the config and the static bundler.
    pub fn new(config: SiteConfig, mode: Mode) -> Self {
        let registry = RendererRegistry::from_config(&config);
        let bundler = Arc::new(StaticBundler::new(&config, mode));
        let serve = config.serve.clone();
        Self::with_parts(config, mode, registry, bundler)
            .with_server_starter(Box::new(move |chain| start_dev_server(&serve, chain)))
    }

    pub fn with_parts(
        config: SiteConfig,
        mode: Mode,
        registry: RendererRegistry,
        bundler: Arc<dyn Bundler>,
    ) -> Self {
        let registry = Arc::new(registry);
        let store = Arc::new(ComponentAttrStore::new());
        let extensions = reconcile(&registry, &config.build);
        let ignore = IgnoreMatcher::new(&extensions.ignores);
        let transformer = Arc::new(HtmlTransformer::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&bundler),
            config.build.output.clone(),
        ));

        Self {
            config,
            mode,
            registry,
            store,
            bundler,
            transformer,
            url_map: Arc::new(UrlTransformMap::new()),
            extensions,
            ignore,
            dev_server: CreateOnce::new(),
            start_server: Box::new(|_| Err(anyhow!("no dev server configured"))),
        }
    }

    pub fn with_server_starter(mut self, start_server: ServerStarter) -> Self {
        self.start_server = start_server;
        self
    }

    pub const fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Block until the dev server thread exits, if one is running.
    pub fn wait_for_server(&self) {
        if let Some(thread) = self.dev_server.with(DevSession::take_thread).flatten() {
            thread.join().ok();
        }
    }

    fn render_context(&self) -> RenderContext<'_> {
        RenderContext {
            registry: &self.registry,
            store: &self.store,
            bundler: self.bundler.as_ref(),
            aliases: &self.config.aliases,
        }
    }

    /// The dev chain: URL map first, then the bundler's fallback.
    pub fn middleware_chain(&self) -> MiddlewareChain {
        let mut layers: Vec<Arc<dyn Middleware>> = vec![Arc::new(UrlMapMiddleware::new(
            Arc::clone(&self.url_map),
            Arc::clone(&self.transformer),
            &self.config.build.path_prefix,
        ))];
        layers.extend(self.bundler.middleware());
        MiddlewareChain::new(layers)
    }

    // ========================================================================
    // Build hooks
    // ========================================================================

    pub fn on_before_build(&self) {
        self.store.clear();
        if self.mode == Mode::Development {
            self.url_map.begin_build();
        }
    }

    pub fn on_after_build(&self) -> Result<()> {
        if self.mode == Mode::Development {
            let pruned = self.url_map.prune();
            if pruned > 0 {
                log!("serve"; "dropped {pruned} stale pages, {} remain", self.url_map.len());
            }
            self.dev_server
                .get_or_try_init(|| (self.start_server)(self.middleware_chain()))?;
        }
        Ok(())
    }

    /// Per-output-file hook.
    ///
    /// Development records the raw page under its URL and transforms at
    /// request time; production transforms now. Either way the file is
    /// written unless this is a dry run.
    pub fn write_output(&self, output_path: &Path, html: String) -> Result<()> {
        let content = match self.mode {
            Mode::Development => {
                self.url_map
                    .insert(&self.config.build.output, output_path, html.clone());
                html
            }
            Mode::Production => self
                .transformer
                .transform(&html, output_path)
                .with_context(|| format!("Failed to transform {}", output_path.display()))?,
        };

        if self.config.build.dry_run {
            return Ok(());
        }
        write_file(output_path, content.as_bytes())
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Run one full build between the before/after hooks.
    ///
    /// Production stops at the first failing page. Development logs failed
    /// pages and finishes the build.
    pub fn build(&self) -> Result<BuildReport> {
        let start = Instant::now();
        self.on_before_build();
        if self.registry.is_empty() {
            log!("warn"; "no [[renderers]] configured, pages render without components");
        }

        let sources = self.collect_sources();
        let (templates, copies): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .partition(|s| s.kind != SourceKind::Passthrough);

        let progress = ProgressBars::new(&[("pages", templates.len()), ("copy", copies.len())]);
        let failed = self.render_all(&templates, progress.as_ref())?;
        let copied = self.copy_all(&copies, progress.as_ref())?;
        if let Some(progress) = &progress {
            progress.finish();
        }
        let modules = self.bundler.emit_assets()?;

        self.on_after_build()?;

        let report = BuildReport {
            pages: templates.len() - failed,
            failed,
            copied,
            modules,
        };
        let components = self.store.len();
        if failed > 0 {
            log!("build"; "{} pages ({components} components) built, {failed} failed in {:.2?}", report.pages, start.elapsed());
        } else {
            log!("build"; "{} pages ({components} components) built in {:.2?}", report.pages, start.elapsed());
        }
        Ok(report)
    }

    fn collect_sources(&self) -> Vec<Source> {
        let build = &self.config.build;
        let input = &build.input;
        let includes = build.includes_dir();
        let output = &build.output;

        let skip_dir = |dir: &Path| {
            dir == output.as_path()
                || dir == includes.as_path()
                || to_slash_relative(dir, input).is_some_and(|rel| self.ignore.matches(&rel))
        };
        let config_path = &self.config.config_path;
        let binder = PageBinder::bind(&self.render_context());

        collect_all_files(input, skip_dir)
            .into_iter()
            .filter(|path| path != config_path)
            .filter_map(|path| {
                let rel = to_slash_relative(&path, input)?;
                if self.ignore.matches(&rel) {
                    return None;
                }
                let kind = self.classify(&path, &rel, &binder)?;
                Some(Source { path, rel, kind })
            })
            .collect()
    }

    fn classify(&self, path: &Path, rel: &str, binder: &PageBinder) -> Option<SourceKind> {
        let build = &self.config.build;
        let in_passthrough = build
            .passthrough
            .iter()
            .any(|dir| path.starts_with(build.input.join(dir)));
        if in_passthrough {
            return Some(SourceKind::Passthrough);
        }

        let ext = Path::new(rel)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if self.extensions.is_format(&ext) {
            if binder.handles(&ext) {
                return Some(SourceKind::Page);
            }
            return Some(if ext == "md" {
                SourceKind::Markdown
            } else {
                SourceKind::Text
            });
        }

        build.passthrough_all.then_some(SourceKind::Passthrough)
    }

    /// Render every template. Returns the number of failed pages (development).
    fn render_all(&self, sources: &[Source], progress: Option<&ProgressBars>) -> Result<usize> {
        let ctx = self.render_context();
        let shortcodes = ShortcodeSet::bind(&ctx);
        let pages = PageBinder::bind(&ctx);

        let has_error = AtomicBool::new(false);
        let first_error = Mutex::new(None);
        let failed = AtomicUsize::new(0);

        let result = sources.par_iter().try_for_each(|source| {
            if has_error.load(Ordering::Relaxed) {
                return Err(anyhow!("Aborted"));
            }

            let result = self
                .render_source(&ctx, &shortcodes, &pages, source)
                .and_then(|(output_path, html)| self.write_output(&output_path, html));
            if let Some(progress) = progress {
                progress.inc_by_name("pages");
            }

            match result {
                Ok(()) => Ok(()),
                Err(e) if self.mode == Mode::Development => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    log!("error"; "{}: {:#}", source.rel, e);
                    Ok(())
                }
                Err(e) => {
                    if !has_error.swap(true, Ordering::Relaxed) {
                        log!("error"; "{}: {:#}", source.rel, e);
                        *first_error.lock() = Some(e.context(format!("Failed to build {}", source.rel)));
                    }
                    Err(anyhow!("Build failed"))
                }
            }
        });

        if let Err(e) = result {
            return Err(first_error.into_inner().unwrap_or(e));
        }
        Ok(failed.into_inner())
    }

    /// Produce the output path and page markup for one template.
    fn render_source(
        &self,
        ctx: &RenderContext<'_>,
        shortcodes: &ShortcodeSet,
        pages: &PageBinder,
        source: &Source,
    ) -> Result<(PathBuf, String)> {
        let minter = IdMinter::new(&source.rel);
        let stem = Path::new(&source.rel)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if source.kind == SourceKind::Page {
            let out_rel = template::output_rel(&source.rel, None);
            let url = template::url_for(&out_rel);
            let data = json!({ "url": url, "inputPath": source.rel, "outputPath": out_rel });
            let html = pages.render(ctx, &source.path, &url, &data, &minter)?;
            let html = if template::is_document(&html) {
                html
            } else {
                template::html_shell(&stem, &html)
            };
            return Ok((self.config.build.output.join(out_rel), html));
        }

        let text = fs::read_to_string(&source.path)
            .with_context(|| format!("Failed to read {}", source.path.display()))?;
        let doc = template::parse_document(&text)?;
        let out_rel = template::output_rel(&source.rel, doc.permalink());
        let title = doc.title().unwrap_or(&stem).to_owned();

        let content = if source.kind == SourceKind::Markdown {
            let (body, fragments) = shortcodes.expand_deferred(ctx, doc.body, &source.path, &minter)?;
            restore_fragments(&template::render_markdown(&body)?, &fragments)
        } else {
            shortcodes.expand(ctx, doc.body, &source.path, &minter)?
        };

        let html = self.wrap(&doc, source.kind, &content, &title)?;
        Ok((self.config.build.output.join(out_rel), html))
    }

    /// Apply the page's layout, or the minimal shell for markdown.
    fn wrap(&self, doc: &Document<'_>, kind: SourceKind, content: &str, title: &str) -> Result<String> {
        match doc.layout() {
            Some(layout) => {
                template::apply_layout(&self.config.build.includes_dir(), layout, content, title)
            }
            None if kind == SourceKind::Markdown => Ok(template::html_shell(title, content)),
            None => Ok(content.to_owned()),
        }
    }

    fn copy_all(&self, sources: &[Source], progress: Option<&ProgressBars>) -> Result<usize> {
        let build = &self.config.build;
        let copied = AtomicUsize::new(0);

        sources.par_iter().try_for_each(|source| {
            let dst = build.output.join(&source.rel);
            let skip = build.dry_run || (build.incremental && is_up_to_date(&source.path, &dst));
            if !skip {
                copy_file(&source.path, &dst)?;
                copied.fetch_add(1, Ordering::Relaxed);
            }
            if let Some(progress) = progress {
                progress.inc_by_name("copy");
            }
            Ok::<_, anyhow::Error>(())
        })?;

        Ok(copied.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        renderer::{RenderedPage, RendererDescriptor, component_fn, page_fn},
        store::Hydrate,
    };

    fn config(root: &Path) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.build.input = root.to_path_buf();
        config.build.output = root.join("_site");
        config.build.minify = false;
        config.set_root(root);
        config
    }

    fn registry() -> RendererRegistry {
        RendererRegistry::new(vec![
            RendererDescriptor::new("preact", ["jsx"])
                .with_page(page_fn(|input| {
                    Ok(RenderedPage {
                        html: format!("<main>page at {}</main>", input.url),
                        hydrate: Hydrate::Eager,
                        props: json!({}),
                    })
                }))
                .with_client("/preact-client.mjs"),
            RendererDescriptor::new("svelte", ["svelte"])
                .with_component(component_fn(|input| {
                    Ok(format!("<button>{}</button>", input.props["count"]))
                }))
                .with_client("/svelte-client.mjs"),
        ])
    }

    fn site(root: &Path, mode: Mode) -> Site {
        let config = config(root);
        let bundler = Arc::new(StaticBundler::new(&config, mode));
        Site::with_parts(config, mode, registry(), bundler)
            .with_server_starter(Box::new(|_| Ok(DevSession::detached())))
    }

    fn read(path: PathBuf) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_component_page_builds_index() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("index.jsx"), b"export default () => null").unwrap();
        write_file(&root.join("_includes/Widget.jsx"), b"").unwrap();

        let site = site(root, Mode::Production);
        let report = site.build().unwrap();

        assert_eq!(report.pages, 1);
        assert!(site.extensions.is_format("jsx"));
        assert!(site.extensions.ignores.contains(&"_includes/**/*.jsx".to_string()));

        let html = read(root.join("_site/index.html"));
        assert!(html.contains("page at /"));
        assert!(html.contains("data-isle-for="));
        assert!(html.contains("import(\"/preact-client.mjs\")"));
        assert!(!root.join("_site/_includes").exists());
        // the page module is copied next to the output
        assert!(root.join("_site/index.jsx").is_file());
    }

    #[test]
    fn test_markdown_shortcode_records_store_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(
            &root.join("about.md"),
            b"---\ntitle: About\n---\n# About\n\n{% svelte \"Counter.svelte\" count=1 hydrate=\"eager\" %}\n",
        )
        .unwrap();
        write_file(&root.join("_includes/Counter.svelte"), b"<script></script>").unwrap();

        let site = site(root, Mode::Production);
        site.build().unwrap();

        assert_eq!(site.store.len(), 1);
        let id = IdMinter::new("about.md").next_id();
        let attrs = site.store.get(&id).unwrap();
        assert_eq!(attrs.props["count"], 1);

        let html = read(root.join("_site/about/index.html"));
        assert!(html.contains("<title>About</title>"));
        assert!(html.contains(&format!("data-isle-id=\"{id}\"")));
        assert!(html.contains("<button>1</button>"));
        assert!(html.contains(&format!("data-isle-for=\"{id}\"")));
        assert!(root.join("_site/_includes/Counter.svelte").is_file());
    }

    #[test]
    fn test_store_empty_after_before_build() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("a.md"), b"{% svelte \"C.svelte\" count=2 %}").unwrap();
        write_file(&root.join("_includes/C.svelte"), b"").unwrap();

        let site = site(root, Mode::Production);
        site.build().unwrap();
        assert!(!site.store.is_empty());

        site.on_before_build();
        assert!(site.store.is_empty());
    }

    #[test]
    fn test_dev_build_maps_urls_and_starts_server_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("about.jsx"), b"").unwrap();

        let starts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&starts);
        let config = config(root);
        let bundler = Arc::new(StaticBundler::new(&config, Mode::Development));
        let site = Site::with_parts(config, Mode::Development, registry(), bundler).with_server_starter(
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(DevSession::detached())
            }),
        );

        assert!(!site.dev_server.is_initialized());
        site.build().unwrap();
        site.build().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(site.dev_server.is_initialized());

        let entry = site.url_map.get("/about/").unwrap();
        assert_eq!(entry.output_path, root.join("_site/about/index.html"));
        // disk holds the raw page; hydration happens per request
        assert!(!read(root.join("_site/about/index.html")).contains("<script"));

        let response = site
            .middleware_chain()
            .handle(&crate::middleware::DevRequest::get("/about/"));
        assert_eq!(response.status, 200);
        assert!(String::from_utf8(response.body).unwrap().contains("data-isle-for="));
    }

    #[test]
    fn test_production_aborts_on_page_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("bad.md"), b"{% svelte \"Missing.svelte\" %}").unwrap();

        let err = site(root, Mode::Production).build().unwrap_err();
        assert!(format!("{err:#}").contains("bad.md"));
    }

    #[test]
    fn test_development_continues_after_page_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("bad.md"), b"{% svelte \"Missing.svelte\" %}").unwrap();
        write_file(&root.join("good.md"), b"# fine").unwrap();

        let report = site(root, Mode::Development).build().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.pages, 1);
        assert!(root.join("_site/good/index.html").is_file());
    }

    #[test]
    fn test_layout_and_html_templates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(
            &root.join("_includes/base.html"),
            b"<html><head><title>{{ title }}</title></head><body>{{ content }}</body></html>",
        )
        .unwrap();
        write_file(&root.join("post.md"), b"---\nlayout: base.html\ntitle: Post\n---\nHello").unwrap();
        write_file(&root.join("raw.html"), b"<p>raw</p>").unwrap();

        site(root, Mode::Production).build().unwrap();

        let post = read(root.join("_site/post/index.html"));
        assert!(post.contains("<title>Post</title>"));
        assert!(post.contains("<body><p>Hello</p>"));
        assert_eq!(read(root.join("_site/raw/index.html")), "<p>raw</p>");
    }

    #[test]
    fn test_passthrough_and_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("public/site.css"), b"body{}").unwrap();
        write_file(&root.join("notes.txt"), b"not copied").unwrap();

        let report = site(root, Mode::Production).build().unwrap();
        assert_eq!(report.copied, 1);
        assert!(root.join("_site/public/site.css").is_file());
        assert!(!root.join("_site/notes.txt").exists());

        let mut config = config(root);
        config.build.passthrough_all = true;
        config.build.dry_run = true;
        let bundler = Arc::new(StaticBundler::new(&config, Mode::Production));
        let dry = Site::with_parts(config, Mode::Production, registry(), bundler);
        assert_eq!(dry.build().unwrap().copied, 0);
        assert!(!root.join("_site/notes.txt").exists());
    }
}
