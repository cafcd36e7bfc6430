//! Whole-page templates rendered by a renderer's page capability.
//!
//! A source such as `about.jsx` becomes exactly one page. When the renderer
//! asks for hydration the page body is wrapped in an anchor keyed by the
//! page-level instance id.

use super::RenderContext;
use crate::{
    renderer::{PageInput, RenderError},
    store::IdMinter,
};
use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use std::{path::Path, sync::LazyLock};

static BODY_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body\b[^>]*>").expect("valid regex"));

static BODY_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("valid regex"));

/// Extensions rendered as whole pages, in registry order.
#[derive(Debug, Clone, Default)]
pub struct PageBinder {
    extensions: Vec<String>,
}

impl PageBinder {
    /// Bind every extension whose first claimant has a page capability.
    pub fn bind(ctx: &RenderContext<'_>) -> Self {
        let mut extensions = Vec::new();
        for renderer in ctx.registry.iter() {
            for ext in &renderer.extensions {
                if !extensions.contains(ext) && ctx.registry.page_renderer_for(ext).is_some() {
                    extensions.push(ext.clone());
                }
            }
        }
        Self { extensions }
    }

    pub fn handles(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Render `source` as a page at `url`.
    pub fn render(
        &self,
        ctx: &RenderContext<'_>,
        source: &Path,
        url: &str,
        data: &Value,
        minter: &IdMinter,
    ) -> Result<String> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let renderer = ctx
            .registry
            .page_renderer_for(&ext)
            .ok_or_else(|| RenderError::UnknownExtension(ext.clone()))?;
        let page = renderer
            .page
            .as_ref()
            .ok_or_else(|| RenderError::MissingCapability {
                renderer: renderer.name.clone(),
                capability: "page",
            })?;

        let rendered = page.render_page(&PageInput {
            source,
            url,
            data,
            aliases: ctx.aliases,
        })?;

        let id = minter.page_id();
        let hydrate = rendered.hydrate;
        if hydrate.is_none() {
            // Recorded so the store describes every page root, hydrated or not
            ctx.anchor(&id, &renderer.name, source, rendered.props, hydrate, String::new());
            return Ok(rendered.html);
        }

        let (before, inner, after) = split_body(&rendered.html);
        let anchored = ctx.anchor(&id, &renderer.name, source, rendered.props, hydrate, inner.to_owned());
        Ok(format!("{before}{anchored}{after}"))
    }
}

/// Split a document around its body content. Fragments are all body.
fn split_body(html: &str) -> (&str, &str, &str) {
    let open = BODY_OPEN.find(html);
    let close = BODY_CLOSE.find_iter(html).last();
    match (open, close) {
        (Some(open), Some(close)) if open.end() <= close.start() => (
            &html[..open.end()],
            &html[open.end()..close.start()],
            &html[close.start()..],
        ),
        _ => ("", html, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bundler::Bundler,
        middleware::Middleware,
        renderer::{RenderedPage, RendererDescriptor, RendererRegistry, page_fn},
        store::{ComponentAttrStore, Hydrate},
    };
    use std::{
        collections::BTreeMap,
        path::PathBuf,
        sync::Arc,
    };

    struct UrlBundler;

    impl Bundler for UrlBundler {
        fn resolve_import(&self, specifier: &str, _: &Path) -> Result<PathBuf> {
            Ok(PathBuf::from(specifier))
        }

        fn module_url(&self, module: &Path) -> String {
            module.display().to_string()
        }

        fn transform_html(&self, html: String, _: &Path) -> Result<String> {
            Ok(html)
        }

        fn middleware(&self) -> Option<Arc<dyn Middleware>> {
            None
        }
    }

    fn registry() -> RendererRegistry {
        RendererRegistry::new(vec![
            RendererDescriptor::new("preact", ["jsx"]).with_page(page_fn(|input| {
                Ok(RenderedPage {
                    html: format!("<html><head></head><body class=\"x\"><h1>{}</h1></body></html>", input.url),
                    hydrate: Hydrate::Eager,
                    props: serde_json::json!({ "url": input.url }),
                })
            })),
            RendererDescriptor::new("static", ["tsx"])
                .with_page(page_fn(|_| Ok(RenderedPage::static_html("<main>static</main>")))),
            RendererDescriptor::new("inline", ["svelte"]),
        ])
    }

    #[test]
    fn test_bind_page_extensions() {
        let registry = registry();
        let store = ComponentAttrStore::new();
        let aliases = BTreeMap::new();
        let ctx = RenderContext {
            registry: &registry,
            store: &store,
            bundler: &UrlBundler,
            aliases: &aliases,
        };
        let binder = PageBinder::bind(&ctx);
        assert_eq!(binder.extensions, ["jsx", "tsx"]);
        assert!(binder.handles("JSX"));
        assert!(!binder.handles("svelte"));
    }

    #[test]
    fn test_hydrated_page_is_anchored() {
        let registry = registry();
        let store = ComponentAttrStore::new();
        let aliases = BTreeMap::new();
        let ctx = RenderContext {
            registry: &registry,
            store: &store,
            bundler: &UrlBundler,
            aliases: &aliases,
        };
        let minter = IdMinter::new("about.jsx");
        let html = PageBinder::bind(&ctx)
            .render(&ctx, Path::new("/site/about.jsx"), "/about/", &Value::Null, &minter)
            .unwrap();

        let id = minter.page_id();
        assert!(html.contains(&format!(
            "<body class=\"x\"><isle-root data-isle-id=\"{id}\" data-isle-renderer=\"preact\"><h1>/about/</h1></isle-root></body>"
        )));
        let attrs = store.get(&id).unwrap();
        assert_eq!(attrs.hydrate, Hydrate::Eager);
        assert_eq!(attrs.component, "/site/about.jsx");
        assert_eq!(attrs.props["url"], "/about/");
    }

    #[test]
    fn test_static_page_is_untouched() {
        let registry = registry();
        let store = ComponentAttrStore::new();
        let aliases = BTreeMap::new();
        let ctx = RenderContext {
            registry: &registry,
            store: &store,
            bundler: &UrlBundler,
            aliases: &aliases,
        };
        let minter = IdMinter::new("index.tsx");
        let html = PageBinder::bind(&ctx)
            .render(&ctx, Path::new("/site/index.tsx"), "/", &Value::Null, &minter)
            .unwrap();
        assert_eq!(html, "<main>static</main>");
        assert!(store.get(&minter.page_id()).unwrap().hydrate.is_none());
    }

    #[test]
    fn test_unclaimed_extension_errors() {
        let registry = registry();
        let store = ComponentAttrStore::new();
        let aliases = BTreeMap::new();
        let ctx = RenderContext {
            registry: &registry,
            store: &store,
            bundler: &UrlBundler,
            aliases: &aliases,
        };
        let err = PageBinder::bind(&ctx)
            .render(&ctx, Path::new("/site/x.svelte"), "/x/", &Value::Null, &IdMinter::new("x"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::UnknownExtension(_))
        ));
    }

    #[test]
    fn test_split_body_fragment() {
        assert_eq!(split_body("<p>x</p>"), ("", "<p>x</p>", ""));
    }
}
