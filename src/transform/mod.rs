//! HTML transform pipeline.
//!
//! One transform, two delivery paths:
//!
//! ```text
//!                         ┌─► production: write hook ──► transform ──► disk
//! rendered page HTML ─────┤
//!                         └─► development: UrlTransformMap ──► request ──► transform ──► response
//! ```
//!
//! The transform injects hydration scripts from the attribute store (see
//! [`hydrate::inject`]) and then hands the page to the bundler's HTML pass.

pub mod hydrate;
pub mod url;

pub use url::{UrlMapMiddleware, UrlTransformMap};

use crate::{bundler::Bundler, log, renderer::RendererRegistry, store::ComponentAttrStore};
use anyhow::Result;
use hydrate::Skipped;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub struct HtmlTransformer {
    store: Arc<ComponentAttrStore>,
    registry: Arc<RendererRegistry>,
    bundler: Arc<dyn Bundler>,
    output_dir: PathBuf,
}

impl HtmlTransformer {
    pub fn new(
        store: Arc<ComponentAttrStore>,
        registry: Arc<RendererRegistry>,
        bundler: Arc<dyn Bundler>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            registry,
            bundler,
            output_dir,
        }
    }

    /// Only HTML documents under the output directory are transformed.
    pub fn is_supported_output_path(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
            && path.starts_with(&self.output_dir)
    }

    /// Transform one page. Unsupported paths pass through unchanged.
    ///
    /// Instances without a store entry stay static and are reported as warnings.
    pub fn transform(&self, html: &str, output_path: &Path) -> Result<String> {
        if !self.is_supported_output_path(output_path) {
            return Ok(html.to_owned());
        }

        let injection = hydrate::inject(
            html,
            |id| self.store.get(id),
            |renderer| self.registry.by_name(renderer).and_then(|r| r.client.clone()),
        );

        for skipped in &injection.skipped {
            match skipped {
                Skipped::MissingAttrs { id } => log!(
                    "warn";
                    "{}: no attributes recorded for `{id}`, left static",
                    output_path.display()
                ),
                Skipped::NoClient { id, renderer } => log!(
                    "warn";
                    "{}: renderer `{renderer}` has no client module, `{id}` left static",
                    output_path.display()
                ),
            }
        }

        self.bundler.transform_html(injection.html, output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        middleware::{DevRequest, DevResponse, Middleware, MiddlewareChain},
        renderer::RendererDescriptor,
        store::{ComponentAttrs, Hydrate},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bundler that leaves HTML alone and counts fallback calls.
    #[derive(Default)]
    struct FakeBundler {
        fallback_calls: Arc<AtomicUsize>,
    }

    struct CountingFallback(Arc<AtomicUsize>);

    impl Middleware for CountingFallback {
        fn handle(&self, _: &DevRequest) -> Result<Option<DevResponse>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    impl Bundler for FakeBundler {
        fn resolve_import(&self, specifier: &str, _: &Path) -> Result<PathBuf> {
            Ok(PathBuf::from(specifier))
        }

        fn module_url(&self, module: &Path) -> String {
            format!("/{}", module.display())
        }

        fn transform_html(&self, html: String, _: &Path) -> Result<String> {
            Ok(html)
        }

        fn middleware(&self) -> Option<Arc<dyn Middleware>> {
            Some(Arc::new(CountingFallback(Arc::clone(&self.fallback_calls))))
        }
    }

    const OUT: &str = "/site/_site";

    fn page(id: &str) -> String {
        format!(
            "<html><head></head><body><isle-root data-isle-id=\"{id}\"><b>0</b></isle-root></body></html>"
        )
    }

    fn setup() -> (Arc<ComponentAttrStore>, Arc<HtmlTransformer>, Arc<FakeBundler>) {
        let store = Arc::new(ComponentAttrStore::new());
        let registry = Arc::new(RendererRegistry::new(vec![
            RendererDescriptor::new("svelte", ["svelte"]).with_client("/svelte-client.mjs"),
        ]));
        let bundler = Arc::new(FakeBundler::default());
        let transformer = Arc::new(HtmlTransformer::new(
            Arc::clone(&store),
            registry,
            bundler.clone(),
            PathBuf::from(OUT),
        ));
        (store, transformer, bundler)
    }

    fn record(store: &ComponentAttrStore, id: &str) {
        store.set(
            id,
            ComponentAttrs {
                renderer: "svelte".into(),
                component: "/Counter.svelte".into(),
                props: serde_json::json!({ "count": 0 }),
                hydrate: Hydrate::Eager,
                anchor: "<b>0</b>".into(),
            },
        );
    }

    #[test]
    fn test_supported_output_paths() {
        let (_, transformer, _) = setup();
        assert!(transformer.is_supported_output_path(Path::new("/site/_site/index.html")));
        assert!(transformer.is_supported_output_path(Path::new("/site/_site/a/INDEX.HTML")));
        assert!(!transformer.is_supported_output_path(Path::new("/site/_site/feed.xml")));
        assert!(!transformer.is_supported_output_path(Path::new("/elsewhere/index.html")));
    }

    #[test]
    fn test_unsupported_path_passes_through() {
        let (store, transformer, _) = setup();
        record(&store, "a-0");
        let html = page("a-0");
        let out = transformer.transform(&html, Path::new("/site/_site/data.json")).unwrap();
        assert_eq!(out, html);
    }

    #[test]
    fn test_transform_twice_is_identical() {
        let (store, transformer, _) = setup();
        record(&store, "a-0");
        let path = Path::new("/site/_site/index.html");

        let once = transformer.transform(&page("a-0"), path).unwrap();
        let twice = transformer.transform(&once, path).unwrap();
        assert!(once.contains("data-isle-for=\"a-0\""));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stale_store_reference_still_renders() {
        let (store, transformer, _) = setup();
        record(&store, "a-0");
        store.clear();
        let out = transformer
            .transform(&page("a-0"), Path::new("/site/_site/index.html"))
            .unwrap();
        assert!(out.contains("<b>0</b>"));
        assert!(!out.contains("<script"));
    }

    fn dev_chain(
        transformer: Arc<HtmlTransformer>,
        bundler: &FakeBundler,
        map: Arc<UrlTransformMap>,
    ) -> MiddlewareChain {
        let mut layers: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(UrlMapMiddleware::new(map, transformer, "/"))];
        layers.extend(bundler.middleware());
        MiddlewareChain::new(layers)
    }

    #[test]
    fn test_dev_hit_skips_bundler_fallback() {
        let (store, transformer, bundler) = setup();
        record(&store, "a-0");
        let map = Arc::new(UrlTransformMap::new());
        map.insert(
            Path::new(OUT),
            &Path::new(OUT).join("about/index.html"),
            page("a-0"),
        );

        let chain = dev_chain(transformer, &bundler, map);
        let response = chain.handle(&DevRequest::get("/about/"));

        assert_eq!(response.status, 200);
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains("data-isle-for=\"a-0\""));
        assert_eq!(bundler.fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dev_miss_calls_next() {
        let (_, transformer, bundler) = setup();
        let map = Arc::new(UrlTransformMap::new());
        let url_layer = UrlMapMiddleware::new(Arc::clone(&map), Arc::clone(&transformer), "/");

        assert!(url_layer.handle(&DevRequest::get("/missing-page/")).unwrap().is_none());

        let chain = dev_chain(transformer, &bundler, map);
        assert_eq!(chain.handle(&DevRequest::get("/missing-page/")).status, 404);
        assert_eq!(bundler.fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dev_prefix_matches_whole_segment() {
        let (_, transformer, _) = setup();
        let map = Arc::new(UrlTransformMap::new());
        map.insert(
            Path::new(OUT),
            &Path::new(OUT).join("roll/index.html"),
            "<p>roll</p>".into(),
        );
        let url_layer = UrlMapMiddleware::new(map, transformer, "/blog");

        assert!(url_layer.handle(&DevRequest::get("/blogroll/")).unwrap().is_none());
        let hit = url_layer.handle(&DevRequest::get("/blog/roll/")).unwrap().unwrap();
        assert!(String::from_utf8(hit.body).unwrap().contains("<p>roll</p>"));
    }
}
