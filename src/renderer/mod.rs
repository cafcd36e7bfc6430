//! Framework renderers and their capabilities.
//!
//! A renderer owns a set of file extensions and may provide two optional
//! capabilities:
//!
//! - **page**: render a whole page from a source file (`index.jsx` → HTML)
//! - **component**: render one component inline, for shortcodes
//!
//! Dispatch always checks for a capability instead of assuming one. The
//! configured renderers are external commands ([`command::CommandRenderer`]);
//! tests plug in closures through [`page_fn`] and [`component_fn`].
//!
//! ```text
//! [[renderers]] ──► RendererDescriptor ──► RendererRegistry (ordered)
//!                       │                        │
//!                       ├── page?                ├── for_extension(): first claimant wins
//!                       ├── component?           └── page_renderer_for()
//!                       └── client?
//! ```

pub mod command;
mod error;

pub use error::RenderError;

use crate::config::SiteConfig;
use crate::store::Hydrate;
use anyhow::Result;
use command::CommandRenderer;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

// ============================================================================
// Capability contract
// ============================================================================

/// Input handed to a page capability.
#[derive(Debug, Serialize)]
pub struct PageInput<'a> {
    /// Absolute path of the page's source module.
    pub source: &'a Path,
    /// Public URL of the page, e.g. `/about/`.
    pub url: &'a str,
    /// Page data (front matter and permalink information).
    pub data: &'a Value,
    /// Import aliases the renderer should honor when loading modules.
    pub aliases: &'a BTreeMap<String, PathBuf>,
}

/// Markup produced by a page capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedPage {
    pub html: String,
    /// How the page root should hydrate; `none` keeps it static.
    pub hydrate: Hydrate,
    /// Props passed to the page component when hydrating.
    pub props: Value,
}

impl RenderedPage {
    /// Static markup with no hydration.
    pub fn static_html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            hydrate: Hydrate::None,
            props: Value::Object(Default::default()),
        }
    }
}

/// Input handed to a component capability.
#[derive(Debug, Serialize)]
pub struct ComponentInput<'a> {
    /// Absolute path of the resolved component module.
    pub component: &'a Path,
    pub props: &'a Value,
    pub hydrate: Hydrate,
    pub aliases: &'a BTreeMap<String, PathBuf>,
}

/// Renders whole pages.
pub trait PageRender: Send + Sync {
    fn render_page(&self, input: &PageInput<'_>) -> Result<RenderedPage>;
}

/// Renders a single component to markup.
pub trait ComponentRender: Send + Sync {
    fn render_component(&self, input: &ComponentInput<'_>) -> Result<String>;
}

#[cfg(test)]
struct PageFn<F>(F);

#[cfg(test)]
impl<F> PageRender for PageFn<F>
where
    F: Fn(&PageInput<'_>) -> Result<RenderedPage> + Send + Sync,
{
    fn render_page(&self, input: &PageInput<'_>) -> Result<RenderedPage> {
        (self.0)(input)
    }
}

#[cfg(test)]
struct ComponentFn<F>(F);

#[cfg(test)]
impl<F> ComponentRender for ComponentFn<F>
where
    F: Fn(&ComponentInput<'_>) -> Result<String> + Send + Sync,
{
    fn render_component(&self, input: &ComponentInput<'_>) -> Result<String> {
        (self.0)(input)
    }
}

/// Wrap a closure as a page capability.
#[cfg(test)]
pub fn page_fn<F>(f: F) -> Arc<dyn PageRender>
where
    F: Fn(&PageInput<'_>) -> Result<RenderedPage> + Send + Sync + 'static,
{
    Arc::new(PageFn(f))
}

/// Wrap a closure as a component capability.
#[cfg(test)]
pub fn component_fn<F>(f: F) -> Arc<dyn ComponentRender>
where
    F: Fn(&ComponentInput<'_>) -> Result<String> + Send + Sync + 'static,
{
    Arc::new(ComponentFn(f))
}

// ============================================================================
// Descriptor
// ============================================================================

/// One renderer and the capabilities it implements. Immutable once built.
#[derive(Clone)]
pub struct RendererDescriptor {
    pub name: String,
    /// Claimed extensions, lowercase without the dot.
    pub extensions: Vec<String>,
    pub page: Option<Arc<dyn PageRender>>,
    pub component: Option<Arc<dyn ComponentRender>>,
    /// Browser module exporting the hydration adapter.
    pub client: Option<String>,
}

impl fmt::Debug for RendererDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererDescriptor")
            .field("name", &self.name)
            .field("extensions", &self.extensions)
            .field("page", &self.page.is_some())
            .field("component", &self.component.is_some())
            .field("client", &self.client)
            .finish()
    }
}

impl RendererDescriptor {
    pub fn new<S: Into<String>>(name: impl Into<String>, extensions: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            extensions: extensions
                .into_iter()
                .map(|ext| ext.into().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            page: None,
            component: None,
            client: None,
        }
    }

    #[cfg(test)]
    pub fn with_page(mut self, page: Arc<dyn PageRender>) -> Self {
        self.page = Some(page);
        self
    }

    #[cfg(test)]
    pub fn with_component(mut self, component: Arc<dyn ComponentRender>) -> Self {
        self.component = Some(component);
        self
    }

    #[cfg(test)]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Build a descriptor whose capabilities run the configured commands in `root`.
    pub fn from_config(config: &crate::config::RendererConfig, root: &Path) -> Self {
        let mut descriptor = Self::new(config.name.clone(), config.normalized_extensions());
        if let Some(cmd) = &config.page {
            descriptor.page = Some(Arc::new(CommandRenderer::new(&config.name, cmd, root)));
        }
        if let Some(cmd) = &config.component {
            descriptor.component = Some(Arc::new(CommandRenderer::new(&config.name, cmd, root)));
        }
        descriptor.client.clone_from(&config.client);
        descriptor
    }

    pub const fn has_page(&self) -> bool {
        self.page.is_some()
    }

    pub fn owns(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered renderer list. Order decides conflicting extension claims.
#[derive(Debug, Clone, Default)]
pub struct RendererRegistry {
    renderers: Vec<Arc<RendererDescriptor>>,
}

impl RendererRegistry {
    pub fn new(renderers: Vec<RendererDescriptor>) -> Self {
        Self {
            renderers: renderers.into_iter().map(Arc::new).collect(),
        }
    }

    /// Registry of command renderers from `[[renderers]]`.
    pub fn from_config(config: &SiteConfig) -> Self {
        let root = config.get_root();
        Self::new(
            config
                .renderers
                .iter()
                .map(|r| RendererDescriptor::from_config(r, root))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RendererDescriptor>> {
        self.renderers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<RendererDescriptor>> {
        self.renderers.iter().find(|r| r.name == name)
    }

    /// First renderer claiming `ext`.
    pub fn for_extension(&self, ext: &str) -> Option<&Arc<RendererDescriptor>> {
        self.renderers.iter().find(|r| r.owns(ext))
    }

    /// Renderer that turns `.ext` sources into pages, if the first claimant can.
    pub fn page_renderer_for(&self, ext: &str) -> Option<&Arc<RendererDescriptor>> {
        self.for_extension(ext).filter(|r| r.has_page())
    }
}
