//! Template primitives bound from the renderer registry.
//!
//! - [`shortcode`]: `{% svelte "Counter.svelte" count=1 hydrate="eager" %}`
//!   renders a component inline and wraps it in an anchor element
//! - [`page`]: whole pages rendered by a renderer's page capability
//!
//! Both mint instance ids, record attributes in the store and emit
//! `<isle-root>` anchors that the HTML transform later hydrates.

pub mod page;
pub mod shortcode;

use crate::{
    bundler::Bundler,
    renderer::RendererRegistry,
    store::{ComponentAttrStore, ComponentAttrs, Hydrate},
    transform::hydrate::ROOT_TAG,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Everything a render call needs, borrowed from the build orchestrator.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub registry: &'a RendererRegistry,
    pub store: &'a ComponentAttrStore,
    pub bundler: &'a dyn Bundler,
    pub aliases: &'a BTreeMap<String, PathBuf>,
}

impl RenderContext<'_> {
    /// Record attributes for `id` and wrap `html` in its anchor.
    fn anchor(
        &self,
        id: &str,
        renderer: &str,
        module: &Path,
        props: serde_json::Value,
        hydrate: Hydrate,
        html: String,
    ) -> String {
        // Static instances never load their module in the browser
        let component = if hydrate.is_none() {
            String::new()
        } else {
            self.bundler.module_url(module)
        };

        let anchored = format!(
            "<{ROOT_TAG} data-isle-id=\"{id}\" data-isle-renderer=\"{renderer}\">{html}</{ROOT_TAG}>"
        );
        self.store.set(
            id,
            ComponentAttrs {
                renderer: renderer.to_owned(),
                component,
                props,
                hydrate,
                anchor: html,
            },
        );
        anchored
    }
}
