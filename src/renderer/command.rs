//! Renderer capabilities backed by external commands.
//!
//! # Protocol
//!
//! The command receives one JSON request on stdin:
//!
//! ```json
//! { "kind": "page", "source": "/site/index.jsx", "url": "/", "data": {}, "aliases": {} }
//! { "kind": "component", "component": "/site/_includes/Counter.jsx", "props": {"count": 1}, "hydrate": "eager", "aliases": {} }
//! ```
//!
//! Component commands print HTML. Page commands print either HTML or a JSON
//! object `{"html": "...", "hydrate": "lazy", "props": {...}}`.

use super::{ComponentInput, ComponentRender, PageInput, PageRender, RenderError, RenderedPage};
use crate::store::Hydrate;
use crate::utils::exec::run_with_stdin;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One configured command, used for either capability.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    renderer: String,
    command: Vec<String>,
    root: PathBuf,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Request<'a> {
    Page(&'a PageInput<'a>),
    Component(&'a ComponentInput<'a>),
}

#[derive(Deserialize)]
struct PageOutput {
    html: String,
    #[serde(default)]
    hydrate: Hydrate,
    #[serde(default)]
    props: Option<Value>,
}

impl CommandRenderer {
    pub fn new(renderer: &str, command: &[String], root: &Path) -> Self {
        Self {
            renderer: renderer.to_owned(),
            command: command.to_vec(),
            root: root.to_path_buf(),
        }
    }

    fn call(&self, request: &Request<'_>, source: &Path) -> Result<String> {
        let payload = serde_json::to_vec(request)?;
        let stdout = run_with_stdin(Some(&self.root), &self.command, &payload).map_err(|err| {
            RenderError::Failed {
                renderer: self.renderer.clone(),
                source_path: source.to_path_buf(),
                source: err.into(),
            }
        })?;

        String::from_utf8(stdout).map_err(|_| {
            RenderError::InvalidOutput {
                renderer: self.renderer.clone(),
                reason: "stdout is not UTF-8".into(),
            }
            .into()
        })
    }
}

impl PageRender for CommandRenderer {
    fn render_page(&self, input: &PageInput<'_>) -> Result<RenderedPage> {
        let stdout = self.call(&Request::Page(input), input.source)?;
        Ok(parse_page_output(&self.renderer, &stdout)?)
    }
}

impl ComponentRender for CommandRenderer {
    fn render_component(&self, input: &ComponentInput<'_>) -> Result<String> {
        self.call(&Request::Component(input), input.component)
    }
}

/// Decode page command output: a JSON object or plain HTML.
fn parse_page_output(renderer: &str, stdout: &str) -> Result<RenderedPage, RenderError> {
    let trimmed = stdout.trim_start();
    if !trimmed.starts_with('{') {
        return Ok(RenderedPage::static_html(stdout));
    }

    let output: PageOutput =
        serde_json::from_str(trimmed).map_err(|err| RenderError::InvalidOutput {
            renderer: renderer.to_owned(),
            reason: err.to_string(),
        })?;

    Ok(RenderedPage {
        html: output.html,
        hydrate: output.hydrate,
        props: output.props.unwrap_or_else(|| Value::Object(Default::default())),
    })
}
