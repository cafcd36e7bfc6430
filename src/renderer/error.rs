//! Renderer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while server-rendering a page or component.
///
/// These are scoped to the page being built: they fail that page, and the
/// build decides whether that is fatal.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer `{renderer}` failed on `{}`", .source_path.display())]
    Failed {
        renderer: String,
        source_path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("renderer `{renderer}` returned invalid output: {reason}")]
    InvalidOutput { renderer: String, reason: String },

    #[error("component module `{}` not found", .0.display())]
    ComponentNotFound(PathBuf),

    #[error("no renderer claims the `.{0}` extension")]
    UnknownExtension(String),

    #[error("renderer `{renderer}` has no {capability} capability")]
    MissingCapability {
        renderer: String,
        capability: &'static str,
    },
}
