//! `[[renderers]]` entries.
//!
//! Each entry declares which file extensions a framework renderer owns and
//! which capabilities it provides. Capabilities are external commands; see
//! [`crate::renderer::command`] for the stdin/stdout protocol.

use serde::{Deserialize, Serialize};

/// One `[[renderers]]` table.
///
/// # Example
/// ```toml
/// [[renderers]]
/// name = "preact"
/// extensions = ["jsx", "tsx"]
/// page = ["node", "renderers/preact/page.mjs"]
/// component = ["node", "renderers/preact/component.mjs"]
/// client = "/renderers/preact/client.mjs"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RendererConfig {
    /// Unique name; also the shortcode name, e.g. `{% preact "Counter.jsx" %}`.
    pub name: String,

    /// Extensions claimed by this renderer, without the leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Command rendering a whole page from a source file.
    #[serde(default)]
    pub page: Option<Vec<String>>,

    /// Command rendering one component inline.
    #[serde(default)]
    pub component: Option<Vec<String>>,

    /// Browser module exporting the hydration adapter (`default(target, Component, props)`).
    #[serde(default)]
    pub client: Option<String>,
}

impl RendererConfig {
    /// Extensions with any leading dot stripped and case folded.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;

    #[test]
    fn test_renderer_tables() {
        let config: SiteConfig = toml::from_str(
            r#"
            [[renderers]]
            name = "preact"
            extensions = ["jsx", ".TSX"]
            page = ["node", "page.mjs"]
            component = ["node", "component.mjs"]
            client = "/renderers/preact.mjs"

            [[renderers]]
            name = "svelte"
            extensions = ["svelte"]
            component = ["node", "svelte.mjs"]
        "#,
        )
        .unwrap();

        assert_eq!(config.renderers.len(), 2);
        let preact = &config.renderers[0];
        assert_eq!(preact.normalized_extensions(), vec!["jsx", "tsx"]);
        assert_eq!(preact.page.as_deref(), Some(&["node".to_string(), "page.mjs".to_string()][..]));
        assert_eq!(preact.client.as_deref(), Some("/renderers/preact.mjs"));

        let svelte = &config.renderers[1];
        assert!(svelte.page.is_none());
        assert!(svelte.client.is_none());
    }

    #[test]
    fn test_renderer_unknown_field_rejection() {
        let result: Result<SiteConfig, _> = toml::from_str(
            r#"
            [[renderers]]
            name = "vue"
            hydrate = "eager"
        "#,
        );
        assert!(result.is_err());
    }
}
