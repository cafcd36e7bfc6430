//! Template format and ignore list reconciliation.
//!
//! Renderer-owned extensions must reach the generator in two places: page
//! formats become template formats, and every component source kept under
//! the includes directory must be ignored by the generator's own walk.
//! Built-in asset extensions are always ignored there as well.
//!
//! The result is a pure function of the registry and the build config, so
//! repeated builds present identical configuration.

use crate::config::BuildConfig;
use crate::renderer::RendererRegistry;
use crate::utils::fs::to_slash_relative;
use rustc_hash::FxHashSet;

/// Derived facts about one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMeta {
    pub extension: String,
    pub is_template_format: bool,
    pub is_ignored_from_includes: bool,
}

impl ExtensionMeta {
    fn asset(ext: &str) -> Self {
        Self {
            extension: ext.to_owned(),
            is_template_format: false,
            is_ignored_from_includes: true,
        }
    }
}

/// Asset extensions that live next to components but are never pages.
const DEFAULT_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less", "styl", "js", "mjs", "ts"];

pub fn default_extensions() -> Vec<ExtensionMeta> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ExtensionMeta::asset(ext)).collect()
}

/// Configuration handed to the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateExtensions {
    /// Template formats: configured formats followed by renderer page formats.
    pub formats: Vec<String>,
    /// Input-relative ignore globs.
    pub ignores: Vec<String>,
}

impl TemplateExtensions {
    pub fn is_format(&self, ext: &str) -> bool {
        self.formats.iter().any(|f| f.eq_ignore_ascii_case(ext))
    }
}

/// Merge defaults with renderer metas, first occurrence wins.
pub fn merged_metas(registry: &RendererRegistry) -> Vec<ExtensionMeta> {
    let renderer_metas = registry.iter().flat_map(|r| {
        r.extensions.iter().map(|ext| ExtensionMeta {
            extension: ext.clone(),
            is_template_format: r.has_page(),
            is_ignored_from_includes: true,
        })
    });

    let mut seen = FxHashSet::default();
    default_extensions()
        .into_iter()
        .chain(renderer_metas)
        .filter(|meta| seen.insert(meta.extension.clone()))
        .collect()
}

/// Compute template formats and ignore globs for one build.
pub fn reconcile(registry: &RendererRegistry, build: &BuildConfig) -> TemplateExtensions {
    let metas = merged_metas(registry);

    let mut formats = Vec::new();
    let configured = build.formats.iter().map(|f| f.trim_start_matches('.').to_ascii_lowercase());
    let page_formats = metas
        .iter()
        .filter(|m| m.is_template_format)
        .map(|m| m.extension.clone());
    for format in configured.chain(page_formats) {
        if !formats.contains(&format) {
            formats.push(format);
        }
    }

    let mut ignores = match &build.ignores {
        Some(user) => user.clone(),
        None => {
            let includes = slash_path(&build.includes);
            metas
                .iter()
                .filter(|m| m.is_ignored_from_includes)
                .map(|m| format!("{includes}/**/*.{}", m.extension))
                .collect()
        }
    };
    if let Some(output) = to_slash_relative(&build.output, &build.input).filter(|p| !p.is_empty()) {
        ignores.push(format!("{output}/**"));
    }

    let mut seen = FxHashSet::default();
    ignores.retain(|glob| seen.insert(glob.clone()));

    TemplateExtensions { formats, ignores }
}

fn slash_path(path: &std::path::Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_matches('/')
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{RenderedPage, RendererDescriptor, page_fn};
    use crate::utils::ignore::IgnoreMatcher;
    use std::path::PathBuf;

    fn build_config() -> BuildConfig {
        BuildConfig {
            input: PathBuf::from("/site"),
            output: PathBuf::from("/site/_site"),
            ..Default::default()
        }
    }

    fn jsx_page_registry() -> RendererRegistry {
        RendererRegistry::new(vec![
            RendererDescriptor::new("preact", ["jsx"])
                .with_page(page_fn(|_| Ok(RenderedPage::static_html("")))),
            RendererDescriptor::new("svelte", ["svelte"]),
        ])
    }

    #[test]
    fn test_scenario_page_renderer_formats_and_ignores() {
        let result = reconcile(&jsx_page_registry(), &build_config());

        assert_eq!(result.formats, vec!["md", "html", "jsx"]);
        assert!(result.is_format("JSX"));
        assert!(!result.is_format("svelte"));
        assert!(result.ignores.contains(&"_includes/**/*.jsx".to_string()));
        assert!(result.ignores.contains(&"_includes/**/*.svelte".to_string()));
        assert_eq!(result.ignores.last().map(String::as_str), Some("_site/**"));

        let matcher = IgnoreMatcher::new(&result.ignores);
        assert!(matcher.matches("_includes/components/Counter.jsx"));
        assert!(matcher.matches("_site/index.html"));
        assert!(!matcher.matches("index.jsx"));
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let registry = jsx_page_registry();
        let config = build_config();
        assert_eq!(reconcile(&registry, &config), reconcile(&registry, &config));
    }

    #[test]
    fn test_defaults_win_on_conflict() {
        let registry = RendererRegistry::new(vec![
            RendererDescriptor::new("weird", ["css", "vue"])
                .with_page(page_fn(|_| Ok(RenderedPage::static_html("")))),
            RendererDescriptor::new("vue", ["vue"]),
        ]);
        let metas = merged_metas(&registry);

        let css: Vec<_> = metas.iter().filter(|m| m.extension == "css").collect();
        assert_eq!(css.len(), 1);
        assert!(!css[0].is_template_format);

        let vue: Vec<_> = metas.iter().filter(|m| m.extension == "vue").collect();
        assert_eq!(vue.len(), 1);
        assert!(vue[0].is_template_format);
    }

    #[test]
    fn test_user_ignores_replace_computed() {
        let config = BuildConfig {
            ignores: Some(vec!["drafts/**".into(), "drafts/**".into()]),
            ..build_config()
        };
        let result = reconcile(&jsx_page_registry(), &config);
        assert_eq!(result.ignores, vec!["drafts/**", "_site/**"]);
    }

    #[test]
    fn test_output_outside_input_not_ignored() {
        let config = BuildConfig {
            input: PathBuf::from("/site/src"),
            output: PathBuf::from("/site/dist"),
            ..Default::default()
        };
        let result = reconcile(&RendererRegistry::default(), &config);
        assert!(result.ignores.iter().all(|g| !g.contains("dist")));
        assert_eq!(result.formats, vec!["md", "html"]);
    }
}
