//! `[build]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in isle.toml - directories and generator switches.
///
/// Every directory is relative to the project root until
/// [`SiteConfig::update_with_cli`](super::SiteConfig::update_with_cli) makes it absolute.
///
/// # Example
/// ```toml
/// [build]
/// input = "src"
/// output = "_site"
/// includes = "_includes"
/// formats = ["md", "html"]
/// passthrough = ["public", "renderers"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root, set from `--root` (never read from the file).
    #[serde(skip)]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Directory scanned for templates.
    #[serde(default = "defaults::build::input")]
    #[educe(Default = defaults::build::input())]
    pub input: PathBuf,

    /// Directory pages and copies are written to.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Layouts and component modules, relative to `input`. Never rendered as pages.
    #[serde(default = "defaults::build::includes")]
    #[educe(Default = defaults::build::includes())]
    pub includes: PathBuf,

    /// URL prefix prepended to module URLs emitted into pages.
    #[serde(default = "defaults::build::path_prefix")]
    #[educe(Default = defaults::build::path_prefix())]
    pub path_prefix: String,

    /// Template formats handled by the generator itself.
    /// Renderer page formats are appended to these.
    #[serde(default = "defaults::build::formats")]
    #[educe(Default = defaults::build::formats())]
    pub formats: Vec<String>,

    /// Directories (relative to `input`) copied verbatim to the output.
    #[serde(default = "defaults::build::passthrough")]
    #[educe(Default = defaults::build::passthrough())]
    pub passthrough: Vec<PathBuf>,

    /// Copy every non-template, non-ignored file.
    #[serde(default)]
    pub passthrough_all: bool,

    /// Skip passthrough copies whose destination is newer than the source.
    #[serde(default)]
    pub incremental: bool,

    /// Render and transform without writing anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Minify HTML in production builds.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub minify: bool,

    /// Glob patterns (relative to `input`) replacing the computed ignore list.
    #[serde(default)]
    pub ignores: Option<Vec<String>>,
}

impl BuildConfig {
    /// Absolute includes directory (`input` joined with `includes`).
    pub fn includes_dir(&self) -> PathBuf {
        self.input.join(&self.includes)
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use std::path::PathBuf;

    #[test]
    fn test_build_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.build.input, PathBuf::from("."));
        assert_eq!(config.build.output, PathBuf::from("_site"));
        assert_eq!(config.build.includes, PathBuf::from("_includes"));
        assert_eq!(config.build.formats, vec!["md", "html"]);
        assert_eq!(config.build.passthrough, vec![PathBuf::from("public")]);
        assert!(config.build.minify);
        assert!(!config.build.passthrough_all);
        assert!(!config.build.dry_run);
        assert!(config.build.ignores.is_none());
    }

    #[test]
    fn test_build_config_overrides() {
        let config: SiteConfig = toml::from_str(
            r#"
            [build]
            input = "src"
            output = "dist"
            path_prefix = "/docs/"
            formats = ["md"]
            passthrough_all = true
            ignores = ["drafts/**"]
        "#,
        )
        .unwrap();

        assert_eq!(config.build.input, PathBuf::from("src"));
        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert_eq!(config.build.path_prefix, "/docs/");
        assert_eq!(config.build.formats, vec!["md"]);
        assert!(config.build.passthrough_all);
        assert_eq!(config.build.ignores, Some(vec!["drafts/**".to_string()]));
        assert_eq!(config.build.includes_dir(), PathBuf::from("src/_includes"));
    }

    #[test]
    fn test_root_is_not_deserialized() {
        let result: Result<SiteConfig, _> = toml::from_str(
            r#"
            [build]
            root = "/tmp"
        "#,
        );
        assert!(result.is_err());
    }
}
