//! Site configuration management for `isle.toml`.
//!
//! # Sections
//!
//! | Section         | Purpose                                           |
//! |-----------------|---------------------------------------------------|
//! | `[build]`       | Directories, template formats, generator switches |
//! | `[serve]`       | Development server (port, interface, watch)       |
//! | `[aliases]`     | Import aliases resolved for component modules     |
//! | `[[renderers]]` | Framework renderers and their capabilities        |
//!
//! # Example
//!
//! ```toml
//! [build]
//! input = "src"
//! output = "_site"
//!
//! [aliases]
//! "@components" = "src/_includes/components"
//!
//! [[renderers]]
//! name = "preact"
//! extensions = ["jsx"]
//! page = ["node", "renderers/preact/page.mjs"]
//! component = ["node", "renderers/preact/component.mjs"]
//! client = "/renderers/preact/client.mjs"
//! ```

mod build;
pub mod defaults;
mod error;
mod renderer;
mod serve;

pub use build::BuildConfig;
pub use error::ConfigError;
pub use renderer::RendererConfig;
pub use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use educe::Educe;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Shortcode name reserved for extension-based dispatch.
pub const GENERIC_SHORTCODE: &str = "component";

/// Which pipeline the build runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Request-time transform through the dev server.
    Development,
    /// File-time transform on every written page.
    #[default]
    Production,
}

/// Root configuration structure representing isle.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    /// Import alias prefix → directory, relative to the root.
    #[serde(default)]
    pub aliases: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub renderers: Vec<RendererConfig>,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load `isle.toml` from the CLI root, falling back to defaults when absent.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf());
    }

    /// Which mode the CLI command implies.
    pub const fn mode_for(cli: &Cli) -> Mode {
        if cli.is_serve() {
            Mode::Development
        } else {
            Mode::Production
        }
    }

    /// Update configuration with CLI arguments and make every path absolute.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let args = cli.build_args();

        Self::update_option(&mut self.build.input, args.input.as_ref());
        Self::update_option(&mut self.build.output, args.output.as_ref());
        Self::update_option(&mut self.build.path_prefix, args.path_prefix.as_ref());
        Self::update_option(&mut self.build.formats, args.formats.as_ref());
        self.build.dry_run |= args.dry_run;
        self.build.incremental |= args.incremental;
        self.build.passthrough_all |= args.passthrough_all;

        if let Commands::Serve {
            interface,
            port,
            watch,
            ..
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
        }

        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());
        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.update_path_with_root(&root);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve all directories against `root` and normalize to absolute paths
    pub fn update_path_with_root(&mut self, root: &Path) {
        let root = Self::normalize_path(root);
        self.set_root(&root);

        self.build.input = Self::normalize_path(&root.join(&self.build.input));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
        for dir in self.aliases.values_mut() {
            *dir = Self::normalize_path(&root.join(&*dir));
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration before the first build.
    pub fn validate(&self) -> Result<()> {
        if self.build.input == self.build.output {
            bail!(ConfigError::Validation(
                "[build.input] and [build.output] must differ".into()
            ));
        }

        if self.build.formats.iter().any(|f| f.trim_start_matches('.').is_empty()) {
            bail!(ConfigError::Validation(
                "[build.formats] must not contain empty entries".into()
            ));
        }

        let mut names = FxHashSet::default();
        for renderer in &self.renderers {
            if renderer.name.is_empty() {
                bail!(ConfigError::Validation("[[renderers]] name must not be empty".into()));
            }
            if renderer.name == GENERIC_SHORTCODE {
                bail!(ConfigError::Validation(format!(
                    "[[renderers]] name `{GENERIC_SHORTCODE}` is reserved"
                )));
            }
            if !names.insert(renderer.name.as_str()) {
                bail!(ConfigError::Validation(format!(
                    "duplicate renderer `{}`",
                    renderer.name
                )));
            }
            if renderer.normalized_extensions().is_empty() {
                bail!(ConfigError::Validation(format!(
                    "renderer `{}` must claim at least one extension",
                    renderer.name
                )));
            }
            if let Some(page) = &renderer.page {
                Self::check_command_installed(&format!("[renderers.{}.page]", renderer.name), page)?;
            }
            if let Some(component) = &renderer.component {
                Self::check_command_installed(
                    &format!("[renderers.{}.component]", renderer.name),
                    component,
                )?;
            }
        }

        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        };

        which::which(cmd).with_context(|| format!("`{cmd}` not found. Please install it first."))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_str_full() {
        let config = SiteConfig::from_str(
            r#"
            [build]
            input = "src"

            [serve]
            port = 4000

            [aliases]
            "@components" = "src/_includes/components"

            [[renderers]]
            name = "svelte"
            extensions = ["svelte"]
        "#,
        )
        .unwrap();

        assert_eq!(config.build.input, PathBuf::from("src"));
        assert_eq!(config.serve.port, 4000);
        assert_eq!(
            config.aliases.get("@components"),
            Some(&PathBuf::from("src/_includes/components"))
        );
        assert_eq!(config.renderers[0].name, "svelte");
    }

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(SiteConfig::from_str("[build").is_err());
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        assert!(SiteConfig::from_str("[deploy]\nforce = true").is_err());
    }

    #[test]
    fn test_update_with_cli_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from([
            "isle", "--root", root, "serve", "--output", "dist", "--port", "9000",
        ]);

        let mut config = SiteConfig::default();
        config.aliases.insert("@lib".into(), PathBuf::from("lib"));
        config.update_with_cli(&cli);

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.get_root(), root);
        assert_eq!(config.build.input, root);
        assert_eq!(config.build.output, root.join("dist"));
        assert_eq!(config.aliases["@lib"], root.join("lib"));
        assert_eq!(config.serve.port, 9000);
        assert_eq!(SiteConfig::mode_for(&cli), Mode::Development);
    }

    #[test]
    fn test_mode_for_build() {
        let cli = Cli::parse_from(["isle", "build"]);
        assert_eq!(SiteConfig::mode_for(&cli), Mode::Production);
    }

    #[test]
    fn test_validate_rejects_duplicate_renderers() {
        let mut config = SiteConfig::default();
        config.build.output = PathBuf::from("/site/_site");
        config.build.input = PathBuf::from("/site");
        for _ in 0..2 {
            config.renderers.push(RendererConfig {
                name: "vue".into(),
                extensions: vec!["vue".into()],
                ..Default::default()
            });
        }

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate renderer"));
    }

    #[test]
    fn test_validate_rejects_reserved_name() {
        let mut config = SiteConfig::default();
        config.build.output = PathBuf::from("/site/_site");
        config.renderers.push(RendererConfig {
            name: GENERIC_SHORTCODE.into(),
            extensions: vec!["vue".into()],
            ..Default::default()
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_same_input_output() {
        let mut config = SiteConfig::default();
        config.build.input = PathBuf::from("/site");
        config.build.output = PathBuf::from("/site");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = SiteConfig::default();
        config.build.output = PathBuf::from("/site/_site");
        config.renderers.push(RendererConfig {
            name: "lit".into(),
            extensions: vec!["lit.js".into()],
            component: Some(vec![]),
            ..Default::default()
        });

        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("at least one element"));
    }
}
