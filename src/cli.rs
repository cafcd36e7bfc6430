//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// isle: render framework components into static pages and hydrate them in the browser
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to root
    #[arg(short = 'C', long, default_value = "isle.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared build arguments for Build and Serve commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Input directory containing templates
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// URL prefix for emitted module URLs
    #[arg(long = "pathprefix")]
    pub path_prefix: Option<String>,

    /// Render everything but write nothing
    #[arg(long = "dryrun")]
    pub dry_run: bool,

    /// Skip passthrough copies that are already up to date
    #[arg(long)]
    pub incremental: bool,

    /// Copy every non-template file to the output
    #[arg(long = "passthroughall")]
    pub passthrough_all: bool,

    /// Comma separated template formats, e.g. `md,html`
    #[arg(long, value_delimiter = ',')]
    pub formats: Option<Vec<String>>,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site once for production
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Build for development, serve with request-time hydration and rebuild on change
    Serve {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Interface to bind on
        #[arg(long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

impl Cli {
    pub const fn build_args(&self) -> &BuildArgs {
        match &self.command {
            Commands::Build { build_args } | Commands::Serve { build_args, .. } => build_args,
        }
    }

    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}
