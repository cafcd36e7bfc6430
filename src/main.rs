//! isle - server-render framework components into static pages and hydrate
//! them as islands in the browser.

mod binder;
mod build;
mod bundler;
mod cli;
mod config;
mod extensions;
mod logger;
mod middleware;
mod renderer;
mod serve;
mod store;
mod template;
mod transform;
mod utils;
mod watch;

use anyhow::Result;
use build::Site;
use clap::Parser;
use cli::Cli;
use config::{Mode, SiteConfig};
use std::sync::Arc;

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        log!("fatal"; "{info}");
        std::process::exit(1);
    }));

    let cli = Cli::parse();
    logger::set_quiet(cli.build_args().quiet);

    let config = load_config(&cli)?;
    let mode = SiteConfig::mode_for(&cli);
    let site = Arc::new(Site::new(config, mode));

    match site.mode() {
        Mode::Production => site.build().map(|_| ()),
        Mode::Development => serve_site(&site),
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let config = SiteConfig::load(cli)?;
    config.validate()?;
    Ok(config)
}

/// First build starts the dev server; the watcher rebuilds on change.
fn serve_site(site: &Arc<Site>) -> Result<()> {
    site.build()?;

    if site.config().serve.watch {
        let watched = Arc::clone(site);
        std::thread::Builder::new()
            .name("isle-watch".into())
            .spawn(move || {
                if let Err(e) = watch::watch_for_changes_blocking(&watched) {
                    log!("watch"; "{e:#}");
                }
            })?;
    }

    site.wait_for_server();
    Ok(())
}
