//! File system watcher for live rebuilds.
//!
//! Monitors the input directory, the includes directory and the config file.
//! Every batch of changes triggers one full rebuild through [`Site::build`],
//! which refreshes the attribute store and the URL map; the running dev
//! server picks the new pages up on the next request.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌─────────────────────┐
//! │ notify   │───▶│ Debouncer│───▶│  handle_changes()   │
//! │ events   │    │ (300ms)  │    │  → Site::build()    │
//! └──────────┘    └──────────┘    └─────────────────────┘
//! ```

use crate::{build::Site, log};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// `/proj/src/blog/post.md` → `blog/post.md`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    output: PathBuf,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debouncer {
    fn new(output: PathBuf) -> Self {
        Self {
            output,
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    /// Queue the event's paths. Our own writes to the output dir are dropped.
    fn add(&mut self, event: Event) {
        let before = self.pending.len();
        for path in event.paths {
            if !is_temp_file(&path) && !path.starts_with(&self.output) {
                self.pending.insert(path);
            }
        }
        if self.pending.len() > before {
            self.last_event = Some(Instant::now());
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Rebuild after a batch of changes. Returns true if the build succeeded.
fn handle_changes(paths: &[PathBuf], site: &Site) -> bool {
    if paths.is_empty() {
        return false;
    }

    let config = site.config();
    let root = config.get_root();

    if paths.iter().any(|p| *p == config.config_path) {
        log!("watch"; "config changed, restart `isle serve` to apply it");
    }

    let trigger = match paths {
        [one] => rel_path(one, root),
        [first, rest @ ..] => format!("{} and {} more", rel_path(first, root), rest.len()),
        [] => String::new(),
    };
    log!("watch"; "{trigger} changed, rebuilding...");

    match site.build() {
        Ok(_) => {
            eprintln!(); // Blank line to separate rebuild sessions
            true
        }
        Err(e) => {
            log!("watch"; "build failed ({trigger})");
            log!("watch"; "{e:#}");
            eprintln!();
            false
        }
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

/// Directories and files to watch, with their recursion mode.
fn watch_targets(site: &Site) -> Vec<(PathBuf, RecursiveMode)> {
    let config = site.config();
    let build = &config.build;
    let includes = build.includes_dir();

    let mut targets = vec![(build.input.clone(), RecursiveMode::Recursive)];
    if !includes.starts_with(&build.input) {
        targets.push((includes, RecursiveMode::Recursive));
    }
    if !config.config_path.starts_with(&build.input) {
        targets.push((config.config_path.clone(), RecursiveMode::NonRecursive));
    }
    targets.retain(|(path, _)| path.exists());
    targets
}

fn setup_watchers(watcher: &mut impl Watcher, site: &Site) -> Result<()> {
    let root = site.config().get_root();
    let mut watched = Vec::new();

    for (path, mode) in watch_targets(site) {
        watcher
            .watch(&path, mode)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        watched.push(rel_path(&path, root));
    }

    log!("watch"; "{}", watched.join(", "));
    eprintln!(); // Blank line to separate init logs from change events
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
pub fn watch_for_changes_blocking(site: &Arc<Site>) -> Result<()> {
    if !site.config().serve.watch {
        return Ok(());
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, site)?;

    let mut debouncer = Debouncer::new(site.config().build.output.clone());

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) && !debouncer.in_cooldown() => {
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                if handle_changes(&debouncer.take(), site) {
                    debouncer.mark_rebuild();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            _ => {}
        }
    }

    Ok(())
}
