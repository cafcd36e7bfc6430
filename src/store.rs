//! Build-scoped component attribute storage.
//!
//! Rendering records one entry per component instance; the HTML transform
//! reads them back to emit hydration scripts. The store is owned by the build
//! orchestrator and handed to every render by reference.
//!
//! ```text
//! on_before_build ──► clear()
//! shortcode / page render ──► set(id, attrs)     (parallel, distinct ids)
//! html transform ──► get(id)                     (after all renders)
//! ```

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

/// When a server-rendered instance is hydrated in the browser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hydrate {
    /// Static markup, no client script.
    #[default]
    None,
    /// Mount as soon as the module loads.
    #[serde(alias = "load")]
    Eager,
    /// Mount when the anchor scrolls into view.
    #[serde(alias = "visible")]
    Lazy,
    /// Mount once the browser is idle.
    Idle,
}

impl Hydrate {
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Parse a shortcode or front-matter value, accepting aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "static" => Some(Self::None),
            "eager" | "load" => Some(Self::Eager),
            "lazy" | "visible" => Some(Self::Lazy),
            "idle" => Some(Self::Idle),
            _ => None,
        }
    }
}

/// Hydration metadata for one rendered instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentAttrs {
    /// Name of the renderer that produced the markup.
    pub renderer: String,
    /// URL the browser imports the component module from.
    pub component: String,
    pub props: Value,
    pub hydrate: Hydrate,
    /// Server-rendered markup wrapped by the anchor element.
    pub anchor: String,
}

/// Instance id → attributes, cleared at the start of every build.
#[derive(Debug, Default)]
pub struct ComponentAttrStore {
    entries: RwLock<FxHashMap<String, ComponentAttrs>>,
}

impl ComponentAttrStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard every entry. Called once per build before rendering starts.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Record or overwrite the entry for `id`.
    pub fn set(&self, id: impl Into<String>, attrs: ComponentAttrs) {
        self.entries.write().insert(id.into(), attrs);
    }

    pub fn get(&self, id: &str) -> Option<ComponentAttrs> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Hex digits of the source hash kept in every id.
const ID_PREFIX_LEN: usize = 16;

/// Mints instance ids for one source file.
///
/// Ids are `<prefix>-<n>` where the prefix is the first 16 hex digits of the
/// blake3 hash of the source path, so rebuilds of an unchanged page produce
/// the same ids.
#[derive(Debug)]
pub struct IdMinter {
    prefix: String,
    next: AtomicUsize,
}

impl IdMinter {
    pub fn new(source_key: &str) -> Self {
        let hash = blake3::hash(source_key.as_bytes()).to_hex();
        Self {
            prefix: hash.as_str()[..ID_PREFIX_LEN].to_owned(),
            next: AtomicUsize::new(0),
        }
    }

    /// Fresh id for the next inline component.
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }

    /// Id of the page-level root.
    pub fn page_id(&self) -> String {
        format!("{}-page", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(renderer: &str) -> ComponentAttrs {
        ComponentAttrs {
            renderer: renderer.into(),
            component: "/_includes/Counter.svelte".into(),
            props: json!({ "count": 1 }),
            hydrate: Hydrate::Eager,
            anchor: "<button>1</button>".into(),
        }
    }

    #[test]
    fn test_set_get_overwrite() {
        let store = ComponentAttrStore::new();
        store.set("a-0", attrs("svelte"));
        assert_eq!(store.get("a-0").unwrap().renderer, "svelte");

        store.set("a-0", attrs("preact"));
        assert_eq!(store.get("a-0").unwrap().renderer, "preact");
        assert_eq!(store.len(), 1);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_empty_after_clear() {
        let store = ComponentAttrStore::new();
        store.set("a-0", attrs("svelte"));
        store.set("a-1", attrs("svelte"));
        store.clear();
        assert!(store.is_empty());
        assert!(store.get("a-0").is_none());
    }

    #[test]
    fn test_concurrent_writes_distinct_keys() {
        use rayon::prelude::*;
        let store = ComponentAttrStore::new();
        (0..64).into_par_iter().for_each(|i| store.set(format!("id-{i}"), attrs("svelte")));
        assert_eq!(store.len(), 64);
    }

    #[test]
    fn test_hydrate_serde_aliases() {
        let h: Hydrate = serde_json::from_str("\"visible\"").unwrap();
        assert_eq!(h, Hydrate::Lazy);
        let h: Hydrate = serde_json::from_str("\"load\"").unwrap();
        assert_eq!(h, Hydrate::Eager);
        assert_eq!(serde_json::to_string(&Hydrate::Idle).unwrap(), "\"idle\"");
        assert!(Hydrate::default().is_none());
    }

    #[test]
    fn test_hydrate_parse() {
        assert_eq!(Hydrate::parse("Eager"), Some(Hydrate::Eager));
        assert_eq!(Hydrate::parse("visible"), Some(Hydrate::Lazy));
        assert_eq!(Hydrate::parse("static"), Some(Hydrate::None));
        assert_eq!(Hydrate::parse("soon"), None);
    }

    #[test]
    fn test_id_minter_is_deterministic() {
        let a = IdMinter::new("blog/post.md");
        let b = IdMinter::new("blog/post.md");
        assert_eq!(a.next_id(), b.next_id());

        let first = a.next_id();
        assert!(first.ends_with("-1"));
        let (prefix, n) = first.rsplit_once('-').unwrap();
        assert_eq!(n, "1");
        assert_eq!(prefix.len(), 16);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(a.page_id().ends_with("-page"));
        assert_ne!(IdMinter::new("other.md").page_id(), a.page_id());
    }
}
