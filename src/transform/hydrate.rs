//! Hydration script injection.
//!
//! [`inject`] is a pure function of the page markup and two lookups, so the
//! dev middleware and the production write path share it unchanged.
//!
//! Each hydrated instance gets one module script marked with
//! `data-isle-for="<id>"`. Ids that already have a marked script are skipped,
//! which makes a second pass over transformed markup a no-op.

use crate::store::{ComponentAttrs, Hydrate};
use regex::Regex;
use std::sync::LazyLock;

/// Custom element wrapping every server-rendered instance.
pub const ROOT_TAG: &str = "isle-root";

const HEAD_STYLE: &str = "<style data-isle-head>isle-root{display:contents}</style>";
const HEAD_MARKER: &str = "data-isle-head";

/// Attribute values may lose their quotes after minification.
static ROOT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<isle-root\b[^>]*?\bdata-isle-id=(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});

static SCRIPT_GUARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script\b[^>]*?\bdata-isle-for=(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});

static HEAD_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</head\s*>").expect("valid regex"));

static BODY_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("valid regex"));

/// Why an instance was left static.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    /// No store entry for the id.
    MissingAttrs { id: String },
    /// The renderer has no client module to hydrate with.
    NoClient { id: String, renderer: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub html: String,
    /// Number of scripts added by this pass.
    pub injected: usize,
    pub skipped: Vec<Skipped>,
}

/// Instance ids in document order, without duplicates.
pub fn instance_ids(html: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in captured(&ROOT_ID, html) {
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_owned());
        }
    }
    ids
}

/// Add hydration scripts for every instance in `html`.
///
/// `attrs` looks up the store entry for an id; `client` maps a renderer name
/// to its browser adapter module.
pub fn inject(
    html: &str,
    attrs: impl Fn(&str) -> Option<ComponentAttrs>,
    client: impl Fn(&str) -> Option<String>,
) -> Injection {
    let ids = instance_ids(html);
    if ids.is_empty() {
        return Injection {
            html: html.to_owned(),
            injected: 0,
            skipped: Vec::new(),
        };
    }

    let guarded: Vec<&str> = captured(&SCRIPT_GUARD, html).collect();
    let mut scripts = String::new();
    let mut injected = 0;
    let mut skipped = Vec::new();

    for id in ids.iter().filter(|id| !guarded.contains(&id.as_str())) {
        let Some(entry) = attrs(id) else {
            skipped.push(Skipped::MissingAttrs { id: id.clone() });
            continue;
        };
        if entry.hydrate.is_none() {
            continue;
        }
        let Some(client_url) = client(&entry.renderer) else {
            skipped.push(Skipped::NoClient {
                id: id.clone(),
                renderer: entry.renderer,
            });
            continue;
        };
        scripts.push_str(&hydration_script(id, &entry, &client_url));
        injected += 1;
    }

    let mut out = html.to_owned();
    if injected > 0 {
        out = insert_before_last(&out, &BODY_CLOSE, &scripts);
    }
    if !out.contains(HEAD_MARKER) {
        out = insert_before_first(&out, &HEAD_CLOSE, HEAD_STYLE);
    }

    Injection {
        html: out,
        injected,
        skipped,
    }
}

/// First non-empty capture group of every match.
fn captured<'h>(re: &'h Regex, html: &'h str) -> impl Iterator<Item = &'h str> + 'h {
    re.captures_iter(html).filter_map(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str())
    })
}

/// Insert before the last match, or append when there is none.
fn insert_before_last(html: &str, re: &Regex, insert: &str) -> String {
    match re.find_iter(html).last() {
        Some(m) => format!("{}{insert}{}", &html[..m.start()], &html[m.start()..]),
        None => format!("{html}{insert}"),
    }
}

/// Insert before the first match, or prepend when there is none.
fn insert_before_first(html: &str, re: &Regex, insert: &str) -> String {
    match re.find(html) {
        Some(m) => format!("{}{insert}{}", &html[..m.start()], &html[m.start()..]),
        None => format!("{insert}{html}"),
    }
}

/// JSON string literal that is safe inside a `<script>` element.
fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string().replace('<', "\\u003c")
}

fn hydration_script(id: &str, attrs: &ComponentAttrs, client_url: &str) -> String {
    let props = attrs.props.to_string().replace('<', "\\u003c");
    let selector = js_string(&format!("{ROOT_TAG}[data-isle-id=\"{id}\"]"));
    let schedule = match attrs.hydrate {
        Hydrate::Eager | Hydrate::None => "mount();",
        Hydrate::Idle => {
            "if (\"requestIdleCallback\" in window) requestIdleCallback(mount); else setTimeout(mount, 200);"
        }
        // display:contents roots have no box, so observe the first child
        Hydrate::Lazy => {
            "new IntersectionObserver((entries, observer) => { if (entries.some((e) => e.isIntersecting)) { observer.disconnect(); mount(); } }).observe(target.firstElementChild ?? target);"
        }
    };

    format!(
        concat!(
            "<script type=\"module\" data-isle-for=\"{id}\">",
            "const target = document.querySelector({selector});",
            "const props = {props};",
            "const mount = async () => {{",
            "const [{{ default: hydrate }}, {{ default: Component }}] = await Promise.all([import({client}), import({component})]);",
            "hydrate(target, Component, props);",
            "}};",
            "if (target) {{ {schedule} }}",
            "</script>"
        ),
        id = id,
        selector = selector,
        props = props,
        client = js_string(client_url),
        component = js_string(&attrs.component),
        schedule = schedule,
    )
}
