//! Component shortcodes.
//!
//! Every renderer with a component capability gets a shortcode named after
//! it, and the generic `component` shortcode picks the renderer from the
//! file extension:
//!
//! ```text
//! {% svelte "Counter.svelte" count=1 hydrate="eager" %}
//! {% component "@ui/Button.jsx" label="Go" hydrate="visible" %}
//! ```
//!
//! The first argument is the component path: an import alias, a path
//! relative to the page (`./x.jsx`) or a path inside the includes directory.
//! Other arguments are `key=value` props whose values are JSON literals;
//! bare words that are not JSON become strings. `hydrate` is reserved for the
//! hydration strategy. Unknown shortcode names are left in place.

use super::RenderContext;
use crate::{
    config::GENERIC_SHORTCODE,
    renderer::{ComponentInput, RenderError},
    store::{Hydrate, IdMinter},
};
use anyhow::Result;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::{path::Path, sync::LazyLock};
use thiserror::Error;

static SHORTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{%-?\s*([A-Za-z_][\w-]*)\s+(.*?)\s*-?%\}").expect("valid regex")
});

static FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--isle-fragment-(\d+)-->").expect("valid regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortcodeError {
    #[error("`{shortcode}` shortcode needs a component path as its first argument")]
    MissingComponent { shortcode: String },

    #[error("malformed `{shortcode}` shortcode: {reason}")]
    Malformed { shortcode: String, reason: String },

    #[error("unknown hydration strategy `{0}` (expected none, eager, lazy or idle)")]
    InvalidHydrate(String),
}

/// Parsed shortcode arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortcodeArgs {
    pub component: String,
    pub props: Map<String, Value>,
    pub hydrate: Hydrate,
}

/// Shortcode names bound for one build.
#[derive(Debug, Clone)]
pub struct ShortcodeSet {
    names: Vec<String>,
}

impl ShortcodeSet {
    /// One shortcode per component-capable renderer, plus the generic one.
    pub fn bind(ctx: &RenderContext<'_>) -> Self {
        let mut names: Vec<String> = ctx
            .registry
            .iter()
            .filter(|r| r.component.is_some())
            .map(|r| r.name.clone())
            .collect();
        names.push(GENERIC_SHORTCODE.to_owned());
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Render every bound shortcode in `content`.
    ///
    /// The first renderer or argument error fails the whole call, and with
    /// it the page being built.
    pub fn expand(
        &self,
        ctx: &RenderContext<'_>,
        content: &str,
        source: &Path,
        minter: &IdMinter,
    ) -> Result<String> {
        let (text, fragments) = self.expand_deferred(ctx, content, source, minter)?;
        Ok(restore_fragments(&text, &fragments))
    }

    /// Like [`expand`](Self::expand), but leaves `<!--isle-fragment-N-->`
    /// placeholders so markup survives a markdown pass untouched.
    pub fn expand_deferred(
        &self,
        ctx: &RenderContext<'_>,
        content: &str,
        source: &Path,
        minter: &IdMinter,
    ) -> Result<(String, Vec<String>)> {
        let mut out = String::with_capacity(content.len());
        let mut fragments = Vec::new();
        let mut last = 0;

        for caps in SHORTCODE.captures_iter(content) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !self.contains(name.as_str()) {
                continue;
            }
            out.push_str(&content[last..whole.start()]);
            out.push_str(&format!("<!--isle-fragment-{}-->", fragments.len()));
            fragments.push(self.render_one(ctx, &caps, source, minter)?);
            last = whole.end();
        }

        out.push_str(&content[last..]);
        Ok((out, fragments))
    }

    fn render_one(
        &self,
        ctx: &RenderContext<'_>,
        caps: &Captures<'_>,
        source: &Path,
        minter: &IdMinter,
    ) -> Result<String> {
        let name = &caps[1];
        let args = parse_args(name, caps.get(2).map_or("", |m| m.as_str()))?;
        let module = ctx.bundler.resolve_import(&args.component, source)?;

        let renderer = if name == GENERIC_SHORTCODE {
            let ext = module
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            ctx.registry
                .for_extension(ext)
                .ok_or_else(|| RenderError::UnknownExtension(ext.to_owned()))?
        } else {
            ctx.registry
                .by_name(name)
                .ok_or_else(|| RenderError::UnknownExtension(name.to_owned()))?
        };
        let component = renderer
            .component
            .as_ref()
            .ok_or_else(|| RenderError::MissingCapability {
                renderer: renderer.name.clone(),
                capability: "component",
            })?;

        let props = Value::Object(args.props);
        let html = component.render_component(&ComponentInput {
            component: &module,
            props: &props,
            hydrate: args.hydrate,
            aliases: ctx.aliases,
        })?;

        let id = minter.next_id();
        Ok(ctx.anchor(&id, &renderer.name, &module, props, args.hydrate, html))
    }
}

/// Swap placeholders left by [`ShortcodeSet::expand_deferred`] for their markup.
pub fn restore_fragments(text: &str, fragments: &[String]) -> String {
    if fragments.is_empty() {
        return text.to_owned();
    }
    FRAGMENT
        .replace_all(text, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| fragments.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

/// Parse `"path" key=value ...`.
pub fn parse_args(shortcode: &str, input: &str) -> Result<ShortcodeArgs, ShortcodeError> {
    let malformed = |reason: &str| ShortcodeError::Malformed {
        shortcode: shortcode.to_owned(),
        reason: reason.to_owned(),
    };

    let mut scanner = Scanner::new(input);
    let mut component = None;
    let mut props = Map::new();
    let mut hydrate = Hydrate::None;

    while let Some(c) = scanner.skip_whitespace() {
        if c == '"' || c == '\'' {
            let text = scanner.quoted().map_err(|r| malformed(&r))?;
            if component.replace(text).is_some() {
                return Err(malformed("only the component path may be positional"));
            }
            continue;
        }

        let key = scanner.take_while(|c| c != '=' && !c.is_whitespace());
        if key.is_empty() || scanner.peek() != Some('=') {
            return Err(malformed(&format!("expected `{key}=value`")));
        }
        scanner.bump();
        let value = scanner.value().map_err(|r| malformed(&r))?;

        if key == "hydrate" {
            let text = value.as_str().unwrap_or_default();
            hydrate = Hydrate::parse(text).ok_or_else(|| ShortcodeError::InvalidHydrate(text.to_owned()))?;
        } else {
            props.insert(key, value);
        }
    }

    let component = component.ok_or_else(|| ShortcodeError::MissingComponent {
        shortcode: shortcode.to_owned(),
    })?;
    Ok(ShortcodeArgs {
        component,
        props,
        hydrate,
    })
}

/// Character cursor over shortcode arguments.
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) -> Option<char> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.peek()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        self.input[start..self.pos].to_owned()
    }

    /// A `"..."` string with JSON escapes, or a raw `'...'` string.
    fn quoted(&mut self) -> Result<String, String> {
        let start = self.pos;
        let Some(quote) = self.bump() else {
            return Err("expected a string".into());
        };
        let mut escaped = false;
        while let Some(c) = self.bump() {
            match c {
                '\\' if !escaped => escaped = true,
                c if c == quote && !escaped => {
                    let raw = &self.input[start..self.pos];
                    return if quote == '"' {
                        serde_json::from_str(raw).map_err(|e| e.to_string())
                    } else {
                        Ok(raw[1..raw.len() - 1].to_owned())
                    };
                }
                _ => escaped = false,
            }
        }
        Err("unterminated string".into())
    }

    /// A JSON literal, a quoted string, or a bare word.
    fn value(&mut self) -> Result<Value, String> {
        match self.peek() {
            Some('"' | '\'') => self.quoted().map(Value::String),
            Some('[' | '{') => {
                let raw = self.balanced()?;
                serde_json::from_str(raw).map_err(|e| e.to_string())
            }
            Some(c) if !c.is_whitespace() => {
                let word = self.take_while(|c| !c.is_whitespace());
                Ok(serde_json::from_str(&word).unwrap_or(Value::String(word)))
            }
            _ => Err("missing value".into()),
        }
    }

    /// Text up to the bracket closing the one under the cursor.
    fn balanced(&mut self) -> Result<&'a str, String> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        while let Some(c) = self.bump() {
            if in_string {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => in_string = false,
                    _ => escaped = false,
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '[' | '{' => depth += 1,
                ']' | '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(&self.input[start..self.pos]);
                    }
                }
                _ => {}
            }
        }
        Err("unbalanced brackets".into())
    }
}
