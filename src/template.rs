//! Page templates handled by the generator itself.
//!
//! - YAML front matter (`title`, `layout`, `permalink`, anything else)
//! - Markdown through the `markdown` crate, GFM with raw HTML allowed
//! - Layouts from the includes directory with `{{ content }}` / `{{ title }}`
//! - Directory-index output paths: `about.md` → `about/index.html`

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde_json::{Map, Value};
use std::{fs, path::Path, sync::LazyLock};
use thiserror::Error;

static CONTENT_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*content\s*\}\}").expect("valid regex"));

static TITLE_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*title\s*\}\}").expect("valid regex"));

#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("unterminated front matter: expected closing `---`")]
    Unterminated,
    #[error("front matter parse error: {0}")]
    Parse(String),
    #[error("front matter must be a mapping")]
    NotAMapping,
}

/// Front matter as a JSON object and the remaining body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<'a> {
    pub data: Map<String, Value>,
    pub body: &'a str,
}

impl Document<'_> {
    pub fn title(&self) -> Option<&str> {
        self.data.get("title").and_then(Value::as_str)
    }

    pub fn layout(&self) -> Option<&str> {
        self.data.get("layout").and_then(Value::as_str)
    }

    pub fn permalink(&self) -> Option<&str> {
        self.data.get("permalink").and_then(Value::as_str)
    }
}

/// Split `---` fenced YAML from the body. Documents without a fence have no data.
pub fn parse_document(input: &str) -> Result<Document<'_>, FrontMatterError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let Some(rest) = input
        .strip_prefix("---\n")
        .or_else(|| input.strip_prefix("---\r\n"))
    else {
        return Ok(Document {
            data: Map::new(),
            body: input,
        });
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok(Document {
                data: parse_yaml(yaml)?,
                body,
            });
        }
        offset += line.len();
    }
    Err(FrontMatterError::Unterminated)
}

fn parse_yaml(block: &str) -> Result<Map<String, Value>, FrontMatterError> {
    if block.trim().is_empty() {
        return Ok(Map::new());
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(block).map_err(|err| FrontMatterError::Parse(err.to_string()))?;
    match serde_json::to_value(yaml).map_err(|err| FrontMatterError::Parse(err.to_string()))? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        _ => Err(FrontMatterError::NotAMapping),
    }
}

/// Markdown to HTML (GFM, raw HTML passed through).
pub fn render_markdown(body: &str) -> Result<String> {
    let options = markdown::Options {
        parse: markdown::ParseOptions::gfm(),
        compile: markdown::CompileOptions {
            allow_dangerous_html: true,
            ..markdown::CompileOptions::gfm()
        },
    };
    markdown::to_html_with_options(body, &options).map_err(|msg| anyhow!("markdown: {msg}"))
}

/// Read `name` from the includes directory and fill its slots.
pub fn apply_layout(includes: &Path, name: &str, content: &str, title: &str) -> Result<String> {
    let path = includes.join(name);
    let layout = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read layout {}", path.display()))?;
    Ok(fill_layout(&layout, content, title))
}

fn fill_layout(layout: &str, content: &str, title: &str) -> String {
    let titled = TITLE_SLOT.replace_all(layout, regex::NoExpand(&html_escape(title)));
    CONTENT_SLOT
        .replace_all(&titled, regex::NoExpand(content))
        .into_owned()
}

/// Minimal document around a fragment.
pub fn html_shell(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        html_escape(title)
    )
}

/// Whether `html` is already a full document.
pub fn is_document(html: &str) -> bool {
    let head: String = html.trim_start().chars().take(15).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Output path (relative to the output dir) for an input-relative source.
///
/// `index.md` → `index.html`, `blog/post.md` → `blog/post/index.html`.
/// A permalink ending in `/` becomes a directory index; one with a file
/// extension is used verbatim.
pub fn output_rel(source_rel: &str, permalink: Option<&str>) -> String {
    if let Some(link) = permalink {
        let link = link.trim_start_matches('/');
        if link.is_empty() {
            return "index.html".into();
        }
        if link.ends_with('/') {
            return format!("{link}index.html");
        }
        let has_ext = Path::new(link).extension().is_some();
        return if has_ext {
            link.to_owned()
        } else {
            format!("{link}/index.html")
        };
    }

    let stem = source_rel
        .rsplit_once('.')
        .map_or(source_rel, |(stem, _)| stem);
    if stem == "index" || stem.ends_with("/index") {
        format!("{stem}.html")
    } else {
        format!("{stem}/index.html")
    }
}

/// Public URL for an output-relative path: `about/index.html` → `/about/`.
pub fn url_for(output_rel: &str) -> String {
    if output_rel == "index.html" {
        "/".into()
    } else if let Some(dir) = output_rel.strip_suffix("/index.html") {
        format!("/{dir}/")
    } else {
        format!("/{output_rel}")
    }
}
