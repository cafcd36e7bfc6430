//! HTML minification for production output.

/// Minify an HTML document.
///
/// Closing tags and the `<html>`/`<head>` openers are kept so the hydration
/// transform can still find its insertion points if the page is processed again.
pub fn minify_html(html: &[u8]) -> Vec<u8> {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = false;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    minify_html::minify(html, &cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_removes_whitespace_and_comments() {
        let html = b"<html>\n  <head></head>\n  <body>\n    <!-- note -->\n    <p>Hi</p>\n  </body>\n</html>";
        let out = String::from_utf8(minify_html(html)).unwrap();
        assert!(!out.contains("<!-- note -->"));
        assert!(out.contains("<p>Hi</p>"));
        assert!(out.len() < html.len());
    }

    #[test]
    fn test_minify_keeps_closing_body() {
        let out = String::from_utf8(minify_html(b"<html><head></head><body><p>x</p></body></html>")).unwrap();
        assert!(out.contains("</body>"));
    }
}
