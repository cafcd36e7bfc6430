//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn input() -> PathBuf {
        ".".into()
    }

    pub fn output() -> PathBuf {
        "_site".into()
    }

    pub fn includes() -> PathBuf {
        "_includes".into()
    }

    pub fn path_prefix() -> String {
        "/".into()
    }

    pub fn formats() -> Vec<String> {
        vec!["md".into(), "html".into()]
    }

    pub fn passthrough() -> Vec<PathBuf> {
        vec!["public".into()]
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        8080
    }
}
