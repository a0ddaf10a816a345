//! Utility functions for link processing.
//!
//! Links are never rejected up front: whatever a client sends is probed, and
//! a link that cannot name a host simply comes back `not available`.

/// Add an `https://` scheme to links given without one.
///
/// `example.com/path` becomes `https://example.com/path`; links that already
/// carry `http://` or `https://` are returned trimmed but otherwise unchanged.
pub fn normalize_url(link: &str) -> String {
    let link = link.trim();
    if has_http_scheme(link) {
        link.to_string()
    } else {
        format!("https://{}", link)
    }
}

fn has_http_scheme(link: &str) -> bool {
    let lower = link.get(..8).unwrap_or(link).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  example.com/a "), "https://example.com/a");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url("HTTPS://Example.com"), "HTTPS://Example.com");
    }

    #[test]
    fn test_normalize_url_keeps_bad_links_probeable() {
        assert_eq!(normalize_url(""), "https://");
        assert_eq!(normalize_url("bad link"), "https://bad link");
    }
}
