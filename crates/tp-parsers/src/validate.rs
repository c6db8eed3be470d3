//! Link target checks.

use url::Url;

const UNSAFE_SCHEMES: &[&str] = &["javascript", "vbscript", "data"];

/// Whether `href` is an absolute URL that is safe to link to.
pub fn is_valid_url(href: &str) -> bool {
    Url::parse(href.trim()).is_ok_and(|url| !UNSAFE_SCHEMES.contains(&url.scheme()))
}
