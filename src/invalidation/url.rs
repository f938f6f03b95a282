//! URL normalization for purge paths.

use url::Url;

/// Reduce an address to its site-relative form.
///
/// Absolute URLs lose scheme and host; a query string is re-attached with an
/// explicit `?`. Anything that does not parse as an absolute URL (already
/// site-relative paths, malformed text) passes through unchanged.
pub fn site_relative(address: &str) -> String {
    match Url::parse(address) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{query}", parsed.path()),
            None => parsed.path().to_string(),
        },
        Err(_) => address.to_string(),
    }
}

/// Every form of an address that must be purged for the address itself: the
/// site-relative form, then the form with trailing slashes stripped.
///
/// The root path yields a single entry. A path that already has no trailing
/// slash yields two identical entries; the final queue dedup collapses them.
pub fn variants(address: &str) -> Vec<String> {
    let relative = site_relative(address);
    if relative == "/" {
        return vec![relative];
    }
    let stripped = relative.trim_end_matches('/').to_string();
    vec![relative, stripped]
}
