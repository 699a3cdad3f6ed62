//! Domain detection and registrable-domain extraction for app search terms
//!
//! Operators paste either an app name ("Zoom") or a URL
//! ("https://us02web.zoom.us/j/123"). URLs are reduced to the registrable
//! label ("zoom") so they match the app's canonical domain.

use url::Url;

/// Search terms containing `http` are treated as URLs.
pub fn is_domain(term: &str) -> bool {
    term.contains("http")
}

fn host_of(term: &str) -> Option<String> {
    let candidate = term.trim();
    let parsed = Url::parse(candidate)
        .ok()
        .or_else(|| Url::parse(&format!("https://{candidate}")).ok())?;
    parsed.host_str().map(|h| h.trim_end_matches('.').to_ascii_lowercase())
}

/// The registrable label of a URL or host: `https://app.zoom.us` -> `zoom`,
/// `https://www.bbc.co.uk/news` -> `bbc`. Suffixes come from the public
/// suffix list. Returns `None` when no host can be parsed or the host is a
/// bare suffix.
pub fn registrable_label(term: &str) -> Option<String> {
    let host = host_of(term)?;
    if !host.contains('.') {
        return (!host.is_empty()).then_some(host);
    }
    let registrable = psl::domain_str(&host)?;
    let suffix = psl::suffix_str(registrable)?;
    let label = registrable.strip_suffix(suffix)?.trim_end_matches('.');
    (!label.is_empty()).then(|| label.to_string())
}

/// Normalises a search term: URLs become their registrable label, anything
/// else is returned trimmed.
pub fn search_term(term: &str) -> String {
    if is_domain(term) {
        if let Some(label) = registrable_label(term) {
            return label;
        }
    }
    term.trim().to_string()
}
