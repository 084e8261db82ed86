//! URL handling for references.
//!
//! Stored reference URLs are absolute, carry an explicit scheme and never end
//! in `/`. Query strings are never part of a stored URL; they are rendered
//! from the parameter map when a request target is resolved.

use url::Url;

use crate::error::{Error, Result};

const DEFAULT_SCHEME: &str = "https://";

/// Normalize caller input into the stored URL form.
///
/// `https://` is prepended only when no `http://` or `https://` scheme is
/// present (in any letter case); all trailing slashes are stripped.
pub fn sanitize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if has_scheme(url) {
        url.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, url)
    }
}

fn has_scheme(url: &str) -> bool {
    ["https://", "http://"].iter().any(|scheme| {
        url.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Append a child segment to a stored URL.
///
/// Surrounding slashes on `segment` are dropped; an empty segment leaves the
/// URL unchanged rather than producing `//`.
pub fn join_child(url: &str, segment: &str) -> String {
    let segment = segment.trim_matches('/');
    if segment.is_empty() {
        url.to_string()
    } else {
        format!("{}/{}", url, segment)
    }
}

/// Keep scheme and authority of `url`, replacing the path with `path`.
pub fn reroot(url: &str, path: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|source| Error::MalformedUrl {
        url: url.to_string(),
        source,
    })?;

    let host = parsed.host_str().ok_or_else(|| Error::MalformedUrl {
        url: url.to_string(),
        source: url::ParseError::EmptyHost,
    })?;

    let mut rerooted = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        rerooted.push_str(&format!(":{}", port));
    }

    let path = path.trim_matches('/');
    if !path.is_empty() {
        rerooted.push('/');
        rerooted.push_str(path);
    }
    Ok(rerooted)
}
