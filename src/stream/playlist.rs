//! HLS playlist rewriting for the stream proxy.
//!
//! Manifests served through the proxy are moved to a different origin, so any
//! relative entry would resolve against the proxy instead of the CDN. Every
//! media line and tag `URI` is resolved against the manifest's own URL.

use reqwest::Url;
use std::borrow::Cow;

const URI_ATTR: &str = "URI=\"";

pub fn is_playlist_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("mpegurl")
}

/// Rewrite relative entries of an M3U8 body into absolute URLs.
///
/// Lines starting with `/` resolve against the manifest origin, any other
/// relative line against the manifest directory. Comments and blank lines are
/// copied as-is, except for quoted `URI` attributes inside tags. Line endings
/// are preserved.
pub fn rewrite_playlist(content: &str, manifest_url: &Url) -> String {
    let mut out = String::with_capacity(content.len() + content.len() / 4);
    for raw in content.split_inclusive('\n') {
        let (line, ending) = split_line_ending(raw);
        if line.trim().is_empty() {
            out.push_str(raw);
            continue;
        }
        if line.starts_with('#') {
            out.push_str(&rewrite_tag_uris(line, manifest_url));
        } else {
            out.push_str(&resolve_entry(line, manifest_url));
        }
        out.push_str(ending);
    }
    out
}

fn split_line_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

fn resolve_entry<'a>(entry: &'a str, base: &Url) -> Cow<'a, str> {
    let trimmed = entry.trim();
    if trimmed.is_empty() || Url::parse(trimmed).is_ok() {
        return Cow::Borrowed(entry);
    }
    match base.join(trimmed) {
        Ok(resolved) => Cow::Owned(resolved.to_string()),
        Err(_) => Cow::Borrowed(entry),
    }
}

fn rewrite_tag_uris(line: &str, base: &Url) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find(URI_ATTR) {
        let value_start = pos + URI_ATTR.len();
        let Some(len) = rest[value_start..].find('"') else {
            break;
        };
        out.push_str(&rest[..value_start]);
        out.push_str(&resolve_entry(&rest[value_start..value_start + len], base));
        rest = &rest[value_start + len..];
    }
    out.push_str(rest);
    out
}
