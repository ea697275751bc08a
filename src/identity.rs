//! Content identity: canonical locators and their stable hashes.
//!
//! A record's identity is the SHA-256 of its canonical locator, so the same
//! article fetched through different tracking links, fragments or runs always
//! lands on the same key.

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Empty locator")]
    Empty,
    #[error("Unparseable locator '{0}'")]
    Malformed(String),
}

/// Canonicalize a locator by dropping its query string and fragment.
///
/// Absolute URLs are parsed and re-serialized (which also lowercases the
/// scheme and host). Anything else is treated as an opaque id and cut at the
/// first `?` or `#`.
pub fn canonicalize(locator: &str) -> Result<String, IdentityError> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::Empty);
    }

    match Url::parse(trimmed) {
        Ok(mut url) => {
            if url.cannot_be_a_base() && url.scheme() != "urn" {
                return Err(IdentityError::Malformed(trimmed.to_string()));
            }
            url.set_query(None);
            url.set_fragment(None);
            Ok(url.to_string())
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            if trimmed.chars().any(char::is_whitespace) {
                return Err(IdentityError::Malformed(trimmed.to_string()));
            }
            let opaque = trimmed
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string();
            if opaque.is_empty() {
                Err(IdentityError::Malformed(trimmed.to_string()))
            } else {
                Ok(opaque)
            }
        }
        Err(_) => Err(IdentityError::Malformed(trimmed.to_string())),
    }
}

/// Compute SHA-256 hex of a canonical form.
pub fn hash_canonical(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a record identity from its locator, if it has a usable one.
pub fn identity(locator: &str) -> Option<String> {
    canonicalize(locator).ok().map(|c| hash_canonical(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query_and_fragment() {
        let base = "https://example.com/news/story";
        assert_eq!(identity(base), identity("https://example.com/news/story?a=1"));
        assert_eq!(identity(base), identity("https://example.com/news/story#frag"));
        assert_eq!(
            identity(base),
            identity("https://example.com/news/story?utm_source=x&utm_medium=y#top")
        );
    }

    #[test]
    fn identity_of_canonical_form_is_stable() {
        let urls = [
            "https://Example.com/a/b?x=1",
            "http://news.example.org/path#section",
            "https://example.com/",
            "video-abc123",
        ];
        for u in urls {
            let canonical = canonicalize(u).unwrap();
            assert_eq!(identity(u), identity(&canonical), "locator {}", u);
        }
    }

    #[test]
    fn host_case_is_normalized() {
        assert_eq!(
            identity("https://EXAMPLE.com/a"),
            identity("https://example.com/a")
        );
    }

    #[test]
    fn different_paths_differ() {
        assert_ne!(
            identity("https://example.com/a"),
            identity("https://example.com/b")
        );
    }

    #[test]
    fn identity_is_sha256_hex() {
        let id = identity("https://example.com/a").unwrap();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn missing_or_malformed_locator_has_no_identity() {
        assert_eq!(identity(""), None);
        assert_eq!(identity("   "), None);
        assert_eq!(identity("not a url"), None);
        assert_eq!(identity("?only=query"), None);
        assert_eq!(canonicalize(""), Err(IdentityError::Empty));
    }

    #[test]
    fn opaque_ids_are_cut_at_query() {
        assert_eq!(canonicalize("dQw4w9WgXcQ?t=10").unwrap(), "dQw4w9WgXcQ");
    }
}
