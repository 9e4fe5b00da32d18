//! Host masking for diagnostics.
//!
//! Node hosts can identify a user's own infrastructure, so logs carry a
//! short hash-derived label instead of the host itself.

use std::error::Error;

use regex::RegexBuilder;
use sha2::{Digest, Sha256};

/// Placeholder substituted for the host in sanitized messages.
pub const HOST_PLACEHOLDER: &str = "[host]";

/// Shortest first DNS label that is masked on its own.
const MIN_MASKED_LABEL_LEN: usize = 4;

/// Masked form of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedHost {
    /// Short label: the first 6 hex chars of the hash, an ellipsis and the
    /// host's last 4 characters.
    pub label: String,
    /// Full lower-case SHA-256 hex digest of the host.
    pub hash: String,
}

/// Masks `host` for logging. Returns `None` for a blank host.
#[must_use]
pub fn mask_host(host: &str) -> Option<MaskedHost> {
    if host.trim().is_empty() {
        return None;
    }
    let hash = hex::encode(Sha256::digest(host.as_bytes()));
    let chars: Vec<char> = host.chars().collect();
    let suffix: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    Some(MaskedHost {
        label: format!("{}…{}", &hash[..6], suffix),
        hash,
    })
}

/// Replaces `host` in `message` with [`HOST_PLACEHOLDER`], ignoring case.
///
/// The host's first DNS label is replaced too when it is distinctive:
/// at least four characters and not numeric, so `192.168.1.10` or
/// `a.example` leave unrelated text alone.
#[must_use]
pub fn sanitize_message(message: &str, host: Option<&str>) -> String {
    let message = message.trim();
    let Some(host) = host.filter(|h| !h.trim().is_empty()) else {
        return message.to_string();
    };
    let first_label = host
        .split('.')
        .next()
        .filter(|label| {
            label.chars().count() >= MIN_MASKED_LABEL_LEN
                && !label.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or_default();
    [host, first_label]
        .iter()
        .filter(|needle| !needle.is_empty())
        .fold(message.to_string(), |text, needle| {
            match RegexBuilder::new(&regex::escape(needle))
                .case_insensitive(true)
                .build()
            {
                Ok(pattern) => pattern.replace_all(&text, HOST_PLACEHOLDER).into_owned(),
                Err(_) => text,
            }
        })
}

/// The innermost error in `error`'s source chain.
#[must_use]
pub fn root_cause<'a>(error: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_host_label_shape() {
        let masked = mask_host("electrum.example.com").unwrap();
        assert_eq!(masked.hash.len(), 64);
        assert!(masked.label.starts_with(&masked.hash[..6]));
        assert!(masked.label.ends_with(".com"));
        assert!(!masked.label.contains("electrum"));
    }

    #[test]
    fn mask_host_is_deterministic() {
        assert_eq!(mask_host("node.local"), mask_host("node.local"));
        assert_ne!(
            mask_host("node.local").unwrap().hash,
            mask_host("node.lan").unwrap().hash
        );
    }

    #[test]
    fn mask_blank_host() {
        assert!(mask_host("  ").is_none());
    }

    #[test]
    fn mask_short_host() {
        let masked = mask_host("ab").unwrap();
        assert!(masked.label.ends_with("…ab"));
    }

    #[test]
    fn sanitize_replaces_host_and_first_label() {
        let sanitized = sanitize_message(
            "failed to lookup Electrum.Example.com (electrum)",
            Some("electrum.example.com"),
        );
        assert_eq!(sanitized, "failed to lookup [host] ([host])");
    }

    #[test]
    fn sanitize_keeps_numeric_first_label_text() {
        let sanitized = sanitize_message(
            "connect to 192.168.1.10 failed after 192 ms",
            Some("192.168.1.10"),
        );
        assert_eq!(sanitized, "connect to [host] failed after 192 ms");
    }

    #[test]
    fn sanitize_keeps_short_first_label_text() {
        let sanitized = sanitize_message("a.example: bad handshake", Some("a.example"));
        assert_eq!(sanitized, "[host]: bad handshake");
    }

    #[test]
    fn sanitize_without_host_is_trimmed_passthrough() {
        assert_eq!(sanitize_message("  refused ", None), "refused");
        assert_eq!(sanitize_message("refused", Some("")), "refused");
    }

    #[test]
    fn root_cause_walks_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let error = Outer(std::io::Error::other("inner"));
        assert_eq!(root_cause(&error).to_string(), "inner");
    }
}
