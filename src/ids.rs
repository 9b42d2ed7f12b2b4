//! Message identifier parsing.
//!
//! The relay reissues ids as `<token>@<region>.<id-domain>` at submission but
//! refers to the same message as `<token>@email.<id-domain>` in bounces, so
//! correlation is done on the local part (everything before the `@`).

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RelayConfig;

#[allow(clippy::unwrap_used)]
static MSGID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^>]+)>").unwrap());

/// Extracts every bracketed id from a `References` or `In-Reply-To` header,
/// in header order and without the brackets.
#[must_use]
pub fn parse_reference_tokens(header: &str) -> Vec<String> {
    MSGID_RE
        .captures_iter(header)
        .map(|c| c[1].to_string())
        .collect()
}

/// Local part of a message id: surrounding brackets trimmed and everything
/// from the first `@` discarded.
///
/// ```
/// use relay_tracking::normalize_identifier;
///
/// assert_eq!(
///     normalize_identifier("<01000199-abc123@email.amazonses.com>"),
///     "01000199-abc123"
/// );
/// ```
#[must_use]
pub fn normalize_identifier(id: &str) -> &str {
    let id = id.trim_matches(|c| c == '<' || c == '>');
    id.split_once('@').map_or(id, |(local, _)| local)
}

/// The id with any surrounding angle brackets removed.
#[must_use]
pub fn strip_brackets(id: &str) -> &str {
    id.trim().trim_matches(|c| c == '<' || c == '>')
}

/// A relay submission endpoint, recognised from the transport hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    region: String,
    id_domain: String,
}

impl RelayEndpoint {
    /// Recognises hosts shaped like `email-smtp.<region>.<host-domain>`.
    ///
    /// Returns `None` for any other host, meaning the relay is not in use.
    #[must_use]
    pub fn from_host(host: &str, config: &RelayConfig) -> Option<Self> {
        let labels: Vec<&str> = host.trim_end_matches('.').split('.').collect();
        if labels.len() < 4 || labels.iter().any(|label| label.is_empty()) {
            return None;
        }

        let domain = labels[labels.len() - 2..].join(".");
        if !domain.eq_ignore_ascii_case(&config.host_domain) {
            return None;
        }

        Some(Self {
            region: labels[1].to_string(),
            id_domain: config.id_domain.clone(),
        })
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The id the relay assigns to a message it accepted as `token`.
    #[must_use]
    pub fn message_id(&self, token: &str) -> String {
        format!("{token}@{}.{}", self.region, self.id_domain)
    }
}
