//! Bounce and complaint correlation.
//!
//! Bounces for relayed mail reference the relay's id under the relay's
//! bounce domain, which neither the host's mail queue nor its tracking
//! records know about. Before the host's handler runs, those ids are
//! translated back to the original ids through the tracking records. If the
//! host still finds nothing, the matching records are bounced directly.

mod classify;

use std::{borrow::Cow, collections::HashSet, sync::Arc};

use async_trait::async_trait;
use mail_parser::decoders::html::html_to_text;

pub use classify::{Classification, ReportKind, classify};

use crate::{
    config::BounceConfig,
    error::{Result, StoreError},
    ids::normalize_identifier,
    store::{TraceFilter, TrackingStore},
};

/// A bounce or complaint as handed over by the host's inbound routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BounceNotification {
    /// The full report message
    pub raw: Vec<u8>,
    /// HTML description of the failure, shown to users and stored as reason
    pub body: String,
    /// Message ids the host extracted from the report
    pub bounced_message_ids: Vec<String>,
}

/// The host's native bounce handling.
#[async_trait]
pub trait BounceProcessor: Send + Sync {
    /// Flags whatever the host tracks under `bounced_message_ids`.
    ///
    /// # Errors
    /// Whatever the host's handler fails with.
    async fn handle_bounce(&self, notification: &mut BounceNotification) -> Result<()>;
}

/// Prefixes `body` with a bold classification note.
#[must_use]
pub fn annotate(body: &str, label: &str, summary: &str) -> String {
    format!("<p><b>{label}: {summary}</b></p><br/>{body}")
}

/// Renders the HTML bounce description as the plain-text bounce reason.
///
/// A `<` that cannot open a tag is kept as text. Leading and trailing blank
/// lines are dropped and runs of blank lines collapse into one.
#[must_use]
pub fn html_to_plaintext(html: &str) -> String {
    let text = html_to_text(&escape_bare_angles(html));

    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }

    while lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

fn escape_bare_angles(html: &str) -> Cow<'_, str> {
    if !html.contains('<') {
        return Cow::Borrowed(html);
    }

    let mut escaped = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        let opens_tag = chars
            .peek()
            .is_some_and(|next| next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?'));

        if c == '<' && !opens_tag {
            escaped.push_str("&lt;");
        } else {
            escaped.push(c);
        }
    }

    Cow::Owned(escaped)
}

/// Original ids of the records whose relay id shares a local part with any
/// of `bounced`, in first-seen order.
///
/// # Errors
/// If the store fails.
pub async fn resolve_original_ids(
    store: &dyn TrackingStore,
    bounced: &[String],
) -> std::result::Result<Vec<String>, StoreError> {
    let mut originals = Vec::new();

    for id in bounced {
        let fragment = normalize_identifier(id);
        if fragment.is_empty() {
            continue;
        }

        let traces = store
            .search(&TraceFilter::RelayIdContains(fragment.to_string()))
            .await?;

        crate::bounce!(
            bounced = %id,
            fragment,
            found = traces.len(),
            "Searched tracking records by relay id"
        );

        originals.extend(traces.into_iter().filter_map(|trace| trace.message_id));
    }

    Ok(dedup(originals))
}

/// Bounces records by relay id when none of `notification`'s ids matches a
/// record's original id. Returns how many records were bounced.
///
/// # Errors
/// If the store fails.
pub async fn bounce_unmatched(
    store: &dyn TrackingStore,
    notification: &BounceNotification,
) -> std::result::Result<usize, StoreError> {
    let ids = &notification.bounced_message_ids;
    if ids.is_empty() {
        return Ok(0);
    }

    if !store
        .search(&TraceFilter::MessageIdIn(ids.clone()))
        .await?
        .is_empty()
    {
        return Ok(0);
    }

    let reason = html_to_plaintext(&notification.body);
    let mut bounced = 0;

    for id in ids {
        let fragment = normalize_identifier(id);
        if fragment.is_empty() {
            continue;
        }

        bounced += store
            .set_bounced(&TraceFilter::RelayIdContains(fragment.to_string()), &reason)
            .await?;
    }

    Ok(bounced)
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Wraps the host's bounce handler with report classification and relay id
/// translation.
pub struct BounceCorrelator<B> {
    inner: B,
    store: Arc<dyn TrackingStore>,
    config: BounceConfig,
}

impl<B: BounceProcessor> BounceCorrelator<B> {
    #[must_use]
    pub fn new(inner: B, store: Arc<dyn TrackingStore>, config: BounceConfig) -> Self {
        Self {
            inner,
            store,
            config,
        }
    }

    fn annotate(&self, notification: &mut BounceNotification) {
        if !self.config.annotate {
            return;
        }

        match classify(&notification.raw) {
            Ok(classification) => {
                if let Some(summary) = classification.summary() {
                    notification.body =
                        annotate(&notification.body, &self.config.report_label, &summary);
                    crate::bounce!(level = INFO, %summary, "Annotated bounce description");
                }
            }
            Err(err) => crate::bounce!(
                level = ERROR,
                error = %err,
                "Unable to classify bounce report"
            ),
        }
    }
}

#[async_trait]
impl<B: BounceProcessor> BounceProcessor for BounceCorrelator<B> {
    async fn handle_bounce(&self, notification: &mut BounceNotification) -> Result<()> {
        self.annotate(notification);

        crate::bounce!(
            bounced = ?notification.bounced_message_ids,
            "Bounce received"
        );

        match resolve_original_ids(self.store.as_ref(), &notification.bounced_message_ids).await {
            Ok(originals) if !originals.is_empty() => {
                let mut ids = std::mem::take(&mut notification.bounced_message_ids);
                ids.extend(originals);
                notification.bounced_message_ids = dedup(ids);

                crate::bounce!(
                    level = INFO,
                    bounced = ?notification.bounced_message_ids,
                    "Extended bounced ids with original ids"
                );
            }
            Ok(_) => {}
            Err(err) => crate::bounce!(
                level = WARN,
                error = %err,
                "Failed to translate relay ids"
            ),
        }

        self.inner.handle_bounce(notification).await?;

        match bounce_unmatched(self.store.as_ref(), notification).await {
            Ok(0) => {}
            Ok(bounced) => crate::bounce!(
                level = INFO,
                bounced,
                "Bounced tracking records by relay id"
            ),
            Err(err) => crate::bounce!(
                level = WARN,
                error = %err,
                "Failed to bounce tracking records by relay id"
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_annotate() {
        assert_eq!(
            annotate("<p>User unknown</p>", "SES Report", "Hard Bounce (Code: 5.1.1)"),
            "<p><b>SES Report: Hard Bounce (Code: 5.1.1)</b></p><br/><p>User unknown</p>"
        );
    }

    #[test]
    fn test_annotated_body_as_plaintext() {
        assert_eq!(
            html_to_plaintext(
                "<p><b>SES Report: Hard Bounce (Code: 5.1.1)</b></p><br/><p>The mailbox does not exist</p>"
            ),
            "SES Report: Hard Bounce (Code: 5.1.1)\n\nThe mailbox does not exist"
        );
    }

    #[test]
    fn test_bare_angle_bracket_is_text() {
        assert_eq!(
            html_to_plaintext("Quota 5 < 10 exceeded for mailbox"),
            "Quota 5 < 10 exceeded for mailbox"
        );
    }

    #[test]
    fn test_style_block_is_dropped() {
        assert_eq!(
            html_to_plaintext("<style>p { color: red; }</style><p>User unknown</p>"),
            "User unknown"
        );
    }

    #[test]
    fn test_line_breaks_and_entities() {
        assert_eq!(html_to_plaintext("one<br>two"), "one\ntwo");
        assert_eq!(html_to_plaintext("Tom &amp; Jerry"), "Tom & Jerry");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(html_to_plaintext("Mailbox full"), "Mailbox full");
        assert_eq!(html_to_plaintext(""), "");
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let ids = vec!["<a>".to_string(), "b".into(), "<a>".into(), "c".into(), "b".into()];
        assert_eq!(dedup(ids), vec!["<a>", "b", "c"]);
    }
}
