//! Reply and open correlation for routed inbound mail.

use std::sync::Arc;

use async_trait::async_trait;
use mailparse::{MailHeaderMap, MailParseError, parse_headers};

use crate::{
    error::{Result, StoreError},
    ids::{normalize_identifier, parse_reference_tokens},
    store::{TraceFilter, TrackingStore},
};

/// Threading headers of an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: Option<String>,
    pub references: Option<String>,
    pub in_reply_to: Option<String>,
}

impl InboundMessage {
    /// Reads the threading headers of a raw RFC 5322 message.
    ///
    /// # Errors
    /// If the header block cannot be parsed.
    pub fn parse(raw: &[u8]) -> std::result::Result<Self, MailParseError> {
        let (headers, _) = parse_headers(raw)?;

        Ok(Self {
            message_id: headers.get_first_value("Message-ID"),
            references: headers.get_first_value("References"),
            in_reply_to: headers.get_first_value("In-Reply-To"),
        })
    }

    /// `References`, or `In-Reply-To` when there are none.
    #[must_use]
    pub fn thread_references(&self) -> &str {
        self.references
            .as_deref()
            .filter(|references| !references.trim().is_empty())
            .or(self.in_reply_to.as_deref())
            .unwrap_or_default()
    }
}

/// A destination the host resolved for an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub model: String,
    pub thread_id: Option<u64>,
}

/// The host's routing step for inbound mail.
#[async_trait]
pub trait RouteProcessor: Send + Sync {
    /// Delivers `message` to the resolved `routes`.
    ///
    /// # Errors
    /// Whatever the host's routing fails with.
    async fn process(&self, message: &InboundMessage, routes: &[Route]) -> Result<()>;
}

/// How many records a correlation pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Correlation {
    /// Matched on the original id
    pub exact: usize,
    /// Matched on the relay id fragment of the first reference
    pub relay: usize,
}

/// Marks the tracking records referenced by `message` as opened and replied.
///
/// Every reference is tried as an original id. Only the first is normalized
/// and tried against relay ids, which is where a reply to a relayed message
/// puts the relay's id.
///
/// # Errors
/// If the store fails.
pub async fn correlate_references(
    store: &dyn TrackingStore,
    message: &InboundMessage,
) -> std::result::Result<Correlation, StoreError> {
    let references = parse_reference_tokens(message.thread_references());
    let Some(first) = references.first() else {
        return Ok(Correlation::default());
    };

    let fragment = normalize_identifier(first).to_string();
    let exact = TraceFilter::MessageIdIn(references);

    store.set_opened(&exact).await?;
    let mut correlation = Correlation {
        exact: store.set_replied(&exact).await?,
        ..Correlation::default()
    };

    if !fragment.is_empty() {
        let relay = TraceFilter::RelayIdContains(fragment);
        store.set_opened(&relay).await?;
        correlation.relay = store.set_replied(&relay).await?;
    }

    Ok(correlation)
}

/// Wraps the host's router, correlating replies before handing the message
/// on.
pub struct ReplyCorrelator<P> {
    inner: P,
    store: Arc<dyn TrackingStore>,
}

impl<P: RouteProcessor> ReplyCorrelator<P> {
    #[must_use]
    pub fn new(inner: P, store: Arc<dyn TrackingStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<P: RouteProcessor> RouteProcessor for ReplyCorrelator<P> {
    async fn process(&self, message: &InboundMessage, routes: &[Route]) -> Result<()> {
        if !routes.is_empty() {
            match correlate_references(self.store.as_ref(), message).await {
                Ok(correlation) => crate::inbound!(
                    message_id = ?message.message_id,
                    exact = correlation.exact,
                    relay = correlation.relay,
                    "Correlated inbound references"
                ),
                Err(err) => crate::inbound!(
                    level = WARN,
                    message_id = ?message.message_id,
                    error = %err,
                    "Failed to correlate inbound references"
                ),
            }
        }

        self.inner.process(message, routes).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_threading_headers() {
        let message = InboundMessage::parse(
            b"Message-ID: <reply@client.example>\r\n\
              In-Reply-To: <0100-abc@email.relay.example>\r\n\
              References: <m1@odoo.example>\r\n <0100-abc@email.relay.example>\r\n\
              Subject: Re: Offer\r\n\
              \r\n\
              Thanks!\r\n",
        )
        .unwrap();

        assert_eq!(message.message_id.as_deref(), Some("<reply@client.example>"));
        assert_eq!(
            parse_reference_tokens(message.thread_references()),
            vec!["m1@odoo.example", "0100-abc@email.relay.example"]
        );
    }

    #[test]
    fn test_in_reply_to_fallback() {
        let message = InboundMessage {
            references: Some("  ".into()),
            in_reply_to: Some("<m1@odoo.example>".into()),
            ..InboundMessage::default()
        };
        assert_eq!(message.thread_references(), "<m1@odoo.example>");
        assert_eq!(InboundMessage::default().thread_references(), "");
    }
}
