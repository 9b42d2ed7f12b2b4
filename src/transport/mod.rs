//! Send-time capture of relay message ids.

mod response;

use std::sync::Arc;

use async_trait::async_trait;

pub use response::{Response, ResponseLine};

use crate::{
    config::RelayConfig,
    error::{StoreError, TransportError},
    ids::RelayEndpoint,
    store::{TraceFilter, TrackingStore},
};

/// A message handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// `Message-ID` assigned by the host, brackets included
    pub message_id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub data: Vec<u8>,
}

/// The host's outbound mail transport.
#[async_trait]
pub trait MailTransport: Send {
    /// Hostname of the server this transport submits to.
    fn host(&self) -> &str;

    /// Submits `message`, returning the server's final reply.
    ///
    /// # Errors
    /// Any delivery failure. These are the host's to handle.
    async fn send(&mut self, message: &OutboundMessage) -> Result<Response, TransportError>;
}

/// Wraps a host transport and records the relay's id for every message it
/// accepts.
///
/// The wrapped transport's behaviour is unchanged: errors pass straight
/// through, and nothing that happens while recording the id can fail a send
/// that already succeeded.
pub struct TrackedTransport<T> {
    inner: T,
    store: Arc<dyn TrackingStore>,
    config: RelayConfig,
}

impl<T: MailTransport> TrackedTransport<T> {
    #[must_use]
    pub fn new(inner: T, store: Arc<dyn TrackingStore>, config: RelayConfig) -> Self {
        Self {
            inner,
            store,
            config,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// The relay id for a reply from `host`, or `None` when `host` is not the
/// relay or the reply carries no token.
#[must_use]
pub fn relay_message_id(config: &RelayConfig, host: &str, response: &Response) -> Option<String> {
    let endpoint = RelayEndpoint::from_host(host, config)?;
    let token = response.relay_token()?;
    Some(endpoint.message_id(token))
}

async fn capture(
    store: &dyn TrackingStore,
    message_id: &str,
    relay_message_id: &str,
) -> Result<(), StoreError> {
    let traces = store.search(&TraceFilter::message_id(message_id)).await?;

    crate::outbound!(
        message_id,
        relay_message_id,
        found = traces.len(),
        "Looked up tracking records for sent message"
    );

    let Some(trace) = traces.first() else {
        crate::outbound!(
            level = WARN,
            message_id,
            relay_message_id,
            "No tracking record for sent message, relay id not stored"
        );
        return Ok(());
    };

    if traces.len() > 1 {
        crate::outbound!(
            level = WARN,
            message_id,
            count = traces.len(),
            trace = %trace.id,
            "Several tracking records share an original id, using the first"
        );
    }

    store.set_relay_message_id(trace.id, relay_message_id).await?;

    crate::outbound!(
        level = INFO,
        message_id,
        relay_message_id,
        trace = %trace.id,
        "Stored relay message id"
    );

    Ok(())
}

#[async_trait]
impl<T: MailTransport> MailTransport for TrackedTransport<T> {
    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<Response, TransportError> {
        let response = self.inner.send(message).await?;

        if !self.config.enabled {
            return Ok(response);
        }

        let Some(relay_id) = relay_message_id(&self.config, self.inner.host(), &response)
        else {
            crate::outbound!(
                host = self.inner.host(),
                message_id = %message.message_id,
                "Not a relay submission, skipping id capture"
            );
            return Ok(response);
        };

        if let Err(err) = capture(self.store.as_ref(), &message.message_id, &relay_id).await {
            crate::outbound!(
                level = ERROR,
                message_id = %message.message_id,
                relay_message_id = %relay_id,
                error = %err,
                "Failed to store relay message id"
            );
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_message_id_from_acceptance() {
        let response = Response::parse(b"250 01000199-abc123 Ok\r\n").unwrap();
        let id = relay_message_id(
            &RelayConfig::for_domain("relay.example"),
            "email-smtp.us-east-1.relay.example",
            &response,
        );
        assert_eq!(id.as_deref(), Some("01000199-abc123@us-east-1.relay.example"));
    }

    #[test]
    fn test_relay_message_id_other_host() {
        let response = Response::parse(b"250 2.0.0 Ok: queued as 4F2B\r\n").unwrap();
        let id = relay_message_id(
            &RelayConfig::for_domain("relay.example"),
            "smtp.mailhost.example",
            &response,
        );
        assert_eq!(id, None);
    }
}
