//! Stand-ins for the host's collaborators.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_tracking::{
    BounceNotification, BounceProcessor, InboundMessage, MailTransport, MemoryTrackingStore,
    OutboundMessage, Response, Route, RouteProcessor, StoreError, Trace, TraceFilter, TraceId,
    TrackingStore, TransportError, html_to_plaintext,
};

pub const RELAY_HOST: &str = "email-smtp.us-east-1.relay.example";

/// Transport that answers every send with a canned reply.
pub struct StaticTransport {
    host: String,
    reply: Result<Vec<u8>, fn() -> TransportError>,
    pub sent: Vec<OutboundMessage>,
}

impl StaticTransport {
    pub fn accepting(host: &str, reply: &str) -> Self {
        Self {
            host: host.to_string(),
            reply: Ok(reply.as_bytes().to_vec()),
            sent: Vec::new(),
        }
    }

    pub fn failing(host: &str, error: fn() -> TransportError) -> Self {
        Self {
            host: host.to_string(),
            reply: Err(error),
            sent: Vec::new(),
        }
    }
}

#[async_trait]
impl MailTransport for StaticTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<Response, TransportError> {
        match &self.reply {
            Ok(reply) => {
                self.sent.push(message.clone());
                Response::parse(reply)
            }
            Err(error) => Err(error()),
        }
    }
}

pub fn message(message_id: &str) -> OutboundMessage {
    OutboundMessage {
        message_id: message_id.to_string(),
        sender: "news@odoo.example".to_string(),
        recipients: vec!["customer@example.com".to_string()],
        data: b"Subject: Offer\r\n\r\nHello\r\n".to_vec(),
    }
}

/// Router that only counts how often the host's routing ran.
#[derive(Clone, Default)]
pub struct CountingRouter {
    pub calls: Arc<Mutex<usize>>,
}

impl CountingRouter {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RouteProcessor for CountingRouter {
    async fn process(&self, _: &InboundMessage, _: &[Route]) -> relay_tracking::Result<()> {
        *self.calls.lock().unwrap() += 1;
        Ok(())
    }
}

pub fn route() -> Route {
    Route {
        model: "crm.lead".to_string(),
        thread_id: Some(7),
    }
}

/// The host's bounce handler: bounces the records whose original id it is
/// handed, and remembers what it was handed.
#[derive(Clone)]
pub struct NativeBounceHandler {
    store: MemoryTrackingStore,
    pub seen: Arc<Mutex<Vec<BounceNotification>>>,
}

impl NativeBounceHandler {
    pub fn new(store: MemoryTrackingStore) -> Self {
        Self {
            store,
            seen: Arc::default(),
        }
    }

    pub fn seen_ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .last()
            .map(|notification| notification.bounced_message_ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BounceProcessor for NativeBounceHandler {
    async fn handle_bounce(
        &self,
        notification: &mut BounceNotification,
    ) -> relay_tracking::Result<()> {
        self.seen.lock().unwrap().push(notification.clone());
        self.store
            .set_bounced(
                &TraceFilter::MessageIdIn(notification.bounced_message_ids.clone()),
                &html_to_plaintext(&notification.body),
            )
            .await?;
        Ok(())
    }
}

/// Bounce handler that fails the way a broken host would.
pub struct BrokenBounceHandler;

#[async_trait]
impl BounceProcessor for BrokenBounceHandler {
    async fn handle_bounce(&self, _: &mut BounceNotification) -> relay_tracking::Result<()> {
        Err(anyhow::anyhow!("mail queue unavailable").into())
    }
}

/// Store whose backend is down.
pub struct UnavailableStore;

#[async_trait]
impl TrackingStore for UnavailableStore {
    async fn search(&self, _: &TraceFilter) -> Result<Vec<Trace>, StoreError> {
        Err(StoreError::Internal("connection refused".into()))
    }

    async fn set_relay_message_id(&self, _: TraceId, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Internal("connection refused".into()))
    }

    async fn set_opened(&self, _: &TraceFilter) -> Result<usize, StoreError> {
        Err(StoreError::Internal("connection refused".into()))
    }

    async fn set_replied(&self, _: &TraceFilter) -> Result<usize, StoreError> {
        Err(StoreError::Internal("connection refused".into()))
    }

    async fn set_bounced(&self, _: &TraceFilter, _: &str) -> Result<usize, StoreError> {
        Err(StoreError::Internal("connection refused".into()))
    }
}

pub const HARD_BOUNCE: &str = "From: MAILER-DAEMON@email.relay.example\r\n\
To: news@odoo.example\r\n\
Subject: Delivery Status Notification (Failure)\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/report; report-type=delivery-status; boundary=\"BOUND\"\r\n\
\r\n\
--BOUND\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
An error occurred while trying to deliver the mail to customer@example.com\r\n\
--BOUND\r\n\
Content-Type: message/delivery-status\r\n\
\r\n\
Reporting-MTA: dns; a8-30.smtp-out.relay.example\r\n\
\r\n\
Final-Recipient: rfc822; customer@example.com\r\n\
Action: failed\r\n\
Status: 5.1.1\r\n\
Diagnostic-Code: smtp; 550 5.1.1 user unknown\r\n\
--BOUND\r\n\
Content-Type: text/rfc822-headers\r\n\
\r\n\
Message-ID: <01000199-abc123@email.relay.example>\r\n\
--BOUND--\r\n";

pub const COMPLAINT: &str = "From: complaints@email.relay.example\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/report; report-type=feedback-report; boundary=\"ARF\"\r\n\
\r\n\
--ARF\r\n\
Content-Type: text/plain\r\n\
\r\n\
This is an email abuse report.\r\n\
--ARF\r\n\
Content-Type: message/feedback-report\r\n\
\r\n\
Feedback-Type: abuse\r\n\
User-Agent: RelayFeedback/1.0\r\n\
Version: 1\r\n\
--ARF--\r\n";

pub fn bounce(raw: &str, body: &str, ids: &[&str]) -> BounceNotification {
    BounceNotification {
        raw: raw.as_bytes().to_vec(),
        body: body.to_string(),
        bounced_message_ids: ids.iter().map(ToString::to_string).collect(),
    }
}
