//! Correlation of transactional relay message ids with mass-mailing
//! tracking records.
//!
//! A relay (Amazon SES and alike) reissues the `Message-ID` of every message
//! it accepts, and reports bounces from a different domain than the one used
//! for submission. This crate hooks the three places a mail host touches
//! those ids:
//!
//! - [`TrackedTransport`] wraps the outbound transport and records the relay
//!   id on the tracking record after a successful send.
//! - [`ReplyCorrelator`] wraps inbound routing and marks referenced records
//!   as opened and replied.
//! - [`BounceCorrelator`] wraps the native bounce handler, classifies
//!   RFC 3464 / RFC 5965 reports and translates relay ids back to the
//!   original ones.
//!
//! The host provides the record store ([`TrackingStore`]) and its own
//! transport, router and bounce handler through the traits of each module.

pub mod bounce;
pub mod config;
pub mod error;
pub mod ids;
pub mod inbound;
pub mod logging;
pub mod store;
pub mod transport;

pub use tracing;

pub use bounce::{
    BounceCorrelator, BounceNotification, BounceProcessor, Classification, ReportKind, classify,
    html_to_plaintext,
};
pub use config::{BounceConfig, RelayConfig, TrackingConfig};
pub use error::{
    ClassificationError, ConfigError, Result, StoreError, TrackingError, TransportError,
};
pub use ids::{RelayEndpoint, normalize_identifier, parse_reference_tokens, strip_brackets};
pub use inbound::{
    Correlation, InboundMessage, ReplyCorrelator, Route, RouteProcessor, correlate_references,
};
pub use store::{MemoryTrackingStore, Trace, TraceFilter, TraceId, TrackingStore};
pub use transport::{
    MailTransport, OutboundMessage, Response, TrackedTransport, relay_message_id,
};
