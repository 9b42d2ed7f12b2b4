//! Tracking records and the store that owns them.
//!
//! The host's mass-mailing subsystem creates one [`Trace`] per queued
//! message. This crate only adds the relay id to it and flips its
//! engagement state; records are never created or deleted here.

mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryTrackingStore;

use crate::{error::StoreError, ids::strip_brackets};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TraceId(pub u64);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery and engagement state of one sent campaign message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub id: TraceId,
    /// Id assigned by the host before transport
    pub message_id: Option<String>,
    /// Id reissued by the relay after acceptance
    pub relay_message_id: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub bounce_reason: Option<String>,
}

impl Trace {
    #[must_use]
    pub fn new(id: u64, message_id: impl Into<String>) -> Self {
        Self {
            id: TraceId(id),
            message_id: Some(message_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_relay_message_id(mut self, relay_message_id: impl Into<String>) -> Self {
        self.relay_message_id = Some(relay_message_id.into());
        self
    }

    #[must_use]
    pub const fn is_opened(&self) -> bool {
        self.opened_at.is_some()
    }

    #[must_use]
    pub const fn is_replied(&self) -> bool {
        self.replied_at.is_some()
    }

    #[must_use]
    pub const fn is_bounced(&self) -> bool {
        self.bounced_at.is_some()
    }
}

/// Selects tracking records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceFilter {
    /// Original id equal to any of the given ids, ignoring angle brackets
    MessageIdIn(Vec<String>),
    /// Relay id containing the fragment, case-insensitively.
    ///
    /// Matches every such record: fragments are assumed unique but nothing
    /// enforces it. An empty fragment matches nothing.
    RelayIdContains(String),
}

impl TraceFilter {
    #[must_use]
    pub fn message_id(id: impl Into<String>) -> Self {
        Self::MessageIdIn(vec![id.into()])
    }

    /// Whether `trace` is selected by this filter.
    ///
    /// Stores that cannot push the filter down to their backend can use
    /// this directly.
    #[must_use]
    pub fn matches(&self, trace: &Trace) -> bool {
        match self {
            Self::MessageIdIn(ids) => trace.message_id.as_deref().is_some_and(|message_id| {
                let message_id = strip_brackets(message_id);
                ids.iter().any(|id| strip_brackets(id) == message_id)
            }),
            Self::RelayIdContains(fragment) => {
                !fragment.is_empty()
                    && trace.relay_message_id.as_deref().is_some_and(|relay_id| {
                        relay_id
                            .to_lowercase()
                            .contains(&fragment.to_lowercase())
                    })
            }
        }
    }
}

impl fmt::Display for TraceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageIdIn(ids) => write!(f, "message_id in {ids:?}"),
            Self::RelayIdContains(fragment) => write!(f, "relay_message_id ilike {fragment:?}"),
        }
    }
}

/// The host's tracking record store.
///
/// Mutators return how many records they touched. Engagement timestamps are
/// only set the first time; later events leave them unchanged.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Records matching `filter`, ordered by id.
    async fn search(&self, filter: &TraceFilter) -> Result<Vec<Trace>, StoreError>;

    async fn set_relay_message_id(
        &self,
        id: TraceId,
        relay_message_id: &str,
    ) -> Result<(), StoreError>;

    async fn set_opened(&self, filter: &TraceFilter) -> Result<usize, StoreError>;

    async fn set_replied(&self, filter: &TraceFilter) -> Result<usize, StoreError>;

    async fn set_bounced(&self, filter: &TraceFilter, reason: &str) -> Result<usize, StoreError>;
}
