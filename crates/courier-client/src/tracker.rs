//! Outgoing-message delivery tracking.
//!
//! Each submitted line gets a record keyed by `msg_id`. Acknowledgements
//! move the status forward along `sent → delivered → read` and never
//! backward; duplicates and unknown status strings are ignored, and a
//! `read` arriving before `delivered` jumps straight to `read`.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::SystemTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    /// Parse an ack body. Returns `None` for anything that is not a
    /// status (for example the relay's `queued`).
    pub fn parse(body: &str) -> Option<Self> {
        match body {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub msg_id: String,
    pub sent_at: SystemTime,
    pub text: String,
    pub status: DeliveryStatus,
}

#[derive(Debug, Default)]
pub struct DeliveryTracker {
    inner: Mutex<HashMap<String, OutboundMessage>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly submitted message as `sent`.
    pub fn record_sent(&self, msg_id: &str, text: &str) -> OutboundMessage {
        let record = OutboundMessage {
            msg_id: msg_id.to_string(),
            sent_at: SystemTime::now(),
            text: text.to_string(),
            status: DeliveryStatus::Sent,
        };
        self.inner
            .lock()
            .expect("tracker mutex poisoned")
            .insert(msg_id.to_string(), record.clone());
        record
    }

    /// Apply an ack. Returns the updated record when the status actually
    /// advanced; stale, duplicate, unknown-status and unknown-id acks all
    /// return `None`.
    pub fn apply_ack(&self, msg_id: &str, body: &str) -> Option<OutboundMessage> {
        let status = DeliveryStatus::parse(body)?;
        let mut inner = self.inner.lock().expect("tracker mutex poisoned");
        let record = inner.get_mut(msg_id)?;
        if status > record.status {
            record.status = status;
            return Some(record.clone());
        }
        None
    }

    pub fn status_of(&self, msg_id: &str) -> Option<DeliveryStatus> {
        self.inner
            .lock()
            .expect("tracker mutex poisoned")
            .get(msg_id)
            .map(|r| r.status)
    }
}
