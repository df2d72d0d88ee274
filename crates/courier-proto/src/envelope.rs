use serde::{Deserialize, Serialize};

/// Maximum accepted size of an encoded envelope frame.
pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024;

/// Reserved sender identifier for relay-originated envelopes.
///
/// The registry never hands this identifier out to a client because `claim`
/// is first-come, and the relay claims nothing; it exists only so that
/// `ack`/`error` envelopes built by the relay satisfy the non-empty-`id`
/// invariant.
pub const RELAY_ID: &str = "relay";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope exceeds {MAX_ENVELOPE_BYTES} bytes ({0})")]
    Oversized(usize),
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("envelope is missing a sender id")]
    MissingId,
}

/// The closed set of envelope types.
///
/// Decoding is strict here: a frame carrying any other `type` is rejected.
/// New protocol capabilities ride in additional fields instead, which the
/// codec preserves and the relay forwards untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Msg,
    Ack,
    Pubkey,
    EncapKey,
    Error,
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnvelopeKind::Msg => "msg",
            EnvelopeKind::Ack => "ack",
            EnvelopeKind::Pubkey => "pubkey",
            EnvelopeKind::EncapKey => "encap_key",
            EnvelopeKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// A single routed message frame.
///
/// `id` and `recipient` are always serialized (an empty `recipient` means
/// broadcast); the remaining fields are omitted when empty. Fields the
/// codec does not recognize land in `extra` and are re-emitted verbatim,
/// after the known fields, in their original order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub id: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypted_key: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    fn base(kind: EnvelopeKind, id: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            recipient: recipient.into(),
            body: String::new(),
            msg_id: String::new(),
            public_key: String::new(),
            encrypted_key: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// An encrypted chat message. `body` is the hex AEAD blob.
    pub fn msg(
        id: impl Into<String>,
        recipient: impl Into<String>,
        msg_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let mut e = Self::base(EnvelopeKind::Msg, id, recipient);
        e.msg_id = msg_id.into();
        e.body = body.into();
        e
    }

    /// A delivery acknowledgement. `recipient` names the original
    /// destination of the acknowledged message; `body` is the status.
    pub fn ack(
        id: impl Into<String>,
        recipient: impl Into<String>,
        msg_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        let mut e = Self::base(EnvelopeKind::Ack, id, recipient);
        e.msg_id = msg_id.into();
        e.body = status.into();
        e
    }

    /// A long-term KEM public key announcement.
    pub fn pubkey(
        id: impl Into<String>,
        recipient: impl Into<String>,
        public_key_b64: impl Into<String>,
    ) -> Self {
        let mut e = Self::base(EnvelopeKind::Pubkey, id, recipient);
        e.public_key = public_key_b64.into();
        e
    }

    /// A KEM encapsulation. The ciphertext travels in `public_key` by
    /// convention and is duplicated into `encrypted_key` for peers that
    /// read the older field.
    pub fn encap_key(
        id: impl Into<String>,
        recipient: impl Into<String>,
        ciphertext_b64: impl Into<String>,
    ) -> Self {
        let mut e = Self::base(EnvelopeKind::EncapKey, id, recipient);
        let ct = ciphertext_b64.into();
        e.encrypted_key = ct.clone();
        e.public_key = ct;
        e
    }

    /// A relay-originated error report back to the sender.
    pub fn error(body: impl Into<String>) -> Self {
        let mut e = Self::base(EnvelopeKind::Error, RELAY_ID, "");
        e.body = body.into();
        e
    }

    /// Decode a frame, enforcing the size cap, the closed `type` set and
    /// the non-empty `id` invariant. Unknown fields are kept.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() > MAX_ENVELOPE_BYTES {
            return Err(EnvelopeError::Oversized(bytes.len()));
        }
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.id.is_empty() {
            return Err(EnvelopeError::MissingId);
        }
        Ok(envelope)
    }

    /// Encode to the JSON wire form. Known fields are emitted in
    /// declaration order, then any preserved unknown fields.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The KEM ciphertext of an `encap_key` envelope, wherever the peer
    /// put it. Dispatch on `kind` before calling this.
    pub fn encapsulation(&self) -> &str {
        if !self.public_key.is_empty() {
            &self.public_key
        } else {
            &self.encrypted_key
        }
    }
}
