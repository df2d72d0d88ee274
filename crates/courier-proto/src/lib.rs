//! Courier wire protocol.
//!
//! The unit exchanged between an endpoint and the relay (and, transparently,
//! end to end between peers) is the [`Envelope`]: a small JSON object with a
//! closed set of `type` values. The relay routes envelopes by `recipient`
//! without interpreting `body`, so ciphertext passes through opaquely, and
//! unknown fields survive a decode/encode round trip unchanged.

pub mod envelope;

#[cfg(test)]
mod proptests;

pub use envelope::{Envelope, EnvelopeError, EnvelopeKind, MAX_ENVELOPE_BYTES, RELAY_ID};
