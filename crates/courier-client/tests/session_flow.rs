//! Two-party session establishment exercised exactly as the wire would
//! carry it: envelopes in, envelopes out, nothing shared but strings.

use std::sync::Arc;

use courier_client::{keys::KeyStore, session::PeerSessions, tracker::DeliveryTracker};
use courier_proto::{Envelope, EnvelopeKind};

fn party(dir: &tempfile::TempDir) -> PeerSessions {
    PeerSessions::new(Arc::new(KeyStore::open(dir.path())))
}

#[test]
fn handshake_and_message_through_envelopes() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let alice = party(&dir_a);
    let bob = party(&dir_b);

    // Bob announces his public key; the announcement crosses the relay as
    // an envelope and Alice decodes it off the wire.
    let announce = Envelope::pubkey("bob", "alice", bob.local_public_key_b64().unwrap())
        .encode()
        .unwrap();
    let decoded = Envelope::decode(announce.as_bytes()).unwrap();
    assert_eq!(decoded.kind, EnvelopeKind::Pubkey);
    alice.cache_peer_key(&decoded.id, &decoded.public_key).unwrap();

    // Alice's first send encapsulates; both resulting envelopes cross the
    // wire in order.
    let (blob, encapsulation) = alice.encrypt_for("bob", b"hello").unwrap();
    let encap_frame = Envelope::encap_key("alice", "bob", encapsulation.unwrap())
        .encode()
        .unwrap();
    let msg_frame = Envelope::msg("alice", "bob", "1", blob).encode().unwrap();

    let encap = Envelope::decode(encap_frame.as_bytes()).unwrap();
    assert_eq!(encap.kind, EnvelopeKind::EncapKey);
    bob.accept_encapsulation(&encap.id, encap.encapsulation()).unwrap();

    let msg = Envelope::decode(msg_frame.as_bytes()).unwrap();
    let plaintext = bob.decrypt_from(&msg.id, &msg.body).unwrap();
    assert_eq!(plaintext, b"hello");

    // The reply direction reuses Bob's derived key without another
    // encapsulation: Bob now shares Alice's key via his own announcement.
    let (reply_blob, reply_encap) = {
        bob.cache_peer_key("alice", &alice.local_public_key_b64().unwrap()).unwrap();
        bob.encrypt_for("alice", b"hi back").unwrap()
    };
    // Bob already derived a key for alice during decapsulation
    assert!(reply_encap.is_none());
    assert_eq!(alice.decrypt_from("bob", &reply_blob).unwrap(), b"hi back");
}

#[test]
fn tampered_wire_frame_never_surfaces_plaintext() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let alice = party(&dir_a);
    let bob = party(&dir_b);

    alice.cache_peer_key("bob", &bob.local_public_key_b64().unwrap()).unwrap();
    let (blob, encapsulation) = alice.encrypt_for("bob", b"hello").unwrap();
    bob.accept_encapsulation("alice", &encapsulation.unwrap()).unwrap();

    // flip one ciphertext byte inside the hex framing
    let mut bytes = hex::decode(&blob).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    let tampered = hex::encode(bytes);

    assert!(bob.decrypt_from("alice", &tampered).is_err());
}

#[test]
fn receipts_drive_the_tracker_through_envelopes() {
    let tracker = DeliveryTracker::new();
    tracker.record_sent("7", "hello");

    // the relay's own ack (queued) does not advance the status
    let hub_ack = Envelope::ack("relay", "bob", "7", "queued").encode().unwrap();
    let decoded = Envelope::decode(hub_ack.as_bytes()).unwrap();
    assert!(tracker.apply_ack(&decoded.msg_id, &decoded.body).is_none());

    // the peer's receipts do
    for (body, expect_change) in [("delivered", true), ("read", true), ("read", false)] {
        let ack = Envelope::ack("bob", "alice", "7", body).encode().unwrap();
        let decoded = Envelope::decode(ack.as_bytes()).unwrap();
        assert_eq!(
            tracker.apply_ack(&decoded.msg_id, &decoded.body).is_some(),
            expect_change
        );
    }
}
