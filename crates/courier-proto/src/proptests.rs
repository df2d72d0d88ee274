use proptest::prelude::*;

use crate::envelope::{Envelope, EnvelopeKind};

fn ident() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,24}"
}

fn kind() -> impl Strategy<Value = EnvelopeKind> {
    prop_oneof![
        Just(EnvelopeKind::Msg),
        Just(EnvelopeKind::Ack),
        Just(EnvelopeKind::Pubkey),
        Just(EnvelopeKind::EncapKey),
        Just(EnvelopeKind::Error),
    ]
}

proptest! {
    // Decoding an encoded envelope yields the same envelope, and the
    // second encoding is byte-identical to the first.
    #[test]
    fn codec_round_trip_is_byte_stable(
        kind in kind(),
        id in ident(),
        recipient in ident(),
        body in "[ -~]{0,256}",
        msg_id in "[0-9]{0,18}",
    ) {
        let mut envelope = Envelope::msg(id, recipient, msg_id, body);
        envelope.kind = kind;

        let once = envelope.encode().unwrap();
        let decoded = Envelope::decode(once.as_bytes()).unwrap();
        prop_assert_eq!(&decoded, &envelope);

        let twice = decoded.encode().unwrap();
        prop_assert_eq!(once, twice);
    }

    // Unknown string fields are preserved exactly across a round trip.
    #[test]
    fn unknown_fields_are_preserved(
        id in ident(),
        key in "[a-z_]{1,12}",
        value in "[ -~&&[^\"\\\\]]{0,64}",
    ) {
        // steer clear of the known field names
        prop_assume!(!matches!(
            key.as_str(),
            "type" | "id" | "recipient" | "body" | "msg_id" | "public_key" | "encrypted_key"
        ));

        let raw = format!(
            r#"{{"type":"msg","id":"{id}","recipient":"","{key}":"{value}"}}"#
        );
        let decoded = Envelope::decode(raw.as_bytes()).unwrap();
        prop_assert_eq!(
            decoded.extra.get(&key).and_then(|v| v.as_str()),
            Some(value.as_str())
        );

        let reencoded = decoded.encode().unwrap();
        let again = Envelope::decode(reencoded.as_bytes()).unwrap();
        prop_assert_eq!(again, decoded);
    }
}
