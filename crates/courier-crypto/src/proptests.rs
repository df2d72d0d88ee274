use proptest::prelude::*;

use crate::{aead, kdf, kem, CryptoError};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Seal/open round trip for bodies up to the 16 KiB the protocol allows.
    #[test]
    fn aead_round_trip(
        key in prop::array::uniform32(any::<u8>()),
        plaintext in prop::collection::vec(any::<u8>(), 0..16 * 1024),
    ) {
        let blob = aead::seal(&key, &plaintext).unwrap();
        prop_assert_eq!(aead::open(&key, &blob).unwrap(), plaintext);
    }

    // Flipping any single byte of the blob must fail authentication (or
    // the hex decode), never yield a different plaintext.
    #[test]
    fn aead_rejects_bitflips(
        key in prop::array::uniform32(any::<u8>()),
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        flip in any::<usize>(),
    ) {
        let blob = aead::seal(&key, &plaintext).unwrap();
        let mut bytes = hex::decode(&blob).unwrap();
        let idx = flip % bytes.len();
        bytes[idx] ^= 0x01;
        let tampered = hex::encode(bytes);
        prop_assert!(matches!(
            aead::open(&key, &tampered),
            Err(CryptoError::DecryptFailed)
        ));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    // The full key agreement: encapsulate, derive, seal on one side;
    // decapsulate, derive, open on the other.
    #[test]
    fn kem_derived_session_round_trip(
        plaintext in prop::collection::vec(any::<u8>(), 0..1024),
    ) {
        let receiver = kem::generate_keypair();
        let (ct, shared_sender) = kem::encapsulate(&receiver.public).unwrap();
        let sender_key = kdf::derive_message_key(&shared_sender);

        let blob = aead::seal(&sender_key, &plaintext).unwrap();

        let shared_receiver = kem::decapsulate(&receiver.secret, &ct).unwrap();
        let receiver_key = kdf::derive_message_key(&shared_receiver);
        prop_assert_eq!(aead::open(&receiver_key, &blob).unwrap(), plaintext);
    }
}
