//! Property-based tests for SEI encoding and injection.
//!
//! These tests check the emulation-prevention invariant, the encoded length
//! formula, the store round trip, and that every payload injected into a
//! keyframe can be read back out of it.

use std::time::Duration;

use proptest::prelude::*;
use strata_sei::config::{QueueConfig, SeiConfig};
use strata_sei::processor::{inject_messages, insert_unit};
use strata_sei::sei::*;
use strata_sei::store::MessageStore;
use strata_sei::SeiPublisher;

const KEYFRAME: [u8; 28] = [
    0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, // SPS
    0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80, // PPS
    0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR
    0xFF, 0xFF, 0xFF, 0xFF,
];

/// Payloads skewed towards zero runs, which is where escaping happens.
fn payload(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=max),
        prop::collection::vec(0u8..=3, 0..=max),
        prop::collection::vec(prop_oneof![Just(0u8), Just(1u8), Just(0xFFu8)], 0..=max),
    ]
}

/// Payload sizes around the 0xFF size-field boundaries (size = len + 16).
fn boundary_len() -> impl Strategy<Value = usize> {
    prop_oneof![
        Just(0usize),
        Just(238), // size 254: one byte
        Just(239), // size 255: FF 00
        Just(240),
        Just(400),
        0usize..=400,
    ]
}

fn has_start_code_emulation(body: &[u8]) -> bool {
    body.windows(3)
        .any(|w| w[0] == 0x00 && w[1] == 0x00 && w[2] <= 0x03)
}

// ─── Encoder ─────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn encoded_body_never_emulates_start_code(data in payload(400)) {
        let unit = encode_user_data_unregistered(&STRATA_SEI_UUID, &data).unwrap();
        prop_assert_eq!(&unit[..4], &[0x00, 0x00, 0x00, 0x01][..]);
        prop_assert!(!has_start_code_emulation(&unit[4..]));
    }

    #[test]
    fn arbitrary_body_is_escaped(body in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut nal = vec![0x00, 0x00, 0x00, 0x01];
        nal.extend_from_slice(&body);
        let out = apply_emulation_prevention(&nal).unwrap();
        prop_assert_eq!(&out[..4], &nal[..4]);
        prop_assert!(!has_start_code_emulation(&out[4..]));
        prop_assert_eq!(strip_emulation_prevention(&out[4..]), body);
    }

    #[test]
    fn unescaped_length_matches_formula(len in boundary_len(), fill in any::<u8>()) {
        let data = vec![fill; len];
        let unit = encode_user_data_unregistered(&STRATA_SEI_UUID, &data).unwrap();
        let raw = strip_emulation_prevention(&unit[4..]);
        let expected = 4 + 2 + (len + 16) / 255 + 1 + 16 + len + 1;
        prop_assert_eq!(raw.len() + 4, expected);
        prop_assert_eq!(raw_unit_len(len), expected);
        prop_assert_eq!(*raw.last().unwrap(), 0x80);
    }

    #[test]
    fn encoded_payload_extracts_back(data in payload(400)) {
        let unit = encode_user_data_unregistered(&STRATA_SEI_UUID, &data).unwrap();
        let found = extract_user_data(&unit, &STRATA_SEI_UUID);
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(&found[0][..], &data[..]);
    }
}

// ─── Store ───────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn store_round_trips_in_order(
        payloads in prop::collection::vec(payload(400), 0..=15),
        repeat in 1u32..5,
    ) {
        let store = MessageStore::new(&QueueConfig::default(), Duration::from_millis(100));
        for p in &payloads {
            store.enqueue(p, repeat).unwrap();
        }
        let drained = store.dequeue_all().unwrap();
        prop_assert_eq!(drained.len(), payloads.len());
        for (message, original) in drained.iter().zip(&payloads) {
            prop_assert_eq!(&message.payload[..], &original[..]);
            prop_assert_eq!(message.repeat_count, repeat);
        }
        prop_assert_eq!(store.size().unwrap(), 0);
    }

    #[test]
    fn store_keeps_newest_on_overflow(extra in 1usize..40) {
        let store = MessageStore::new(&QueueConfig::default(), Duration::from_millis(100));
        let total = 15 + extra;
        for i in 0..total {
            store.enqueue(&(i as u32).to_be_bytes(), 1).unwrap();
        }
        prop_assert_eq!(store.size().unwrap(), 15);
        let first = store.dequeue_all().unwrap().remove(0);
        prop_assert_eq!(&first.payload[..], &(extra as u32).to_be_bytes()[..]);
    }
}

// ─── Injection ───────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn injection_grows_by_units_times_repeats(
        messages in prop::collection::vec((payload(200), 1u32..4), 1..6),
    ) {
        let store = MessageStore::new(&QueueConfig::default(), Duration::from_millis(100));
        let mut expected_growth = 0;
        let mut expected_payloads = Vec::new();
        for (data, repeat) in &messages {
            store.enqueue(data, *repeat).unwrap();
            let unit = encode_user_data_unregistered(&STRATA_SEI_UUID, data).unwrap();
            expected_growth += unit.len() * *repeat as usize;
            for _ in 0..*repeat {
                expected_payloads.push(data.clone());
            }
        }

        let out = inject_messages(
            KEYFRAME.to_vec(),
            store.dequeue_all().unwrap(),
            &STRATA_SEI_UUID,
            insert_unit,
        );
        prop_assert_eq!(out.len(), KEYFRAME.len() + expected_growth);
        prop_assert_eq!(out.messages_inserted, messages.len());
        prop_assert_eq!(&out.data[..16], &KEYFRAME[..16]);
        prop_assert_eq!(&out.data[out.len() - 12..], &KEYFRAME[16..]);

        let found: Vec<Vec<u8>> = extract_user_data(&out.data, &STRATA_SEI_UUID)
            .iter()
            .map(|b| b.to_vec())
            .collect();
        prop_assert_eq!(found, expected_payloads);
    }

    #[test]
    fn text_envelopes_always_fit(text in ".{0,600}") {
        let publisher = SeiPublisher::new(SeiConfig::default());
        publisher.enqueue_text(&text).unwrap();
        let messages = publisher.store().dequeue_all().unwrap();
        prop_assert!(messages[0].payload.len() <= 400);
        let json: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
        prop_assert!(text.starts_with(json["text"].as_str().unwrap()));
    }
}
