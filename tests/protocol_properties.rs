// tests/protocol_properties.rs
//! Property tests for frame validation, decoding and the envelope

use emg_stream::hal::AcquisitionMode;
use emg_stream::processing::{EnvelopeComputer, EnvelopeConfig, EnvelopeTracker};
use emg_stream::protocol::{
    check, decode_channel_code, encode_channel_code, Calibration, Frame, FrameAssembler,
    FrameEvent, ResyncPolicy, SampleDecoder,
};
use proptest::prelude::*;

fn envelope_config() -> impl Strategy<Value = EnvelopeConfig> {
    (1usize..64)
        .prop_flat_map(|window| (Just(window), 0..window))
        .prop_map(|(window, overlap)| EnvelopeConfig::new(window, overlap).unwrap())
}

proptest! {
    #[test]
    fn valid_iff_markers_and_checksum(bytes in prop::array::uniform13(any::<u8>())) {
        let payload_xor = bytes[2..10].iter().fold(0u8, |acc, b| acc ^ b);
        let expected = bytes[0] == 0x3C
            && bytes[1] == 0x3C
            && bytes[11] == 0x3E
            && bytes[12] == 0x3E
            && bytes[10] == payload_xor;
        prop_assert_eq!(check(&bytes).is_valid(), expected);
        prop_assert_eq!(Frame::from_bytes(bytes).validate().is_ok(), expected);
    }

    #[test]
    fn encoded_frames_validate(payload in prop::array::uniform8(any::<u8>())) {
        let frame = Frame::encode(payload);
        let valid = frame.validate().unwrap();
        prop_assert_eq!(valid.payload(), payload);
    }

    #[test]
    fn any_checksum_corruption_is_rejected(
        payload in prop::array::uniform8(any::<u8>()),
        flip in 1u8..=255,
    ) {
        let mut bytes = *Frame::encode(payload).as_bytes();
        bytes[10] ^= flip;
        prop_assert!(!check(&bytes).is_valid());
    }

    #[test]
    fn channel_codes_round_trip(code in -8_388_608i32..=8_388_607) {
        prop_assert_eq!(decode_channel_code(encode_channel_code(code)), code);
    }

    #[test]
    fn decoding_is_pure(payload in prop::array::uniform8(any::<u8>())) {
        let valid = Frame::encode(payload).validate().unwrap();
        for mode in [AcquisitionMode::Test, AcquisitionMode::Normal] {
            let decoder = SampleDecoder::new(mode, &Calibration::default());
            let first = decoder.decode(&valid);
            prop_assert_eq!(first, decoder.decode(&valid));
            prop_assert_eq!(first.channels().len(), mode.channel_count());

            let code = decode_channel_code([payload[0], payload[1], payload[2]]);
            prop_assert_eq!(first.channel(0), Some(f64::from(code) * decoder.scale_factor()));
        }
    }

    #[test]
    fn chunking_does_not_change_frames(
        payloads in prop::collection::vec(prop::array::uniform8(any::<u8>()), 1..40),
        chunk in 1usize..40,
    ) {
        let stream: Vec<u8> = payloads
            .iter()
            .flat_map(|p| Frame::encode(*p).as_bytes().to_vec())
            .collect();

        let mut assembler = FrameAssembler::new(ResyncPolicy::Fixed);
        let mut decoded = Vec::new();
        for piece in stream.chunks(chunk) {
            assembler.push(piece);
            while let Some(event) = assembler.next_event() {
                match event {
                    FrameEvent::Valid(frame) => decoded.push(frame.payload()),
                    FrameEvent::Invalid(fault) => prop_assert!(false, "unexpected fault {}", fault),
                }
            }
        }
        prop_assert_eq!(decoded, payloads);
        prop_assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn constant_series_envelope(
        config in envelope_config(),
        value in 0.0f64..1.0e4,
        len in 0usize..400,
    ) {
        let series = vec![value; len];
        let envelope = EnvelopeComputer::new(config).compute(&series);
        prop_assert_eq!(envelope.len(), len);
        for &e in &envelope {
            // covered indices carry the constant, the uncovered tail stays zero
            prop_assert!(e == 0.0 || (e - value).abs() <= 1e-9 * value.max(1.0));
        }
    }

    #[test]
    fn zero_series_envelope(config in envelope_config(), len in 0usize..400) {
        let envelope = EnvelopeComputer::new(config).compute(&vec![0.0; len]);
        prop_assert!(envelope.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn incremental_envelope_matches_full(
        config in envelope_config(),
        series in prop::collection::vec(-1.0e3f64..1.0e3, 0..300),
        steps in prop::collection::vec(0usize..50, 1..20),
    ) {
        let computer = EnvelopeComputer::new(config);
        let mut tracker = EnvelopeTracker::new(config);
        let mut len = 0;
        for step in steps {
            len = (len + step).min(series.len());
            let incremental = tracker.update(&series[..len]).to_vec();
            prop_assert_eq!(incremental, computer.compute(&series[..len]));
        }
        let full = tracker.update(&series).to_vec();
        prop_assert_eq!(full, computer.compute(&series));
    }
}
