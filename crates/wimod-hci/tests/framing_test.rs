//! Receive pipeline tests: framing, checksum and resynchronization.
//!
//! These drive `HciReceiver::feed` directly with hand-built byte streams.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wimod_hci::constants::*;
use wimod_hci::{
    connect, crc, slip, ChannelTransport, HciClient, HciCodec, HciConfig, HciMessage, HciReceiver,
    SlipMarkers,
};

type Seen = Arc<Mutex<Vec<HciMessage>>>;

/// Core with one SAP whose indications are collected.
fn pipeline(config: HciConfig, sap_id: u8) -> (HciClient, HciReceiver, Seen) {
    let (transport, _wire) = ChannelTransport::unbounded();
    let (client, receiver) = connect(config, transport).expect("valid config");
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client
        .register(sap_id, move |msg| sink.lock().push(msg))
        .expect("register");
    (client, receiver, seen)
}

fn wire(codec: &HciCodec, markers: &SlipMarkers, msg: &HciMessage) -> Vec<u8> {
    slip::encode(&codec.encode_frame(msg).expect("encodable"), markers)
}

#[test]
fn test_byte_at_a_time_delivery() {
    let config = HciConfig::default();
    let codec = config.codec();
    let markers = config.markers;
    let (client, mut receiver, seen) = pipeline(config, RLT_SAP_ID);

    // Payload full of marker bytes to force escaping.
    let msg = HciMessage::new(
        RLT_SAP_ID,
        RLT_MSG_STATUS_IND,
        vec![SLIP_END, SLIP_ESC, 0x00, SLIP_ESC_END, SLIP_END, 0xFF],
    );
    let bytes = wire(&codec, &markers, &msg);

    let mut routed = 0;
    for b in &bytes {
        routed += receiver.feed(std::slice::from_ref(b)).unwrap();
    }
    assert_eq!(routed, 1);
    assert_eq!(*seen.lock(), vec![msg]);
    assert_eq!(client.stats().bytes_received, bytes.len() as u64);
}

#[test]
fn test_corrupted_byte_is_rejected_then_stream_recovers() {
    let config = HciConfig::default();
    let codec = config.codec();
    let markers = config.markers;
    let (client, mut receiver, seen) = pipeline(config, SENSORAPP_SAP_ID);

    let good = HciMessage::new(SENSORAPP_SAP_ID, SENSORAPP_MSG_ACK_IND, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let mut bad = wire(&codec, &markers, &good);
    // Flip a payload bit that is not a marker after escaping.
    let pos = bad.len() - 5;
    bad[pos] ^= 0x01;

    assert_eq!(receiver.feed(&bad).unwrap(), 0);
    assert!(seen.lock().is_empty());
    assert_eq!(client.stats().checksum_errors, 1);

    assert_eq!(receiver.feed(&wire(&codec, &markers, &good)).unwrap(), 1);
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_resync_after_bad_escape_and_truncated_frame() {
    let config = HciConfig::default();
    let codec = config.codec();
    let markers = config.markers;
    let (client, mut receiver, seen) = pipeline(config, REMOTECTRL_SAP_ID);

    let msg = HciMessage::new(REMOTECTRL_SAP_ID, REMOTE_CTRL_MSG_BUTTON_PRESSED_IND, vec![0; 7]);
    let mut stream = vec![0x11, 0x22, SLIP_ESC, 0x41, 0x33, 0x44];
    // Half a frame with no trailing END, then a complete one.
    let full = wire(&codec, &markers, &msg);
    stream.extend_from_slice(&full[..full.len() / 2]);
    stream.extend_from_slice(&full);

    assert_eq!(receiver.feed(&stream).unwrap(), 1);
    assert_eq!(*seen.lock(), vec![msg]);
    let stats = client.stats();
    assert_eq!(stats.framing_errors, 1);
    // The truncated half merges with garbage into one candidate that fails
    // its checksum.
    assert!(stats.checksum_errors + stats.decode_errors >= 1);
}

#[test]
fn test_oversized_frame_dropped() {
    let config = HciConfig {
        max_frame_size: 32,
        ..HciConfig::default()
    };
    let codec = config.codec();
    let markers = config.markers;
    let (client, mut receiver, seen) = pipeline(config, DEVMGMT_SAP_ID);

    let mut stream = vec![SLIP_END];
    stream.extend(std::iter::repeat(0x55).take(100));
    stream.extend(wire(&codec, &markers, &HciMessage::new(DEVMGMT_SAP_ID, 0x10, vec![9])));

    assert_eq!(receiver.feed(&stream).unwrap(), 1);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(client.stats().framing_errors, 1);
}

#[test]
fn test_custom_markers_end_to_end() {
    let config = HciConfig {
        markers: SlipMarkers {
            end: 0x7E,
            esc: 0x7D,
            esc_end: 0x5E,
            esc_esc: 0x5D,
        },
        ..HciConfig::default()
    };
    let codec = config.codec();
    let markers = config.markers;
    let (_client, mut receiver, seen) = pipeline(config, DEVMGMT_SAP_ID);

    let msg = HciMessage::new(DEVMGMT_SAP_ID, 0x10, vec![0x7E, 0x7D, 0xC0]);
    let bytes = wire(&codec, &markers, &msg);
    assert_eq!(bytes.first(), Some(&0x7E));
    assert_eq!(receiver.feed(&bytes).unwrap(), 1);
    assert_eq!(*seen.lock(), vec![msg]);
}

#[test]
fn test_random_noise_between_frames() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED_0001);
    let config = HciConfig::default();
    let codec = config.codec();
    let markers = config.markers;
    let (_client, mut receiver, seen) = pipeline(config, SENSORAPP_SAP_ID);

    let mut expected = Vec::new();
    for i in 0..50u8 {
        let noise_len = rng.gen_range(0..40);
        let noise: Vec<u8> = (0..noise_len).map(|_| rng.gen()).collect();
        receiver.feed(&noise).unwrap();

        let len = rng.gen_range(0..64);
        let mut payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        payload.insert(0, i);
        let msg = HciMessage::new(SENSORAPP_SAP_ID, SENSORAPP_MSG_SEND_DATA_IND, payload);
        receiver.feed(&wire(&codec, &markers, &msg)).unwrap();
        expected.push(msg);
    }

    // Noise may occasionally decode as a stray frame; every real frame must
    // arrive, in order.
    let seen = seen.lock();
    let delivered: Vec<_> = seen
        .iter()
        .filter(|m| m.msg_id == SENSORAPP_MSG_SEND_DATA_IND && expected.contains(m))
        .cloned()
        .collect();
    assert_eq!(delivered, expected);
}

#[test]
fn test_random_corruption_never_delivers_wrong_content() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED_0002);
    let config = HciConfig::default();
    let codec = config.codec();
    let markers = config.markers;
    let (client, mut receiver, seen) = pipeline(config, RLT_SAP_ID);

    let mut clean = 0usize;
    for _ in 0..200 {
        let len = rng.gen_range(1..32);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let msg = HciMessage::new(RLT_SAP_ID, RLT_MSG_STATUS_IND, payload);
        let mut frame = codec.encode_frame(&msg).unwrap();

        if rng.gen_bool(0.5) {
            let idx = rng.gen_range(0..frame.len());
            let bit = 1u8 << rng.gen_range(0..8);
            frame[idx] ^= bit;
            assert!(!crc::verify(&frame));
        } else {
            clean += 1;
        }
        receiver.feed(&slip::encode(&frame, &markers)).unwrap();
    }

    // Single-bit errors are always detected.
    assert_eq!(seen.lock().len(), clean);
    assert_eq!(client.stats().checksum_errors as usize, 200 - clean);
}
