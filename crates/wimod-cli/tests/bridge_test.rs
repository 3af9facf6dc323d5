//! End-to-end tests of the TCP bridge against a fake module listening on
//! loopback.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wimod_cli::{ConnectionConfig, TcpBridge};
use wimod_hci::constants::*;
use wimod_hci::saps::DeviceManagement;
use wimod_hci::{slip, HciCodec, HciConfig, HciError, HciMessage, SlipDecoder, SlipMarkers};

// ============================================================================
// Fake Module
// ============================================================================

fn encode(codec: &HciCodec, msg: &HciMessage) -> Vec<u8> {
    let frame = codec.encode_frame(msg).expect("encode reply");
    slip::encode(&frame, &SlipMarkers::default())
}

fn answer(req: &HciMessage) -> Option<HciMessage> {
    match (req.sap_id, req.msg_id) {
        (DEVMGMT_SAP_ID, DEVMGMT_MSG_PING_REQ) => {
            Some(HciMessage::new(DEVMGMT_SAP_ID, DEVMGMT_MSG_PING_RSP, vec![STATUS_OK]))
        }
        (DEVMGMT_SAP_ID, DEVMGMT_MSG_GET_DEVICE_INFO_REQ) => Some(HciMessage::new(
            DEVMGMT_SAP_ID,
            DEVMGMT_MSG_GET_DEVICE_INFO_RSP,
            vec![STATUS_OK, 0x90, 0x34, 0x12, 0x10, 0x00, 0x78, 0x56, 0x34, 0x12],
        )),
        // Everything else goes unanswered.
        _ => None,
    }
}

/// Serve one connection: decode requests, write replies. Returns the
/// requests seen once the host disconnects.
fn serve(listener: TcpListener) -> JoinHandle<Vec<HciMessage>> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let codec = HciCodec::default();
        let mut decoder = SlipDecoder::new(SlipMarkers::default(), DEFAULT_MAX_FRAME_SIZE);
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            for frame in decoder.push(&buf[..n]).into_iter().flatten() {
                let Ok(req) = codec.decode_frame(&frame) else {
                    continue;
                };
                if let Some(rsp) = answer(&req) {
                    if stream.write_all(&encode(&codec, &rsp)).is_err() {
                        return seen;
                    }
                }
                seen.push(req);
            }
        }
        seen
    })
}

fn start() -> (TcpBridge, JoinHandle<Vec<HciMessage>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let connection = ConnectionConfig {
        address: listener.local_addr().expect("local addr").to_string(),
        ..ConnectionConfig::default()
    };
    let module = serve(listener);
    let config = HciConfig {
        default_timeout_ms: 300,
        ..HciConfig::default()
    };
    let bridge = TcpBridge::connect(&connection, config).expect("connect bridge");
    (bridge, module)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_ping_and_device_info_over_tcp() {
    let (bridge, module) = start();
    let devmgmt = DeviceManagement::attach(bridge.client().clone(), |_| {}).expect("attach");

    devmgmt.ping().expect("ping");
    let info = devmgmt.get_device_info().expect("device info");
    assert_eq!(info.module_type, 0x90);
    assert_eq!(info.device_address, 0x1234);
    assert_eq!(info.group_address, 0x10);
    assert_eq!(info.device_id, 0x1234_5678);

    let stats = bridge.client().stats();
    assert_eq!(stats.commands_sent, 2);
    assert_eq!(stats.responses, 2);

    bridge.shutdown();
    let seen = module.join().expect("module thread");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].msg_id, DEVMGMT_MSG_PING_REQ);
    assert_eq!(seen[1].msg_id, DEVMGMT_MSG_GET_DEVICE_INFO_REQ);
}

#[test]
fn test_unanswered_command_times_out_over_tcp() {
    let (bridge, module) = start();
    let devmgmt = DeviceManagement::attach(bridge.client().clone(), |_| {})
        .expect("attach")
        .with_timeout(Duration::from_millis(100));

    let err = devmgmt.reset().unwrap_err();
    assert!(matches!(err, HciError::Timeout { sap_id: DEVMGMT_SAP_ID, .. }), "got {:?}", err);

    // The slot is free again.
    devmgmt.ping().expect("ping after timeout");

    bridge.shutdown();
    module.join().expect("module thread");
}

#[test]
fn test_peer_disconnect_closes_core() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let connection = ConnectionConfig {
        address: listener.local_addr().expect("local addr").to_string(),
        ..ConnectionConfig::default()
    };
    let module = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        drop::<TcpStream>(stream);
    });
    let bridge = TcpBridge::connect(&connection, HciConfig::default()).expect("connect bridge");
    module.join().expect("module thread");

    let client = bridge.client().clone();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !client.is_closed() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(client.is_closed());
    assert!(matches!(
        client.send_command(DEVMGMT_SAP_ID, DEVMGMT_MSG_PING_REQ, Vec::new(), Duration::from_millis(50)),
        Err(HciError::TransportClosed)
    ));
    bridge.shutdown();
}
