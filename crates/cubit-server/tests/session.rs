// session.rs — end-to-end protocol sessions against a live server
//
// Each test binds an ephemeral port, drives the tick loop by hand, and
// speaks the classic wire from the client side of a real TCP connection.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use cubit_server::config::Config;
use cubit_server::server::Server;
use cubit_server::sv_main::{server_init, server_tick};

const PACKET_IDENT: u8 = 0x00;
const PACKET_PING: u8 = 0x01;
const PACKET_LEVEL_INIT: u8 = 0x02;
const PACKET_LEVEL_CHUNK: u8 = 0x03;
const PACKET_LEVEL_FINISH: u8 = 0x04;
const PACKET_SET_BLOCK_SERVER: u8 = 0x06;
const PACKET_PLAYER_SPAWN: u8 = 0x07;
const PACKET_PLAYER_POS_ANGLE: u8 = 0x08;
const PACKET_PLAYER_DESPAWN: u8 = 0x0c;
const PACKET_MESSAGE: u8 = 0x0d;
const PACKET_PLAYER_DISCONNECT: u8 = 0x0e;
const PACKET_EXTINFO: u8 = 0x10;
const PACKET_EXTENTRY: u8 = 0x11;
const PACKET_CUSTOM_BLOCK_SUPPORT_LEVEL: u8 = 0x13;
const PACKET_SET_TEXT_COLOUR: u8 = 0x27;
const PACKET_TWO_WAY_PING: u8 = 0x2b;

fn payload_len(id: u8) -> usize {
    match id {
        PACKET_IDENT => 130,
        PACKET_PING => 0,
        PACKET_LEVEL_INIT => 0,
        PACKET_LEVEL_CHUNK => 1027,
        PACKET_LEVEL_FINISH => 6,
        PACKET_SET_BLOCK_SERVER => 7,
        PACKET_PLAYER_SPAWN => 73,
        PACKET_PLAYER_POS_ANGLE => 9,
        PACKET_PLAYER_DESPAWN => 1,
        PACKET_MESSAGE => 65,
        PACKET_PLAYER_DISCONNECT => 64,
        PACKET_EXTINFO => 66,
        PACKET_EXTENTRY => 68,
        PACKET_CUSTOM_BLOCK_SUPPORT_LEVEL => 1,
        PACKET_SET_TEXT_COLOUR => 5,
        PACKET_TWO_WAY_PING => 3,
        other => panic!("unexpected server packet 0x{:02x}", other),
    }
}

/// Split a raw byte stream into (id, payload) packets.
fn split_packets(bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut packets = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let id = bytes[pos];
        let len = payload_len(id);
        assert!(
            pos + 1 + len <= bytes.len(),
            "truncated 0x{:02x} at {}",
            id,
            pos
        );
        packets.push((id, bytes[pos + 1..pos + 1 + len].to_vec()));
        pos += 1 + len;
    }
    packets
}

fn mcstr(text: &str) -> [u8; 64] {
    let mut out = [b' '; 64];
    let bytes = text.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

fn read_mcstr(raw: &[u8]) -> String {
    let mut end = raw.len();
    while end > 0 && raw[end - 1] == b' ' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn ident_bytes(name: &str, trailer: u8) -> Vec<u8> {
    let mut out = vec![PACKET_IDENT, 0x07];
    out.extend_from_slice(&mcstr(name));
    out.extend_from_slice(&mcstr(""));
    out.push(trailer);
    out
}

struct Harness {
    server: Server,
    world: String,
}

impl Harness {
    fn start(tag: &str) -> Self {
        let world = std::env::temp_dir()
            .join(format!("cubit-session-{}-{}", tag, std::process::id()))
            .to_string_lossy()
            .into_owned();

        let mut config = Config::default();
        config.server.offline = true;
        config.server.port = 0;
        config.map.name = world.clone();
        config.map.width = 16;
        config.map.depth = 16;
        config.map.height = 16;
        config.map.generator = "flat".to_string();

        let server = server_init(config).expect("server start");
        Self { server, world }
    }

    fn connect(&mut self) -> TcpStream {
        let stream = TcpStream::connect(("127.0.0.1", self.server.port)).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        stream.set_nodelay(true).unwrap();
        // Let the accept land.
        self.pump(2);
        stream
    }

    fn pump(&mut self, ticks: usize) {
        for _ in 0..ticks {
            server_tick(&mut self.server);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Tick and collect until `done` accepts the bytes so far.
    fn pump_until(
        &mut self,
        stream: &mut TcpStream,
        collected: &mut Vec<u8>,
        done: impl Fn(&[u8]) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(collected) {
            assert!(Instant::now() < deadline, "timed out waiting for packets");
            server_tick(&mut self.server);
            read_available(stream, collected);
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(format!("{}.cw", self.world));
    }
}

fn read_available(stream: &mut TcpStream, out: &mut Vec<u8>) {
    let mut buf = [0u8; 65536];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
}

fn contains_packet(bytes: &[u8], id: u8) -> bool {
    // Stream may end mid-packet while the transfer runs; parse leniently.
    let mut pos = 0;
    while pos < bytes.len() {
        let pid = bytes[pos];
        let len = payload_len(pid);
        if pid == id && pos + 1 + len <= bytes.len() {
            return true;
        }
        pos += 1 + len;
    }
    false
}

#[test]
fn connect_and_spawn_sequence() {
    let mut harness = Harness::start("spawn");
    let mut stream = harness.connect();

    stream.write_all(&ident_bytes("alice", 0x00)).unwrap();

    let mut bytes = Vec::new();
    harness.pump_until(&mut stream, &mut bytes, |b| {
        contains_packet(b, PACKET_PLAYER_POS_ANGLE)
    });

    let packets = split_packets(&bytes);

    assert_eq!(packets[0].0, PACKET_IDENT);
    assert_eq!(packets[0].1[0], 0x07);
    assert_eq!(read_mcstr(&packets[0].1[1..65]), "Unnamed server");

    assert_eq!(packets[1].0, PACKET_LEVEL_INIT);

    let chunk_count = packets
        .iter()
        .filter(|(id, _)| *id == PACKET_LEVEL_CHUNK)
        .count();
    assert!(chunk_count >= 1);

    let finish = packets
        .iter()
        .find(|(id, _)| *id == PACKET_LEVEL_FINISH)
        .expect("level finish");
    assert_eq!(
        finish.1,
        vec![0, 16, 0, 16, 0, 16],
        "level finish carries the map dimensions"
    );

    let pos = packets
        .iter()
        .find(|(id, _)| *id == PACKET_PLAYER_POS_ANGLE)
        .expect("own position");
    assert_eq!(pos.1[0] as i8, -1);

    // Alone on the server: nobody to spawn.
    assert!(!packets.iter().any(|(id, _)| *id == PACKET_PLAYER_SPAWN));
}

#[test]
fn cpe_handshake_lists_extensions() {
    let mut harness = Harness::start("cpe");
    let mut stream = harness.connect();

    stream.write_all(&ident_bytes("alice", 0x42)).unwrap();

    let mut bytes = Vec::new();
    harness.pump_until(&mut stream, &mut bytes, |b| {
        contains_packet(b, PACKET_EXTINFO) && b.len() >= 67
    });
    // Give the entry packets a tick to arrive in full.
    harness.pump(2);
    read_available(&mut stream, &mut bytes);

    let packets = split_packets(&bytes);
    assert_eq!(packets[0].0, PACKET_EXTINFO);

    let count = u16::from_be_bytes([packets[0].1[64], packets[0].1[65]]) as usize;
    assert!(count > 0);
    assert_eq!(packets.len(), 1 + count);

    let names: Vec<String> = packets[1..]
        .iter()
        .map(|(id, payload)| {
            assert_eq!(*id, PACKET_EXTENTRY);
            read_mcstr(&payload[..64])
        })
        .collect();
    assert!(names.iter().any(|n| n == "FastMap"));
    assert!(names.iter().any(|n| n == "CustomBlocks"));
    assert!(names.iter().any(|n| n == "TwoWayPing"));
}

#[test]
fn websocket_upgrade_and_framed_session() {
    let mut harness = Harness::start("ws");
    let mut stream = harness.connect();

    let request = "GET /server HTTP/1.1\r\n\
        Host: 127.0.0.1\r\n\
        Connection: Upgrade\r\n\
        Upgrade: WebSocket\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Sec-WebSocket-Protocol: ClassiCube\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        \r\n";
    stream.write_all(request.as_bytes()).unwrap();

    let mut bytes = Vec::new();
    harness.pump_until(&mut stream, &mut bytes, |b| {
        b.windows(4).any(|w| w == b"\r\n\r\n")
    });

    let response = String::from_utf8_lossy(&bytes).into_owned();
    assert!(response.starts_with("HTTP/1.1 101"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    assert!(response.contains("Sec-WebSocket-Protocol: ClassiCube"));

    // Classic Ident inside a masked binary frame.
    let payload = ident_bytes("webalice", 0x00);
    let mask = [0x12u8, 0x34, 0x56, 0x78];
    let mut frame = vec![0x82, 0x80 | 126];
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(&mask);
    frame.extend(
        payload
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ mask[i % 4]),
    );
    stream.write_all(&frame).unwrap();

    let mut framed = Vec::new();
    harness.pump_until(&mut stream, &mut framed, |b| b.len() >= 4);

    // The reply is a binary server frame wrapping the classic ident.
    assert_eq!(framed[0], 0x82);
    let (header, first_payload_at) = if framed[1] == 126 {
        (u16::from_be_bytes([framed[2], framed[3]]) as usize, 4)
    } else {
        (framed[1] as usize, 2)
    };
    assert!(header >= 1);
    assert_eq!(framed[first_payload_at], PACKET_IDENT);
    assert_eq!(framed[first_payload_at + 1], 0x07);
}

#[test]
fn two_player_position_echo() {
    let mut harness = Harness::start("echo");

    let mut alice = harness.connect();
    alice.write_all(&ident_bytes("alice", 0x00)).unwrap();
    let mut alice_bytes = Vec::new();
    harness.pump_until(&mut alice, &mut alice_bytes, |b| {
        contains_packet(b, PACKET_PLAYER_POS_ANGLE)
    });

    let mut bob = harness.connect();
    bob.write_all(&ident_bytes("bob", 0x00)).unwrap();
    let mut bob_bytes = Vec::new();
    harness.pump_until(&mut bob, &mut bob_bytes, |b| {
        contains_packet(b, PACKET_PLAYER_POS_ANGLE)
    });

    // Drain the join traffic alice got while bob spawned.
    read_available(&mut alice, &mut alice_bytes);

    // Alice moves; fixed-point floor(v * 32).
    let mut packet = vec![PACKET_PLAYER_POS_ANGLE, 0xFF];
    packet.extend_from_slice(&336i16.to_be_bytes());
    packet.extend_from_slice(&2048i16.to_be_bytes());
    packet.extend_from_slice(&656i16.to_be_bytes());
    packet.push(0);
    packet.push(0);
    alice.write_all(&packet).unwrap();

    let mut echoed = Vec::new();
    harness.pump_until(&mut bob, &mut echoed, |b| {
        split_packets_lenient(b)
            .iter()
            .any(|(id, p)| *id == PACKET_PLAYER_POS_ANGLE && p[0] != 0xFF)
    });

    let packets = split_packets_lenient(&echoed);
    let echo = packets
        .iter()
        .find(|(id, p)| *id == PACKET_PLAYER_POS_ANGLE && p[0] != 0xFF)
        .expect("relayed position");

    assert_eq!(echo.1[0], 0, "avatar id is alice's roster slot");
    assert_eq!(i16::from_be_bytes([echo.1[1], echo.1[2]]), 336);
    assert_eq!(i16::from_be_bytes([echo.1[3], echo.1[4]]), 2048);
    assert_eq!(i16::from_be_bytes([echo.1[5], echo.1[6]]), 656);
}

/// Like `split_packets` but stops at a trailing partial packet.
fn split_packets_lenient(bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut packets = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let id = bytes[pos];
        let len = payload_len(id);
        if pos + 1 + len > bytes.len() {
            break;
        }
        packets.push((id, bytes[pos + 1..pos + 1 + len].to_vec()));
        pos += 1 + len;
    }
    packets
}
