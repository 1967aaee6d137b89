// ws.rs — WebSocket transport for browser clients
//
// A connection may switch to WebSocket exactly once, before the first
// classic packet: if the inbound bytes start with "GET " while the switch
// window is open, the HTTP upgrade is attempted. After the 101 response,
// everything travels in binary frames. Client frames must be masked;
// server frames are sent unmasked with FIN set.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::client::{client_drop_fanout, client_flush, handle_in_buffer, Client};
use crate::server::{Server, SOFTWARE_NAME};
use cubit_common::buffer::ByteBuffer;
use cubit_common::httputil::HttpHeaders;
use cubit_common::log::log_error;

const WS_ACCEPT_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest payload the server puts in a single outbound frame.
const MAX_FRAME_PAYLOAD: usize = 32 * 1024;

const OPCODE_CONTINUATION: u8 = 0x00;
const OPCODE_BINARY: u8 = 0x02;
const OPCODE_CLOSE: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    HeaderByte1,
    ExtLen16,
    Mask,
    Data,
}

pub struct WsConn {
    /// Upgrade window: open until the first classic Ident is observed.
    pub can_switch: bool,
    pub active: bool,
    pub state: WsState,
    pub opcode: u8,
    pub frame_len: usize,
    pub frame_read: usize,
    pub mask: [u8; 4],
    pub frame: Vec<u8>,
    /// Socket-facing buffer of wrapped frames.
    pub out: ByteBuffer,
}

impl Default for WsConn {
    fn default() -> Self {
        Self {
            can_switch: true,
            active: false,
            state: WsState::HeaderByte1,
            opcode: 0,
            frame_len: 0,
            frame_read: 0,
            mask: [0; 4],
            frame: Vec::new(),
            out: ByteBuffer::growable(),
        }
    }
}

/// `base64(sha1(key || magic))` per RFC 6455.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_ACCEPT_MAGIC.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Attempt the HTTP upgrade from the first `r` inbound bytes.
pub fn upgrade(server: &mut Server, idx: usize, r: usize) {
    let text = {
        let client = &server.clients[idx];
        String::from_utf8_lossy(&client.in_buffer.as_slice()[..r]).into_owned()
    };

    let headers = HttpHeaders::parse(&text);

    let connection_ok = headers
        .get("Connection")
        .map(|c| c.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    let upgrade_ok = headers
        .get("Upgrade")
        .map(|u| u.eq_ignore_ascii_case("WebSocket"))
        .unwrap_or(false);
    let version_ok = headers.get("Sec-WebSocket-Version") == Some("13");
    let protocol_ok = headers
        .get("Sec-WebSocket-Protocol")
        .map(|p| p.eq_ignore_ascii_case("ClassiCube"))
        .unwrap_or(false);
    if !connection_ok || !upgrade_ok || !version_ok || !protocol_ok {
        crate::client::client_disconnect(server, idx, "");
        return;
    }
    let Some(key) = headers.get("Sec-WebSocket-Key") else {
        crate::client::client_disconnect(server, idx, "");
        return;
    };

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         Sec-WebSocket-Protocol: ClassiCube\r\n\
         Server: {}\r\n\
         \r\n",
        accept_key(key),
        SOFTWARE_NAME
    );

    let client = &mut server.clients[idx];
    client.out_buffer.write(response.as_bytes());
    // The response itself goes out on the raw transport; frames start after.
    client_flush(client);
    client.ws.active = true;
}

/// Feed the `r` freshly received bytes through the frame state machine.
pub fn handle_packet(server: &mut Server, idx: usize, r: usize) {
    while server.clients[idx].connected && server.clients[idx].in_buffer.tell() < r {
        handle_chunk(server, idx, r);
    }
}

fn handle_chunk(server: &mut Server, idx: usize, limit: usize) {
    loop {
        let client = &mut server.clients[idx];
        match client.ws.state {
            WsState::HeaderByte1 => {
                let (Some(b1), Some(b2)) =
                    (client.in_buffer.read_u8(), client.in_buffer.read_u8())
                else {
                    return;
                };
                client.ws.opcode = b1 & 0x0F;

                let flags = b2 & 0x7F;
                if flags == 127 {
                    // 64-bit lengths are out of protocol for this wire.
                    ws_close(server, idx, 1009, "Invalid data.");
                    return;
                }
                if flags == 126 {
                    client.ws.state = WsState::ExtLen16;
                    continue;
                }
                client.ws.frame_len = flags as usize;
                client.ws.state = WsState::Mask;
                continue;
            }

            WsState::ExtLen16 => {
                let Some(len) = client.in_buffer.read_u16be() else {
                    return;
                };
                client.ws.frame_len = len as usize;
                client.ws.state = WsState::Mask;
                continue;
            }

            WsState::Mask => {
                let mut mask = [0u8; 4];
                if client.in_buffer.read(&mut mask) != 4 {
                    return;
                }
                client.ws.mask = mask;
                client.ws.state = WsState::Data;
                continue;
            }

            WsState::Data => {
                if client.ws.frame.len() < client.ws.frame_len {
                    client.ws.frame.resize(client.ws.frame_len, 0);
                }

                let want = client.ws.frame_len - client.ws.frame_read;
                let available = limit.saturating_sub(client.in_buffer.tell());
                let take = want.min(available);
                if take > 0 {
                    let start = client.ws.frame_read;
                    client
                        .in_buffer
                        .read(&mut client.ws.frame[start..start + take]);
                    client.ws.frame_read += take;
                }

                if client.ws.frame_read == client.ws.frame_len {
                    decode_frame(server, idx);
                }
                return;
            }
        }
    }
}

/// Unmask a complete frame in place and dispatch it by opcode.
fn decode_frame(server: &mut Server, idx: usize) {
    let opcode;
    let len;
    {
        let client = &mut server.clients[idx];
        len = client.ws.frame_len;
        for i in 0..len {
            client.ws.frame[i] ^= client.ws.mask[i & 3];
        }
        opcode = client.ws.opcode;
        client.ws.frame_read = 0;
        client.ws.state = WsState::HeaderByte1;
    }

    match opcode {
        OPCODE_CONTINUATION | OPCODE_BINARY => {
            let data = std::mem::take(&mut server.clients[idx].ws.frame);
            let mut buf = ByteBuffer::from_vec(data);
            handle_in_buffer(server, idx, &mut buf, len);
            server.clients[idx].ws.frame = buf.into_vec();
        }
        OPCODE_CLOSE => {
            ws_close(server, idx, 1000, "Disconnected");
        }
        other => {
            log_error(&format!("Unsupported WebSocket opcode 0x{:02x}", other));
            ws_close(server, idx, 1003, "Invalid data.");
        }
    }
}

/// Wrap classic packet bytes into unmasked binary frames.
pub fn wrap_frames(out: &mut ByteBuffer, data: &[u8]) {
    for payload in data.chunks(MAX_FRAME_PAYLOAD) {
        out.write_u8(0x80 | OPCODE_BINARY);
        if payload.len() >= 126 {
            out.write_u8(126);
            out.write_u16be(payload.len() as u16);
        } else {
            out.write_u8(payload.len() as u8);
        }
        out.write(payload);
    }
}

/// Queue a close frame with the given code.
pub fn queue_close(client: &mut Client, code: u16) {
    client.ws.out.write_u8(0x80 | OPCODE_CLOSE);
    client.ws.out.write_u8(0x02);
    client.ws.out.write_u16be(code);
}

/// Close the transport with a status code and drop the client.
fn ws_close(server: &mut Server, idx: usize, code: u16, reason: &str) {
    {
        let client = &mut server.clients[idx];
        if client.connected {
            queue_close(client, code);
            client_flush(client);
        }
        client.connected = false;
        client.outbox.mark_disconnected();
    }
    client_drop_fanout(server, idx, reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_sample_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn short_frame_wrapping() {
        let mut out = ByteBuffer::growable();
        wrap_frames(&mut out, &[1, 2, 3]);
        let len = out.tell();
        assert_eq!(&out.as_slice()[..len], &[0x82, 3, 1, 2, 3]);
    }

    #[test]
    fn extended_frame_wrapping() {
        let data = vec![0xAB; 300];
        let mut out = ByteBuffer::growable();
        wrap_frames(&mut out, &data);
        let bytes = out.as_slice();
        assert_eq!(bytes[0], 0x82);
        assert_eq!(bytes[1], 126);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 300);
        assert_eq!(bytes[4], 0xAB);
    }

    #[test]
    fn oversize_payload_splits_into_frames() {
        let data = vec![0x11; MAX_FRAME_PAYLOAD + 10];
        let mut out = ByteBuffer::growable();
        wrap_frames(&mut out, &data);
        let bytes = out.as_slice();
        // First frame carries the cap; a second frame follows.
        assert_eq!(bytes[0], 0x82);
        assert_eq!(bytes[1], 126);
        let first = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        assert_eq!(first, MAX_FRAME_PAYLOAD);
        assert_eq!(bytes[4 + first], 0x82);
    }

    #[test]
    fn close_frame_layout() {
        let mut client =
            crate::client::Client::new(None, 0, "127.0.0.1".into(), 0, 0.5, 2.0, 0.5);
        queue_close(&mut client, 1009);
        let len = client.ws.out.tell();
        assert_eq!(&client.ws.out.as_slice()[..len], &[0x88, 0x02, 0x03, 0xF1]);
    }
}
