// client.rs — per-connection record and protocol state machine
//
// A client moves through: accepted, identifying, optional CPE negotiation,
// map transfer, spawned. All packet handling runs on the main thread; the
// only concurrent party is the map transfer worker behind the outbox.
//
// The roster index is the client's avatar id, so every function here takes
// the server context plus an index rather than a client reference.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use md5::{Digest, Md5};

use crate::blocks::{AIR, NUM_BLOCKS};
use crate::cpe::{CUSTOMBLOCKS_LEVEL, SUPPORTED_EXTENSIONS};
use crate::map::map_set;
use crate::mapsend::{self, MapsendState, Outbox};
use crate::server::{Server, CLIENT_BUFFER_SIZE, SOFTWARE_NAME};
use crate::sv_main::server_broadcast;
use crate::ws::{self, WsConn};
use cubit_common::buffer::ByteBuffer;
use cubit_common::log::{log_error, log_info};
use cubit_common::protocol::*;
use cubit_common::util::get_time_s;

const PING_INTERVAL: f64 = 1.0;

/// Level chunks pushed from the gzip blob per tick.
const CHUNKS_PER_TICK: usize = 4;

pub struct Client {
    pub stream: Option<TcpStream>,
    pub addr: String,
    pub port: u16,

    pub idx: usize,
    pub connected: bool,
    pub is_op: bool,
    pub name: String,
    pub spawned: bool,

    pub in_buffer: ByteBuffer,
    pub out_buffer: ByteBuffer,

    /// Shared with the map transfer worker.
    pub outbox: Arc<Outbox>,
    /// Gzip blob being chunked out to the client.
    pub mapgz: Option<ByteBuffer>,

    pub last_ping: f64,
    /// Last measured round trip in seconds.
    pub ping: f64,
    pub ping_key: u16,

    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,

    /// Extensions the peer announced, name and version.
    pub extensions: Vec<(String, i32)>,
    /// Entries still expected after the peer's ExtInfo.
    pub pending_extensions: usize,
    pub got_extinfo: bool,
    /// -1 until the peer reports its CustomBlocks support level.
    pub customblocks_support: i32,

    pub ws: WsConn,
}

impl Client {
    pub fn new(
        stream: Option<TcpStream>,
        idx: usize,
        addr: String,
        port: u16,
        x: f32,
        y: f32,
        z: f32,
    ) -> Self {
        Self {
            stream,
            addr,
            port,
            idx,
            connected: true,
            is_op: false,
            name: String::new(),
            spawned: false,
            in_buffer: ByteBuffer::with_capacity(CLIENT_BUFFER_SIZE),
            out_buffer: ByteBuffer::growable(),
            outbox: Arc::new(Outbox::new()),
            mapgz: None,
            last_ping: 0.0,
            ping: 0.0,
            ping_key: 0,
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            extensions: Vec::new(),
            pending_extensions: 0,
            got_extinfo: false,
            customblocks_support: -1,
            ws: WsConn::default(),
        }
    }
}

pub fn client_supports_extension(client: &Client, name: &str, version: i32) -> bool {
    client
        .extensions
        .iter()
        .any(|(n, v)| n.eq_ignore_ascii_case(name) && *v == version)
}

/// `md5(salt || name)` as lowercase hex, compared case-insensitively.
pub fn client_verify_key(salt: &str, name: &str, key: &str) -> bool {
    let mut hasher = Md5::new();
    hasher.update(salt.as_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let expected: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    expected.eq_ignore_ascii_case(key)
}

enum SendOutcome {
    Ok,
    Fatal,
}

fn transport_fatal(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

/// Push queued bytes to the socket. Unsent bytes stay at the front of the
/// buffer for the next tick. SIGPIPE is not a concern: the Rust runtime
/// ignores it, so a dead peer surfaces as BrokenPipe here.
fn send_raw(stream: &mut TcpStream, buf: &mut ByteBuffer) -> SendOutcome {
    let len = buf.tell();
    if len == 0 {
        return SendOutcome::Ok;
    }

    match stream.write(&buf.as_slice()[..len]) {
        Ok(n) => {
            if n < len {
                buf.as_mut_slice().copy_within(n..len, 0);
                buf.seek(len - n);
            } else {
                buf.seek(0);
            }
            SendOutcome::Ok
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
            SendOutcome::Ok
        }
        Err(e) if transport_fatal(e.kind()) => SendOutcome::Fatal,
        Err(e) => {
            log_error(&format!("send error: {}", e));
            SendOutcome::Ok
        }
    }
}

/// Flush the outbound buffer, wrapping it in WebSocket frames when the
/// transport was upgraded. On a dead socket the client is only marked;
/// the roster sweep handles the fan-out.
pub fn client_flush(client: &mut Client) {
    if !client.connected {
        return;
    }

    let outcome = if client.ws.active {
        let len = client.out_buffer.tell();
        if len > 0 {
            let data = client.out_buffer.as_slice()[..len].to_vec();
            ws::wrap_frames(&mut client.ws.out, &data);
            client.out_buffer.seek(0);
        }
        match client.stream.as_mut() {
            Some(stream) => send_raw(stream, &mut client.ws.out),
            None => return,
        }
    } else {
        match client.stream.as_mut() {
            Some(stream) => send_raw(stream, &mut client.out_buffer),
            None => return,
        }
    };

    if let SendOutcome::Fatal = outcome {
        client.connected = false;
        client.outbox.mark_disconnected();
    }
}

enum ReadOutcome {
    Quiet,
    Data(usize),
    Fatal,
}

fn client_read(client: &mut Client) -> ReadOutcome {
    let Some(stream) = client.stream.as_mut() else {
        return ReadOutcome::Quiet;
    };

    client.in_buffer.seek(0);
    match stream.read(client.in_buffer.as_mut_slice()) {
        // A zero-byte read is a quiet tick, not EOF; dead peers surface
        // through the error kinds below.
        Ok(0) => ReadOutcome::Quiet,
        Ok(n) => ReadOutcome::Data(n),
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
            ReadOutcome::Quiet
        }
        Err(e) if transport_fatal(e.kind()) => ReadOutcome::Fatal,
        Err(e) => {
            log_error(&format!("recv error: {}", e));
            ReadOutcome::Quiet
        }
    }
}

fn client_receive(server: &mut Server, idx: usize) {
    match client_read(&mut server.clients[idx]) {
        ReadOutcome::Quiet => {}
        ReadOutcome::Fatal => {
            let client = &mut server.clients[idx];
            client.connected = false;
            client.outbox.mark_disconnected();
            client_drop_fanout(server, idx, "Disconnected");
        }
        ReadOutcome::Data(r) => {
            let (can_switch, ws_active, is_http) = {
                let client = &server.clients[idx];
                (
                    client.ws.can_switch,
                    client.ws.active,
                    r >= 4 && &client.in_buffer.as_slice()[..4] == b"GET ",
                )
            };

            if can_switch && is_http {
                ws::upgrade(server, idx, r);
            } else if ws_active {
                ws::handle_packet(server, idx, r);
            } else {
                let mut buf = std::mem::take(&mut server.clients[idx].in_buffer);
                buf.seek(0);
                handle_in_buffer(server, idx, &mut buf, r);
                server.clients[idx].in_buffer = buf;
            }
        }
    }
}

pub fn client_tick(server: &mut Server, idx: usize) {
    if !server.clients[idx].connected {
        return;
    }

    client_receive(server, idx);
    if !server.clients[idx].connected {
        return;
    }

    let now = get_time_s();
    {
        let client = &mut server.clients[idx];
        if client.connected && client.spawned && now - client.last_ping >= PING_INTERVAL {
            if client_supports_extension(client, "TwoWayPing", 1) {
                client.ping_key = rand::random::<u16>();
                client.out_buffer.write_u8(PACKET_TWO_WAY_PING);
                client.out_buffer.write_u8(1);
                client.out_buffer.write_u16be(client.ping_key);
            } else {
                client.out_buffer.write_u8(PACKET_PING);
            }
            client.last_ping = now;
            client_flush(client);
        }
    }

    // Bytes the streamed transfer worker produced since last tick.
    {
        let client = &mut server.clients[idx];
        let mut shared = client.outbox.shared.lock();
        if !shared.is_empty() {
            client.out_buffer.write(&shared);
            shared.clear();
        }
    }

    match server.clients[idx].outbox.state() {
        MapsendState::Success => {
            // The success store happens after the worker's last append;
            // pick up chunks still in the outbox before closing the level.
            {
                let client = &mut server.clients[idx];
                let mut shared = client.outbox.shared.lock();
                if !shared.is_empty() {
                    client.out_buffer.write(&shared);
                    shared.clear();
                }
            }

            if server.clients[idx].mapgz.is_none() {
                if let Some(gz) = server.clients[idx].outbox.take_mapgz() {
                    server.clients[idx].mapgz = Some(ByteBuffer::from_vec(gz));
                }
            }

            for _ in 0..CHUNKS_PER_TICK {
                let exhausted = match server.clients[idx].mapgz.as_mut() {
                    None => true,
                    Some(buf) => buf.tell() == buf.len(),
                };

                if exhausted {
                    finish_map_send(server, idx);
                    break;
                }

                let client = &mut server.clients[idx];
                if let Some(buf) = client.mapgz.as_mut() {
                    let mut data = [0u8; 1024];
                    let len = buf.read(&mut data);
                    client.out_buffer.write_u8(PACKET_LEVEL_CHUNK);
                    client.out_buffer.write_u16be(len as u16);
                    client.out_buffer.write(&data);
                    client.out_buffer.write_u8(0);
                    client_flush(client);
                }
            }
        }
        MapsendState::Failure => {
            server.clients[idx].outbox.set_state(MapsendState::None);
            client_disconnect(server, idx, "Failed to send map data");
        }
        _ => {}
    }

    client_flush(&mut server.clients[idx]);
}

/// The transfer is complete: finish the level, place the avatar, exchange
/// spawn packets with everyone already in the world, and announce the join.
fn finish_map_send(server: &mut Server, idx: usize) {
    server.clients[idx].outbox.set_state(MapsendState::Sent);
    server.clients[idx].mapgz = None;

    let (width, depth, height) = (
        server.map.width as u16,
        server.map.depth as u16,
        server.map.height as u16,
    );

    {
        let client = &mut server.clients[idx];
        client.out_buffer.write_u8(PACKET_LEVEL_FINISH);
        client.out_buffer.write_u16be(width);
        client.out_buffer.write_u16be(depth);
        client.out_buffer.write_u16be(height);
        client_flush(client);

        // The client's own avatar uses id -1.
        client.out_buffer.write_u8(PACKET_PLAYER_POS_ANGLE);
        client.out_buffer.write_i8(-1);
        client.out_buffer.write_i16be(float2fixed(client.x));
        client.out_buffer.write_i16be(float2fixed(client.y));
        client.out_buffer.write_i16be(float2fixed(client.z));
        client.out_buffer.write_i8(degrees2fixed(client.yaw));
        client.out_buffer.write_i8(degrees2fixed(client.pitch));
        client_flush(client);
    }

    let newcomer = {
        let c = &server.clients[idx];
        (c.idx as u8, c.name.clone(), c.x, c.y, c.z, c.yaw, c.pitch)
    };

    let others: Vec<(u8, String, f32, f32, f32, f32, f32)> = server
        .clients
        .iter()
        .filter(|c| c.idx != idx && c.spawned)
        .map(|c| (c.idx as u8, c.name.clone(), c.x, c.y, c.z, c.yaw, c.pitch))
        .collect();

    {
        let client = &mut server.clients[idx];
        for other in &others {
            write_spawn(&mut client.out_buffer, other);
            client_flush(client);
        }
    }

    for j in 0..server.clients.len() {
        if j == idx || !server.clients[j].spawned {
            continue;
        }
        let other = &mut server.clients[j];
        write_spawn(&mut other.out_buffer, &newcomer);
        client_flush(other);
    }

    server.clients[idx].spawned = true;

    let name = server.clients[idx].name.clone();
    server_broadcast(server, &format!("&f{} &ejoined the game.", name));
}

fn write_spawn(out: &mut ByteBuffer, player: &(u8, String, f32, f32, f32, f32, f32)) {
    let (id, name, x, y, z, yaw, pitch) = player;
    out.write_u8(PACKET_PLAYER_SPAWN);
    out.write_u8(*id);
    out.write_mcstr(name, true);
    out.write_i16be(float2fixed(*x));
    out.write_i16be(float2fixed(*y));
    out.write_i16be(float2fixed(*z));
    out.write_i8(degrees2fixed(*yaw));
    out.write_i8(degrees2fixed(*pitch));
}

/// Complete the login after identification and CPE negotiation: announce
/// the custom-block level, send the server ident, push custom text
/// colours, and kick off the map transfer.
fn client_login(server: &mut Server, idx: usize) {
    let (cp437, customblocks, textcolours, support) = {
        let client = &server.clients[idx];
        (
            client_supports_extension(client, "FullCP437", 1),
            client_supports_extension(client, "CustomBlocks", 1),
            client_supports_extension(client, "TextColors", 1),
            client.customblocks_support,
        )
    };

    let client = &mut server.clients[idx];

    if customblocks && support == -1 {
        client.out_buffer.write_u8(PACKET_CUSTOM_BLOCK_SUPPORT_LEVEL);
        client.out_buffer.write_u8(CUSTOMBLOCKS_LEVEL);
        client_flush(client);
    }

    let client = &mut server.clients[idx];
    let user_type = if client.is_op { USER_TYPE_OP } else { 0x00 };
    client.out_buffer.write_u8(PACKET_IDENT);
    client.out_buffer.write_u8(PROTOCOL_VERSION);
    client
        .out_buffer
        .write_mcstr(&server.config.server.name, !cp437);
    client
        .out_buffer
        .write_mcstr(&server.config.server.motd, !cp437);
    client.out_buffer.write_u8(user_type);
    client_flush(client);

    if textcolours {
        let client = &mut server.clients[idx];
        for colour in &server.config.colours {
            client.out_buffer.write_u8(PACKET_SET_TEXT_COLOUR);
            client.out_buffer.write_u8(colour.r);
            client.out_buffer.write_u8(colour.g);
            client.out_buffer.write_u8(colour.b);
            client.out_buffer.write_u8(colour.a);
            client.out_buffer.write_u8(colour.code);
        }
        client_flush(client);
    }

    // With CustomBlocks in play the transfer waits for the peer's support
    // level; the response handler resumes it.
    if !customblocks {
        client_send_level(server, idx);
    }
}

/// Announce the level transfer and start the producer the peer can take.
pub fn client_send_level(server: &mut Server, idx: usize) {
    let fastmap = {
        let client = &server.clients[idx];
        client_supports_extension(client, "FastMap", 1)
            && client.customblocks_support >= CUSTOMBLOCKS_LEVEL as i32
    };

    if fastmap {
        let volume = server.map.volume() as u32;
        let client = &mut server.clients[idx];
        client.out_buffer.write_u8(PACKET_LEVEL_INIT);
        client.out_buffer.write_u32be(volume);
        client_flush(client);
        mapsend::start_fast(server, idx);
    } else {
        let client = &mut server.clients[idx];
        client.out_buffer.write_u8(PACKET_LEVEL_INIT);
        client_flush(client);
        mapsend::start_gzip(server, idx);
    }
}

fn protocol_error(server: &mut Server, idx: usize, what: &str) {
    let client = &server.clients[idx];
    log_error(&format!(
        "client {} ({}): {}",
        idx,
        if client.name.is_empty() {
            &client.addr
        } else {
            &client.name
        },
        what
    ));
    client_disconnect(server, idx, "Invalid data.");
}

/// Decode and dispatch every packet in `buf[..limit]`.
pub fn handle_in_buffer(server: &mut Server, idx: usize, buf: &mut ByteBuffer, limit: usize) {
    macro_rules! field {
        ($read:expr) => {
            match $read {
                Some(v) => v,
                None => {
                    protocol_error(server, idx, "truncated packet");
                    return;
                }
            }
        };
    }

    while server.clients[idx].connected && buf.tell() < limit {
        let packet_id = field!(buf.read_u8());

        match packet_id {
            PACKET_IDENT => {
                let _protocol = field!(buf.read_u8());
                let username = field!(buf.read_mcstr());
                let key = field!(buf.read_mcstr());
                let trailer = field!(buf.read_u8());

                server.clients[idx].ws.can_switch = false;
                let supports_cpe = trailer == CPE_MAGIC;

                if server.clients.len() > server.config.server.max_players {
                    client_disconnect(server, idx, "This server is full.");
                    return;
                }

                let taken = server
                    .clients
                    .iter()
                    .any(|c| c.idx != idx && c.name.eq_ignore_ascii_case(&username));
                if taken {
                    client_disconnect(server, idx, "Name already in use.");
                    return;
                }

                if server.banned_users.contains(&username)
                    || server.banned_ips.contains(&server.clients[idx].addr)
                {
                    client_disconnect(server, idx, "You are banned from this server!");
                    return;
                }

                if server.config.server.whitelist && !server.whitelist.contains(&username) {
                    client_disconnect(server, idx, "You are not whitelisted on this server.");
                    return;
                }

                if !server.config.server.offline
                    && !client_verify_key(&server.salt, &username, &key)
                {
                    client_disconnect(server, idx, "Authentication failed.");
                    return;
                }

                {
                    let is_op = server.ops.contains(&username);
                    let client = &mut server.clients[idx];
                    client.name = username;
                    client.is_op = is_op;
                }

                if supports_cpe {
                    let client = &mut server.clients[idx];
                    client.out_buffer.write_u8(PACKET_EXTINFO);
                    client.out_buffer.write_mcstr(SOFTWARE_NAME, false);
                    client
                        .out_buffer
                        .write_u16be(SUPPORTED_EXTENSIONS.len() as u16);
                    for (name, version) in SUPPORTED_EXTENSIONS {
                        client.out_buffer.write_u8(PACKET_EXTENTRY);
                        client.out_buffer.write_mcstr(name, false);
                        client.out_buffer.write_i32be(*version);
                    }
                    client_flush(client);
                } else {
                    client_login(server, idx);
                }
            }

            PACKET_EXTINFO => {
                let appname = field!(buf.read_mcstr());
                let count = field!(buf.read_u16be());

                let client = &mut server.clients[idx];
                client.got_extinfo = true;
                client.pending_extensions = count as usize;
                client.extensions.reserve(count as usize);

                log_info(&format!(
                    "Client using {} with {} extensions",
                    appname, count
                ));

                if count == 0 {
                    client_login(server, idx);
                }
            }

            PACKET_EXTENTRY => {
                let name = field!(buf.read_mcstr());
                let version = field!(buf.read_i32be());

                {
                    let client = &mut server.clients[idx];
                    if !client.got_extinfo
                        || client.extensions.len() >= client.pending_extensions
                    {
                        protocol_error(server, idx, "extension entry overrun");
                        return;
                    }
                    client.extensions.push((name, version));
                }

                let client = &server.clients[idx];
                if client.extensions.len() == client.pending_extensions {
                    client_login(server, idx);
                }
            }

            PACKET_SET_BLOCK_CLIENT => {
                let x = field!(buf.read_u16be()) as usize;
                let y = field!(buf.read_u16be()) as usize;
                let z = field!(buf.read_u16be()) as usize;
                let mode = field!(buf.read_u8());
                let block = field!(buf.read_u8());

                if block as usize >= NUM_BLOCKS {
                    protocol_error(server, idx, "unknown block id");
                    return;
                }
                if !server.map.pos_valid(x, y, z) {
                    continue;
                }

                let old = server.map.get(x, y, z);
                let placing = mode != 0x00;
                let denied = !server.clients[idx].is_op
                    && ((placing && server.registry.info(block).op_only_place)
                        || (!placing && server.registry.info(old).op_only_break));

                if denied {
                    // Revert the peer's local prediction.
                    let client = &mut server.clients[idx];
                    client.out_buffer.write_u8(PACKET_SET_BLOCK_SERVER);
                    client.out_buffer.write_u16be(x as u16);
                    client.out_buffer.write_u16be(y as u16);
                    client.out_buffer.write_u16be(z as u16);
                    client.out_buffer.write_u8(old);
                    client_flush(client);
                    continue;
                }

                map_set(server, x, y, z, if placing { block } else { AIR });
            }

            PACKET_MESSAGE => {
                let _unused = field!(buf.read_u8());
                let mut msg = field!(buf.read_mcstr());

                // Peers must not inject colour codes.
                msg = msg.replace('%', "&");

                if server.clients[idx].spawned {
                    let name = server.clients[idx].name.clone();
                    server_broadcast(server, &format!("&e{}: &f{}", name, msg));
                }
            }

            PACKET_PLAYER_POS_ANGLE => {
                let _id = field!(buf.read_i8());
                let x = field!(buf.read_i16be());
                let y = field!(buf.read_i16be());
                let z = field!(buf.read_i16be());
                let yaw = field!(buf.read_i8());
                let pitch = field!(buf.read_i8());

                let (id, fx, fy, fz, fyaw, fpitch) = {
                    let client = &mut server.clients[idx];
                    client.x = fixed2float(x);
                    client.y = fixed2float(y);
                    client.z = fixed2float(z);
                    client.yaw = fixed2degrees(yaw);
                    client.pitch = fixed2degrees(pitch);
                    (
                        client.idx as i8,
                        client.x,
                        client.y,
                        client.z,
                        client.yaw,
                        client.pitch,
                    )
                };

                for j in 0..server.clients.len() {
                    if j == idx || !server.clients[j].connected {
                        continue;
                    }
                    let other = &mut server.clients[j];
                    other.out_buffer.write_u8(PACKET_PLAYER_POS_ANGLE);
                    other.out_buffer.write_i8(id);
                    other.out_buffer.write_i16be(float2fixed(fx));
                    other.out_buffer.write_i16be(float2fixed(fy));
                    other.out_buffer.write_i16be(float2fixed(fz));
                    other.out_buffer.write_i8(degrees2fixed(fyaw));
                    other.out_buffer.write_i8(degrees2fixed(fpitch));
                    client_flush(other);
                }
            }

            PACKET_CUSTOM_BLOCK_SUPPORT_LEVEL => {
                let level = field!(buf.read_u8());
                server.clients[idx].customblocks_support = level as i32;
                client_send_level(server, idx);
            }

            PACKET_TWO_WAY_PING => {
                let direction = field!(buf.read_u8());
                let data = field!(buf.read_u16be());

                let client = &mut server.clients[idx];
                if direction == 0 {
                    client.out_buffer.write_u8(PACKET_TWO_WAY_PING);
                    client.out_buffer.write_u8(direction);
                    client.out_buffer.write_u16be(data);
                    client_flush(client);
                } else if data == client.ping_key {
                    client.ping = get_time_s() - client.last_ping;
                }
            }

            other => {
                protocol_error(server, idx, &format!("unknown packet 0x{:02x}", other));
                return;
            }
        }
    }
}

/// Leave announcement and despawn fan-out; runs once per departure.
pub fn client_drop_fanout(server: &mut Server, idx: usize, msg: &str) {
    if !server.clients[idx].spawned {
        return;
    }
    server.clients[idx].spawned = false;

    let name = server.clients[idx].name.clone();
    let id = server.clients[idx].idx as i8;
    server_broadcast(
        server,
        &format!("&f{} &edisconnected (&f{}&e)", name, msg),
    );

    for j in 0..server.clients.len() {
        if j == idx || !server.clients[j].connected {
            continue;
        }
        let other = &mut server.clients[j];
        other.out_buffer.write_u8(PACKET_PLAYER_DESPAWN);
        other.out_buffer.write_i8(id);
        client_flush(other);
    }
}

/// Send a final reason and take the client out of the world. Safe to call
/// on an already-dead connection.
pub fn client_disconnect(server: &mut Server, idx: usize, msg: &str) {
    if server.clients[idx].connected {
        let filter = !client_supports_extension(&server.clients[idx], "FullCP437", 1);
        let client = &mut server.clients[idx];
        client.out_buffer.write_u8(PACKET_PLAYER_DISCONNECT);
        client.out_buffer.write_mcstr(msg, filter);
        client_flush(client);

        if client.ws.active {
            ws::queue_close(client, 1000);
            client_flush(client);
        }
    }

    server.clients[idx].connected = false;
    server.clients[idx].outbox.mark_disconnected();

    client_drop_fanout(server, idx, msg);
}
