// sv_main.rs — server lifecycle and the per-tick loop
//
// The loop is single threaded and cooperative: accept, world tick, client
// ticks, roster sweep, heartbeat cadence. No call in here may block; all
// sockets are non-blocking and slow work runs on workers.

use std::io;
use std::net::TcpListener;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng as _;
use socket2::{Domain, Protocol, Socket, Type};

use crate::client::{client_disconnect, client_drop_fanout, client_flush, client_tick, Client};
use crate::config::Config;
use crate::heartbeat::server_heartbeat;
use crate::map::{map_tick, Map};
use crate::mapgen;
use crate::namelist::NameList;
use crate::server::{Server, HEARTBEAT_INTERVAL};
use crate::worldsave;
use cubit_common::log::{log_error, log_info};
use cubit_common::protocol::PACKET_MESSAGE;
use cubit_common::rng::Rng;
use cubit_common::util::get_time_s;

const SALT_LENGTH: usize = 16;

/// Open the listening socket, load or generate the world, and assemble
/// the server. The first heartbeat goes out before the first tick.
pub fn server_init(config: Config) -> io::Result<Server> {
    let listener = open_listener(config.server.port)?;
    let port = listener.local_addr()?.port();
    log_info(&format!("Server is listening on port {}", port));

    let seed = if config.map.seed != 0 {
        config.map.seed as i32
    } else {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i32)
            .unwrap_or(1)
    };

    let salt = if config.debug.fixed_salt.is_empty() {
        generate_salt()
    } else {
        config.debug.fixed_salt.clone()
    };

    let mut server = Server {
        listener: Some(listener),
        port,
        tick: 0,
        clients: Vec::new(),
        map: Map::new(&config.map.name, 0, 0, 0),
        registry: crate::blocks::BlockRegistry::new(),
        rng: Rng::new(seed),
        salt,
        last_heartbeat: 0.0,
        last_snapshot: 0.0,
        ops: NameList::load("ops.txt"),
        banned_users: NameList::load("banned_users.txt"),
        banned_ips: NameList::load("banned_ips.txt"),
        whitelist: NameList::load("whitelist.txt"),
        config,
    };

    log_info("Preparing map...");
    match worldsave::load(&server.config.map.name) {
        Some(map) => server.map = map,
        None => {
            log_info(&format!(
                "Failed to load map '{}', generating new...",
                server.config.map.name
            ));
            server.map = Map::new(
                &server.config.map.name,
                server.config.map.width,
                server.config.map.depth,
                server.config.map.height,
            );

            let generator = server.config.map.generator.clone();
            let start = get_time_s();
            mapgen::generate(&mut server, &generator);
            log_info(&format!(
                "Map generation took {:.3} seconds",
                get_time_s() - start
            ));

            worldsave::save(&mut server.map, server.tick);
        }
    }

    server_heartbeat(&server);
    server.last_heartbeat = get_time_s();

    Ok(server)
}

fn open_listener(port: u16) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;

    let addr: std::net::SocketAddrV4 = format!("0.0.0.0:{}", port)
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad bind address"))?;
    socket.bind(&socket2::SockAddr::from(addr))?;
    socket.listen(10)?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// One 50 ms step of the whole server.
pub fn server_tick(server: &mut Server) {
    server_accept(server);
    map_tick(server);

    for idx in 0..server.clients.len() {
        client_tick(server, idx);
    }

    sweep_roster(server);

    if get_time_s() - server.last_heartbeat > HEARTBEAT_INTERVAL {
        server_heartbeat(server);
        server.last_heartbeat = get_time_s();
    }

    server.tick += 1;
}

/// Accept every pending connection and seat it into the roster. Banned
/// addresses get a reason and an immediate close.
fn server_accept(server: &mut Server) {
    loop {
        let accepted = match &server.listener {
            Some(listener) => listener.accept(),
            None => return,
        };

        match accepted {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    log_error(&format!("set_nonblocking: {}", e));
                }
                if let Err(e) = stream.set_nodelay(true) {
                    log_error(&format!("set_nodelay: {}", e));
                }

                let ip = addr.ip().to_string();
                log_info(&format!("Incoming connection from {}:{}", ip, addr.port()));

                let idx = server.clients.len();
                let span_x = server.map.width.clamp(1, 1023) as i32;
                let span_z = server.map.height.clamp(1, 1023) as i32;
                let x = server.rng.next(span_x) as f32 + 0.5;
                let z = server.rng.next(span_z) as f32 + 0.5;
                let y = server.map.top(x as usize, z as usize) as f32 + 2.0;

                server
                    .clients
                    .push(Client::new(Some(stream), idx, ip.clone(), addr.port(), x, y, z));

                if server.banned_ips.contains(&ip) {
                    log_info(&format!("Rejecting banned address {}", ip));
                    client_disconnect(server, idx, "You are banned from this server!");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                log_error(&format!("accept error: {}", e));
                return;
            }
        }
    }
}

/// Remove dead clients and compact the roster. Slots double as avatar ids,
/// so survivors are renumbered. The world is persisted whenever the last
/// client leaves.
fn sweep_roster(server: &mut Server) {
    let mut removed = false;
    let mut i = 0;
    while i < server.clients.len() {
        if server.clients[i].connected {
            i += 1;
            continue;
        }

        if server.clients[i].spawned {
            // Transport died without a goodbye.
            client_drop_fanout(server, i, "Disconnected");
        }

        server.clients[i].outbox.mark_disconnected();
        server.clients.remove(i);
        removed = true;
    }

    if removed {
        for (i, client) in server.clients.iter_mut().enumerate() {
            client.idx = i;
        }

        if server.clients.is_empty() {
            worldsave::save(&mut server.map, server.tick);
        }
    }
}

/// Colour-tagged message to the console and every connected client.
pub fn server_broadcast(server: &mut Server, msg: &str) {
    log_info(msg);

    for client in server.clients.iter_mut() {
        if !client.connected {
            continue;
        }
        let filter = !crate::client::client_supports_extension(client, "FullCP437", 1);
        client.out_buffer.write_u8(PACKET_MESSAGE);
        client.out_buffer.write_u8(0xFF);
        client.out_buffer.write_mcstr(msg, filter);
        client_flush(client);
    }
}

pub fn server_shutdown(server: &mut Server) {
    for idx in 0..server.clients.len() {
        client_disconnect(server, idx, "Server shutting down.");
    }
    worldsave::save(&mut server.map, server.tick);
    log_info("Server stopped.");
}

/// 16 characters drawn uniformly from [0-9A-Za-z], fresh each run.
fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}
