// server.rs — core server state
//
// One Server value owns everything: the listening socket, the client
// roster (slot index doubles as the remote avatar id), the map, the block
// registry, the world RNG, and the name-lists. It is built in main and
// passed by reference into every operation; there are no globals and no
// back-pointers.

use std::net::TcpListener;

use crate::blocks::BlockRegistry;
use crate::client::Client;
use crate::config::Config;
use crate::map::Map;
use crate::namelist::NameList;
use cubit_common::rng::Rng;

/// Software name announced in the CPE handshake, heartbeat, and the
/// WebSocket upgrade response.
pub const SOFTWARE_NAME: &str = "Cubit";

pub const TICK_RATE: u64 = 20;
pub const HEARTBEAT_INTERVAL: f64 = 45.0;

/// Inbound socket read window per client per tick.
pub const CLIENT_BUFFER_SIZE: usize = 32 * 1024;

pub struct Server {
    pub listener: Option<TcpListener>,
    pub port: u16,

    /// Running 64-bit simulation tick counter.
    pub tick: u64,

    /// Ordered roster; a client's index is its avatar id on the wire.
    pub clients: Vec<Client>,

    pub map: Map,
    pub registry: BlockRegistry,
    pub rng: Rng,

    /// 16 printable characters, regenerated each run unless pinned.
    pub salt: String,

    pub last_heartbeat: f64,
    pub last_snapshot: f64,

    pub ops: NameList,
    pub banned_users: NameList,
    pub banned_ips: NameList,
    pub whitelist: NameList,

    pub config: Config,
}

impl Server {
    /// Socket-less server around a given map, for exercising the world
    /// and protocol state machines in tests.
    pub fn for_tests(map: Map) -> Self {
        let mut config = Config::default();
        config.server.offline = true;

        Self {
            listener: None,
            port: 0,
            tick: 0,
            clients: Vec::new(),
            map,
            registry: BlockRegistry::new(),
            rng: Rng::new(1),
            salt: "0123456789ABCDEF".to_string(),
            last_heartbeat: 0.0,
            last_snapshot: 0.0,
            ops: NameList::empty(),
            banned_users: NameList::empty(),
            banned_ips: NameList::empty(),
            whitelist: NameList::empty(),
            config,
        }
    }
}
