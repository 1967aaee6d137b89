// mapsend.rs — world transfer workers
//
// Compression runs off the hot loop. Each client owns an Outbox shared with
// its worker: an atomic transfer state, a mutex-guarded append buffer for
// streamed chunks, and a handoff slot for the whole-map gzip blob. Workers
// never touch the socket; the main loop polls the outbox every tick.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use parking_lot::Mutex;

use crate::client::client_supports_extension;
use crate::server::Server;
use cubit_common::log::log_error;
use cubit_common::protocol::PACKET_LEVEL_CHUNK;

/// Streamed chunks stop being appended while the outbox is within one
/// packet of this size; the worker sleeps a tick and retries.
pub const OUTBOX_CAPACITY: usize = 32 * 1024;

/// A level chunk packet: id, length, 1024 data bytes, progress.
pub const CHUNK_PACKET_LEN: usize = 1 + 2 + 1024 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MapsendState {
    None = 0,
    Running = 1,
    Success = 2,
    Sent = 3,
    Failure = 4,
}

pub struct Outbox {
    connected: AtomicBool,
    state: AtomicU8,
    /// Bytes produced by the streamed worker, drained by the main loop.
    pub shared: Mutex<Vec<u8>>,
    /// Whole-map gzip handoff.
    mapgz: Mutex<Option<Vec<u8>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            state: AtomicU8::new(MapsendState::None as u8),
            shared: Mutex::new(Vec::new()),
            mapgz: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MapsendState {
        match self.state.load(Ordering::Acquire) {
            1 => MapsendState::Running,
            2 => MapsendState::Success,
            3 => MapsendState::Sent,
            4 => MapsendState::Failure,
            _ => MapsendState::None,
        }
    }

    pub fn set_state(&self, state: MapsendState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Workers poll this; set when the client leaves so they can exit.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn put_mapgz(&self, data: Vec<u8>) {
        *self.mapgz.lock() = Some(data);
    }

    pub fn take_mapgz(&self) -> Option<Vec<u8>> {
        self.mapgz.lock().take()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-map transfer: `u32 block count || raw blocks`, remapped to
/// fallback ids for peers without CustomBlocks, gzip-compressed as one
/// blob and handed back for the main loop to chunk out.
pub fn start_gzip(server: &Server, idx: usize) {
    let client = &server.clients[idx];
    let customblocks = client_supports_extension(client, "CustomBlocks", 1);
    let outbox = Arc::clone(&client.outbox);
    let fallback = server.registry.fallback_table();

    let volume = server.map.volume() as u32;
    let mut data = Vec::with_capacity(4 + volume as usize);
    data.extend_from_slice(&volume.to_be_bytes());
    data.extend_from_slice(&server.map.blocks);

    outbox.set_state(MapsendState::Running);

    thread::spawn(move || {
        if !customblocks {
            for b in data[4..].iter_mut() {
                *b = fallback[*b as usize];
            }
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        let result = encoder.write_all(&data).and_then(|_| encoder.finish());

        match result {
            Ok(gz) => {
                outbox.put_mapgz(gz);
                outbox.set_state(MapsendState::Success);
            }
            Err(e) => {
                log_error(&format!("Failed to compress map data: {}", e));
                outbox.set_state(MapsendState::Failure);
            }
        }
    });
}

/// Streamed FastMap transfer: raw deflate of the block array, emitted as
/// level chunk packets into the outbox, paced against the main loop's
/// drain rate.
pub fn start_fast(server: &Server, idx: usize) {
    let outbox = Arc::clone(&server.clients[idx].outbox);
    let blocks = server.map.blocks.clone();

    outbox.set_state(MapsendState::Running);

    thread::spawn(move || {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        let compressed = match encoder.write_all(&blocks).and_then(|_| encoder.finish()) {
            Ok(c) => c,
            Err(e) => {
                log_error(&format!("Failed to compress map data: {}", e));
                outbox.set_state(MapsendState::Failure);
                return;
            }
        };

        for chunk in compressed.chunks(1024) {
            loop {
                if !outbox.is_connected() {
                    return;
                }
                if outbox.shared.lock().len() + CHUNK_PACKET_LEN < OUTBOX_CAPACITY {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }

            let mut shared = outbox.shared.lock();
            shared.push(PACKET_LEVEL_CHUNK);
            shared.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
            let mut data = [0u8; 1024];
            data[..chunk.len()].copy_from_slice(chunk);
            shared.extend_from_slice(&data);
            shared.push(0);
        }

        outbox.set_state(MapsendState::Success);
    });
}
