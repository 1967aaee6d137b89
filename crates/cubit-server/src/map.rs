// map.rs — dense voxel grid and the scheduled-tick queue
//
// Blocks are 8-bit ids in layer-major order: index = (y*H + z)*W + x with
// y vertical. Mutation goes through `map_set`, which runs block callbacks,
// schedules neighbour ticks, and fans the change out to every client; the
// Map struct itself only holds data and bounds-checked accessors.
//
// Tick execution and mutation take the whole `Server` as context because
// callbacks recurse into `map_set` and broadcasts reach the roster. Nothing
// holds a back-pointer.

use crate::blocks::{self, AIR};
use crate::server::Server;
use cubit_common::protocol::*;
use cubit_common::util::get_time_s;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTick {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    /// Absolute server tick this entry fires on.
    pub due: u64,
}

pub struct Map {
    pub name: String,

    /// Horizontal extent along x.
    pub width: usize,
    /// Vertical extent (y).
    pub depth: usize,
    /// Horizontal extent along z.
    pub height: usize,

    pub blocks: Vec<u8>,

    /// Suppresses tick scheduling, fan-out, and the modified flag during
    /// bulk generation.
    pub generating: bool,
    /// Set on any mutation; consumed by persistence.
    pub modified: bool,

    pub ticks: Vec<ScheduledTick>,
}

impl Map {
    pub fn new(name: &str, width: usize, depth: usize, height: usize) -> Self {
        Self {
            name: name.to_string(),
            width,
            depth,
            height,
            blocks: vec![AIR; width * depth * height],
            generating: false,
            modified: false,
            ticks: Vec::new(),
        }
    }

    pub fn volume(&self) -> usize {
        self.width * self.depth * self.height
    }

    pub fn pos_valid(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.width && y < self.depth && z < self.height
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.height + z) * self.width + x
    }

    pub fn index_to_pos(&self, index: usize) -> (usize, usize, usize) {
        let layer = self.width * self.height;
        let y = index / layer;
        let rem = index - y * layer;
        let z = rem / self.width;
        let x = rem % self.width;
        (x, y, z)
    }

    /// Caller must ensure the position is in bounds.
    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.blocks[self.index(x, y, z)]
    }

    /// Bounds-checked raw store: no callbacks, no scheduling, no fan-out.
    /// Out-of-bounds writes are a silent no-op. Generators use this for
    /// bulk fills.
    pub fn set_raw(&mut self, x: usize, y: usize, z: usize, block: u8) {
        if self.pos_valid(x, y, z) {
            let idx = self.index(x, y, z);
            self.blocks[idx] = block;
        }
    }

    /// Highest non-air y in the column, or 0 if the column is empty.
    pub fn top(&self, x: usize, z: usize) -> usize {
        let mut y = self.depth;
        while y > 0 {
            y -= 1;
            if self.get(x, y, z) != AIR {
                break;
            }
        }
        y
    }

    /// Highest light-blocking y in the column, or 0.
    pub fn top_lit(&self, registry: &blocks::BlockRegistry, x: usize, z: usize) -> usize {
        let mut y = self.depth;
        while y > 0 {
            y -= 1;
            if registry.info(self.get(x, y, z)).blocks_light {
                break;
            }
        }
        y
    }
}

/// Mutate one cell. No-op when out of bounds or unchanged. Otherwise, in
/// order: grid store, old block's break callback, new block's place
/// callback, phase-aligned tick scheduling at the cell and its six
/// neighbours, fan-out to every client, modified flag. Scheduling, fan-out
/// and the flag are suppressed while generating.
pub fn map_set(server: &mut Server, x: usize, y: usize, z: usize, block: u8) {
    if !server.map.pos_valid(x, y, z) || server.map.get(x, y, z) == block {
        return;
    }

    let old = server.map.get(x, y, z);
    let idx = server.map.index(x, y, z);
    server.map.blocks[idx] = block;

    if let Some(f) = server.registry.info(old).on_break {
        f(server, x, y, z, old);
    }
    if let Some(f) = server.registry.info(block).on_place {
        f(server, x, y, z, block);
    }

    if server.map.generating {
        return;
    }

    let period = server.registry.info(block).tick_period;
    let now = server.tick;
    let dist = if period == 0 {
        0
    } else {
        ((now / period) + 1) * period - now
    };

    map_add_tick(server, x, y, z, dist);
    map_add_tick(server, x.wrapping_add(1), y, z, dist);
    map_add_tick(server, x.wrapping_sub(1), y, z, dist);
    map_add_tick(server, x, y.wrapping_sub(1), z, dist);
    map_add_tick(server, x, y.wrapping_add(1), z, dist);
    map_add_tick(server, x, y, z.wrapping_sub(1), dist);
    map_add_tick(server, x, y, z.wrapping_add(1), dist);

    // A place callback may have replaced the cell again (a liquid drying
    // next to a sponge); broadcast what is actually there.
    let current = server.map.get(x, y, z);
    for client in server.clients.iter_mut() {
        client.out_buffer.write_u8(PACKET_SET_BLOCK_SERVER);
        client.out_buffer.write_u16be(x as u16);
        client.out_buffer.write_u16be(y as u16);
        client.out_buffer.write_u16be(z as u16);
        client.out_buffer.write_u8(current);
    }

    server.map.modified = true;
}

/// Queue a tick `delay` server ticks from now. No-op when the cell is out
/// of bounds or the block there has no tick callback. Duplicates are
/// permitted.
pub fn map_add_tick(server: &mut Server, x: usize, y: usize, z: usize, delay: u64) {
    if !server.map.pos_valid(x, y, z) {
        return;
    }

    let block = server.map.get(x, y, z);
    if server.registry.info(block).on_tick.is_none() {
        return;
    }

    let due = server.tick + delay;
    server.map.ticks.push(ScheduledTick { x, y, z, due });
}

/// One simulation step: random ticks over volume/4096 cells, then every
/// due scheduled tick in enqueue order, then queue compaction and the
/// optional snapshot dispatch.
pub fn map_tick(server: &mut Server) {
    let samples = server.map.volume() / 4096;
    for _ in 0..samples {
        let x = server.rng.next(server.map.width as i32) as usize;
        let y = server.rng.next(server.map.depth as i32) as usize;
        let z = server.rng.next(server.map.height as i32) as usize;

        let block = server.map.get(x, y, z);
        if let Some(f) = server.registry.info(block).on_random_tick {
            f(server, x, y, z, block);
        }
    }

    let now = server.tick;
    let before = server.map.ticks.len();
    let mut i = 0;
    while i < server.map.ticks.len() {
        let entry = server.map.ticks[i];
        if entry.due > now {
            i += 1;
            continue;
        }

        server.map.ticks.remove(i);

        // The cell may have changed since enqueue; dispatch on what is
        // there now.
        let block = server.map.get(entry.x, entry.y, entry.z);
        if let Some(f) = server.registry.info(block).on_tick {
            f(server, entry.x, entry.y, entry.z, block);
        }
    }

    if server.map.ticks.len() != before {
        if server.map.ticks.is_empty() {
            server.map.ticks = Vec::new();
        } else {
            server.map.ticks.shrink_to_fit();
        }
    }

    let interval = server.config.map.snapshot_interval;
    if interval > 0.0 && get_time_s() - server.last_snapshot > interval {
        crate::mapimage::dispatch(server);
        server.last_snapshot = get_time_s();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::*;
    use crate::server::Server;

    fn test_server(w: usize, d: usize, h: usize) -> Server {
        Server::for_tests(Map::new("test", w, d, h))
    }

    #[test]
    fn layer_major_index() {
        let map = Map::new("t", 4, 5, 6);
        assert_eq!(map.index(0, 0, 0), 0);
        assert_eq!(map.index(1, 0, 0), 1);
        assert_eq!(map.index(0, 0, 1), 4);
        assert_eq!(map.index(0, 1, 0), 4 * 6);
        assert_eq!(map.index(3, 4, 5), (4 * 6 + 5) * 4 + 3);
    }

    #[test]
    fn index_roundtrip() {
        let map = Map::new("t", 7, 3, 5);
        for idx in 0..map.volume() {
            let (x, y, z) = map.index_to_pos(idx);
            assert!(map.pos_valid(x, y, z));
            assert_eq!(map.index(x, y, z), idx);
        }
    }

    #[test]
    fn get_returns_last_set() {
        let mut server = test_server(8, 8, 8);
        map_set(&mut server, 1, 2, 3, STONE);
        assert_eq!(server.map.get(1, 2, 3), STONE);
        map_set(&mut server, 1, 2, 3, GLASS);
        assert_eq!(server.map.get(1, 2, 3), GLASS);
        assert_eq!(server.map.get(0, 0, 0), AIR);
    }

    #[test]
    fn out_of_bounds_set_is_noop() {
        let mut server = test_server(4, 4, 4);
        map_set(&mut server, 4, 0, 0, STONE);
        map_set(&mut server, 0, 4, 0, STONE);
        map_set(&mut server, 0, 0, 4, STONE);
        assert!(server.map.blocks.iter().all(|&b| b == AIR));
        assert!(!server.map.modified);
    }

    #[test]
    fn set_marks_modified() {
        let mut server = test_server(4, 4, 4);
        assert!(!server.map.modified);
        map_set(&mut server, 0, 0, 0, STONE);
        assert!(server.map.modified);
    }

    #[test]
    fn generating_suppresses_schedule_and_modified() {
        let mut server = test_server(8, 8, 8);
        server.map.generating = true;
        map_set(&mut server, 2, 2, 2, SAND);
        assert_eq!(server.map.get(2, 2, 2), SAND);
        assert!(server.map.ticks.is_empty());
        assert!(!server.map.modified);
    }

    #[test]
    fn top_finds_highest_non_air() {
        let mut server = test_server(4, 16, 4);
        server.map.set_raw(1, 3, 1, STONE);
        server.map.set_raw(1, 7, 1, STONE);
        assert_eq!(server.map.top(1, 1), 7);
        assert_eq!(server.map.top(0, 0), 0);
    }

    #[test]
    fn top_lit_skips_clear_blocks() {
        let mut server = test_server(4, 16, 4);
        server.map.set_raw(1, 3, 1, STONE);
        server.map.set_raw(1, 9, 1, GLASS);
        server.map.set_raw(1, 12, 1, SAPLING);
        // Glass and saplings pass light; the stone is the top lit block.
        assert_eq!(server.map.top_lit(&server.registry, 1, 1), 3);
        assert_eq!(server.map.top(1, 1), 12);
    }

    #[test]
    fn scheduled_entries_are_in_bounds_and_future() {
        let mut server = test_server(8, 8, 8);
        server.tick = 17;
        map_set(&mut server, 0, 0, 0, WATER);
        assert!(!server.map.ticks.is_empty());
        for t in &server.map.ticks {
            assert!(server.map.pos_valid(t.x, t.y, t.z));
            assert!(t.due >= server.tick);
        }
    }

    #[test]
    fn liquid_schedule_is_phase_aligned() {
        let mut server = test_server(8, 8, 8);
        server.tick = 5;
        map_set(&mut server, 3, 6, 3, WATER);
        // Water period is 4; from tick 5 the next phase boundary is 8.
        assert!(server.map.ticks.iter().all(|t| t.due == 8));
    }

    #[test]
    fn add_tick_ignores_tickless_blocks() {
        let mut server = test_server(8, 8, 8);
        server.map.set_raw(1, 1, 1, STONE);
        map_add_tick(&mut server, 1, 1, 1, 0);
        assert!(server.map.ticks.is_empty());
    }

    #[test]
    fn queue_storage_freed_when_drained() {
        let mut server = test_server(8, 8, 8);
        map_set(&mut server, 4, 4, 4, SAND);
        assert!(!server.map.ticks.is_empty());
        map_tick(&mut server);
        assert!(server.map.ticks.is_empty());
        assert_eq!(server.map.ticks.capacity(), 0);
    }

    #[test]
    fn future_entries_survive_the_sweep() {
        let mut server = test_server(8, 8, 8);
        server.map.set_raw(2, 2, 2, WATER);
        server.map.ticks.push(ScheduledTick {
            x: 2,
            y: 2,
            z: 2,
            due: 1000,
        });
        map_tick(&mut server);
        assert_eq!(server.map.ticks.len(), 1);
    }
}
