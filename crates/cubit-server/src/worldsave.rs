// worldsave.rs — gzip world container
//
// Layout (before compression): magic "CWLD", format version, u16 dims,
// the raw block array, then the scheduled-tick queue as (cell index,
// relative delay) pairs. Delays are stored relative to the tick counter
// at save time so pending ticks keep their remaining fuse across a
// restart.

use std::fs::File;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::map::{Map, ScheduledTick};
use cubit_common::buffer::ByteBuffer;
use cubit_common::log::{log_error, log_info};

const MAGIC: &[u8; 4] = b"CWLD";
const FORMAT_VERSION: u8 = 1;

fn world_path(name: &str) -> String {
    format!("{}.cw", name)
}

/// Persist the map if it changed since the last save. `now` anchors the
/// tick-queue delays.
pub fn save(map: &mut Map, now: u64) {
    if !map.modified {
        return;
    }

    let mut payload = ByteBuffer::growable();
    payload.write(MAGIC);
    payload.write_u8(FORMAT_VERSION);
    payload.write_u16be(map.width as u16);
    payload.write_u16be(map.depth as u16);
    payload.write_u16be(map.height as u16);
    payload.write(&map.blocks);

    payload.write_u32be(map.ticks.len() as u32);
    for tick in &map.ticks {
        payload.write_u32be(map.index(tick.x, tick.y, tick.z) as u32);
        payload.write_u64be(tick.due.saturating_sub(now));
    }

    let len = payload.tell();
    let path = world_path(&map.name);

    let result = File::create(&path).and_then(|file| {
        let mut encoder = GzEncoder::new(file, Compression::best());
        encoder.write_all(&payload.as_slice()[..len])?;
        encoder.finish()?;
        Ok(())
    });

    match result {
        Ok(()) => {
            map.modified = false;
            log_info(&format!("Saved world to {}", path));
        }
        Err(e) => {
            log_error(&format!("Failed to save world '{}': {}", path, e));
        }
    }
}

/// Load a world by name. Returns None when the file is missing or does
/// not parse; the caller generates a fresh map instead. Tick delays are
/// re-anchored at tick zero.
pub fn load(name: &str) -> Option<Map> {
    let path = world_path(name);
    let file = File::open(&path).ok()?;

    let mut raw = Vec::new();
    if let Err(e) = GzDecoder::new(file).read_to_end(&mut raw) {
        log_error(&format!("Failed to read world '{}': {}", path, e));
        return None;
    }

    let mut buf = ByteBuffer::from_vec(raw);

    let mut magic = [0u8; 4];
    if buf.read(&mut magic) != 4 || &magic != MAGIC {
        log_error(&format!("World '{}' has no recognizable header", path));
        return None;
    }
    let version = buf.read_u8()?;
    if version != FORMAT_VERSION {
        log_error(&format!("World '{}' has unknown version {}", path, version));
        return None;
    }

    let width = buf.read_u16be()? as usize;
    let depth = buf.read_u16be()? as usize;
    let height = buf.read_u16be()? as usize;

    let mut map = Map::new(name, width, depth, height);
    let volume = map.volume();
    if buf.read(&mut map.blocks) != volume {
        log_error(&format!("World '{}' is truncated", path));
        return None;
    }

    let count = buf.read_u32be()?;
    for _ in 0..count {
        let index = buf.read_u32be()? as usize;
        let delay = buf.read_u64be()?;
        if index >= volume {
            continue;
        }
        let (x, y, z) = map.index_to_pos(index);
        map.ticks.push(ScheduledTick { x, y, z, due: delay });
    }

    log_info(&format!("Loaded world from {}", path));
    Some(map)
}
