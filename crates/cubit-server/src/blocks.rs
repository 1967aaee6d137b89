// blocks.rs — block id table, per-block behavior registry, tick callbacks
//
// The registry is data: one immutable table built at startup and read from
// everywhere. Callbacks are plain fn pointers taking the server context so
// they can mutate the map, enqueue ticks, and draw from the world RNG.

use crate::map::{map_add_tick, map_set};
use crate::mapgen;
use crate::server::Server;

pub const AIR: u8 = 0;
pub const STONE: u8 = 1;
pub const GRASS: u8 = 2;
pub const DIRT: u8 = 3;
pub const COBBLESTONE: u8 = 4;
pub const WOOD_PLANKS: u8 = 5;
pub const SAPLING: u8 = 6;
pub const BEDROCK: u8 = 7;
pub const WATER: u8 = 8;
pub const WATER_STILL: u8 = 9;
pub const LAVA: u8 = 10;
pub const LAVA_STILL: u8 = 11;
pub const SAND: u8 = 12;
pub const GRAVEL: u8 = 13;
pub const GOLD_ORE: u8 = 14;
pub const IRON_ORE: u8 = 15;
pub const COAL_ORE: u8 = 16;
pub const WOOD: u8 = 17;
pub const LEAVES: u8 = 18;
pub const SPONGE: u8 = 19;
pub const GLASS: u8 = 20;
pub const RED_WOOL: u8 = 21;
pub const ORANGE_WOOL: u8 = 22;
pub const YELLOW_WOOL: u8 = 23;
pub const LIME_WOOL: u8 = 24;
pub const GREEN_WOOL: u8 = 25;
pub const AQUAGREEN_WOOL: u8 = 26;
pub const CYAN_WOOL: u8 = 27;
pub const BLUE_WOOL: u8 = 28;
pub const PURPLE_WOOL: u8 = 29;
pub const INDIGO_WOOL: u8 = 30;
pub const VIOLET_WOOL: u8 = 31;
pub const MAGENTA_WOOL: u8 = 32;
pub const PINK_WOOL: u8 = 33;
pub const BLACK_WOOL: u8 = 34;
pub const GREY_WOOL: u8 = 35;
pub const WHITE_WOOL: u8 = 36;
pub const DANDELION: u8 = 37;
pub const ROSE: u8 = 38;
pub const BROWN_MUSHROOM: u8 = 39;
pub const RED_MUSHROOM: u8 = 40;
pub const GOLD_BLOCK: u8 = 41;
pub const IRON_BLOCK: u8 = 42;
pub const DOUBLE_SLAB: u8 = 43;
pub const SLAB: u8 = 44;
pub const BRICKS: u8 = 45;
pub const TNT: u8 = 46;
pub const BOOKSHELF: u8 = 47;
pub const MOSSY_COBBLESTONE: u8 = 48;
pub const OBSIDIAN: u8 = 49;

// CPE level-1 blocks; peers without CustomBlocks get the fallback id.
pub const COBBLESTONE_SLAB: u8 = 50;
pub const ROPE: u8 = 51;
pub const SANDSTONE: u8 = 52;
pub const SNOW: u8 = 53;
pub const FIRE: u8 = 54;
pub const LIGHT_PINK_WOOL: u8 = 55;
pub const FOREST_GREEN_WOOL: u8 = 56;
pub const BROWN_WOOL: u8 = 57;
pub const DEEP_BLUE_WOOL: u8 = 58;
pub const TURQUOISE_WOOL: u8 = 59;
pub const ICE: u8 = 60;
pub const CERAMIC_TILE: u8 = 61;
pub const MAGMA: u8 = 62;
pub const PILLAR: u8 = 63;
pub const CRATE: u8 = 64;
pub const STONE_BRICK: u8 = 65;

pub const NUM_BLOCKS: usize = 66;

pub type BlockFn = fn(&mut Server, usize, usize, usize, u8);

#[derive(Clone, Copy)]
pub struct BlockInfo {
    pub solid: bool,
    pub blocks_light: bool,
    pub liquid: bool,
    pub op_only_place: bool,
    pub op_only_break: bool,
    /// Scheduled-tick phase period; 0 means aperiodic (fires immediately).
    pub tick_period: u64,
    pub on_tick: Option<BlockFn>,
    pub on_random_tick: Option<BlockFn>,
    pub on_place: Option<BlockFn>,
    pub on_break: Option<BlockFn>,
    /// 24-bit RGB used by the map snapshot renderer.
    pub colour: u32,
    /// Substitute id for peers without CustomBlocks.
    pub fallback: u8,
}

impl BlockInfo {
    fn base(id: u8, colour: u32) -> Self {
        Self {
            solid: true,
            blocks_light: true,
            liquid: false,
            op_only_place: false,
            op_only_break: false,
            tick_period: 0,
            on_tick: None,
            on_random_tick: None,
            on_place: None,
            on_break: None,
            colour,
            fallback: id,
        }
    }
}

pub struct BlockRegistry {
    table: [BlockInfo; 256],
}

impl BlockRegistry {
    pub fn new() -> Self {
        let mut t: [BlockInfo; 256] = std::array::from_fn(|i| BlockInfo::base(i as u8, 0));

        for (id, colour) in COLOURS {
            t[*id as usize].colour = *colour;
        }

        t[AIR as usize].solid = false;
        t[AIR as usize].blocks_light = false;

        t[GRASS as usize].on_random_tick = Some(tick_grass_die);
        t[DIRT as usize].on_random_tick = Some(tick_grass_grow);

        t[SAPLING as usize].solid = false;
        t[SAPLING as usize].blocks_light = false;
        t[SAPLING as usize].on_random_tick = Some(tick_tree_grow);

        t[BEDROCK as usize].op_only_place = true;
        t[BEDROCK as usize].op_only_break = true;

        for liquid in [WATER, WATER_STILL, LAVA, LAVA_STILL] {
            t[liquid as usize].solid = false;
            t[liquid as usize].liquid = true;
            t[liquid as usize].op_only_place = true;
        }
        t[WATER as usize].on_tick = Some(tick_flow);
        t[WATER as usize].tick_period = 4;
        t[WATER as usize].on_place = Some(place_liquid);
        t[LAVA as usize].on_tick = Some(tick_flow);
        t[LAVA as usize].tick_period = 8;
        t[LAVA as usize].on_place = Some(place_liquid);

        t[SAND as usize].on_tick = Some(tick_gravity);
        t[GRAVEL as usize].on_tick = Some(tick_gravity);

        t[SPONGE as usize].on_place = Some(place_sponge);
        t[SPONGE as usize].on_break = Some(break_sponge);

        t[GLASS as usize].blocks_light = false;

        for clear in [ROSE, DANDELION, BROWN_MUSHROOM, RED_MUSHROOM, ROPE, FIRE] {
            t[clear as usize].solid = false;
            t[clear as usize].blocks_light = false;
        }
        t[SNOW as usize].solid = false;

        for (id, fallback) in FALLBACKS {
            t[*id as usize].fallback = *fallback;
        }

        Self { table: t }
    }

    pub fn info(&self, id: u8) -> &BlockInfo {
        &self.table[id as usize]
    }

    /// Flat remap table for the whole-map transfer.
    pub fn fallback_table(&self) -> [u8; 256] {
        std::array::from_fn(|i| self.table[i].fallback)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const FALLBACKS: &[(u8, u8)] = &[
    (COBBLESTONE_SLAB, SLAB),
    (ROPE, BROWN_MUSHROOM),
    (SANDSTONE, SAND),
    (SNOW, AIR),
    (FIRE, LAVA),
    (LIGHT_PINK_WOOL, PINK_WOOL),
    (FOREST_GREEN_WOOL, GREEN_WOOL),
    (BROWN_WOOL, DIRT),
    (DEEP_BLUE_WOOL, BLUE_WOOL),
    (TURQUOISE_WOOL, CYAN_WOOL),
    (ICE, GLASS),
    (CERAMIC_TILE, IRON_BLOCK),
    (MAGMA, OBSIDIAN),
    (PILLAR, WHITE_WOOL),
    (CRATE, WOOD_PLANKS),
    (STONE_BRICK, STONE),
];

const COLOURS: &[(u8, u32)] = &[
    (STONE, 0x7F7F7F),
    (GRASS, 0x6A9C3B),
    (DIRT, 0x79553A),
    (COBBLESTONE, 0x828282),
    (WOOD_PLANKS, 0x9C7F4E),
    (SAPLING, 0x4CA82E),
    (BEDROCK, 0x333333),
    (WATER, 0x2E5EC8),
    (WATER_STILL, 0x2E5EC8),
    (LAVA, 0xD96514),
    (LAVA_STILL, 0xD96514),
    (SAND, 0xDBD3A0),
    (GRAVEL, 0x888483),
    (GOLD_ORE, 0xC8AE5E),
    (IRON_ORE, 0xAF8E77),
    (COAL_ORE, 0x4A4A4A),
    (WOOD, 0x674D2E),
    (LEAVES, 0x3A6626),
    (SPONGE, 0xB8B82D),
    (GLASS, 0xC0E8FC),
    (RED_WOOL, 0xB02E26),
    (ORANGE_WOOL, 0xD87F33),
    (YELLOW_WOOL, 0xE5E533),
    (LIME_WOOL, 0x7FCC19),
    (GREEN_WOOL, 0x3D7A28),
    (AQUAGREEN_WOOL, 0x36A85E),
    (CYAN_WOOL, 0x1FA8A8),
    (BLUE_WOOL, 0x3C44AA),
    (PURPLE_WOOL, 0x7B2FBE),
    (INDIGO_WOOL, 0x4C2F9E),
    (VIOLET_WOOL, 0x9C5CC6),
    (MAGENTA_WOOL, 0xC354CD),
    (PINK_WOOL, 0xF38BAA),
    (BLACK_WOOL, 0x1D1D21),
    (GREY_WOOL, 0x9D9D97),
    (WHITE_WOOL, 0xF9FFFE),
    (DANDELION, 0xFFD800),
    (ROSE, 0xC42D21),
    (BROWN_MUSHROOM, 0x916D55),
    (RED_MUSHROOM, 0xC83434),
    (GOLD_BLOCK, 0xF9E254),
    (IRON_BLOCK, 0xD8D8D8),
    (DOUBLE_SLAB, 0xA8A8A8),
    (SLAB, 0xA8A8A8),
    (BRICKS, 0x9C5746),
    (TNT, 0xC43B25),
    (BOOKSHELF, 0x9C7F4E),
    (MOSSY_COBBLESTONE, 0x5E7D5E),
    (OBSIDIAN, 0x1B1729),
    (COBBLESTONE_SLAB, 0x828282),
    (ROPE, 0x695433),
    (SANDSTONE, 0xD9CFA3),
    (SNOW, 0xF6FBFB),
    (FIRE, 0xE05C06),
    (LIGHT_PINK_WOOL, 0xF2A7C3),
    (FOREST_GREEN_WOOL, 0x2E5A1E),
    (BROWN_WOOL, 0x7A4F2C),
    (DEEP_BLUE_WOOL, 0x1E3CA8),
    (TURQUOISE_WOOL, 0x23B5B5),
    (ICE, 0x7DAEFC),
    (CERAMIC_TILE, 0xC8C8C8),
    (MAGMA, 0x6E2C2C),
    (PILLAR, 0xE0E0E0),
    (CRATE, 0xA2793C),
    (STONE_BRICK, 0x909090),
];

/// Any sponge within Chebyshev distance `r` of the cell.
fn sponge_within(server: &Server, x: usize, y: usize, z: usize, r: i64) -> bool {
    for dy in -r..=r {
        for dz in -r..=r {
            for dx in -r..=r {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                let nz = z as i64 + dz;
                if nx < 0 || ny < 0 || nz < 0 {
                    continue;
                }
                let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
                if !server.map.pos_valid(nx, ny, nz) {
                    continue;
                }
                if server.map.get(nx, ny, nz) == SPONGE {
                    return true;
                }
            }
        }
    }
    false
}

/// Sand and gravel: fall to the lowest reachable cell in the column.
fn tick_gravity(server: &mut Server, x: usize, y: usize, z: usize, block: u8) {
    let mut yy = y;
    while yy > 0 && !server.registry.info(server.map.get(x, yy - 1, z)).solid {
        yy -= 1;
    }

    if yy != y {
        map_set(server, x, y, z, AIR);
        map_set(server, x, yy, z, block);
    }
}

/// Liquids spread sideways and down into non-solid cells, unless a sponge
/// sits within Chebyshev distance 2 of the target.
fn tick_flow(server: &mut Server, x: usize, y: usize, z: usize, block: u8) {
    const SIDES: [(i64, i64, i64); 5] = [(-1, 0, 0), (1, 0, 0), (0, 0, -1), (0, 0, 1), (0, -1, 0)];

    for (dx, dy, dz) in SIDES {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        let nz = z as i64 + dz;
        if nx < 0 || ny < 0 || nz < 0 {
            continue;
        }
        let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
        if !server.map.pos_valid(nx, ny, nz) {
            continue;
        }

        if !server.registry.info(server.map.get(nx, ny, nz)).solid
            && !sponge_within(server, nx, ny, nz, 2)
        {
            map_set(server, nx, ny, nz, block);
        }
    }
}

/// Grass shaded by a higher light-blocker reverts to dirt.
fn tick_grass_die(server: &mut Server, x: usize, y: usize, z: usize, block: u8) {
    if block != GRASS {
        return;
    }

    if server.map.top_lit(&server.registry, x, z) > y {
        map_set(server, x, y, z, DIRT);
    }
}

/// Dirt exposed as the top light-blocker of its column grows grass.
fn tick_grass_grow(server: &mut Server, x: usize, y: usize, z: usize, block: u8) {
    if block != DIRT {
        return;
    }

    if server.map.top_lit(&server.registry, x, z) == y {
        map_set(server, x, y, z, GRASS);
    }
}

/// Saplings in open light grow a tree when the canopy fits.
fn tick_tree_grow(server: &mut Server, x: usize, y: usize, z: usize, block: u8) {
    if block != SAPLING {
        return;
    }

    if server.map.top_lit(&server.registry, x, z) > y {
        return;
    }

    let height = server.rng.next_range(1, 5) + 4;
    if mapgen::space_for_tree(&server.map, &server.registry, x as i64, y as i64, z as i64, height)
    {
        mapgen::grow_tree(server, x as i64, y as i64, z as i64, height);
    }
}

/// A placed sponge dries every liquid within Chebyshev distance 2.
fn place_sponge(server: &mut Server, x: usize, y: usize, z: usize, _block: u8) {
    for dy in -2i64..=2 {
        for dz in -2i64..=2 {
            for dx in -2i64..=2 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                let nz = z as i64 + dz;
                if nx < 0 || ny < 0 || nz < 0 {
                    continue;
                }
                let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
                if !server.map.pos_valid(nx, ny, nz) {
                    continue;
                }
                if server.registry.info(server.map.get(nx, ny, nz)).liquid {
                    map_set(server, nx, ny, nz, AIR);
                }
            }
        }
    }
}

/// Removing a sponge lets nearby liquids resume flowing: schedule a tick on
/// every liquid within Chebyshev distance 3 at its own period.
fn break_sponge(server: &mut Server, x: usize, y: usize, z: usize, _block: u8) {
    for dy in -3i64..=3 {
        for dz in -3i64..=3 {
            for dx in -3i64..=3 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                let nz = z as i64 + dz;
                if nx < 0 || ny < 0 || nz < 0 {
                    continue;
                }
                let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
                if !server.map.pos_valid(nx, ny, nz) {
                    continue;
                }

                let b = server.map.get(nx, ny, nz);
                if server.registry.info(b).liquid {
                    let period = server.registry.info(b).tick_period;
                    map_add_tick(server, nx, ny, nz, period);
                }
            }
        }
    }
}

/// Liquid placed in range of a sponge dries up immediately.
fn place_liquid(server: &mut Server, x: usize, y: usize, z: usize, _block: u8) {
    if sponge_within(server, x, y, z, 2) {
        map_set(server, x, y, z, AIR);
    }
}
