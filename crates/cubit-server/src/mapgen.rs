// mapgen.rs — world generators and the tree routines
//
// Terrain content is deliberately simple; the contract the rest of the
// server relies on is `generate` producing a fully initialized grid, plus
// the tree-space predicate and growth routine that sapling ticks call.

use crate::blocks::*;
use crate::map::{map_set, Map};
use crate::server::Server;
use cubit_common::log::log_error;

/// Fill the server's map with the named generator's content. The
/// generating flag suppresses tick scheduling and fan-out for the bulk of
/// the work.
pub fn generate(server: &mut Server, generator: &str) {
    server.map.generating = true;

    match generator {
        "flat" => generate_flat(server),
        "debug" => generate_debug(server),
        "random" => generate_random(server),
        other => {
            log_error(&format!("Unknown generator '{}', using flat.", other));
            generate_flat(server);
        }
    }

    server.map.generating = false;
    server.map.modified = true;
}

/// Stone base, dirt cover, grass surface at half height.
fn generate_flat(server: &mut Server) {
    let (w, d, h) = (server.map.width, server.map.depth, server.map.height);
    let surface = d / 2;

    for y in 0..=surface.min(d.saturating_sub(1)) {
        let block = if y == surface {
            GRASS
        } else if y + 4 >= surface {
            DIRT
        } else {
            STONE
        };

        for z in 0..h {
            for x in 0..w {
                server.map.set_raw(x, y, z, block);
            }
        }
    }
}

/// One of every block id in a row on a stone floor, for eyeballing
/// client-side rendering.
fn generate_debug(server: &mut Server) {
    let (w, h) = (server.map.width, server.map.height);

    for z in 0..h {
        for x in 0..w {
            server.map.set_raw(x, 0, z, STONE);
        }
    }

    for id in 0..NUM_BLOCKS as u8 {
        server.map.set_raw(1 + id as usize, 1, 1, id);
    }
}

/// Uniform noise. Useless to play, handy for compression stress.
fn generate_random(server: &mut Server) {
    for i in 0..server.map.blocks.len() {
        server.map.blocks[i] = server.rng.next(NUM_BLOCKS as i32) as u8;
    }
}

fn valid(map: &Map, x: i64, y: i64, z: i64) -> bool {
    x >= 0 && y >= 0 && z >= 0 && map.pos_valid(x as usize, y as usize, z as usize)
}

fn solid_at(map: &Map, registry: &BlockRegistry, x: i64, y: i64, z: i64) -> bool {
    registry
        .info(map.get(x as usize, y as usize, z as usize))
        .solid
}

/// Whether a tree of the given trunk height fits at (x, y, z): dirt or
/// grass underfoot, a clear 3x3 column over the trunk, and a clear 5x5
/// region around the canopy.
pub fn space_for_tree(
    map: &Map,
    registry: &BlockRegistry,
    x: i64,
    y: i64,
    z: i64,
    height: i32,
) -> bool {
    let height = height as i64;

    if !valid(map, x, y, z) || !valid(map, x, y - 1, z) {
        return false;
    }

    let below = map.get(x as usize, (y - 1) as usize, z as usize);
    if below != DIRT && below != GRASS {
        return false;
    }

    for xx in x - 1..=x + 1 {
        for yy in y..y + height {
            for zz in z - 1..=z + 1 {
                if !valid(map, xx, yy, zz) || solid_at(map, registry, xx, yy, zz) {
                    return false;
                }
            }
        }
    }

    let canopy_y = y + height - 4;
    for xx in x - 2..=x + 2 {
        for yy in canopy_y..y + height {
            for zz in z - 2..=z + 2 {
                if !valid(map, xx, yy, zz) || solid_at(map, registry, xx, yy, zz) {
                    return false;
                }
            }
        }
    }

    true
}

/// Place trunk and canopy. Callers check `space_for_tree` first; stray
/// out-of-bounds leaf writes are silently dropped by the map.
pub fn grow_tree(server: &mut Server, x: i64, y: i64, z: i64, height: i32) {
    let height = height as i64;
    let max0 = y + height;
    let max1 = max0 - 1;
    let max2 = max0 - 2;
    let max3 = max0 - 3;

    fn set(server: &mut Server, x: i64, y: i64, z: i64, block: u8) {
        if x >= 0 && y >= 0 && z >= 0 {
            map_set(server, x as usize, y as usize, z as usize, block);
        }
    }

    // Wide lower canopy, corners kept randomly ragged.
    for xx in -2i64..=2 {
        for zz in -2i64..=2 {
            let ax = x + xx;
            let az = z + zz;

            if xx.abs() == 2 && zz.abs() == 2 {
                if server.rng.next_bool() {
                    set(server, ax, max3, az, LEAVES);
                }
                if server.rng.next_bool() {
                    set(server, ax, max2, az, LEAVES);
                }
            } else {
                set(server, ax, max3, az, LEAVES);
                set(server, ax, max2, az, LEAVES);
            }
        }
    }

    // Narrow top cross.
    for xx in -1i64..=1 {
        for zz in -1i64..=1 {
            let ax = x + xx;
            let az = z + zz;

            if xx == 0 || zz == 0 {
                set(server, ax, max1, az, LEAVES);
                set(server, ax, max0, az, LEAVES);
            } else if server.rng.next_bool() {
                set(server, ax, max1, az, LEAVES);
            }
        }
    }

    for yy in y..max0 {
        set(server, x, yy, z, WOOD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grass_floor_server(w: usize, d: usize, h: usize) -> Server {
        let mut map = Map::new("t", w, d, h);
        for x in 0..w {
            for z in 0..h {
                map.set_raw(x, 0, z, GRASS);
            }
        }
        Server::for_tests(map)
    }

    #[test]
    fn flat_world_has_grass_surface() {
        let mut server = Server::for_tests(Map::new("t", 16, 16, 16));
        generate(&mut server, "flat");

        let surface = 8;
        for x in 0..16 {
            for z in 0..16 {
                assert_eq!(server.map.get(x, surface, z), GRASS);
                assert_eq!(server.map.get(x, surface - 1, z), DIRT);
                assert_eq!(server.map.get(x, 0, z), STONE);
                assert_eq!(server.map.get(x, surface + 1, z), AIR);
            }
        }
        assert!(!server.map.generating);
        assert!(server.map.modified);
        assert!(server.map.ticks.is_empty());
    }

    #[test]
    fn unknown_generator_falls_back_to_flat() {
        let mut server = Server::for_tests(Map::new("t", 8, 8, 8));
        generate(&mut server, "perlin-deluxe");
        assert_eq!(server.map.get(0, 4, 0), GRASS);
    }

    #[test]
    fn random_world_is_fully_initialized() {
        let mut server = Server::for_tests(Map::new("t", 8, 8, 8));
        generate(&mut server, "random");
        assert!(server
            .map
            .blocks
            .iter()
            .all(|&b| (b as usize) < NUM_BLOCKS));
    }

    #[test]
    fn tree_needs_soil() {
        let mut server = grass_floor_server(16, 24, 16);
        server.map.set_raw(8, 0, 8, STONE);
        assert!(!space_for_tree(
            &server.map,
            &server.registry,
            8,
            1,
            8,
            5
        ));
        server.map.set_raw(8, 0, 8, DIRT);
        assert!(space_for_tree(&server.map, &server.registry, 8, 1, 8, 5));
    }

    #[test]
    fn tree_rejects_blocked_canopy() {
        let mut server = grass_floor_server(16, 24, 16);
        assert!(space_for_tree(&server.map, &server.registry, 8, 1, 8, 6));
        // A solid block in the 5x5 canopy ring kills the fit.
        server.map.set_raw(10, 5, 10, STONE);
        assert!(!space_for_tree(&server.map, &server.registry, 8, 1, 8, 6));
    }

    #[test]
    fn tree_rejects_map_edge() {
        let server = grass_floor_server(16, 24, 16);
        assert!(!space_for_tree(&server.map, &server.registry, 0, 1, 8, 5));
        assert!(!space_for_tree(&server.map, &server.registry, 8, 1, 15, 5));
    }

    #[test]
    fn grown_tree_stays_in_bounds_and_keeps_ground() {
        let mut server = grass_floor_server(16, 24, 16);
        grow_tree(&mut server, 8, 1, 8, 6);

        assert_eq!(server.map.get(8, 1, 8), WOOD);
        assert_eq!(server.map.get(8, 6, 8), WOOD);
        assert_eq!(server.map.get(8, 7, 8), LEAVES);
        // Ground level is untouched outside the trunk column.
        assert_eq!(server.map.get(7, 0, 8), GRASS);
    }
}
