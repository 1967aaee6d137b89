// mapimage.rs — top-down PNG snapshot of the world
//
// One pixel per column, coloured by the highest non-air block and shaded
// by its altitude. Colour lookup happens on the main thread (it needs the
// map), the PNG encode and file write go to a worker.

use std::thread;

use crate::server::Server;
use cubit_common::log::{log_error, log_info};

/// Render the current map to `<name>.png` asynchronously.
pub fn dispatch(server: &Server) {
    let (w, h, d) = (
        server.map.width,
        server.map.height,
        server.map.depth.max(1),
    );

    let mut pixels = vec![0u8; w * h * 3];
    for z in 0..h {
        for x in 0..w {
            let y = server.map.top(x, z);
            let colour = server.registry.info(server.map.get(x, y, z)).colour;

            // Higher columns render brighter.
            let shade = 0.55 + 0.45 * ((y + 1) as f32 / d as f32);
            let i = (z * w + x) * 3;
            pixels[i] = (((colour >> 16) & 0xFF) as f32 * shade) as u8;
            pixels[i + 1] = (((colour >> 8) & 0xFF) as f32 * shade) as u8;
            pixels[i + 2] = ((colour & 0xFF) as f32 * shade) as u8;
        }
    }

    let path = format!("{}.png", server.map.name);
    thread::spawn(move || {
        match image::RgbImage::from_raw(w as u32, h as u32, pixels) {
            Some(img) => match img.save(&path) {
                Ok(()) => log_info(&format!("Saved map snapshot to {}", path)),
                Err(e) => log_error(&format!("Failed to write snapshot '{}': {}", path, e)),
            },
            None => log_error("Snapshot buffer size mismatch"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::GRASS;
    use crate::map::Map;

    #[test]
    fn snapshot_file_appears() {
        let name = std::env::temp_dir()
            .join(format!("cubit-image-{}", std::process::id()))
            .to_string_lossy()
            .into_owned();

        let mut map = Map::new(&name, 8, 8, 8);
        for x in 0..8 {
            for z in 0..8 {
                map.set_raw(x, 2, z, GRASS);
            }
        }
        let server = Server::for_tests(map);

        dispatch(&server);

        let path = format!("{}.png", name);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !std::path::Path::new(&path).exists() {
            assert!(
                std::time::Instant::now() < deadline,
                "snapshot never appeared"
            );
            thread::sleep(std::time::Duration::from_millis(20));
        }
        let _ = std::fs::remove_file(&path);
    }
}
