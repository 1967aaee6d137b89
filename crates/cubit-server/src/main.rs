// main.rs — entry point: flags, signals, the 20 Hz loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cubit_server::config::Config;
use cubit_server::server::TICK_RATE;
use cubit_server::sv_main::{server_init, server_shutdown, server_tick};
use cubit_common::log::{log_error, log_info, log_init, set_colour_enabled};
use cubit_common::util::get_time_s;

fn main() {
    let mut config_path = "settings.ini".to_string();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-C" => set_colour_enabled(false),
            "-c" => match args.next() {
                Some(path) => config_path = path,
                None => {
                    eprintln!("-c requires a path");
                    return;
                }
            },
            _ => {
                println!("Usage: cubit-server [-C] [-c config]");
                return;
            }
        }
    }

    log_init("server.log");
    let config = Config::load(&config_path);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        }) {
            log_error(&format!("Failed to install signal handler: {}", e));
        }
    }

    let mut server = match server_init(config) {
        Ok(server) => server,
        Err(e) => {
            log_error(&format!("Failed to start server: {}", e));
            return;
        }
    };

    log_info("Ready!");

    let frame = 1.0 / TICK_RATE as f64;
    while running.load(Ordering::Relaxed) {
        let start = get_time_s();
        server_tick(&mut server);
        let elapsed = get_time_s() - start;

        if elapsed > frame {
            log_info(&format!(
                "Server lagged: tick {} took {:.1} ms",
                server.tick.saturating_sub(1),
                elapsed * 1000.0
            ));
        }

        thread::sleep(Duration::from_millis(1000 / TICK_RATE));
    }

    log_info("Received shutdown signal, will exit.");
    server_shutdown(&mut server);
}
