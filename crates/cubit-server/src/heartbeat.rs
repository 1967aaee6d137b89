// heartbeat.rs — periodic announce to the public server registry
//
// A plain HTTP/1.1 GET on a worker thread so the tick loop never waits on
// the network. The registry's 200 response carries the public play URL,
// which is logged exactly once per run.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::server::{Server, SOFTWARE_NAME};
use cubit_common::httputil::HttpResponse;
use cubit_common::log::{log_error, log_info};

static URL_PRINTED: AtomicBool = AtomicBool::new(false);

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Kick off one heartbeat exchange. No-op in offline mode.
pub fn server_heartbeat(server: &Server) {
    if server.config.server.offline {
        return;
    }

    let host = server.config.server.heartbeat_host.clone();
    let path = format!(
        "/server/heartbeat/?port={}&web=True&max={}&public={}&version=7&salt={}&users={}&software={}&name={}",
        server.port,
        server.config.server.max_players,
        if server.config.server.public { "True" } else { "False" },
        server.salt,
        server.clients.len(),
        SOFTWARE_NAME,
        server.config.server.name.replace(' ', "%20"),
    );

    thread::spawn(move || heartbeat_exchange(&host, &path));
}

fn heartbeat_exchange(host: &str, path: &str) {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
        path, host, SOFTWARE_NAME
    );

    let mut stream = match TcpStream::connect((host, 80)) {
        Ok(s) => s,
        Err(e) => {
            log_error(&format!("Heartbeat connect error: {}", e));
            return;
        }
    };
    let _ = stream.set_read_timeout(Some(HEARTBEAT_TIMEOUT));
    let _ = stream.set_write_timeout(Some(HEARTBEAT_TIMEOUT));

    if let Err(e) = stream.write_all(request.as_bytes()) {
        log_error(&format!("Heartbeat send error: {}", e));
        return;
    }

    let mut response = String::new();
    if let Err(e) = stream.read_to_string(&mut response) {
        log_error(&format!("Heartbeat recv error: {}", e));
        return;
    }

    match HttpResponse::parse(&response) {
        Some(resp) if resp.code == 200 => {
            if !URL_PRINTED.swap(true, Ordering::Relaxed) {
                log_info(&format!("Server URL: {}", extract_url(&resp.body)));
            }
        }
        Some(resp) => {
            log_error(&format!(
                "Heartbeat failed: {} {}",
                resp.code,
                resp.body.trim()
            ));
        }
        None => {
            log_error("Invalid heartbeat response");
        }
    }
}

/// The registry answers with the play URL somewhere in the body.
fn extract_url(body: &str) -> &str {
    let start = body.find("http").unwrap_or(0);
    let rest = &body[start..];
    let end = rest
        .find(|c: char| c == '\r' || c == '\n')
        .unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_extracted_from_body() {
        assert_eq!(
            extract_url("https://play.example.net/abc\r\n"),
            "https://play.example.net/abc"
        );
        assert_eq!(
            extract_url("3\r\nhttp://x.example/y\nrest"),
            "http://x.example/y"
        );
    }

    #[test]
    fn url_fallback_without_scheme() {
        assert_eq!(extract_url("no link here"), "no link here");
    }
}
