// log.rs — levelled console and file logging
//
// Chat and console text carries `&x` colour tags (x a hex digit). The
// console sink renders them as ANSI escapes unless colour output was
// disabled on the command line; the file sink always strips them. Worker
// threads log too, so the sink state sits behind a mutex.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERR ",
        }
    }
}

static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
static COLOUR_ENABLED: AtomicBool = AtomicBool::new(true);

/// ANSI foreground codes for colour tags '0'..'9', 'a'..'f'.
const ANSI_CODES: [&str; 16] = [
    "30", "34", "32", "36", "31", "35", "33", "37", "90", "94", "92", "96", "91", "95", "93",
    "97",
];

fn tag_index(c: char) -> Option<usize> {
    match c {
        '0'..='9' => Some(c as usize - '0' as usize),
        'a'..='f' => Some(c as usize - 'a' as usize + 10),
        'A'..='F' => Some(c as usize - 'A' as usize + 10),
        _ => None,
    }
}

/// Render `&x` tags as ANSI escapes; unknown tags pass through verbatim.
pub fn render_colours(msg: &str) -> String {
    let mut out = String::with_capacity(msg.len() + 16);
    let mut chars = msg.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '&' {
            if let Some(idx) = chars.peek().copied().and_then(tag_index) {
                chars.next();
                out.push_str("\x1b[");
                out.push_str(ANSI_CODES[idx]);
                out.push('m');
                continue;
            }
        }
        out.push(c);
    }

    out.push_str("\x1b[0m");
    out
}

/// Remove `&x` tags entirely.
pub fn strip_colours(msg: &str) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut chars = msg.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '&' && chars.peek().copied().and_then(tag_index).is_some() {
            chars.next();
            continue;
        }
        out.push(c);
    }

    out
}

/// Open (or create) the log file. Safe to skip; logging then goes to the
/// console only.
pub fn log_init(path: &str) {
    let file = OpenOptions::new().create(true).append(true).open(path);
    if let Ok(mut fp) = file {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(fp, "--- Log opened at {} ---", stamp);
        *LOG_FILE.lock() = Some(fp);
    } else {
        eprintln!("Failed to open log file '{}' for appending.", path);
    }
}

pub fn set_colour_enabled(enabled: bool) {
    COLOUR_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn log_printf(level: LogLevel, msg: &str) {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    let header = format!("[{} {}] ", level.prefix(), stamp);

    let console = if COLOUR_ENABLED.load(Ordering::Relaxed) {
        render_colours(msg)
    } else {
        strip_colours(msg)
    };

    let mut file = LOG_FILE.lock();

    match level {
        LogLevel::Error => eprintln!("{}{}", header, console),
        LogLevel::Info => println!("{}{}", header, console),
    }

    if let Some(fp) = file.as_mut() {
        let _ = writeln!(fp, "{}{}", header, strip_colours(msg));
        let _ = fp.flush();
    }
}

pub fn log_info(msg: &str) {
    log_printf(LogLevel::Info, msg);
}

pub fn log_error(msg: &str) {
    log_printf(LogLevel::Error, msg);
}
