// Leveled stderr logger: DEBUG lines only with --debug, INFO/WARN/ERROR always.
// Parse diagnostics and table failures go through here so none is silent.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Log level values are ordered (Info < Debug) for easy comparisons.
const INFO_LEVEL: u8 = 0;
const DEBUG_LEVEL: u8 = 1;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(INFO_LEVEL);

// Set the global log level based on the --debug flag.
pub fn set_debug(enabled: bool) {
    if enabled {
        LOG_LEVEL.store(DEBUG_LEVEL, Ordering::Relaxed);
    } else {
        LOG_LEVEL.store(INFO_LEVEL, Ordering::Relaxed);
    }
}

pub fn is_debug() -> bool {
    LOG_LEVEL.load(Ordering::Relaxed) >= DEBUG_LEVEL
}

pub fn info(msg: &str) {
    log_line("INFO", msg);
}

pub fn debug(msg: &str) {
    if is_debug() {
        log_line("DEBUG", msg);
    }
}

// Recoverable problems: skipped statements, dropped rows.
pub fn warn(msg: &str) {
    log_line("WARN", msg);
}

pub fn error(msg: &str) {
    log_line("ERROR", msg);
}

fn log_line(level: &str, msg: &str) {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    eprintln!("[{}] {} {}", level, ts, msg);
}
