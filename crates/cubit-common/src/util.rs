// util.rs — small shared helpers

use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic seconds since process start. Used for ping pacing, heartbeat
/// cadence, and tick-lag measurement; never for wall-clock display.
pub fn get_time_s() -> f64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_monotonic() {
        let a = get_time_s();
        let b = get_time_s();
        assert!(b >= a);
    }
}
