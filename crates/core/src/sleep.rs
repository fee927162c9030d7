use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};

/// Uniform random duration in seconds within `[min_s, max_s]`.
pub fn random_secs(min_s: f64, max_s: f64) -> f64 {
    if max_s <= min_s {
        return min_s.max(0.0);
    }
    rand::thread_rng().gen_range(min_s..=max_s).max(0.0)
}

/// Sleep for `total` in slices of at most `granularity`, checking `stop`
/// before each slice. Returns `false` if `stop` cut the sleep short.
///
/// A `total` too large to put a deadline on sleeps until stopped.
pub fn sleep_interruptible(total: Duration, granularity: Duration, stop: impl Fn() -> bool) -> bool {
    let deadline = Instant::now().checked_add(total);
    let slice = granularity.max(Duration::from_millis(1));
    loop {
        if stop() {
            return false;
        }
        let left = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                deadline - now
            }
            None => slice,
        };
        thread::sleep(slice.min(left));
    }
}
