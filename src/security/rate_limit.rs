use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

static WINDOWS: Lazy<Mutex<HashMap<String, (u32, Instant)>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Fixed-window counter per key (callers key by client IP). Returns whether
/// this request is still inside the budget.
pub fn check(key: &str, limit: u32, window_secs: u64) -> bool {
    let mut windows = match WINDOWS.lock() {
        Ok(guard) => guard,
        // A poisoned limiter should never lock out authentication.
        Err(poisoned) => poisoned.into_inner(),
    };
    let entry = windows
        .entry(key.to_string())
        .or_insert((0, Instant::now()));
    if entry.1.elapsed() > Duration::from_secs(window_secs) {
        *entry = (0, Instant::now());
    }
    if entry.0 >= limit {
        return false;
    }
    entry.0 += 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_within_window() {
        let key = "rate-limit-test-198.51.100.7";
        for _ in 0..5 {
            assert!(check(key, 5, 60));
        }
        assert!(!check(key, 5, 60));
    }

    #[test]
    fn keys_are_independent() {
        assert!(check("rate-limit-test-a", 1, 60));
        assert!(check("rate-limit-test-b", 1, 60));
        assert!(!check("rate-limit-test-a", 1, 60));
    }
}
