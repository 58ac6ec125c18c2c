use std::process;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Returns the low `size` hex characters of an MD5 digest of the
/// current wall-clock milliseconds, unix seconds, and this process's
/// PID -- the same recipe `transport_con_set_address()` uses to build
/// the random suffix of a bus address.
pub fn random_suffix(size: usize) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("SystemTime before UNIX EPOCH!");

    let junk = format!("{}{}{}", now.as_millis(), now.as_secs(), process::id());
    let digest = md5::compute(junk.as_bytes());
    let hex = format!("{:x}", digest);

    hex[0..size.min(hex.len())].to_string()
}

/// Converts a JSON number or string to an isize if possible.
pub fn json_isize(value: &json::JsonValue) -> Option<isize> {
    if let Some(i) = value.as_isize() {
        return Some(i);
    } else if let Some(s) = value.as_str() {
        if let Ok(i2) = s.parse::<isize>() {
            return Some(i2);
        }
    }

    None
}

/// A countdown timer used to enforce an absolute deadline across a
/// series of retried operations (e.g. `Bus::recv`'s retry loop).
pub struct Timer {
    /// Duration of this timer in seconds.
    /// Timer is "done" once this many seconds have passed since
    /// start_time.
    duration: i32,

    /// Moment this timer starts.
    start_time: Instant,
}

impl Timer {
    pub fn new(duration: i32) -> Timer {
        Timer {
            duration,
            start_time: Instant::now(),
        }
    }

    pub fn remaining(&self) -> i32 {
        self.duration - self.start_time.elapsed().as_secs() as i32
    }

    pub fn done(&self) -> bool {
        self.remaining() <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_suffix_has_requested_length() {
        assert_eq!(random_suffix(8).len(), 8);
        assert_eq!(random_suffix(6).len(), 6);
    }

    #[test]
    fn random_suffix_is_lowercase_hex() {
        let s = random_suffix(8);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
