//! General utilities shared across the crate.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds since the process first asked, wrapped to 32 bits.
///
/// The server only compares jiffies values against each other, so any
/// monotonic millisecond counter works.
#[must_use]
pub fn jiffies() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u32
}

/// Splits a position in seconds into the `(seconds, millis)` pair used by `STAT`.
///
/// Negative and non-finite inputs report zero.
#[must_use]
pub fn split_elapsed(seconds: f64) -> (u32, u32) {
    if !seconds.is_finite() || seconds <= 0.0 {
        return (0, 0);
    }
    let millis = (seconds * 1000.0).round() as u64;
    ((millis / 1000) as u32, millis as u32)
}

// ─────────────────────────────────────────────────────────────────────────────
// MAC Address Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a colon or dash separated MAC address (`00:04:20:ab:cd:ef`).
#[must_use]
pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(|c| c == ':' || c == '-');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?.trim(), 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// Formats a MAC address the way the server expects it in player ids.
#[must_use]
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
