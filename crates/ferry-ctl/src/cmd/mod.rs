//! CLI command modules.

pub mod http;
pub mod shares;
pub mod status;

/// Human-readable byte count: bytes, KB, MB, GB (powers of 1024).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// First 16 characters of a hex id.
pub fn short(id: &str) -> &str {
    &id[..16.min(id.len())]
}
