//! Resident-memory probe used by loop and supervisor statistics.

/// Returns the resident set size of this process in bytes.
///
/// Reads `/proc/self/statm` on Linux; returns 0 where that is unavailable.
pub fn resident_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
            let mut fields = statm.split_whitespace();
            // statm: size resident shared text lib data dt (in pages)
            if let Some(resident) = fields.nth(1).and_then(|f| f.parse::<u64>().ok()) {
                let page_size = 4096u64;
                return resident * page_size;
            }
        }
        0
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}
