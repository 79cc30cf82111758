//! Broker port parsing, shared with the build script so that compiled-in
//! ports are checked at build time.

/// Parses a TCP port: 1 to 65535, decimal digits only.
pub const fn parse(text: &str) -> Option<u16> {
    let bytes = text.as_bytes();
    if bytes.is_empty() || bytes.len() > 5 {
        return None;
    }
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            return None;
        }
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    if value == 0 || value > u16::MAX as u32 {
        return None;
    }
    Some(value as u16)
}
