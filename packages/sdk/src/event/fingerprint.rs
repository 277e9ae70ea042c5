// packages/sdk/src/event/fingerprint.rs
//! Error fingerprinting
//!
//! A fingerprint identifies a class of equivalent errors so duplicates can
//! be dropped within a session. It is a pure function of the error's
//! message and source position: no timestamp, no salt.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Compute the stable fingerprint for `(message, fileName, line, column)`.
pub fn fingerprint(
    message: &str,
    file_name: Option<&str>,
    line: Option<u32>,
    column: Option<u32>,
) -> String {
    let input = format!(
        "{}:{}:{}:{}",
        message,
        file_name.unwrap_or(""),
        line.map(|l| l.to_string()).unwrap_or_default(),
        column.map(|c| c.to_string()).unwrap_or_default(),
    );
    format!("{:016x}", fnv1a(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = fingerprint("Boom", Some("app.js"), Some(10), Some(3));
        let b = fingerprint("Boom", Some("app.js"), Some(10), Some(3));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_position_sensitivity() {
        let a = fingerprint("Boom", Some("app.js"), Some(10), Some(3));
        let b = fingerprint("Boom", Some("app.js"), Some(11), Some(3));
        let c = fingerprint("Boom", Some("other.js"), Some(10), Some(3));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_position() {
        let a = fingerprint("Unhandled rejection", None, None, None);
        let b = fingerprint("Unhandled rejection", None, None, None);
        assert_eq!(a, b);
        assert_ne!(a, fingerprint("Other rejection", None, None, None));
    }
}
